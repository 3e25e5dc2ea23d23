//! Bytecode compiler and VM for Quill.
//!
//! The compiler lowers resolved trees into bit-packed instruction words; the
//! VM executes them, running `for` loop producers as cooperative contexts.

pub mod compiler;
pub mod compiler_control;
pub mod compiler_exprs;
pub mod console;
pub mod context;
pub mod disassembler;
pub mod instruction;
pub mod segment;
#[allow(clippy::module_inception)]
pub mod vm;
pub mod vm_builtins;
pub mod vm_calls;
pub mod vm_coroutines;


pub use compiler::{CompileResult, Compiler};
pub use console::{BufferedConsole, Console, StdConsole};
pub use disassembler::{disassemble, disassemble_range};
pub use instruction::{Instruction, Mode, Opcode, Operand};
pub use segment::{CodeSegment, DataSegment};
pub use vm::Vm;
