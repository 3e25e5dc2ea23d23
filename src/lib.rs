//! Quill: a bytecode compiler and stack VM for a small expression language.
//!
//! This is the library root that exports all modules.
//!
//! # Pipeline
//!
//! An external resolver produces a tree of [`ast::Node`]s with every variable
//! classified as local, closure or global. The [`vm::Compiler`] lowers it into
//! a [`vm::CodeSegment`] and [`vm::DataSegment`], and the [`vm::Vm`] executes
//! those against a [`runtime::Memory`]. `for`/`yield` iteration runs producers
//! as cooperative contexts inside the VM; no threads are involved.

#![allow(clippy::module_inception)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::new_without_default)]

pub mod ast;
pub mod config;
pub mod error;
pub mod runtime;
pub mod session;
pub mod vm;

pub use config::VmConfig;
pub use error::QuillError;
pub use runtime::Value;
pub use session::Session;

/// Run a resolved program in a fresh session, one value per statement.
pub fn run(program: &[ast::Node]) -> Result<Vec<Value>, QuillError> {
    Session::new().run_program(program)
}
