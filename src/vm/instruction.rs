//! Bit-packed instruction words.
//!
//! ```text
//!  63     57 56  54 53     38 37  35 34     19 18  16 15      0
//!  | opcode | modeA | addrA  | modeB | addrB  | modeC | addrC  |
//! ```
//!
//! Addresses are 16-bit two's complement and are sign-extended on decode so
//! that backward jump offsets survive the round trip.

use std::fmt;

use thiserror::Error;

use crate::error::{CompileError, VmError};

use super::compiler::CompileResult;

const OPCODE_SHIFT: u32 = 57;
const OPCODE_MASK: u64 = 0x7f;
const SLOT_BITS: u32 = 19;
const SLOT_MASK: u64 = (1 << SLOT_BITS) - 1;
const MODE_SHIFT: u32 = 16;
const MODE_MASK: u64 = 0x7;
const ADDRESS_MASK: u64 = 0xffff;

/// Width of an operand address field.
pub const ADDRESS_BITS: u32 = 16;
pub const ADDRESS_MIN: i64 = i16::MIN as i64;
pub const ADDRESS_MAX: i64 = i16::MAX as i64;

/// Slot positions, most significant first.
const SLOT_SHIFTS: [u32; 3] = [2 * SLOT_BITS, SLOT_BITS, 0];

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $value:literal => $text:literal,)*) => {
        /// Instruction opcodes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($(#[$doc])* $name = $value,)*
        }

        impl Opcode {
            pub fn from_u8(byte: u8) -> Option<Self> {
                match byte {
                    $($value => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$name => $text,)*
                }
            }
        }
    };
}

opcodes! {
    /// A ← B
    Move = 0 => "move",
    /// Discard the top of the stack.
    Pop = 1 => "pop",
    Neg = 2 => "neg",
    Not = 3 => "not",
    Len = 4 => "len",
    ToInt = 5 => "toint",
    ToFloat = 6 => "tofloat",
    ToStr = 7 => "tostr",
    Add = 8 => "add",
    Sub = 9 => "sub",
    Mul = 10 => "mul",
    Div = 11 => "div",
    Mod = 12 => "mod",
    Eq = 13 => "eq",
    Ne = 14 => "ne",
    Lt = 15 => "lt",
    Le = 16 => "le",
    Gt = 17 => "gt",
    Ge = 18 => "ge",
    And = 19 => "and",
    Or = 20 => "or",
    /// A ← B[C]
    Index = 21 => "index",
    /// Push A[B:C].
    Slice = 22 => "slice",
    /// A ← array of the top B stack values.
    MakeArray = 23 => "mkarray",
    /// Relative jump by A.
    Jump = 24 => "jmp",
    /// Relative jump by A when B is false.
    JumpIfFalse = 25 => "jmpf",
    /// Push a function with entry offset A, B params and a C-slot frame.
    MakeFunction = 26 => "mkfunc",
    /// Call B with A arguments from the stack; pushes the result.
    Call = 27 => "call",
    /// Return B to the caller.
    Return = 28 => "ret",
    /// Open the producer group of a for loop.
    IterBegin = 29 => "iterbegin",
    /// Start a producer; the consumer continues at A and leaves at B.
    Spawn = 30 => "spawn",
    /// A producer ran out of values.
    EndIter = 31 => "enditer",
    /// Resume producer A; leave the loop at B when it is exhausted.
    Resume = 32 => "resume",
    /// Hand B to the consumer.
    Yield = 33 => "yield",
    /// Close the producer group, discarding what is left.
    IterEnd = 34 => "iterend",
    ReadLine = 35 => "readline",
    Write = 36 => "write",
    Print = 37 => "print",
    /// Stop the machine with exit code B.
    Exit = 38 => "exit",
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How an operand's address is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mode {
    /// The address itself is the value.
    Immediate = 0,
    /// Data segment index of the global's name.
    Global = 1,
    /// Slot in the innermost frame.
    Local = 2,
    /// Slot in the closure frame.
    Closure = 3,
    /// Implicit push or pop.
    Stack = 4,
    /// Data segment index of a constant.
    Data = 5,
}

impl Mode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Mode::Immediate,
            1 => Mode::Global,
            2 => Mode::Local,
            3 => Mode::Closure,
            4 => Mode::Stack,
            5 => Mode::Data,
            _ => return None,
        })
    }
}

/// An operand descriptor: addressing mode plus signed address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand {
    pub mode: Mode,
    pub address: i32,
}

impl Operand {
    /// Placeholder for unused slots.
    pub const NONE: Operand = Operand {
        mode: Mode::Immediate,
        address: 0,
    };

    pub const STACK: Operand = Operand {
        mode: Mode::Stack,
        address: 0,
    };

    /// Build an operand, rejecting addresses outside the 16-bit field.
    pub fn new(mode: Mode, address: i64, what: &'static str) -> CompileResult<Self> {
        if !(ADDRESS_MIN..=ADDRESS_MAX).contains(&address) {
            return Err(CompileError::address_overflow(what, address, ADDRESS_BITS));
        }
        Ok(Self {
            mode,
            address: address as i32,
        })
    }

    pub fn immediate(value: i64, what: &'static str) -> CompileResult<Self> {
        Self::new(Mode::Immediate, value, what)
    }

    pub fn data(index: usize) -> CompileResult<Self> {
        Self::new(Mode::Data, index as i64, "data index")
    }

    pub fn global(name_index: usize) -> CompileResult<Self> {
        Self::new(Mode::Global, name_index as i64, "global name index")
    }

    pub fn local(slot: u16) -> CompileResult<Self> {
        Self::new(Mode::Local, slot as i64, "local slot")
    }

    pub fn closure(slot: u16) -> CompileResult<Self> {
        Self::new(Mode::Closure, slot as i64, "closure slot")
    }

    pub fn is_stack(&self) -> bool {
        self.mode == Mode::Stack
    }

    fn pack(&self) -> u64 {
        ((self.mode as u64) << MODE_SHIFT) | (self.address as u16 as u64 & ADDRESS_MASK)
    }

    fn unpack(bits: u64) -> Result<Self, DecodeError> {
        let mode = ((bits >> MODE_SHIFT) & MODE_MASK) as u8;
        let mode = Mode::from_u8(mode).ok_or(DecodeError::UnknownMode(mode))?;
        let address = (bits & ADDRESS_MASK) as u16 as i16 as i32;
        Ok(Self { mode, address })
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Mode::Immediate => write!(f, "#{}", self.address),
            Mode::Global => write!(f, "global[{}]", self.address),
            Mode::Local => write!(f, "local[{}]", self.address),
            Mode::Closure => write!(f, "closure[{}]", self.address),
            Mode::Stack => write!(f, "stack"),
            Mode::Data => write!(f, "data[{}]", self.address),
        }
    }
}

/// Failure to decode an instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("unknown addressing mode {0}")]
    UnknownMode(u8),
}

impl DecodeError {
    pub fn at(self, ip: usize) -> VmError {
        match self {
            DecodeError::UnknownOpcode(opcode) => VmError::UnknownOpcode { opcode, ip },
            DecodeError::UnknownMode(mode) => VmError::UnknownMode { mode, ip },
        }
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub a: Operand,
    pub b: Operand,
    pub c: Operand,
}

impl Instruction {
    pub fn new(opcode: Opcode, a: Operand, b: Operand, c: Operand) -> Self {
        Self { opcode, a, b, c }
    }

    /// An instruction with no operands.
    pub fn bare(opcode: Opcode) -> Self {
        Self::new(opcode, Operand::NONE, Operand::NONE, Operand::NONE)
    }

    pub fn encode(&self) -> u64 {
        let mut word = (self.opcode as u64) << OPCODE_SHIFT;
        for (operand, shift) in [self.a, self.b, self.c].iter().zip(SLOT_SHIFTS) {
            word |= operand.pack() << shift;
        }
        word
    }

    pub fn decode(word: u64) -> Result<Self, DecodeError> {
        let byte = ((word >> OPCODE_SHIFT) & OPCODE_MASK) as u8;
        let opcode = Opcode::from_u8(byte).ok_or(DecodeError::UnknownOpcode(byte))?;
        let [a, b, c] = SLOT_SHIFTS;
        Ok(Self {
            opcode,
            a: Operand::unpack((word >> a) & SLOT_MASK)?,
            b: Operand::unpack((word >> b) & SLOT_MASK)?,
            c: Operand::unpack((word >> c) & SLOT_MASK)?,
        })
    }

    /// Rewrite the address of operand `slot` (0 = A) inside an encoded word.
    pub fn patch_address(word: u64, slot: usize, address: i64) -> CompileResult<u64> {
        if !(ADDRESS_MIN..=ADDRESS_MAX).contains(&address) {
            return Err(CompileError::address_overflow("jump offset", address, ADDRESS_BITS));
        }
        let shift = SLOT_SHIFTS[slot];
        let cleared = word & !(ADDRESS_MASK << shift);
        Ok(cleared | ((address as i16 as u16 as u64) << shift))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<10} {}, {}, {}", self.opcode.name(), self.a, self.b, self.c)
    }
}
