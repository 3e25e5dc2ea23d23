//! Error types for compilation and execution.
//!
//! Two classes of runtime failure exist. [`LangError`] describes language-level
//! errors, which never unwind: they become ordinary `Value::Error` values.
//! [`VmError`] describes fatal engine errors that abort the current program.

use thiserror::Error;

/// Bytecode compilation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("{what} {value} does not fit in a {bits}-bit address field")]
    AddressOverflow {
        what: &'static str,
        value: i64,
        bits: u32,
    },

    #[error("for loop binds {refs} variables but has {iters} iterators")]
    ForArity { refs: usize, iters: usize },

    #[error("builtin '{name}' takes {expected} arguments, got {got}")]
    BuiltinArity {
        name: &'static str,
        expected: usize,
        got: usize,
    },
}

impl CompileError {
    pub fn address_overflow(what: &'static str, value: i64, bits: u32) -> Self {
        Self::AddressOverflow { what, value, bits }
    }
}

/// Fatal engine errors. These indicate a broken compiler/VM invariant or a
/// program the VM refuses to continue, and are never visible as values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("unknown opcode {opcode} at {ip}")]
    UnknownOpcode { opcode: u8, ip: usize },

    #[error("unknown addressing mode {mode} at {ip}")]
    UnknownMode { mode: u8, ip: usize },

    #[error("operand stack underflow at {ip}")]
    StackUnderflow { ip: usize },

    #[error("operand stack overflow at {ip} (limit {limit})")]
    StackOverflow { ip: usize, limit: usize },

    #[error("frame stack underflow at {ip}")]
    FrameUnderflow { ip: usize },

    #[error("frame stack overflow at {ip} (limit {limit})")]
    FrameOverflow { ip: usize, limit: usize },

    #[error("slot {slot} out of range for a frame of {size} slots at {ip}")]
    SlotOutOfRange { slot: i32, size: usize, ip: usize },

    #[error("data segment index {index} out of range at {ip}")]
    DataOutOfRange { index: i32, ip: usize },

    #[error("global name at data index {index} is not a string at {ip}")]
    InvalidGlobalName { index: i32, ip: usize },

    #[error("operand is not writable at {ip}")]
    InvalidStoreTarget { ip: usize },

    #[error("jump target {target} out of range at {ip}")]
    JumpOutOfRange { target: i64, ip: usize },

    #[error("condition must be a bool, found {found} at {ip}")]
    NonBoolCondition { found: String, ip: usize },

    #[error("return outside of a function call at {ip}")]
    ReturnOutsideCall { ip: usize },

    #[error("context stack misuse at {ip}: {message}")]
    ContextMisuse { message: &'static str, ip: usize },

    #[error("context stack overflow at {ip} (limit {limit})")]
    ContextOverflow { ip: usize, limit: usize },
}

impl VmError {
    pub fn context_misuse(message: &'static str, ip: usize) -> Self {
        Self::ContextMisuse { message, ip }
    }

    /// The instruction pointer the error was raised at.
    pub fn ip(&self) -> usize {
        match self {
            Self::UnknownOpcode { ip, .. }
            | Self::UnknownMode { ip, .. }
            | Self::StackUnderflow { ip }
            | Self::StackOverflow { ip, .. }
            | Self::FrameUnderflow { ip }
            | Self::FrameOverflow { ip, .. }
            | Self::SlotOutOfRange { ip, .. }
            | Self::DataOutOfRange { ip, .. }
            | Self::InvalidGlobalName { ip, .. }
            | Self::InvalidStoreTarget { ip }
            | Self::JumpOutOfRange { ip, .. }
            | Self::NonBoolCondition { ip, .. }
            | Self::ReturnOutsideCall { ip }
            | Self::ContextMisuse { ip, .. }
            | Self::ContextOverflow { ip, .. } => *ip,
        }
    }
}

/// Language-level errors. The rendered message is the payload of the
/// resulting `Value::Error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LangError {
    #[error("type error: cannot apply '{op}' to {left} and {right}")]
    Type {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("type error: cannot apply '{op}' to {operand}")]
    UnaryType {
        op: &'static str,
        operand: &'static str,
    },

    #[error("invalid operator '{op}' for {operand}")]
    InvalidOperator {
        op: &'static str,
        operand: &'static str,
    },

    #[error("zero division")]
    ZeroDivision,

    #[error("index error: {index} out of range for length {length}")]
    Index { index: i64, length: usize },

    #[error("index error: slice {from}:{to} out of range for length {length}")]
    Slice { from: i64, to: i64, length: usize },

    #[error("undefined variable '{0}'")]
    UndefinedGlobal(String),

    #[error("wrong argument count: expected {expected}, got {got}")]
    Arity { expected: usize, got: usize },

    #[error("type error: {0} is not callable")]
    NotCallable(&'static str),

    #[error("conversion error: cannot convert '{0}' to a number")]
    Conversion(String),
}

/// A unified error type for embedders.
#[derive(Debug, Error)]
pub enum QuillError {
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] VmError),

    #[error("Invalid program: {0}")]
    Json(#[from] serde_json::Error),
}
