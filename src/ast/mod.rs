//! Resolved abstract syntax tree consumed by the bytecode compiler.

pub mod node;

pub use node::{BinaryOp, Builtin, Literal, Node, Ref, UnaryOp};
