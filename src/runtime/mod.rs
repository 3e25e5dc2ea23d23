//! Runtime model shared by the compiler and the VM.

pub mod memory;
pub mod ops;
pub mod value;

pub use memory::{Frame, FrameRef, Memory};
pub use value::{Function, Value};
