//! VM resource limits.

use std::env;
use std::str::FromStr;

/// Default operand stack limit per context.
pub const STACK_MAX: usize = 65536;
/// Default number of nested calls per context.
pub const CALL_DEPTH_MAX: usize = 1 << 16;
/// Default number of contexts suspended behind the active one.
pub const CONTEXT_DEPTH_MAX: usize = 1 << 16;

/// Limits and switches for one VM. Exceeding a limit is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    pub max_stack: usize,
    pub max_call_depth: usize,
    pub max_context_depth: usize,
    /// Log every executed instruction at trace level.
    pub trace_instructions: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_stack: STACK_MAX,
            max_call_depth: CALL_DEPTH_MAX,
            max_context_depth: CONTEXT_DEPTH_MAX,
            trace_instructions: false,
        }
    }
}

impl VmConfig {
    pub fn with_max_stack(mut self, max_stack: usize) -> Self {
        self.max_stack = max_stack;
        self
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    pub fn with_max_context_depth(mut self, max_context_depth: usize) -> Self {
        self.max_context_depth = max_context_depth;
        self
    }

    pub fn with_trace_instructions(mut self, trace_instructions: bool) -> Self {
        self.trace_instructions = trace_instructions;
        self
    }

    /// Defaults overridden by `QUILL_MAX_STACK`, `QUILL_MAX_CALL_DEPTH`,
    /// `QUILL_MAX_CONTEXT_DEPTH` and `QUILL_TRACE`. Unparsable values are
    /// ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_stack: parse(&lookup, "QUILL_MAX_STACK").unwrap_or(defaults.max_stack),
            max_call_depth: parse(&lookup, "QUILL_MAX_CALL_DEPTH").unwrap_or(defaults.max_call_depth),
            max_context_depth: parse(&lookup, "QUILL_MAX_CONTEXT_DEPTH")
                .unwrap_or(defaults.max_context_depth),
            trace_instructions: lookup("QUILL_TRACE")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
                .unwrap_or(defaults.trace_instructions),
        }
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
