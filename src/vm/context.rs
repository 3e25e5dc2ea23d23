//! Execution contexts for the producer/consumer protocol.
//!
//! A context is everything a suspended piece of code needs to continue:
//! instruction pointer, operand stack, frame stack, call records and the
//! producer groups of the `for` loops it is running. Suspended producers are
//! stored inside the group of the loop that consumes them, so nested and
//! recursive generators form a tree rather than sharing one slot.

use crate::runtime::{FrameRef, Value};

/// Bookkeeping for one active call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallRecord {
    /// Where the caller continues.
    pub return_ip: usize,
    /// Operand stack height to restore, arguments already removed.
    pub stack_base: usize,
    /// Frame stack height to restore.
    pub frame_depth: usize,
    /// Producer groups owned by the caller; newer ones are discarded on return.
    pub loop_depth: usize,
}

/// The producers of one `for` loop, indexed by iterator position. A slot is
/// empty while its producer runs or before it first yields.
pub type ProducerGroup = Vec<Option<Context>>;

/// What a suspended consumer is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
    /// Slot of its top group that the producer is parked in when it yields.
    pub slot: usize,
    /// Loop exit, taken when the producer runs dry.
    pub on_drop: usize,
}

/// A suspended execution context.
#[derive(Debug)]
pub struct Context {
    pub ip: usize,
    pub stack: Vec<Value>,
    pub frames: Vec<FrameRef>,
    pub calls: Vec<CallRecord>,
    pub loops: Vec<ProducerGroup>,
    /// Set on consumers; producers parked in a group have none.
    pub pending: Option<Pending>,
}

impl Context {
    /// Number of contexts in this subtree, itself included.
    pub fn size(&self) -> usize {
        let mut size = 0;
        let mut pending = vec![self];
        while let Some(context) = pending.pop() {
            size += 1;
            pending.extend(context.loops.iter().flatten().flatten());
        }
        size
    }

    /// Detach every producer suspended under this context.
    fn take_producers(&mut self) -> impl Iterator<Item = Context> {
        std::mem::take(&mut self.loops).into_iter().flatten().flatten()
    }
}

/// Suspended producers can nest as deep as recursive generators go, so the
/// tree is taken apart with a worklist instead of recursive drops.
impl Drop for Context {
    fn drop(&mut self) {
        let mut pending: Vec<Context> = self.take_producers().collect();
        while let Some(mut context) = pending.pop() {
            pending.extend(context.take_producers());
        }
    }
}

/// Drop a group's producers, newest first. Each producer takes its own
/// suspended loops with it.
pub fn discard_group(group: ProducerGroup) -> usize {
    group.into_iter().rev().flatten().map(discard).sum()
}

/// Drop a context and everything it suspended. Returns how many contexts
/// went away.
pub fn discard(context: Context) -> usize {
    let mut discarded = 0;
    let mut pending = vec![context];
    while let Some(mut context) = pending.pop() {
        discarded += 1;
        pending.extend(context.take_producers());
    }
    discarded
}
