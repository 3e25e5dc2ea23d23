//! Producer/consumer context switching for `for` loops.
//!
//! A `for` loop runs each iterator expression in a producer context of its
//! own. The consumer is parked on `consumers` while a producer runs; a yield
//! parks the producer in its slot of the consumer's innermost group and hands
//! the value over. A producer that reaches the end of its iterator expression
//! ends the loop.

use tracing::debug;

use crate::error::VmError;
use crate::runtime::{FrameRef, Memory};

use super::context::{discard, discard_group, Context, Pending};
use super::instruction::Operand;
use super::segment::{CodeSegment, DataSegment};
use super::vm::Vm;

impl Vm {
    /// Park the active context, leaving an empty one with `frames` installed.
    fn suspend(&mut self, memory: &mut Memory, frames: Vec<FrameRef>, pending: Option<Pending>) -> Context {
        Context {
            ip: self.ip,
            stack: std::mem::take(&mut self.stack),
            frames: memory.replace_frames(frames),
            calls: std::mem::take(&mut self.calls),
            loops: std::mem::take(&mut self.loops),
            pending,
        }
    }

    /// Make `context` the active one, returning what it was waiting for.
    fn activate(&mut self, memory: &mut Memory, mut context: Context) -> Option<Pending> {
        self.ip = context.ip;
        self.stack = std::mem::take(&mut context.stack);
        memory.replace_frames(std::mem::take(&mut context.frames));
        self.calls = std::mem::take(&mut context.calls);
        self.loops = std::mem::take(&mut context.loops);
        context.pending.take()
    }

    fn check_context_depth(&self, ip: usize) -> Result<(), VmError> {
        if self.consumers.len() >= self.config.max_context_depth {
            return Err(VmError::ContextOverflow {
                ip,
                limit: self.config.max_context_depth,
            });
        }
        Ok(())
    }

    /// Start a producer for the next iterator of the innermost loop. The
    /// producer begins at the following instruction and sees the consumer's
    /// local and closure frames by reference.
    pub(super) fn spawn(
        &mut self,
        continuation: Operand,
        exit: Operand,
        ip: usize,
        code: &CodeSegment,
        memory: &mut Memory,
    ) -> Result<(), VmError> {
        self.check_context_depth(ip)?;
        let continuation = self.target(continuation, ip, code)?;
        let on_drop = self.target(exit, ip, code)?;
        let group = self
            .loops
            .last_mut()
            .ok_or(VmError::context_misuse("spawn outside of a for loop", ip))?;
        let slot = group.len();
        group.push(None);

        let frames = memory.addressable_frames();
        let producer_ip = self.ip;
        self.ip = continuation;
        let consumer = self.suspend(memory, frames, Some(Pending { slot, on_drop }));
        self.consumers.push(consumer);
        self.ip = producer_ip;
        debug!(ip, slot, depth = self.consumers.len(), "spawned producer");
        Ok(())
    }

    /// Hand a value to the waiting consumer and park the producer.
    pub(super) fn yield_value(
        &mut self,
        value: Operand,
        ip: usize,
        data: &DataSegment,
        memory: &mut Memory,
    ) -> Result<(), VmError> {
        let value = self.fetch(value, ip, data, memory)?;
        let mut consumer = self
            .consumers
            .pop()
            .ok_or(VmError::context_misuse("yield outside of a producer", ip))?;
        let Some(pending) = consumer.pending.take() else {
            return Err(VmError::context_misuse("consumer is not waiting for a value", ip));
        };
        let producer = self.suspend(memory, Vec::new(), None);
        let slot = consumer
            .loops
            .last_mut()
            .and_then(|group| group.get_mut(pending.slot))
            .ok_or(VmError::context_misuse("consumer has no slot for its producer", ip))?;
        *slot = Some(producer);

        self.activate(memory, consumer);
        debug!(ip, slot = pending.slot, depth = self.consumers.len(), "yielded");
        self.push(value, ip)
    }

    /// Continue a parked producer of the innermost loop.
    pub(super) fn resume(
        &mut self,
        slot: Operand,
        exit: Operand,
        ip: usize,
        code: &CodeSegment,
        memory: &mut Memory,
    ) -> Result<(), VmError> {
        self.check_context_depth(ip)?;
        let on_drop = self.target(exit, ip, code)?;
        let slot = slot.address.max(0) as usize;
        let producer = self
            .loops
            .last_mut()
            .and_then(|group| group.get_mut(slot))
            .and_then(Option::take)
            .ok_or(VmError::context_misuse("no parked producer to resume", ip))?;

        let consumer = self.suspend(memory, Vec::new(), Some(Pending { slot, on_drop }));
        self.consumers.push(consumer);
        self.activate(memory, producer);
        debug!(ip, slot, depth = self.consumers.len(), "resumed producer");
        Ok(())
    }

    /// The running producer has no more values: drop it and leave the loop.
    pub(super) fn end_iteration(&mut self, ip: usize, memory: &mut Memory) -> Result<(), VmError> {
        let consumer = self
            .consumers
            .pop()
            .ok_or(VmError::context_misuse("producer finished without a consumer", ip))?;
        let producer = self.suspend(memory, Vec::new(), None);
        let Some(pending) = self.activate(memory, consumer) else {
            return Err(VmError::context_misuse("consumer is not waiting for a value", ip));
        };
        let discarded = discard(producer);
        self.ip = pending.on_drop;
        debug!(ip, slot = pending.slot, discarded, "producer dropped");
        Ok(())
    }

    /// Give control back to the consumer of the running producer, dropping
    /// the producer. Returns how many contexts were discarded, or `None` when
    /// nothing is suspended behind the active context.
    pub(super) fn abandon_producer(&mut self, memory: &mut Memory) -> Option<usize> {
        let consumer = self.consumers.pop()?;
        let producer = self.suspend(memory, Vec::new(), None);
        self.activate(memory, consumer);
        Some(discard(producer))
    }

    /// Close the innermost loop's group, discarding producers still parked.
    pub(super) fn close_group(&mut self, ip: usize) -> Result<(), VmError> {
        let group = self
            .loops
            .pop()
            .ok_or(VmError::context_misuse("no for loop to close", ip))?;
        let discarded = discard_group(group);
        if discarded > 0 {
            debug!(ip, discarded, "discarded parked producers");
        }
        Ok(())
    }
}
