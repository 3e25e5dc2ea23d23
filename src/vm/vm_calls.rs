//! Function creation, call dispatch and return.

use std::rc::Rc;

use tracing::debug;

use crate::error::{LangError, VmError};
use crate::runtime::{Frame, Function, Memory, Value};

use super::context::{discard_group, CallRecord};
use super::instruction::Operand;
use super::segment::{CodeSegment, DataSegment};
use super::vm::Vm;

impl Vm {
    /// Package the body at relative offset `entry` into a function value that
    /// captures the innermost frame by reference.
    pub(super) fn make_function(
        &mut self,
        entry: Operand,
        params: Operand,
        frame_size: Operand,
        ip: usize,
        code: &CodeSegment,
        memory: &Memory,
    ) -> Result<(), VmError> {
        let function = Function {
            entry: self.target(entry, ip, code)?,
            params: params.address.max(0) as usize,
            frame_size: frame_size.address.max(0) as usize,
            captured: memory.frame(0).cloned(),
        };
        self.push(Value::Function(Rc::new(function)), ip)
    }

    /// Call the value at `callee` with the top `argc` stack values.
    ///
    /// Calling something that is not a function, or with the wrong number of
    /// arguments, consumes the arguments and pushes an Error value.
    pub(super) fn call(
        &mut self,
        argc: Operand,
        callee: Operand,
        ip: usize,
        data: &DataSegment,
        memory: &mut Memory,
    ) -> Result<(), VmError> {
        let callee = self.fetch(callee, ip, data, memory)?;
        let argc = argc.address.max(0) as usize;
        let base = self
            .stack
            .len()
            .checked_sub(argc)
            .ok_or(VmError::StackUnderflow { ip })?;

        let function = match callee {
            Value::Function(function) if function.params == argc => function,
            Value::Function(function) => {
                let error = LangError::Arity {
                    expected: function.params,
                    got: argc,
                };
                return self.reject_call(base, error.into(), ip);
            }
            error @ Value::Error(_) => return self.reject_call(base, error, ip),
            other => return self.reject_call(base, LangError::NotCallable(other.type_name()).into(), ip),
        };

        if self.calls.len() >= self.config.max_call_depth {
            return Err(VmError::FrameOverflow {
                ip,
                limit: self.config.max_call_depth,
            });
        }

        let mut frame = Frame::new(function.frame_size.max(argc));
        for (slot, arg) in self.stack.drain(base..).enumerate() {
            frame.set(slot, arg);
        }

        let frame_depth = memory.frame_depth();
        if let Some(captured) = &function.captured {
            memory.push_frame(Rc::clone(captured));
        }
        memory.push_frame(frame.shared());

        self.calls.push(CallRecord {
            return_ip: self.ip,
            stack_base: base,
            frame_depth,
            loop_depth: self.loops.len(),
        });
        self.ip = function.entry;
        Ok(())
    }

    fn reject_call(&mut self, base: usize, result: Value, ip: usize) -> Result<(), VmError> {
        self.stack.truncate(base);
        self.push(result, ip)
    }

    /// Leave the current call. Producers spawned by loops inside the call are
    /// discarded, innermost loop first, without being resumed.
    ///
    /// A producer running its iterator expression has no call of its own; a
    /// return there leaves the call of the consumer that spawned it.
    pub(super) fn return_from_call(
        &mut self,
        value: Operand,
        ip: usize,
        data: &DataSegment,
        memory: &mut Memory,
    ) -> Result<(), VmError> {
        let value = self.fetch(value, ip, data, memory)?;
        let mut discarded = 0;
        while self.calls.is_empty() {
            discarded += self
                .abandon_producer(memory)
                .ok_or(VmError::ReturnOutsideCall { ip })?;
        }
        let record = self.calls.pop().ok_or(VmError::ReturnOutsideCall { ip })?;

        while self.loops.len() > record.loop_depth {
            if let Some(group) = self.loops.pop() {
                discarded += discard_group(group);
            }
        }
        if discarded > 0 {
            debug!(ip, discarded, "unwound producers on return");
        }

        if !memory.truncate_frames(record.frame_depth) {
            return Err(VmError::FrameUnderflow { ip });
        }
        self.stack.truncate(record.stack_base);
        self.push(value, ip)?;
        self.ip = record.return_ip;
        Ok(())
    }
}
