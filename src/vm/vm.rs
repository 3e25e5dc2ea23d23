//! The bytecode virtual machine: fetch, decode, execute.

use tracing::trace;

use crate::ast::{BinaryOp, UnaryOp};
use crate::config::VmConfig;
use crate::error::VmError;
use crate::runtime::{ops, Memory, Value};

use super::console::{Console, StdConsole};
use super::context::{CallRecord, Context, ProducerGroup};
use super::instruction::{Instruction, Mode, Opcode, Operand};
use super::segment::{CodeSegment, DataSegment};

/// The bytecode VM.
///
/// Holds the active context; suspended consumers wait on `consumers`. Global
/// variables and the frame stack live in the [`Memory`] passed to [`Vm::run`].
pub struct Vm {
    pub(super) config: VmConfig,
    pub(super) console: Box<dyn Console>,
    /// Instruction pointer of the active context.
    pub(super) ip: usize,
    /// Operand stack of the active context.
    pub(super) stack: Vec<Value>,
    /// Call records of the active context.
    pub(super) calls: Vec<CallRecord>,
    /// Producer groups of the `for` loops the active context is running.
    pub(super) loops: Vec<ProducerGroup>,
    /// Consumers waiting on the context above them, innermost last.
    pub(super) consumers: Vec<Context>,
    pub(super) exit_code: Option<i64>,
}

/// Outcome of executing one instruction.
pub(super) enum Flow {
    Continue,
    Exit(i64),
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            config,
            console: Box::new(StdConsole),
            ip: 0,
            stack: Vec::with_capacity(256),
            calls: Vec::new(),
            loops: Vec::new(),
            consumers: Vec::new(),
            exit_code: None,
        }
    }

    /// Replace the console used by the I/O opcodes.
    pub fn with_console(mut self, console: impl Console + 'static) -> Self {
        self.console = Box::new(console);
        self
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Exit code of the last run, if it stopped through `exit`.
    pub fn exit_code(&self) -> Option<i64> {
        self.exit_code
    }

    /// Execute from `start` until the code runs out. The result is the value
    /// on top of the stack, or nil when the stack is empty.
    pub fn run(
        &mut self,
        code: &CodeSegment,
        data: &DataSegment,
        memory: &mut Memory,
        start: usize,
    ) -> Result<Value, VmError> {
        self.reset(start);
        memory.clear_frames();
        let result = self.execute(code, data, memory);
        if result.is_err() {
            self.reset(code.len());
            memory.clear_frames();
        }
        result
    }

    fn reset(&mut self, ip: usize) {
        self.ip = ip;
        self.stack.clear();
        self.calls.clear();
        self.loops.clear();
        self.consumers.clear();
        self.exit_code = None;
    }

    fn execute(&mut self, code: &CodeSegment, data: &DataSegment, memory: &mut Memory) -> Result<Value, VmError> {
        loop {
            let ip = self.ip;
            let instruction = match code.fetch(ip) {
                Some(decoded) => decoded.map_err(|err| err.at(ip))?,
                None => return self.finish(ip),
            };
            if self.config.trace_instructions {
                trace!(ip, %instruction, depth = self.consumers.len(), "exec");
            }
            self.ip += 1;

            if let Flow::Exit(status) = self.step(instruction, ip, code, data, memory)? {
                self.exit_code = Some(status);
                return Ok(Value::Int(status));
            }
        }
    }

    fn finish(&mut self, ip: usize) -> Result<Value, VmError> {
        if !self.consumers.is_empty() {
            return Err(VmError::context_misuse("program ended inside a producer", ip));
        }
        Ok(self.stack.pop().unwrap_or(Value::Nil))
    }

    fn step(
        &mut self,
        instruction: Instruction,
        ip: usize,
        code: &CodeSegment,
        data: &DataSegment,
        memory: &mut Memory,
    ) -> Result<Flow, VmError> {
        let Instruction { opcode, a, b, c } = instruction;
        match opcode {
            Opcode::Move => {
                let value = self.fetch(b, ip, data, memory)?;
                self.store(a, value, ip, data, memory)?;
            }
            Opcode::Pop => {
                self.pop(ip)?;
            }

            // --- Unary ---
            Opcode::Neg | Opcode::Not | Opcode::Len => {
                let operand = self.fetch(b, ip, data, memory)?;
                let result = match opcode {
                    Opcode::Neg => ops::unary(UnaryOp::Negate, &operand),
                    Opcode::Not => ops::unary(UnaryOp::Not, &operand),
                    _ => ops::length(&operand),
                };
                self.store(a, result, ip, data, memory)?;
            }
            Opcode::ToInt | Opcode::ToFloat | Opcode::ToStr => {
                let operand = self.fetch(b, ip, data, memory)?;
                let result = match opcode {
                    Opcode::ToInt => Self::to_int(&operand),
                    Opcode::ToFloat => Self::to_float(&operand),
                    _ => Value::string(&operand.to_string()),
                };
                self.store(a, result, ip, data, memory)?;
            }

            // --- Binary: C is fetched before B ---
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Eq
            | Opcode::Ne
            | Opcode::Lt
            | Opcode::Le
            | Opcode::Gt
            | Opcode::Ge
            | Opcode::And
            | Opcode::Or
            | Opcode::Index => {
                let right = self.fetch(c, ip, data, memory)?;
                let left = self.fetch(b, ip, data, memory)?;
                let result = match binary_operator(opcode) {
                    Some(operator) => ops::binary(operator, &left, &right),
                    None => ops::index(&left, &right),
                };
                self.store(a, result, ip, data, memory)?;
            }
            Opcode::Slice => {
                let to = self.fetch(c, ip, data, memory)?;
                let from = self.fetch(b, ip, data, memory)?;
                let target = self.fetch(a, ip, data, memory)?;
                self.push(ops::slice(&target, &from, &to), ip)?;
            }
            Opcode::MakeArray => {
                let count = b.address as usize;
                let start = self
                    .stack
                    .len()
                    .checked_sub(count)
                    .ok_or(VmError::StackUnderflow { ip })?;
                let elements: Vec<Value> = self.stack.drain(start..).collect();
                self.store(a, Value::array(elements), ip, data, memory)?;
            }

            // --- Control flow ---
            Opcode::Jump => {
                self.ip = self.target(a, ip, code)?;
            }
            Opcode::JumpIfFalse => match self.fetch(b, ip, data, memory)? {
                Value::Bool(false) => self.ip = self.target(a, ip, code)?,
                Value::Bool(true) => {}
                other => {
                    return Err(VmError::NonBoolCondition {
                        found: other.type_name().to_string(),
                        ip,
                    })
                }
            },

            // --- Functions ---
            Opcode::MakeFunction => self.make_function(a, b, c, ip, code, memory)?,
            Opcode::Call => self.call(a, b, ip, data, memory)?,
            Opcode::Return => self.return_from_call(b, ip, data, memory)?,

            // --- Producers ---
            Opcode::IterBegin => self.loops.push(Vec::new()),
            Opcode::Spawn => self.spawn(a, b, ip, code, memory)?,
            Opcode::EndIter => self.end_iteration(ip, memory)?,
            Opcode::Resume => self.resume(a, b, ip, code, memory)?,
            Opcode::Yield => self.yield_value(b, ip, data, memory)?,
            Opcode::IterEnd => self.close_group(ip)?,

            // --- I/O ---
            Opcode::ReadLine => self.read_line(a, ip, data, memory)?,
            Opcode::Write | Opcode::Print => {
                self.write(a, b, opcode == Opcode::Print, ip, data, memory)?
            }
            Opcode::Exit => {
                let status = self.fetch(b, ip, data, memory)?;
                return Ok(Flow::Exit(Self::exit_status(&status)));
            }
        }
        Ok(Flow::Continue)
    }

    // --- Operands ---

    /// Read an operand. Stack operands are popped.
    pub(super) fn fetch(
        &mut self,
        operand: Operand,
        ip: usize,
        data: &DataSegment,
        memory: &Memory,
    ) -> Result<Value, VmError> {
        match operand.mode {
            Mode::Immediate => Ok(Value::Int(operand.address as i64)),
            Mode::Global => {
                let name = Self::global_name(operand, ip, data)?;
                Ok(memory.global(name))
            }
            Mode::Local | Mode::Closure => {
                let frame = memory
                    .frame(frame_depth(operand.mode))
                    .ok_or(VmError::FrameUnderflow { ip })?;
                let frame = frame.borrow();
                let value = usize::try_from(operand.address)
                    .ok()
                    .and_then(|slot| frame.get(slot))
                    .cloned();
                value.ok_or(VmError::SlotOutOfRange {
                    slot: operand.address,
                    size: frame.len(),
                    ip,
                })
            }
            Mode::Stack => self.pop(ip),
            Mode::Data => usize::try_from(operand.address)
                .ok()
                .and_then(|index| data.get(index))
                .cloned()
                .ok_or(VmError::DataOutOfRange {
                    index: operand.address,
                    ip,
                }),
        }
    }

    /// Write a value to an operand. Stack operands are pushed.
    pub(super) fn store(
        &mut self,
        operand: Operand,
        value: Value,
        ip: usize,
        data: &DataSegment,
        memory: &mut Memory,
    ) -> Result<(), VmError> {
        match operand.mode {
            Mode::Stack => self.push(value, ip),
            Mode::Global => {
                let name = Self::global_name(operand, ip, data)?;
                memory.set_global(name, value);
                Ok(())
            }
            Mode::Local | Mode::Closure => {
                let frame = memory
                    .frame(frame_depth(operand.mode))
                    .ok_or(VmError::FrameUnderflow { ip })?;
                let mut frame = frame.borrow_mut();
                let stored = usize::try_from(operand.address)
                    .map(|slot| frame.set(slot, value))
                    .unwrap_or(false);
                if stored {
                    Ok(())
                } else {
                    Err(VmError::SlotOutOfRange {
                        slot: operand.address,
                        size: frame.len(),
                        ip,
                    })
                }
            }
            Mode::Immediate | Mode::Data => Err(VmError::InvalidStoreTarget { ip }),
        }
    }

    fn global_name<'d>(operand: Operand, ip: usize, data: &'d DataSegment) -> Result<&'d str, VmError> {
        let index = operand.address;
        match usize::try_from(index).ok().and_then(|i| data.get(i)) {
            Some(Value::String(name)) => Ok(name),
            Some(_) => Err(VmError::InvalidGlobalName { index, ip }),
            None => Err(VmError::DataOutOfRange { index, ip }),
        }
    }

    /// Absolute target of a relative offset, measured from the instruction
    /// after `ip`.
    pub(super) fn target(&self, operand: Operand, ip: usize, code: &CodeSegment) -> Result<usize, VmError> {
        let target = ip as i64 + 1 + operand.address as i64;
        if target < 0 || target as usize > code.len() {
            return Err(VmError::JumpOutOfRange { target, ip });
        }
        Ok(target as usize)
    }

    // --- Stack ---

    pub(super) fn push(&mut self, value: Value, ip: usize) -> Result<(), VmError> {
        if self.stack.len() >= self.config.max_stack {
            return Err(VmError::StackOverflow {
                ip,
                limit: self.config.max_stack,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    pub(super) fn pop(&mut self, ip: usize) -> Result<Value, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow { ip })
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn frame_depth(mode: Mode) -> usize {
    match mode {
        Mode::Closure => 1,
        _ => 0,
    }
}

fn binary_operator(opcode: Opcode) -> Option<BinaryOp> {
    Some(match opcode {
        Opcode::Add => BinaryOp::Add,
        Opcode::Sub => BinaryOp::Subtract,
        Opcode::Mul => BinaryOp::Multiply,
        Opcode::Div => BinaryOp::Divide,
        Opcode::Mod => BinaryOp::Modulo,
        Opcode::Eq => BinaryOp::Equal,
        Opcode::Ne => BinaryOp::NotEqual,
        Opcode::Lt => BinaryOp::Less,
        Opcode::Le => BinaryOp::LessEqual,
        Opcode::Gt => BinaryOp::Greater,
        Opcode::Ge => BinaryOp::GreaterEqual,
        Opcode::And => BinaryOp::And,
        Opcode::Or => BinaryOp::Or,
        _ => return None,
    })
}
