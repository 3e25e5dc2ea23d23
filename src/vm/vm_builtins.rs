//! I/O and conversion opcodes.

use crate::error::{LangError, VmError};
use crate::runtime::{Memory, Value};

use super::instruction::Operand;
use super::segment::DataSegment;
use super::vm::Vm;

impl Vm {
    /// Store the next input line, or nil at end of input.
    pub(super) fn read_line(
        &mut self,
        dest: Operand,
        ip: usize,
        data: &DataSegment,
        memory: &mut Memory,
    ) -> Result<(), VmError> {
        let line = match self.console.read_line() {
            Some(line) => Value::string(&line),
            None => Value::Nil,
        };
        self.store(dest, line, ip, data, memory)
    }

    pub(super) fn write(
        &mut self,
        dest: Operand,
        value: Operand,
        newline: bool,
        ip: usize,
        data: &DataSegment,
        memory: &mut Memory,
    ) -> Result<(), VmError> {
        let value = self.fetch(value, ip, data, memory)?;
        let mut text = value.to_string();
        if newline {
            text.push('\n');
        }
        self.console.write(&text);
        self.store(dest, Value::Nil, ip, data, memory)
    }

    pub(super) fn to_int(value: &Value) -> Value {
        match value {
            Value::Int(_) | Value::Error(_) => value.clone(),
            Value::Float(n) => Value::Int(*n as i64),
            Value::String(s) => {
                let text = s.trim();
                match text.parse::<i64>() {
                    Ok(n) => Value::Int(n),
                    Err(_) => match text.parse::<f64>() {
                        Ok(n) if n.is_finite() => Value::Int(n as i64),
                        _ => LangError::Conversion(s.to_string()).into(),
                    },
                }
            }
            _ => LangError::UnaryType {
                op: "int",
                operand: value.type_name(),
            }
            .into(),
        }
    }

    pub(super) fn to_float(value: &Value) -> Value {
        match value {
            Value::Float(_) | Value::Error(_) => value.clone(),
            Value::Int(n) => Value::Float(*n as f64),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(n) => Value::Float(n),
                Err(_) => LangError::Conversion(s.to_string()).into(),
            },
            _ => LangError::UnaryType {
                op: "float",
                operand: value.type_name(),
            }
            .into(),
        }
    }

    /// Exit status for `exit`: ints as given, nil as success, anything else
    /// as failure.
    pub(super) fn exit_status(value: &Value) -> i64 {
        match value {
            Value::Int(code) => *code,
            Value::Nil => 0,
            _ => 1,
        }
    }
}
