//! Runtime values.

use std::fmt;
use std::rc::Rc;

use crate::error::LangError;

use super::memory::FrameRef;

/// A compiled function: entry point plus an optional captured frame.
pub struct Function {
    /// Code segment index of the first body instruction.
    pub entry: usize,
    /// Number of parameters.
    pub params: usize,
    /// Slots in the frame pushed for each call.
    pub frame_size: usize,
    /// Local frame of the defining scope, shared by reference.
    pub captured: Option<FrameRef>,
}

impl fmt::Debug for Function {
    // Captured frames can hold this function again, so they are not printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("entry", &self.entry)
            .field("params", &self.params)
            .field("frame_size", &self.frame_size)
            .field("captured", &self.captured.is_some())
            .finish()
    }
}

/// A runtime value. Scalars are stored inline, everything else behind `Rc`.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(Rc<str>),
    /// Immutable, index-0-based sequence.
    Array(Rc<[Value]>),
    /// Language-level error carrying its message.
    Error(Rc<str>),
    Function(Rc<Function>),
    Nil,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Error(_) => "error",
            Value::Function(_) => "function",
            Value::Nil => "nil",
        }
    }

    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(Rc::from(values))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_int(&self) -> i64 {
        match self {
            Value::Int(n) => *n,
            other => other.tag_mismatch("int"),
        }
    }

    pub fn as_float(&self) -> f64 {
        match self {
            Value::Float(n) => *n,
            other => other.tag_mismatch("float"),
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            other => other.tag_mismatch("bool"),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Value::String(s) => s,
            other => other.tag_mismatch("string"),
        }
    }

    pub fn as_array(&self) -> &[Value] {
        match self {
            Value::Array(values) => values,
            other => other.tag_mismatch("array"),
        }
    }

    pub fn as_error(&self) -> &str {
        match self {
            Value::Error(message) => message,
            other => other.tag_mismatch("error"),
        }
    }

    pub fn as_function(&self) -> &Rc<Function> {
        match self {
            Value::Function(function) => function,
            other => other.tag_mismatch("function"),
        }
    }

    /// Accessor misuse is a host bug, never a language-level condition.
    fn tag_mismatch(&self, expected: &str) -> ! {
        panic!("expected {} value, found {}", expected, self.type_name())
    }

    /// Language-level `==`: numbers compare after promotion, arrays
    /// element-wise, functions are never equal to anything.
    pub fn weak_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) => (*a as f64) == *b,
            (Value::Float(a), Value::Int(b)) => *a == (*b as f64),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.weak_eq(y))
            }
            (Value::Nil, Value::Nil) => true,
            _ => false,
        }
    }
}

/// Strict equality: same tag and same payload. All functions compare equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Function(_), Value::Function(_)) => true,
            (Value::Nil, Value::Nil) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{:?}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
            Value::Error(message) => write!(f, "error: {}", message),
            Value::Function(function) => write!(f, "<fn @{}>", function.entry),
            Value::Nil => write!(f, "nil"),
        }
    }
}

impl From<LangError> for Value {
    fn from(err: LangError) -> Self {
        Value::Error(Rc::from(err.to_string()))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::array(values)
    }
}
