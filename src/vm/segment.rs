//! Code and data segments produced by the compiler.
//!
//! Both segments only grow across incremental compilations, so offsets
//! computed for earlier statements stay valid.

use std::collections::HashMap;
use std::rc::Rc;

use crate::runtime::Value;

use super::compiler::CompileResult;
use super::instruction::{DecodeError, Instruction};

/// Linear sequence of encoded instruction words.
#[derive(Debug, Clone, Default)]
pub struct CodeSegment {
    words: Vec<u64>,
}

impl CodeSegment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap already encoded words.
    pub fn from_words(words: Vec<u64>) -> Self {
        Self { words }
    }

    /// Append an instruction and return its offset.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let offset = self.words.len();
        self.words.push(instruction.encode());
        offset
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Drop everything emitted at or after `len`.
    pub fn truncate(&mut self, len: usize) {
        self.words.truncate(len);
    }

    pub fn word(&self, ip: usize) -> Option<u64> {
        self.words.get(ip).copied()
    }

    /// Decode the instruction at `ip`, if there is one.
    pub fn fetch(&self, ip: usize) -> Option<Result<Instruction, DecodeError>> {
        self.word(ip).map(Instruction::decode)
    }

    /// Overwrite the address of operand `slot` of the instruction at `offset`.
    pub fn patch_address(&mut self, offset: usize, slot: usize, address: i64) -> CompileResult<()> {
        self.words[offset] = Instruction::patch_address(self.words[offset], slot, address)?;
        Ok(())
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }
}

/// Identity of a shareable constant. Floats compare by bit pattern so that
/// `0.0` and `-0.0` stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    Nil,
    Int(i64),
    Float(u64),
    Bool(bool),
    String(Rc<str>),
}

impl ConstantKey {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Nil => Some(Self::Nil),
            Value::Int(n) => Some(Self::Int(*n)),
            Value::Float(n) => Some(Self::Float(n.to_bits())),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::String(s) => Some(Self::String(Rc::clone(s))),
            _ => None,
        }
    }
}

/// Constant pool. Also holds global variable names.
#[derive(Debug, Clone)]
pub struct DataSegment {
    constants: Vec<Value>,
    shared: HashMap<ConstantKey, usize, ahash::RandomState>,
}

impl DataSegment {
    pub fn new() -> Self {
        Self {
            constants: Vec::new(),
            shared: HashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Add a constant and return its index. Scalars and strings are shared.
    pub fn add(&mut self, value: Value) -> usize {
        let Some(key) = ConstantKey::of(&value) else {
            return self.push(value);
        };
        if let Some(&index) = self.shared.get(&key) {
            return index;
        }
        let index = self.push(value);
        self.shared.insert(key, index);
        index
    }

    pub fn add_string(&mut self, s: &str) -> usize {
        self.add(Value::string(s))
    }

    fn push(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.constants.get(index)
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }
}

impl Default for DataSegment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::instruction::{Opcode, Operand};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_constants_are_deduplicated() {
        let mut data = DataSegment::new();
        let a = data.add_string("x");
        let nil = data.add(Value::Nil);
        let one = data.add(Value::Int(1));
        let half = data.add(Value::Float(0.5));
        let yes = data.add(Value::Bool(true));
        assert_eq!(data.add_string("x"), a);
        assert_eq!(data.add(Value::Nil), nil);
        assert_eq!(data.add(Value::Int(1)), one);
        assert_eq!(data.add(Value::Float(0.5)), half);
        assert_eq!(data.add(Value::Bool(true)), yes);
        assert_eq!(data.len(), 5);
        assert_eq!(data.get(a), Some(&Value::from("x")));
    }

    #[test]
    fn test_float_constants_compare_by_bits() {
        let mut data = DataSegment::new();
        let zero = data.add(Value::Float(0.0));
        assert_ne!(data.add(Value::Float(-0.0)), zero);
        assert_ne!(data.add(Value::Int(0)), zero);
        let nan = data.add(Value::Float(f64::NAN));
        assert_eq!(data.add(Value::Float(f64::NAN)), nan);
    }

    #[test]
    fn test_arrays_are_not_shared() {
        let mut data = DataSegment::new();
        let first = data.add(Value::from(vec![Value::Int(1)]));
        assert_ne!(data.add(Value::from(vec![Value::Int(1)])), first);
    }

    #[test]
    fn test_emit_and_patch() {
        let mut code = CodeSegment::new();
        let jump = code.emit(Instruction::new(
            Opcode::Jump,
            Operand::NONE,
            Operand::NONE,
            Operand::NONE,
        ));
        code.emit(Instruction::bare(Opcode::Pop));
        code.patch_address(jump, 0, (code.len() - jump - 1) as i64).unwrap();
        let patched = code.fetch(jump).unwrap().unwrap();
        assert_eq!(patched.a.address, 1);
        assert!(code.fetch(2).is_none());
        code.truncate(1);
        assert_eq!(code.len(), 1);
    }
}
