//! Variable storage: the global namespace and the frame stack.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::LangError;

use super::value::Value;

/// A fixed-length array of local slots, sized by the compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    slots: Vec<Value>,
}

/// Frames are shared between a call and any closure created inside it.
pub type FrameRef = Rc<RefCell<Frame>>;

impl Frame {
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![Value::Nil; size],
        }
    }

    /// Wrap a frame for sharing.
    pub fn shared(self) -> FrameRef {
        Rc::new(RefCell::new(self))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&Value> {
        self.slots.get(slot)
    }

    /// Store into a slot. Returns false when the slot does not exist.
    pub fn set(&mut self, slot: usize, value: Value) -> bool {
        match self.slots.get_mut(slot) {
            Some(target) => {
                *target = value;
                true
            }
            None => false,
        }
    }
}

/// Global namespace plus the active frame stack.
pub struct Memory {
    /// Globals in definition order.
    globals: IndexMap<String, Value, ahash::RandomState>,
    /// The active call chain, innermost frame last.
    frames: Vec<FrameRef>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            globals: IndexMap::with_hasher(ahash::RandomState::new()),
            frames: Vec::new(),
        }
    }

    /// Read a global. An undefined name reads as a language-level Error.
    pub fn global(&self, name: &str) -> Value {
        match self.globals.get(name) {
            Some(value) => value.clone(),
            None => LangError::UndefinedGlobal(name.to_string()).into(),
        }
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        match self.globals.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    pub fn globals(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.globals.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Frame `depth` levels below the top: 0 is the innermost frame,
    /// 1 the closure frame.
    pub fn frame(&self, depth: usize) -> Option<&FrameRef> {
        self.frames.len().checked_sub(depth + 1).map(|i| &self.frames[i])
    }

    pub fn push_frame(&mut self, frame: FrameRef) {
        self.frames.push(frame);
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Pop frames down to `depth`. Returns false if fewer frames exist.
    pub fn truncate_frames(&mut self, depth: usize) -> bool {
        if depth > self.frames.len() {
            return false;
        }
        self.frames.truncate(depth);
        true
    }

    /// The two addressable frames (closure, locals), shared by reference.
    pub fn addressable_frames(&self) -> Vec<FrameRef> {
        let start = self.frames.len().saturating_sub(2);
        self.frames[start..].to_vec()
    }

    /// Install a different frame stack, returning the previous one.
    pub fn replace_frames(&mut self, frames: Vec<FrameRef>) -> Vec<FrameRef> {
        std::mem::replace(&mut self.frames, frames)
    }

    pub fn clear_frames(&mut self) {
        self.frames.clear();
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_undefined_global_is_an_error_value() {
        let memory = Memory::new();
        assert_eq!(
            memory.global("missing"),
            Value::from(LangError::UndefinedGlobal("missing".into()))
        );
    }

    #[test]
    fn test_globals_keep_definition_order() {
        let mut memory = Memory::new();
        memory.set_global("b", Value::Int(1));
        memory.set_global("a", Value::Int(2));
        memory.set_global("b", Value::Int(3));
        let names: Vec<_> = memory.globals().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(memory.global("b"), Value::Int(3));
    }

    #[test]
    fn test_frame_depth_addressing() {
        let mut memory = Memory::new();
        assert!(memory.frame(0).is_none());
        memory.push_frame(Frame::new(1).shared());
        memory.push_frame(Frame::new(3).shared());
        assert_eq!(memory.frame(0).map(|f| f.borrow().len()), Some(3));
        assert_eq!(memory.frame(1).map(|f| f.borrow().len()), Some(1));
        assert!(memory.frame(2).is_none());
        assert!(!memory.truncate_frames(5));
        assert!(memory.truncate_frames(1));
        assert_eq!(memory.frame_depth(), 1);
    }

    #[test]
    fn test_addressable_frames_share_storage() {
        let mut memory = Memory::new();
        for size in [1, 2, 3] {
            memory.push_frame(Frame::new(size).shared());
        }
        let shared = memory.addressable_frames();
        assert_eq!(shared.len(), 2);
        assert!(shared[1].borrow_mut().set(0, Value::Int(7)));
        assert_eq!(memory.frame(0).and_then(|f| f.borrow().get(0).cloned()), Some(Value::Int(7)));
        assert!(!shared[1].borrow_mut().set(3, Value::Nil));
    }
}
