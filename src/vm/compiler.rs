//! Resolved-tree to bytecode compiler.
//!
//! Single pass: each node is lowered once, appending to the shared code and
//! data segments. `lower` returns the operand where the node's value can be
//! read. Literals and variable references emit nothing and are addressed in
//! place; only nodes that compute something emit an instruction.

use tracing::trace;

use crate::ast::{Literal, Node};
use crate::error::CompileError;
use crate::runtime::Value;

use super::instruction::{Instruction, Mode, Opcode, Operand};
use super::segment::{CodeSegment, DataSegment};

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Operand slot that carries a jump offset or other patched address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A = 0,
    B = 1,
}

/// The compiler: lowers nodes into a code segment and a data segment owned by
/// the caller.
pub struct Compiler<'a> {
    pub(super) code: &'a mut CodeSegment,
    pub(super) data: &'a mut DataSegment,
}

impl<'a> Compiler<'a> {
    pub fn new(code: &'a mut CodeSegment, data: &'a mut DataSegment) -> Self {
        Self { code, data }
    }

    /// Compile one top-level statement and return its entry point. Running
    /// from there to the end of the code leaves the statement's value on the
    /// stack. On error nothing emitted for the statement is kept.
    pub fn compile_statement(&mut self, node: &Node) -> CompileResult<usize> {
        let start = self.code.len();
        let result = self
            .lower(node, Operand::STACK)
            .and_then(|operand| self.materialize(operand, Operand::STACK));
        match result {
            Ok(_) => Ok(start),
            Err(err) => {
                self.code.truncate(start);
                Err(err)
            }
        }
    }

    /// Lower `node`, preferring to deliver its value into `dest`. The
    /// returned operand says where the value actually is.
    pub(super) fn lower(&mut self, node: &Node, dest: Operand) -> CompileResult<Operand> {
        match node {
            Node::Literal(literal) => self.lower_literal(literal),
            Node::Ref(reference) => self.ref_operand(reference),
            Node::Assign { target, value } => self.lower_assign(target, value),
            Node::Unary { operator, operand } => self.lower_unary(*operator, operand, dest),
            Node::Binary {
                left,
                operator,
                right,
            } => self.lower_binary(left, *operator, right, dest),
            Node::Index { target, index } => self.lower_index(target, index, dest),
            Node::Slice { target, from, to } => self.lower_slice(target, from, to),
            Node::Len(target) => self.lower_len(target, dest),
            Node::Array(elements) => self.lower_array(elements, dest),
            Node::Block(nodes) => self.lower_block(nodes, dest),
            Node::If {
                condition,
                then_branch,
                else_branch,
            } => self.lower_if(condition, then_branch, else_branch.as_deref()),
            Node::While { condition, body } => self.lower_while(condition, body),
            Node::For {
                refs,
                iterators,
                body,
            } => self.lower_for(refs, iterators, body),
            Node::Yield(value) => self.lower_yield(value),
            Node::Function {
                params,
                frame_size,
                body,
            } => self.lower_function(*params, *frame_size, body),
            Node::Call { callee, args } => self.lower_call(callee, args),
            Node::Return(value) => self.lower_return(value),
            Node::Builtin { builtin, args } => self.lower_builtin(*builtin, args, dest),
        }
    }

    // --- Emission helpers ---

    pub(super) fn emit(&mut self, opcode: Opcode, a: Operand, b: Operand, c: Operand) -> usize {
        self.code.emit(Instruction::new(opcode, a, b, c))
    }

    pub(super) fn emit_bare(&mut self, opcode: Opcode) -> usize {
        self.code.emit(Instruction::bare(opcode))
    }

    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// Offset from the instruction after `from` to `to`.
    pub(super) fn relative(from: usize, to: usize) -> i64 {
        to as i64 - (from as i64 + 1)
    }

    /// Point the jump field of the instruction at `offset` to the current end
    /// of code.
    pub(super) fn patch_jump(&mut self, offset: usize, slot: Slot) -> CompileResult<()> {
        let target = self.code.len();
        let distance = Self::relative(offset, target);
        self.code.patch_address(offset, slot as usize, distance)?;
        trace!(offset, target, distance, "patched jump");
        Ok(())
    }

    /// Emit an unconditional jump back to `target`.
    pub(super) fn emit_loop(&mut self, target: usize) -> CompileResult<usize> {
        let distance = Self::relative(self.code.len(), target);
        let jump = Operand::immediate(distance, "jump offset")?;
        Ok(self.emit(Opcode::Jump, jump, Operand::NONE, Operand::NONE))
    }

    pub(super) fn constant(&mut self, value: Value) -> CompileResult<Operand> {
        let index = self.data.add(value);
        Operand::data(index)
    }

    pub(super) fn nil(&mut self) -> CompileResult<Operand> {
        self.constant(Value::Nil)
    }

    /// Make the value at `operand` available at `dest`.
    pub(super) fn materialize(&mut self, operand: Operand, dest: Operand) -> CompileResult<Operand> {
        if operand != dest {
            self.emit(Opcode::Move, dest, operand, Operand::NONE);
        }
        Ok(dest)
    }

    /// Keep left-to-right order for an operand that is read after `later`
    /// runs. A variable addressed in place is only read when the consuming
    /// instruction executes, so it is copied to the stack first whenever
    /// `later` emits code that could write it.
    pub(super) fn pin(&mut self, operand: Operand, later: &[&Node]) -> CompileResult<Operand> {
        let in_place = matches!(operand.mode, Mode::Local | Mode::Closure | Mode::Global);
        let emits_code = later
            .iter()
            .any(|node| !matches!(node, Node::Literal(_) | Node::Ref(_)));
        if in_place && emits_code {
            return self.materialize(operand, Operand::STACK);
        }
        Ok(operand)
    }

    /// Drop a value that nobody reads.
    pub(super) fn discard(&mut self, operand: Operand) {
        if operand.is_stack() {
            self.emit_bare(Opcode::Pop);
        }
    }

    pub(super) fn literal_value(literal: &Literal) -> Value {
        match literal {
            Literal::Int(n) => Value::Int(*n),
            Literal::Float(n) => Value::Float(*n),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::String(s) => Value::string(s),
            Literal::Nil => Value::Nil,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Ref};
    use pretty_assertions::assert_eq;

    fn compile(node: &Node) -> (CodeSegment, DataSegment) {
        let mut code = CodeSegment::new();
        let mut data = DataSegment::new();
        Compiler::new(&mut code, &mut data)
            .compile_statement(node)
            .unwrap();
        (code, data)
    }

    fn decoded(code: &CodeSegment) -> Vec<Instruction> {
        code.words()
            .iter()
            .map(|word| Instruction::decode(*word).unwrap())
            .collect()
    }

    #[test]
    fn test_literal_statement_is_a_single_move() {
        let (code, data) = compile(&Node::int(42));
        let instructions = decoded(&code);
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].opcode, Opcode::Move);
        assert_eq!(instructions[0].a, Operand::STACK);
        assert_eq!(instructions[0].b.mode, Mode::Data);
        assert_eq!(data.get(0), Some(&Value::Int(42)));
    }

    #[test]
    fn test_operands_are_addressed_in_place() {
        let node = Node::binary(Node::local(1), BinaryOp::Add, Node::int(2));
        let instructions = decoded(&compile(&node).0);
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].opcode, Opcode::Add);
        assert_eq!(instructions[0].a, Operand::STACK);
        assert_eq!(instructions[0].b, Operand::local(1).unwrap());
        assert_eq!(instructions[0].c, Operand::data(0).unwrap());
    }

    #[test]
    fn test_assignment_computes_into_its_target() {
        let node = Node::assign(
            Ref::Global("total".into()),
            Node::binary(Node::global("total"), BinaryOp::Multiply, Node::int(3)),
        );
        let (code, data) = compile(&node);
        let instructions = decoded(&code);
        let target = Operand::global(0).unwrap();
        assert_eq!(data.get(0), Some(&Value::from("total")));
        assert_eq!(instructions[0].opcode, Opcode::Mul);
        assert_eq!(instructions[0].a, target);
        assert_eq!(instructions[0].b, target);
        assert_eq!(instructions[1], Instruction::new(Opcode::Move, Operand::STACK, target, Operand::NONE));
        assert_eq!(instructions.len(), 2);
    }

    #[test]
    fn test_if_backpatches_forward_jumps() {
        let node = Node::if_else(Node::local(0), Node::int(1), Node::int(2));
        let instructions = decoded(&compile(&node).0);
        // jmpf, move 1, jmp, move 2
        assert_eq!(instructions[0].opcode, Opcode::JumpIfFalse);
        assert_eq!(instructions[0].a.address, 2);
        assert_eq!(instructions[2].opcode, Opcode::Jump);
        assert_eq!(instructions[2].a.address, 1);
        assert_eq!(instructions.len(), 4);
    }

    #[test]
    fn test_while_jumps_backwards() {
        let node = Node::while_loop(Node::local(0), Node::int(1));
        let instructions = decoded(&compile(&node).0);
        // move nil, jmpf, pop, move 1, jmp
        let back = &instructions[4];
        assert_eq!(back.opcode, Opcode::Jump);
        assert_eq!(back.a.address, -4);
        assert_eq!(instructions[1].a.address, 3);
    }

    #[test]
    fn test_failed_statement_is_rolled_back() {
        let mut code = CodeSegment::new();
        let mut data = DataSegment::new();
        let mut compiler = Compiler::new(&mut code, &mut data);
        compiler.compile_statement(&Node::int(1)).unwrap();
        let bad = Node::block(vec![
            Node::binary(Node::int(1), BinaryOp::Add, Node::int(2)),
            Node::for_loop(vec![Ref::Local(0)], vec![], Node::nil()),
        ]);
        assert_eq!(
            compiler.compile_statement(&bad),
            Err(CompileError::ForArity { refs: 1, iters: 0 })
        );
        assert_eq!(compiler.current_offset(), 1);
    }
}
