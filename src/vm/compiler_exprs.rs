//! Expression lowering: nodes that produce a value without changing control
//! flow.

use crate::ast::{BinaryOp, Builtin, Literal, Node, Ref, UnaryOp};
use crate::error::CompileError;

use super::compiler::{CompileResult, Compiler};
use super::instruction::{Opcode, Operand, ADDRESS_MAX};

impl<'a> Compiler<'a> {
    pub(super) fn lower_literal(&mut self, literal: &Literal) -> CompileResult<Operand> {
        self.constant(Self::literal_value(literal))
    }

    /// Operand addressing a resolved variable. Globals are addressed by the
    /// data segment index of their name.
    pub(super) fn ref_operand(&mut self, reference: &Ref) -> CompileResult<Operand> {
        match reference {
            Ref::Local(slot) => Operand::local(*slot),
            Ref::Closure(slot) => Operand::closure(*slot),
            Ref::Global(name) => {
                let index = self.data.add_string(name);
                Operand::global(index)
            }
        }
    }

    pub(super) fn lower_assign(&mut self, target: &Ref, value: &Node) -> CompileResult<Operand> {
        let target = self.ref_operand(target)?;
        let value = self.lower(value, target)?;
        self.materialize(value, target)
    }

    pub(super) fn lower_unary(
        &mut self,
        operator: UnaryOp,
        operand: &Node,
        dest: Operand,
    ) -> CompileResult<Operand> {
        let operand = self.lower(operand, Operand::STACK)?;
        let opcode = match operator {
            UnaryOp::Negate => Opcode::Neg,
            UnaryOp::Not => Opcode::Not,
        };
        self.emit(opcode, dest, operand, Operand::NONE);
        Ok(dest)
    }

    pub(super) fn lower_binary(
        &mut self,
        left: &Node,
        operator: BinaryOp,
        right: &Node,
        dest: Operand,
    ) -> CompileResult<Operand> {
        // Left first: when both land on the stack the VM pops C before B.
        let left = self.lower(left, Operand::STACK)?;
        let left = self.pin(left, &[right])?;
        let right = self.lower(right, Operand::STACK)?;
        self.emit(binary_opcode(operator), dest, left, right);
        Ok(dest)
    }

    pub(super) fn lower_index(
        &mut self,
        target: &Node,
        index: &Node,
        dest: Operand,
    ) -> CompileResult<Operand> {
        let target = self.lower(target, Operand::STACK)?;
        let target = self.pin(target, &[index])?;
        let index = self.lower(index, Operand::STACK)?;
        self.emit(Opcode::Index, dest, target, index);
        Ok(dest)
    }

    pub(super) fn lower_slice(&mut self, target: &Node, from: &Node, to: &Node) -> CompileResult<Operand> {
        let target = self.lower(target, Operand::STACK)?;
        let target = self.pin(target, &[from, to])?;
        let from = self.lower(from, Operand::STACK)?;
        let from = self.pin(from, &[to])?;
        let to = self.lower(to, Operand::STACK)?;
        self.emit(Opcode::Slice, target, from, to);
        Ok(Operand::STACK)
    }

    pub(super) fn lower_len(&mut self, target: &Node, dest: Operand) -> CompileResult<Operand> {
        let target = self.lower(target, Operand::STACK)?;
        self.emit(Opcode::Len, dest, target, Operand::NONE);
        Ok(dest)
    }

    pub(super) fn lower_array(&mut self, elements: &[Node], dest: Operand) -> CompileResult<Operand> {
        let chunk_len = ADDRESS_MAX as usize;
        if elements.len() <= chunk_len {
            self.push_all(elements)?;
            let count = Operand::immediate(elements.len() as i64, "array length")?;
            self.emit(Opcode::MakeArray, dest, count, Operand::NONE);
            return Ok(dest);
        }
        // Longer than one count field: build pieces and concatenate them.
        for (position, chunk) in elements.chunks(chunk_len).enumerate() {
            self.push_all(chunk)?;
            let count = Operand::immediate(chunk.len() as i64, "array length")?;
            self.emit(Opcode::MakeArray, Operand::STACK, count, Operand::NONE);
            if position > 0 {
                self.emit(Opcode::Add, Operand::STACK, Operand::STACK, Operand::STACK);
            }
        }
        self.materialize(Operand::STACK, dest)
    }

    /// Evaluate `nodes` left to right onto the stack.
    pub(super) fn push_all(&mut self, nodes: &[Node]) -> CompileResult<()> {
        for node in nodes {
            let operand = self.lower(node, Operand::STACK)?;
            self.materialize(operand, Operand::STACK)?;
        }
        Ok(())
    }

    pub(super) fn lower_block(&mut self, nodes: &[Node], dest: Operand) -> CompileResult<Operand> {
        let Some((last, init)) = nodes.split_last() else {
            return self.nil();
        };
        for node in init {
            let operand = self.lower(node, Operand::STACK)?;
            self.discard(operand);
        }
        self.lower(last, dest)
    }

    pub(super) fn lower_builtin(
        &mut self,
        builtin: Builtin,
        args: &[Node],
        dest: Operand,
    ) -> CompileResult<Operand> {
        if args.len() != builtin.arity() {
            return Err(CompileError::BuiltinArity {
                name: builtin.name(),
                expected: builtin.arity(),
                got: args.len(),
            });
        }
        let arg = match args.first() {
            Some(arg) => self.lower(arg, Operand::STACK)?,
            None => Operand::NONE,
        };
        let opcode = match builtin {
            Builtin::ReadLine => Opcode::ReadLine,
            Builtin::Write => Opcode::Write,
            Builtin::Print => Opcode::Print,
            Builtin::ToInt => Opcode::ToInt,
            Builtin::ToFloat => Opcode::ToFloat,
            Builtin::ToStr => Opcode::ToStr,
            Builtin::Exit => {
                self.emit(Opcode::Exit, Operand::NONE, arg, Operand::NONE);
                return self.nil();
            }
        };
        self.emit(opcode, dest, arg, Operand::NONE);
        Ok(dest)
    }
}

pub(super) fn binary_opcode(operator: BinaryOp) -> Opcode {
    match operator {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Subtract => Opcode::Sub,
        BinaryOp::Multiply => Opcode::Mul,
        BinaryOp::Divide => Opcode::Div,
        BinaryOp::Modulo => Opcode::Mod,
        BinaryOp::Equal => Opcode::Eq,
        BinaryOp::NotEqual => Opcode::Ne,
        BinaryOp::Less => Opcode::Lt,
        BinaryOp::LessEqual => Opcode::Le,
        BinaryOp::Greater => Opcode::Gt,
        BinaryOp::GreaterEqual => Opcode::Ge,
        BinaryOp::And => Opcode::And,
        BinaryOp::Or => Opcode::Or,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::instruction::Instruction;
    use crate::vm::segment::{CodeSegment, DataSegment};
    use pretty_assertions::assert_eq;

    fn opcodes(node: &Node) -> Vec<Opcode> {
        let mut code = CodeSegment::new();
        let mut data = DataSegment::new();
        Compiler::new(&mut code, &mut data)
            .compile_statement(node)
            .unwrap();
        code.words()
            .iter()
            .map(|word| Instruction::decode(*word).unwrap().opcode)
            .collect()
    }

    #[test]
    fn test_nested_binary_goes_through_the_stack() {
        let node = Node::binary(
            Node::binary(Node::int(1), BinaryOp::Subtract, Node::int(2)),
            BinaryOp::Add,
            Node::local(0),
        );
        assert_eq!(opcodes(&node), vec![Opcode::Sub, Opcode::Add]);
    }

    #[test]
    fn test_block_pops_unused_results() {
        let node = Node::block(vec![
            Node::binary(Node::int(1), BinaryOp::Add, Node::int(2)),
            Node::local(0),
            Node::int(3),
        ]);
        assert_eq!(opcodes(&node), vec![Opcode::Add, Opcode::Pop, Opcode::Move]);
    }

    #[test]
    fn test_array_elements_are_pushed() {
        let node = Node::array(vec![Node::int(1), Node::local(0)]);
        assert_eq!(
            opcodes(&node),
            vec![Opcode::Move, Opcode::Move, Opcode::MakeArray]
        );
    }

    #[test]
    fn test_builtin_arity_is_checked() {
        let mut code = CodeSegment::new();
        let mut data = DataSegment::new();
        let node = Node::builtin(Builtin::Print, vec![]);
        assert_eq!(
            Compiler::new(&mut code, &mut data).compile_statement(&node),
            Err(CompileError::BuiltinArity {
                name: "print",
                expected: 1,
                got: 0
            })
        );
        assert!(code.is_empty());
    }

    #[test]
    fn test_variable_is_copied_before_a_call_on_the_right() {
        let node = Node::binary(
            Node::global("g"),
            BinaryOp::Add,
            Node::call(Node::global("f"), vec![]),
        );
        assert_eq!(opcodes(&node), vec![Opcode::Move, Opcode::Call, Opcode::Add]);
        let pure = Node::binary(Node::global("g"), BinaryOp::Add, Node::local(0));
        assert_eq!(opcodes(&pure), vec![Opcode::Add]);
    }

    #[test]
    fn test_slice_always_pushes() {
        let node = Node::assign(
            Ref::Local(0),
            Node::slice(Node::local(1), Node::int(0), Node::int(1)),
        );
        assert_eq!(opcodes(&node), vec![Opcode::Slice, Opcode::Move, Opcode::Move]);
    }
}
