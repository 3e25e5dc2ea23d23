//! Control flow lowering: conditionals, loops, functions and the producer
//! protocol behind `for`/`yield`.
//!
//! Every construct here leaves its result on the stack.

use crate::ast::{Node, Ref};
use crate::error::CompileError;

use super::compiler::{CompileResult, Compiler, Slot};
use super::instruction::{Opcode, Operand};

impl<'a> Compiler<'a> {
    pub(super) fn lower_if(
        &mut self,
        condition: &Node,
        then_branch: &Node,
        else_branch: Option<&Node>,
    ) -> CompileResult<Operand> {
        let condition = self.lower(condition, Operand::STACK)?;
        let skip_then = self.emit(Opcode::JumpIfFalse, Operand::NONE, condition, Operand::NONE);

        let value = self.lower(then_branch, Operand::STACK)?;
        self.materialize(value, Operand::STACK)?;
        let skip_else = self.emit_bare(Opcode::Jump);

        self.patch_jump(skip_then, Slot::A)?;
        let value = match else_branch {
            Some(branch) => self.lower(branch, Operand::STACK)?,
            None => self.nil()?,
        };
        self.materialize(value, Operand::STACK)?;
        self.patch_jump(skip_else, Slot::A)?;
        Ok(Operand::STACK)
    }

    /// ```text
    ///       move stack <- nil
    /// top:  <condition>
    ///       jmpf exit, cond
    ///       pop
    ///       <body> -> stack
    ///       jmp top
    /// exit:
    /// ```
    pub(super) fn lower_while(&mut self, condition: &Node, body: &Node) -> CompileResult<Operand> {
        let nil = self.nil()?;
        self.materialize(nil, Operand::STACK)?;

        let top = self.current_offset();
        let condition = self.lower(condition, Operand::STACK)?;
        let exit = self.emit(Opcode::JumpIfFalse, Operand::NONE, condition, Operand::NONE);
        self.emit_bare(Opcode::Pop);
        let value = self.lower(body, Operand::STACK)?;
        self.materialize(value, Operand::STACK)?;
        self.emit_loop(top)?;
        self.patch_jump(exit, Slot::A)?;
        Ok(Operand::STACK)
    }

    /// One producer per iterator, all advanced once per pass; the first one
    /// that runs dry ends the loop.
    ///
    /// ```text
    ///        move stack <- nil
    ///        iterbegin
    ///        spawn cont_i, exit        ; for each iterator i
    ///        <iterator_i>
    ///        enditer
    /// cont_i: move ref_i <- stack
    /// top:   pop
    ///        <body> -> stack
    ///        resume i, exit            ; for each iterator i
    ///        move ref_i <- stack
    ///        jmp top
    /// exit:  iterend
    /// ```
    pub(super) fn lower_for(&mut self, refs: &[Ref], iterators: &[Node], body: &Node) -> CompileResult<Operand> {
        if refs.len() != iterators.len() {
            return Err(CompileError::ForArity {
                refs: refs.len(),
                iters: iterators.len(),
            });
        }
        let targets = refs
            .iter()
            .map(|reference| self.ref_operand(reference))
            .collect::<CompileResult<Vec<_>>>()?;

        let nil = self.nil()?;
        self.materialize(nil, Operand::STACK)?;
        self.emit_bare(Opcode::IterBegin);

        let mut exits = Vec::with_capacity(iterators.len() * 2);
        for (iterator, target) in iterators.iter().zip(&targets) {
            let spawn = self.emit_bare(Opcode::Spawn);
            exits.push(spawn);
            let value = self.lower(iterator, Operand::STACK)?;
            self.discard(value);
            self.emit_bare(Opcode::EndIter);
            self.patch_jump(spawn, Slot::A)?;
            self.emit(Opcode::Move, *target, Operand::STACK, Operand::NONE);
        }

        let top = self.current_offset();
        self.emit_bare(Opcode::Pop);
        let value = self.lower(body, Operand::STACK)?;
        self.materialize(value, Operand::STACK)?;
        for (index, target) in targets.iter().enumerate() {
            let slot = Operand::immediate(index as i64, "producer slot")?;
            exits.push(self.emit(Opcode::Resume, slot, Operand::NONE, Operand::NONE));
            self.emit(Opcode::Move, *target, Operand::STACK, Operand::NONE);
        }
        self.emit_loop(top)?;

        for exit in exits {
            self.patch_jump(exit, Slot::B)?;
        }
        self.emit_bare(Opcode::IterEnd);
        Ok(Operand::STACK)
    }

    pub(super) fn lower_yield(&mut self, value: &Node) -> CompileResult<Operand> {
        let value = self.lower(value, Operand::STACK)?;
        self.emit(Opcode::Yield, Operand::NONE, value, Operand::NONE);
        self.nil()
    }

    /// The body is laid out inline behind a jump; `mkfunc` addresses it with
    /// a negative offset.
    pub(super) fn lower_function(
        &mut self,
        params: usize,
        frame_size: usize,
        body: &Node,
    ) -> CompileResult<Operand> {
        let skip = self.emit_bare(Opcode::Jump);
        let entry = self.current_offset();
        let value = self.lower(body, Operand::STACK)?;
        self.emit(Opcode::Return, Operand::NONE, value, Operand::NONE);
        self.patch_jump(skip, Slot::A)?;

        let at = self.current_offset();
        let entry = Operand::immediate(Self::relative(at, entry), "function entry offset")?;
        let params_operand = Operand::immediate(params as i64, "parameter count")?;
        let frame = Operand::immediate(frame_size.max(params) as i64, "frame size")?;
        self.emit(Opcode::MakeFunction, entry, params_operand, frame);
        Ok(Operand::STACK)
    }

    /// Arguments go on the stack left to right, then the callee.
    pub(super) fn lower_call(&mut self, callee: &Node, args: &[Node]) -> CompileResult<Operand> {
        self.push_all(args)?;
        let callee = self.lower(callee, Operand::STACK)?;
        let argc = Operand::immediate(args.len() as i64, "argument count")?;
        self.emit(Opcode::Call, argc, callee, Operand::NONE);
        Ok(Operand::STACK)
    }

    pub(super) fn lower_return(&mut self, value: &Node) -> CompileResult<Operand> {
        let value = self.lower(value, Operand::STACK)?;
        self.emit(Opcode::Return, Operand::NONE, value, Operand::NONE);
        self.nil()
    }
}
