//! Incremental evaluation: one code segment, data segment and memory shared
//! by every statement of a program or REPL session.

use tracing::debug;

use crate::ast::Node;
use crate::config::VmConfig;
use crate::error::QuillError;
use crate::runtime::{Memory, Value};
use crate::vm::{disassemble, CodeSegment, Compiler, Console, DataSegment, Vm};

/// A long-lived evaluation session.
///
/// Each statement is compiled onto the end of the shared code segment and run
/// from its entry point, so functions and globals defined by earlier
/// statements stay usable.
pub struct Session {
    code: CodeSegment,
    data: DataSegment,
    memory: Memory,
    vm: Vm,
    exit_code: Option<i64>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            code: CodeSegment::new(),
            data: DataSegment::new(),
            memory: Memory::new(),
            vm: Vm::with_config(config),
            exit_code: None,
        }
    }

    pub fn with_console(mut self, console: impl Console + 'static) -> Self {
        self.vm = self.vm.with_console(console);
        self
    }

    /// Compile and run one top-level statement, returning its value.
    ///
    /// Once a statement has called `exit`, nothing further is evaluated and
    /// every later statement yields nil.
    pub fn eval(&mut self, node: &Node) -> Result<Value, QuillError> {
        if self.exit_code.is_some() {
            return Ok(Value::Nil);
        }
        let entry = Compiler::new(&mut self.code, &mut self.data).compile_statement(node)?;
        debug!(entry, size = self.code.len(), "evaluating statement");
        let value = self.vm.run(&self.code, &self.data, &mut self.memory, entry)?;
        self.exit_code = self.vm.exit_code();
        Ok(value)
    }

    /// Evaluate statements in order, one value per statement executed. Stops
    /// after a statement that exits.
    pub fn run_program(&mut self, program: &[Node]) -> Result<Vec<Value>, QuillError> {
        let mut values = Vec::with_capacity(program.len());
        for node in program {
            values.push(self.eval(node)?);
            if self.exit_code.is_some() {
                break;
            }
        }
        Ok(values)
    }

    /// Run a program handed over as a JSON array of resolved nodes.
    pub fn run_json(&mut self, source: &str) -> Result<Vec<Value>, QuillError> {
        let program: Vec<Node> = serde_json::from_str(source)?;
        self.run_program(&program)
    }

    pub fn global(&self, name: &str) -> Value {
        self.memory.global(name)
    }

    pub fn exit_code(&self) -> Option<i64> {
        self.exit_code
    }

    pub fn code(&self) -> &CodeSegment {
        &self.code
    }

    pub fn data(&self) -> &DataSegment {
        &self.data
    }

    /// Listing of everything compiled so far.
    pub fn disassemble(&self) -> String {
        disassemble(&self.code, &self.data)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Builtin, Ref};
    use crate::error::{CompileError, LangError, VmError};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_one_value_per_statement() {
        let program = vec![
            Node::assign(Ref::Global("x".into()), Node::int(2)),
            Node::binary(Node::global("x"), BinaryOp::Multiply, Node::int(3)),
            Node::global("y"),
        ];
        let values = Session::new().run_program(&program).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Int(2),
                Value::Int(6),
                LangError::UndefinedGlobal("y".into()).into(),
            ]
        );
    }

    #[test]
    fn test_functions_survive_across_statements() {
        let mut session = Session::new();
        let double = Node::function(1, 1, Node::binary(Node::local(0), BinaryOp::Add, Node::local(0)));
        session
            .eval(&Node::assign(Ref::Global("double".into()), double))
            .unwrap();
        let value = session
            .eval(&Node::call(Node::global("double"), vec![Node::int(21)]))
            .unwrap();
        assert_eq!(value, Value::Int(42));
        assert_eq!(session.global("double").type_name(), "function");
    }

    #[test]
    fn test_errors_do_not_poison_the_session() {
        let mut session = Session::new();
        let bad = Node::builtin(Builtin::ToStr, vec![]);
        assert!(matches!(
            session.eval(&bad),
            Err(QuillError::Compile(CompileError::BuiltinArity { .. }))
        ));
        let fatal = Node::while_loop(Node::int(1), Node::nil());
        assert!(matches!(
            session.eval(&fatal),
            Err(QuillError::Runtime(VmError::NonBoolCondition { .. }))
        ));
        assert_eq!(session.eval(&Node::int(5)).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_exit_stops_the_session() {
        let mut session = Session::new();
        let program = vec![
            Node::assign(Ref::Global("a".into()), Node::int(1)),
            Node::builtin(Builtin::Exit, vec![Node::int(3)]),
            Node::assign(Ref::Global("a".into()), Node::int(2)),
        ];
        let values = session.run_program(&program).unwrap();
        assert_eq!(values, vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(session.exit_code(), Some(3));
        assert_eq!(session.global("a"), Value::Int(1));
        assert_eq!(session.eval(&Node::int(9)).unwrap(), Value::Nil);
    }

    #[test]
    fn test_listing_covers_every_statement() {
        let mut session = Session::new();
        session
            .eval(&Node::assign(Ref::Global("x".into()), Node::string("hi")))
            .unwrap();
        session.eval(&Node::global("x")).unwrap();
        let listing = session.disassemble();
        assert_eq!(listing.lines().count(), session.code().len());
        assert!(listing.contains("global[0] = x"));
        assert!(listing.contains("\"hi\""));
    }

    #[test]
    fn test_run_json() {
        let source = r#"[
            {"Assign": {"target": {"Global": "n"}, "value": {"Literal": {"Int": 4}}}},
            {"Binary": {
                "left": {"Ref": {"Global": "n"}},
                "operator": "Multiply",
                "right": {"Literal": {"Float": 0.5}}
            }}
        ]"#;
        let values = Session::new().run_json(source).unwrap();
        assert_eq!(values, vec![Value::Int(4), Value::Float(2.0)]);
        assert!(matches!(
            Session::new().run_json("[{\"Nope\": 1}]"),
            Err(QuillError::Json(_))
        ));
    }
}
