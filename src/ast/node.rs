//! Resolved tree nodes.
//!
//! Every variable reference has already been classified by the resolver as a
//! frame-local slot, a closure slot, or a global name. The compiler trusts the
//! classification and never re-derives it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A node of the resolved tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Literal constant: 42, 1.5, true, "text", nil
    Literal(Literal),

    /// Variable read.
    Ref(Ref),

    /// Assignment; evaluates to the assigned value.
    Assign { target: Ref, value: Box<Node> },

    /// Unary operation: -x, !x
    Unary { operator: UnaryOp, operand: Box<Node> },

    /// Binary operation: a + b
    Binary {
        left: Box<Node>,
        operator: BinaryOp,
        right: Box<Node>,
    },

    /// Single index: a[i]
    Index { target: Box<Node>, index: Box<Node> },

    /// Range index: a[from:to]
    Slice {
        target: Box<Node>,
        from: Box<Node>,
        to: Box<Node>,
    },

    /// Length: len(a)
    Len(Box<Node>),

    /// Array literal: [a, b, c]
    Array(Vec<Node>),

    /// Statement sequence; evaluates to its last node, or nil when empty.
    Block(Vec<Node>),

    /// if cond { then } else { otherwise }
    If {
        condition: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Option<Box<Node>>,
    },

    /// while cond { body }
    While { condition: Box<Node>, body: Box<Node> },

    /// for r1, r2 <- it1, it2 { body }
    For {
        refs: Vec<Ref>,
        iterators: Vec<Node>,
        body: Box<Node>,
    },

    /// Hand one value to the consuming loop.
    Yield(Box<Node>),

    /// Function literal. `frame_size` counts every local of the body,
    /// parameters included.
    Function {
        params: usize,
        frame_size: usize,
        body: Box<Node>,
    },

    /// Function call: callee(args...)
    Call { callee: Box<Node>, args: Vec<Node> },

    /// return value
    Return(Box<Node>),

    /// Builtin primitive dispatched to a dedicated opcode.
    Builtin { builtin: Builtin, args: Vec<Node> },
}

/// A literal constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Nil,
}

/// A resolved variable reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ref {
    /// Slot in the innermost frame.
    Local(u16),
    /// Slot in the captured frame of the running function.
    Closure(u16),
    /// Global looked up by name at run time.
    Global(String),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "!",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// I/O and conversion primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Builtin {
    ReadLine,
    Write,
    Print,
    ToInt,
    ToFloat,
    ToStr,
    Exit,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::ReadLine => "read_line",
            Builtin::Write => "write",
            Builtin::Print => "print",
            Builtin::ToInt => "int",
            Builtin::ToFloat => "float",
            Builtin::ToStr => "str",
            Builtin::Exit => "exit",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Builtin::ReadLine => 0,
            _ => 1,
        }
    }
}

// Constructors for building resolved trees by hand.
impl Node {
    pub fn int(n: i64) -> Self {
        Node::Literal(Literal::Int(n))
    }

    pub fn float(n: f64) -> Self {
        Node::Literal(Literal::Float(n))
    }

    pub fn bool(b: bool) -> Self {
        Node::Literal(Literal::Bool(b))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Node::Literal(Literal::String(s.into()))
    }

    pub fn nil() -> Self {
        Node::Literal(Literal::Nil)
    }

    pub fn local(slot: u16) -> Self {
        Node::Ref(Ref::Local(slot))
    }

    pub fn closure(slot: u16) -> Self {
        Node::Ref(Ref::Closure(slot))
    }

    pub fn global(name: impl Into<String>) -> Self {
        Node::Ref(Ref::Global(name.into()))
    }

    pub fn assign(target: Ref, value: Node) -> Self {
        Node::Assign {
            target,
            value: Box::new(value),
        }
    }

    pub fn unary(operator: UnaryOp, operand: Node) -> Self {
        Node::Unary {
            operator,
            operand: Box::new(operand),
        }
    }

    pub fn binary(left: Node, operator: BinaryOp, right: Node) -> Self {
        Node::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    pub fn index(target: Node, index: Node) -> Self {
        Node::Index {
            target: Box::new(target),
            index: Box::new(index),
        }
    }

    pub fn slice(target: Node, from: Node, to: Node) -> Self {
        Node::Slice {
            target: Box::new(target),
            from: Box::new(from),
            to: Box::new(to),
        }
    }

    pub fn len(target: Node) -> Self {
        Node::Len(Box::new(target))
    }

    pub fn array(elements: Vec<Node>) -> Self {
        Node::Array(elements)
    }

    pub fn block(nodes: Vec<Node>) -> Self {
        Node::Block(nodes)
    }

    pub fn if_then(condition: Node, then_branch: Node) -> Self {
        Node::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: None,
        }
    }

    pub fn if_else(condition: Node, then_branch: Node, else_branch: Node) -> Self {
        Node::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Some(Box::new(else_branch)),
        }
    }

    pub fn while_loop(condition: Node, body: Node) -> Self {
        Node::While {
            condition: Box::new(condition),
            body: Box::new(body),
        }
    }

    pub fn for_loop(refs: Vec<Ref>, iterators: Vec<Node>, body: Node) -> Self {
        Node::For {
            refs,
            iterators,
            body: Box::new(body),
        }
    }

    pub fn yield_value(value: Node) -> Self {
        Node::Yield(Box::new(value))
    }

    pub fn function(params: usize, frame_size: usize, body: Node) -> Self {
        Node::Function {
            params,
            frame_size,
            body: Box::new(body),
        }
    }

    pub fn call(callee: Node, args: Vec<Node>) -> Self {
        Node::Call {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn ret(value: Node) -> Self {
        Node::Return(Box::new(value))
    }

    pub fn builtin(builtin: Builtin, args: Vec<Node>) -> Self {
        Node::Builtin { builtin, args }
    }
}
