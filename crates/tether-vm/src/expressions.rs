//! Internal AST produced by [`crate::parse`] and walked by the evaluator.

use std::sync::Arc;

/// Expression with the 1-based source line it starts on.
#[derive(Debug, Clone)]
pub struct ExprLoc {
    pub line: u32,
    pub expr: Expr,
}

impl ExprLoc {
    #[must_use]
    pub fn new(line: u32, expr: Expr) -> Self {
        Self { line, expr }
    }
}

#[derive(Debug, Clone)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mult,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    Op {
        left: Box<ExprLoc>,
        op: Operator,
        right: Box<ExprLoc>,
    },
    Not(Box<ExprLoc>),
    UnaryMinus(Box<ExprLoc>),
    UnaryPlus(Box<ExprLoc>),
    And(Box<ExprLoc>, Box<ExprLoc>),
    Or(Box<ExprLoc>, Box<ExprLoc>),
    /// `left op0 c0 op1 c1 ...`, evaluated pairwise with short-circuit.
    Compare {
        left: Box<ExprLoc>,
        comparisons: Vec<(CmpOperator, ExprLoc)>,
    },
    Call {
        callable: Box<ExprLoc>,
        args: Vec<ExprLoc>,
        kwargs: Vec<(String, ExprLoc)>,
    },
    Attr {
        object: Box<ExprLoc>,
        attr: String,
    },
    Subscript {
        object: Box<ExprLoc>,
        index: Box<ExprLoc>,
    },
    List(Vec<ExprLoc>),
    Tuple(Vec<ExprLoc>),
    Dict(Vec<(ExprLoc, ExprLoc)>),
    Lambda(Arc<FunctionDef>),
    IfElse {
        test: Box<ExprLoc>,
        body: Box<ExprLoc>,
        orelse: Box<ExprLoc>,
    },
}

/// Left-hand side of an assignment or `for` loop.
#[derive(Debug, Clone)]
pub enum Target {
    Name(String),
    Attr { object: ExprLoc, attr: String },
    Subscript { object: ExprLoc, index: ExprLoc },
    Unpack(Vec<Target>),
}

/// A `def` or `lambda`, shared between every function object created from it.
#[derive(Debug)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    /// Default expressions for the trailing `defaults.len()` parameters.
    pub defaults: Vec<ExprLoc>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone)]
pub struct ExceptHandler {
    pub exc_type: Option<ExprLoc>,
    pub name: Option<String>,
    pub body: Vec<Node>,
}

/// Statement with the 1-based line it starts on.
#[derive(Debug, Clone)]
pub struct Node {
    pub line: u32,
    pub kind: NodeKind,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Expr(ExprLoc),
    Assign {
        targets: Vec<Target>,
        value: ExprLoc,
    },
    AugAssign {
        target: Target,
        op: Operator,
        value: ExprLoc,
    },
    Return(Option<ExprLoc>),
    If {
        test: ExprLoc,
        body: Vec<Node>,
        or_else: Vec<Node>,
    },
    While {
        test: ExprLoc,
        body: Vec<Node>,
    },
    For {
        target: Target,
        iter: ExprLoc,
        body: Vec<Node>,
    },
    Try {
        body: Vec<Node>,
        handlers: Vec<ExceptHandler>,
    },
    FunctionDef(Arc<FunctionDef>),
    Global(Vec<String>),
    Raise(Option<ExprLoc>),
    Assert {
        test: ExprLoc,
        msg: Option<ExprLoc>,
    },
    Break,
    Continue,
    Pass,
}
