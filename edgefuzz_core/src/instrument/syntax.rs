//! Control-flow tree consumed by the instrumentor.
//!
//! An external parser turns target source into this tree. Only the constructs that matter for
//! probe placement are distinguished; everything else is `Expr::Other`. All offsets are byte
//! offsets into the original source.
//!
//! ```json
//! [{"kind": "function", "body": {"open": 17, "stmts": [
//!     {"kind": "expr", "expr": {"kind": "var", "name": "x", "span": {"start": 18, "end": 20}}}
//! ]}}]
//! ```

use super::InstrumentError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A statement list whose entry can take a statement probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Offset where a statement may be inserted before the first statement, e.g. just past `{`.
    pub open: usize,
    #[serde(default)]
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElseIf {
    pub cond: Expr,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    /// `None` for `default`.
    #[serde(default)]
    pub test: Option<Expr>,
    pub body: Block,
}

/// `end` fields are the offset just past the construct, where its exit join is probed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stmt {
    Expr {
        expr: Expr,
    },
    Function {
        body: Block,
    },
    If {
        cond: Expr,
        then: Block,
        #[serde(default)]
        else_ifs: Vec<ElseIf>,
        #[serde(default)]
        otherwise: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
        end: usize,
    },
    DoWhile {
        body: Block,
        cond: Expr,
        end: usize,
    },
    For {
        #[serde(default)]
        init: Vec<Expr>,
        #[serde(default)]
        cond: Vec<Expr>,
        #[serde(default)]
        step: Vec<Expr>,
        body: Block,
        end: usize,
    },
    Foreach {
        subject: Expr,
        body: Block,
        end: usize,
    },
    Switch {
        subject: Expr,
        cases: Vec<Case>,
        end: usize,
    },
    Try {
        body: Block,
        #[serde(default)]
        catches: Vec<Block>,
        #[serde(default)]
        finally: Option<Block>,
    },
    Label {
        end: usize,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    Throw {
        value: Expr,
    },
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Var {
        name: String,
        span: Span,
    },
    Int {
        value: i64,
        span: Span,
    },
    And {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Or {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Coalesce {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    /// `cond ? then : otherwise`, or `cond ?: otherwise` when `then` is absent.
    Ternary {
        cond: Box<Expr>,
        #[serde(default)]
        then: Option<Box<Expr>>,
        otherwise: Box<Expr>,
        span: Span,
    },
    Yield {
        #[serde(default)]
        value: Option<Box<Expr>>,
        span: Span,
    },
    /// `match (subject) { ... }`. `arms` holds the result expression of each arm.
    Match {
        subject: Box<Expr>,
        arms: Vec<Expr>,
        span: Span,
    },
    Closure {
        body: Block,
        span: Span,
    },
    Other {
        #[serde(default)]
        children: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Var { span, .. }
            | Expr::Int { span, .. }
            | Expr::And { span, .. }
            | Expr::Or { span, .. }
            | Expr::Coalesce { span, .. }
            | Expr::Ternary { span, .. }
            | Expr::Yield { span, .. }
            | Expr::Match { span, .. }
            | Expr::Closure { span, .. }
            | Expr::Other { span, .. } => *span,
        }
    }
}

/// Parses a JSON-encoded statement list.
pub fn parse_tree(json: &str) -> Result<Vec<Stmt>, InstrumentError> {
    serde_json::from_str(json).map_err(|e| InstrumentError::Tree(e.to_string()))
}
