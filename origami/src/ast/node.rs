//! Expression and statement nodes

use super::{Arg, Ast, FunctionDecl, Lambda, Variable};
use crate::interp::{ClassStmt, InterfaceStmt};
use crate::types::Type;
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// AST node. Statements and expressions share one tree; a statement is an
/// expression evaluated for its effect.
#[derive(Debug, Clone, Serialize)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// `[a, b]`
    Array(Vec<Ast>),
    /// `{k: v}`, `[k => v]`, `[k: v]`
    Object(Vec<(Ast, Ast)>),

    Variable(Variable),
    /// Targets of `$a, $b = ...`
    VariableList(Vec<Variable>),
    This,
    /// Bare name: a VM constant at runtime, or the name itself.
    Ident(String),
    /// `const NAME = value;`
    Const {
        name: String,
        value: Box<Ast>,
    },

    Assign {
        target: Box<Ast>,
        op: AssignOp,
        value: Box<Ast>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Ast>,
        rhs: Box<Ast>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Ast>,
    },
    /// `++$x`, `$x--`
    IncDec {
        target: Box<Ast>,
        increment: bool,
        prefix: bool,
    },
    /// `c ? a : b`, and `c ?: b` when `then` is absent.
    Ternary {
        cond: Box<Ast>,
        then: Option<Box<Ast>>,
        otherwise: Box<Ast>,
    },
    NullCoalesce {
        lhs: Box<Ast>,
        rhs: Box<Ast>,
    },
    InstanceOf {
        value: Box<Ast>,
        class: String,
    },
    /// Structural check against an interface or class method set.
    Like {
        value: Box<Ast>,
        class: String,
    },
    Cast {
        ty: Type,
        value: Box<Ast>,
    },

    /// Call by name. `candidates` lists the namespace-qualified names to try
    /// in order before `name` itself.
    Call {
        name: String,
        candidates: Vec<String>,
        args: Vec<Arg>,
    },
    /// Call whatever the callee evaluates to.
    CallValue {
        callee: Box<Ast>,
        args: Vec<Arg>,
    },
    MethodCall {
        object: Box<Ast>,
        method: String,
        args: Vec<Arg>,
    },
    Property {
        object: Box<Ast>,
        name: String,
    },
    /// `a[i]`; `a[]` (append target) has no index.
    Index {
        object: Box<Ast>,
        index: Option<Box<Ast>>,
    },
    /// `a[x..y]` with either bound optional.
    Slice {
        object: Box<Ast>,
        start: Option<Box<Ast>>,
        end: Option<Box<Ast>>,
    },
    StaticCall {
        class: String,
        method: String,
        args: Vec<Arg>,
    },
    StaticProperty {
        class: String,
        name: String,
    },
    ParentCall {
        method: String,
        args: Vec<Arg>,
    },
    New {
        class: String,
        type_args: Vec<Type>,
        args: Vec<Arg>,
    },
    /// `User { name: "a" }`
    InitClass {
        class: String,
        fields: Vec<(String, Ast)>,
    },

    Lambda(Arc<Lambda>),
    FunctionDecl(Arc<FunctionDecl>),
    ClassDecl(#[serde(serialize_with = "class_name")] Arc<ClassStmt>),
    InterfaceDecl(#[serde(serialize_with = "interface_name")] Arc<InterfaceStmt>),

    Block(Vec<Ast>),
    Echo(Vec<Ast>),
    If {
        cond: Box<Ast>,
        then: Box<Ast>,
        elifs: Vec<(Ast, Ast)>,
        otherwise: Option<Box<Ast>>,
    },
    While {
        cond: Box<Ast>,
        body: Box<Ast>,
    },
    DoWhile {
        body: Box<Ast>,
        cond: Box<Ast>,
    },
    For {
        init: Vec<Ast>,
        cond: Option<Box<Ast>>,
        step: Vec<Ast>,
        body: Box<Ast>,
    },
    Foreach {
        iterable: Box<Ast>,
        key: Option<Variable>,
        value: Variable,
        body: Box<Ast>,
    },
    Switch {
        subject: Box<Ast>,
        cases: Vec<SwitchCase>,
    },
    Match {
        subject: Box<Ast>,
        arms: Vec<MatchArm>,
        default: Option<Box<Ast>>,
    },
    Try {
        body: Box<Ast>,
        catches: Vec<Catch>,
        finally: Option<Box<Ast>>,
    },
    Throw(Box<Ast>),
    Return(Option<Box<Ast>>),
    Returns(Vec<Ast>),
    Break,
    Continue,
    Spawn(Box<Ast>),
    /// `namespace A\B;` (no body) or `namespace A\B { ... }`.
    Namespace {
        name: String,
        body: Option<Vec<Ast>>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchCase {
    /// `None` for `default:`
    pub pattern: Option<Ast>,
    pub body: Vec<Ast>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchArm {
    pub patterns: Vec<Ast>,
    pub body: Ast,
}

#[derive(Debug, Clone, Serialize)]
pub struct Catch {
    pub class: String,
    pub var: Option<Variable>,
    pub body: Ast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

impl AssignOp {
    /// The binary operator a compound assignment applies.
    pub fn binary(self) -> Option<BinOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinOp::Add),
            AssignOp::Sub => Some(BinOp::Sub),
            AssignOp::Mul => Some(BinOp::Mul),
            AssignOp::Div => Some(BinOp::Div),
            AssignOp::Mod => Some(BinOp::Mod),
            AssignOp::Concat => Some(BinOp::Concat),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Concat => ".",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::StrictEq => "===",
            BinOp::StrictNe => "!==",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

fn class_name<S: Serializer>(class: &Arc<ClassStmt>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&class.name)
}

fn interface_name<S: Serializer>(iface: &Arc<InterfaceStmt>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&iface.name)
}
