//! Owned intermediate representation of executable code.
//!
//! The oxc AST lives in a parse arena; closures created at run time must
//! outlive it, so executable text is lowered into these owned nodes first.

use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    TypeOf,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
    Logical(LogicalOp),
}

#[derive(Debug, Clone)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
}

#[derive(Debug, Clone)]
pub enum MemberKey {
    Static(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum ArrayItem {
    Item(Expr),
    Spread(Expr),
    Hole,
}

#[derive(Debug, Clone)]
pub enum PropItem {
    Init(String, Expr),
    Computed(Expr, Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum Target {
    Ident(String),
    Member { object: Box<Expr>, key: MemberKey },
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    Template {
        quasis: Vec<String>,
        exprs: Vec<Expr>,
    },
    Ident(String),
    Array(Vec<ArrayItem>),
    Object(Vec<PropItem>),
    Function(Rc<FunctionDef>),
    Member {
        object: Box<Expr>,
        key: MemberKey,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<ArrayItem>,
        optional: bool,
    },
    /// `new Callee(...)`; only native constructors accept it.
    New {
        callee: Box<Expr>,
        args: Vec<ArrayItem>,
    },
    /// `eval(text)` evaluated in the caller's environment.
    DirectEval(Vec<ArrayItem>),
    /// Boundary of an optional chain; short-circuits to `undefined`.
    Chain(Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign {
        op: AssignOp,
        target: Target,
        value: Box<Expr>,
    },
    Update {
        increment: bool,
        prefix: bool,
        target: Target,
    },
    Sequence(Vec<Expr>),
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Ident(String),
    Object {
        props: Vec<(MemberKey, Pattern)>,
        rest: Option<Box<Pattern>>,
    },
    Array {
        elements: Vec<Option<Pattern>>,
        rest: Option<Box<Pattern>>,
    },
    Default(Box<Pattern>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Const,
    Let,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    Declare {
        kind: DeclKind,
        decls: Vec<(Pattern, Option<Expr>)>,
    },
    Function(String, Rc<FunctionDef>),
    Return(Option<Expr>),
    If(Expr, Box<Stmt>, Option<Box<Stmt>>),
    Block(Vec<Stmt>),
    While(Expr, Box<Stmt>),
    DoWhile(Box<Stmt>, Expr),
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForOf {
        kind: DeclKind,
        pattern: Pattern,
        iterable: Expr,
        body: Box<Stmt>,
    },
    ForIn {
        kind: DeclKind,
        pattern: Pattern,
        object: Expr,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        param: Option<Pattern>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Empty,
}

#[derive(Debug)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<Pattern>,
    pub body: Vec<Stmt>,
    /// Return the final expression statement's value when nothing is returned.
    pub completion: bool,
}

#[derive(Debug, Clone)]
pub struct ImportBinding {
    pub local: String,
    /// `None` binds the whole module namespace.
    pub imported: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub source: String,
    pub bindings: Vec<ImportBinding>,
}

/// A lowered module: hoisted imports, top-level body and the default export.
#[derive(Debug)]
pub struct Module {
    pub imports: Vec<ImportDecl>,
    pub body: Vec<Stmt>,
    pub default_export: Option<Expr>,
}

/// A lowered `eval` program; its value is the completion of the last statement.
#[derive(Debug)]
pub struct Script {
    pub body: Vec<Stmt>,
}
