use crate::error::Span;

/// A single expression node. Every node carries the [`Span`] of the source
/// text it was parsed from so runtime errors can point back into the stage
/// expression the user typed.
#[derive(Debug, Clone)]
pub enum Expression {
    String(String, Span),
    Int(i64, Span),
    Float(f64, Span),
    Bool(bool, Span),
    Null(Span),
    Identifier(String, Span),
    Array(Vec<Expression>, Span),
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expression>,
        span: Span,
    },
    PropertyAccess {
        receiver: Box<Expression>,
        property: String,
        span: Span,
    },
    MethodCall {
        receiver: Box<Expression>,
        method: String,
        args: Vec<Expression>,
        span: Span,
    },
    /// Free function call, e.g. `len(_)`. Resolved against the builtin
    /// registry and the imported-module table at evaluation time.
    Call {
        function: String,
        args: Vec<Expression>,
        span: Span,
    },
    IndexAccess {
        receiver: Box<Expression>,
        index: Box<Expression>,
        span: Span,
    },
    IfExpr {
        condition: Box<Expression>,
        then_expr: Box<Expression>,
        else_expr: Box<Expression>,
        span: Span,
    },
    /// Inline closure used as an argument to sequence methods like
    /// `map`/`filter`, e.g. `_.filter(|x| -> x > 2)`.
    Closure {
        param: String,
        body: Box<Expression>,
        span: Span,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
}

/// Type annotation attached to a closure parameter, e.g. `int` or
/// `list[int]`. Names are resolved to concrete cast types during
/// configuration validation, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    pub name: String,
    /// Element type for container annotations (`list[int]` → `Some("int")`).
    pub element: Option<String>,
}

/// One closure parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Option<TypeName>,
    pub span: Span,
}

/// A compiled stage expression: a parameter list (possibly empty, for bare
/// expressions that use the representation variable) and a body.
#[derive(Debug, Clone)]
pub struct ClosureDef {
    pub params: Vec<Param>,
    pub body: Expression,
    /// The raw source text, preserved for diagnostics.
    pub source: String,
}

impl Expression {
    pub fn span(&self) -> &Span {
        match self {
            Expression::String(_, span) => span,
            Expression::Int(_, span) => span,
            Expression::Float(_, span) => span,
            Expression::Bool(_, span) => span,
            Expression::Null(span) => span,
            Expression::Identifier(_, span) => span,
            Expression::Array(_, span) => span,
            Expression::Binary { span, .. } => span,
            Expression::Unary { span, .. } => span,
            Expression::PropertyAccess { span, .. } => span,
            Expression::MethodCall { span, .. } => span,
            Expression::Call { span, .. } => span,
            Expression::IndexAccess { span, .. } => span,
            Expression::IfExpr { span, .. } => span,
            Expression::Closure { span, .. } => span,
        }
    }
}

impl ClosureDef {
    /// Declared parameter type names, in positional order. Used by the
    /// typed record constructor to pick per-field casts.
    pub fn annotations(&self) -> Vec<Option<TypeName>> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }
}
