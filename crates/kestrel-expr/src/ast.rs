//! Expression tree produced by the parser.
//!
//! Trees are immutable once built and owned by the evaluation that parsed
//! them; nothing here holds a reference into the target process.

pub use crate::token::TemplatePart;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    Bool(bool),
    Str(String),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Ushr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "and",
            BinaryOp::BitOr => "or",
            BinaryOp::BitXor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
            BinaryOp::Ushr => "ushr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    /// `a..b`
    Inclusive,
    /// `a until b`
    Until,
    /// `a downTo b`
    DownTo,
}

/// A type name as written after `is`, `as` or in a constructor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// Dotted name with array suffixes (`java.util.List`, `int[]`), generic
    /// arguments dropped.
    pub name: String,
    /// Written with a trailing `?`.
    pub nullable: bool,
}

impl TypeRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Identifier(String),
    This,
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    MemberAccess {
        target: Box<Expr>,
        name: String,
        safe: bool,
    },
    ArrayAccess {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    MethodCall {
        receiver: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
        safe: bool,
    },
    TypeCheck {
        expr: Box<Expr>,
        ty: TypeRef,
        negated: bool,
    },
    TypeCast {
        expr: Box<Expr>,
        ty: TypeRef,
        safe: bool,
    },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Construct {
        ty: TypeRef,
        args: Vec<Expr>,
    },
    Elvis {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    StringTemplate(Vec<TemplatePart>),
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        kind: RangeKind,
        step: Option<Box<Expr>>,
    },
    Contains {
        element: Box<Expr>,
        collection: Box<Expr>,
        negated: bool,
    },
    /// Never executed; evaluates to a display placeholder.
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    /// `*array` in argument position.
    Spread(Box<Expr>),
}

impl Expr {
    pub fn int(value: i32) -> Expr {
        Expr::Literal(Literal::Int(value))
    }

    pub fn ident(name: &str) -> Expr {
        Expr::Identifier(name.to_string())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `a.b.c` as a dotted name, if the expression is only identifiers and dots.
    pub fn as_qualified_name(&self) -> Option<String> {
        match self {
            Expr::Identifier(name) => Some(name.clone()),
            Expr::MemberAccess {
                target,
                name,
                safe: false,
            } => Some(format!("{}.{name}", target.as_qualified_name()?)),
            _ => None,
        }
    }
}
