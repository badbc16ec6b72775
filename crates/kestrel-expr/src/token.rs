use std::fmt;

/// One piece of an interpolated string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    /// `$name`
    VariableRef(String),
    /// `${...}`, kept as source text and parsed again when evaluated.
    EmbeddedExpr(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    Str(String),
    Template(Vec<TemplatePart>),
    True,
    False,
    Null,
    Ident(String),

    This,
    Is,
    NotIs,
    In,
    NotIn,
    As,
    If,
    Else,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Tilde,
    Amp,
    Pipe,
    Caret,
    AmpAmp,
    PipePipe,
    EqEq,
    BangEq,
    Lt,
    Le,
    Gt,
    Ge,
    /// `?:`
    Elvis,
    /// `?.`
    SafeDot,
    Dot,
    DotDot,
    Arrow,
    Question,
    Colon,
    /// `=` or a compound assignment such as `+=`.
    Assign(&'static str),

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,

    Eof,
}

impl TokenKind {
    pub(crate) fn keyword(ident: &str) -> Option<TokenKind> {
        Some(match ident {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "this" => TokenKind::This,
            "is" => TokenKind::Is,
            "in" => TokenKind::In,
            "as" => TokenKind::As,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            _ => return None,
        })
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Int(v) => return write!(f, "{v}"),
            TokenKind::Long(v) => return write!(f, "{v}L"),
            TokenKind::Float(v) => return write!(f, "{v}f"),
            TokenKind::Double(v) => return write!(f, "{v}"),
            TokenKind::Char(c) => return write!(f, "'{c}'"),
            TokenKind::Str(_) | TokenKind::Template(_) => "string literal",
            TokenKind::Ident(name) => return write!(f, "`{name}`"),
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::This => "this",
            TokenKind::Is => "is",
            TokenKind::NotIs => "!is",
            TokenKind::In => "in",
            TokenKind::NotIn => "!in",
            TokenKind::As => "as",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Bang => "!",
            TokenKind::Tilde => "~",
            TokenKind::Amp => "&",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::AmpAmp => "&&",
            TokenKind::PipePipe => "||",
            TokenKind::EqEq => "==",
            TokenKind::BangEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::Elvis => "?:",
            TokenKind::SafeDot => "?.",
            TokenKind::Dot => ".",
            TokenKind::DotDot => "..",
            TokenKind::Arrow => "->",
            TokenKind::Question => "?",
            TokenKind::Colon => ":",
            TokenKind::Assign(op) => op,
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Eof => "end of expression",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub offset: usize,
}
