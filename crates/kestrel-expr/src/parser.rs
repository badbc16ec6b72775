use crate::ast::{BinaryOp, Expr, Literal, RangeKind, TypeRef, UnaryOp};
use crate::error::SyntaxError;
use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};

type Result<T> = std::result::Result<T, SyntaxError>;

/// Parse a single expression. Trailing tokens are an error.
pub fn parse_expression(text: &str) -> Result<Expr> {
    let tokens = tokenize(text)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn nth(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .or_else(|| self.tokens.last())
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn peek(&self) -> &TokenKind {
        self.nth(0)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.offset)
            .unwrap_or(0)
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if kind != TokenKind::Eof {
            self.pos += 1;
        }
        kind
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn at_word(&self, word: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(name) if name == word)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.at_word(word) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error_here(&self, expected: &str) -> SyntaxError {
        match self.peek() {
            TokenKind::Assign(_) => {
                SyntaxError::parse("assignment is not supported", self.offset())
            }
            found => SyntaxError::parse(format!("{expected}, found {found}"), self.offset()),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error_here(&format!("expected `{kind}`")))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<String> {
        match self.peek() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.bump();
                Ok(name)
            }
            _ => Err(self.error_here(expected)),
        }
    }

    fn expect_end(&self) -> Result<()> {
        if self.at(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.error_here("unexpected token after expression"))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        let cond = self.parse_elvis()?;
        if self.eat(&TokenKind::Question) {
            let then_expr = self.parse_expr()?;
            self.expect(TokenKind::Colon)?;
            let else_expr = self.parse_expr()?;
            return Ok(Expr::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            });
        }
        Ok(cond)
    }

    fn parse_elvis(&mut self) -> Result<Expr> {
        let left = self.parse_or()?;
        if self.eat(&TokenKind::Elvis) {
            let right = self.parse_elvis()?;
            return Ok(Expr::Elvis {
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::PipePipe) {
            let right = self.parse_and()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_bit_or()?;
        while self.eat(&TokenKind::AmpAmp) {
            let right = self.parse_bit_or()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_bit_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_bit_xor()?;
        while self.eat(&TokenKind::Pipe) || self.eat_word("or") {
            let right = self.parse_bit_xor()?;
            left = Expr::binary(BinaryOp::BitOr, left, right);
        }
        Ok(left)
    }

    fn parse_bit_xor(&mut self) -> Result<Expr> {
        let mut left = self.parse_bit_and()?;
        while self.eat(&TokenKind::Caret) || self.eat_word("xor") {
            let right = self.parse_bit_and()?;
            left = Expr::binary(BinaryOp::BitXor, left, right);
        }
        Ok(left)
    }

    fn parse_bit_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_equality()?;
        while self.eat(&TokenKind::Amp) || self.eat_word("and") {
            let right = self.parse_equality()?;
            left = Expr::binary(BinaryOp::BitAnd, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::BangEq => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.parse_comparison()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut left = self.parse_contains()?;
        loop {
            let op = match self.peek() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                TokenKind::Is | TokenKind::NotIs => {
                    let negated = self.bump() == TokenKind::NotIs;
                    let ty = self.parse_type()?;
                    left = Expr::TypeCheck {
                        expr: Box::new(left),
                        ty,
                        negated,
                    };
                    continue;
                }
                _ => return Ok(left),
            };
            self.bump();
            let right = self.parse_contains()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_contains(&mut self) -> Result<Expr> {
        let mut left = self.parse_range()?;
        loop {
            let negated = match self.peek() {
                TokenKind::In => false,
                TokenKind::NotIn => true,
                _ => return Ok(left),
            };
            self.bump();
            let collection = self.parse_range()?;
            left = Expr::Contains {
                element: Box::new(left),
                collection: Box::new(collection),
                negated,
            };
        }
    }

    fn parse_range(&mut self) -> Result<Expr> {
        let start = self.parse_shift()?;
        let kind = if self.eat(&TokenKind::DotDot) {
            RangeKind::Inclusive
        } else if self.eat_word("until") {
            RangeKind::Until
        } else if self.eat_word("downTo") {
            RangeKind::DownTo
        } else {
            return Ok(start);
        };
        let end = self.parse_shift()?;
        let step = if self.eat_word("step") {
            Some(Box::new(self.parse_shift()?))
        } else {
            None
        };
        Ok(Expr::Range {
            start: Box::new(start),
            end: Box::new(end),
            kind,
            step,
        })
    }

    fn parse_shift(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.eat_word("shl") {
                BinaryOp::Shl
            } else if self.eat_word("shr") {
                BinaryOp::Shr
            } else if self.eat_word("ushr") {
                BinaryOp::Ushr
            } else {
                return Ok(left);
            };
            let right = self.parse_additive()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            _ => return self.parse_postfix(),
        };
        self.bump();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                TokenKind::Dot | TokenKind::SafeDot => {
                    let safe = self.bump() == TokenKind::SafeDot;
                    let name = self.expect_ident("expected member name")?;
                    if !self.at(&TokenKind::LParen) && !self.at(&TokenKind::LBrace) {
                        expr = Expr::MemberAccess {
                            target: Box::new(expr),
                            name,
                            safe,
                        };
                        continue;
                    }
                    let args = self.parse_call_args()?;
                    // `java.util.ArrayList()` names a type, not a method.
                    let qualified = (!safe && starts_upper(&name))
                        .then(|| expr.as_qualified_name())
                        .flatten();
                    expr = match qualified {
                        Some(prefix) => Expr::Construct {
                            ty: TypeRef::new(format!("{prefix}.{name}")),
                            args,
                        },
                        None => Expr::MethodCall {
                            receiver: Some(Box::new(expr)),
                            name,
                            args,
                            safe,
                        },
                    };
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::ArrayAccess {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::As => {
                    self.bump();
                    let safe = self.eat(&TokenKind::Question);
                    let ty = self.parse_type()?;
                    expr = Expr::TypeCast {
                        expr: Box::new(expr),
                        ty,
                        safe,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let expr = match self.peek().clone() {
            TokenKind::Int(v) => Expr::Literal(Literal::Int(v)),
            TokenKind::Long(v) => Expr::Literal(Literal::Long(v)),
            TokenKind::Float(v) => Expr::Literal(Literal::Float(v)),
            TokenKind::Double(v) => Expr::Literal(Literal::Double(v)),
            TokenKind::Char(c) => Expr::Literal(Literal::Char(c)),
            TokenKind::Str(s) => Expr::Literal(Literal::Str(s)),
            TokenKind::Template(parts) => Expr::StringTemplate(parts),
            TokenKind::True => Expr::Literal(Literal::Bool(true)),
            TokenKind::False => Expr::Literal(Literal::Bool(false)),
            TokenKind::Null => Expr::Literal(Literal::Null),
            TokenKind::This => Expr::This,
            TokenKind::Ident(name) => {
                self.bump();
                if !self.at(&TokenKind::LParen) {
                    return Ok(Expr::Identifier(name));
                }
                let args = self.parse_call_args()?;
                return Ok(if starts_upper(&name) {
                    Expr::Construct {
                        ty: TypeRef::new(name),
                        args,
                    }
                } else {
                    Expr::MethodCall {
                        receiver: None,
                        name,
                        args,
                        safe: false,
                    }
                });
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::If => return self.parse_if(),
            TokenKind::LBrace => return self.parse_lambda(),
            _ => return Err(self.error_here("expected expression")),
        };
        self.bump();
        Ok(expr)
    }

    fn parse_if(&mut self) -> Result<Expr> {
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_expr = self.parse_expr()?;
        if !self.eat(&TokenKind::Else) {
            return Err(self.error_here("`if` expression requires an `else` branch"));
        }
        let else_expr = self.parse_expr()?;
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    fn lambda_has_params(&self) -> bool {
        let mut n = 0;
        loop {
            if !matches!(self.nth(n), TokenKind::Ident(_)) {
                return false;
            }
            n += 1;
            match self.nth(n) {
                TokenKind::Arrow => return true,
                TokenKind::Comma => n += 1,
                _ => return false,
            }
        }
    }

    fn parse_lambda(&mut self) -> Result<Expr> {
        self.expect(TokenKind::LBrace)?;
        let mut params = Vec::new();
        if self.lambda_has_params() {
            loop {
                params.push(self.expect_ident("expected lambda parameter")?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Arrow)?;
        } else {
            self.eat(&TokenKind::Arrow);
        }
        let body = self.parse_expr()?;
        self.expect(TokenKind::RBrace)?;
        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
        })
    }

    /// `(a, *b)` optionally followed by a trailing lambda, or a lone trailing lambda.
    fn parse_call_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::LParen) && !self.eat(&TokenKind::RParen) {
            loop {
                let arg = if self.eat(&TokenKind::Star) {
                    Expr::Spread(Box::new(self.parse_expr()?))
                } else {
                    self.parse_expr()?
                };
                args.push(arg);
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                self.expect(TokenKind::RParen)?;
                break;
            }
        }
        if self.at(&TokenKind::LBrace) {
            args.push(self.parse_lambda()?);
        }
        Ok(args)
    }

    fn parse_type(&mut self) -> Result<TypeRef> {
        let mut name = self.expect_ident("expected type name")?;
        while self.at(&TokenKind::Dot) && matches!(self.nth(1), TokenKind::Ident(_)) {
            self.bump();
            name.push('.');
            name.push_str(&self.expect_ident("expected type name")?);
        }

        if self.at(&TokenKind::Lt) {
            let mut depth = 0usize;
            loop {
                match self.bump() {
                    TokenKind::Lt => depth += 1,
                    TokenKind::Gt => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    TokenKind::Eof => {
                        return Err(self.error_here("unterminated type arguments"));
                    }
                    _ => {}
                }
            }
        }

        while self.at(&TokenKind::LBracket) && *self.nth(1) == TokenKind::RBracket {
            self.bump();
            self.bump();
            name.push_str("[]");
        }

        let nullable = self.eat(&TokenKind::Question);
        Ok(TypeRef { name, nullable })
    }
}

fn starts_upper(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}
