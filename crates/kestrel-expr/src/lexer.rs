use crate::error::SyntaxError;
use crate::token::{TemplatePart, Token, TokenKind};

/// Split expression text into tokens. The result always ends with [`TokenKind::Eof`].
pub fn tokenize(text: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer::new(text);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c == '_' || unicode_ident::is_xid_start(c)
}

pub(crate) fn is_ident_continue(c: char) -> bool {
    unicode_ident::is_xid_continue(c)
}

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Lexer { text, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.remaining().chars().nth(n)
    }

    fn bump_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.bump_char();
            true
        } else {
            false
        }
    }

    /// Consume `word` when it is not the prefix of a longer identifier.
    fn eat_word(&mut self, word: &str) -> bool {
        let rem = self.remaining();
        if !rem.starts_with(word) {
            return false;
        }
        if rem[word.len()..].chars().next().is_some_and(is_ident_continue) {
            return false;
        }
        self.pos += word.len();
        true
    }

    fn next_token(&mut self) -> Result<Token, SyntaxError> {
        while matches!(self.peek_char(), Some(c) if c.is_whitespace()) {
            self.bump_char();
        }

        let offset = self.pos;
        let Some(ch) = self.bump_char() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                offset,
            });
        };

        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '~' => TokenKind::Tilde,
            '^' => TokenKind::Caret,
            '+' if self.eat('=') => TokenKind::Assign("+="),
            '+' => TokenKind::Plus,
            '-' if self.eat('>') => TokenKind::Arrow,
            '-' if self.eat('=') => TokenKind::Assign("-="),
            '-' => TokenKind::Minus,
            '*' if self.eat('=') => TokenKind::Assign("*="),
            '*' => TokenKind::Star,
            '/' if self.eat('=') => TokenKind::Assign("/="),
            '/' => TokenKind::Slash,
            '%' if self.eat('=') => TokenKind::Assign("%="),
            '%' => TokenKind::Percent,
            '!' if self.eat('=') => {
                // `!==` compares handles, which is what `!=` does here.
                self.eat('=');
                TokenKind::BangEq
            }
            '!' if self.eat_word("is") => TokenKind::NotIs,
            '!' if self.eat_word("in") => TokenKind::NotIn,
            '!' => TokenKind::Bang,
            '=' if self.eat('=') => {
                self.eat('=');
                TokenKind::EqEq
            }
            '=' => TokenKind::Assign("="),
            '<' if self.eat('=') => TokenKind::Le,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::Ge,
            '>' => TokenKind::Gt,
            '&' if self.eat('&') => TokenKind::AmpAmp,
            '&' if self.eat('=') => TokenKind::Assign("&="),
            '&' => TokenKind::Amp,
            '|' if self.eat('|') => TokenKind::PipePipe,
            '|' if self.eat('=') => TokenKind::Assign("|="),
            '|' => TokenKind::Pipe,
            '?' if self.eat(':') => TokenKind::Elvis,
            '?' if self.eat('.') => TokenKind::SafeDot,
            '?' => TokenKind::Question,
            '.' if self.eat('.') => TokenKind::DotDot,
            '.' => TokenKind::Dot,
            '"' => self.lex_string(offset)?,
            '\'' => self.lex_char(offset)?,
            c if c.is_ascii_digit() => {
                self.pos = offset;
                self.lex_number(offset)?
            }
            c if is_ident_start(c) => {
                self.pos = offset;
                let ident = self.lex_identifier();
                TokenKind::keyword(&ident).unwrap_or(TokenKind::Ident(ident))
            }
            other => {
                return Err(SyntaxError::lex(
                    format!("unexpected character `{other}`"),
                    offset,
                ))
            }
        };

        Ok(Token { kind, offset })
    }

    fn lex_identifier(&mut self) -> String {
        let start = self.pos;
        if self.peek_char().is_some_and(is_ident_start) {
            self.bump_char();
            while self.peek_char().is_some_and(is_ident_continue) {
                self.bump_char();
            }
        }
        self.text[start..self.pos].to_string()
    }

    /// Digits accepted by `is_digit`, with `_` separators dropped.
    fn take_digits(&mut self, is_digit: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            if is_digit(c) {
                out.push(c);
            } else if c != '_' {
                break;
            }
            self.bump_char();
        }
        out
    }

    fn lex_number(&mut self, start: usize) -> Result<TokenKind, SyntaxError> {
        let radix = match (self.peek_char(), self.peek_nth(1)) {
            (Some('0'), Some('x' | 'X')) => Some(16),
            (Some('0'), Some('b' | 'B')) => Some(2),
            _ => None,
        };
        if let Some(radix) = radix {
            self.pos += 2;
            let digits = self.take_digits(|c| c.is_digit(radix));
            if digits.is_empty() {
                return Err(SyntaxError::lex("missing digits after radix prefix", start));
            }
            let long = self.eat('L') || self.eat('l');
            let value = u64::from_str_radix(&digits, radix)
                .map_err(|_| SyntaxError::lex("integer literal is too large", start))?;
            return Ok(integer_token(value as i64, long));
        }

        let mut text = self.take_digits(|c| c.is_ascii_digit());
        let mut floating = false;

        // `1.5` is a fraction, `1..5` a range and `1.toString()` a call.
        if self.peek_char() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump_char();
            text.push('.');
            text.push_str(&self.take_digits(|c| c.is_ascii_digit()));
            floating = true;
        }

        if let Some(kind) = self.lex_number_suffix(&text, floating, start)? {
            return Ok(kind);
        }

        let has_exponent = match (self.peek_char(), self.peek_nth(1), self.peek_nth(2)) {
            (Some('e' | 'E'), Some(d), _) if d.is_ascii_digit() => true,
            (Some('e' | 'E'), Some('+' | '-'), Some(d)) if d.is_ascii_digit() => true,
            _ => false,
        };
        if has_exponent {
            self.bump_char();
            text.push('e');
            if let Some(sign @ ('+' | '-')) = self.peek_char() {
                self.bump_char();
                text.push(sign);
            }
            text.push_str(&self.take_digits(|c| c.is_ascii_digit()));
            floating = true;
            if let Some(kind) = self.lex_number_suffix(&text, floating, start)? {
                return Ok(kind);
            }
        }

        if floating {
            return parse_double(&text, start);
        }

        let value: i64 = text
            .parse()
            .map_err(|_| SyntaxError::lex("integer literal is too large", start))?;
        Ok(integer_token(value, false))
    }

    fn lex_number_suffix(
        &mut self,
        text: &str,
        floating: bool,
        start: usize,
    ) -> Result<Option<TokenKind>, SyntaxError> {
        let kind = match self.peek_char() {
            Some('L' | 'l') if !floating => {
                self.bump_char();
                let value: i64 = text
                    .parse()
                    .map_err(|_| SyntaxError::lex("long literal is too large", start))?;
                TokenKind::Long(value)
            }
            Some('F' | 'f') => {
                self.bump_char();
                let value: f32 = text
                    .parse()
                    .map_err(|_| SyntaxError::lex("malformed float literal", start))?;
                TokenKind::Float(value)
            }
            Some('D' | 'd') => {
                self.bump_char();
                parse_double(text, start)?
            }
            _ => return Ok(None),
        };
        Ok(Some(kind))
    }

    fn lex_escape(&mut self, literal_start: usize) -> Result<char, SyntaxError> {
        let escape_offset = self.pos;
        let Some(c) = self.bump_char() else {
            return Err(SyntaxError::lex("unterminated string literal", literal_start));
        };
        Ok(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            '0' => '\0',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            '$' => '$',
            'u' => {
                let hex: String = self.remaining().chars().take(4).collect();
                let value = (hex.len() == 4)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                    .ok_or_else(|| SyntaxError::lex("invalid unicode escape", escape_offset))?;
                self.pos += 4;
                value
            }
            other => {
                return Err(SyntaxError::lex(
                    format!("invalid escape sequence `\\{other}`"),
                    escape_offset,
                ))
            }
        })
    }

    fn lex_string(&mut self, start: usize) -> Result<TokenKind, SyntaxError> {
        let mut parts = Vec::new();
        let mut buf = String::new();
        let mut interpolated = false;

        loop {
            match self.bump_char() {
                None | Some('\n') => {
                    return Err(SyntaxError::lex("unterminated string literal", start));
                }
                Some('"') => break,
                Some('\\') => buf.push(self.lex_escape(start)?),
                Some('$') => match self.peek_char() {
                    Some('{') => {
                        self.bump_char();
                        let source = self.lex_embedded_expr()?;
                        if !buf.is_empty() {
                            parts.push(TemplatePart::Literal(std::mem::take(&mut buf)));
                        }
                        parts.push(TemplatePart::EmbeddedExpr(source));
                        interpolated = true;
                    }
                    Some(c) if is_ident_start(c) => {
                        let name = self.lex_identifier();
                        if !buf.is_empty() {
                            parts.push(TemplatePart::Literal(std::mem::take(&mut buf)));
                        }
                        parts.push(TemplatePart::VariableRef(name));
                        interpolated = true;
                    }
                    _ => buf.push('$'),
                },
                Some(c) => buf.push(c),
            }
        }

        if !interpolated {
            return Ok(TokenKind::Str(buf));
        }
        if !buf.is_empty() {
            parts.push(TemplatePart::Literal(buf));
        }
        Ok(TokenKind::Template(parts))
    }

    /// Source text of a `${...}` hole; the opening brace is already consumed.
    fn lex_embedded_expr(&mut self) -> Result<String, SyntaxError> {
        let start = self.pos;
        let mut depth = 1usize;
        loop {
            let Some(c) = self.bump_char() else {
                return Err(SyntaxError::lex("unterminated template expression", start));
            };
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.text[start..self.pos - 1].to_string());
                    }
                }
                '"' => {
                    // Braces inside a nested string literal do not count.
                    loop {
                        match self.bump_char() {
                            None => {
                                return Err(SyntaxError::lex(
                                    "unterminated template expression",
                                    start,
                                ))
                            }
                            Some('\\') => {
                                self.bump_char();
                            }
                            Some('"') => break,
                            Some(_) => {}
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn lex_char(&mut self, start: usize) -> Result<TokenKind, SyntaxError> {
        let value = match self.bump_char() {
            None | Some('\n') => {
                return Err(SyntaxError::lex("unterminated character literal", start))
            }
            Some('\'') => return Err(SyntaxError::lex("empty character literal", start)),
            Some('\\') => self.lex_escape(start)?,
            Some(c) => c,
        };
        if !self.eat('\'') {
            return Err(SyntaxError::lex("unterminated character literal", start));
        }
        Ok(TokenKind::Char(value))
    }
}

/// Unsuffixed literals that do not fit in 32 bits silently become longs.
fn integer_token(value: i64, long: bool) -> TokenKind {
    match i32::try_from(value) {
        Ok(value) if !long => TokenKind::Int(value),
        _ => TokenKind::Long(value),
    }
}

fn parse_double(text: &str, start: usize) -> Result<TokenKind, SyntaxError> {
    text.parse()
        .map(TokenKind::Double)
        .map_err(|_| SyntaxError::lex("malformed floating point literal", start))
}
