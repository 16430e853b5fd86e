//! Hand-rolled lexer. Newlines are significant (statement terminators)
//! and surface as `Eol` tokens; `//` comments are dropped.

use crate::uwscript::token::{Keyword, Op, Token, TokenKind};
use crate::uwscript::CompileError;

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    #[must_use]
    pub fn new(source: &str) -> Self {
        Self {
            input: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current();
        if let Some(ch) = c {
            self.pos += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::Lex {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, CompileError> {
        loop {
            match self.current() {
                Some(c) if c == ' ' || c == '\t' || c == '\r' => {
                    self.advance();
                }
                Some('/') if self.peek() == Some('/') => {
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }

        let line = self.line;
        let column = self.column;
        let kind = match self.current() {
            None => TokenKind::Eof,
            Some('\n') => {
                self.advance();
                TokenKind::Eol
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.read_ident(),
            Some(c) if c.is_ascii_digit() => self.read_number()?,
            Some('"') => self.read_string()?,
            Some(c) => self.read_operator_or_punctuation(c)?,
        };
        Ok(Token { kind, line, column })
    }

    fn read_ident(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.current() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match Keyword::from_ident(&text) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Ident(text),
        }
    }

    fn read_number(&mut self) -> Result<TokenKind, CompileError> {
        let mut text = String::new();
        while let Some(c) = self.current() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let value: u16 = text
            .parse()
            .map_err(|_| self.error(format!("number '{text}' does not fit in a cell")))?;
        Ok(TokenKind::Number(value))
    }

    fn read_string(&mut self) -> Result<TokenKind, CompileError> {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.current() {
                None | Some('\n') => return Err(self.error("unterminated string")),
                Some('"') => {
                    self.advance();
                    return Ok(TokenKind::Str(text));
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('"') => text.push('"'),
                        Some('\\') => text.push('\\'),
                        Some(other) => {
                            // Unknown escapes pass through untouched.
                            text.push('\\');
                            text.push(other);
                        }
                        None => return Err(self.error("unterminated string")),
                    }
                    self.advance();
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }
    }

    fn read_operator_or_punctuation(&mut self, c: char) -> Result<TokenKind, CompileError> {
        let two = self.peek().map(|next| [c, next]);
        let two_char = match two {
            Some(['=', '=']) => Some(Op::Eq),
            Some(['!', '=']) => Some(Op::Ne),
            Some(['>', '=']) => Some(Op::Ge),
            Some(['<', '=']) => Some(Op::Le),
            Some(['+', '=']) => Some(Op::PlusAssign),
            Some(['-', '=']) => Some(Op::MinusAssign),
            Some(['*', '=']) => Some(Op::StarAssign),
            Some(['/', '=']) => Some(Op::SlashAssign),
            _ => None,
        };
        if let Some(op) = two_char {
            self.advance();
            self.advance();
            return Ok(TokenKind::Op(op));
        }

        let kind = match c {
            '+' => TokenKind::Op(Op::Plus),
            '-' => TokenKind::Op(Op::Minus),
            '*' => TokenKind::Op(Op::Star),
            '/' => TokenKind::Op(Op::Slash),
            '%' => TokenKind::Op(Op::Percent),
            '=' => TokenKind::Op(Op::Assign),
            '>' => TokenKind::Op(Op::Gt),
            '<' => TokenKind::Op(Op::Lt),
            '!' => TokenKind::Op(Op::Bang),
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            other => return Err(self.error(format!("unexpected character '{other}'"))),
        };
        self.advance();
        Ok(kind)
    }
}
