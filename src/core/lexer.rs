use crate::core::diag::{Position, Span};
use parse_display::Display as EnumDisplay;
use std::fmt::{Display, Formatter};
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, EnumDisplay)]
pub enum TokenKind {
    // Identifiers
    #[display("Ident({0})")]
    Ident(String),

    // Literals
    #[display("IntLit({0})")]
    IntLit(i64),
    #[display("BoolLit({0})")]
    BoolLit(bool),
    #[display("StringLit({0})")]
    StringLit(String),

    // Keywords
    #[display("let")]
    KwLet,
    #[display("import")]
    KwImport,
    #[display("as")]
    KwAs,
    #[display("fn")]
    KwFn,
    #[display("if")]
    KwIf,
    #[display("then")]
    KwThen,
    #[display("else")]
    KwElse,
    #[display("assert")]
    KwAssert,

    // Punctuation and operators
    #[display("=")]
    Equal,
    #[display("->")]
    Arrow,
    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display(".")]
    Dot,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Star,
    #[display("/")]
    Slash,
    #[display("==")]
    EqualEqual,
    #[display("<")]
    Less,
    #[display(">")]
    Greater,
    #[display("&&")]
    AmpAmp,
    #[display("||")]
    PipePipe,
    #[display("++")]
    PlusPlus,

    #[display("EOF")]
    Eof,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("Unexpected character: {0}")]
    UnexpectedCharacter(char, Span),

    #[error("Invalid integer literal: {0}")]
    InvalidInteger(String, Span),

    #[error("Unterminated string literal")]
    UnterminatedString(Span),
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedCharacter(_, span) => *span,
            LexError::InvalidInteger(_, span) => *span,
            LexError::UnterminatedString(span) => *span,
        }
    }
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    pos: Position,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            chars: source.chars().peekable(),
            pos: Position {
                offset: 0,
                line: 1,
                column: 1,
            },
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
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

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia();
        let start = self.pos;
        let Some(ch) = self.advance() else {
            return Ok(self.token(TokenKind::Eof, start));
        };

        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '.' => TokenKind::Dot,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '<' => TokenKind::Less,
            '>' => TokenKind::Greater,
            '=' => {
                if self.eat('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                }
            }
            '+' => {
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            '&' => {
                if self.eat('&') {
                    TokenKind::AmpAmp
                } else {
                    return Err(LexError::UnexpectedCharacter('&', self.span_from(start)));
                }
            }
            '|' => {
                if self.eat('|') {
                    TokenKind::PipePipe
                } else {
                    return Err(LexError::UnexpectedCharacter('|', self.span_from(start)));
                }
            }
            '"' => self.string_literal(start)?,
            ch if ch.is_ascii_digit() => self.int_literal(ch, start)?,
            ch if ch.is_alphabetic() || ch == '_' => self.ident_or_keyword(ch),
            other => return Err(LexError::UnexpectedCharacter(other, self.span_from(start))),
        };

        Ok(self.token(kind, start))
    }

    fn string_literal(&mut self, start: Position) -> Result<TokenKind, LexError> {
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('"') => return Ok(TokenKind::StringLit(text)),
                Some('\n') | None => {
                    return Err(LexError::UnterminatedString(self.span_from(start)));
                }
                Some(ch) => text.push(ch),
            }
        }
    }

    fn int_literal(&mut self, first: char, start: Position) -> Result<TokenKind, LexError> {
        let mut text = String::from(first);
        while let Some(&ch) = self.chars.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        text.parse::<i64>()
            .map(TokenKind::IntLit)
            .map_err(|_| LexError::InvalidInteger(text, self.span_from(start)))
    }

    fn ident_or_keyword(&mut self, first: char) -> TokenKind {
        let mut text = String::from(first);
        while let Some(&ch) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        match text.as_str() {
            "let" => TokenKind::KwLet,
            "import" => TokenKind::KwImport,
            "as" => TokenKind::KwAs,
            "fn" => TokenKind::KwFn,
            "if" => TokenKind::KwIf,
            "then" => TokenKind::KwThen,
            "else" => TokenKind::KwElse,
            "assert" => TokenKind::KwAssert,
            "true" => TokenKind::BoolLit(true),
            "false" => TokenKind::BoolLit(false),
            _ => TokenKind::Ident(text),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.chars.peek() {
                Some(&ch) if ch.is_whitespace() => {
                    self.advance();
                }
                Some('#') => {
                    while let Some(&ch) = self.chars.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        self.pos.offset += ch.len_utf8();
        if ch == '\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn token(&self, kind: TokenKind, start: Position) -> Token {
        Token {
            kind,
            span: self.span_from(start),
        }
    }

    fn span_from(&self, start: Position) -> Span {
        Span::new(start, self.pos)
    }
}

#[cfg(test)]
#[path = "../tests/core/t_lexer.rs"]
mod tests;
