//! Strategy source lexer
//!
//! Tokenizes strategy scripts into a flat token stream. Newlines are only emitted
//! at bracket depth zero, so a statement split over several physical lines inside
//! `(...)`, `[...]` or `{...}` arrives as one logical line. Backslash continuations
//! are joined the same way, `;` separates statements, and `#` comments are dropped.
//!
//! The lexer never fails: characters it does not understand become
//! [`TokenKind::Unknown`] and are left for the parser to skip.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::domain::CompareOp;

/// Token kinds in strategy source
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(f64),
    /// String literal contents with quotes and prefix removed
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    /// `=`
    Assign,
    Compare(CompareOp),
    Amp,
    Pipe,
    Tilde,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    Percent,
    At,
    /// `->`
    Arrow,
    /// End of a logical line
    Newline,
    Unknown(String),
    Eof,
}

/// A token with position information
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset into the source
    pub position: usize,
    /// Length in bytes
    pub length: usize,
    /// 1-based line of the first character
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, position: usize, length: usize, line: usize) -> Self {
        Self {
            kind,
            position,
            length,
            line,
        }
    }

    pub fn end(&self) -> usize {
        self.position + self.length
    }

    pub fn is_ident(&self, name: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(s) if s == name)
    }
}

/// Lexer for strategy scripts
pub struct StrategyLexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    depth: usize,
}

impl<'a> StrategyLexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            line: 1,
            depth: 0,
        }
    }

    /// Tokenize the entire input. Blank logical lines are collapsed; the stream
    /// always ends with `Newline, Eof` when it has any content.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens: Vec<Token> = Vec::new();

        loop {
            let token = self.next_token();
            match token.kind {
                TokenKind::Newline => {
                    if matches!(
                        tokens.last(),
                        None | Some(Token {
                            kind: TokenKind::Newline,
                            ..
                        })
                    ) {
                        continue;
                    }
                }
                TokenKind::Eof => {
                    if !matches!(
                        tokens.last(),
                        None | Some(Token {
                            kind: TokenKind::Newline,
                            ..
                        })
                    ) {
                        tokens.push(Token::new(
                            TokenKind::Newline,
                            token.position,
                            0,
                            token.line,
                        ));
                    }
                    tokens.push(token);
                    break;
                }
                _ => {}
            }
            tokens.push(token);
        }

        tokens
    }

    fn next_token(&mut self) -> Token {
        self.skip_trivia();

        let line = self.line;
        let Some(&(pos, ch)) = self.chars.peek() else {
            return Token::new(TokenKind::Eof, self.input.len(), 0, line);
        };

        let kind = match ch {
            '\n' | ';' => {
                self.bump();
                if ch == '\n' {
                    self.line += 1;
                }
                TokenKind::Newline
            }
            '(' | '[' | '{' => {
                self.bump();
                self.depth += 1;
                match ch {
                    '(' => TokenKind::LParen,
                    '[' => TokenKind::LBracket,
                    _ => TokenKind::LBrace,
                }
            }
            ')' | ']' | '}' => {
                self.bump();
                self.depth = self.depth.saturating_sub(1);
                match ch {
                    ')' => TokenKind::RParen,
                    ']' => TokenKind::RBracket,
                    _ => TokenKind::RBrace,
                }
            }
            ',' => self.single(TokenKind::Comma),
            ':' => self.single(TokenKind::Colon),
            '&' => self.single(TokenKind::Amp),
            '|' => self.single(TokenKind::Pipe),
            '~' => self.single(TokenKind::Tilde),
            '+' => self.single(TokenKind::Plus),
            '/' => self.single(TokenKind::Slash),
            '%' => self.single(TokenKind::Percent),
            '@' => self.single(TokenKind::At),
            '=' => self.one_or_two('=', TokenKind::Assign, TokenKind::Compare(CompareOp::Eq)),
            '<' => self.one_or_two(
                '=',
                TokenKind::Compare(CompareOp::Lt),
                TokenKind::Compare(CompareOp::Le),
            ),
            '>' => self.one_or_two(
                '=',
                TokenKind::Compare(CompareOp::Gt),
                TokenKind::Compare(CompareOp::Ge),
            ),
            '!' => self.one_or_two(
                '=',
                TokenKind::Unknown("!".into()),
                TokenKind::Compare(CompareOp::Ne),
            ),
            '-' => self.one_or_two('>', TokenKind::Minus, TokenKind::Arrow),
            '*' => self.one_or_two('*', TokenKind::Star, TokenKind::DoubleStar),
            '.' if self.next_is_digit(pos + 1) => self.read_number(),
            '.' => self.single(TokenKind::Dot),
            '\'' | '"' => TokenKind::Str(self.read_string(ch)),
            c if c.is_ascii_digit() => self.read_number(),
            c if c.is_alphabetic() || c == '_' => {
                let ident = self.read_identifier();
                match self.chars.peek() {
                    Some(&(_, q)) if (q == '\'' || q == '"') && is_string_prefix(&ident) => {
                        TokenKind::Str(self.read_string(q))
                    }
                    _ => TokenKind::Ident(ident),
                }
            }
            other => {
                self.bump();
                TokenKind::Unknown(other.to_string())
            }
        };

        let end = self.offset();
        Token::new(kind, pos, end - pos, line)
    }

    /// Skip spaces, comments, continuations, and newlines inside brackets.
    fn skip_trivia(&mut self) {
        while let Some(&(pos, ch)) = self.chars.peek() {
            match ch {
                ' ' | '\t' | '\r' | '\x0c' => {
                    self.bump();
                }
                '#' => {
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '\\' if self.input[pos + 1..].starts_with('\n')
                    || self.input[pos + 1..].starts_with("\r\n") =>
                {
                    self.bump();
                    if self.input[pos + 1..].starts_with('\r') {
                        self.bump();
                    }
                    self.bump();
                    self.line += 1;
                }
                '\n' if self.depth > 0 => {
                    self.bump();
                    self.line += 1;
                }
                _ => break,
            }
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.chars.next()
    }

    fn offset(&mut self) -> usize {
        self.chars
            .peek()
            .map(|&(p, _)| p)
            .unwrap_or(self.input.len())
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn one_or_two(&mut self, second: char, one: TokenKind, two: TokenKind) -> TokenKind {
        self.bump();
        match self.chars.peek() {
            Some(&(_, c)) if c == second => {
                self.bump();
                two
            }
            _ => one,
        }
    }

    fn next_is_digit(&self, byte_pos: usize) -> bool {
        self.input[byte_pos..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    }

    fn read_number(&mut self) -> TokenKind {
        let mut text = String::new();
        let mut has_dot = false;
        let mut has_exp = false;

        while let Some(&(_, ch)) = self.chars.peek() {
            match ch {
                '0'..='9' => {
                    text.push(ch);
                    self.bump();
                }
                '_' => {
                    self.bump();
                }
                '.' if !has_dot && !has_exp => {
                    has_dot = true;
                    text.push(ch);
                    self.bump();
                }
                'e' | 'E' if !has_exp => {
                    has_exp = true;
                    text.push(ch);
                    self.bump();
                    if let Some(&(_, sign)) = self.chars.peek() {
                        if sign == '+' || sign == '-' {
                            text.push(sign);
                            self.bump();
                        }
                    }
                }
                _ => break,
            }
        }

        match text.parse::<f64>() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => TokenKind::Unknown(text),
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        ident
    }

    /// Read a single- or triple-quoted literal starting at the current quote.
    /// An unterminated single-quoted literal stops at the end of the line.
    fn read_string(&mut self, quote: char) -> String {
        let start = self.offset();
        let delim = if quote == '"' { "\"\"\"" } else { "'''" };
        let triple = self.input[start..].starts_with(delim);
        let quote_len = if triple { 3 } else { 1 };
        for _ in 0..quote_len {
            self.bump();
        }

        let mut value = String::new();
        while let Some(&(p, c)) = self.chars.peek() {
            if triple && self.input[p..].starts_with(delim) {
                for _ in 0..3 {
                    self.bump();
                }
                break;
            }
            if !triple && c == quote {
                self.bump();
                break;
            }
            if !triple && c == '\n' {
                break;
            }
            self.bump();
            match c {
                '\\' => {
                    if let Some((_, escaped)) = self.bump() {
                        if escaped == '\n' {
                            self.line += 1;
                        } else {
                            value.push(escaped);
                        }
                    }
                }
                '\n' => {
                    self.line += 1;
                    value.push(c);
                }
                _ => value.push(c),
            }
        }
        value
    }
}

fn is_string_prefix(ident: &str) -> bool {
    matches!(
        ident.to_ascii_lowercase().as_str(),
        "r" | "b" | "f" | "u" | "rb" | "br" | "fr" | "rf"
    )
}

/// Tokenize `source` in one call.
pub fn tokenize(source: &str) -> Vec<Token> {
    StrategyLexer::new(source).tokenize()
}
