//! Recursive-descent parser for strategy scripts.
//!
//! Grammar (one statement per logical line, indentation ignored):
//!
//! ```text
//! stmt       := "class" NAME ... | keyword ... | expr [":" expr] "=" expr | expr
//! expr       := or_expr ["if" ... ]
//! or_expr    := and_expr ("or" and_expr)*
//! and_expr   := not_expr ("and" not_expr)*
//! not_expr   := "not" not_expr | comparison
//! comparison := bitor (CMP bitor)*
//! bitor      := bitand ("|" bitand)*
//! bitand     := arith ("&" arith)*
//! arith      := term (("+" | "-") term)*
//! term       := factor (("*" | "/" | "//" | "%" | "@") factor)*
//! factor     := ("-" | "+" | "~") factor | power
//! power      := postfix ["**" factor]
//! postfix    := atom ("." NAME | "[" items "]" | "(" args ")")*
//! atom       := NUMBER | STRING+ | NAME | "(" items ")" | "[" items "]" | "{" dict "}"
//! ```
//!
//! Parsing is total. Unexpected tokens become [`Expr::Unknown`] and the rest of
//! the enclosing element is skipped up to the next `,` or closing bracket.
//!
//! Every nested expression, operator and postfix step spends one unit of a
//! depth budget ([`MAX_DEPTH`]). Once it is spent the rest of the element is
//! skipped as [`Expr::Unknown`], which bounds both the parser's recursion and
//! the depth of the tree it returns.

use super::ast::{Arg, BinaryOp, Expr, Stmt, UnaryOp};
use super::lexer::{tokenize, Token, TokenKind};

/// Statement keywords whose statements carry nothing the extractor reads.
const SKIPPED_KEYWORDS: &[&str] = &[
    "def", "if", "elif", "else", "for", "while", "return", "import", "from", "with", "try",
    "except", "finally", "pass", "raise", "lambda", "assert", "del", "global", "nonlocal",
    "yield", "async", "await", "break", "continue", "match", "case",
];

static EOF: TokenKind = TokenKind::Eof;

/// Deepest expression tree the parser builds.
pub const MAX_DEPTH: usize = 100;

/// Parse `source` into a statement list.
pub fn parse(source: &str) -> Vec<Stmt> {
    StrategyParser::new(source, tokenize(source)).parse_module()
}

pub struct StrategyParser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    last_end: usize,
    depth: usize,
}

impl<'a> StrategyParser<'a> {
    pub fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            last_end: 0,
            depth: 0,
        }
    }

    pub fn parse_module(mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();
        while !self.at(&TokenKind::Eof) {
            if self.eat(&TokenKind::Newline) {
                continue;
            }
            statements.push(self.parse_statement());
        }
        statements
    }

    // ─── Token cursor ───────────────────────────────────────────────

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.kind)
            .unwrap_or(&EOF)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.position)
            .unwrap_or(self.source.len())
    }

    fn bump(&mut self) {
        if let Some(token) = self.tokens.get(self.pos) {
            if token.kind != TokenKind::Eof {
                self.last_end = token.end();
                self.pos += 1;
            }
        }
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn at_ident(&self, name: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(s) if s == name)
    }

    fn at_line_end(&self) -> bool {
        matches!(self.peek(), TokenKind::Newline | TokenKind::Eof)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if self.at_ident(name) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_to_line_end(&mut self) {
        while !self.at_line_end() {
            self.bump();
        }
        self.eat(&TokenKind::Newline);
    }

    /// Skip the rest of the current element: stops before a `,` or closing
    /// bracket at the current nesting level, or at the end of the line.
    fn skip_element(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                TokenKind::Newline | TokenKind::Eof => return,
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                TokenKind::Comma if depth == 0 => return,
                _ => {}
            }
            self.bump();
        }
    }

    /// Spend one level of the depth budget; `false` once it is exhausted.
    fn descend(&mut self) -> bool {
        if self.depth >= MAX_DEPTH {
            return false;
        }
        self.depth += 1;
        true
    }

    /// Give up on the current element: skip it and restore the budget to `mark`.
    fn too_deep(&mut self, mark: usize) -> Expr {
        self.skip_element();
        self.depth = mark;
        Expr::Unknown
    }

    // ─── Statements ─────────────────────────────────────────────────

    fn parse_statement(&mut self) -> Stmt {
        let line = self.line();
        let stmt = match self.peek().clone() {
            TokenKind::Ident(kw) if kw == "class" => {
                self.bump();
                match self.peek().clone() {
                    TokenKind::Ident(name) => Stmt::Class { name, line },
                    _ => Stmt::Other { line },
                }
            }
            TokenKind::Ident(kw) if SKIPPED_KEYWORDS.contains(&kw.as_str()) => Stmt::Other { line },
            TokenKind::At => Stmt::Other { line },
            _ => self.parse_assignment(line),
        };
        self.skip_to_line_end();
        stmt
    }

    fn parse_assignment(&mut self, line: usize) -> Stmt {
        let target = self.parse_expr();
        if self.eat(&TokenKind::Colon) {
            // annotation
            self.parse_expr();
        }
        if !self.eat(&TokenKind::Assign) {
            return Stmt::Other { line };
        }
        let mut value = self.parse_expr();
        if !self.at_line_end() {
            // chained assignment or trailing construct
            value = Expr::Unknown;
        }
        Stmt::Assign {
            target,
            value,
            line,
        }
    }

    // ─── Expressions ────────────────────────────────────────────────

    pub fn parse_expr(&mut self) -> Expr {
        let mark = self.depth;
        if !self.descend() {
            return self.too_deep(mark);
        }
        let expr = self.parse_or();
        self.depth = mark;
        if self.at_ident("if") {
            self.skip_element();
            return Expr::Unknown;
        }
        expr
    }

    fn parse_or(&mut self) -> Expr {
        let mark = self.depth;
        let mut left = self.parse_and();
        while self.eat_ident("or") {
            if !self.descend() {
                return self.too_deep(mark);
            }
            let right = self.parse_and();
            left = binary(left, BinaryOp::Or, right);
        }
        self.depth = mark;
        left
    }

    fn parse_and(&mut self) -> Expr {
        let mark = self.depth;
        let mut left = self.parse_not();
        while self.eat_ident("and") {
            if !self.descend() {
                return self.too_deep(mark);
            }
            let right = self.parse_not();
            left = binary(left, BinaryOp::And, right);
        }
        self.depth = mark;
        left
    }

    fn parse_not(&mut self) -> Expr {
        let mark = self.depth;
        let mut negations = 0usize;
        while self.eat_ident("not") {
            if !self.descend() {
                return self.too_deep(mark);
            }
            negations += 1;
        }
        let mut expr = self.parse_comparison();
        for _ in 0..negations {
            expr = Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(expr),
            };
        }
        self.depth = mark;
        expr
    }

    fn parse_comparison(&mut self) -> Expr {
        let mark = self.depth;
        let mut left = self.parse_bitor();
        loop {
            match self.peek().clone() {
                TokenKind::Compare(op) => {
                    self.bump();
                    if !self.descend() {
                        return self.too_deep(mark);
                    }
                    let right = self.parse_bitor();
                    left = Expr::Compare {
                        left: Box::new(left),
                        op,
                        right: Box::new(right),
                    };
                }
                TokenKind::Ident(kw) if kw == "in" || kw == "is" => {
                    self.bump();
                    self.eat_ident("not");
                    self.parse_bitor();
                    left = Expr::Unknown;
                }
                TokenKind::Ident(kw) if kw == "not" && self.peek_at(1) == &ident("in") => {
                    self.bump();
                    self.bump();
                    self.parse_bitor();
                    left = Expr::Unknown;
                }
                _ => {
                    self.depth = mark;
                    return left;
                }
            }
        }
    }

    fn parse_bitor(&mut self) -> Expr {
        let mark = self.depth;
        let mut left = self.parse_bitand();
        while self.eat(&TokenKind::Pipe) {
            if !self.descend() {
                return self.too_deep(mark);
            }
            let right = self.parse_bitand();
            left = binary(left, BinaryOp::BitOr, right);
        }
        self.depth = mark;
        left
    }

    fn parse_bitand(&mut self) -> Expr {
        let mark = self.depth;
        let mut left = self.parse_arith();
        while self.eat(&TokenKind::Amp) {
            if !self.descend() {
                return self.too_deep(mark);
            }
            let right = self.parse_arith();
            left = binary(left, BinaryOp::BitAnd, right);
        }
        self.depth = mark;
        left
    }

    fn parse_arith(&mut self) -> Expr {
        let mark = self.depth;
        let mut left = self.parse_term();
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.bump();
            if !self.descend() {
                return self.too_deep(mark);
            }
            let right = self.parse_term();
            left = binary(left, op, right);
        }
        self.depth = mark;
        left
    }

    fn parse_term(&mut self) -> Expr {
        let mark = self.depth;
        let mut left = self.parse_factor();
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                TokenKind::At => BinaryOp::MatMul,
                _ => break,
            };
            self.bump();
            if op == BinaryOp::Div {
                // floor division
                self.eat(&TokenKind::Slash);
            }
            if !self.descend() {
                return self.too_deep(mark);
            }
            let right = self.parse_factor();
            left = binary(left, op, right);
        }
        self.depth = mark;
        left
    }

    fn parse_factor(&mut self) -> Expr {
        let mark = self.depth;
        let mut prefixes = Vec::new();
        loop {
            let op = match self.peek() {
                TokenKind::Minus => UnaryOp::Neg,
                TokenKind::Plus => UnaryOp::Pos,
                TokenKind::Tilde => UnaryOp::Invert,
                _ => break,
            };
            self.bump();
            if !self.descend() {
                return self.too_deep(mark);
            }
            prefixes.push(op);
        }
        let mut expr = self.parse_power();
        // innermost operator is the last one written
        while let Some(op) = prefixes.pop() {
            expr = Expr::Unary {
                op,
                operand: Box::new(expr),
            };
        }
        self.depth = mark;
        expr
    }

    fn parse_power(&mut self) -> Expr {
        let mark = self.depth;
        let base = self.parse_postfix();
        if self.eat(&TokenKind::DoubleStar) {
            if !self.descend() {
                return self.too_deep(mark);
            }
            let exponent = self.parse_factor();
            self.depth = mark;
            return binary(base, BinaryOp::Pow, exponent);
        }
        base
    }

    fn parse_postfix(&mut self) -> Expr {
        let mark = self.depth;
        let mut expr = self.parse_atom();
        loop {
            if matches!(
                self.peek(),
                TokenKind::Dot | TokenKind::LBracket | TokenKind::LParen
            ) && !self.descend()
            {
                return self.too_deep(mark);
            }
            match self.peek() {
                TokenKind::Dot => {
                    self.bump();
                    expr = match self.peek().clone() {
                        TokenKind::Ident(attr) => {
                            self.bump();
                            Expr::Attribute {
                                value: Box::new(expr),
                                attr,
                            }
                        }
                        _ => Expr::Unknown,
                    };
                }
                TokenKind::LBracket => {
                    self.bump();
                    let (index, _) = self.parse_items(&TokenKind::RBracket);
                    expr = Expr::Subscript {
                        value: Box::new(expr),
                        index,
                    };
                }
                TokenKind::LParen => {
                    self.bump();
                    let args = self.parse_args();
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                    };
                }
                _ => {
                    self.depth = mark;
                    return expr;
                }
            }
        }
    }

    fn parse_atom(&mut self) -> Expr {
        match self.peek().clone() {
            TokenKind::Number(v) => {
                self.bump();
                Expr::Number(v)
            }
            TokenKind::Str(s) => {
                self.bump();
                let mut text = s;
                // implicit concatenation of adjacent literals
                while let TokenKind::Str(next) = self.peek().clone() {
                    self.bump();
                    text.push_str(&next);
                }
                Expr::Str(text)
            }
            TokenKind::Ident(name) => match name.as_str() {
                "True" => {
                    self.bump();
                    Expr::Bool(true)
                }
                "False" => {
                    self.bump();
                    Expr::Bool(false)
                }
                "None" => {
                    self.bump();
                    Expr::None
                }
                "lambda" | "yield" | "await" => {
                    self.skip_element();
                    Expr::Unknown
                }
                _ => {
                    self.bump();
                    Expr::Name(name)
                }
            },
            TokenKind::LParen => {
                self.bump();
                let (mut items, trailing_comma) = self.parse_items(&TokenKind::RParen);
                if items.len() == 1 && !trailing_comma {
                    items.remove(0)
                } else {
                    Expr::Tuple(items)
                }
            }
            TokenKind::LBracket => {
                self.bump();
                let (items, _) = self.parse_items(&TokenKind::RBracket);
                Expr::List(items)
            }
            TokenKind::LBrace => {
                self.bump();
                self.parse_dict()
            }
            TokenKind::Newline
            | TokenKind::Eof
            | TokenKind::RParen
            | TokenKind::RBracket
            | TokenKind::RBrace
            | TokenKind::Comma
            | TokenKind::Colon
            | TokenKind::Assign => Expr::Unknown,
            _ => {
                self.bump();
                Expr::Unknown
            }
        }
    }

    /// One element of a bracketed list: handles `*x`, slices, and comprehensions.
    fn parse_element(&mut self) -> Expr {
        if matches!(self.peek(), TokenKind::Star | TokenKind::DoubleStar) {
            self.skip_element();
            return Expr::Unknown;
        }
        if self.at(&TokenKind::Colon) {
            // slice with empty start
            self.skip_element();
            return Expr::Unknown;
        }
        let expr = self.parse_expr();
        if self.at(&TokenKind::Colon) || self.at_ident("for") || self.at_ident("async") {
            self.skip_element();
            return Expr::Unknown;
        }
        expr
    }

    /// Comma-separated elements up to `closer` (consumed). Returns the elements
    /// and whether the last one was followed by a comma.
    fn parse_items(&mut self, closer: &TokenKind) -> (Vec<Expr>, bool) {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.eat(closer) || self.at_line_end() {
                break;
            }
            let start = self.pos;
            let mut item = self.parse_element();
            trailing_comma = false;
            if !self.at(&TokenKind::Comma) && !self.at(closer) && !self.at_line_end() {
                self.skip_element();
                item = Expr::Unknown;
            }
            items.push(item);
            if self.eat(&TokenKind::Comma) {
                trailing_comma = true;
            } else if self.pos == start {
                // stray closing bracket of another kind
                self.bump();
            }
        }
        (items, trailing_comma)
    }

    fn parse_args(&mut self) -> Vec<Arg> {
        let mut args = Vec::new();
        loop {
            if self.eat(&TokenKind::RParen) || self.at_line_end() {
                break;
            }
            let start = self.pos;
            let name = match self.peek().clone() {
                TokenKind::Ident(n) if self.peek_at(1) == &TokenKind::Assign => {
                    self.bump();
                    self.bump();
                    Some(n)
                }
                _ => None,
            };
            let value_start = self.position();
            let mut value = self.parse_element();
            if !self.at(&TokenKind::Comma) && !self.at(&TokenKind::RParen) && !self.at_line_end() {
                self.skip_element();
                value = Expr::Unknown;
            }
            let raw = self
                .source
                .get(value_start..self.last_end.max(value_start))
                .unwrap_or("")
                .trim()
                .to_string();
            args.push(Arg { name, value, raw });
            if !self.eat(&TokenKind::Comma) && self.pos == start {
                self.bump();
            }
        }
        args
    }

    fn parse_dict(&mut self) -> Expr {
        let mut entries = Vec::new();
        loop {
            if self.eat(&TokenKind::RBrace) || self.at_line_end() {
                break;
            }
            let start = self.pos;
            if self.at(&TokenKind::DoubleStar) {
                self.skip_element();
            } else {
                let key = self.parse_expr();
                if self.eat(&TokenKind::Colon) {
                    let value = self.parse_expr();
                    if self.at(&TokenKind::Comma) || self.at(&TokenKind::RBrace) {
                        entries.push((key, value));
                    } else {
                        self.skip_element();
                    }
                } else {
                    // set literal or comprehension
                    self.skip_element();
                }
            }
            if !self.eat(&TokenKind::Comma) && self.pos == start {
                self.bump();
            }
        }
        Expr::Dict(entries)
    }
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

fn ident(name: &str) -> TokenKind {
    TokenKind::Ident(name.to_string())
}
