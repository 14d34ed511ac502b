//! Text form of functor parameters and bodies.
//!
//! Parameters: `inout out`, `in u [1, 1, 0, 0]` (horizontal extent
//! `iminus, iplus, jminus, jplus`) or six widths including k.
//!
//! Bodies are assignments separated by newlines or `;`:
//!
//! ```text
//! sup = sup / (diag - sup[0,0,-1] * inf)
//! out = rhs - sup * out[0,0,1]
//! u   = 0.5 * (u@1 + u@2)
//! ```
//!
//! `name[di,dj,dk]` reads at an offset, `name@n` reads snapshot `n`.
//! Calls: `min`, `max`, `abs`, `sqrt`, `exp`.
//!
//! Spans are relative to the parsed string and shifted by `base`, so a
//! caller that knows where the string sits in a file gets file spans.

use crate::diagnostic::Diagnostic;
use crate::span::{Span, Spanned};

use super::{Accessor, Assign, BinOp, Expr, Extent, Intent, Param, UnOp};

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Ident(String),
    Number(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Eq,
    At,
    Sep,
    Eof,
}

impl Tok {
    fn description(&self) -> String {
        match self {
            Tok::Ident(name) => format!("identifier '{}'", name),
            Tok::Number(n) => format!("number {}", n),
            Tok::LParen => "'('".to_string(),
            Tok::RParen => "')'".to_string(),
            Tok::LBracket => "'['".to_string(),
            Tok::RBracket => "']'".to_string(),
            Tok::Comma => "','".to_string(),
            Tok::Plus => "'+'".to_string(),
            Tok::Minus => "'-'".to_string(),
            Tok::Star => "'*'".to_string(),
            Tok::Slash => "'/'".to_string(),
            Tok::Eq => "'='".to_string(),
            Tok::At => "'@'".to_string(),
            Tok::Sep => "end of statement".to_string(),
            Tok::Eof => "end of input".to_string(),
        }
    }
}

// ─── Lexer ─────────────────────────────────────────────────────────

fn tokenize(src: &str, base: u32) -> Result<Vec<Spanned<Tok>>, Vec<Diagnostic>> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();
    let mut pos = 0;
    let span = |start: usize, end: usize| Span::new(start as u32, end as u32).offset(base);

    while pos < bytes.len() {
        let ch = bytes[pos];
        let start = pos;
        match ch {
            b' ' | b'\t' | b'\r' => pos += 1,
            b'#' => {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
            }
            b'\n' | b';' => {
                pos += 1;
                tokens.push(Spanned::new(Tok::Sep, span(start, pos)));
            }
            b'0'..=b'9' | b'.' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                    pos += 1;
                }
                if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
                    pos += 1;
                    if pos < bytes.len() && (bytes[pos] == b'+' || bytes[pos] == b'-') {
                        pos += 1;
                    }
                    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
                let text = &src[start..pos];
                match text.parse::<f64>() {
                    Ok(n) => tokens.push(Spanned::new(Tok::Number(n), span(start, pos))),
                    Err(_) => diagnostics.push(Diagnostic::error(
                        format!("invalid number literal '{}'", text),
                        span(start, pos),
                    )),
                }
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                    pos += 1;
                }
                tokens.push(Spanned::new(
                    Tok::Ident(src[start..pos].to_string()),
                    span(start, pos),
                ));
            }
            _ => {
                pos += 1;
                let tok = match ch {
                    b'(' => Tok::LParen,
                    b')' => Tok::RParen,
                    b'[' => Tok::LBracket,
                    b']' => Tok::RBracket,
                    b',' => Tok::Comma,
                    b'+' => Tok::Plus,
                    b'-' => Tok::Minus,
                    b'*' => Tok::Star,
                    b'/' => Tok::Slash,
                    b'=' => Tok::Eq,
                    b'@' => Tok::At,
                    _ => {
                        // skip the rest of a multi-byte character
                        while pos < bytes.len() && !src.is_char_boundary(pos) {
                            pos += 1;
                        }
                        diagnostics.push(Diagnostic::error(
                            format!("unexpected character '{}'", &src[start..pos]),
                            span(start, pos),
                        ));
                        continue;
                    }
                };
                tokens.push(Spanned::new(tok, span(start, pos)));
            }
        }
    }
    tokens.push(Spanned::new(Tok::Eof, span(bytes.len(), bytes.len())));

    if diagnostics.is_empty() {
        Ok(tokens)
    } else {
        Err(diagnostics)
    }
}

// ─── Parser ────────────────────────────────────────────────────────

struct Parser<'p> {
    tokens: Vec<Spanned<Tok>>,
    pos: usize,
    params: &'p [Param],
    diagnostics: Vec<Diagnostic>,
}

impl<'p> Parser<'p> {
    fn new(tokens: Vec<Spanned<Tok>>, params: &'p [Param]) -> Self {
        Self {
            tokens,
            pos: 0,
            params,
            diagnostics: Vec::new(),
        }
    }

    fn finish<R>(self, value: R) -> Result<R, Vec<Diagnostic>> {
        if self.diagnostics.is_empty() {
            Ok(value)
        } else {
            Err(self.diagnostics)
        }
    }

    fn parse_statements(&mut self) -> Vec<Assign> {
        let mut assigns = Vec::new();
        loop {
            while self.eat(&Tok::Sep) {}
            if self.at(&Tok::Eof) || !self.diagnostics.is_empty() {
                break;
            }
            if let Some(assign) = self.parse_assign() {
                assigns.push(assign);
            }
            if !self.at(&Tok::Eof) && !self.at(&Tok::Sep) {
                self.error_at_current(&format!(
                    "expected end of statement, found {}",
                    self.peek().description()
                ));
            }
        }
        if assigns.is_empty() && self.diagnostics.is_empty() {
            self.error_at_current("body contains no assignment");
        }
        assigns
    }

    fn parse_assign(&mut self) -> Option<Assign> {
        let target = self.parse_accessor()?;
        self.expect(&Tok::Eq);
        let expr = self.parse_expr();
        Some(Assign::new(target.node, expr.node))
    }

    fn parse_expr(&mut self) -> Spanned<Expr> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Spanned<Expr> {
        let mut lhs = self.parse_prefix();

        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                _ => break,
            };
            let (l_bp, r_bp) = binding_power(op);
            if l_bp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_expr_bp(r_bp);
            let span = lhs.span.merge(rhs.span);
            lhs = Spanned::new(Expr::binary(op, lhs.node, rhs.node), span);
        }

        lhs
    }

    fn parse_prefix(&mut self) -> Spanned<Expr> {
        if self.at(&Tok::Minus) {
            let start = self.current_span();
            self.advance();
            let operand = self.parse_expr_bp(PREFIX_BP);
            let span = start.merge(operand.span);
            return Spanned::new(Expr::unary(UnOp::Neg, operand.node), span);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Spanned<Expr> {
        let start = self.current_span();
        match self.peek().clone() {
            Tok::Number(n) => {
                self.advance();
                Spanned::new(Expr::Const(n), start)
            }
            Tok::LParen => {
                self.advance();
                let inner = self.parse_expr();
                self.expect(&Tok::RParen);
                Spanned::new(inner.node, start.merge(self.prev_span()))
            }
            Tok::Ident(name) if self.peek_at(1) == &Tok::LParen => {
                self.advance();
                self.parse_call(&name, start)
            }
            Tok::Ident(_) => match self.parse_accessor() {
                Some(acc) => Spanned::new(Expr::Load(acc.node), acc.span),
                None => Spanned::new(Expr::Const(0.0), start),
            },
            other => {
                self.error_at_current(&format!(
                    "expected expression, found {}",
                    other.description()
                ));
                if !self.at(&Tok::Eof) {
                    self.advance();
                }
                Spanned::new(Expr::Const(0.0), start)
            }
        }
    }

    fn parse_call(&mut self, name: &str, start: Span) -> Spanned<Expr> {
        self.expect(&Tok::LParen);
        let mut args = vec![self.parse_expr()];
        while self.eat(&Tok::Comma) {
            args.push(self.parse_expr());
        }
        self.expect(&Tok::RParen);
        let span = start.merge(self.prev_span());

        let arity = match name {
            "min" | "max" => 2,
            "abs" | "sqrt" | "exp" => 1,
            _ => {
                self.diagnostics.push(
                    Diagnostic::error(format!("unknown function '{}'", name), start)
                        .with_help("available functions: min, max, abs, sqrt, exp".to_string()),
                );
                return Spanned::new(Expr::Const(0.0), span);
            }
        };
        if args.len() != arity {
            self.diagnostics.push(Diagnostic::error(
                format!(
                    "'{}' takes {} argument{}, found {}",
                    name,
                    arity,
                    if arity == 1 { "" } else { "s" },
                    args.len()
                ),
                span,
            ));
            return Spanned::new(Expr::Const(0.0), span);
        }

        let mut args = args.into_iter().map(|a| a.node);
        let first = args.next().unwrap_or(Expr::Const(0.0));
        let expr = match name {
            "min" => Expr::binary(BinOp::Min, first, args.next().unwrap_or(Expr::Const(0.0))),
            "max" => Expr::binary(BinOp::Max, first, args.next().unwrap_or(Expr::Const(0.0))),
            "abs" => Expr::unary(UnOp::Abs, first),
            "sqrt" => Expr::unary(UnOp::Sqrt, first),
            _ => Expr::unary(UnOp::Exp, first),
        };
        Spanned::new(expr, span)
    }

    /// `name`, `name[di,dj,dk]`, optionally followed by `@snapshot`.
    fn parse_accessor(&mut self) -> Option<Spanned<Accessor>> {
        let start = self.current_span();
        let name = match self.peek().clone() {
            Tok::Ident(name) => {
                self.advance();
                name
            }
            other => {
                self.error_at_current(&format!(
                    "expected parameter name, found {}",
                    other.description()
                ));
                return None;
            }
        };
        let param = match self.params.iter().position(|p| p.name == name) {
            Some(index) => index,
            None => {
                let known: Vec<&str> = self.params.iter().map(|p| p.name.as_str()).collect();
                self.diagnostics.push(
                    Diagnostic::error(format!("unknown parameter '{}'", name), start)
                        .with_note(format!("parameters: {}", known.join(", "))),
                );
                return None;
            }
        };

        let mut acc = Accessor::new(param);
        if self.eat(&Tok::LBracket) {
            let di = self.parse_signed_int();
            self.expect(&Tok::Comma);
            let dj = self.parse_signed_int();
            self.expect(&Tok::Comma);
            let dk = self.parse_signed_int();
            self.expect(&Tok::RBracket);
            acc = acc.at(di as i32, dj as i32, dk as i32);
        }
        if self.eat(&Tok::At) {
            let n = self.parse_signed_int();
            if n < 0 {
                self.diagnostics.push(Diagnostic::error(
                    "snapshot index must be non-negative".to_string(),
                    self.prev_span(),
                ));
            }
            acc = acc.snapshot(n.max(0) as usize);
        }
        Some(Spanned::new(acc, start.merge(self.prev_span())))
    }

    fn parse_signed_int(&mut self) -> i64 {
        let negative = self.eat(&Tok::Minus);
        if !negative {
            self.eat(&Tok::Plus);
        }
        match self.peek().clone() {
            Tok::Number(n) if n.fract() == 0.0 && n.abs() <= i32::MAX as f64 => {
                self.advance();
                let v = n as i64;
                if negative {
                    -v
                } else {
                    v
                }
            }
            other => {
                self.error_at_current(&format!(
                    "expected integer, found {}",
                    other.description()
                ));
                if !self.at(&Tok::Eof) {
                    self.advance();
                }
                0
            }
        }
    }

    // ─── Helpers ───────────────────────────────────────────────────

    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].node
    }

    fn peek_at(&self, ahead: usize) -> &Tok {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].node
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            self.current_span()
        }
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn at(&self, tok: &Tok) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(tok)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.at(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) {
        if !self.eat(tok) {
            self.error_at_current(&format!(
                "expected {}, found {}",
                tok.description(),
                self.peek().description()
            ));
        }
    }

    fn error_at_current(&mut self, msg: &str) {
        self.diagnostics
            .push(Diagnostic::error(msg.to_string(), self.current_span()));
    }
}

const PREFIX_BP: u8 = 5;

fn binding_power(op: BinOp) -> (u8, u8) {
    match op {
        BinOp::Add | BinOp::Sub => (1, 2),
        _ => (3, 4),
    }
}

// ─── Entry points ──────────────────────────────────────────────────

/// Parse a body: one or more assignments over `params`.
pub fn parse_body(src: &str, params: &[Param], base: u32) -> Result<Vec<Assign>, Vec<Diagnostic>> {
    let tokens = tokenize(src, base)?;
    let mut parser = Parser::new(tokens, params);
    let assigns = parser.parse_statements();
    parser.finish(assigns)
}

/// Parse a single expression over `params`.
pub fn parse_expr(src: &str, params: &[Param], base: u32) -> Result<Expr, Vec<Diagnostic>> {
    let tokens = tokenize(src, base)?;
    let mut parser = Parser::new(tokens, params);
    let expr = parser.parse_expr();
    if !parser.at(&Tok::Eof) {
        parser.error_at_current(&format!(
            "unexpected {} after expression",
            parser.peek().description()
        ));
    }
    parser.finish(expr.node)
}

/// Parse a parameter declaration: `in name`, `inout name`, with an
/// optional `[iminus, iplus, jminus, jplus]` or six-wide extent.
pub fn parse_param(src: &str, base: u32) -> Result<Param, Vec<Diagnostic>> {
    let tokens = tokenize(src, base)?;
    let mut parser = Parser::new(tokens, &[]);

    let intent_span = parser.current_span();
    let intent = match parser.peek().clone() {
        Tok::Ident(word) if word == "in" => Some(Intent::In),
        Tok::Ident(word) if word == "inout" => Some(Intent::InOut),
        other => {
            parser.diagnostics.push(
                Diagnostic::error(
                    format!("expected parameter intent, found {}", other.description()),
                    intent_span,
                )
                .with_help("write `in name` or `inout name`".to_string()),
            );
            None
        }
    };
    parser.advance();

    let name = match parser.peek().clone() {
        Tok::Ident(name) => {
            parser.advance();
            name
        }
        other => {
            parser.error_at_current(&format!(
                "expected parameter name, found {}",
                other.description()
            ));
            String::new()
        }
    };

    let mut extent = Extent::ZERO;
    if parser.eat(&Tok::LBracket) {
        let open = parser.prev_span();
        let mut widths = vec![parser.parse_signed_int()];
        while parser.eat(&Tok::Comma) {
            widths.push(parser.parse_signed_int());
        }
        parser.expect(&Tok::RBracket);
        let span = open.merge(parser.prev_span());
        if widths.iter().any(|&w| w < 0) {
            parser.diagnostics.push(Diagnostic::error(
                "extent widths must be non-negative".to_string(),
                span,
            ));
        }
        let w: Vec<i32> = widths.iter().map(|&w| w.max(0) as i32).collect();
        match w.len() {
            4 => extent = Extent::horizontal(w[0], w[1], w[2], w[3]),
            6 => extent = Extent::new(w[0], w[1], w[2], w[3], w[4], w[5]),
            n => parser.diagnostics.push(
                Diagnostic::error(format!("extent has {} widths", n), span)
                    .with_help("use [iminus, iplus, jminus, jplus] or six widths including k".to_string()),
            ),
        }
    }
    while parser.eat(&Tok::Sep) {}
    if !parser.at(&Tok::Eof) {
        parser.error_at_current(&format!(
            "unexpected {} after parameter",
            parser.peek().description()
        ));
    }

    let param = Param {
        name,
        intent: intent.unwrap_or(Intent::In),
        extent,
    };
    parser.finish(param)
}
