//! Boolean parser.
//!
//! Parses the normalized token string (`&`, `|`, `~`, parentheses,
//! bare terms) into a simplified [`Expr`] whose canonical string form
//! is stable: parsing the canonical form again yields an equal
//! expression.

use crate::types::{ScrapeError, ScrapeResult};
use std::iter::Peekable;
use std::str::CharIndices;

/// Boolean operators a backend grammar may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    And,
    Or,
    Not,
}

/// A canonical boolean expression over search terms.
///
/// Invariants maintained by the smart constructors:
/// - no `Not(Not(_))` (double negation is folded),
/// - `And`/`Or` children are flattened (no `And` directly inside `And`),
/// - `And`/`Or` always hold at least two children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Term(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    fn not(inner: Expr) -> Expr {
        match inner {
            Expr::Not(e) => *e,
            other => Expr::Not(Box::new(other)),
        }
    }

    fn and(children: Vec<Expr>) -> Expr {
        Self::flatten(children, true)
    }

    fn or(children: Vec<Expr>) -> Expr {
        Self::flatten(children, false)
    }

    fn flatten(children: Vec<Expr>, is_and: bool) -> Expr {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Expr::And(inner) if is_and => flat.extend(inner),
                Expr::Or(inner) if !is_and => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            return flat.pop().unwrap();
        }
        if is_and {
            Expr::And(flat)
        } else {
            Expr::Or(flat)
        }
    }

    /// Render the canonical string form: `&`/`|`/`~` with the minimal
    /// parenthesization precedence requires. This is the stable artifact
    /// shown to the user and handed to renderers.
    pub fn canonical(&self) -> String {
        match self {
            Expr::Term(t) => t.clone(),
            Expr::Not(inner) => match inner.as_ref() {
                Expr::Term(t) => format!("~{}", t),
                other => format!("~({})", other.canonical()),
            },
            Expr::And(children) => children
                .iter()
                .map(|c| match c {
                    // OR binds loosest, so an OR operand of AND keeps parens.
                    Expr::Or(_) => format!("({})", c.canonical()),
                    _ => c.canonical(),
                })
                .collect::<Vec<_>>()
                .join("&"),
            Expr::Or(children) => children
                .iter()
                .map(|c| c.canonical())
                .collect::<Vec<_>>()
                .join("|"),
        }
    }

    /// Every term appearing in the expression, in rendering order.
    pub fn terms(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_terms(&mut out);
        out
    }

    fn collect_terms<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Term(t) => out.push(t),
            Expr::Not(inner) => inner.collect_terms(out),
            Expr::And(children) | Expr::Or(children) => {
                for c in children {
                    c.collect_terms(out);
                }
            }
        }
    }

    /// The set of operators the expression actually uses. Backends
    /// declare which operators they can represent; the check happens
    /// before a job starts.
    pub fn ops_used(&self) -> Vec<Op> {
        let mut ops = Vec::new();
        self.collect_ops(&mut ops);
        ops
    }

    fn collect_ops(&self, ops: &mut Vec<Op>) {
        let mut add = |op: Op| {
            if !ops.contains(&op) {
                ops.push(op);
            }
        };
        match self {
            Expr::Term(_) => {}
            Expr::Not(inner) => {
                add(Op::Not);
                inner.collect_ops(ops);
            }
            Expr::And(children) => {
                add(Op::And);
                for c in children {
                    c.collect_ops(ops);
                }
            }
            Expr::Or(children) => {
                add(Op::Or);
                for c in children {
                    c.collect_ops(ops);
                }
            }
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Parse a normalized token string into a canonical expression.
///
/// Grammar (NOT > AND > OR, left-associative):
/// ```text
/// or_expr  := and_expr ('|' and_expr)*
/// and_expr := not_expr ('&' not_expr)*
/// not_expr := '~' not_expr | term | '(' or_expr ')'
/// ```
pub fn parse(input: &str) -> ScrapeResult<Expr> {
    let mut parser = Parser {
        src: input,
        chars: input.char_indices().peekable(),
    };
    let expr = parser.or_expr()?;
    if let Some(&(pos, _)) = parser.chars.peek() {
        return Err(parser.error("unexpected trailing input", pos));
    }
    Ok(expr)
}

struct Parser<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn error(&self, message: &str, position: usize) -> ScrapeError {
        let fragment: String = self.src[position.min(self.src.len())..]
            .chars()
            .take(12)
            .collect();
        ScrapeError::Syntax {
            message: message.to_string(),
            fragment,
            position,
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if matches!(self.chars.peek(), Some(&(_, c)) if c == expected) {
            self.chars.next();
            return true;
        }
        false
    }

    fn or_expr(&mut self) -> ScrapeResult<Expr> {
        let mut children = vec![self.and_expr()?];
        while self.eat('|') {
            children.push(self.and_expr()?);
        }
        Ok(Expr::or(children))
    }

    fn and_expr(&mut self) -> ScrapeResult<Expr> {
        let mut children = vec![self.not_expr()?];
        while self.eat('&') {
            children.push(self.not_expr()?);
        }
        Ok(Expr::and(children))
    }

    fn not_expr(&mut self) -> ScrapeResult<Expr> {
        if self.eat('~') {
            return Ok(Expr::not(self.not_expr()?));
        }
        self.atom()
    }

    fn atom(&mut self) -> ScrapeResult<Expr> {
        match self.chars.peek().copied() {
            Some((open, '(')) => {
                self.chars.next();
                let inner = self.or_expr()?;
                if !self.eat(')') {
                    return Err(self.error("unbalanced parenthesis", open));
                }
                Ok(inner)
            }
            Some((_, c)) if c.is_alphanumeric() || c == '_' => {
                let mut term = String::new();
                while let Some(&(_, c)) = self.chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        term.push(c);
                        self.chars.next();
                    } else {
                        break;
                    }
                }
                Ok(Expr::Term(term))
            }
            Some((pos, _)) => Err(self.error("expected a term or '('", pos)),
            None => Err(self.error("unexpected end of query", self.src.len())),
        }
    }
}
