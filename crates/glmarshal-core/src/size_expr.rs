use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::util::is_ident;

pub const EXTERNAL_SIZE_TOKEN: &str = "COMPSIZE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SizeExpression {
    Literal { expr: String },
    Deferred { symbol: String, expr: String },
}

/// Supplies element counts for deferred `COMPSIZE_*` symbols.
pub trait ExternalSizes {
    fn element_count(&self, symbol: &str, args: &[i64]) -> Option<i64>;
}

pub struct NoExternalSizes;

impl ExternalSizes for NoExternalSizes {
    fn element_count(&self, _symbol: &str, _args: &[i64]) -> Option<i64> {
        None
    }
}

impl<F> ExternalSizes for F
where
    F: Fn(&str, &[i64]) -> Option<i64>,
{
    fn element_count(&self, symbol: &str, args: &[i64]) -> Option<i64> {
        self(symbol, args)
    }
}

pub fn deferred_symbol(function_name: &str, param_name: &str, buffer_param_count: usize) -> String {
    if buffer_param_count > 1 {
        format!("{EXTERNAL_SIZE_TOKEN}_{function_name}_{param_name}")
    } else {
        format!("{EXTERNAL_SIZE_TOKEN}_{function_name}")
    }
}

pub fn resolve(
    length_expr: &str,
    function_name: &str,
    param_name: &str,
    buffer_param_count: usize,
) -> SizeExpression {
    let mut symbol: Option<String> = None;
    let out = rewrite_identifiers(length_expr.trim(), |word| {
        if word != EXTERNAL_SIZE_TOKEN {
            return None;
        }
        let sym = deferred_symbol(function_name, param_name, buffer_param_count);
        symbol = Some(sym.clone());
        Some(sym)
    });

    match symbol {
        Some(symbol) => SizeExpression::Deferred { symbol, expr: out },
        None => SizeExpression::Literal { expr: out },
    }
}

/// Replaces whole identifiers in `expr`; `rename` returns `None` to keep one.
pub(crate) fn rewrite_identifiers(
    expr: &str,
    mut rename: impl FnMut(&str) -> Option<String>,
) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut rest = expr;
    while !rest.is_empty() {
        let ident_len = rest
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if ident_len == 0 {
            let c = rest.chars().next().unwrap_or(' ');
            out.push(c);
            rest = &rest[c.len_utf8()..];
            continue;
        }
        let word = &rest[..ident_len];
        match rename(word) {
            Some(new) => out.push_str(&new),
            None => out.push_str(word),
        }
        rest = &rest[ident_len..];
    }
    out
}

impl SizeExpression {
    pub fn expr(&self) -> &str {
        match self {
            SizeExpression::Literal { expr } | SizeExpression::Deferred { expr, .. } => expr,
        }
    }

    pub fn deferred_symbol(&self) -> Option<&str> {
        match self {
            SizeExpression::Deferred { symbol, .. } => Some(symbol),
            SizeExpression::Literal { .. } => None,
        }
    }

    pub fn byte_count_c(&self, param: &str) -> String {
        let expr = self.expr();
        if is_atom(expr) {
            format!("(sizeof(*({param}))*{expr})")
        } else {
            format!("(sizeof(*({param}))*({expr}))")
        }
    }

    pub fn element_count(
        &self,
        scalars: &BTreeMap<String, i64>,
        external: &dyn ExternalSizes,
    ) -> Result<u64, Diagnostic> {
        let toks = tokenize(self.expr())?;
        let mut p = Evaluator {
            src: self.expr(),
            toks: &toks,
            pos: 0,
            scalars,
            external,
        };
        let v = p.expr()?;
        if p.pos != toks.len() {
            return Err(p.err("trailing tokens"));
        }
        u64::try_from(v).map_err(|_| p.err(&format!("negative element count {v}")))
    }
}

fn is_atom(expr: &str) -> bool {
    if is_ident(expr) || (!expr.is_empty() && expr.bytes().all(|b| b.is_ascii_digit())) {
        return true;
    }
    // `f(a,b)` with a single balanced call.
    match expr.split_once('(') {
        Some((head, tail)) => {
            is_ident(head)
                && tail.ends_with(')')
                && !tail[..tail.len() - 1].contains(|c: char| c == '(' || c == ')')
        }
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Num(i64),
    Ident(String),
    Op(char),
}

fn tokenize(src: &str) -> Result<Vec<Tok>, Diagnostic> {
    let mut out = Vec::new();
    let bytes = src.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
        } else if b.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let n: i64 = src[start..i].parse().map_err(|_| {
                eval_err(src, &format!("integer literal out of range: {}", &src[start..i]))
            })?;
            out.push(Tok::Num(n));
        } else if b == b'_' || b.is_ascii_alphabetic() {
            let start = i;
            while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                i += 1;
            }
            out.push(Tok::Ident(src[start..i].to_string()));
        } else if b"+-*/(),".contains(&b) {
            out.push(Tok::Op(b as char));
            i += 1;
        } else {
            return Err(eval_err(src, &format!("unexpected character {:?}", b as char)));
        }
    }
    Ok(out)
}

struct Evaluator<'a> {
    src: &'a str,
    toks: &'a [Tok],
    pos: usize,
    scalars: &'a BTreeMap<String, i64>,
    external: &'a dyn ExternalSizes,
}

impl Evaluator<'_> {
    fn err(&self, msg: &str) -> Diagnostic {
        eval_err(self.src, msg)
    }

    fn peek_op(&self) -> Option<char> {
        match self.toks.get(self.pos) {
            Some(Tok::Op(c)) => Some(*c),
            _ => None,
        }
    }

    fn expect_op(&mut self, op: char) -> Result<(), Diagnostic> {
        if self.peek_op() == Some(op) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.err(&format!("expected {op:?}")))
        }
    }

    fn expr(&mut self) -> Result<i64, Diagnostic> {
        let mut acc = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek_op() {
            self.pos += 1;
            let rhs = self.term()?;
            acc = if op == '+' {
                acc.checked_add(rhs)
            } else {
                acc.checked_sub(rhs)
            }
            .ok_or_else(|| self.err("arithmetic overflow"))?;
        }
        Ok(acc)
    }

    fn term(&mut self) -> Result<i64, Diagnostic> {
        let mut acc = self.factor()?;
        while let Some(op @ ('*' | '/')) = self.peek_op() {
            self.pos += 1;
            let rhs = self.factor()?;
            acc = if op == '*' {
                acc.checked_mul(rhs)
            } else {
                acc.checked_div(rhs)
            }
            .ok_or_else(|| self.err("arithmetic overflow or division by zero"))?;
        }
        Ok(acc)
    }

    fn factor(&mut self) -> Result<i64, Diagnostic> {
        let Some(tok) = self.toks.get(self.pos).cloned() else {
            return Err(self.err("unexpected end of expression"));
        };
        self.pos += 1;
        match tok {
            Tok::Num(n) => Ok(n),
            Tok::Op('-') => Ok(-self.factor()?),
            Tok::Op('(') => {
                let v = self.expr()?;
                self.expect_op(')')?;
                Ok(v)
            }
            Tok::Ident(name) if self.peek_op() == Some('(') => {
                self.pos += 1;
                let mut args = Vec::new();
                if self.peek_op() != Some(')') {
                    loop {
                        args.push(self.expr()?);
                        if self.peek_op() == Some(',') {
                            self.pos += 1;
                            continue;
                        }
                        break;
                    }
                }
                self.expect_op(')')?;
                self.external
                    .element_count(&name, &args)
                    .ok_or_else(|| self.err(&format!("no external size for {name}")))
            }
            Tok::Ident(name) => self
                .scalars
                .get(&name)
                .copied()
                .ok_or_else(|| self.err(&format!("unknown parameter {name}"))),
            Tok::Op(c) => Err(self.err(&format!("unexpected {c:?}"))),
        }
    }
}

fn eval_err(src: &str, msg: &str) -> Diagnostic {
    Diagnostic::error(
        DiagnosticCode::Glm0300SizeExprEval,
        format!("{msg} in size expression {src:?}"),
    )
}
