//! The template expression language: arithmetic, comparisons, logic,
//! string concatenation and assignments over named scope values.
//!
//! Built on `winnow` 0.7. The grammar is deliberately small — whatever a
//! `$-expr` / `$-if` / `$-eval` directive needs and nothing more. Parsing
//! errors surface as formatted strings at the public boundary; evaluation
//! works on `serde_json::Value` so template scopes and document fragments
//! share one value type.

use serde_json::Value;
use winnow::combinator::delimited;
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::{take_till, take_while};

// ─── AST ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Assign(String, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

/// Parse a complete expression string. Trailing garbage is an error.
pub fn parse_expression(input: &str) -> Result<Expr, String> {
    let mut rest = input;
    skip_space(&mut rest);
    let parsed = expr
        .parse_next(&mut rest)
        .map_err(|e| format!("invalid expression {input:?}: {e}"))?;
    skip_space(&mut rest);
    if !rest.is_empty() {
        return Err(format!("unexpected trailing input in expression {input:?}: {rest:?}"));
    }
    Ok(parsed)
}

// ─── Parser ──────────────────────────────────────────────────────────────

fn skip_space(input: &mut &str) {
    *input = input.trim_start();
}

fn fail<T>() -> ModalResult<T> {
    Err(winnow::error::ErrMode::Backtrack(ContextError::new()))
}

fn identifier<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    let first_ok = input
        .chars()
        .next()
        .map(|c| c.is_alphabetic() || c == '_')
        .unwrap_or(false);
    if !first_ok {
        return fail();
    }
    take_while(1.., |c: char| c.is_alphanumeric() || c == '_').parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<f64> {
    let digits = take_while(1.., |c: char| c.is_ascii_digit() || c == '.').parse_next(input)?;
    digits.parse::<f64>().map_or_else(|_| fail(), Ok)
}

fn string_literal(input: &mut &str) -> ModalResult<String> {
    let quote = match input.chars().next() {
        Some(c @ ('\'' | '"')) => c,
        _ => return fail(),
    };
    let inner: &str =
        delimited(quote, take_till(0.., quote), quote).parse_next(input)?;
    Ok(inner.to_string())
}

fn expr(input: &mut &str) -> ModalResult<Expr> {
    // Assignment: `name = value` (but not `name == value`).
    let checkpoint = *input;
    if let Ok(name) = identifier(input) {
        skip_space(input);
        if input.starts_with('=') && !input.starts_with("==") {
            *input = &input[1..];
            skip_space(input);
            let rhs = expr.parse_next(input)?;
            return Ok(Expr::Assign(name.to_string(), Box::new(rhs)));
        }
    }
    *input = checkpoint;
    or_expr.parse_next(input)
}

fn or_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut lhs = and_expr.parse_next(input)?;
    loop {
        skip_space(input);
        if let Some(rest) = input.strip_prefix("||") {
            *input = rest;
            skip_space(input);
            let rhs = and_expr.parse_next(input)?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        } else {
            return Ok(lhs);
        }
    }
}

fn and_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut lhs = cmp_expr.parse_next(input)?;
    loop {
        skip_space(input);
        if let Some(rest) = input.strip_prefix("&&") {
            *input = rest;
            skip_space(input);
            let rhs = cmp_expr.parse_next(input)?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        } else {
            return Ok(lhs);
        }
    }
}

fn cmp_expr(input: &mut &str) -> ModalResult<Expr> {
    let lhs = add_expr.parse_next(input)?;
    skip_space(input);
    let op = if let Some(rest) = input.strip_prefix("==") {
        *input = rest;
        BinOp::Eq
    } else if let Some(rest) = input.strip_prefix("!=") {
        *input = rest;
        BinOp::Ne
    } else if let Some(rest) = input.strip_prefix("<=") {
        *input = rest;
        BinOp::Le
    } else if let Some(rest) = input.strip_prefix(">=") {
        *input = rest;
        BinOp::Ge
    } else if let Some(rest) = input.strip_prefix('<') {
        *input = rest;
        BinOp::Lt
    } else if let Some(rest) = input.strip_prefix('>') {
        *input = rest;
        BinOp::Gt
    } else {
        return Ok(lhs);
    };
    skip_space(input);
    let rhs = add_expr.parse_next(input)?;
    Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
}

fn add_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut lhs = mul_expr.parse_next(input)?;
    loop {
        skip_space(input);
        let op = match input.chars().next() {
            Some('+') => BinOp::Add,
            // `-` only when it is not the start of a negative atom; binary
            // context is unambiguous here.
            Some('-') => BinOp::Sub,
            _ => return Ok(lhs),
        };
        *input = &input[1..];
        skip_space(input);
        let rhs = mul_expr.parse_next(input)?;
        lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }
}

fn mul_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut lhs = unary.parse_next(input)?;
    loop {
        skip_space(input);
        let op = match input.chars().next() {
            Some('*') => BinOp::Mul,
            Some('/') => BinOp::Div,
            Some('%') => BinOp::Mod,
            _ => return Ok(lhs),
        };
        *input = &input[1..];
        skip_space(input);
        let rhs = unary.parse_next(input)?;
        lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }
}

fn unary(input: &mut &str) -> ModalResult<Expr> {
    skip_space(input);
    if let Some(rest) = input.strip_prefix('-') {
        *input = rest;
        let inner = unary.parse_next(input)?;
        return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
    }
    if let Some(rest) = input.strip_prefix('!') {
        *input = rest;
        let inner = unary.parse_next(input)?;
        return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
    }
    atom.parse_next(input)
}

fn atom(input: &mut &str) -> ModalResult<Expr> {
    skip_space(input);
    match input.chars().next() {
        Some('(') => {
            *input = &input[1..];
            skip_space(input);
            let inner = expr.parse_next(input)?;
            skip_space(input);
            if let Some(rest) = input.strip_prefix(')') {
                *input = rest;
                Ok(inner)
            } else {
                fail()
            }
        }
        Some('\'' | '"') => string_literal.parse_next(input).map(Expr::Str),
        Some(c) if c.is_ascii_digit() || c == '.' => number.parse_next(input).map(Expr::Num),
        _ => {
            let name = identifier.parse_next(input)?;
            match name {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                _ => Ok(Expr::Var(name.to_string())),
            }
        }
    }
}

// ─── Scope ───────────────────────────────────────────────────────────────

/// A chain of value frames plus a parallel chain of `$-def` definitions.
/// Lookup walks outward; the nearest binding wins.
#[derive(Debug, Default)]
pub struct Scope {
    frames: Vec<serde_json::Map<String, Value>>,
    defs: Vec<serde_json::Map<String, Value>>,
}

impl Scope {
    pub fn new() -> Self {
        Self {
            frames: vec![serde_json::Map::new()],
            defs: vec![serde_json::Map::new()],
        }
    }

    pub fn with_values(values: serde_json::Map<String, Value>) -> Self {
        Self {
            frames: vec![values],
            defs: vec![serde_json::Map::new()],
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(serde_json::Map::new());
        self.defs.push(serde_json::Map::new());
    }

    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
            self.defs.pop();
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Assignment overwrites the nearest existing binding, otherwise it
    /// creates one in the current frame.
    pub fn set(&mut self, name: &str, value: Value) {
        for frame in self.frames.iter_mut().rev() {
            if frame.contains_key(name) {
                frame.insert(name.to_string(), value);
                return;
            }
        }
        if let Some(top) = self.frames.last_mut() {
            top.insert(name.to_string(), value);
        }
    }

    /// Bind the loop variable in the current frame regardless of outer
    /// bindings with the same name.
    pub fn bind_local(&mut self, name: &str, value: Value) {
        if let Some(top) = self.frames.last_mut() {
            top.insert(name.to_string(), value);
        }
    }

    pub fn define(&mut self, name: &str, template: Value) {
        if let Some(top) = self.defs.last_mut() {
            top.insert(name.to_string(), template);
        }
    }

    pub fn lookup_def(&self, name: &str) -> Option<&Value> {
        self.defs.iter().rev().find_map(|frame| frame.get(name))
    }
}

// ─── Evaluation ──────────────────────────────────────────────────────────

/// Collapse an f64 into a JSON integer when it is integral, so template
/// output stays deterministic and document-friendly.
pub fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        Value::from(f as i64)
    } else {
        serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

fn as_number(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| "number out of range".to_string()),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(format!("expected a number, got {other}")),
    }
}

/// Render a value the way string interpolation does: bare strings, integral
/// numbers without a fraction.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

pub fn evaluate(expr: &Expr, scope: &mut Scope) -> Result<Value, String> {
    match expr {
        Expr::Num(f) => Ok(number_value(*f)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Var(name) => scope
            .get(name)
            .cloned()
            .ok_or_else(|| format!("unknown variable {name:?}")),
        Expr::Unary(op, inner) => {
            let value = evaluate(inner, scope)?;
            match op {
                UnaryOp::Neg => Ok(number_value(-as_number(&value)?)),
                UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            // Logical operators short-circuit.
            match op {
                BinOp::And => {
                    let left = evaluate(lhs, scope)?;
                    if !truthy(&left) {
                        return Ok(Value::Bool(false));
                    }
                    let right = evaluate(rhs, scope)?;
                    return Ok(Value::Bool(truthy(&right)));
                }
                BinOp::Or => {
                    let left = evaluate(lhs, scope)?;
                    if truthy(&left) {
                        return Ok(Value::Bool(true));
                    }
                    let right = evaluate(rhs, scope)?;
                    return Ok(Value::Bool(truthy(&right)));
                }
                _ => {}
            }
            let left = evaluate(lhs, scope)?;
            let right = evaluate(rhs, scope)?;
            match op {
                BinOp::Add => match (&left, &right) {
                    (Value::String(_), _) | (_, Value::String(_)) => {
                        Ok(Value::String(format!("{}{}", format_value(&left), format_value(&right))))
                    }
                    _ => Ok(number_value(as_number(&left)? + as_number(&right)?)),
                },
                BinOp::Sub => Ok(number_value(as_number(&left)? - as_number(&right)?)),
                BinOp::Mul => Ok(number_value(as_number(&left)? * as_number(&right)?)),
                BinOp::Div => {
                    let divisor = as_number(&right)?;
                    if divisor == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    Ok(number_value(as_number(&left)? / divisor))
                }
                BinOp::Mod => {
                    let divisor = as_number(&right)?;
                    if divisor == 0.0 {
                        return Err("modulo by zero".to_string());
                    }
                    Ok(number_value(as_number(&left)? % divisor))
                }
                BinOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
                BinOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
                BinOp::Lt => Ok(Value::Bool(as_number(&left)? < as_number(&right)?)),
                BinOp::Gt => Ok(Value::Bool(as_number(&left)? > as_number(&right)?)),
                BinOp::Le => Ok(Value::Bool(as_number(&left)? <= as_number(&right)?)),
                BinOp::Ge => Ok(Value::Bool(as_number(&left)? >= as_number(&right)?)),
                BinOp::And | BinOp::Or => unreachable!("handled above"),
            }
        }
        Expr::Assign(name, rhs) => {
            let value = evaluate(rhs, scope)?;
            scope.set(name, value.clone());
            Ok(value)
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Parse and evaluate in one step.
pub fn evaluate_expression(input: &str, scope: &mut Scope) -> Result<Value, String> {
    let parsed = parse_expression(input)?;
    evaluate(&parsed, scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn scope_with(pairs: &[(&str, Value)]) -> Scope {
        let mut map = serde_json::Map::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.clone());
        }
        Scope::with_values(map)
    }

    #[test]
    fn arithmetic_with_precedence() {
        let mut scope = scope_with(&[("x", json!(3)), ("y", json!(10))]);
        assert_eq!(evaluate_expression("x + 10 * y", &mut scope).unwrap(), json!(103));
        assert_eq!(evaluate_expression("-y", &mut scope).unwrap(), json!(-10));
        assert_eq!(evaluate_expression("(x + 1) * 2", &mut scope).unwrap(), json!(8));
        assert_eq!(evaluate_expression("7 % 4", &mut scope).unwrap(), json!(3));
    }

    #[test]
    fn fractional_results_stay_floats() {
        let mut scope = Scope::new();
        assert_eq!(evaluate_expression("5 / 2", &mut scope).unwrap(), json!(2.5));
        assert_eq!(evaluate_expression("4 / 2", &mut scope).unwrap(), json!(2));
    }

    #[test]
    fn string_comparison_and_logic() {
        let mut scope = scope_with(&[("animation", json!("simple"))]);
        assert_eq!(
            evaluate_expression("animation == 'simple' || animation == 'scaled'", &mut scope).unwrap(),
            json!(true)
        );
        assert_eq!(
            evaluate_expression("animation == \"scaled\"", &mut scope).unwrap(),
            json!(false)
        );
        assert_eq!(evaluate_expression("!false && true", &mut scope).unwrap(), json!(true));
    }

    #[test]
    fn string_concatenation() {
        let mut scope = scope_with(&[("name", json!("john"))]);
        assert_eq!(
            evaluate_expression("'hi ' + name", &mut scope).unwrap(),
            json!("hi john")
        );
    }

    #[test]
    fn assignment_updates_scope() {
        let mut scope = scope_with(&[("y", json!(6))]);
        evaluate_expression("x = 45", &mut scope).unwrap();
        evaluate_expression("y = 3", &mut scope).unwrap();
        assert_eq!(scope.get("x"), Some(&json!(45)));
        assert_eq!(scope.get("y"), Some(&json!(3)));
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let mut scope = Scope::new();
        assert!(evaluate_expression("missing + 1", &mut scope).is_err());
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        assert!(parse_expression("1 + 2 )").is_err());
        assert!(parse_expression("").is_err());
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut scope = Scope::new();
        assert!(evaluate_expression("1 / 0", &mut scope).is_err());
    }

    #[test]
    fn scope_lookup_walks_outward() {
        let mut scope = scope_with(&[("a", json!(1))]);
        scope.push_frame();
        scope.bind_local("a", json!(2));
        assert_eq!(scope.get("a"), Some(&json!(2)));
        scope.pop_frame();
        assert_eq!(scope.get("a"), Some(&json!(1)));
    }
}
