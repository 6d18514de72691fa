//! Guard expression compilation and evaluation.
//!
//! Guards are boolean expressions evaluated against a snapshot of the
//! execution context's data mapping. The expression language supports:
//!
//! - `data.field` / `data.field.nested` - field access on the data snapshot
//! - `metadata.field` - field access on the metadata binding
//! - `field` - bare paths resolve against the data snapshot
//! - `a == b`, `a != b` - equality on any values
//! - `a > b`, `a >= b`, `a < b`, `a <= b` - ordering on numbers
//! - `!expr`, `expr && expr`, `expr || expr` - boolean operators
//! - `(expr)` - grouping for precedence control
//! - literals: `true`, `false`, `null`, numbers, `"strings"`
//!
//! Missing fields resolve to `null`. Every expression must yield a boolean:
//! a bare path whose value is not a boolean, an ordering comparison on a
//! non-number, or any parse failure is a hard error - the engine aborts the
//! whole state-execution step rather than falling through to the next
//! transition.
//!
//! Binding contract: `data` is a snapshot of the context's data at
//! evaluation time; `metadata` is always an *empty* mapping, never the
//! context's own metadata.

use crate::context::ExecutionContext;
use crate::error::EngineError;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A compiled guard expression, reusable across evaluations.
#[derive(Debug, Clone)]
pub struct GuardProgram {
    source: String,
    expr: Expr,
}

#[derive(Debug, Clone)]
enum Expr {
    /// Field path, root segment included.
    Path(Vec<String>),
    /// Literal value.
    Literal(Value),
    /// Comparison between two operands.
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    /// Logical AND, short-circuiting.
    And(Box<Expr>, Box<Expr>),
    /// Logical OR, short-circuiting.
    Or(Box<Expr>, Box<Expr>),
    /// Logical NOT.
    Not(Box<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl GuardProgram {
    /// Compiles an expression into a reusable program.
    pub fn compile(source: &str) -> Result<Self, EngineError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(guard_error(source, "empty guard expression"));
        }

        let mut parser = Parser::new(trimmed);
        let expr = parser.parse_expr().map_err(|r| guard_error(source, &r))?;
        parser.skip_whitespace();
        if !parser.at_end() {
            return Err(guard_error(
                source,
                &format!("unexpected input at offset {}", parser.pos),
            ));
        }

        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// The expression text this program was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates against a data snapshot. The result must be boolean.
    pub fn evaluate(&self, data: &HashMap<String, Value>) -> Result<bool, EngineError> {
        self.eval_bool(&self.expr, data)
    }

    fn eval_bool(&self, expr: &Expr, data: &HashMap<String, Value>) -> Result<bool, EngineError> {
        match self.eval_expr(expr, data)? {
            Value::Bool(b) => Ok(b),
            other => Err(guard_error(
                &self.source,
                &format!("expression yielded {} instead of a boolean", kind(&other)),
            )),
        }
    }

    fn eval_expr(&self, expr: &Expr, data: &HashMap<String, Value>) -> Result<Value, EngineError> {
        match expr {
            Expr::Path(path) => Ok(resolve(path, data)),
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Compare(op, left, right) => {
                let left = self.eval_expr(left, data)?;
                let right = self.eval_expr(right, data)?;
                match op {
                    CmpOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
                    CmpOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
                    CmpOp::Gt | CmpOp::Ge | CmpOp::Lt | CmpOp::Le => {
                        let (a, b) = match (as_f64(&left), as_f64(&right)) {
                            (Some(a), Some(b)) => (a, b),
                            _ => {
                                return Err(guard_error(
                                    &self.source,
                                    &format!(
                                        "ordering comparison on non-numeric values ({} vs {})",
                                        kind(&left),
                                        kind(&right)
                                    ),
                                ))
                            }
                        };
                        let result = match op {
                            CmpOp::Gt => a > b,
                            CmpOp::Ge => a >= b,
                            CmpOp::Lt => a < b,
                            CmpOp::Le => a <= b,
                            CmpOp::Eq | CmpOp::Ne => unreachable!(),
                        };
                        Ok(Value::Bool(result))
                    }
                }
            }
            Expr::And(left, right) => {
                if !self.eval_bool(left, data)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval_bool(right, data)?))
            }
            Expr::Or(left, right) => {
                if self.eval_bool(left, data)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval_bool(right, data)?))
            }
            Expr::Not(inner) => Ok(Value::Bool(!self.eval_bool(inner, data)?)),
        }
    }
}

fn guard_error(expression: &str, reason: &str) -> EngineError {
    EngineError::Guard {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}

/// Resolves a field path against the data binding. The `data` root names
/// the snapshot itself; the `metadata` root is always an empty mapping;
/// any other root is looked up inside the snapshot.
fn resolve(path: &[String], data: &HashMap<String, Value>) -> Value {
    let rest: &[String] = match path.first().map(String::as_str) {
        Some("metadata") => {
            return if path.len() == 1 {
                Value::Object(Map::new())
            } else {
                Value::Null
            };
        }
        Some("data") => &path[1..],
        _ => path,
    };

    if rest.is_empty() {
        let map: Map<String, Value> = data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        return Value::Object(map);
    }

    let mut current = match data.get(&rest[0]) {
        Some(value) => value.clone(),
        None => return Value::Null,
    };
    for part in &rest[1..] {
        current = match current {
            Value::Object(mut map) => map.remove(part.as_str()).unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    current
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .map(|(a, b)| (a - b).abs() < f64::EPSILON)
            .unwrap_or(false),
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Recursive descent parser for guard expressions.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        self.skip_whitespace();

        while self.peek_str("||") {
            self.pos += 2;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
            self.skip_whitespace();
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        self.skip_whitespace();

        while self.peek_str("&&") {
            self.pos += 2;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
            self.skip_whitespace();
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        self.skip_whitespace();

        // Recursive to allow !!data.a
        if self.peek_char() == Some('!') && !self.peek_str("!=") {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        self.skip_whitespace();

        if self.peek_char() == Some('(') {
            self.pos += 1;
            let expr = self.parse_expr()?;
            self.skip_whitespace();
            if self.peek_char() != Some(')') {
                return Err("expected ')'".to_string());
            }
            self.pos += 1;
            return Ok(expr);
        }

        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let left = self.parse_operand()?;
        self.skip_whitespace();

        let op = if self.peek_str("==") {
            CmpOp::Eq
        } else if self.peek_str("!=") {
            CmpOp::Ne
        } else if self.peek_str(">=") {
            CmpOp::Ge
        } else if self.peek_str("<=") {
            CmpOp::Le
        } else if self.peek_char() == Some('>') {
            CmpOp::Gt
        } else if self.peek_char() == Some('<') {
            CmpOp::Lt
        } else {
            return Ok(left);
        };

        self.pos += match op {
            CmpOp::Gt | CmpOp::Lt => 1,
            _ => 2,
        };
        self.skip_whitespace();
        let right = self.parse_operand()?;

        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_operand(&mut self) -> Result<Expr, String> {
        self.skip_whitespace();

        match self.peek_char() {
            Some('"') => Ok(Expr::Literal(self.parse_string_literal()?)),
            Some(c) if c.is_ascii_digit() || c == '-' => {
                let number = self.parse_number()?;
                let number = serde_json::Number::from_f64(number)
                    .ok_or_else(|| "number is not finite".to_string())?;
                Ok(Expr::Literal(Value::Number(number)))
            }
            _ => {
                let path = self.parse_path()?;
                if path.len() == 1 {
                    match path[0].as_str() {
                        "true" => return Ok(Expr::Literal(Value::Bool(true))),
                        "false" => return Ok(Expr::Literal(Value::Bool(false))),
                        "null" => return Ok(Expr::Literal(Value::Null)),
                        _ => {}
                    }
                }
                Ok(Expr::Path(path))
            }
        }
    }

    fn parse_path(&mut self) -> Result<Vec<String>, String> {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                self.pos += 1;
            } else {
                break;
            }
        }

        let raw = &self.input[start..self.pos];
        if raw.is_empty() {
            return Err(format!("expected a value or field path at offset {start}"));
        }

        let mut segments = Vec::new();
        for segment in raw.split('.') {
            if segment.is_empty() {
                return Err(format!("empty path segment in '{raw}'"));
            }
            if segment.starts_with(|c: char| c.is_ascii_digit()) {
                return Err(format!("path segment cannot start with a digit: '{segment}'"));
            }
            segments.push(segment.to_string());
        }

        Ok(segments)
    }

    fn parse_string_literal(&mut self) -> Result<Value, String> {
        // Caller checked the opening quote
        self.pos += 1;

        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c == '"' {
                let s = &self.input[start..self.pos];
                self.pos += 1;
                return Ok(Value::String(s.to_string()));
            }
            self.pos += c.len_utf8();
        }

        Err("unterminated string".to_string())
    }

    fn parse_number(&mut self) -> Result<f64, String> {
        let start = self.pos;

        if self.peek_char() == Some('-') {
            self.pos += 1;
        }
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.peek_char() == Some('.') {
            self.pos += 1;
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }

        let raw = &self.input[start..self.pos];
        raw.parse::<f64>()
            .map_err(|_| format!("invalid number: '{raw}'"))
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos..).and_then(|s| s.chars().next())
    }

    fn peek_str(&self, token: &str) -> bool {
        self.input
            .get(self.pos..)
            .map_or(false, |s| s.starts_with(token))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }
}

/// Compiles guard expressions on demand and caches the compiled programs,
/// keyed by exact expression text.
///
/// The cache never evicts; unbounded growth across a process lifetime is
/// accepted behavior. The evaluator is safe for concurrent use by multiple
/// engines. Two threads racing to compile the same expression may both
/// compile it; the duplicate program is behaviorally equivalent and one of
/// the two is discarded.
///
/// All environment setup happens here, eagerly; there is no deferred
/// initialization.
pub struct GuardEvaluator {
    cache: DashMap<String, Arc<GuardProgram>>,
    compilations: AtomicU64,
}

impl GuardEvaluator {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
            compilations: AtomicU64::new(0),
        }
    }

    /// Evaluates `expression` against the context.
    ///
    /// The binding exposes `data` (a snapshot of the context's data taken
    /// now) and `metadata` (an empty mapping, never the context's own
    /// metadata).
    pub fn evaluate(
        &self,
        expression: &str,
        ctx: &ExecutionContext,
    ) -> Result<bool, EngineError> {
        let program = self.program(expression)?;
        program.evaluate(&ctx.all_data())
    }

    /// Returns the cached program for `expression`, compiling on a miss.
    pub fn program(&self, expression: &str) -> Result<Arc<GuardProgram>, EngineError> {
        if let Some(program) = self.cache.get(expression) {
            return Ok(program.clone());
        }

        let program = Arc::new(GuardProgram::compile(expression)?);
        self.compilations.fetch_add(1, Ordering::Relaxed);
        self.cache.insert(expression.to_string(), program.clone());
        tracing::trace!(expression, "guard compiled");
        Ok(program)
    }

    /// Number of successful compilations so far: at most one per distinct
    /// expression text, absent the benign double-compile race.
    pub fn compile_count(&self) -> u64 {
        self.compilations.load(Ordering::Relaxed)
    }
}

impl Default for GuardEvaluator {
    fn default() -> Self {
        Self::new()
    }
}
