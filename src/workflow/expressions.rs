//! Expression evaluation for conditions, loop guards and data transforms
//!
//! Expressions use a small fixed grammar:
//! - literals: numbers, `'single'` / `"double"` strings, `true`, `false`, `null`
//! - names: `amount`, `data.amount`, `variables.loopIndex`, `items[0]`
//! - operators: `!`, unary `-`, `* / %`, `+ -`, `< <= > >=`,
//!   `== != === !==`, `&&`, `||`, parentheses
//! - helpers: `now()`, `random()`, `length(x)`, `contains(s, sub)`,
//!   `equals(a, b)`, `greaterThan(a, b)`, `lessThan(a, b)`
//!
//! [`evaluate`] and [`evaluate_condition`] fail closed: any error is logged
//! as a warning and the result is `false`.

use rand::Rng;
use serde_json::{Map, Value};
use std::iter::Peekable;
use std::str::CharIndices;
use tracing::warn;

use super::context::ExpressionScope;

/// Errors that can occur during expression evaluation
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ExpressionError {
    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("Unterminated string literal")]
    UnterminatedString,

    #[error("Invalid expression syntax: {0}")]
    InvalidSyntax(String),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Cannot read property '{0}' of null")]
    NullAccess(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Arithmetic produced a non-finite number")]
    NonFinite,
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

const OPERATORS: [&str; 16] = [
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "<", ">", "!", "+", "-", "*", "/", "%",
];

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<CharIndices> = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' => {
                let mut end = pos;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = input[pos..end]
                    .parse()
                    .map_err(|_| ExpressionError::InvalidSyntax(input[pos..end].to_string()))?;
                tokens.push(Token::Number(number));
            }
            '\'' | '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        c if c == ch => {
                            closed = true;
                            break;
                        }
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err(ExpressionError::UnterminatedString);
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut end = pos;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '$' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(input[pos..end].to_string()));
            }
            '(' | ')' | '[' | ']' | ',' | '.' => {
                chars.next();
                tokens.push(match ch {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    _ => Token::Dot,
                });
            }
            _ => {
                let rest = &input[pos..];
                let op = OPERATORS
                    .iter()
                    .find(|op| rest.starts_with(**op))
                    .ok_or(ExpressionError::UnexpectedChar { ch, pos })?;
                for _ in 0..op.len() {
                    chars.next();
                }
                tokens.push(Token::Op(op));
            }
        }
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        match self.next() {
            Some(t) if t == expected => Ok(()),
            other => Err(ExpressionError::InvalidSyntax(format!(
                "expected {:?}, found {:?}",
                expected, other
            ))),
        }
    }

    /// Parse a left-associative level whose operators are `ops`
    fn binary_level(
        &mut self,
        ops: &[&'static str],
        next: fn(&mut Self) -> Result<Expr, ExpressionError>,
    ) -> Result<Expr, ExpressionError> {
        let mut left = next(self)?;
        while let Some(Token::Op(op)) = self.peek() {
            let Some(op) = ops.iter().find(|o| **o == *op).copied() else {
                break;
            };
            self.pos += 1;
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn or(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(&["||"], Self::and)
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(&["&&"], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(&["===", "!==", "==", "!="], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(&["<", "<=", ">", ">="], Self::additive)
    }

    fn additive(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(&["+", "-"], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(&["*", "/", "%"], Self::unary)
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek() {
            Some(Token::Op("!")) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.unary()?)))
            }
            Some(Token::Op("-")) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(name)) => expr = Expr::Member(Box::new(expr), name),
                        other => {
                            return Err(ExpressionError::InvalidSyntax(format!(
                                "expected property name, found {:?}",
                                other
                            )))
                        }
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.or()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(number(n)?)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::LParen) => {
                let inner = self.or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
                _ if self.peek() == Some(&Token::LParen) => {
                    self.pos += 1;
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.or()?);
                            if self.peek() == Some(&Token::Comma) {
                                self.pos += 1;
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(Token::RParen)?;
                    Ok(Expr::Call(name, args))
                }
                _ => Ok(Expr::Name(name)),
            },
            other => Err(ExpressionError::InvalidSyntax(format!(
                "unexpected token {:?}",
                other
            ))),
        }
    }
}

/// Parse an expression into its tree
pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExpressionError::InvalidSyntax("empty expression".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or()?;
    if let Some(token) = parser.peek() {
        return Err(ExpressionError::InvalidSyntax(format!(
            "unexpected trailing token {:?}",
            token
        )));
    }
    Ok(expr)
}

// ============================================================================
// Evaluation
// ============================================================================

fn number(n: f64) -> Result<Value, ExpressionError> {
    if !n.is_finite() {
        return Err(ExpressionError::NonFinite);
    }
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Ok(Value::from(n as i64))
    } else {
        Ok(Value::from(n))
    }
}

/// JavaScript-style truthiness
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

fn to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_)) => to_number(a) == to_number(b),
        _ => strict_equals(a, b),
    }
}

fn compare(op: &str, a: &Value, b: &Value) -> bool {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return match op {
            "<" => x < y,
            "<=" => x <= y,
            ">" => x > y,
            _ => x >= y,
        };
    }
    let (x, y) = (to_number(a), to_number(b));
    match op {
        "<" => x < y,
        "<=" => x <= y,
        ">" => x > y,
        _ => x >= y,
    }
}

fn check_arity(name: &str, args: &[Value], expected: usize) -> Result<(), ExpressionError> {
    if args.len() != expected {
        return Err(ExpressionError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn call_helper(name: &str, args: Vec<Value>) -> Result<Value, ExpressionError> {
    match name {
        "now" => {
            check_arity(name, &args, 0)?;
            Ok(Value::from(chrono::Utc::now().timestamp_millis()))
        }
        "random" => {
            check_arity(name, &args, 0)?;
            number(rand::thread_rng().gen::<f64>())
        }
        "length" => {
            check_arity(name, &args, 1)?;
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                _ => 0,
            };
            Ok(Value::from(len))
        }
        "contains" => {
            check_arity(name, &args, 2)?;
            let found = match (&args[0], &args[1]) {
                (Value::String(s), needle) => s.contains(to_display(needle).as_str()),
                (Value::Array(items), needle) => items.iter().any(|i| loose_equals(i, needle)),
                (Value::Object(map), Value::String(key)) => map.contains_key(key),
                _ => false,
            };
            Ok(Value::Bool(found))
        }
        "equals" => {
            check_arity(name, &args, 2)?;
            Ok(Value::Bool(strict_equals(&args[0], &args[1])))
        }
        "greaterThan" => {
            check_arity(name, &args, 2)?;
            Ok(Value::Bool(to_number(&args[0]) > to_number(&args[1])))
        }
        "lessThan" => {
            check_arity(name, &args, 2)?;
            Ok(Value::Bool(to_number(&args[0]) < to_number(&args[1])))
        }
        _ => Err(ExpressionError::UnknownFunction(name.to_string())),
    }
}

fn eval(expr: &Expr, scope: &ExpressionScope) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Name(name) => scope
            .resolve(name)
            .ok_or_else(|| ExpressionError::UnknownVariable(name.clone())),
        Expr::Member(target, property) => {
            let target = eval(target, scope)?;
            member(target, property)
        }
        Expr::Index(target, index) => {
            let target = eval(target, scope)?;
            match eval(index, scope)? {
                Value::Number(n) => match target {
                    Value::Null => Err(ExpressionError::NullAccess(n.to_string())),
                    Value::Array(items) => Ok(n
                        .as_u64()
                        .and_then(|i| items.get(i as usize).cloned())
                        .unwrap_or(Value::Null)),
                    other => member(other, &n.to_string()),
                },
                key => member(target, &to_display(&key)),
            }
        }
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|a| eval(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call_helper(name, args)
        }
        Expr::Not(inner) => Ok(Value::Bool(!is_truthy(&eval(inner, scope)?))),
        Expr::Neg(inner) => number(-to_number(&eval(inner, scope)?)),
        Expr::Binary(op, left, right) => {
            let left = eval(left, scope)?;
            // && and || short-circuit and yield an operand, as in JavaScript
            match *op {
                "&&" if !is_truthy(&left) => return Ok(left),
                "&&" => return eval(right, scope),
                "||" if is_truthy(&left) => return Ok(left),
                "||" => return eval(right, scope),
                _ => {}
            }
            let right = eval(right, scope)?;
            match *op {
                "+" if left.is_string() || right.is_string() => Ok(Value::String(format!(
                    "{}{}",
                    to_display(&left),
                    to_display(&right)
                ))),
                "+" => number(to_number(&left) + to_number(&right)),
                "-" => number(to_number(&left) - to_number(&right)),
                "*" => number(to_number(&left) * to_number(&right)),
                "/" => number(to_number(&left) / to_number(&right)),
                "%" => number(to_number(&left) % to_number(&right)),
                "===" => Ok(Value::Bool(strict_equals(&left, &right))),
                "!==" => Ok(Value::Bool(!strict_equals(&left, &right))),
                "==" => Ok(Value::Bool(loose_equals(&left, &right))),
                "!=" => Ok(Value::Bool(!loose_equals(&left, &right))),
                cmp => Ok(Value::Bool(compare(cmp, &left, &right))),
            }
        }
    }
}

fn member(target: Value, property: &str) -> Result<Value, ExpressionError> {
    match target {
        Value::Null => Err(ExpressionError::NullAccess(property.to_string())),
        Value::Object(mut map) => Ok(map.remove(property).unwrap_or(Value::Null)),
        Value::Array(items) if property == "length" => Ok(Value::from(items.len())),
        Value::String(s) if property == "length" => Ok(Value::from(s.chars().count())),
        _ => Ok(Value::Null),
    }
}

/// Evaluate an expression, surfacing any error
pub fn try_evaluate(
    expression: &str,
    data: &Map<String, Value>,
    variables: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    let expr = parse(expression)?;
    eval(&expr, &ExpressionScope::new(data, variables))
}

/// Evaluate an expression; errors are logged and yield `false`
pub fn evaluate(
    expression: &str,
    data: &Map<String, Value>,
    variables: &Map<String, Value>,
) -> Value {
    match try_evaluate(expression, data, variables) {
        Ok(value) => value,
        Err(e) => {
            warn!("Expression '{}' failed to evaluate: {}", expression, e);
            Value::Bool(false)
        }
    }
}

/// Evaluate an expression as a boolean guard
pub fn evaluate_condition(
    expression: &str,
    data: &Map<String, Value>,
    variables: &Map<String, Value>,
) -> bool {
    is_truthy(&evaluate(expression, data, variables))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope_maps() -> (Map<String, Value>, Map<String, Value>) {
        let data = json!({
            "amount": 150,
            "name": "Order 42",
            "tags": ["urgent", "vip"],
            "customer": {"tier": "gold", "orders": 3}
        });
        let vars = json!({"loopIndex": 2, "threshold": 100});
        (
            data.as_object().unwrap().clone(),
            vars.as_object().unwrap().clone(),
        )
    }

    fn eval_str(expr: &str) -> Result<Value, ExpressionError> {
        let (data, vars) = scope_maps();
        try_evaluate(expr, &data, &vars)
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval_str("data.amount > 100").unwrap(), json!(true));
        assert_eq!(eval_str("amount <= 149").unwrap(), json!(false));
        assert_eq!(eval_str("variables.loopIndex < 3").unwrap(), json!(true));
        assert_eq!(eval_str("data.amount > variables.threshold").unwrap(), json!(true));
    }

    #[test]
    fn test_boolean_operators() {
        assert_eq!(
            eval_str("amount > 100 && customer.tier == 'gold'").unwrap(),
            json!(true)
        );
        assert_eq!(eval_str("amount < 100 || !false").unwrap(), json!(true));
        assert_eq!(eval_str("!(amount > 100)").unwrap(), json!(false));
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(eval_str("1 + 2 * 3").unwrap(), json!(7));
        assert_eq!(eval_str("(1 + 2) * 3").unwrap(), json!(9));
        assert_eq!(eval_str("amount / 4").unwrap(), json!(37.5));
        assert_eq!(eval_str("-loopIndex + 1").unwrap(), json!(-1));
        assert_eq!(eval_str("'id-' + loopIndex").unwrap(), json!("id-2"));
    }

    #[test]
    fn test_loose_and_strict_equality() {
        assert_eq!(eval_str("amount == '150'").unwrap(), json!(true));
        assert_eq!(eval_str("amount === '150'").unwrap(), json!(false));
        assert_eq!(eval_str("amount === 150").unwrap(), json!(true));
        assert_eq!(eval_str("customer.missing == null").unwrap(), json!(true));
    }

    #[test]
    fn test_indexing() {
        assert_eq!(eval_str("tags[0]").unwrap(), json!("urgent"));
        assert_eq!(eval_str("customer['tier']").unwrap(), json!("gold"));
        assert_eq!(eval_str("tags.length").unwrap(), json!(2));
    }

    #[test]
    fn test_helpers() {
        assert_eq!(eval_str("length(tags)").unwrap(), json!(2));
        assert_eq!(eval_str("length(name)").unwrap(), json!(8));
        assert_eq!(eval_str("contains(name, '42')").unwrap(), json!(true));
        assert_eq!(eval_str("contains(tags, 'vip')").unwrap(), json!(true));
        assert_eq!(eval_str("equals(customer.tier, 'gold')").unwrap(), json!(true));
        assert_eq!(eval_str("greaterThan(amount, 200)").unwrap(), json!(false));
        assert_eq!(eval_str("lessThan(amount, 200)").unwrap(), json!(true));
        assert!(eval_str("now()").unwrap().as_i64().unwrap() > 0);
        let r = eval_str("random()").unwrap().as_f64().unwrap();
        assert!((0.0..1.0).contains(&r));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            eval_str("undefinedThing > 1"),
            Err(ExpressionError::UnknownVariable(_))
        ));
        assert!(matches!(
            eval_str("customer.missing.deeper"),
            Err(ExpressionError::NullAccess(_))
        ));
        assert!(matches!(
            eval_str("amount >"),
            Err(ExpressionError::InvalidSyntax(_))
        ));
        assert!(matches!(
            eval_str("'open"),
            Err(ExpressionError::UnterminatedString)
        ));
        assert!(matches!(
            eval_str("shell('rm')"),
            Err(ExpressionError::UnknownFunction(_))
        ));
        assert!(matches!(
            eval_str("amount # 2"),
            Err(ExpressionError::UnexpectedChar { ch: '#', .. })
        ));
    }

    #[test]
    fn test_fail_closed() {
        let (data, vars) = scope_maps();
        assert_eq!(evaluate("nope.nope", &data, &vars), json!(false));
        assert!(!evaluate_condition("nope > 1", &data, &vars));
        assert!(!evaluate_condition("amount >>> 1", &data, &vars));
        assert!(evaluate_condition("amount", &data, &vars));
    }
}
