//! Arithmetic tools and a small expression evaluator

use anyhow::Result;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;

use crate::tools::params::{req_f64, req_str};
use crate::tools::{Handler, Kind, Param, ToolSpec};

const A: Param = Param::req("a", Kind::Number, "First number");
const B: Param = Param::req("b", Kind::Number, "Second number");

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "math_add",
        description: "Add two numbers.",
        params: &[A, B],
        handler: Handler::Pure(math_add),
    },
    ToolSpec {
        name: "math_subtract",
        description: "Subtract the second number from the first.",
        params: &[A, B],
        handler: Handler::Pure(math_subtract),
    },
    ToolSpec {
        name: "math_multiply",
        description: "Multiply two numbers.",
        params: &[A, B],
        handler: Handler::Pure(math_multiply),
    },
    ToolSpec {
        name: "math_divide",
        description: "Divide the first number by the second.",
        params: &[A, B],
        handler: Handler::Pure(math_divide),
    },
    ToolSpec {
        name: "math_power",
        description: "Raise a number to a power.",
        params: &[
            Param::req("base", Kind::Number, "Base"),
            Param::req("exponent", Kind::Number, "Exponent"),
        ],
        handler: Handler::Pure(math_power),
    },
    ToolSpec {
        name: "math_percentage",
        description: "Percentage of a value: value * percent / 100.",
        params: &[
            Param::req("value", Kind::Number, "Value"),
            Param::req("percent", Kind::Number, "Percent"),
        ],
        handler: Handler::Pure(math_percentage),
    },
    ToolSpec {
        name: "math_percentage_from_total",
        description: "Score percentage: obtained / total * 100.",
        params: &[
            Param::req("obtained", Kind::Number, "Obtained"),
            Param::req("total", Kind::Number, "Total"),
        ],
        handler: Handler::Pure(math_percentage_from_total),
    },
    ToolSpec {
        name: "math_evaluate_expression",
        description: "Evaluate an arithmetic expression with + - * / ** and parentheses.",
        params: &[Param::req("expression", Kind::String, "e.g. (12.5 + 7) * 3")],
        handler: Handler::Pure(math_evaluate_expression),
    },
];

fn failure(message: impl Into<String>) -> Value {
    json!({"status": "error", "error": message.into()})
}

fn binary(input: &Value, operation: &str, f: fn(f64, f64) -> f64) -> Result<Value> {
    let a = req_f64(input, "a")?;
    let b = req_f64(input, "b")?;
    let result = f(a, b);
    info!("math_{} a={} b={} result={}", operation, a, b, result);
    Ok(json!({"operation": operation, "a": a, "b": b, "result": result}))
}

fn math_add(input: &Value) -> Result<Value> {
    binary(input, "add", |a, b| a + b)
}

fn math_subtract(input: &Value) -> Result<Value> {
    binary(input, "subtract", |a, b| a - b)
}

fn math_multiply(input: &Value) -> Result<Value> {
    binary(input, "multiply", |a, b| a * b)
}

fn math_divide(input: &Value) -> Result<Value> {
    if req_f64(input, "b")? == 0.0 {
        return Ok(failure("Division by zero is not allowed."));
    }
    binary(input, "divide", |a, b| a / b)
}

fn math_power(input: &Value) -> Result<Value> {
    let base = req_f64(input, "base")?;
    let exponent = req_f64(input, "exponent")?;
    Ok(json!({
        "operation": "power",
        "base": base,
        "exponent": exponent,
        "result": base.powf(exponent),
    }))
}

fn math_percentage(input: &Value) -> Result<Value> {
    let value = req_f64(input, "value")?;
    let percent = req_f64(input, "percent")?;
    Ok(json!({
        "operation": "percentage",
        "value": value,
        "percent": percent,
        "result": value * percent / 100.0,
    }))
}

fn math_percentage_from_total(input: &Value) -> Result<Value> {
    let obtained = req_f64(input, "obtained")?;
    let total = req_f64(input, "total")?;
    if total == 0.0 {
        return Ok(failure("Total cannot be zero."));
    }
    Ok(json!({
        "operation": "percentage_from_total",
        "obtained": obtained,
        "total": total,
        "result": obtained / total * 100.0,
    }))
}

fn math_evaluate_expression(input: &Value) -> Result<Value> {
    let expression = req_str(input, "expression")?;
    match evaluate(expression) {
        Ok(result) => {
            info!("math_evaluate_expression {} = {}", expression, result);
            Ok(json!({
                "operation": "evaluate_expression",
                "expression": expression,
                "result": result,
            }))
        }
        Err(e) => Ok(failure(e.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("Expression contains unsupported characters.")]
    UnsupportedCharacters,
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
    #[error("Unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("Expression is nested too deeply.")]
    TooDeep,
    #[error("Expression is longer than {} characters.", MAX_EXPRESSION_LEN)]
    TooLong,
}

/// Nested operands (parentheses, signs, exponents) one expression may hold
const MAX_DEPTH: usize = 100;
const MAX_EXPRESSION_LEN: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Pow,
    LParen,
    RParen,
}

impl Token {
    fn symbol(&self) -> String {
        match self {
            Token::Num(n) => n.to_string(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::DoubleSlash => "//".into(),
            Token::Pow => "**".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
        }
    }
}

fn tokenize(expr: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let n = literal
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber(literal.clone()))?;
                tokens.push(Token::Num(n));
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Pow);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            _ => return Err(ExprError::UnsupportedCharacters),
        }
    }
    Ok(tokens)
}

/// Recursive-descent parser over the token stream.
///
/// ```text
/// expr  := term (('+' | '-') term)*
/// term  := unary (('*' | '/' | '//') unary)*
/// unary := ('+' | '-') unary | power
/// power := atom ('**' unary)?
/// atom  := number | '(' expr ')'
/// ```
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
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

    fn expr(&mut self) -> Result<f64, ExprError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, ExprError> {
        let mut value = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(op @ (Token::Star | Token::Slash | Token::DoubleSlash)) => op.clone(),
                _ => return Ok(value),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                Token::Star => value * rhs,
                _ if rhs == 0.0 => return Err(ExprError::DivisionByZero),
                Token::Slash => value / rhs,
                _ => (value / rhs).floor(),
            };
        }
    }

    /// Every operand passes through here, so this is where nesting is bounded
    fn unary(&mut self) -> Result<f64, ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<f64, ExprError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, ExprError> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, ExprError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    Some(other) => Err(ExprError::UnexpectedToken(other.symbol())),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(other) => Err(ExprError::UnexpectedToken(other.symbol())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

/// Evaluate an arithmetic expression of numbers, `+ - * / // **` and parentheses
pub fn evaluate(expr: &str) -> Result<f64, ExprError> {
    if expr.chars().count() > MAX_EXPRESSION_LEN {
        return Err(ExprError::TooLong);
    }
    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    match parser.next() {
        None => Ok(value),
        Some(extra) => Err(ExprError::UnexpectedToken(extra.symbol())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_and_grouping() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("10 / 4").unwrap(), 2.5);
        assert_eq!(evaluate("7 // 2").unwrap(), 3.0);
        assert_eq!(evaluate("-2 ** 2").unwrap(), -4.0);
        assert_eq!(evaluate("2 ** 3 ** 2").unwrap(), 512.0);
        assert_eq!(evaluate("- (1.5 - 4)").unwrap(), 2.5);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(evaluate("__import__('os')"), Err(ExprError::UnsupportedCharacters));
        assert_eq!(evaluate("1 / 0"), Err(ExprError::DivisionByZero));
        assert_eq!(evaluate("(1 + 2"), Err(ExprError::UnexpectedEnd));
        assert_eq!(evaluate("1 2"), Err(ExprError::UnexpectedToken("2".into())));
        assert!(matches!(evaluate("1.2.3"), Err(ExprError::InvalidNumber(_))));
    }

    #[test]
    fn test_nesting_is_bounded() {
        let fine = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        assert_eq!(evaluate(&fine).unwrap(), 1.0);
        assert_eq!(evaluate(&format!("{}1", "-".repeat(120))), Err(ExprError::TooDeep));
        assert_eq!(evaluate(&format!("{}2", "2**".repeat(150))), Err(ExprError::TooDeep));

        let deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(evaluate(&deep), Err(ExprError::TooLong));
        let out = math_evaluate_expression(&json!({"expression": deep})).unwrap();
        assert_eq!(out["status"], "error");

        let deep_but_short = format!("{}1{}", "(".repeat(400), ")".repeat(400));
        assert_eq!(evaluate(&deep_but_short), Err(ExprError::TooDeep));
        let out = math_evaluate_expression(&json!({"expression": deep_but_short})).unwrap();
        assert_eq!(out["error"], "Expression is nested too deeply.");
    }

    #[test]
    fn test_tools() {
        let out = math_add(&json!({"a": 2, "b": "3.5"})).unwrap();
        assert_eq!(out["result"], 5.5);

        let out = math_divide(&json!({"a": 1, "b": 0})).unwrap();
        assert_eq!(out["status"], "error");
        assert_eq!(out["error"], "Division by zero is not allowed.");

        let out = math_percentage_from_total(&json!({"obtained": 45, "total": 60})).unwrap();
        assert_eq!(out["result"], 75.0);

        let out = math_evaluate_expression(&json!({"expression": "(12.5 + 7.5) * 3"})).unwrap();
        assert_eq!(out["result"], 60.0);

        let out = math_evaluate_expression(&json!({"expression": "2; rm -rf"})).unwrap();
        assert_eq!(out["error"], "Expression contains unsupported characters.");
    }
}
