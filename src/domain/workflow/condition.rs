//! Step conditions
//!
//! A condition is either a restricted boolean expression or a structured predicate.
//! Expressions support context paths (`user.age`, `${steps.fetch.result}`), literals
//! (numbers, quoted strings, `true`, `false`, `null`), the comparisons
//! `== != > >= < <=`, `&&`, `||`, `!` and parentheses. Nothing else is evaluated.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::WorkflowError;

/// Condition attached to a step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StepCondition {
    Expression(String),
    Predicate(ConditionPredicate),
}

impl StepCondition {
    pub fn expression(expression: impl Into<String>) -> Self {
        Self::Expression(expression.into())
    }

    pub fn predicate(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self::Predicate(ConditionPredicate {
            field: field.into(),
            operator,
            value,
        })
    }

    /// Parse the condition without evaluating it
    pub fn compile(&self) -> Result<Expr, WorkflowError> {
        match self {
            Self::Expression(source) => Parser::new(source)?.parse(),
            Self::Predicate(predicate) => Ok(predicate.to_expr()),
        }
    }

    /// Evaluate against a path lookup
    pub fn evaluate(&self, lookup: &dyn Fn(&str) -> Value) -> Result<bool, WorkflowError> {
        Ok(is_truthy(&self.compile()?.eval(lookup)))
    }
}

/// Structured `{field, operator, value}` condition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionPredicate {
    /// Context path, with or without `${}`
    pub field: String,

    pub operator: ConditionOperator,

    #[serde(default)]
    pub value: Value,
}

impl ConditionPredicate {
    fn to_expr(&self) -> Expr {
        Expr::Compare(
            Box::new(Expr::Path(strip_reference(&self.field).to_string())),
            self.operator,
            Box::new(Expr::Literal(self.value.clone())),
        )
    }
}

/// Condition comparison operators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Equal to
    Eq,

    /// Not equal to
    Ne,

    /// Greater than
    Gt,

    /// Greater than or equal to
    Gte,

    /// Less than
    Lt,

    /// Less than or equal to
    Lte,

    /// Is empty (for arrays/strings/null)
    IsEmpty,

    /// Is not empty
    IsNotEmpty,

    /// Contains (for strings/arrays)
    Contains,

    /// Starts with (for strings)
    StartsWith,

    /// Ends with (for strings)
    EndsWith,
}

impl ConditionOperator {
    /// Evaluate the condition
    pub fn evaluate(&self, field_value: &Value, compare_value: &Value) -> bool {
        match self {
            Self::Eq => values_equal(field_value, compare_value),
            Self::Ne => !values_equal(field_value, compare_value),
            Self::Gt => compare(field_value, compare_value, |o| o.is_gt()),
            Self::Gte => compare(field_value, compare_value, |o| o.is_ge()),
            Self::Lt => compare(field_value, compare_value, |o| o.is_lt()),
            Self::Lte => compare(field_value, compare_value, |o| o.is_le()),
            Self::IsEmpty => is_empty(field_value),
            Self::IsNotEmpty => !is_empty(field_value),
            Self::Contains => contains(field_value, compare_value),
            Self::StartsWith => starts_with(field_value, compare_value),
            Self::EndsWith => ends_with(field_value, compare_value),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare<F>(a: &Value, b: &Value, f: F) -> bool
where
    F: Fn(std::cmp::Ordering) -> bool,
{
    let ordering = match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    };

    ordering.is_some_and(f)
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(arr) => arr.is_empty(),
        Value::Object(obj) => obj.is_empty(),
        _ => false,
    }
}

fn contains(field: &Value, value: &Value) -> bool {
    match field {
        Value::String(s) => value.as_str().is_some_and(|v| s.contains(v)),
        Value::Array(arr) => arr.contains(value),
        Value::Object(obj) => value.as_str().is_some_and(|k| obj.contains_key(k)),
        _ => false,
    }
}

fn starts_with(field: &Value, value: &Value) -> bool {
    match (field.as_str(), value.as_str()) {
        (Some(f), Some(v)) => f.starts_with(v),
        _ => false,
    }
}

fn ends_with(field: &Value, value: &Value) -> bool {
    match (field.as_str(), value.as_str()) {
        (Some(f), Some(v)) => f.ends_with(v),
        _ => false,
    }
}

/// Truthiness: null, false, 0 and "" are false; everything else is true
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn strip_reference(path: &str) -> &str {
    let trimmed = path.trim();

    trimmed
        .strip_prefix("${")
        .and_then(|p| p.strip_suffix('}'))
        .unwrap_or(trimmed)
}

/// Parsed condition
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, ConditionOperator, Box<Expr>),
}

impl Expr {
    pub fn eval(&self, lookup: &dyn Fn(&str) -> Value) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Path(path) => lookup(path),
            Self::Not(inner) => Value::Bool(!is_truthy(&inner.eval(lookup))),
            Self::And(left, right) => {
                Value::Bool(is_truthy(&left.eval(lookup)) && is_truthy(&right.eval(lookup)))
            }
            Self::Or(left, right) => {
                Value::Bool(is_truthy(&left.eval(lookup)) || is_truthy(&right.eval(lookup)))
            }
            Self::Compare(left, operator, right) => {
                Value::Bool(operator.evaluate(&left.eval(lookup), &right.eval(lookup)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(Value),
    Path(String),
    Op(ConditionOperator),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<Token>, WorkflowError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let error = |message: String| WorkflowError::condition(format!("{} in '{}'", message, source));

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Op(ConditionOperator::Eq));
                i += if chars.get(i + 2) == Some(&'=') { 3 } else { 2 };
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(ConditionOperator::Ne));
                i += if chars.get(i + 2) == Some(&'=') { 3 } else { 2 };
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '>' | '<' => {
                let inclusive = next == Some('=');
                let op = match (c, inclusive) {
                    ('>', true) => ConditionOperator::Gte,
                    ('>', false) => ConditionOperator::Gt,
                    (_, true) => ConditionOperator::Lte,
                    (_, false) => ConditionOperator::Lt,
                };
                tokens.push(Token::Op(op));
                i += if inclusive { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = c;
                let mut literal = String::new();
                i += 1;

                loop {
                    match chars.get(i) {
                        None => return Err(error("Unterminated string".to_string())),
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                literal.push(*escaped);
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            literal.push(*ch);
                            i += 1;
                        }
                    }
                }

                tokens.push(Token::Literal(Value::String(literal)));
            }
            '$' if next == Some('{') => {
                let start = i + 2;
                let end = chars[start..]
                    .iter()
                    .position(|ch| *ch == '}')
                    .map(|offset| start + offset)
                    .ok_or_else(|| error("Unterminated reference".to_string()))?;

                let path: String = chars[start..end].iter().collect();
                tokens.push(Token::Path(path.trim().to_string()));
                i = end + 1;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }

                let text: String = chars[start..i].iter().collect();
                let number: Value = serde_json::from_str(&text)
                    .map_err(|_| error(format!("Invalid number '{}'", text)))?;
                tokens.push(Token::Literal(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '-' | '.'))
                {
                    i += 1;
                }

                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" => Token::Literal(Value::Null),
                    _ => Token::Path(word),
                });
            }
            other => return Err(error(format!("Unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

/// Longest accepted expression, in characters
pub const MAX_EXPRESSION_LENGTH: usize = 4096;

/// Deepest accepted nesting of `!` and parentheses
pub const MAX_NESTING_DEPTH: usize = 64;

/// Recursive-descent parser: or := and ('||' and)*, and := unary ('&&' unary)*,
/// unary := '!' unary | comparison, comparison := primary (op primary)?
struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Result<Self, WorkflowError> {
        let length = source.chars().count();
        if length > MAX_EXPRESSION_LENGTH {
            return Err(WorkflowError::condition(format!(
                "Condition expression is {} characters long; the limit is {}",
                length, MAX_EXPRESSION_LENGTH
            )));
        }

        Ok(Self {
            source,
            tokens: tokenize(source)?,
            position: 0,
            depth: 0,
        })
    }

    fn parse(mut self) -> Result<Expr, WorkflowError> {
        if self.tokens.is_empty() {
            return Err(WorkflowError::condition("Empty condition expression"));
        }

        let expr = self.parse_or()?;

        if self.position < self.tokens.len() {
            return Err(self.error("Unexpected trailing input"));
        }

        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, WorkflowError> {
        let mut left = self.parse_and()?;

        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, WorkflowError> {
        let mut left = self.parse_unary()?;

        while self.eat(&Token::And) {
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, WorkflowError> {
        if self.eat(&Token::Not) {
            let inner = self.nested(Self::parse_unary)?;
            return Ok(Expr::Not(Box::new(inner)));
        }

        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, WorkflowError> {
        let left = self.parse_primary()?;

        if let Some(Token::Op(op)) = self.tokens.get(self.position).cloned() {
            self.position += 1;
            let right = self.parse_primary()?;
            return Ok(Expr::Compare(Box::new(left), op, Box::new(right)));
        }

        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, WorkflowError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| self.error("Unexpected end of expression"))?;
        self.position += 1;

        match token {
            Token::Literal(value) => Ok(Expr::Literal(value)),
            Token::Path(path) => Ok(Expr::Path(path)),
            Token::LParen => {
                let inner = self.nested(Self::parse_or)?;

                if !self.eat(&Token::RParen) {
                    return Err(self.error("Missing closing parenthesis"));
                }

                Ok(inner)
            }
            Token::Not => Ok(Expr::Not(Box::new(self.nested(Self::parse_primary)?))),
            _ => Err(self.error("Expected a value")),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<Expr, WorkflowError>,
    ) -> Result<Expr, WorkflowError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(WorkflowError::condition("Expression nested too deeply"));
        }

        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.tokens.get(self.position) == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: &str) -> WorkflowError {
        WorkflowError::condition(format!(
            "{} at token {} in '{}'",
            message,
            self.position + 1,
            self.source
        ))
    }
}
