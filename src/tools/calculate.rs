//! 算术表达式工具
//!
//! 递归下降求值：+ - * / % ^（或 **）、括号、一元正负号、小数。
//! 结果为整数时以 JSON 整数返回（"2 + 2" → 4），否则为浮点数。

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::tools::{FieldSpec, InputSchema, Tool, ToolAnnotations};

const MAX_EXPRESSION_LEN: usize = 256;

static ARITH_SPAN_RE: OnceLock<Regex> = OnceLock::new();
static DATE_OR_PHONE_RE: OnceLock<Regex> = OnceLock::new();

/// 从自然语言中提取可求值的算术表达式（最长的、含运算符且能成功求值的片段）
///
/// 日期（2024-05-01）、电话（555-1234）这类连字符数字串不算表达式。
pub fn extract_expression(text: &str) -> Option<String> {
    let re = ARITH_SPAN_RE.get_or_init(|| {
        Regex::new(r"[0-9.\s+\-*/%^()]+").expect("static arithmetic regex")
    });
    re.find_iter(text)
        .map(|m| m.as_str().trim().trim_end_matches(['.', ' ']).to_string())
        .filter(|s| s.chars().filter(|c| c.is_ascii_digit()).count() >= 2)
        .filter(|s| {
            s.char_indices()
                .skip(1)
                .any(|(_, c)| matches!(c, '+' | '-' | '*' | '/' | '%' | '^'))
        })
        .filter(|s| !is_hyphenated_number(s))
        .filter(|s| evaluate(s).is_ok())
        .max_by_key(|s| s.len())
}

/// 连字符数字串：日期/电话形状，或唯一的运算符是紧贴数字的 `-`（"10-3"，写成 "10 - 3" 才算减法）
fn is_hyphenated_number(span: &str) -> bool {
    let shapes = DATE_OR_PHONE_RE.get_or_init(|| {
        Regex::new(r"\d{4}-\d{1,2}-\d{1,2}|(^|[^\d])\d{3}-\d{4}($|[^\d])")
            .expect("static date/phone regex")
    });
    if shapes.is_match(span) {
        return true;
    }
    let only_minus = !span
        .chars()
        .any(|c| matches!(c, '+' | '*' | '/' | '%' | '^' | '(' | ')'));
    let chars: Vec<char> = span.chars().collect();
    let tight_minus = chars
        .windows(2)
        .any(|w| (w[0].is_ascii_digit() || w[0] == '.') && w[1] == '-');
    only_minus && tight_minus
}

/// 求值入口
pub fn evaluate(expression: &str) -> Result<f64, String> {
    if expression.len() > MAX_EXPRESSION_LEN {
        return Err(format!("expression longer than {MAX_EXPRESSION_LEN} chars"));
    }
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("unexpected token at position {}", parser.pos));
    }
    if !value.is_finite() {
        return Err("result is not a finite number".to_string());
    }
    Ok(value)
}

/// 整数结果转为 JSON 整数
pub fn number_to_json(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let n = literal
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{literal}'"))?;
                tokens.push(Token::Num(n));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Op('^'));
                i += 2;
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Token::Op(c));
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
            other => return Err(format!("unsupported character '{other}'")),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.peek();
        self.pos += 1;
        t
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut acc = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            acc = if op == '+' { acc + rhs } else { acc - rhs };
        }
        Ok(acc)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut acc = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            if op != '*' && rhs == 0.0 {
                return Err("division by zero".to_string());
            }
            acc = match op {
                '*' => acc * rhs,
                '/' => acc / rhs,
                _ => acc % rhs,
            };
        }
        Ok(acc)
    }

    // 一元负号优先级低于乘方：-2^2 = -4
    fn unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    // 右结合
    fn power(&mut self) -> Result<f64, String> {
        let base = self.primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exp = self.unary()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let v = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(v),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(t) => Err(format!("unexpected token {t:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

/// calculate 工具：返回值即计算结果
pub struct CalculateTool;

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression, e.g. '2 + 2' or '3 * (4 + 5)'."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().field(
            FieldSpec::string("expression", "Arithmetic expression to evaluate").required(),
        )
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::read_only()
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let expression = args
            .get("expression")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        evaluate(expression)
            .map(number_to_json)
            .map_err(AgentError::Validation)
    }
}
