//! Expression compiler for dynamic schema values.
//!
//! The compiler is a pluggable strategy: [`ExpressionCompiler::compile`] turns the
//! source text into a [`CompiledExpression`], and
//! [`CompiledExpression::provide`] binds every `$token` in it to a getter supplied
//! by the caller, producing the closure evaluated on each render.
//!
//! [`BasicExpressionCompiler`] is the default. It understands `$`-prefixed dotted
//! tokens, number/string/boolean/null literals, parentheses, `!` and unary `-`,
//! arithmetic, comparison, loose and strict equality, `&&`/`||` and `?:`.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Number, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::context::{EvalContext, EvalFn};
use crate::error::ExpressionError;

lazy_static! {
    static ref TOKEN_PATH_RE: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.(?:[A-Za-z_][A-Za-z0-9_]*|[0-9]+))*").unwrap();
    static ref NUMBER_RE: Regex =
        Regex::new(r"^(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?").unwrap();
    static ref WORD_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRATEGY TRAITS
// ═══════════════════════════════════════════════════════════════════════════════

pub trait ExpressionCompiler {
    fn compile(&self, source: &str) -> Result<Box<dyn CompiledExpression>, ExpressionError>;

    /// Drop anything retained between compilations. Called on recompile.
    fn clear_cache(&self) {}
}

pub trait CompiledExpression {
    /// Bind each token to the getter returned by `resolver` and return the evaluator.
    fn provide(&self, resolver: &mut dyn FnMut(&str) -> EvalFn) -> EvalFn;
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE SEMANTICS
// ═══════════════════════════════════════════════════════════════════════════════

/// Falsy: `null`, `false`, `0`, NaN and the empty string. Everything else is truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text form used for rendered text and string concatenation.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string_pretty(value).unwrap_or_default()
        }
    }
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Integral results become integer JSON numbers; NaN and infinities become `null`.
fn number_value(f: f64) -> Value {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
            left == right
        }
        _ => to_number(left) == to_number(right),
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return match op {
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Gt => a > b,
            _ => a >= b,
        };
    }
    let (a, b) = (to_number(left), to_number(right));
    match op {
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        _ => a >= b,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AST
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    And,
    Or,
}

impl BinaryOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "===" => BinaryOp::StrictEq,
            "!==" => BinaryOp::StrictNe,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        })
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::StrictEq | BinaryOp::StrictNe => 3,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 6,
        }
    }

    fn apply(self, left: &Value, right: &Value) -> Value {
        match self {
            BinaryOp::Add => {
                if left.is_string() || right.is_string() {
                    Value::String(display_string(left) + &display_string(right))
                } else {
                    number_value(to_number(left) + to_number(right))
                }
            }
            BinaryOp::Sub => number_value(to_number(left) - to_number(right)),
            BinaryOp::Mul => number_value(to_number(left) * to_number(right)),
            BinaryOp::Div => number_value(to_number(left) / to_number(right)),
            BinaryOp::Rem => number_value(to_number(left) % to_number(right)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                Value::Bool(compare(self, left, right))
            }
            BinaryOp::Eq => Value::Bool(loose_equals(left, right)),
            BinaryOp::Ne => Value::Bool(!loose_equals(left, right)),
            BinaryOp::StrictEq => Value::Bool(strict_equals(left, right)),
            BinaryOp::StrictNe => Value::Bool(!strict_equals(left, right)),
            // Short-circuit operators are evaluated in `Bound::eval`.
            BinaryOp::And | BinaryOp::Or => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Token(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Tokens referenced by this expression, in source order.
    pub fn tokens(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_tokens(&mut out);
        out
    }

    fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Token(token) => out.push(token),
            Expr::Unary(_, operand) => operand.collect_tokens(out),
            Expr::Binary(_, left, right) => {
                left.collect_tokens(out);
                right.collect_tokens(out);
            }
            Expr::Ternary(cond, then, otherwise) => {
                cond.collect_tokens(out);
                then.collect_tokens(out);
                otherwise.collect_tokens(out);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEXER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    Number(f64),
    Str(String),
    Word(String),
    Token(String),
    Op(&'static str),
    LParen,
    RParen,
    Question,
    Colon,
}

const OPERATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!",
];

fn lex(source: &str, sigil: char) -> Result<Vec<(Lexeme, usize)>, ExpressionError> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < source.len() {
        let rest = &source[pos..];
        let Some(c) = rest.chars().next() else {
            break;
        };
        if c.is_whitespace() {
            pos += c.len_utf8();
            continue;
        }
        let start = pos;
        if c == sigil {
            let after = &rest[c.len_utf8()..];
            let Some(m) = TOKEN_PATH_RE.find(after) else {
                return Err(ExpressionError::new(
                    source,
                    format!("expected a name after '{}'", sigil),
                    start,
                ));
            };
            out.push((Lexeme::Token(m.as_str().to_string()), start));
            pos += c.len_utf8() + m.end();
            continue;
        }
        if c == '"' || c == '\'' {
            let (text, consumed) = lex_string(source, start, c)?;
            out.push((Lexeme::Str(text), start));
            pos += consumed;
            continue;
        }
        if let Some(m) = NUMBER_RE.find(rest) {
            let number = m.as_str().parse::<f64>().map_err(|_| {
                ExpressionError::new(source, format!("invalid number '{}'", m.as_str()), start)
            })?;
            out.push((Lexeme::Number(number), start));
            pos += m.end();
            continue;
        }
        if let Some(m) = WORD_RE.find(rest) {
            out.push((Lexeme::Word(m.as_str().to_string()), start));
            pos += m.end();
            continue;
        }
        let simple = match c {
            '(' => Some(Lexeme::LParen),
            ')' => Some(Lexeme::RParen),
            '?' => Some(Lexeme::Question),
            ':' => Some(Lexeme::Colon),
            _ => None,
        };
        if let Some(lexeme) = simple {
            out.push((lexeme, start));
            pos += 1;
            continue;
        }
        match OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            Some(op) => {
                out.push((Lexeme::Op(*op), start));
                pos += op.len();
            }
            None => {
                return Err(ExpressionError::new(
                    source,
                    format!("unexpected character '{}'", c),
                    start,
                ))
            }
        }
    }
    Ok(out)
}

/// Returns the unescaped text and the number of bytes consumed including quotes.
fn lex_string(source: &str, start: usize, quote: char) -> Result<(String, usize), ExpressionError> {
    let mut text = String::new();
    let mut chars = source[start + 1..].char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, 'r')) => text.push('\r'),
                Some((_, other)) => text.push(other),
                None => break,
            },
            c if c == quote => return Ok((text, i + 2)),
            c => text.push(c),
        }
    }
    Err(ExpressionError::new(source, "unterminated string", start))
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER
// ═══════════════════════════════════════════════════════════════════════════════

struct Parser<'s> {
    source: &'s str,
    lexemes: Vec<(Lexeme, usize)>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.pos).map(|(lexeme, _)| lexeme)
    }

    fn offset(&self) -> usize {
        self.lexemes
            .get(self.pos)
            .map(|(_, offset)| *offset)
            .unwrap_or(self.source.len())
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::new(self.source, message, self.offset())
    }

    fn advance(&mut self) -> Option<Lexeme> {
        let lexeme = self.lexemes.get(self.pos).map(|(lexeme, _)| lexeme.clone());
        self.pos += 1;
        lexeme
    }

    fn parse(mut self) -> Result<Expr, ExpressionError> {
        let expr = self.parse_ternary()?;
        if self.peek().is_some() {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    fn parse_ternary(&mut self) -> Result<Expr, ExpressionError> {
        let condition = self.parse_binary(1)?;
        if self.peek() != Some(&Lexeme::Question) {
            return Ok(condition);
        }
        self.advance();
        let then = self.parse_ternary()?;
        if self.advance() != Some(Lexeme::Colon) {
            self.pos -= 1;
            return Err(self.error("expected ':' in conditional expression"));
        }
        let otherwise = self.parse_ternary()?;
        Ok(Expr::Ternary(
            Box::new(condition),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Lexeme::Op(symbol)) => match BinaryOp::from_symbol(symbol) {
                    Some(op) if op.precedence() >= min_precedence => op,
                    _ => break,
                },
                _ => break,
            };
            self.advance();
            let right = self.parse_binary(op.precedence() + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        let op = match self.peek() {
            Some(Lexeme::Op("!")) => UnaryOp::Not,
            Some(Lexeme::Op("-")) => UnaryOp::Neg,
            _ => return self.parse_primary(),
        };
        self.advance();
        Ok(Expr::Unary(op, Box::new(self.parse_unary()?)))
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let offset = self.offset();
        match self.advance() {
            Some(Lexeme::Number(n)) => Ok(Expr::Literal(number_value(n))),
            Some(Lexeme::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Lexeme::Token(token)) => Ok(Expr::Token(token)),
            Some(Lexeme::Word(word)) => match word.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
                other => Err(ExpressionError::new(
                    self.source,
                    format!("unknown identifier '{}'", other),
                    offset,
                )),
            },
            Some(Lexeme::LParen) => {
                let inner = self.parse_ternary()?;
                if self.advance() != Some(Lexeme::RParen) {
                    self.pos -= 1;
                    return Err(self.error("expected ')'"));
                }
                Ok(inner)
            }
            Some(_) => Err(ExpressionError::new(self.source, "unexpected operator", offset)),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

/// Parse `source` into an AST. `sigil` marks tokens.
pub fn parse_expression(source: &str, sigil: char) -> Result<Expr, ExpressionError> {
    let lexemes = lex(source, sigil)?;
    Parser {
        source,
        lexemes,
        pos: 0,
    }
    .parse()
}

// ═══════════════════════════════════════════════════════════════════════════════
// BINDING & EVALUATION
// ═══════════════════════════════════════════════════════════════════════════════

enum Bound {
    Literal(Value),
    Token(EvalFn),
    Unary(UnaryOp, Box<Bound>),
    Binary(BinaryOp, Box<Bound>, Box<Bound>),
    Ternary(Box<Bound>, Box<Bound>, Box<Bound>),
}

impl Bound {
    fn bind(expr: &Expr, resolver: &mut dyn FnMut(&str) -> EvalFn) -> Bound {
        match expr {
            Expr::Literal(value) => Bound::Literal(value.clone()),
            Expr::Token(token) => Bound::Token(resolver(token)),
            Expr::Unary(op, operand) => Bound::Unary(*op, Box::new(Bound::bind(operand, resolver))),
            Expr::Binary(op, left, right) => Bound::Binary(
                *op,
                Box::new(Bound::bind(left, resolver)),
                Box::new(Bound::bind(right, resolver)),
            ),
            Expr::Ternary(cond, then, otherwise) => Bound::Ternary(
                Box::new(Bound::bind(cond, resolver)),
                Box::new(Bound::bind(then, resolver)),
                Box::new(Bound::bind(otherwise, resolver)),
            ),
        }
    }

    fn eval(&self, ctx: &mut EvalContext) -> Value {
        match self {
            Bound::Literal(value) => value.clone(),
            Bound::Token(getter) => getter(ctx),
            Bound::Unary(UnaryOp::Not, operand) => Value::Bool(!truthy(&operand.eval(ctx))),
            Bound::Unary(UnaryOp::Neg, operand) => number_value(-to_number(&operand.eval(ctx))),
            Bound::Binary(BinaryOp::And, left, right) => {
                let left = left.eval(ctx);
                if truthy(&left) {
                    right.eval(ctx)
                } else {
                    left
                }
            }
            Bound::Binary(BinaryOp::Or, left, right) => {
                let left = left.eval(ctx);
                if truthy(&left) {
                    left
                } else {
                    right.eval(ctx)
                }
            }
            Bound::Binary(op, left, right) => {
                let left = left.eval(ctx);
                let right = right.eval(ctx);
                op.apply(&left, &right)
            }
            Bound::Ternary(cond, then, otherwise) => {
                if truthy(&cond.eval(ctx)) {
                    then.eval(ctx)
                } else {
                    otherwise.eval(ctx)
                }
            }
        }
    }
}

struct CompiledAst(Rc<Expr>);

impl CompiledExpression for CompiledAst {
    fn provide(&self, resolver: &mut dyn FnMut(&str) -> EvalFn) -> EvalFn {
        let bound = Bound::bind(&self.0, resolver);
        Rc::new(move |ctx: &mut EvalContext| bound.eval(ctx))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEFAULT COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

/// Default [`ExpressionCompiler`]. Parsed ASTs are cached by source text.
#[derive(Debug)]
pub struct BasicExpressionCompiler {
    sigil: char,
    cache: RefCell<HashMap<String, Rc<Expr>>>,
}

impl Default for BasicExpressionCompiler {
    fn default() -> Self {
        Self::with_sigil('$')
    }
}

impl BasicExpressionCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sigil(sigil: char) -> Self {
        Self {
            sigil,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl ExpressionCompiler for BasicExpressionCompiler {
    fn compile(&self, source: &str) -> Result<Box<dyn CompiledExpression>, ExpressionError> {
        if let Some(ast) = self.cache.borrow().get(source) {
            return Ok(Box::new(CompiledAst(ast.clone())));
        }
        let ast = Rc::new(parse_expression(source, self.sigil)?);
        self.cache
            .borrow_mut()
            .insert(source.to_string(), ast.clone());
        Ok(Box::new(CompiledAst(ast)))
    }

    fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness_table() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!("")] {
            assert!(!truthy(&falsy), "{} should be falsy", falsy);
        }
        for value in [json!(true), json!(1), json!(-2.5), json!("0"), json!([]), json!({})] {
            assert!(truthy(&value), "{} should be truthy", value);
        }
    }

    #[test]
    fn test_display_string() {
        assert_eq!(display_string(&json!(2)), "2");
        assert_eq!(display_string(&json!(2.0)), "2");
        assert_eq!(display_string(&json!(1.5)), "1.5");
        assert_eq!(display_string(&json!(null)), "");
        assert_eq!(display_string(&json!(false)), "false");
        assert_eq!(display_string(&json!("x")), "x");
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expression("1 + 2 * 3 > 6 && !false", '$').unwrap();
        match expr {
            Expr::Binary(BinaryOp::And, left, _) => match *left {
                Expr::Binary(BinaryOp::Gt, sum, _) => {
                    assert!(matches!(*sum, Expr::Binary(BinaryOp::Add, _, _)))
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_tokens_collected() {
        let expr = parse_expression("$user.name + ' ' + $items.0.title", '$').unwrap();
        assert_eq!(expr.tokens(), vec!["user.name", "items.0.title"]);
    }

    #[test]
    fn test_custom_sigil() {
        let expr = parse_expression("@count >= 2", '@').unwrap();
        assert_eq!(expr.tokens(), vec!["count"]);
    }

    #[test]
    fn test_syntax_errors_carry_offset() {
        let err = parse_expression("$a +", '$').unwrap_err();
        assert_eq!(err.offset, 4);
        let err = parse_expression("$ > 1", '$').unwrap_err();
        assert_eq!(err.offset, 0);
        assert!(parse_expression("'open", '$').is_err());
        assert!(parse_expression("(1 + 2", '$').is_err());
        assert!(parse_expression("1 2", '$').is_err());
        assert!(parse_expression("foo", '$').is_err());
    }

    #[test]
    fn test_cache_reuses_ast() {
        let compiler = BasicExpressionCompiler::new();
        compiler.compile("$a + 1").unwrap();
        compiler.compile("$a + 1").unwrap();
        assert_eq!(compiler.cached(), 1);
    }
}
