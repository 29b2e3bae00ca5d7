//! Typed values and the recursive-descent expression parser.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! equality := additive (("==" | "===" | "!=" | "!==") additive)?
//! additive := term (("+" | "-") term)*
//! term     := unary (("*" | "/") unary)*
//! unary    := ("-" | "!") unary | primary
//! primary  := INT | STRING | "true" | "false" | IDENT | "(" equality ")"
//! ```

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Runtime value held by script variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Str(text) => !text.is_empty(),
            Self::Int(number) => *number != 0,
            Self::Bool(flag) => *flag,
        }
    }

    fn as_number(&self) -> Result<i64, ExprError> {
        match self {
            Self::Int(number) => Ok(*number),
            Self::Bool(flag) => Ok(i64::from(*flag)),
            Self::Str(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(0);
                }
                trimmed
                    .parse::<i64>()
                    .map_err(|_| ExprError::NotANumber(text.clone()))
            }
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Str(String::new())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(text) => f.write_str(text),
            Self::Int(number) => write!(f, "{number}"),
            Self::Bool(flag) => write!(f, "{flag}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("integer literal `{0}` is out of range")]
    IntegerOutOfRange(String),
    #[error("unexpected token `{0}`")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("`{0}` is not a number")]
    NotANumber(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("expression nested too deeply")]
    TooDeep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let tokens = lex(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.equality()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(ExprError::UnexpectedToken(token.to_string())),
        }
    }

    /// Evaluates against the flat variable mapping; unbound names read as `""`.
    pub fn eval(&self, variables: &HashMap<String, Value>) -> Result<Value, ExprError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Variable(name) => Ok(variables.get(name).cloned().unwrap_or_default()),
            Self::Unary { op, operand } => {
                let value = operand.eval(variables)?;
                match op {
                    UnaryOp::Neg => value
                        .as_number()?
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or(ExprError::Overflow),
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                }
            }
            Self::Binary { op, lhs, rhs } => {
                let lhs = lhs.eval(variables)?;
                let rhs = rhs.eval(variables)?;
                apply_binary(*op, lhs, rhs)
            }
        }
    }
}

fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, ExprError> {
    let arithmetic = |apply: fn(i64, i64) -> Option<i64>| -> Result<Value, ExprError> {
        apply(lhs.as_number()?, rhs.as_number()?)
            .map(Value::Int)
            .ok_or(ExprError::Overflow)
    };

    match op {
        BinaryOp::Add => match (&lhs, &rhs) {
            (Value::Str(_), _) | (_, Value::Str(_)) => Ok(Value::Str(format!("{lhs}{rhs}"))),
            _ => arithmetic(i64::checked_add),
        },
        BinaryOp::Sub => arithmetic(i64::checked_sub),
        BinaryOp::Mul => arithmetic(i64::checked_mul),
        BinaryOp::Div => {
            if rhs.as_number()? == 0 {
                return Err(ExprError::DivisionByZero);
            }
            arithmetic(i64::checked_div)
        }
        BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinaryOp::NotEq => Ok(Value::Bool(lhs != rhs)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Int(i64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    LParen,
    RParen,
    EqEq,
    NotEq,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(number) => write!(f, "{number}"),
            Self::Str(text) => write!(f, "{text:?}"),
            Self::Ident(name) => f.write_str(name),
            Self::Plus => f.write_str("+"),
            Self::Minus => f.write_str("-"),
            Self::Star => f.write_str("*"),
            Self::Slash => f.write_str("/"),
            Self::Bang => f.write_str("!"),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
            Self::EqEq => f.write_str("=="),
            Self::NotEq => f.write_str("!="),
        }
    }
}

pub(crate) fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

pub(crate) fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}

fn lex(source: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(ch) = chars.next() {
        let token = match ch {
            _ if ch.is_whitespace() => continue,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '=' | '!' => {
                if chars.next_if_eq(&'=').is_none() {
                    if ch == '!' {
                        tokens.push(Token::Bang);
                        continue;
                    }
                    return Err(ExprError::UnexpectedChar('='));
                }
                // `===` and `!==` compare like `==` and `!=`.
                let _ = chars.next_if_eq(&'=');
                if ch == '=' { Token::EqEq } else { Token::NotEq }
            }
            '\'' | '"' => Token::Str(lex_string(&mut chars, ch)?),
            _ if ch.is_ascii_digit() => {
                let mut digits = String::from(ch);
                while let Some(next) = chars.next_if(char::is_ascii_digit) {
                    digits.push(next);
                }
                let number = digits
                    .parse::<i64>()
                    .map_err(|_| ExprError::IntegerOutOfRange(digits.clone()))?;
                Token::Int(number)
            }
            _ if is_ident_start(ch) => {
                let mut name = String::from(ch);
                while let Some(next) = chars.next_if(|next| is_ident_char(*next)) {
                    name.push(next);
                }
                Token::Ident(name)
            }
            _ => return Err(ExprError::UnexpectedChar(ch)),
        };
        tokens.push(token);
    }

    Ok(tokens)
}

fn lex_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    quote: char,
) -> Result<String, ExprError> {
    let mut text = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some(escaped) => text.push(escaped),
                None => return Err(ExprError::UnterminatedString),
            },
            _ if ch == quote => return Ok(text),
            _ => text.push(ch),
        }
    }

    Err(ExprError::UnterminatedString)
}

/// Bounds both recursion and the height of the built tree, since `eval`
/// walks the tree recursively.
const MAX_NESTING: usize = 256;

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
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn descend(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ExprError::TooDeep);
        }
        Ok(())
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.additive()?;
        let op = if self.eat(&Token::EqEq) {
            BinaryOp::Eq
        } else if self.eat(&Token::NotEq) {
            BinaryOp::NotEq
        } else {
            return Ok(lhs);
        };
        let rhs = self.additive()?;
        Ok(binary(op, lhs, rhs))
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let base = self.depth;
        let mut expr = self.term()?;
        loop {
            let op = if self.eat(&Token::Plus) {
                BinaryOp::Add
            } else if self.eat(&Token::Minus) {
                BinaryOp::Sub
            } else {
                self.depth = base;
                return Ok(expr);
            };
            // Each link deepens the left spine by one.
            self.descend()?;
            let rhs = self.term()?;
            expr = binary(op, expr, rhs);
        }
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        let base = self.depth;
        let mut expr = self.unary()?;
        loop {
            let op = if self.eat(&Token::Star) {
                BinaryOp::Mul
            } else if self.eat(&Token::Slash) {
                BinaryOp::Div
            } else {
                self.depth = base;
                return Ok(expr);
            };
            self.descend()?;
            let rhs = self.unary()?;
            expr = binary(op, expr, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        let op = if self.eat(&Token::Minus) {
            UnaryOp::Neg
        } else if self.eat(&Token::Bang) {
            UnaryOp::Not
        } else {
            return self.primary();
        };
        self.descend()?;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Int(number)) => Ok(Expr::Literal(Value::Int(number))),
            Some(Token::Str(text)) => Ok(Expr::Literal(Value::Str(text))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                _ => Expr::Variable(name),
            }),
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.equality()?;
                self.depth -= 1;
                if !self.eat(&Token::RParen) {
                    return Err(match self.peek() {
                        Some(token) => ExprError::UnexpectedToken(token.to_string()),
                        None => ExprError::UnexpectedEnd,
                    });
                }
                Ok(inner)
            }
            Some(token) => Err(ExprError::UnexpectedToken(token.to_string())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::Expr;
    use super::ExprError;
    use super::Value;
    use std::collections::HashMap;

    fn eval_with(source: &str, variables: &HashMap<String, Value>) -> Result<Value, ExprError> {
        Expr::parse(source).and_then(|expr| expr.eval(variables))
    }

    fn eval(source: &str) -> Result<Value, ExprError> {
        eval_with(source, &HashMap::new())
    }

    #[test]
    fn literals_evaluate_to_typed_values() {
        assert_eq!(eval("'hi'"), Ok(Value::Str("hi".to_owned())));
        assert_eq!(eval("\"a \\\"b\\\"\""), Ok(Value::Str("a \"b\"".to_owned())));
        assert_eq!(eval("42"), Ok(Value::Int(42)));
        assert_eq!(eval("true"), Ok(Value::Bool(true)));
        assert_eq!(eval("false"), Ok(Value::Bool(false)));
    }

    #[test]
    fn arithmetic_respects_precedence_and_parentheses() {
        assert_eq!(eval("1 + 2 * 3"), Ok(Value::Int(7)));
        assert_eq!(eval("(1 + 2) * 3"), Ok(Value::Int(9)));
        assert_eq!(eval("10 - 4 - 3"), Ok(Value::Int(3)));
        assert_eq!(eval("7 / 2"), Ok(Value::Int(3)));
        assert_eq!(eval("-(2 + 3)"), Ok(Value::Int(-5)));
    }

    #[test]
    fn plus_concatenates_when_either_side_is_text() {
        assert_eq!(eval("'x' + '1'"), Ok(Value::Str("x1".to_owned())));
        assert_eq!(eval("'n=' + 1 + 2"), Ok(Value::Str("n=12".to_owned())));
        assert_eq!(eval("1 + 2 + 'px'"), Ok(Value::Str("3px".to_owned())));
    }

    #[test]
    fn numeric_text_takes_part_in_arithmetic() {
        assert_eq!(eval("'5' - 2"), Ok(Value::Int(3)));
        assert_eq!(eval("'abc' * 2"), Err(ExprError::NotANumber("abc".to_owned())));
    }

    #[test]
    fn variables_are_looked_up_not_substituted() {
        let mut variables = HashMap::new();
        variables.insert("a".to_owned(), Value::Int(1));
        variables.insert("ab".to_owned(), Value::Int(2));
        variables.insert("name".to_owned(), Value::Str("Ada".to_owned()));

        assert_eq!(eval_with("ab + a", &variables), Ok(Value::Int(3)));
        assert_eq!(
            eval_with("'hi ' + name", &variables),
            Ok(Value::Str("hi Ada".to_owned()))
        );
        assert_eq!(eval_with("missing", &variables), Ok(Value::default()));
    }

    #[test]
    fn equality_is_typed() {
        let mut variables = HashMap::new();
        variables.insert("x".to_owned(), Value::Int(5));

        assert_eq!(eval_with("x == 5", &variables), Ok(Value::Bool(true)));
        assert_eq!(eval_with("x === 5", &variables), Ok(Value::Bool(true)));
        assert_eq!(eval_with("x == '5'", &variables), Ok(Value::Bool(false)));
        assert_eq!(eval_with("x !== 6", &variables), Ok(Value::Bool(true)));
        assert_eq!(eval_with("!x", &variables), Ok(Value::Bool(false)));
    }

    #[test]
    fn failures_are_reported_as_errors() {
        assert_eq!(eval("1 / 0"), Err(ExprError::DivisionByZero));
        assert_eq!(eval("9223372036854775807 + 1"), Err(ExprError::Overflow));
        assert_eq!(eval("'open"), Err(ExprError::UnterminatedString));
        assert_eq!(eval("a.b"), Err(ExprError::UnexpectedChar('.')));
        assert_eq!(eval("1 +"), Err(ExprError::UnexpectedEnd));
        assert_eq!(eval("x = 1"), Err(ExprError::UnexpectedChar('=')));
        assert!(matches!(eval("(1"), Err(ExprError::UnexpectedEnd)));
        assert!(matches!(eval("1 2"), Err(ExprError::UnexpectedToken(_))));
    }

    #[test]
    fn deep_nesting_is_rejected_without_recursing() {
        let negations = format!("{}1", "-".repeat(20_000));
        assert_eq!(Expr::parse(&negations), Err(ExprError::TooDeep));

        let parens = format!("{}1{}", "(".repeat(20_000), ")".repeat(20_000));
        assert_eq!(Expr::parse(&parens), Err(ExprError::TooDeep));

        let sum = format!("1{}", " + 1".repeat(20_000));
        assert_eq!(Expr::parse(&sum), Err(ExprError::TooDeep));
    }

    #[test]
    fn moderate_nesting_still_evaluates() {
        let parens = format!("{}7{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval(&parens), Ok(Value::Int(7)));
        assert_eq!(eval(&format!("{}5", "--".repeat(50))), Ok(Value::Int(5)));
        assert_eq!(eval(&format!("0{}", " + 1".repeat(200))), Ok(Value::Int(200)));
    }

    #[test]
    fn truthiness_follows_value_kind() {
        assert!(!Value::default().is_truthy());
        assert!(Value::Str("0".to_owned()).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Bool(true).is_truthy());
    }
}
