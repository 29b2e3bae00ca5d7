//! Statement splitting and the tagged statement tree.
//!
//! A script is split once into top-level statements and parsed into [`Statement`]s.
//! Block bodies (`if`, function definitions) are parsed up front whether or not they
//! ever run.

use crate::expr::Expr;
use crate::expr::ExprError;
use crate::expr::Value;
use crate::expr::is_ident_char;
use crate::expr::is_ident_start;
use std::rc::Rc;

/// Expression text plus its parse outcome. A failed parse is kept so the
/// interpreter can degrade to the raw text when the statement runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptExpr {
    source: String,
    parsed: Result<Expr, ExprError>,
}

impl ScriptExpr {
    pub fn new(source: &str) -> Self {
        let source = source.trim();
        Self {
            source: source.to_owned(),
            parsed: Expr::parse(source),
        }
    }

    fn empty() -> Self {
        Self {
            source: String::new(),
            parsed: Ok(Expr::Literal(Value::default())),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn parsed(&self) -> Result<&Expr, &ExprError> {
        self.parsed.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `alert(expr)`
    Alert(ScriptExpr),
    /// `function name() { body }`
    FunctionDef { name: String, body: Rc<[Statement]> },
    /// `name()`
    Call { name: String },
    /// `if (condition) { body }`
    If {
        condition: ScriptExpr,
        body: Vec<Statement>,
    },
    /// `document.write(expr)`
    Write(ScriptExpr),
    /// `console.log(expr)`
    Log(ScriptExpr),
    /// `var|let|const name = expr` or `name = expr`
    Assign { name: String, value: ScriptExpr },
    /// `document.getElementById(target).onclick = { handler }`
    SetClickHandler { target: ScriptExpr, handler: String },
    /// `document.getElementById(target).innerText = value`
    SetText {
        target: ScriptExpr,
        value: ScriptExpr,
    },
    Unknown(String),
}

/// Blocks nested deeper than this are kept as [`Statement::Unknown`].
const MAX_BLOCK_DEPTH: usize = 256;

pub fn parse_program(source: &str) -> Vec<Statement> {
    parse_block(source, 0)
}

fn parse_block(source: &str, depth: usize) -> Vec<Statement> {
    split_statements(source)
        .iter()
        .map(|statement| parse_statement(statement, depth))
        .collect()
}

/// Splits on `;` and newlines at brace/paren depth zero, and right after a block's
/// closing brace. `//` comments are dropped; quotes are respected.
pub(crate) fn split_statements(source: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escape = false;
    let mut braces = 0_u32;
    let mut parens = 0_u32;
    let mut chars = source.chars().peekable();

    while let Some(ch) = chars.next() {
        if let Some(open) = quote {
            current.push(ch);
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == open {
                quote = None;
            }
            continue;
        }

        match ch {
            '\'' | '"' | '`' => {
                quote = Some(ch);
                current.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => {
                while chars.next_if(|next| *next != '\n').is_some() {}
            }
            '{' => {
                braces = braces.saturating_add(1);
                current.push(ch);
            }
            '}' => {
                braces = braces.saturating_sub(1);
                current.push(ch);
                if braces == 0 && parens == 0 {
                    flush_statement(&mut statements, &mut current);
                }
            }
            '(' => {
                parens = parens.saturating_add(1);
                current.push(ch);
            }
            ')' => {
                parens = parens.saturating_sub(1);
                current.push(ch);
            }
            ';' | '\n' if braces == 0 && parens == 0 => {
                flush_statement(&mut statements, &mut current);
            }
            _ => current.push(ch),
        }
    }

    flush_statement(&mut statements, &mut current);
    statements
}

fn flush_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_owned());
    }
    current.clear();
}

fn parse_statement(text: &str, depth: usize) -> Statement {
    let text = text.trim();
    if depth > MAX_BLOCK_DEPTH {
        return Statement::Unknown(text.to_owned());
    }

    if let Some(argument) = call_argument(text, "alert") {
        return Statement::Alert(ScriptExpr::new(argument));
    }
    if let Some(statement) = parse_function_def(text, depth) {
        return statement;
    }
    if let Some(name) = parse_call(text) {
        return Statement::Call {
            name: name.to_owned(),
        };
    }
    if let Some(statement) = parse_if(text, depth) {
        return statement;
    }
    if let Some(argument) = call_argument(text, "document.write") {
        return Statement::Write(ScriptExpr::new(argument));
    }
    if let Some(argument) = call_argument(text, "console.log") {
        return Statement::Log(ScriptExpr::new(argument));
    }
    if let Some(statement) = parse_declaration(text) {
        return statement;
    }
    if let Some(statement) = parse_element_mutation(text) {
        return statement;
    }
    if let Some(statement) = parse_assignment(text) {
        return statement;
    }

    Statement::Unknown(text.to_owned())
}

/// `callee(argument)` with nothing after the closing paren.
fn call_argument<'a>(text: &'a str, callee: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(callee)?.trim_start();
    let close = matching_close(rest, '(', ')')?;
    if !rest[close + 1..].trim().is_empty() {
        return None;
    }
    Some(rest[1..close].trim())
}

fn parse_function_def(text: &str, depth: usize) -> Option<Statement> {
    let rest = text.strip_prefix("function")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let rest = rest.trim_start();
    let name = leading_ident(rest)?;
    let params = rest[name.len()..].trim_start().strip_prefix('(')?.trim_start();
    let body = block_body(params.strip_prefix(')')?.trim_start())?;

    Some(Statement::FunctionDef {
        name: name.to_owned(),
        body: Rc::from(parse_block(body, depth + 1)),
    })
}

fn parse_call(text: &str) -> Option<&str> {
    let name = leading_ident(text)?;
    let args = text[name.len()..].trim_start().strip_prefix('(')?;
    if args.trim() != ")" || is_keyword(name) {
        return None;
    }
    Some(name)
}

fn parse_if(text: &str, depth: usize) -> Option<Statement> {
    let rest = text.strip_prefix("if")?;
    if !rest.starts_with(|ch: char| ch.is_whitespace() || ch == '(') {
        return None;
    }

    let rest = rest.trim_start();
    let close = matching_close(rest, '(', ')')?;
    let condition = ScriptExpr::new(&rest[1..close]);
    let after = rest[close + 1..].trim_start();

    let body = if after.starts_with('{') {
        parse_block(block_body(after)?, depth + 1)
    } else if after.is_empty() {
        Vec::new()
    } else {
        vec![parse_statement(after, depth + 1)]
    };

    Some(Statement::If { condition, body })
}

fn parse_declaration(text: &str) -> Option<Statement> {
    let rest = ["var", "let", "const"]
        .iter()
        .find_map(|keyword| text.strip_prefix(keyword))?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let rest = rest.trim_start();
    let name = leading_ident(rest)?;
    let after = rest[name.len()..].trim_start();
    if after.is_empty() {
        return Some(Statement::Assign {
            name: name.to_owned(),
            value: ScriptExpr::empty(),
        });
    }

    let value = assignment_value(after)?;
    Some(Statement::Assign {
        name: name.to_owned(),
        value: ScriptExpr::new(value),
    })
}

fn parse_assignment(text: &str) -> Option<Statement> {
    let name = leading_ident(text)?;
    if is_keyword(name) {
        return None;
    }
    let value = assignment_value(text[name.len()..].trim_start())?;
    Some(Statement::Assign {
        name: name.to_owned(),
        value: ScriptExpr::new(value),
    })
}

fn parse_element_mutation(text: &str) -> Option<Statement> {
    let rest = text
        .strip_prefix("document.getElementById")?
        .trim_start();
    let close = matching_close(rest, '(', ')')?;
    let target = ScriptExpr::new(&rest[1..close]);

    let member = rest[close + 1..].trim_start().strip_prefix('.')?.trim_start();
    let property = leading_ident(member)?;
    let value = assignment_value(member[property.len()..].trim_start())?;

    match property {
        "onclick" => Some(Statement::SetClickHandler {
            target,
            handler: handler_body(value)?,
        }),
        "innerText" | "textContent" => Some(Statement::SetText {
            target,
            value: ScriptExpr::new(value),
        }),
        _ => None,
    }
}

/// Handler text from `{ body }`, `function () { body }` or a string literal.
fn handler_body(value: &str) -> Option<String> {
    if value.starts_with('{') {
        return block_body(value).map(|body| body.trim().to_owned());
    }

    if let Some(rest) = value.strip_prefix("function") {
        let params = rest.trim_start().strip_prefix('(')?.trim_start();
        let body = block_body(params.strip_prefix(')')?.trim_start())?;
        return Some(body.trim().to_owned());
    }

    match ScriptExpr::new(value).parsed() {
        Ok(Expr::Literal(Value::Str(text))) => Some(text.clone()),
        _ => None,
    }
}

/// The text after `=` in `= value`, rejecting `==`.
fn assignment_value(text: &str) -> Option<&str> {
    let value = text.strip_prefix('=')?;
    if value.starts_with('=') {
        return None;
    }
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Inner text of a `{ ... }` block that spans all of `text`.
fn block_body(text: &str) -> Option<&str> {
    let close = matching_close(text, '{', '}')?;
    if !text[close + 1..].trim().is_empty() {
        return None;
    }
    Some(&text[1..close])
}

/// Byte index of the bracket closing the one `text` starts with.
fn matching_close(text: &str, open: char, close: char) -> Option<usize> {
    if !text.starts_with(open) {
        return None;
    }

    let mut depth = 0_u32;
    let mut quote: Option<char> = None;
    let mut escape = false;

    for (idx, ch) in text.char_indices() {
        if let Some(active) = quote {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == active {
                quote = None;
            }
            continue;
        }

        if ch == '\'' || ch == '"' || ch == '`' {
            quote = Some(ch);
        } else if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                return Some(idx);
            }
        }
    }

    None
}

fn leading_ident(text: &str) -> Option<&str> {
    if !text.starts_with(is_ident_start) {
        return None;
    }
    let end = text
        .find(|ch: char| !is_ident_char(ch))
        .unwrap_or(text.len());
    Some(&text[..end])
}

fn is_keyword(name: &str) -> bool {
    matches!(
        name,
        "if" | "else" | "function" | "var" | "let" | "const" | "return" | "while" | "for"
    )
}
