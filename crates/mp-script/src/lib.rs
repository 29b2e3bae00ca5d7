//! Script interpreter for the small inline-script dialect MiniPage pages use.
//!
//! Source text is parsed once into [`Statement`]s and then walked against an
//! [`Environment`] that outlives individual runs, so variables and functions
//! defined during parsing stay visible to later click handlers.

pub mod ast;
pub mod expr;

pub use ast::ScriptExpr;
pub use ast::Statement;
pub use ast::parse_program;
pub use expr::Expr;
pub use expr::ExprError;
pub use expr::Value;

use log::debug;
use log::info;
use log::warn;
use mp_core::StyleRef;
use mp_dom::Document;
use mp_dom::ElementId;
use mp_dom::ElementKind;
use mp_dom::Payload;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// Interpreter limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterConfig {
    pub max_call_depth: usize,
    pub max_reported_errors: usize,
    pub max_script_bytes: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 64,
            max_reported_errors: 24,
            max_script_bytes: 1024 * 1024,
        }
    }
}

/// Non-fatal problem met while running a script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("unknown statement `{0}`")]
    UnknownStatement(String),
    #[error("call to undefined function `{0}`")]
    UnknownFunction(String),
    #[error("cannot evaluate `{expression}`: {reason}")]
    Evaluation {
        expression: String,
        reason: ExprError,
    },
    #[error("call to `{name}` exceeds depth limit {limit}")]
    CallDepthExceeded { name: String, limit: usize },
    #[error("script of {size} bytes exceeds limit {limit}; skipped")]
    ScriptTooLarge { size: usize, limit: usize },
}

/// Observable side effect that does not touch the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutput {
    Console(String),
    /// Presented as a modal notification by the presentation layer.
    Alert(String),
}

/// Runtime outcome summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub statements_executed: usize,
    pub scripts_skipped: usize,
    pub output: Vec<ScriptOutput>,
    pub errors: Vec<ScriptError>,
}

impl ExecutionReport {
    pub fn console_lines(&self) -> impl Iterator<Item = &str> {
        self.output.iter().filter_map(|output| match output {
            ScriptOutput::Console(line) => Some(line.as_str()),
            ScriptOutput::Alert(_) => None,
        })
    }

    pub fn alerts(&self) -> impl Iterator<Item = &str> {
        self.output.iter().filter_map(|output| match output {
            ScriptOutput::Alert(message) => Some(message.as_str()),
            ScriptOutput::Console(_) => None,
        })
    }

    /// Folds a later run into this one, keeping emission order.
    pub fn absorb(&mut self, other: ExecutionReport) {
        self.statements_executed = self
            .statements_executed
            .saturating_add(other.statements_executed);
        self.scripts_skipped = self.scripts_skipped.saturating_add(other.scripts_skipped);
        self.output.extend(other.output);
        self.errors.extend(other.errors);
    }
}

/// Flat variable and function mapping shared by every run of one interpreter.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    variables: HashMap<String, Value>,
    functions: HashMap<String, Rc<[Statement]>>,
}

impl Environment {
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    config: InterpreterConfig,
    env: Environment,
}

impl Interpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        Self {
            config,
            env: Environment::default(),
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Runs `source` against `document`. `context` is the chain of style references
    /// attached to any element the script writes.
    pub fn run(
        &mut self,
        document: &mut Document,
        source: &str,
        context: &[StyleRef],
    ) -> ExecutionReport {
        let mut execution = Execution {
            config: &self.config,
            env: &mut self.env,
            document,
            context,
            report: ExecutionReport::default(),
        };

        if source.len() > self.config.max_script_bytes {
            execution.report.scripts_skipped = 1;
            execution.record_error(ScriptError::ScriptTooLarge {
                size: source.len(),
                limit: self.config.max_script_bytes,
            });
            return execution.report;
        }

        let program = parse_program(source);
        execution.execute_block(&program, 0);
        execution.report
    }
}

struct Execution<'a> {
    config: &'a InterpreterConfig,
    env: &'a mut Environment,
    document: &'a mut Document,
    context: &'a [StyleRef],
    report: ExecutionReport,
}

impl Execution<'_> {
    fn execute_block(&mut self, statements: &[Statement], depth: usize) {
        for statement in statements {
            if self.execute(statement, depth) {
                self.report.statements_executed = self.report.statements_executed.saturating_add(1);
            }
        }
    }

    fn execute(&mut self, statement: &Statement, depth: usize) -> bool {
        match statement {
            Statement::Alert(expr) => {
                let message = self.evaluate(expr).to_string();
                info!(target: "mp_script::alert", "{message}");
                self.report.output.push(ScriptOutput::Alert(message));
            }
            Statement::FunctionDef { name, body } => {
                self.env.functions.insert(name.clone(), Rc::clone(body));
            }
            Statement::Call { name } => {
                let Some(body) = self.env.functions.get(name).cloned() else {
                    self.record_error(ScriptError::UnknownFunction(name.clone()));
                    return false;
                };
                if depth >= self.config.max_call_depth {
                    self.record_error(ScriptError::CallDepthExceeded {
                        name: name.clone(),
                        limit: self.config.max_call_depth,
                    });
                    return false;
                }
                self.execute_block(&body, depth + 1);
            }
            Statement::If { condition, body } => {
                if self.condition(condition) {
                    self.execute_block(body, depth);
                }
            }
            Statement::Write(expr) => {
                let text = self.evaluate(expr).to_string();
                self.document.add_element(
                    ElementKind::Text,
                    Payload::with_content(text),
                    self.context.to_vec(),
                    None,
                );
            }
            Statement::Log(expr) => {
                let line = self.evaluate(expr).to_string();
                info!(target: "mp_script::console", "{line}");
                self.report.output.push(ScriptOutput::Console(line));
            }
            Statement::Assign { name, value } => {
                let value = self.evaluate(value);
                self.env.set_variable(name.clone(), value);
            }
            Statement::SetClickHandler { target, handler } => {
                let id = self.target(target);
                if !self.document.set_onclick_override(&id, handler.clone()) {
                    debug!("onclick target {id} not found");
                }
            }
            Statement::SetText { target, value } => {
                let id = self.target(target);
                let text = self.evaluate(value).to_string();
                match self.document.find_by_identity_mut(&id) {
                    Some(element) => element.set_text_override(text),
                    None => debug!("innerText target {id} not found"),
                }
            }
            Statement::Unknown(text) => {
                self.record_error(ScriptError::UnknownStatement(text.clone()));
                return false;
            }
        }
        true
    }

    /// Evaluates `expr`. Text without an arithmetic operator that fails is read as
    /// a variable name (unbound reads `""`); arithmetic that fails degrades to its
    /// source text.
    fn evaluate(&mut self, expr: &ScriptExpr) -> Value {
        match self.try_evaluate(expr) {
            Ok(value) => value,
            Err(reason) if !expr.source().contains(['+', '-', '*', '/']) => {
                debug!("reading `{}` as a variable ({reason})", expr.source());
                self.env
                    .variables
                    .get(expr.source())
                    .cloned()
                    .unwrap_or_default()
            }
            Err(reason) => {
                self.record_error(ScriptError::Evaluation {
                    expression: expr.source().to_owned(),
                    reason,
                });
                Value::Str(expr.source().to_owned())
            }
        }
    }

    /// A condition that fails to evaluate is false.
    fn condition(&mut self, expr: &ScriptExpr) -> bool {
        match self.try_evaluate(expr) {
            Ok(value) => value.is_truthy(),
            Err(reason) => {
                self.record_error(ScriptError::Evaluation {
                    expression: expr.source().to_owned(),
                    reason,
                });
                false
            }
        }
    }

    fn try_evaluate(&self, expr: &ScriptExpr) -> Result<Value, ExprError> {
        match expr.parsed() {
            Ok(parsed) => parsed.eval(&self.env.variables),
            Err(error) => Err(error.clone()),
        }
    }

    fn target(&mut self, expr: &ScriptExpr) -> ElementId {
        ElementId::explicit(self.evaluate(expr).to_string())
    }

    fn record_error(&mut self, error: ScriptError) {
        warn!("script error: {error}");
        if self.report.errors.len() < self.config.max_reported_errors {
            self.report.errors.push(error);
        }
    }
}
