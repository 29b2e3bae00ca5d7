//! Markup parsing into a [`Page`]: the element sequence, its style tables and the
//! interpreter state left behind by inline scripts.

mod builder;
pub mod tokenizer;

use builder::TreeBuilder;
use log::debug;
use mp_core::PageError;
use mp_core::PageResult;
use mp_core::StyleRef;
use mp_css::PropertyMap;
use mp_css::ResolvedStyles;
use mp_css::StyleRuleTable;
use mp_dom::BoundHandle;
use mp_dom::Document;
use mp_dom::Element;
use mp_dom::ElementId;
use mp_script::ExecutionReport;
use mp_script::Interpreter;
use mp_script::InterpreterConfig;
use std::rc::Weak;
use tokenizer::Tokenizer;

/// Parser settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    /// When false, inline script bodies are buffered and discarded.
    pub execute_scripts: bool,
    pub interpreter: InterpreterConfig,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            execute_scripts: true,
            interpreter: InterpreterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HtmlParser {
    config: ParserConfig,
}

impl HtmlParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parses `input` into a fresh page. Never fails: malformed markup degrades.
    pub fn parse(&self, input: &str) -> Page {
        let mut builder = TreeBuilder::new(&self.config);
        for token in Tokenizer::new(input) {
            builder.feed(token);
        }

        debug!(
            "parsed {} elements, {} style rules, {} script statements",
            builder.document.len(),
            builder.rules.len(),
            builder.report.statements_executed
        );

        Page {
            document: builder.document,
            rules: builder.rules,
            styles: builder.styles,
            interpreter: builder.interpreter,
            script_report: builder.report,
        }
    }
}

/// Everything one parse produced. Later interaction (clicks, handler scripts)
/// goes through this facade so it sees the same interpreter state.
#[derive(Debug)]
pub struct Page {
    document: Document,
    rules: StyleRuleTable,
    styles: ResolvedStyles,
    interpreter: Interpreter,
    script_report: ExecutionReport,
}

impl Page {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn rules(&self) -> &StyleRuleTable {
        &self.rules
    }

    pub fn styles(&self) -> &ResolvedStyles {
        &self.styles
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Report accumulated over every inline script run during parsing.
    pub fn script_report(&self) -> &ExecutionReport {
        &self.script_report
    }

    pub fn title(&self) -> Option<&str> {
        self.document.title()
    }

    pub fn computed_style(&self, element: &Element) -> PropertyMap {
        self.styles.computed(element.style_refs())
    }

    pub fn run_script(&mut self, source: &str, context: &[StyleRef]) -> ExecutionReport {
        self.interpreter.run(&mut self.document, source, context)
    }

    pub fn bind_handle(&mut self, id: &ElementId, handle: Weak<dyn BoundHandle>) -> bool {
        self.document.set_bound_handle(id, handle)
    }

    /// Runs the element's click handler with its style chain as context.
    /// `Ok(None)` means the element has no handler.
    pub fn click(&mut self, id: &ElementId) -> PageResult<Option<ExecutionReport>> {
        let Some(element) = self.document.find_by_identity(id) else {
            return Err(PageError::new(
                "page.click.unknown_element",
                format!("no element with identity {id}"),
            ));
        };

        let Some(handler) = element.click_handler().map(str::to_owned) else {
            debug!("{id} has no click handler");
            return Ok(None);
        };
        let context = element.style_refs().to_vec();

        Ok(Some(self.run_script(&handler, &context)))
    }
}
