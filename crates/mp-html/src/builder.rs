//! Token dispatcher: drives the document, the rule table and the interpreter
//! from the token stream.

use crate::ParserConfig;
use crate::tokenizer::Token;
use crate::tokenizer::is_void;
use log::debug;
use log::trace;
use mp_core::StyleRef;
use mp_css::ResolvedStyles;
use mp_css::StyleRuleTable;
use mp_dom::Document;
use mp_dom::ElementKind;
use mp_dom::NodeIndex;
use mp_dom::Payload;
use mp_script::ExecutionReport;
use mp_script::Interpreter;

#[derive(Debug)]
struct OpenTag {
    name: String,
    style: StyleRef,
    node: NodeIndex,
    /// Whitespace was seen after the last fragment appended to this element.
    pending_space: bool,
}

pub(crate) struct TreeBuilder<'a> {
    config: &'a ParserConfig,
    pub(crate) document: Document,
    pub(crate) rules: StyleRuleTable,
    pub(crate) styles: ResolvedStyles,
    pub(crate) interpreter: Interpreter,
    pub(crate) report: ExecutionReport,
    stack: Vec<OpenTag>,
    in_style: bool,
    in_script: bool,
    skip_external: bool,
    buffer: String,
}

impl<'a> TreeBuilder<'a> {
    pub(crate) fn new(config: &'a ParserConfig) -> Self {
        Self {
            config,
            document: Document::new(),
            rules: StyleRuleTable::new(),
            styles: ResolvedStyles::default(),
            interpreter: Interpreter::new(config.interpreter),
            report: ExecutionReport::default(),
            stack: Vec::new(),
            in_style: false,
            in_script: false,
            skip_external: false,
            buffer: String::new(),
        }
    }

    pub(crate) fn feed(&mut self, token: Token) {
        match token {
            Token::StartTag {
                name,
                attrs,
                self_closing,
            } => self.start_tag(name, attrs, self_closing),
            Token::EndTag { name } => self.end_tag(&name),
            Token::Text(text) => self.text(&text),
        }
    }

    fn context(&self) -> Vec<StyleRef> {
        self.stack.iter().map(|open| open.style).collect()
    }

    fn start_tag(&mut self, name: String, attrs: Vec<(String, String)>, self_closing: bool) {
        if self.raw_text_mode() {
            return;
        }

        match name.as_str() {
            "style" => {
                self.in_style = !self_closing;
                return;
            }
            "script" => {
                if attrs.iter().any(|(key, _)| key == "src") {
                    trace!("dropping external script");
                    self.skip_external = !self_closing;
                } else {
                    self.in_script = !self_closing;
                }
                return;
            }
            "br" => {
                self.document.add_element(
                    ElementKind::LineBreak,
                    Payload::default(),
                    self.context(),
                    None,
                );
                return;
            }
            _ => {}
        }

        let style = self.styles.insert(self.rules.resolve(&name, &attrs));
        let mut chain = self.context();
        chain.push(style);

        let explicit_id = attrs
            .iter()
            .find(|(key, value)| key == "id" && !value.is_empty())
            .map(|(_, value)| value.clone());
        let node = self.document.add_element(
            ElementKind::tag(name.clone()),
            Payload::with_attrs(attrs),
            chain,
            explicit_id,
        );

        if self_closing || is_void(&name) {
            return;
        }
        self.stack.push(OpenTag {
            name,
            style,
            node,
            pending_space: false,
        });
    }

    fn end_tag(&mut self, name: &str) {
        if self.skip_external {
            if name == "script" {
                self.skip_external = false;
            }
            return;
        }
        if self.in_style {
            if name == "style" {
                self.in_style = false;
                let sheet = std::mem::take(&mut self.buffer);
                let added = self.rules.add_style_sheet(&sheet);
                debug!("style sheet added {added} selector entries");
            }
            return;
        }
        if self.in_script {
            if name == "script" {
                self.in_script = false;
                let source = std::mem::take(&mut self.buffer);
                self.run_buffered_script(&source);
            }
            return;
        }

        if self.stack.last().map(|open| open.name.as_str()) != Some(name) {
            trace!("ignoring mismatched </{name}>");
            return;
        }
        self.stack.pop();

        if is_block(name) {
            self.document.add_element(
                ElementKind::BlockEnd(name.to_owned()),
                Payload::default(),
                self.context(),
                None,
            );
        }
    }

    fn text(&mut self, raw: &str) {
        if self.skip_external {
            return;
        }
        if self.in_style || self.in_script {
            self.buffer.push_str(raw);
            return;
        }

        let Some(open) = self.stack.last_mut() else {
            if !raw.trim().is_empty() {
                trace!("dropping text outside any open tag");
            }
            return;
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            open.pending_space |= !raw.is_empty();
            return;
        }

        let separated = open.pending_space || raw.starts_with(char::is_whitespace);
        self.document.append_content(open.node, trimmed, separated);
        open.pending_space = raw.ends_with(char::is_whitespace);
    }

    fn run_buffered_script(&mut self, source: &str) {
        if !self.config.execute_scripts {
            trace!("script execution disabled; discarding {} bytes", source.len());
            return;
        }
        let context = self.context();
        let report = self
            .interpreter
            .run(&mut self.document, source, &context);
        self.report.absorb(report);
    }

    fn raw_text_mode(&self) -> bool {
        self.in_style || self.in_script || self.skip_external
    }
}

/// Block-level tags whose closure starts a new visual line.
fn is_block(name: &str) -> bool {
    matches!(
        name,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "p" | "div" | "li" | "button"
    )
}
