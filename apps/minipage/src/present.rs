//! Text presentation of a parsed page.

use mp_css::FontWeight;
use mp_css::PropertyMap;
use mp_dom::BoundHandle;
use mp_html::Page;
use mp_script::ExecutionReport;
use std::cell::Cell;
use std::cell::RefCell;

/// Text label standing in for an on-screen widget.
#[derive(Debug, Default)]
pub(crate) struct Label {
    text: RefCell<String>,
    updated: Cell<bool>,
}

impl Label {
    pub(crate) fn new(text: &str) -> Self {
        Self {
            text: RefCell::new(text.to_owned()),
            updated: Cell::new(false),
        }
    }

    pub(crate) fn text(&self) -> String {
        self.text.borrow().clone()
    }

    /// Returns whether the label changed since the last call.
    pub(crate) fn take_updated(&self) -> bool {
        self.updated.replace(false)
    }
}

impl BoundHandle for Label {
    fn set_text(&self, text: &str) {
        *self.text.borrow_mut() = text.to_owned();
        self.updated.set(true);
    }
}

/// One line per element with visible text, with its computed style appended.
pub(crate) fn content_lines(page: &Page) -> Vec<String> {
    page.document()
        .iter()
        .filter(|element| !element.kind().is_marker())
        .filter(|element| element.kind().tag_name() != Some("title"))
        .filter_map(|element| {
            let text = element.text()?.trim();
            if text.is_empty() {
                return None;
            }

            let style = describe_style(&page.computed_style(element));
            let line = if style.is_empty() {
                format!("{} {}: {text}", element.kind(), element.id())
            } else {
                format!("{} {}: {text} [{style}]", element.kind(), element.id())
            };
            Some(line)
        })
        .collect()
}

pub(crate) fn describe_style(props: &PropertyMap) -> String {
    let mut parts = Vec::new();
    if let Some(color) = &props.foreground {
        parts.push(format!("color: {color}"));
    }
    if let Some(background) = &props.background {
        parts.push(format!("background: {background}"));
    }
    if props.font_weight == Some(FontWeight::Bold) {
        parts.push(FontWeight::Bold.as_str().to_owned());
    }
    if let Some(size) = props.font_size {
        parts.push(format!("size: {size}"));
    }
    if let Some(family) = props.primary_font_family() {
        parts.push(format!("font: {family}"));
    }
    parts.join("; ")
}

/// Alert, console and error lines of one script run, in emission order.
pub(crate) fn report_lines(report: &ExecutionReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .output
        .iter()
        .map(|output| match output {
            mp_script::ScriptOutput::Alert(message) => format!("[alert] {message}"),
            mp_script::ScriptOutput::Console(line) => format!("[console] {line}"),
        })
        .collect();
    lines.extend(report.errors.iter().map(|error| format!("[error] {error}")));
    lines
}
