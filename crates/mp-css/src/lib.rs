//! Style cascade: declaration parsing, global rule table and per-tag resolution.
//!
//! Only bare tag, single `.class`, single `#id` and inline declarations take part
//! in resolution. They are merged in that fixed order, later entries winning.

use log::debug;
use mp_core::StyleRef;
use std::collections::BTreeMap;

/// Normalized `font-weight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

impl FontWeight {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Bold => "bold",
        }
    }
}

/// Normalized property mapping produced from one declaration block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMap {
    /// `color`
    pub foreground: Option<String>,
    /// `background-color`
    pub background: Option<String>,
    pub font_weight: Option<FontWeight>,
    /// Point size with every non-digit stripped.
    pub font_size: Option<u32>,
    /// Preferred family first, fallbacks after it.
    pub font_family: Option<Vec<String>>,
    /// Properties this engine does not interpret, kept verbatim.
    pub extra: BTreeMap<String, String>,
}

impl PropertyMap {
    /// Number of distinct properties set.
    pub fn len(&self) -> usize {
        [
            self.foreground.is_some(),
            self.background.is_some(),
            self.font_weight.is_some(),
            self.font_size.is_some(),
            self.font_family.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
            + self.extra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrites colliding properties with `other`'s, keeps the rest.
    pub fn merge(&mut self, other: &PropertyMap) {
        if other.foreground.is_some() {
            self.foreground.clone_from(&other.foreground);
        }
        if other.background.is_some() {
            self.background.clone_from(&other.background);
        }
        if other.font_weight.is_some() {
            self.font_weight = other.font_weight;
        }
        if other.font_size.is_some() {
            self.font_size = other.font_size;
        }
        if other.font_family.is_some() {
            self.font_family.clone_from(&other.font_family);
        }
        for (name, value) in &other.extra {
            self.extra.insert(name.clone(), value.clone());
        }
    }

    pub fn primary_font_family(&self) -> Option<&str> {
        self.font_family
            .as_ref()
            .and_then(|families| families.first())
            .map(String::as_str)
    }

    pub fn passthrough(&self, name: &str) -> Option<&str> {
        self.extra.get(name).map(String::as_str)
    }

    fn apply(&mut self, name: &str, value: &str) {
        match name {
            "color" => self.foreground = Some(value.to_owned()),
            "background-color" => self.background = Some(value.to_owned()),
            "font-weight" => match parse_font_weight(value) {
                Some(weight) => self.font_weight = Some(weight),
                None => debug!("ignoring font-weight `{value}`"),
            },
            "font-size" => match parse_font_size(value) {
                Some(size) => self.font_size = Some(size),
                None => debug!("ignoring font-size `{value}` without digits"),
            },
            "font-family" => match parse_font_family(value) {
                Some(families) => self.font_family = Some(families),
                None => debug!("ignoring empty font-family"),
            },
            _ => {
                self.extra.insert(name.to_owned(), value.to_owned());
            }
        }
    }
}

/// Parses a `;`-separated `property: value` list. Pairs without a `:` are skipped.
pub fn parse_declaration_block(text: &str) -> PropertyMap {
    let mut props = PropertyMap::default();

    for item in split_top_level(text, b';') {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Some(colon_idx) = find_top_level_colon(trimmed) else {
            debug!("skipping declaration without `:`: {trimmed:?}");
            continue;
        };

        let name = trimmed[..colon_idx].trim().to_ascii_lowercase();
        let value = normalize_ws(trimmed[colon_idx + 1..].trim()).to_lowercase();
        if name.is_empty() || value.is_empty() {
            continue;
        }

        props.apply(&name, &value);
    }

    props
}

/// Parses a whole style sheet into a fresh rule table.
pub fn parse_global_style_sheet(text: &str) -> StyleRuleTable {
    let mut table = StyleRuleTable::default();
    table.add_style_sheet(text);
    table
}

/// Selector text (`tag`, `.class`, `#id`) to declarations, accumulated across
/// every `<style>` block of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleRuleTable {
    rules: BTreeMap<String, PropertyMap>,
}

impl StyleRuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule(&self, selector: &str) -> Option<&PropertyMap> {
        self.rules.get(selector)
    }

    /// Merges every `selector { declarations }` group of `text` into the table,
    /// field by field. Returns how many selector entries were touched.
    pub fn add_style_sheet(&mut self, text: &str) -> usize {
        let source = strip_comments(text);
        let mut touched = 0_usize;
        let mut cursor = 0_usize;

        while let Some((selector_raw, body, next_cursor)) = next_rule_block(&source, cursor) {
            cursor = next_cursor;

            // Leftovers of an at-rule block end up in front of the next selector.
            let selector_text = selector_raw.rsplit('}').next().unwrap_or(selector_raw);

            if body.contains('{') {
                debug!("skipping nested block after `{}`", selector_text.trim());
                continue;
            }

            let declarations = parse_declaration_block(body);
            if declarations.is_empty() {
                continue;
            }

            for selector in selector_text.split(',') {
                let Some(selector) = normalize_selector(selector) else {
                    continue;
                };
                self.rules
                    .entry(selector)
                    .or_default()
                    .merge(&declarations);
                touched = touched.saturating_add(1);
            }
        }

        touched
    }

    /// Cascades tag, first class, id and inline `style` declarations for one start tag.
    pub fn resolve(&self, tag: &str, attrs: &[(String, String)]) -> PropertyMap {
        let mut styles = PropertyMap::default();

        if let Some(rule) = self.rules.get(tag) {
            styles.merge(rule);
        }

        if let Some(class) = attr(attrs, "class").and_then(|value| value.split_whitespace().next())
        {
            if let Some(rule) = self.rules.get(&format!(".{class}")) {
                styles.merge(rule);
            }
        }

        if let Some(id) = attr(attrs, "id").map(str::trim).filter(|id| !id.is_empty()) {
            if let Some(rule) = self.rules.get(&format!("#{id}")) {
                styles.merge(rule);
            }
        }

        if let Some(inline) = attr(attrs, "style") {
            styles.merge(&parse_declaration_block(inline));
        }

        styles
    }
}

/// One resolved property map per open-tag occurrence, addressed by [`StyleRef`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedStyles {
    entries: Vec<PropertyMap>,
}

impl ResolvedStyles {
    pub fn insert(&mut self, styles: PropertyMap) -> StyleRef {
        let style_ref = StyleRef::new(self.entries.len());
        self.entries.push(styles);
        style_ref
    }

    pub fn get(&self, style_ref: StyleRef) -> Option<&PropertyMap> {
        self.entries.get(style_ref.index())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges the referenced entries outermost first, so inner tags override outer ones.
    pub fn computed(&self, refs: &[StyleRef]) -> PropertyMap {
        let mut out = PropertyMap::default();
        for styles in refs.iter().filter_map(|style_ref| self.get(*style_ref)) {
            out.merge(styles);
        }
        out
    }
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn normalize_selector(input: &str) -> Option<String> {
    let selector = normalize_ws(input);
    if selector.is_empty() || selector.starts_with('@') {
        return None;
    }

    if selector.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
        return Some(selector.to_ascii_lowercase());
    }

    Some(selector)
}

fn parse_font_weight(value: &str) -> Option<FontWeight> {
    if !value.is_empty() && value.bytes().all(|byte| byte.is_ascii_digit()) {
        let weight = value.parse::<u32>().ok()?;
        return Some(if weight <= 500 {
            FontWeight::Normal
        } else {
            FontWeight::Bold
        });
    }

    match value {
        "normal" | "lighter" => Some(FontWeight::Normal),
        "bold" | "bolder" => Some(FontWeight::Bold),
        _ => None,
    }
}

fn parse_font_size(value: &str) -> Option<u32> {
    let digits = value
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u32>().ok()
}

fn parse_font_family(value: &str) -> Option<Vec<String>> {
    let families = split_top_level(value, b',')
        .into_iter()
        .map(|family| family.trim().trim_matches(['"', '\'']).trim().to_owned())
        .filter(|family| !family.is_empty())
        .collect::<Vec<_>>();

    if families.is_empty() {
        None
    } else {
        Some(families)
    }
}

/// Finds the next `selector { body }` group. Braces are matched without nesting.
fn next_rule_block(input: &str, from: usize) -> Option<(&str, &str, usize)> {
    let open = find_outside_quotes(input, from, b'{')?;
    let close = find_outside_quotes(input, open + 1, b'}')?;
    Some((&input[from..open], &input[open + 1..close], close + 1))
}

/// Tracks whether the scanner sits inside a quoted string.
#[derive(Debug, Default)]
struct QuoteTracker {
    quote: Option<u8>,
    escape: bool,
}

impl QuoteTracker {
    /// Feeds one byte; true while that byte belongs to a quoted string.
    fn consume(&mut self, byte: u8) -> bool {
        match self.quote {
            Some(open) => {
                if self.escape {
                    self.escape = false;
                } else if byte == b'\\' {
                    self.escape = true;
                } else if byte == open {
                    self.quote = None;
                }
                true
            }
            None if byte == b'\'' || byte == b'"' => {
                self.quote = Some(byte);
                true
            }
            None => false,
        }
    }
}

fn find_outside_quotes(input: &str, from: usize, needle: u8) -> Option<usize> {
    let mut quotes = QuoteTracker::default();
    input
        .as_bytes()
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, byte)| !quotes.consume(**byte) && **byte == needle)
        .map(|(idx, _)| idx)
}

fn split_top_level(input: &str, delimiter: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quotes = QuoteTracker::default();
    let mut depth = 0_u32;
    let mut start = 0_usize;

    for (idx, byte) in input.bytes().enumerate() {
        if quotes.consume(byte) {
            continue;
        }

        match byte {
            b'(' | b'[' => depth = depth.saturating_add(1),
            b')' | b']' => depth = depth.saturating_sub(1),
            _ if byte == delimiter && depth == 0 => {
                parts.push(&input[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }

    parts.push(&input[start..]);
    parts
}

fn find_top_level_colon(input: &str) -> Option<usize> {
    let mut quotes = QuoteTracker::default();
    let mut depth = 0_u32;

    for (idx, byte) in input.bytes().enumerate() {
        if quotes.consume(byte) {
            continue;
        }

        match byte {
            b'(' | b'[' => depth = depth.saturating_add(1),
            b')' | b']' => depth = depth.saturating_sub(1),
            b':' if depth == 0 => return Some(idx),
            _ => {}
        }
    }

    None
}

fn strip_comments(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut quotes = QuoteTracker::default();
    let mut idx = 0_usize;

    while idx < bytes.len() {
        let byte = bytes[idx];
        if quotes.consume(byte) {
            out.push(byte);
            idx += 1;
            continue;
        }

        if byte == b'/' && bytes.get(idx + 1).copied() == Some(b'*') {
            idx = bytes[idx + 2..]
                .windows(2)
                .position(|window| window == b"*/")
                .map(|offset| idx + 2 + offset + 2)
                .unwrap_or(bytes.len());
            continue;
        }

        out.push(byte);
        idx += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn normalize_ws(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::FontWeight;
    use super::PropertyMap;
    use super::ResolvedStyles;
    use super::StyleRuleTable;
    use super::parse_declaration_block;
    use super::parse_global_style_sheet;

    fn attrs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn malformed_pairs_are_skipped() {
        let props = parse_declaration_block(
            "color: Red; nonsense; background-color:#EEE;; width 10px; opacity: 0.5; color: blue",
        );
        assert_eq!(props.len(), 3);
        assert_eq!(props.foreground.as_deref(), Some("blue"));
        assert_eq!(props.background.as_deref(), Some("#eee"));
        assert_eq!(props.passthrough("opacity"), Some("0.5"));
    }

    #[test]
    fn normalizes_font_weight() {
        let cases = [
            ("100", Some(FontWeight::Normal)),
            ("500", Some(FontWeight::Normal)),
            ("600", Some(FontWeight::Bold)),
            ("lighter", Some(FontWeight::Normal)),
            ("BOLD", Some(FontWeight::Bold)),
            ("bolder", Some(FontWeight::Bold)),
            ("inherit", None),
        ];
        for (value, expected) in cases {
            let props = parse_declaration_block(&format!("font-weight: {value}"));
            assert_eq!(props.font_weight, expected, "font-weight: {value}");
        }
    }

    #[test]
    fn font_size_keeps_only_digits() {
        assert_eq!(parse_declaration_block("font-size: 14px").font_size, Some(14));
        assert_eq!(parse_declaration_block("font-size: 1.5em").font_size, Some(15));
        let dropped = parse_declaration_block("font-size: large");
        assert_eq!(dropped.font_size, None);
        assert!(dropped.is_empty());
    }

    #[test]
    fn font_family_strips_quotes_and_keeps_fallbacks() {
        let props = parse_declaration_block("font-family: \"Fira Sans\", 'Helvetica', sans-serif");
        assert_eq!(props.primary_font_family(), Some("fira sans"));
        assert_eq!(
            props.font_family,
            Some(vec![
                "fira sans".to_owned(),
                "helvetica".to_owned(),
                "sans-serif".to_owned()
            ])
        );
    }

    #[test]
    fn keeps_semicolons_inside_function_values() {
        let props = parse_declaration_block(
            r#"background-image: url("data:image/svg+xml;utf8,<svg></svg>"); color: red"#,
        );
        assert_eq!(props.len(), 2);
        assert_eq!(
            props.passthrough("background-image"),
            Some(r#"url("data:image/svg+xml;utf8,<svg></svg>")"#)
        );
    }

    #[test]
    fn later_blocks_merge_field_by_field() {
        let mut table = parse_global_style_sheet("p { color: red; font-size: 12px }");
        table.add_style_sheet("p { color: blue }");

        let Some(rule) = table.rule("p") else {
            panic!("rule for `p` should exist");
        };
        assert_eq!(rule.foreground.as_deref(), Some("blue"));
        assert_eq!(rule.font_size, Some(12));
    }

    #[test]
    fn strips_comments_and_splits_grouped_selectors() {
        let table = parse_global_style_sheet("/* x */ H1, h2 { font-weight: 700 } .a { }");
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.rule("h1").and_then(|rule| rule.font_weight),
            Some(FontWeight::Bold)
        );
        assert_eq!(
            table.rule("h2").and_then(|rule| rule.font_weight),
            Some(FontWeight::Bold)
        );
    }

    #[test]
    fn skips_at_rule_blocks_without_losing_following_rules() {
        let table = parse_global_style_sheet(
            "@media screen { .hero { color: #fff; } } p { color: blue } div{opacity:0.8}",
        );
        assert!(table.rule(".hero").is_none());
        assert_eq!(
            table.rule("p").and_then(|rule| rule.foreground.as_deref()),
            Some("blue")
        );
        assert_eq!(
            table.rule("div").and_then(|rule| rule.passthrough("opacity")),
            Some("0.8")
        );
    }

    #[test]
    fn cascade_precedence_is_tag_class_id_inline() {
        let table = parse_global_style_sheet(
            "p { color: red; font-size: 10px } .c { color: blue } #main { background-color: gray }",
        );

        let inline = table.resolve(
            "p",
            &attrs(&[("class", "c"), ("style", "color: green")]),
        );
        assert_eq!(inline.foreground.as_deref(), Some("green"));
        assert_eq!(inline.font_size, Some(10));

        let class_only = table.resolve("p", &attrs(&[("class", "c other")]));
        assert_eq!(class_only.foreground.as_deref(), Some("blue"));

        let tag_only = table.resolve("p", &[]);
        assert_eq!(tag_only.foreground.as_deref(), Some("red"));

        let with_id = table.resolve("p", &attrs(&[("id", "main"), ("class", "c")]));
        assert_eq!(with_id.background.as_deref(), Some("gray"));
        assert_eq!(with_id.foreground.as_deref(), Some("blue"));
    }

    #[test]
    fn only_first_class_token_is_consulted() {
        let table = parse_global_style_sheet(".second { color: blue }");
        let resolved = table.resolve("span", &attrs(&[("class", "first second")]));
        assert_eq!(resolved, PropertyMap::default());
    }

    #[test]
    fn computed_styles_let_inner_refs_win() {
        let mut styles = ResolvedStyles::default();
        let outer = styles.insert(parse_declaration_block("color: red; font-size: 20px"));
        let inner = styles.insert(parse_declaration_block("color: blue"));

        let computed = styles.computed(&[outer, inner]);
        assert_eq!(computed.foreground.as_deref(), Some("blue"));
        assert_eq!(computed.font_size, Some(20));
        assert_eq!(styles.len(), 2);
    }

    #[test]
    fn inserted_refs_address_their_own_entry() {
        let mut styles = ResolvedStyles::default();
        let refs: Vec<_> = (1..=300_u32)
            .map(|size| {
                let style_ref = styles.insert(parse_declaration_block(&format!("font-size: {size}px")));
                (size, style_ref)
            })
            .collect();

        for (position, (size, style_ref)) in refs.iter().enumerate() {
            assert_eq!(style_ref.index(), position);
            let font_size = styles.get(*style_ref).and_then(|entry| entry.font_size);
            assert_eq!(font_size, Some(*size));
        }
    }

    #[test]
    fn empty_table_resolves_inline_only() {
        let table = StyleRuleTable::new();
        let resolved = table.resolve("div", &attrs(&[("style", "font-weight: bold")]));
        assert_eq!(resolved.font_weight, Some(FontWeight::Bold));
        assert_eq!(resolved.len(), 1);
    }
}
