//! Flat, append-only document model.

use mp_core::StyleRef;
use std::fmt;
use std::rc::Rc;
use std::rc::Weak;

/// Position of an element inside its document.
pub type NodeIndex = usize;

/// Element identity. Explicit ids come from the `id` attribute; everything else
/// gets a generated sequence number. The two never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementId {
    Explicit(String),
    Generated(u64),
}

impl ElementId {
    pub fn explicit(id: impl Into<String>) -> Self {
        Self::Explicit(id.into())
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit(id) => write!(f, "#{id}"),
            Self::Generated(seq) => write!(f, "@{seq}"),
        }
    }
}

/// What an element represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    /// A start tag, keyed by its lowercased name.
    Tag(String),
    /// Text emitted by `document.write`.
    Text,
    /// Forced line break (`<br>`).
    LineBreak,
    /// Closure of a block-level tag.
    BlockEnd(String),
}

impl ElementKind {
    pub fn tag(name: impl Into<String>) -> Self {
        Self::Tag(name.into())
    }

    /// Layout-only signals carry no content.
    pub fn is_marker(&self) -> bool {
        matches!(self, Self::LineBreak | Self::BlockEnd(_))
    }

    pub fn tag_name(&self) -> Option<&str> {
        match self {
            Self::Tag(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(name) => f.write_str(name),
            Self::Text => f.write_str("text"),
            Self::LineBreak => f.write_str("br"),
            Self::BlockEnd(name) => write!(f, "end_{name}"),
        }
    }
}

/// Free-form data carried by an element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub content: Option<String>,
    pub attrs: Vec<(String, String)>,
    /// Text installed by a script through `innerText`.
    pub text_override: Option<String>,
}

impl Payload {
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn with_attrs(attrs: Vec<(String, String)>) -> Self {
        Self {
            attrs,
            ..Self::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Presentation-side object bound to an element. The document only keeps a weak
/// reference; the presentation layer owns the handle.
pub trait BoundHandle {
    fn set_text(&self, text: &str);
}

#[derive(Debug, Clone)]
pub struct Element {
    id: ElementId,
    kind: ElementKind,
    payload: Payload,
    style_refs: Vec<StyleRef>,
    bound_handle: Option<Weak<dyn BoundHandle>>,
    onclick_override: Option<String>,
}

impl Element {
    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Ancestor style references, innermost last.
    pub fn style_refs(&self) -> &[StyleRef] {
        &self.style_refs
    }

    pub fn content(&self) -> Option<&str> {
        self.payload.content.as_deref()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.payload.attr(name)
    }

    /// Text to present: the script override when set, the parsed content otherwise.
    pub fn text(&self) -> Option<&str> {
        self.payload
            .text_override
            .as_deref()
            .or(self.payload.content.as_deref())
    }

    pub fn onclick_override(&self) -> Option<&str> {
        self.onclick_override.as_deref()
    }

    /// Handler to run on click; a script-installed override beats the inline attribute.
    pub fn click_handler(&self) -> Option<&str> {
        self.onclick_override
            .as_deref()
            .or_else(|| self.attr("onclick"))
            .filter(|handler| !handler.trim().is_empty())
    }

    /// Live presentation handle, if one was bound and is still alive.
    pub fn bound_handle(&self) -> Option<Rc<dyn BoundHandle>> {
        self.bound_handle.as_ref().and_then(Weak::upgrade)
    }

    pub fn has_bound_handle(&self) -> bool {
        self.bound_handle.is_some()
    }

    /// Records `text` as the element's visible text and pushes it into the bound
    /// handle when that handle is still alive.
    pub fn set_text_override(&mut self, text: impl Into<String>) {
        let text = text.into();
        if let Some(handle) = self.bound_handle() {
            handle.set_text(&text);
        }
        self.payload.text_override = Some(text);
    }

    /// Appends one content fragment; `separated` inserts a single space when the
    /// element already holds text.
    fn append_content(&mut self, fragment: &str, separated: bool) {
        match self.payload.content.as_mut() {
            Some(content) if !content.is_empty() => {
                if separated {
                    content.push(' ');
                }
                content.push_str(fragment);
            }
            _ => self.payload.content = Some(fragment.to_owned()),
        }
    }
}

/// Ordered element sequence for one parse.
#[derive(Debug, Clone, Default)]
pub struct Document {
    elements: Vec<Element>,
    next_sequence: u64,
}

impl Document {
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            next_sequence: 1,
        }
    }

    /// Appends a new element. Without an explicit identity the next sequence
    /// number is assigned; duplicate explicit identities are accepted.
    pub fn add_element(
        &mut self,
        kind: ElementKind,
        payload: Payload,
        style_refs: Vec<StyleRef>,
        explicit_id: Option<String>,
    ) -> NodeIndex {
        let id = match explicit_id {
            Some(id) => ElementId::Explicit(id),
            None => {
                let seq = self.next_sequence.max(1);
                self.next_sequence = seq.saturating_add(1);
                ElementId::Generated(seq)
            }
        };

        self.elements.push(Element {
            id,
            kind,
            payload,
            style_refs,
            bound_handle: None,
            onclick_override: None,
        });
        self.elements.len() - 1
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Element> {
        self.elements.iter()
    }

    pub fn get(&self, index: NodeIndex) -> Option<&Element> {
        self.elements.get(index)
    }

    /// First element carrying `id`.
    pub fn find_by_identity(&self, id: &ElementId) -> Option<&Element> {
        self.elements.iter().find(|element| element.id == *id)
    }

    pub fn find_by_identity_mut(&mut self, id: &ElementId) -> Option<&mut Element> {
        self.elements.iter_mut().find(|element| element.id == *id)
    }

    pub fn append_content(&mut self, index: NodeIndex, fragment: &str, separated: bool) -> bool {
        match self.elements.get_mut(index) {
            Some(element) => {
                element.append_content(fragment, separated);
                true
            }
            None => false,
        }
    }

    /// Binds a presentation handle. Only the first binding sticks.
    pub fn set_bound_handle(&mut self, id: &ElementId, handle: Weak<dyn BoundHandle>) -> bool {
        let Some(element) = self.find_by_identity_mut(id) else {
            return false;
        };
        if element.bound_handle.is_some() {
            return false;
        }
        element.bound_handle = Some(handle);
        true
    }

    pub fn set_onclick_override(&mut self, id: &ElementId, handler: impl Into<String>) -> bool {
        match self.find_by_identity_mut(id) {
            Some(element) => {
                element.onclick_override = Some(handler.into());
                true
            }
            None => false,
        }
    }

    /// Content of the first `title` element.
    pub fn title(&self) -> Option<&str> {
        self.elements
            .iter()
            .find(|element| element.kind.tag_name() == Some("title"))
            .and_then(Element::content)
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = &'a Element;
    type IntoIter = std::slice::Iter<'a, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::BoundHandle;
    use super::Document;
    use super::ElementId;
    use super::ElementKind;
    use super::Payload;
    use mp_core::StyleRef;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Label {
        text: RefCell<String>,
    }

    impl BoundHandle for Label {
        fn set_text(&self, text: &str) {
            *self.text.borrow_mut() = text.to_owned();
        }
    }

    #[test]
    fn generated_ids_increase_and_skip_explicit_ones() {
        let mut doc = Document::new();
        let a = doc.add_element(ElementKind::tag("p"), Payload::default(), Vec::new(), None);
        let b = doc.add_element(
            ElementKind::tag("div"),
            Payload::default(),
            Vec::new(),
            Some("main".to_owned()),
        );
        let c = doc.add_element(ElementKind::Text, Payload::with_content("x"), Vec::new(), None);

        let ids = [a, b, c]
            .iter()
            .filter_map(|index| doc.get(*index).map(|element| element.id().clone()))
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec![
                ElementId::Generated(1),
                ElementId::explicit("main"),
                ElementId::Generated(2)
            ]
        );
    }

    #[test]
    fn explicit_and_generated_ids_never_collide() {
        let mut doc = Document::new();
        doc.add_element(ElementKind::tag("p"), Payload::default(), Vec::new(), None);
        doc.add_element(
            ElementKind::tag("span"),
            Payload::default(),
            Vec::new(),
            Some("1".to_owned()),
        );

        let generated = doc.find_by_identity(&ElementId::Generated(1));
        let explicit = doc.find_by_identity(&ElementId::explicit("1"));
        assert_eq!(generated.map(|e| e.kind().to_string()).as_deref(), Some("p"));
        assert_eq!(explicit.map(|e| e.kind().to_string()).as_deref(), Some("span"));
    }

    #[test]
    fn duplicate_explicit_ids_resolve_to_first() {
        let mut doc = Document::new();
        doc.add_element(
            ElementKind::tag("p"),
            Payload::with_content("first"),
            Vec::new(),
            Some("dup".to_owned()),
        );
        doc.add_element(
            ElementKind::tag("p"),
            Payload::with_content("second"),
            Vec::new(),
            Some("dup".to_owned()),
        );

        let found = doc.find_by_identity(&ElementId::explicit("dup"));
        assert_eq!(found.and_then(|e| e.content()), Some("first"));
    }

    #[test]
    fn append_content_concatenates_fragments() {
        let mut doc = Document::new();
        let index = doc.add_element(ElementKind::tag("p"), Payload::default(), Vec::new(), None);
        assert!(doc.append_content(index, "a", false));
        assert!(doc.append_content(index, "&", false));
        assert!(doc.append_content(index, "b", true));
        assert_eq!(doc.get(index).and_then(|e| e.content()), Some("a& b"));
        assert!(!doc.append_content(42, "lost", false));
    }

    #[test]
    fn text_override_reaches_live_handle_only() {
        let mut doc = Document::new();
        doc.add_element(
            ElementKind::tag("p"),
            Payload::with_content("before"),
            vec![StyleRef::new(0)],
            Some("out".to_owned()),
        );

        let label: Rc<dyn BoundHandle> = Rc::new(Label::default());
        let concrete = Rc::new(Label::default());
        let concrete_dyn: Rc<dyn BoundHandle> = concrete.clone();
        assert!(doc.set_bound_handle(&ElementId::explicit("out"), Rc::downgrade(&concrete_dyn)));
        assert!(!doc.set_bound_handle(&ElementId::explicit("out"), Rc::downgrade(&label)));
        drop(concrete_dyn);

        if let Some(element) = doc.find_by_identity_mut(&ElementId::explicit("out")) {
            element.set_text_override("after");
        }
        assert_eq!(concrete.text.borrow().as_str(), "after");

        let element = doc.find_by_identity(&ElementId::explicit("out"));
        assert_eq!(element.and_then(|e| e.text()), Some("after"));
        assert_eq!(element.and_then(|e| e.content()), Some("before"));
    }

    #[test]
    fn document_outlives_dropped_handles() {
        let mut doc = Document::new();
        doc.add_element(
            ElementKind::tag("p"),
            Payload::default(),
            Vec::new(),
            Some("gone".to_owned()),
        );
        {
            let label: Rc<dyn BoundHandle> = Rc::new(Label::default());
            doc.set_bound_handle(&ElementId::explicit("gone"), Rc::downgrade(&label));
        }

        let Some(element) = doc.find_by_identity_mut(&ElementId::explicit("gone")) else {
            panic!("element should exist");
        };
        assert!(element.has_bound_handle());
        assert!(element.bound_handle().is_none());
        element.set_text_override("still fine");
        assert_eq!(element.text(), Some("still fine"));
    }

    #[test]
    fn click_handler_prefers_override() {
        let mut doc = Document::new();
        doc.add_element(
            ElementKind::tag("button"),
            Payload::with_attrs(vec![("onclick".to_owned(), "alert('inline')".to_owned())]),
            Vec::new(),
            Some("go".to_owned()),
        );
        let id = ElementId::explicit("go");
        assert_eq!(
            doc.find_by_identity(&id).and_then(|e| e.click_handler()),
            Some("alert('inline')")
        );

        assert!(doc.set_onclick_override(&id, "alert('override')"));
        assert_eq!(
            doc.find_by_identity(&id).and_then(|e| e.click_handler()),
            Some("alert('override')")
        );
    }

    #[test]
    fn marker_kinds_render_their_names() {
        assert_eq!(ElementKind::BlockEnd("p".to_owned()).to_string(), "end_p");
        assert_eq!(ElementKind::LineBreak.to_string(), "br");
        assert!(ElementKind::LineBreak.is_marker());
        assert!(!ElementKind::Text.is_marker());
    }

    #[test]
    fn title_comes_from_first_title_element() {
        let mut doc = Document::new();
        assert_eq!(doc.title(), None);
        doc.add_element(
            ElementKind::tag("title"),
            Payload::with_content("Example Domain"),
            Vec::new(),
            None,
        );
        assert_eq!(doc.title(), Some("Example Domain"));
    }
}
