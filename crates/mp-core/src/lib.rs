//! Shared primitives used across MiniPage crates.

use core::fmt;
use thiserror::Error;

/// Result alias used across the workspace.
pub type PageResult<T> = Result<T, PageError>;

/// Error surfaced at the outer edges (page facade, bootstrap binary).
///
/// The parsing core itself never fails; it degrades instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct PageError {
    pub code: &'static str,
    pub message: String,
}

impl PageError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Handle to one resolved style entry, allocated once per open-tag occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StyleRef(usize);

impl StyleRef {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StyleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "style-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::PageError;
    use super::StyleRef;

    #[test]
    fn error_display_includes_code() {
        let error = PageError::new("page.click.unknown_element", "no element `#go`");
        assert_eq!(error.to_string(), "page.click.unknown_element: no element `#go`");
    }

    #[test]
    fn style_refs_order_by_allocation() {
        let outer = StyleRef::new(0);
        let inner = StyleRef::new(3);
        assert!(outer < inner);
        assert_eq!(inner.index(), 3);
        assert_eq!(inner.to_string(), "style-3");
    }
}
