//! Element positions within a partition.

use std::fmt;

use crate::PageId;

/// Position of an element inside a partition's page sequence.
///
/// Positions order by page first, then by offset within the page, which is
/// exactly the order in which elements were appended to the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    /// Page holding the element.
    pub page: PageId,
    /// Zero-based offset within the page.
    pub offset: u32,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub const fn new(page: PageId, offset: u32) -> Self {
        Self { page, offset }
    }

    /// The first position of the given page.
    #[must_use]
    pub const fn page_start(page: PageId) -> Self {
        Self { page, offset: 0 }
    }

    /// The first position of page 0.
    #[must_use]
    pub const fn origin() -> Self {
        Self::page_start(PageId::new(0))
    }

    /// Returns the position one element further within the same page.
    #[must_use]
    pub const fn next_offset(self) -> Self {
        Self {
            page: self.page,
            offset: self.offset.saturating_add(1),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.page.get(), self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_ordering() {
        let a = Position::new(PageId::new(0), 5);
        let b = Position::new(PageId::new(1), 0);
        let c = Position::new(PageId::new(1), 1);

        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.max(b), b);
    }

    #[test]
    fn test_position_display() {
        assert_eq!(Position::new(PageId::new(3), 7).to_string(), "3@7");
        assert_eq!(Position::origin().to_string(), "0@0");
    }
}
