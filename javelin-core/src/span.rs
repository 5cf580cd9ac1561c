//! Source ranges shared by every pipeline stage and by the runtime.
//!
//! Lines and columns are 1-based. The end position is exclusive on the
//! column axis, so a one-character token at column 5 spans `5..6`.

use core::cmp::Ordering;
use core::fmt;

use serde::Serialize;

/// Identifier of a module (one source file) inside a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModuleId(pub u32);

/// A 1-based line/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.line
            .cmp(&other.line)
            .then(self.column.cmp(&other.column))
    }
}

/// Start and end of a source region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Range {
    /// Placeholder for synthesized nodes and global diagnostics.
    pub const EMPTY: Range = Range {
        start_line: 0,
        start_column: 0,
        end_line: 0,
        end_column: 0,
    };

    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    pub fn from_positions(start: Position, end: Position) -> Self {
        Self::new(start.line, start.column, end.line, end.column)
    }

    pub fn is_empty(&self) -> bool {
        self.start_line == 0
    }

    pub fn start(&self) -> Position {
        Position::new(self.start_line, self.start_column)
    }

    pub fn end(&self) -> Position {
        Position::new(self.end_line, self.end_column)
    }

    /// Smallest range covering both `self` and `other`. Empty ranges are
    /// ignored so that synthesized nodes never shrink a real range.
    pub fn join(&self, other: &Range) -> Range {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let start = self.start().min(other.start());
        let end = self.end().max(other.end());
        Range::from_positions(start, end)
    }

    pub fn contains_position(&self, position: Position) -> bool {
        !self.is_empty() && self.start() <= position && position <= self.end()
    }

    pub fn contains(&self, other: &Range) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start() <= other.start()
            && other.end() <= self.end()
    }

    pub fn overlaps(&self, other: &Range) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start() < other.end()
            && other.start() < self.end()
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start_line, self.start_column, self.end_line, self.end_column
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_ignores_empty_ranges() {
        let a = Range::new(2, 5, 2, 9);
        assert_eq!(a.join(&Range::EMPTY), a);
        assert_eq!(Range::EMPTY.join(&a), a);
    }

    #[test]
    fn join_covers_both_operands() {
        let a = Range::new(2, 5, 2, 9);
        let b = Range::new(1, 3, 2, 7);
        assert_eq!(a.join(&b), Range::new(1, 3, 2, 9));
    }

    #[test]
    fn containment_is_inclusive() {
        let outer = Range::new(1, 1, 10, 1);
        assert!(outer.contains(&Range::new(1, 1, 3, 4)));
        assert!(outer.contains_position(Position::new(10, 1)));
        assert!(!outer.contains_position(Position::new(10, 2)));
    }
}
