//! A1-style cell references and rectangular ranges

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::CellRangeError;

/// Last addressable row (1,048,576) as a 0-based index
pub const MAX_ROW: u32 = 1_048_575;
/// Last addressable column (XFD) as a 0-based index
pub const MAX_COL: u32 = 16_383;

static CELL_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$?([A-Za-z]{1,3})\$?([0-9]{1,7})$").expect("valid regex"));

/// Cell reference (e.g., A1, B2), stored 0-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellReference {
    pub row: u32,
    pub col: u32,
}

impl CellReference {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parse a reference like "A1" or "$B$2"
    pub fn parse(cell_ref: &str) -> Option<Self> {
        let caps = CELL_REF.captures(cell_ref.trim())?;

        let mut col = 0u32;
        for ch in caps[1].chars() {
            col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        }
        let row = caps[2].parse::<u32>().ok()?;

        if row == 0 || row - 1 > MAX_ROW || col - 1 > MAX_COL {
            return None;
        }

        Some(Self::new(row - 1, col - 1))
    }

    /// Convert to Excel-style reference (e.g., "A1")
    pub fn to_excel_ref(&self) -> String {
        format!("{}{}", col_to_letter(self.col), self.row + 1)
    }
}

/// Convert column number to letter (0 -> A, 1 -> B, 26 -> AA)
pub fn col_to_letter(mut col: u32) -> String {
    let mut result = String::new();
    loop {
        result.insert(0, (b'A' + (col % 26) as u8) as char);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    result
}

impl PartialOrd for CellReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.row.cmp(&other.row).then_with(|| self.col.cmp(&other.col))
    }
}

impl fmt::Display for CellReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_excel_ref())
    }
}

/// Rectangular cell range, corners normalized so `start` is top-left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRange {
    start: CellReference,
    end: CellReference,
}

impl CellRange {
    pub fn new(a: CellReference, b: CellReference) -> Self {
        Self {
            start: CellReference::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellReference::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    /// Parse "A1:U17". A single reference ("C3") is a one-cell range.
    pub fn parse(range: &str) -> Result<Self, CellRangeError> {
        let invalid = || CellRangeError::Invalid(range.to_string());
        match range.split_once(':') {
            Some((a, b)) => {
                let a = CellReference::parse(a).ok_or_else(invalid)?;
                let b = CellReference::parse(b).ok_or_else(invalid)?;
                Ok(Self::new(a, b))
            }
            None => {
                let a = CellReference::parse(range).ok_or_else(invalid)?;
                Ok(Self::new(a, a))
            }
        }
    }

    pub fn start(&self) -> CellReference {
        self.start
    }

    pub fn end(&self) -> CellReference {
        self.end
    }

    pub fn row_count(&self) -> usize {
        (self.end.row - self.start.row) as usize + 1
    }

    pub fn column_count(&self) -> usize {
        (self.end.col - self.start.col) as usize + 1
    }

    pub fn cell_count(&self) -> usize {
        self.row_count() * self.column_count()
    }

    /// Absolute 0-based row indices
    pub fn rows(&self) -> RangeInclusive<u32> {
        self.start.row..=self.end.row
    }

    /// Absolute 0-based column indices
    pub fn columns(&self) -> RangeInclusive<u32> {
        self.start.col..=self.end.col
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        self.rows().contains(&row) && self.columns().contains(&col)
    }

    /// Smallest range covering both
    pub fn union(&self, other: &CellRange) -> CellRange {
        CellRange {
            start: CellReference::new(
                self.start.row.min(other.start.row),
                self.start.col.min(other.start.col),
            ),
            end: CellReference::new(
                self.end.row.max(other.end.row),
                self.end.col.max(other.end.col),
            ),
        }
    }
}

impl Default for CellRange {
    fn default() -> Self {
        // A1:U17
        Self::new(CellReference::new(0, 0), CellReference::new(16, 20))
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

impl FromStr for CellRange {
    type Err = CellRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CellRange {
    type Error = CellRangeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CellRange> for String {
    fn from(range: CellRange) -> Self {
        range.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell_ref() {
        assert_eq!(CellReference::parse("A1"), Some(CellReference::new(0, 0)));
        assert_eq!(CellReference::parse("B2"), Some(CellReference::new(1, 1)));
        assert_eq!(CellReference::parse("aa1"), Some(CellReference::new(0, 26)));
        assert_eq!(CellReference::parse("$AB$10"), Some(CellReference::new(9, 27)));
        assert_eq!(CellReference::parse("XFD1048576"), Some(CellReference::new(MAX_ROW, MAX_COL)));
        assert_eq!(CellReference::parse("A0"), None);
        assert_eq!(CellReference::parse("XFE1"), None);
        assert_eq!(CellReference::parse("1A"), None);
        assert_eq!(CellReference::parse(""), None);
    }

    #[test]
    fn test_col_to_letter() {
        assert_eq!(col_to_letter(0), "A");
        assert_eq!(col_to_letter(20), "U");
        assert_eq!(col_to_letter(25), "Z");
        assert_eq!(col_to_letter(26), "AA");
        assert_eq!(col_to_letter(MAX_COL), "XFD");
    }

    #[test]
    fn test_default_range_geometry() {
        let range = CellRange::parse("A1:U17").unwrap();
        assert_eq!(range, CellRange::default());
        assert_eq!(range.row_count(), 17);
        assert_eq!(range.column_count(), 21);
        assert_eq!(range.cell_count(), 357);
        assert_eq!(range.to_string(), "A1:U17");
    }

    #[test]
    fn test_range_normalizes_corners() {
        let range = CellRange::parse("C5:A1").unwrap();
        assert_eq!(range.start(), CellReference::new(0, 0));
        assert_eq!(range.end(), CellReference::new(4, 2));
        assert!(range.contains(4, 2));
        assert!(!range.contains(5, 0));
    }

    #[test]
    fn test_single_cell_and_union() {
        let a = CellRange::parse("B2").unwrap();
        assert_eq!(a.cell_count(), 1);
        assert_eq!(a.to_string(), "B2");

        let b = CellRange::parse("D1:E3").unwrap();
        assert_eq!(a.union(&b).to_string(), "B1:E3");
    }

    #[test]
    fn test_invalid_range() {
        assert!(CellRange::parse("A1:").is_err());
        assert!(CellRange::parse("hello").is_err());
    }
}
