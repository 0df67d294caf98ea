//! Workbook access using calamine
//!
//! Values are read through calamine. Writes are collected as pending numeric
//! edits and applied by [`crate::writer`] when the workbook is saved.

use calamine::{Data, Range, Reader, Xlsx, open_workbook};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub mod cell_ref;

pub use cell_ref::{CellRange, CellReference};

use crate::error::WorkbookError;
use crate::writer;

/// Pending numeric values of one worksheet, keyed by 0-based (row, col)
pub type SheetEdits = BTreeMap<(u32, u32), f64>;

/// An open xlsx workbook
pub struct Workbook {
    path: PathBuf,
    excel: Xlsx<BufReader<File>>,
    edits: BTreeMap<String, SheetEdits>,
}

impl Workbook {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WorkbookError> {
        let path = path.as_ref();
        let excel: Xlsx<_> = open_workbook(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            excel,
            edits: BTreeMap::new(),
        })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.excel.sheet_names()
    }

    /// Find a worksheet by name. An exact match wins; otherwise names are
    /// compared case-insensitively, the way Excel treats sheet names.
    pub fn worksheet(&mut self, name: &str) -> Result<Option<Worksheet<'_>>, WorkbookError> {
        let names = self.excel.sheet_names();
        let found = names
            .iter()
            .find(|n| n.as_str() == name)
            .or_else(|| names.iter().find(|n| n.to_lowercase() == name.to_lowercase()));

        let Some(sheet_name) = found.cloned() else {
            return Ok(None);
        };

        let cells = self.excel.worksheet_range(&sheet_name)?;
        let edits = self.edits.entry(sheet_name.clone()).or_default();
        Ok(Some(Worksheet {
            name: sheet_name,
            cells,
            edits,
        }))
    }

    /// Whether any worksheet has pending values
    pub fn is_modified(&self) -> bool {
        self.edits.values().any(|edits| !edits.is_empty())
    }

    /// Write the workbook with its pending values to `output`. The source file
    /// is never modified.
    pub fn save_as<P: AsRef<Path>>(&self, output: P) -> Result<(), WorkbookError> {
        writer::save_xlsx_with_edits(&self.path, output.as_ref(), &self.edits)
    }
}

/// A worksheet of an open [`Workbook`]
pub struct Worksheet<'a> {
    name: String,
    cells: Range<Data>,
    edits: &'a mut SheetEdits,
}

impl Worksheet<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display strings of `range`, row-major. Empty cells read as "".
    pub fn read_strings(&self, range: &CellRange) -> Vec<Vec<String>> {
        range
            .rows()
            .map(|row| {
                range
                    .columns()
                    .map(|col| {
                        self.cells
                            .get_value((row, col))
                            .map(|data| data.to_string())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect()
    }

    /// Store numbers into `range`. `values` must match its shape exactly.
    pub fn write_numbers(
        &mut self,
        range: &CellRange,
        values: &[Vec<f64>],
    ) -> Result<(), WorkbookError> {
        let shape_ok = values.len() == range.row_count()
            && values.iter().all(|row| row.len() == range.column_count());
        if !shape_ok {
            return Err(WorkbookError::ShapeMismatch {
                range: range.to_string(),
                expected_rows: range.row_count(),
                expected_cols: range.column_count(),
            });
        }
        if let Some(bad) = values.iter().flatten().find(|v| !v.is_finite()) {
            return Err(WorkbookError::NonFinite(*bad));
        }

        for (row, row_values) in range.rows().zip(values) {
            for (col, value) in range.columns().zip(row_values) {
                self.edits.insert((row, col), *value);
            }
        }
        Ok(())
    }
}
