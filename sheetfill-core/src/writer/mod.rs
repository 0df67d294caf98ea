//! Writer module for saving modified Excel files

mod formula;
mod xlsx_writer;

pub use xlsx_writer::{apply_cell_edits, save_xlsx_with_edits};

use std::path::{Path, PathBuf};

/// Output path for a processed input: `<dir>/<stem>_modified.xlsx`
pub fn derive_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{}_modified.xlsx", stem))
}
