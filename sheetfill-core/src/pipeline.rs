//! Worksheet range pipeline: open, locate, read, fill, save

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Rejection, WorkbookError};
use crate::reader::{CellRange, Workbook};
use crate::writer::derive_output_path;

/// Dense row-major sequence: cell `(i, j)` of an `r x c` range gets
/// `start + i * c + j`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceFill {
    pub start: f64,
}

impl Default for SequenceFill {
    fn default() -> Self {
        Self { start: 1.0 }
    }
}

impl SequenceFill {
    pub fn values(&self, range: &CellRange) -> Vec<Vec<f64>> {
        let columns = range.column_count();
        (0..range.row_count())
            .map(|i| {
                (0..columns)
                    .map(|j| self.start + (i * columns + j) as f64)
                    .collect()
            })
            .collect()
    }
}

/// Recoverable result of one run
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The range was filled and the workbook written to `output`
    Saved { output: PathBuf, cells_written: usize },
    /// No worksheet matched; nothing was written
    WorksheetNotFound { selector: String },
    /// Input rejected before the file was touched
    Rejected(Rejection),
}

/// Fills one range of a selected worksheet and saves a modified copy
#[derive(Debug, Clone)]
pub struct RangePipeline {
    range: CellRange,
    fill: SequenceFill,
}

impl Default for RangePipeline {
    fn default() -> Self {
        Self::new(CellRange::default(), SequenceFill::default())
    }
}

impl RangePipeline {
    pub fn new(range: CellRange, fill: SequenceFill) -> Self {
        Self { range, fill }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.range,
            SequenceFill {
                start: config.fill_start,
            },
        )
    }

    /// Run against `file_path`, using `selector` as the worksheet name.
    ///
    /// Open and save failures are logged and returned as errors. A missing
    /// worksheet is a warning and an `Ok` outcome.
    pub fn run(&self, file_path: &Path, selector: &str) -> Result<PipelineOutcome, PipelineError> {
        if selector.is_empty() {
            let rejection = Rejection::MissingOption;
            error!("{}", rejection);
            return Ok(PipelineOutcome::Rejected(rejection));
        }

        debug!("open the file {}", file_path.display());
        let mut workbook = Workbook::open(file_path).map_err(|e| open_error(file_path, e))?;

        let worksheet = workbook
            .worksheet(selector)
            .map_err(|e| open_error(file_path, e))?;
        let Some(mut worksheet) = worksheet else {
            warn!("Worksheet '{}' not found in the workbook.", selector);
            return Ok(PipelineOutcome::WorksheetNotFound {
                selector: selector.to_string(),
            });
        };

        let data = worksheet.read_strings(&self.range);
        debug!("Data from worksheet '{}':", worksheet.name());
        for row in &data {
            debug!("{}", row.join("\t"));
        }

        debug!(
            "Setting values in worksheet '{}' from {}",
            worksheet.name(),
            self.range
        );
        let values = self.fill.values(&self.range);
        worksheet
            .write_numbers(&self.range, &values)
            .map_err(|e| save_error(file_path, e))?;
        drop(worksheet);

        let output = derive_output_path(file_path);
        if output.exists() {
            fs::remove_file(&output).map_err(|e| save_error(&output, e.into()))?;
        }

        debug!("Saving modified workbook as '{}'", output.display());
        workbook
            .save_as(&output)
            .map_err(|e| save_error(&output, e))?;

        info!(
            "Wrote {} cells of {} to {}",
            self.range.cell_count(),
            selector,
            output.display()
        );
        Ok(PipelineOutcome::Saved {
            output,
            cells_written: self.range.cell_count(),
        })
    }
}

fn open_error(path: &Path, source: WorkbookError) -> PipelineError {
    error!(error = %source, "Failed to open file: {}", path.display());
    PipelineError::WorkbookOpen {
        path: path.to_path_buf(),
        source,
    }
}

fn save_error(path: &Path, source: WorkbookError) -> PipelineError {
    error!(error = %source, "Failed to save workbook: {}", path.display());
    PipelineError::WorkbookSave {
        path: path.to_path_buf(),
        source,
    }
}
