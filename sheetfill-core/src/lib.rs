//! sheetfill-core: fill a worksheet range of an Excel workbook
//!
//! The pipeline validates an input file, opens it with calamine, reads a
//! fixed range as display strings, replaces the range with a reproducible
//! numeric sequence and saves the result as `<stem>_modified.xlsx`.
//! Diagnostics go through `tracing`; [`logging`] builds the sinks.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod reader;
pub mod validate;
pub mod writer;

pub use config::SheetfillConfig;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{PipelineError, Rejection, WorkbookError};
pub use logging::LogContext;
pub use pipeline::{PipelineOutcome, RangePipeline, SequenceFill};
pub use reader::{CellRange, CellReference, Workbook};
