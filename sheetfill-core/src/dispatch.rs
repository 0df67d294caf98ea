//! Command dispatcher: gates the input and routes recognized selectors

use std::path::Path;
use tracing::{error, info};

use crate::config::{SheetfillConfig, ValidationConfig};
use crate::error::{PipelineError, Rejection};
use crate::pipeline::{PipelineOutcome, RangePipeline};
use crate::validate::validate_input;

/// Result of one dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The pipeline ran (its outcome may still be "worksheet not found")
    Completed(PipelineOutcome),
    /// Input rejected; exactly one error was logged
    Rejected(Rejection),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Completed(_))
    }
}

pub struct Dispatcher {
    validation: ValidationConfig,
    selectors: Vec<String>,
    pipeline: RangePipeline,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::from_config(&SheetfillConfig::default())
    }
}

impl Dispatcher {
    pub fn new(validation: ValidationConfig, selectors: Vec<String>, pipeline: RangePipeline) -> Self {
        Self {
            validation,
            selectors,
            pipeline,
        }
    }

    pub fn from_config(config: &SheetfillConfig) -> Self {
        Self::new(
            config.validation.clone(),
            config.pipeline.selectors.clone(),
            RangePipeline::from_config(&config.pipeline),
        )
    }

    /// Recognized selector matching `selector` case-insensitively
    pub fn recognize(&self, selector: &str) -> Option<&str> {
        self.selectors
            .iter()
            .find(|known| known.eq_ignore_ascii_case(selector))
            .map(String::as_str)
    }

    /// Validate `file` and `selector`, then run the pipeline for a recognized
    /// selector. Only workbook open/save failures are returned as errors.
    pub fn dispatch(
        &self,
        file: Option<&Path>,
        selector: Option<&str>,
    ) -> Result<DispatchOutcome, PipelineError> {
        let Some(file) = file else {
            return Ok(self.reject(Rejection::NotFound, None));
        };

        let valid = match validate_input(file, &self.validation) {
            Ok(valid) => valid,
            Err(rejection) => return Ok(self.reject(rejection, Some(file))),
        };

        let selector = match selector {
            Some(selector) if !selector.is_empty() => selector,
            _ => return Ok(self.reject(Rejection::MissingOption, Some(file))),
        };

        let Some(known) = self.recognize(selector) else {
            return Ok(self.reject(Rejection::UnknownOption(selector.to_string()), Some(file)));
        };

        info!("{} option selected.", known);
        match self.pipeline.run(&valid.path, selector)? {
            PipelineOutcome::Rejected(rejection) => Ok(DispatchOutcome::Rejected(rejection)),
            outcome => Ok(DispatchOutcome::Completed(outcome)),
        }
    }

    fn reject(&self, rejection: Rejection, file: Option<&Path>) -> DispatchOutcome {
        match file {
            Some(file) => error!(path = %file.display(), "{}", rejection),
            None => error!("{}", rejection),
        }
        DispatchOutcome::Rejected(rejection)
    }
}
