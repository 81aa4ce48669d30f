//! Collect-errors-and-continue bookkeeping for batch jobs.

use std::fmt::Display;

use crate::error::AppResult;

/// Records per-item failures of a batch without aborting it.
#[derive(Debug, Default)]
pub struct FailSoft {
    job: &'static str,
    errors: Vec<String>,
}

impl FailSoft {
    pub fn new(job: &'static str) -> Self {
        Self {
            job,
            errors: Vec::new(),
        }
    }

    /// Passes `Ok` values through; logs and records `Err` under `label`.
    pub fn record<T>(&mut self, label: impl Display, result: AppResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("{}: {} failed: {}", self.job, label, e);
                self.errors.push(format!("{label}: {e}"));
                None
            }
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn into_errors(self) -> Vec<String> {
        self.errors
    }
}
