use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;

use crate::pipeline::Stage;

/// Why a single fetch attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchFailure {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded {0}")]
    Status(StatusCode),
}

impl FetchFailure {
    /// Connection failures, timeouts and 5xx are worth another attempt; 4xx never is.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchFailure::Transport(e) => !(e.is_builder() || e.is_redirect() || e.is_decode()),
            FetchFailure::Status(status) => status.is_server_error(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("document is empty")]
    Empty,
    #[error("document contains no element markup")]
    NoElements,
}

/// Invalid extraction rules, caught before any network I/O.
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("invalid {field} selector `{selector}`: {reason}")]
    Selector {
        field: &'static str,
        selector: String,
        reason: String,
    },
}

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("network error after {attempts} attempt(s): {cause}")]
    Network { cause: FetchFailure, attempts: u32 },

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("page structure changed: nothing matches container selector `{selector}`")]
    Structure { selector: String },

    #[error("cannot write {}: {cause}", path.display())]
    Io { path: PathBuf, cause: io::Error },

    #[error("run cancelled")]
    Cancelled,
}

/// A failed run, tagged with the stage it failed in.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: ScrapeError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: ScrapeError) -> Self {
        Self { stage, source }
    }
}
