use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::document;
use crate::error::{PipelineError, ScrapeError};
use crate::extract::Extractor;
use crate::fetcher::Fetcher;
use crate::record::{Extracted, ScrapeReport};
use crate::writer;

/// Where a run is. A pipeline between runs is idle and holds no stage; a
/// failed run ends as a [`PipelineError`] carrying the stage it failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Parsing,
    Extracting,
    Writing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching",
            Stage::Parsing => "parsing",
            Stage::Extracting => "extracting",
            Stage::Writing => "writing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Fetch → parse → extract → write, for one page.
pub struct Pipeline {
    fetcher: Fetcher,
    extractor: Extractor,
    dump_html: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(fetcher: Fetcher, extractor: Extractor) -> Self {
        Self {
            fetcher,
            extractor,
            dump_html: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let fetcher = Fetcher::new(&settings.fetch).context("Failed to build HTTP client")?;
        let extractor = Extractor::new(&settings.rules)?;
        Ok(Self::new(fetcher, extractor))
    }

    /// Also write the parsed document, pretty-printed, to `path`.
    pub fn with_html_dump(mut self, path: impl Into<PathBuf>) -> Self {
        self.dump_html = Some(path.into());
        self
    }

    pub async fn run(&self, url: &str, output: &Path) -> Result<ScrapeReport, PipelineError> {
        self.run_until(url, output, std::future::pending()).await
    }

    /// Like [`run`](Self::run), but gives up as soon as `shutdown` resolves,
    /// including in the middle of a retry backoff.
    pub async fn run_until<F>(
        &self,
        url: &str,
        output: &Path,
        shutdown: F,
    ) -> Result<ScrapeReport, PipelineError>
    where
        F: Future<Output = ()>,
    {
        info!(url, output = %output.display(), "Starting scrape");
        enter(Stage::Fetching);

        let fetched = tokio::select! {
            result = self.fetcher.fetch(url) => result.map_err(|e| fail(Stage::Fetching, e))?,
            _ = shutdown => return Err(fail(Stage::Fetching, ScrapeError::Cancelled)),
        };
        if fetched.final_url != url {
            debug!(final_url = %fetched.final_url, "Followed redirects");
        }

        self.run_bytes(
            url,
            &fetched.bytes,
            fetched.declared_encoding.as_deref(),
            output,
        )
    }

    /// Run from already-fetched content. `source` is only used for reporting.
    pub fn run_bytes(
        &self,
        source: &str,
        bytes: &[u8],
        declared_encoding: Option<&str>,
        output: &Path,
    ) -> Result<ScrapeReport, PipelineError> {
        enter(Stage::Parsing);
        let doc = document::parse(bytes, declared_encoding)
            .map_err(|e| fail(Stage::Parsing, e.into()))?;

        if let Some(path) = &self.dump_html {
            match doc.write_pretty(path) {
                Ok(()) => info!(path = %path.display(), "Wrote pretty-printed HTML"),
                Err(e) => warn!(path = %path.display(), "Failed to write HTML dump: {}", e),
            }
        }

        enter(Stage::Extracting);
        let extracted = self
            .extractor
            .extract(&doc)
            .map_err(|e| fail(Stage::Extracting, e))?;
        drop(doc);

        let mut report = ScrapeReport::new(source);
        report.items_found = extracted.len();
        let mut records = Vec::with_capacity(extracted.len());
        for outcome in extracted {
            match outcome {
                Extracted::Record(record) => records.push(record),
                Extracted::Skipped(skip) => {
                    warn!(index = skip.index, "Skipped item: {}", skip.reason);
                    report.record_skip(skip);
                }
            }
        }

        enter(Stage::Writing);
        report.records_written =
            writer::write_csv(&records, output).map_err(|e| fail(Stage::Writing, e))?;

        enter(Stage::Done);
        info!(
            "Extracted {} of {} items into {}",
            report.records_written,
            report.items_found,
            output.display()
        );
        Ok(report)
    }
}

fn enter(stage: Stage) {
    debug!(%stage, "Entering stage");
}

fn fail(stage: Stage, source: ScrapeError) -> PipelineError {
    warn!(%stage, "Run failed: {}", source);
    PipelineError::new(stage, source)
}
