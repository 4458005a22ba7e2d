pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod pipeline;
pub mod record;
pub mod writer;

pub use config::Settings;
pub use error::{PipelineError, ScrapeError};
pub use pipeline::{Pipeline, Stage};
pub use record::{QuoteRecord, ScrapeReport};
