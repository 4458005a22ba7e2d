use std::fmt;

use serde::{Deserialize, Serialize};

/// Output columns, in record field order.
pub const HEADER: [&str; 5] = ["theme", "url", "imageUrl", "lines", "author"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Theme,
    Url,
    ImageUrl,
    Lines,
    Author,
}

impl Field {
    pub fn column(self) -> &'static str {
        match self {
            Field::Theme => "theme",
            Field::Url => "url",
            Field::ImageUrl => "imageUrl",
            Field::Lines => "lines",
            Field::Author => "author",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// One fully-populated quote. Only constructible with every field present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawQuote")]
pub struct QuoteRecord {
    theme: String,
    url: String,
    image_url: String,
    lines: String,
    author: String,
}

/// Field values as found on the page, before validation.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuote {
    pub theme: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub lines: Option<String>,
    pub author: Option<String>,
}

impl QuoteRecord {
    /// Validate a raw quote. Blank values count as missing.
    pub fn try_from_raw(raw: RawQuote) -> Result<Self, SkipReason> {
        let mut missing = Vec::new();
        let mut take = |value: Option<String>, field: Field| match value {
            Some(v) if !v.trim().is_empty() => v,
            _ => {
                missing.push(field);
                String::new()
            }
        };

        let record = QuoteRecord {
            theme: take(raw.theme, Field::Theme),
            url: take(raw.url, Field::Url),
            image_url: take(raw.image_url, Field::ImageUrl),
            lines: take(raw.lines, Field::Lines),
            author: take(raw.author, Field::Author),
        };

        if missing.is_empty() {
            Ok(record)
        } else {
            Err(SkipReason::MissingFields(missing))
        }
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    pub fn lines(&self) -> &str {
        &self.lines
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn as_row(&self) -> [&str; 5] {
        [
            self.theme.as_str(),
            self.url.as_str(),
            self.image_url.as_str(),
            self.lines.as_str(),
            self.author.as_str(),
        ]
    }
}

impl TryFrom<RawQuote> for QuoteRecord {
    type Error = SkipReason;

    fn try_from(raw: RawQuote) -> Result<Self, Self::Error> {
        Self::try_from_raw(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingFields(Vec<Field>),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingFields(fields) => {
                let names: Vec<&str> = fields.iter().map(|f| f.column()).collect();
                write!(f, "missing required field(s): {}", names.join(", "))
            }
        }
    }
}

/// A skipped item and its position among the container's items (0-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skip {
    pub index: usize,
    pub reason: SkipReason,
}

/// Outcome of extracting one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Record(QuoteRecord),
    Skipped(Skip),
}

/// Result of a successful run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeReport {
    pub source: String,
    pub items_found: usize,
    pub records_written: usize,
    pub records_skipped: usize,
    pub skip_reasons: Vec<Skip>,
}

impl ScrapeReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn record_skip(&mut self, skip: Skip) {
        self.records_skipped += 1;
        self.skip_reasons.push(skip);
    }

    pub fn is_complete(&self) -> bool {
        self.records_skipped == 0
    }

    pub fn print(&self) {
        println!(
            "Extracted {} of {} items into CSV ({} skipped).",
            self.records_written, self.items_found, self.records_skipped
        );
        for skip in &self.skip_reasons {
            println!("  item #{}: {}", skip.index, skip.reason);
        }
    }
}
