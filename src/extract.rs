use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::ParsedDocument;
use crate::error::{RulesError, ScrapeError};
use crate::record::{Extracted, QuoteRecord, RawQuote, Skip};

/// Where to find the items on the page and how to read each field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractRules {
    pub container: String,
    pub item: String,
    pub theme: FieldRule,
    pub url: FieldRule,
    pub image_url: FieldRule,
    pub lines: FieldRule,
    /// `lines` keeps everything before the first occurrence of this marker.
    pub lines_marker: String,
    pub author: FieldRule,
}

impl Default for ExtractRules {
    fn default() -> Self {
        Self {
            container: "div#all_items".into(),
            item: "div.text-center.mb-8".into(),
            theme: FieldRule::text("h5").with_fallback("title").trimmed(),
            url: FieldRule::attr("a", "href"),
            image_url: FieldRule::attr("img", "src").with_fallback("data-src"),
            lines: FieldRule::attr("img", "alt"),
            lines_marker: " #".into(),
            author: FieldRule::text(r#"p[class~="text-white/50"]"#).trimmed(),
        }
    }
}

/// Read a value from the first descendant matching `selector`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldRule {
    pub selector: String,
    /// Attribute to read; text content when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
    /// Attribute on the same element used when the primary value is absent or blank.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_attr: Option<String>,
    pub trim: bool,
}

impl FieldRule {
    pub fn text(selector: &str) -> Self {
        Self {
            selector: selector.into(),
            ..Default::default()
        }
    }

    pub fn attr(selector: &str, attr: &str) -> Self {
        Self {
            selector: selector.into(),
            attr: Some(attr.into()),
            ..Default::default()
        }
    }

    pub fn with_fallback(mut self, attr: &str) -> Self {
        self.fallback_attr = Some(attr.into());
        self
    }

    pub fn trimmed(mut self) -> Self {
        self.trim = true;
        self
    }
}

struct CompiledRule {
    selector: Selector,
    attr: Option<String>,
    fallback_attr: Option<String>,
    trim: bool,
}

impl CompiledRule {
    fn compile(field: &'static str, rule: &FieldRule) -> Result<Self, RulesError> {
        Ok(Self {
            selector: compile_selector(field, &rule.selector)?,
            attr: rule.attr.clone(),
            fallback_attr: rule.fallback_attr.clone(),
            trim: rule.trim,
        })
    }

    /// Primary source, then fallback attribute, then missing.
    fn resolve(&self, item: ElementRef<'_>) -> Option<String> {
        let el = item.select(&self.selector).next()?;

        let primary = match &self.attr {
            Some(attr) => el.value().attr(attr).map(str::to_string),
            None => Some(el.text().collect::<String>()),
        };
        let value = primary
            .filter(|v| !v.trim().is_empty())
            .or_else(|| {
                let attr = self.fallback_attr.as_deref()?;
                el.value().attr(attr).map(str::to_string)
            })?;

        Some(if self.trim {
            value.trim().to_string()
        } else {
            value
        })
    }
}

fn compile_selector(field: &'static str, selector: &str) -> Result<Selector, RulesError> {
    Selector::parse(selector).map_err(|e| RulesError::Selector {
        field,
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Extraction rules with every selector compiled up front.
pub struct Extractor {
    container_selector: String,
    container: Selector,
    item: Selector,
    theme: CompiledRule,
    url: CompiledRule,
    image_url: CompiledRule,
    lines: CompiledRule,
    lines_marker: String,
    author: CompiledRule,
}

impl Extractor {
    pub fn new(rules: &ExtractRules) -> Result<Self, RulesError> {
        Ok(Self {
            container_selector: rules.container.clone(),
            container: compile_selector("container", &rules.container)?,
            item: compile_selector("item", &rules.item)?,
            theme: CompiledRule::compile("theme", &rules.theme)?,
            url: CompiledRule::compile("url", &rules.url)?,
            image_url: CompiledRule::compile("imageUrl", &rules.image_url)?,
            lines: CompiledRule::compile("lines", &rules.lines)?,
            lines_marker: rules.lines_marker.clone(),
            author: CompiledRule::compile("author", &rules.author)?,
        })
    }

    /// One outcome per item in the container, in document order.
    ///
    /// Fails only when the container itself is missing; items with missing
    /// fields come back as [`Extracted::Skipped`].
    pub fn extract(&self, doc: &ParsedDocument) -> Result<Vec<Extracted>, ScrapeError> {
        let container = doc
            .html()
            .select(&self.container)
            .next()
            .ok_or_else(|| ScrapeError::Structure {
                selector: self.container_selector.clone(),
            })?;

        Ok(container
            .select(&self.item)
            .enumerate()
            .map(|(index, item)| self.extract_item(index, item))
            .collect())
    }

    fn extract_item(&self, index: usize, item: ElementRef<'_>) -> Extracted {
        let raw = RawQuote {
            theme: self.theme.resolve(item),
            url: self.url.resolve(item),
            image_url: self.image_url.resolve(item),
            lines: self
                .lines
                .resolve(item)
                .map(|alt| lines_from_alt(&alt, &self.lines_marker).to_string()),
            author: self.author.resolve(item),
        };

        match QuoteRecord::try_from_raw(raw) {
            Ok(record) => Extracted::Record(record),
            Err(reason) => {
                debug!(index, %reason, "Skipping item");
                Extracted::Skipped(Skip { index, reason })
            }
        }
    }
}

/// Text before the first `marker`, or all of `alt` when the marker is absent.
pub fn lines_from_alt<'a>(alt: &'a str, marker: &str) -> &'a str {
    if marker.is_empty() {
        return alt;
    }
    alt.split_once(marker).map_or(alt, |(head, _)| head)
}
