use std::fmt::Write as _;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use tracing::debug;

use crate::error::ParseError;

static ELEMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Za-z][A-Za-z0-9-]*[\s/>]").unwrap());
static META_CHARSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([a-z0-9_:.\-]+)"#).unwrap()
});

const SNIFF_BYTES: usize = 1024;
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// A parsed page. Built leniently; malformed markup is repaired, never rejected.
pub struct ParsedDocument {
    html: Html,
    encoding: &'static Encoding,
}

impl ParsedDocument {
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Name of the encoding the bytes were actually decoded with.
    pub fn encoding(&self) -> &'static str {
        self.encoding.name()
    }

    /// Serialize the tree back to indented markup, one node per line.
    pub fn prettify(&self) -> String {
        let mut out = String::new();
        for child in self.html.tree.root().children() {
            write_node(&mut out, child.value(), ElementRef::wrap(child), 0, false);
        }
        out
    }

    pub fn write_pretty(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.prettify())
    }
}

/// Decode `bytes` and build the document tree.
pub fn parse(bytes: &[u8], declared_encoding: Option<&str>) -> Result<ParsedDocument, ParseError> {
    let (text, encoding) = decode(bytes, declared_encoding);

    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    if !ELEMENT_RE.is_match(&text) {
        return Err(ParseError::NoElements);
    }

    let html = Html::parse_document(&text);
    debug!(
        encoding = encoding.name(),
        recovered_errors = html.errors.len(),
        "Parsed document"
    );

    Ok(ParsedDocument { html, encoding })
}

/// BOM, then declared (or `<meta>`) charset, then strict UTF-8, then lossy UTF-8.
fn decode(bytes: &[u8], declared: Option<&str>) -> (String, &'static Encoding) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return (text.into_owned(), encoding);
    }

    let candidate = match declared {
        Some(label) => encoding_for(label),
        // ASCII-compatible markup cannot really be UTF-16 or x-user-defined.
        None => sniff_meta_charset(bytes)
            .and_then(|label| encoding_for(&label))
            .map(Encoding::output_encoding),
    };
    if let Some(encoding) = candidate {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return (text.into_owned(), encoding);
        }
        debug!("Content is not valid {}, falling back to UTF-8", encoding.name());
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), UTF_8),
        Err(_) => {
            debug!("Content is not valid UTF-8, decoding with replacement characters");
            let (text, _) = UTF_8.decode_without_bom_handling(bytes);
            (text.into_owned(), UTF_8)
        }
    }
}

fn encoding_for(label: &str) -> Option<&'static Encoding> {
    let encoding = Encoding::for_label(label.trim().as_bytes());
    if encoding.is_none() {
        debug!(label, "Unknown charset, falling back to UTF-8");
    }
    encoding
}

fn sniff_meta_charset(bytes: &[u8]) -> Option<String> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(SNIFF_BYTES)]);
    META_CHARSET_RE
        .captures(&head)
        .map(|caps| caps[1].to_string())
}

fn write_node(out: &mut String, node: &Node, element: Option<ElementRef<'_>>, depth: usize, raw: bool) {
    let indent = "  ".repeat(depth);
    match node {
        Node::Doctype(doctype) => {
            let _ = writeln!(out, "{indent}<!DOCTYPE {}>", doctype.name());
        }
        Node::Comment(comment) => {
            let _ = writeln!(out, "{indent}<!--{}-->", &**comment);
        }
        Node::Text(text) => {
            let text = text.trim();
            if !text.is_empty() {
                let text = if raw { text.to_string() } else { escape(text, false) };
                let _ = writeln!(out, "{indent}{text}");
            }
        }
        Node::Element(el) => {
            let Some(element) = element else { return };
            let name = el.name();

            let _ = write!(out, "{indent}<{name}");
            for (attr, value) in el.attrs() {
                let _ = write!(out, " {attr}=\"{}\"", escape(value, true));
            }
            out.push_str(">\n");

            if VOID_ELEMENTS.contains(&name) {
                return;
            }
            let raw = matches!(name, "script" | "style");
            for child in element.children() {
                write_node(out, child.value(), ElementRef::wrap(child), depth + 1, raw);
            }
            let _ = writeln!(out, "{indent}</{name}>");
        }
        _ => {}
    }
}

fn escape(s: &str, attr: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
