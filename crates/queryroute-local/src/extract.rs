use queryroute_core::{Error, Result, ScrapedDocument, NO_INFORMATION};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Elements dropped before text conversion: page chrome and non-content.
pub const STRIPPED_TAGS: &[&str] = &["header", "footer", "nav", "script", "style"];

pub const DEFAULT_TEXT_WIDTH: usize = 100;

/// Remove [`STRIPPED_TAGS`] (and images) from an HTML document, returning re-serialized HTML.
pub fn strip_non_content(html: &str) -> String {
    let mut doc = html_scraper::Html::parse_document(html);
    let selector = format!("{}, img", STRIPPED_TAGS.join(", "));
    let Ok(sel) = html_scraper::Selector::parse(&selector) else {
        return html.to_string();
    };
    let ids: Vec<_> = doc.select(&sel).map(|el| el.id()).collect();
    for id in ids {
        // Nested matches may already be gone with their ancestor.
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
    doc.html()
}

/// Convert HTML to plain text without link or image annotations.
pub fn html_to_plain_text(html: &str, width: usize) -> String {
    let cleaned = strip_non_content(html);
    html2text::config::with_decorator(html2text::render::TrivialDecorator::new())
        .string_from_read(Cursor::new(cleaned.as_bytes()), width.max(20))
        .unwrap_or_default()
}

pub fn extract_document(url: &str, html: &str, width: usize) -> ScrapedDocument {
    ScrapedDocument {
        url: url.to_string(),
        text: html_to_plain_text(html, width),
    }
}

/// Per-URL file name inside `dir`, so distinct URLs never overwrite each other.
pub fn scrape_path_for(dir: &Path, url: &str) -> PathBuf {
    let mut h = Sha256::new();
    h.update(url.as_bytes());
    dir.join(format!("{}.txt", hex::encode(h.finalize())))
}

/// Write a document to `path`, replacing whatever was there.
pub fn persist_document(path: &Path, doc: &ScrapedDocument) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::Persist(e.to_string()))?;
    }
    fs::write(path, doc.render()).map_err(|e| Error::Persist(e.to_string()))
}

/// Extract `html` and persist the result to `path`.
///
/// With no HTML (the fetch failed) nothing is written and `Ok(None)` is returned.
pub fn extract_and_persist(
    url: &str,
    html: Option<&str>,
    path: &Path,
    width: usize,
) -> Result<Option<ScrapedDocument>> {
    let Some(html) = html else {
        warn!(url, "failed to retrieve content; nothing persisted");
        return Ok(None);
    };
    let doc = extract_document(url, html, width);
    persist_document(path, &doc)?;
    info!(url, path = %path.display(), "scraped content saved");
    Ok(Some(doc))
}

/// Full contents of a persisted scrape, or [`NO_INFORMATION`] if there is none.
pub fn read_persisted(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|_| NO_INFORMATION.to_string())
}
