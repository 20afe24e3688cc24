use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DigestError, Result};

// archive[.SUBJECT], e.g. cs.AI, eess.AS, hep-th, q-fin.ST, cond-mat.stat-mech
static CATEGORY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z]+(-[a-z]+)?(\.[A-Za-z]+(-[a-z]+)?)?$").expect("Invalid category regex pattern")
});
// New-style (2104.08653v2) and old-style (hep-th/9901001v1) identifiers in an abs URL
static ARXIV_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:abs|pdf)/((?:[a-z\-]+(?:\.[A-Z]{2})?/\d{7})|(?:\d{4}\.\d{4,5}))(?:v\d+)?")
        .expect("Invalid arXiv ID regex pattern")
});
static WHITESPACE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+").expect("Invalid whitespace regex pattern")
});

const ANNOTATION_BASE_URL: &str = "https://www.alphaxiv.org/abs";

/// One archive entry as it is stored in a table and shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub category: String,
    pub published: NaiveDate,
    pub abs_url: String,
    pub pdf_url: String,
    pub annotation_url: String,
    /// Filled in by the summarizer; `None` until then.
    pub summary: Option<String>,
}

impl Paper {
    pub fn has_summary(&self) -> bool {
        self.summary.as_deref().map_or(false, |s| !s.trim().is_empty())
    }

    /// Authors joined for display and storage.
    pub fn author_line(&self) -> String {
        self.authors.join(", ")
    }
}

/// Check that a category tag has the shape of the arXiv taxonomy.
pub fn validate_category(category: &str) -> Result<()> {
    if CATEGORY_REGEX.is_match(category) {
        Ok(())
    } else {
        Err(DigestError::InvalidCategory(category.to_string()))
    }
}

/// Extract the versionless identifier from an entry id such as
/// `http://arxiv.org/abs/2104.08653v2`.
pub fn parse_arxiv_id(entry_id: &str) -> Option<String> {
    ARXIV_ID_REGEX
        .captures(entry_id)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn annotation_url(id: &str) -> String {
    format!("{}/{}", ANNOTATION_BASE_URL, id)
}

pub fn default_pdf_url(id: &str) -> String {
    format!("https://arxiv.org/pdf/{}", id)
}

/// Collapse runs of whitespace (the feed hard-wraps titles and abstracts).
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_REGEX.replace_all(text.trim(), " ").into_owned()
}
