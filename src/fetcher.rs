use chrono::{NaiveDate, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use log::{debug, info, warn};
use reqwest::blocking::Client;
use std::collections::HashSet;
use std::thread::sleep;
use std::time::Duration;

use crate::config::Config;
use crate::error::{DigestError, Result};
use crate::paper::{
    annotation_url, collapse_whitespace, default_pdf_url, parse_arxiv_id, validate_category, Paper,
};

const USER_AGENT: &str = concat!("arxiv-digest/", env!("CARGO_PKG_VERSION"));
const PAGE_SIZE: usize = 100;
const MAX_RESULTS: usize = 500;

/// Anything that can list the papers of one category on one day.
pub trait PaperSource {
    fn fetch(&self, category: &str, date: NaiveDate, keywords: &[String]) -> Result<Vec<Paper>>;
}

impl<T: PaperSource + ?Sized> PaperSource for &T {
    fn fetch(&self, category: &str, date: NaiveDate, keywords: &[String]) -> Result<Vec<Paper>> {
        (**self).fetch(category, date, keywords)
    }
}

/// Client for the arXiv listing API (`/api/query`, Atom responses).
pub struct ArxivClient {
    client: Client,
    base_url: String,
    page_size: usize,
    max_results: usize,
    page_delay: Duration,
}

impl ArxivClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: PAGE_SIZE,
            max_results: MAX_RESULTS,
            // arXiv asks clients to wait three seconds between consecutive calls
            page_delay: Duration::from_secs(3),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.arxiv_base_url, config.request_timeout)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    fn request_page(&self, query: &str, start: usize) -> Result<Vec<Entry>> {
        let url = format!("{}/api/query", self.base_url);
        let start = start.to_string();
        let page_size = self.page_size.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("search_query", query),
                ("start", start.as_str()),
                ("max_results", page_size.as_str()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
            ])
            .send()?;

        if !response.status().is_success() {
            return Err(DigestError::Api(format!(
                "arXiv API returned status {}",
                response.status()
            )));
        }

        let body = response.bytes()?;
        let feed = parser::parse(&body[..]).map_err(|e| DigestError::Feed(e.to_string()))?;

        // Query errors come back as a single entry pointing at /api/errors
        if let Some(error_entry) = feed.entries.iter().find(|e| e.id.contains("/api/errors")) {
            let message = error_entry
                .summary
                .as_ref()
                .map(|s| s.content.clone())
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(DigestError::Api(format!("arXiv API rejected query: {}", message)));
        }

        Ok(feed.entries)
    }

    /// One page of results; a failed request is attempted a second time.
    fn fetch_page(&self, query: &str, start: usize) -> Result<Vec<Entry>> {
        match self.request_page(query, start) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!("arXiv request failed ({}), retrying once", e);
                self.request_page(query, start)
            }
        }
    }
}

impl PaperSource for ArxivClient {
    fn fetch(&self, category: &str, date: NaiveDate, keywords: &[String]) -> Result<Vec<Paper>> {
        validate_category(category)?;
        let today = Utc::now().date_naive();
        if date > today {
            return Err(DigestError::InvalidDate(format!("{} is in the future", date)));
        }

        let query = build_query(category, date, keywords);
        info!("Fetching {} papers for {} ({})", category, date, query);

        let mut papers = Vec::new();
        let mut seen = HashSet::new();
        let mut start = 0;
        while start < self.max_results {
            if start > 0 && !self.page_delay.is_zero() {
                sleep(self.page_delay);
            }
            let entries = self.fetch_page(&query, start)?;
            let page_len = entries.len();
            debug!("Page at offset {} returned {} entries", start, page_len);

            for paper in entries.into_iter().filter_map(entry_to_paper) {
                if paper.published == date && seen.insert(paper.id.clone()) {
                    papers.push(paper);
                }
            }

            if page_len < self.page_size {
                break;
            }
            start += self.page_size;
        }

        info!("Found {} {} papers for {}", papers.len(), category, date);
        Ok(papers)
    }
}

/// `cat:<category> AND submittedDate:[..] [AND (ti:"kw" OR abs:"kw" ...)]`
pub fn build_query(category: &str, date: NaiveDate, keywords: &[String]) -> String {
    let day = date.format("%Y%m%d");
    let mut query = format!(
        "cat:{} AND submittedDate:[{}0000 TO {}2359]",
        category, day, day
    );
    let keywords: Vec<&str> = keywords
        .iter()
        .map(|kw| kw.trim())
        .filter(|kw| !kw.is_empty())
        .collect();
    if !keywords.is_empty() {
        let terms = keywords
            .iter()
            .map(|kw| format!("ti:\"{}\" OR abs:\"{}\"", kw, kw))
            .collect::<Vec<_>>()
            .join(" OR ");
        query.push_str(&format!(" AND ({})", terms));
    }
    query
}

/// Parse an Atom response body into papers, skipping entries without a usable id.
pub fn parse_feed(body: &[u8]) -> Result<Vec<Paper>> {
    let feed = parser::parse(body).map_err(|e| DigestError::Feed(e.to_string()))?;
    Ok(feed.entries.into_iter().filter_map(entry_to_paper).collect())
}

fn entry_to_paper(entry: Entry) -> Option<Paper> {
    let id = match parse_arxiv_id(&entry.id) {
        Some(id) => id,
        None => {
            warn!("Skipping feed entry with unrecognised id {}", entry.id);
            return None;
        }
    };

    let published = entry.published.or(entry.updated)?.date_naive();
    let title = entry
        .title
        .as_ref()
        .map(|t| collapse_whitespace(&t.content))
        .unwrap_or_default();
    let abstract_text = entry
        .summary
        .as_ref()
        .map(|s| collapse_whitespace(&s.content))
        .unwrap_or_default();
    let authors = entry
        .authors
        .iter()
        .map(|author| collapse_whitespace(&author.name))
        .collect();
    let category = entry
        .categories
        .first()
        .map(|c| c.term.clone())
        .unwrap_or_default();
    let abs_url = entry
        .links
        .iter()
        .find(|link| link.rel.as_deref() == Some("alternate"))
        .map(|link| link.href.clone())
        .unwrap_or_else(|| entry.id.clone());
    let pdf_url = entry
        .links
        .iter()
        .find(|link| {
            link.title.as_deref() == Some("pdf")
                || link.media_type.as_deref() == Some("application/pdf")
        })
        .map(|link| link.href.clone())
        .unwrap_or_else(|| default_pdf_url(&id));

    Some(Paper {
        annotation_url: annotation_url(&id),
        id,
        title,
        authors,
        abstract_text,
        category,
        published,
        abs_url,
        pdf_url,
        summary: None,
    })
}
