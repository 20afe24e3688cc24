use chrono::{Days, NaiveDate, Utc};
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{DigestError, Result};
use crate::fetcher::PaperSource;
use crate::paper::{validate_category, Paper};
use crate::table::{TableKey, TableStore};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single date (`YYYY-MM-DD`) or an inclusive range (`YYYY-MM-DD:YYYY-MM-DD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateSpec {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpec {
    pub fn single(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    pub fn range(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(DigestError::InvalidDate(format!(
                "range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Yesterday in UTC, the default when no date is given.
    pub fn yesterday() -> Self {
        let today = Utc::now().date_naive();
        Self::single(today.pred_opt().unwrap_or(today))
    }

    /// Error if any date of the range lies after `today`.
    pub fn ensure_not_after(self, today: NaiveDate) -> Result<Self> {
        if self.end > today {
            return Err(DigestError::InvalidDate(format!(
                "{} is in the future",
                self.end.format(DATE_FORMAT)
            )));
        }
        Ok(self)
    }

    /// Every calendar date in the range, oldest first.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut current = Some(self.start);
        while let Some(date) = current.filter(|d| *d <= self.end) {
            dates.push(date);
            current = date.checked_add_days(Days::new(1));
        }
        dates
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| DigestError::InvalidDate(format!("'{}' is not a YYYY-MM-DD date", s)))
}

impl FromStr for DateSpec {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((start, end)) => Self::range(parse_date(start)?, parse_date(end)?),
            None => Ok(Self::single(parse_date(s)?)),
        }
    }
}

impl fmt::Display for DateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start.format(DATE_FORMAT))
        } else {
            write!(
                f,
                "{}:{}",
                self.start.format(DATE_FORMAT),
                self.end.format(DATE_FORMAT)
            )
        }
    }
}

/// What happened to each date of a pipeline run.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<NaiveDate>,
    pub empty: Vec<NaiveDate>,
    pub failed: Vec<(NaiveDate, String)>,
}

impl PipelineReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Fetches each date and writes one table per date.
pub struct Pipeline<S> {
    source: S,
    store: TableStore,
}

impl<S: PaperSource> Pipeline<S> {
    pub fn new(source: S, store: TableStore) -> Self {
        Self { source, store }
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    /// Fetch every date in `dates`. Existing tables are left alone unless `force`;
    /// a failed date is recorded and the run moves on.
    pub fn run(
        &self,
        categories: &[String],
        keywords: &[String],
        dates: &[NaiveDate],
        force: bool,
    ) -> Result<PipelineReport> {
        if categories.is_empty() {
            return Err(DigestError::NoCategoriesProvided);
        }
        for category in categories {
            validate_category(category)?;
        }

        let mut report = PipelineReport::default();
        for &date in dates {
            let key = TableKey::new(categories, keywords, date);
            let path = self.store.path_for(&key);

            if path.is_file() && !force {
                info!("[{} | {}] table {:?} already exists, skipping", date, categories.join(", "), path);
                report.skipped.push(date);
                continue;
            }

            let mut papers = match self.fetch_date(categories, keywords, date) {
                Ok(papers) => papers,
                Err(e) => {
                    warn!("[{} | {}] fetch failed: {}", date, categories.join(", "), e);
                    report.failed.push((date, e.to_string()));
                    continue;
                }
            };

            if papers.is_empty() {
                info!("[{} | {}] no papers listed, nothing written", date, categories.join(", "));
                report.empty.push(date);
                continue;
            }

            if path.is_file() {
                carry_over_summaries(&mut papers, &self.store.load_or_empty(&path));
            }

            match self.store.save(&path, &papers) {
                Ok(()) => report.written.push(path),
                Err(e) => {
                    warn!("[{}] could not write {:?}: {}", date, path, e);
                    report.failed.push((date, e.to_string()));
                }
            }
        }

        info!(
            "Pipeline finished: {} written, {} skipped, {} empty, {} failed",
            report.written.len(),
            report.skipped.len(),
            report.empty.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Union of all categories for one date, de-duplicated by id (first wins).
    fn fetch_date(&self, categories: &[String], keywords: &[String], date: NaiveDate) -> Result<Vec<Paper>> {
        let mut seen = HashSet::new();
        let mut papers = Vec::new();
        for category in categories {
            for paper in self.source.fetch(category, date, keywords)? {
                if seen.insert(paper.id.clone()) {
                    papers.push(paper);
                }
            }
        }
        Ok(papers)
    }
}

/// Keep summaries from a previous table for rows that are fetched again.
fn carry_over_summaries(papers: &mut [Paper], previous: &[Paper]) {
    let summaries: HashMap<&str, &String> = previous
        .iter()
        .filter(|p| p.has_summary())
        .filter_map(|p| p.summary.as_ref().map(|s| (p.id.as_str(), s)))
        .collect();
    for paper in papers.iter_mut().filter(|p| !p.has_summary()) {
        if let Some(summary) = summaries.get(paper.id.as_str()) {
            paper.summary = Some((*summary).clone());
        }
    }
}
