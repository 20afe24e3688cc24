use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::error::Result;
use crate::paper::Paper;

const FILE_PREFIX: &str = "arxiv_";
const KEYWORDS_MARKER: &str = "_keywords_";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Identifies one table: the categories and keywords it was fetched with, and its date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableKey {
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub date: NaiveDate,
}

impl TableKey {
    pub fn new(categories: &[String], keywords: &[String], date: NaiveDate) -> Self {
        Self {
            categories: categories.to_vec(),
            keywords: keywords.to_vec(),
            date,
        }
    }

    /// `arxiv_<cats>[_keywords_<kws>]_<date>.csv`
    pub fn file_name(&self) -> String {
        let mut name = format!("{}{}", FILE_PREFIX, categories_tag(&self.categories));
        if !self.keywords.is_empty() {
            name.push_str(KEYWORDS_MARKER);
            name.push_str(&keywords_tag(&self.keywords));
        }
        name.push_str(&format!("_{}.csv", self.date.format(DATE_FORMAT)));
        name
    }
}

/// Category tags joined with `-`, dots removed (`eess.AS` -> `eessAS`).
pub fn categories_tag(categories: &[String]) -> String {
    categories.join("-").replace('.', "")
}

/// Keywords joined with `-`; spaces and path separators become `_`, dots are removed.
fn keywords_tag(keywords: &[String]) -> String {
    keywords
        .iter()
        .map(|kw| {
            kw.trim()
                .chars()
                .filter(|c| *c != '.')
                .map(|c| match c {
                    ' ' | '/' | '\\' => '_',
                    c => c,
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Split a table file name into its categories tag, keywords tag and date.
pub fn parse_file_name(name: &str) -> Option<(String, Option<String>, NaiveDate)> {
    let stem = name.strip_prefix(FILE_PREFIX)?.strip_suffix(".csv")?;
    let (head, date_str) = stem.rsplit_once('_')?;
    let date = NaiveDate::parse_from_str(date_str, DATE_FORMAT).ok()?;
    match head.split_once(KEYWORDS_MARKER) {
        Some((cats, kws)) => Some((cats.to_string(), Some(kws.to_string()), date)),
        None => Some((head.to_string(), None, date)),
    }
}

/// Flat CSV row; column order is the on-disk format.
#[derive(Debug, Serialize, Deserialize)]
struct TableRow {
    id: String,
    title: String,
    authors: String,
    #[serde(rename = "abstract")]
    abstract_text: String,
    category: String,
    published: NaiveDate,
    abs_url: String,
    pdf_url: String,
    annotation_url: String,
    summary: Option<String>,
}

impl From<&Paper> for TableRow {
    fn from(paper: &Paper) -> Self {
        Self {
            id: paper.id.clone(),
            title: paper.title.clone(),
            authors: paper.author_line(),
            abstract_text: paper.abstract_text.clone(),
            category: paper.category.clone(),
            published: paper.published,
            abs_url: paper.abs_url.clone(),
            pdf_url: paper.pdf_url.clone(),
            annotation_url: paper.annotation_url.clone(),
            summary: paper.summary.clone().filter(|s| !s.trim().is_empty()),
        }
    }
}

impl From<TableRow> for Paper {
    fn from(row: TableRow) -> Self {
        let authors = row
            .authors
            .split(", ")
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            id: row.id,
            title: row.title,
            authors,
            abstract_text: row.abstract_text,
            category: row.category,
            published: row.published,
            abs_url: row.abs_url,
            pdf_url: row.pdf_url,
            annotation_url: row.annotation_url,
            summary: row.summary.filter(|s| !s.trim().is_empty()),
        }
    }
}

/// Directory of table files.
#[derive(Debug, Clone)]
pub struct TableStore {
    dir: PathBuf,
}

impl TableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &TableKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    pub fn exists(&self, key: &TableKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Read every row of a table file.
    pub fn load(&self, path: &Path) -> Result<Vec<Paper>> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut papers = Vec::new();
        for row in reader.deserialize::<TableRow>() {
            papers.push(Paper::from(row?));
        }
        debug!("Loaded {} rows from {:?}", papers.len(), path);
        Ok(papers)
    }

    /// Like [`TableStore::load`], but a missing or unreadable table is treated as empty.
    pub fn load_or_empty(&self, path: &Path) -> Vec<Paper> {
        match self.load(path) {
            Ok(papers) => papers,
            Err(e) => {
                warn!("Skipping table {:?}: {}", path, e);
                Vec::new()
            }
        }
    }

    /// Write a table, replacing the file atomically.
    pub fn save(&self, path: &Path, papers: &[Paper]) -> Result<()> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            // Header written by hand so that an empty table still has one
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(tmp.as_file_mut());
            writer.write_record(HEADER)?;
            for paper in papers {
                writer.serialize(TableRow::from(paper))?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;

        info!("Wrote {} rows to {:?}", papers.len(), path);
        Ok(())
    }

    /// Every table for these categories on `date`, whatever keywords it was fetched with.
    pub fn find_tables(&self, categories: &[String], date: NaiveDate) -> Vec<PathBuf> {
        let wanted = categories_tag(categories);
        let mut found: Vec<PathBuf> = WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(parse_file_name)
                    .map_or(false, |(cats, _, d)| cats == wanted && d == date)
            })
            .map(|entry| entry.path().to_path_buf())
            .collect();
        found.sort();
        found
    }
}

const HEADER: [&str; 10] = [
    "id",
    "title",
    "authors",
    "abstract",
    "category",
    "published",
    "abs_url",
    "pdf_url",
    "annotation_url",
    "summary",
];
