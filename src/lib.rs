//! Daily arXiv digest: fetch a category's new papers, summarize them with an
//! LLM, cache the results as CSV tables and browse them in a small dashboard.

pub mod config;
pub mod credentials;
pub mod dashboard;
pub mod error;
pub mod fetcher;
pub mod paper;
pub mod pipeline;
pub mod refresh;
pub mod summarizer;
pub mod table;
pub mod window;

pub use config::Config;
pub use error::DigestError;
pub use paper::Paper;
pub use pipeline::{DateSpec, Pipeline, PipelineReport};
pub use summarizer::{Summarizer, SummaryProvider, SummaryReport};
pub use table::{TableKey, TableStore};
