use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigestError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Feed parsing error: {0}")]
    Feed(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Invalid arXiv category: {0}")]
    InvalidCategory(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("No API key configured. Write your key to {} and run again.", path.display())]
    MissingCredential { path: PathBuf },

    #[error("No categories provided")]
    NoCategoriesProvided,
}

pub type Result<T> = std::result::Result<T, DigestError>;
