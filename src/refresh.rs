use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};

use crate::config::Config;
use crate::credentials::load_api_key;
use crate::error::DigestError;
use crate::fetcher::ArxivClient;
use crate::pipeline::{Pipeline, PipelineReport};
use crate::summarizer::{Summarizer, SummaryReport, ZhipuProvider};
use crate::table::TableStore;

/// Result of fetching and summarizing a set of dates.
#[derive(Debug, Default)]
pub struct RefreshOutcome {
    pub finished_at: Option<DateTime<Utc>>,
    pub pipeline: PipelineReport,
    pub summaries: Vec<SummaryReport>,
    /// Set when summarization was skipped for lack of an API key.
    pub credential_problem: Option<String>,
    /// Set when the run could not start or aborted.
    pub error: Option<String>,
}

impl RefreshOutcome {
    pub fn summarized(&self) -> usize {
        self.summaries.iter().map(|r| r.summarized).sum()
    }

    pub fn summary_failures(&self) -> usize {
        self.summaries.iter().map(|r| r.failed).sum()
    }

    /// One line for logs and the dashboard status bar.
    pub fn describe(&self) -> String {
        if let Some(error) = &self.error {
            return format!("refresh failed: {}", error);
        }
        format!(
            "{} tables written, {} already present, {} dates failed; {} summaries added, {} failed",
            self.pipeline.written.len(),
            self.pipeline.skipped.len(),
            self.pipeline.failed.len(),
            self.summarized(),
            self.summary_failures()
        )
    }
}

/// Fetch every date (pipeline), then summarize whatever tables exist for them.
/// Never fails outright: problems are recorded in the outcome.
pub fn fetch_and_summarize(config: &Config, dates: &[NaiveDate], force: bool) -> RefreshOutcome {
    let mut outcome = RefreshOutcome::default();
    let store = TableStore::new(&config.data_dir);

    match ArxivClient::from_config(config) {
        Ok(client) => {
            let pipeline = Pipeline::new(client, store.clone());
            match pipeline.run(&config.categories, &config.keywords, dates, force) {
                Ok(report) => outcome.pipeline = report,
                Err(e) => {
                    warn!("Pipeline did not run: {}", e);
                    outcome.error = Some(e.to_string());
                    outcome.finished_at = Some(Utc::now());
                    return outcome;
                }
            }
        }
        Err(e) => {
            warn!("Could not build arXiv client: {}", e);
            outcome.error = Some(e.to_string());
        }
    }

    match load_api_key(&config.credential_file) {
        Ok(api_key) => match ZhipuProvider::from_config(config, api_key) {
            Ok(provider) => {
                let summarizer = Summarizer::new(provider, store, config.max_input_chars);
                match summarizer.summarize_dates(&config.categories, dates) {
                    Ok(reports) => outcome.summaries = reports,
                    Err(e) => {
                        warn!("Summarization stopped: {}", e);
                        outcome.error = Some(e.to_string());
                    }
                }
            }
            Err(e) => {
                warn!("Could not build LLM client: {}", e);
                outcome.error = Some(e.to_string());
            }
        },
        Err(e @ DigestError::MissingCredential { .. }) => {
            warn!("{}", e);
            outcome.credential_problem = Some(e.to_string());
        }
        Err(e) => {
            warn!("Could not read credential file: {}", e);
            outcome.credential_problem = Some(e.to_string());
        }
    }

    outcome.finished_at = Some(Utc::now());
    info!("Refresh finished: {}", outcome.describe());
    outcome
}
