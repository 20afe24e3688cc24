use chrono::NaiveTime;
use chrono_tz::Tz;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ARXIV_BASE_URL: &str = "http://export.arxiv.org";
pub const DEFAULT_LLM_BASE_URL: &str = "https://open.bigmodel.cn";
pub const DEFAULT_LLM_MODEL: &str = "glm-4.5-flash";
pub const DEFAULT_CREDENTIAL_FILE: &str = "api_key.txt";
pub const DEFAULT_DATA_DIR: &str = "tables";
pub const DEFAULT_CATEGORIES: &[&str] = &["eess.AS"];
pub const DEFAULT_DAYS_TO_SHOW: usize = 7;
pub const DEFAULT_PORT: u16 = 7860;

/// arXiv announces new submissions after 14:00 US Eastern on weekdays.
pub const ARCHIVE_TIMEZONE: Tz = chrono_tz::America::New_York;

/// Runtime settings shared by the CLI and the dashboard.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub days_to_show: usize,
    pub cutoff: NaiveTime,
    pub timezone: Tz,
    pub arxiv_base_url: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub credential_file: PathBuf,
    pub request_timeout: Duration,
    /// Abstracts longer than this many characters are cut before prompting.
    pub max_input_chars: usize,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            keywords: Vec::new(),
            days_to_show: DEFAULT_DAYS_TO_SHOW,
            cutoff: NaiveTime::from_hms_opt(14, 0, 0).unwrap_or(NaiveTime::MIN),
            timezone: ARCHIVE_TIMEZONE,
            arxiv_base_url: DEFAULT_ARXIV_BASE_URL.to_string(),
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            credential_file: PathBuf::from(DEFAULT_CREDENTIAL_FILE),
            request_timeout: Duration::from_secs(30),
            max_input_chars: 6000,
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Defaults overridden by environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("DIGEST_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(categories) = std::env::var("DIGEST_CATEGORIES") {
            let parsed: Vec<String> = categories
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|c| !c.is_empty())
                .map(|c| c.to_string())
                .collect();
            if !parsed.is_empty() {
                config.categories = parsed;
            }
        }
        if let Ok(url) = std::env::var("ARXIV_BASE_URL") {
            config.arxiv_base_url = url;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm_base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.llm_model = model;
        }
        if let Some(secs) = std::env::var("API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.request_timeout = Duration::from_secs(secs);
        }

        config
    }
}
