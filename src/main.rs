use anyhow::{Context, Result};
use arxiv_digest::config::Config;
use arxiv_digest::credentials::load_api_key;
use arxiv_digest::dashboard;
use arxiv_digest::error::DigestError;
use arxiv_digest::fetcher::ArxivClient;
use arxiv_digest::paper::validate_category;
use arxiv_digest::pipeline::{DateSpec, Pipeline};
use arxiv_digest::refresh::fetch_and_summarize;
use arxiv_digest::summarizer::{Summarizer, ZhipuProvider};
use arxiv_digest::table::{TableKey, TableStore};
use arxiv_digest::window::window_for;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;

/// Fetch, summarize and browse the latest arXiv papers of a category
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the CSV tables
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// File containing the LLM API key
    #[arg(long, global = true)]
    credential_file: Option<PathBuf>,
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch papers and write one table per date
    Fetch {
        #[command(flatten)]
        selection: Selection,
        /// Re-fetch dates whose table already exists
        #[arg(long)]
        force: bool,
    },
    /// Add AI summaries to existing tables
    Summarize {
        #[command(flatten)]
        selection: Selection,
    },
    /// Fetch, then summarize
    Run {
        #[command(flatten)]
        selection: Selection,
        /// Re-fetch dates whose table already exists
        #[arg(long)]
        force: bool,
    },
    /// Print the business-day window the dashboard would show
    Window {
        /// Number of business days
        #[arg(long)]
        days: Option<usize>,
    },
    /// Start the web dashboard
    Serve {
        /// arXiv categories to show (e.g., eess.AS)
        #[arg(short, long, num_args = 1.., value_parser = parse_category)]
        categories: Vec<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Do not fetch and summarize when the server starts
        #[arg(long)]
        no_initial_refresh: bool,
    },
}

#[derive(Args)]
struct Selection {
    /// arXiv categories (e.g., eess.AS cs.AI); defaults to DIGEST_CATEGORIES or eess.AS
    #[arg(short, long, num_args = 1.., value_parser = parse_category)]
    categories: Vec<String>,
    /// Date (YYYY-MM-DD) or inclusive range (YYYY-MM-DD:YYYY-MM-DD); defaults to yesterday
    #[arg(short, long, value_parser = parse_date_spec)]
    date: Option<DateSpec>,
    /// Only papers mentioning one of these keywords in title or abstract
    #[arg(short, long, num_args = 1..)]
    keywords: Vec<String>,
}

fn parse_category(s: &str) -> std::result::Result<String, DigestError> {
    validate_category(s)?;
    Ok(s.to_string())
}

/// Dates after today (UTC) have no listing yet.
fn parse_date_spec(s: &str) -> std::result::Result<DateSpec, DigestError> {
    s.parse::<DateSpec>()?.ensure_not_after(Utc::now().date_naive())
}

impl Selection {
    /// Apply categories and keywords to the config and return the dates to process.
    fn apply(&self, config: &mut Config) -> DateSpec {
        if !self.categories.is_empty() {
            config.categories = self.categories.clone();
        }
        config.keywords = self.keywords.clone();
        self.date.unwrap_or_else(DateSpec::yesterday)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configure logging
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let mut config = Config::from_env();
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(path) = &cli.credential_file {
        config.credential_file = path.clone();
    }

    match cli.command {
        Command::Fetch { selection, force } => {
            let selected = selection.apply(&mut config);
            info!("Fetching {} for {}", config.categories.join(", "), selected);
            let client = ArxivClient::from_config(&config).context("Failed to build arXiv client")?;
            let pipeline = Pipeline::new(client, TableStore::new(&config.data_dir));
            let report = pipeline.run(&config.categories, &config.keywords, &selected.dates(), force)?;
            for path in &report.written {
                println!("{}", path.display());
            }
            if report.has_failures() {
                for (date, error) in &report.failed {
                    warn!("{}: {}", date, error);
                }
                anyhow::bail!("Failed to fetch {} of {} date(s)", report.failed.len(), selected.dates().len());
            }
        }
        Command::Summarize { selection } => {
            let selected = selection.apply(&mut config);
            let api_key = match load_api_key(&config.credential_file) {
                Ok(key) => key,
                Err(e) => {
                    warn!("{}", e);
                    return Ok(());
                }
            };
            let provider = ZhipuProvider::from_config(&config, api_key).context("Failed to build LLM client")?;
            let store = TableStore::new(&config.data_dir);
            let summarizer = Summarizer::new(provider, store.clone(), config.max_input_chars);
            let reports = if config.keywords.is_empty() {
                summarizer.summarize_dates(&config.categories, &selected.dates())?
            } else {
                let mut reports = Vec::new();
                for date in selected.dates() {
                    let path = store.path_for(&TableKey::new(&config.categories, &config.keywords, date));
                    reports.push(summarizer.summarize_table(&path)?);
                }
                reports
            };
            for report in &reports {
                println!(
                    "{}: {} summarized, {} already done, {} failed",
                    report.path.display(),
                    report.summarized,
                    report.already_done,
                    report.failed
                );
            }
        }
        Command::Run { selection, force } => {
            let selected = selection.apply(&mut config);
            let outcome = fetch_and_summarize(&config, &selected.dates(), force);
            if let Some(problem) = &outcome.credential_problem {
                warn!("{}", problem);
            }
            println!("{}", outcome.describe());
        }
        Command::Window { days } => {
            if let Some(days) = days {
                config.days_to_show = days;
            }
            for date in window_for(&config, Utc::now()) {
                println!("{}", date.format("%Y-%m-%d"));
            }
        }
        Command::Serve {
            categories,
            port,
            no_initial_refresh,
        } => {
            if !categories.is_empty() {
                config.categories = categories;
            }
            if let Some(port) = port {
                config.port = port;
            }
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime.block_on(dashboard::serve(config, !no_initial_refresh))?;
        }
    }

    Ok(())
}
