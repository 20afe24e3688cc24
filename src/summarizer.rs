use chrono::NaiveDate;
use log::{info, warn};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::error::{DigestError, Result};
use crate::table::TableStore;

pub const SYSTEM_PROMPT: &str = "你是一个精通科研论文的AI助手，擅长根据论文标题和摘要，将复杂的论文内容总结为一小段通俗易懂又不失专业性的话。";

const DEFAULT_TEMPERATURE: f32 = 0.7;

/// The user message: a one-paragraph Chinese summary of title and abstract.
pub fn build_prompt(title: &str, abstract_text: &str) -> String {
    format!(
        "请用一小段话总结以下论文的核心内容，内容包括标题和摘要：\n\n标题：{}\n\n摘要：{}。注意，总结段落需要包括你认为的核心方法和创新点，仅输出一段总结文字即可。",
        title, abstract_text
    )
}

/// At most `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Request envelope handed to a provider.
pub struct SummaryRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
}

/// A text-generation backend.
pub trait SummaryProvider {
    fn complete(&self, request: &SummaryRequest) -> Result<String>;
}

impl<T: SummaryProvider + ?Sized> SummaryProvider for &T {
    fn complete(&self, request: &SummaryRequest) -> Result<String> {
        (**self).complete(request)
    }
}

/// Zhipu GLM chat completions (OpenAI-compatible wire format).
pub struct ZhipuProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ZhipuProvider {
    pub fn new(base_url: &str, api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    pub fn from_config(config: &Config, api_key: String) -> Result<Self> {
        Self::new(
            &config.llm_base_url,
            api_key,
            config.llm_model.clone(),
            config.request_timeout,
        )
    }
}

impl SummaryProvider for ZhipuProvider {
    fn complete(&self, request: &SummaryRequest) -> Result<String> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| DigestError::Api("API key contains invalid characters".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt,
                },
            ],
            thinking: Thinking { kind: "enabled" },
        };

        let url = format!("{}/api/paas/v4/chat/completions", self.base_url);
        let resp = self.client.post(&url).headers(headers).json(&body).send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(DigestError::Api(format!(
                "LLM API returned {}: {}",
                status,
                error_message(&text)
            )));
        }

        let parsed: ChatResponse = resp.json()?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| DigestError::Api("LLM API returned no content".to_string()))
    }
}

/// `{"error": {"message": ..}}` when the body has that shape, else the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    thinking: Thinking,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Thinking {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: String,
}

/// Outcome of one pass over one table.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SummaryReport {
    pub path: PathBuf,
    pub summarized: usize,
    pub already_done: usize,
    pub failed: usize,
}

impl SummaryReport {
    /// Every row of the table now has a summary.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Fills in missing summaries, one row at a time.
pub struct Summarizer<P> {
    provider: P,
    store: TableStore,
    max_input_chars: usize,
}

impl<P: SummaryProvider> Summarizer<P> {
    pub fn new(provider: P, store: TableStore, max_input_chars: usize) -> Self {
        Self {
            provider,
            store,
            max_input_chars,
        }
    }

    /// Summarize every row of `path` that has no summary yet. The table is
    /// rewritten after each new summary; failed rows stay empty for the next pass.
    pub fn summarize_table(&self, path: &Path) -> Result<SummaryReport> {
        let mut report = SummaryReport {
            path: path.to_path_buf(),
            ..Default::default()
        };

        let mut papers = match self.store.load(path) {
            Ok(papers) => papers,
            Err(e) => {
                warn!("Nothing to summarize in {:?}: {}", path, e);
                return Ok(report);
            }
        };

        let pending: Vec<usize> = papers
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.has_summary())
            .map(|(idx, _)| idx)
            .collect();
        report.already_done = papers.len() - pending.len();

        if pending.is_empty() {
            info!("All {} papers in {:?} already summarized", papers.len(), path);
            return Ok(report);
        }
        let total = pending.len();
        info!("Summarizing {} of {} papers in {:?}", total, papers.len(), path);

        for (n, idx) in pending.into_iter().enumerate() {
            let paper = &papers[idx];
            let prompt = build_prompt(
                &paper.title,
                truncate_chars(&paper.abstract_text, self.max_input_chars),
            );
            let request = SummaryRequest {
                system: SYSTEM_PROMPT,
                prompt: &prompt,
                temperature: DEFAULT_TEMPERATURE,
            };

            match self.provider.complete(&request) {
                Ok(summary) if !summary.trim().is_empty() => {
                    info!("Summarized {} ({}/{})", paper.id, n + 1, total);
                    papers[idx].summary = Some(summary.trim().to_string());
                    if let Err(e) = self.store.save(path, &papers) {
                        warn!("Could not write {:?}, stopping this table: {}", path, e);
                        report.failed += 1;
                        break;
                    }
                    report.summarized += 1;
                }
                Ok(_) => {
                    warn!("Empty summary returned for {}, leaving it for the next pass", paper.id);
                    report.failed += 1;
                }
                Err(e) => {
                    warn!("Could not summarize {}: {}", paper.id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "{:?}: {} summarized, {} already done, {} failed",
            path, report.summarized, report.already_done, report.failed
        );
        Ok(report)
    }

    /// Summarize every table for `categories` on each of `dates`.
    pub fn summarize_dates(&self, categories: &[String], dates: &[NaiveDate]) -> Result<Vec<SummaryReport>> {
        let mut reports = Vec::new();
        for &date in dates {
            let tables = self.store.find_tables(categories, date);
            if tables.is_empty() {
                info!("No table found for {} on {}", categories.join(", "), date);
            }
            for path in tables {
                match self.summarize_table(&path) {
                    Ok(report) => reports.push(report),
                    Err(e) => warn!("Skipping {:?}: {}", path, e),
                }
            }
        }
        Ok(reports)
    }
}
