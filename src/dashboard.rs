use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use log::{info, warn};
use minijinja::Environment;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::credentials::load_api_key;
use crate::error::{DigestError, Result};
use crate::paper::Paper;
use crate::refresh::{fetch_and_summarize, RefreshOutcome};
use crate::table::TableStore;
use crate::window::window_for;

const TEMPLATE_NAME: &str = "dashboard.html";
const MAX_AUTHORS_CHARS: usize = 100;

pub fn build_template_env() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template(TEMPLATE_NAME, include_str!("../templates/dashboard.html"))?;
    Ok(env)
}

/// Every paper stored for `categories` on `dates`, newest first, one row per id.
pub fn load_papers(store: &TableStore, categories: &[String], dates: &[NaiveDate]) -> Vec<Paper> {
    let mut seen = HashSet::new();
    let mut papers = Vec::new();
    for &date in dates {
        for path in store.find_tables(categories, date) {
            for paper in store.load_or_empty(&path) {
                if seen.insert(paper.id.clone()) {
                    papers.push(paper);
                }
            }
        }
    }
    papers.sort_by(|a, b| b.published.cmp(&a.published).then_with(|| b.id.cmp(&a.id)));
    papers
}

/// One card on the page.
#[derive(Debug, Serialize)]
pub struct CardView {
    pub id: String,
    pub title: String,
    pub authors: String,
    pub published: String,
    pub category: String,
    pub abstract_text: String,
    pub summary: Option<String>,
    pub abs_url: String,
    pub pdf_url: String,
    pub annotation_url: String,
}

impl From<&Paper> for CardView {
    fn from(paper: &Paper) -> Self {
        let mut authors = paper.author_line();
        if authors.chars().count() > MAX_AUTHORS_CHARS {
            authors = authors.chars().take(MAX_AUTHORS_CHARS).collect::<String>() + "...";
        }
        Self {
            id: paper.id.clone(),
            title: paper.title.clone(),
            authors,
            published: paper.published.format("%Y年%m月%d日").to_string(),
            category: paper.category.clone(),
            abstract_text: paper.abstract_text.clone(),
            summary: paper.summary.clone().filter(|_| paper.has_summary()),
            abs_url: paper.abs_url.clone(),
            pdf_url: paper.pdf_url.clone(),
            annotation_url: paper.annotation_url.clone(),
        }
    }
}

/// Everything the template sees.
#[derive(Debug, Serialize)]
pub struct PageView {
    pub categories: Vec<String>,
    pub window_start: Option<String>,
    pub window_end: Option<String>,
    pub window_days: usize,
    pub papers: Vec<CardView>,
    pub refresh_running: bool,
    pub last_refresh: Option<String>,
    pub notice: Option<String>,
}

impl PageView {
    pub fn new(categories: &[String], dates: &[NaiveDate], papers: &[Paper]) -> Self {
        let fmt = |d: &NaiveDate| d.format("%Y-%m-%d").to_string();
        Self {
            categories: categories.to_vec(),
            window_start: dates.iter().min().map(fmt),
            window_end: dates.iter().max().map(fmt),
            window_days: dates.len(),
            papers: papers.iter().map(CardView::from).collect(),
            refresh_running: false,
            last_refresh: None,
            notice: None,
        }
    }
}

pub fn render_page(env: &Environment<'static>, view: &PageView) -> Result<String> {
    let template = env.get_template(TEMPLATE_NAME)?;
    Ok(template.render(view)?)
}

/// Background refresh bookkeeping; at most one refresh runs at a time.
#[derive(Debug, Default)]
pub struct RefreshState {
    running: AtomicBool,
    last: Mutex<Option<String>>,
}

impl RefreshState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<String> {
        self.last.lock().ok().and_then(|guard| guard.clone())
    }

    fn record(&self, outcome: &RefreshOutcome) {
        let finished = outcome
            .finished_at
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_default();
        if let Ok(mut guard) = self.last.lock() {
            *guard = Some(format!("{} ({})", finished, outcome.describe()));
        }
    }
}

/// Clears the running flag when the refresh task ends, panics included.
struct RunningFlag(Arc<RefreshState>);

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
    }
}

/// Banner text while the credential file holds no usable key.
pub fn credential_notice(config: &Config) -> Option<String> {
    load_api_key(&config.credential_file).err().map(|e| e.to_string())
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub env: Arc<Environment<'static>>,
    pub refresh: Arc<RefreshState>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            config: Arc::new(config),
            env: Arc::new(build_template_env()?),
            refresh: Arc::new(RefreshState::default()),
        })
    }

    fn store(&self) -> TableStore {
        TableStore::new(&self.config.data_dir)
    }

    /// Papers for the current business-day window.
    pub fn current_papers(&self) -> (Vec<NaiveDate>, Vec<Paper>) {
        let dates = window_for(&self.config, Utc::now());
        let papers = load_papers(&self.store(), &self.config.categories, &dates);
        (dates, papers)
    }
}

/// Kick off a refresh of the current window on the blocking pool.
/// Returns false when one is already running.
pub fn start_refresh(state: &AppState) -> bool {
    spawn_refresh(state, |config| {
        let dates = window_for(config, Utc::now());
        info!("Refreshing {} dates for {}", dates.len(), config.categories.join(", "));
        fetch_and_summarize(config, &dates, false)
    })
}

/// Run `job` on the blocking pool unless a refresh is already running.
pub fn spawn_refresh<F>(state: &AppState, job: F) -> bool
where
    F: FnOnce(&Config) -> RefreshOutcome + Send + 'static,
{
    if state
        .refresh
        .running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        info!("Refresh already running, ignoring request");
        return false;
    }

    let config = Arc::clone(&state.config);
    let refresh = Arc::clone(&state.refresh);
    tokio::task::spawn_blocking(move || {
        let _flag = RunningFlag(Arc::clone(&refresh));
        let outcome = job(&config);
        refresh.record(&outcome);
    });
    true
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/refresh", post(refresh))
        .route("/download", get(download))
        .route("/api/papers", get(api_papers))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Serve the dashboard until the process is stopped.
pub async fn serve(config: Config, initial_refresh: bool) -> Result<()> {
    let port = config.port;
    let state = AppState::new(config)?;

    if let Some(notice) = credential_notice(&state.config) {
        warn!("{}", notice);
    }
    if initial_refresh {
        start_refresh(&state);
    }

    let app = router(state);
    let addr = format!("0.0.0.0:{}", port);
    info!("Dashboard listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn index(State(state): State<AppState>) -> Response {
    let (dates, papers) = state.current_papers();
    let mut view = PageView::new(&state.config.categories, &dates, &papers);
    view.refresh_running = state.refresh.is_running();
    view.last_refresh = state.refresh.last();
    view.notice = credential_notice(&state.config);

    match render_page(&state.env, &view) {
        Ok(html) => Html(html).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn refresh(State(state): State<AppState>) -> Redirect {
    start_refresh(&state);
    Redirect::to("/")
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub id: String,
}

/// Stream a paper's PDF back as an attachment.
pub async fn download(State(state): State<AppState>, Query(params): Query<DownloadParams>) -> Response {
    let (_, papers) = state.current_papers();
    let Some(paper) = papers.into_iter().find(|p| p.id == params.id) else {
        return (StatusCode::NOT_FOUND, format!("Unknown paper {}", params.id)).into_response();
    };

    let timeout = state.config.request_timeout;
    let url = paper.pdf_url.clone();
    let fetched = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let client = Client::builder().timeout(timeout).build()?;
        let response = client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(DigestError::Api(format!("PDF request returned {}", response.status())));
        }
        Ok(response.bytes()?.to_vec())
    })
    .await;

    match fetched {
        Ok(Ok(bytes)) => {
            let file_name = format!("{}.pdf", paper.id.replace('/', "_"));
            (
                [
                    (header::CONTENT_TYPE, "application/pdf".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", file_name),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Ok(Err(e)) => {
            warn!("Download of {} failed: {}", paper.id, e);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn api_papers(State(state): State<AppState>) -> Json<Vec<Paper>> {
    let (_, papers) = state.current_papers();
    Json(papers)
}

async fn healthz() -> &'static str {
    "ok"
}
