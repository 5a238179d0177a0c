// Report orchestration
// collect → assemble → index → retrieve → prompt → model → recover → persist


use anyhow::Context;
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assembler::ChunkAssembler;
use crate::config::{Config, ConfigError};
use crate::embeddings::{Embedder, OllamaClient};
use crate::index::{EmbeddingIndex, IndexError};
use crate::llm::prompt::{format_further_reading, format_ticker_insight};
use crate::llm::{ChatClient, LanguageModel, PromptFields, PromptTemplate, SYSTEM_PROMPT, recover};
use crate::retrieval::{Retriever, compose_query};
use crate::sources::{
    ArticleStore, NewsArticle, PriceHistory, PricePoint, SourceCollector, SourceKind,
    collectors_from_config, price_history_from_config,
};

const DEFAULT_LANGUAGE: &str = "English";
const NO_TICKER: &str = "N/A";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub description: String,
    /// Keywords driving collection and retrieval
    pub interests: Vec<String>,
}

/// Body of a report request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub persona: Persona,
    #[serde(rename = "companySize")]
    pub company_size: String,
    pub industry: String,
    pub region: String,
    pub role: String,
    pub ticker: String,
    pub language: String,
    /// Shown to the model in the prompt; the configured model answers
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

impl ReportRequest {
    /// Non-blank interests, trimmed
    #[inline]
    pub fn keywords(&self) -> Vec<String> {
        self.persona
            .interests
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Section name → arbitrary JSON, as written by the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LlmReport(pub Map<String, Value>);

impl LlmReport {
    #[inline]
    pub fn final_summary(&self) -> Option<&str> {
        self.0.get("final_summary").and_then(Value::as_str)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: usize,
    pub records: usize,
}

#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub run_id: Uuid,
    pub report: LlmReport,
    pub repaired: bool,
    pub report_path: PathBuf,
    pub chunk_count: usize,
    pub retrieved_count: usize,
    pub collection: CollectionSummary,
}

impl ReportOutcome {
    /// The report's `final_summary`, or an empty string
    #[inline]
    pub fn text_report(&self) -> &str {
        self.report.final_summary().unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Index failure: {0}")]
    IndexBuild(#[from] IndexError),
    #[error("Language model call failed: {0}")]
    Llm(String),
    #[error("Language model returned an empty report")]
    EmptyReport,
    #[error("Report generation was cancelled")]
    Cancelled,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Runs the report pipeline against a fixed on-disk layout.
///
/// Runs are serialised: the index location is shared by every run.
pub struct ReportService {
    config: Config,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    collectors: Vec<Arc<dyn SourceCollector>>,
    prices: Option<Arc<dyn PriceHistory>>,
    template: PromptTemplate,
    run_lock: Mutex<()>,
}

impl std::fmt::Debug for ReportService {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let collectors: Vec<&str> = self.collectors.iter().map(|c| c.name()).collect();
        f.debug_struct("ReportService")
            .field("base_dir", &self.config.get_base_dir())
            .field("model", &self.model.model_name())
            .field("collectors", &collectors)
            .finish_non_exhaustive()
    }
}

impl ReportService {
    #[inline]
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        collectors: Vec<Arc<dyn SourceCollector>>,
        prices: Option<Arc<dyn PriceHistory>>,
    ) -> Result<Self, ConfigError> {
        let template = PromptTemplate::from_config(&config.prompt, config.get_base_dir())?;

        Ok(Self {
            config,
            embedder,
            model,
            collectors,
            prices,
            template,
            run_lock: Mutex::new(()),
        })
    }

    /// Wire up Ollama, the chat endpoint and every source with credentials
    #[inline]
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let embedder: Arc<dyn Embedder> =
            Arc::new(OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?);
        let model: Arc<dyn LanguageModel> = Arc::new(ChatClient::from_config(&config.llm)?);
        let collectors = collectors_from_config(&config.sources)?;
        let prices = price_history_from_config(&config.sources);

        Ok(Self::new(config, embedder, model, collectors, prices)?)
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Produce and persist one report
    #[inline]
    pub async fn generate(
        &self,
        request: &ReportRequest,
        cancel: &CancellationToken,
    ) -> Result<ReportOutcome, ReportError> {
        let _guard = tokio::select! {
            guard = self.run_lock.lock() => guard,
            () = cancel.cancelled() => return Err(ReportError::Cancelled),
        };

        let run_id = Uuid::new_v4();
        let keywords = request.keywords();
        info!("Report run {} started for {:?}", run_id, keywords);

        self.prepare_directories()?;
        let store = ArticleStore::new(self.config.articles_dir());
        clear_collected(&store, &keywords)?;
        check_cancelled(cancel)?;

        let collection = self.collect(&keywords, &store, cancel).await?;
        info!(
            "Collection finished: {}/{} succeeded, {} records",
            collection.succeeded, collection.attempted, collection.records
        );
        check_cancelled(cancel)?;

        let ticker_prices = self.ticker_prices(&request.ticker).await;
        check_cancelled(cancel)?;

        let assembler = ChunkAssembler::new(store.clone(), self.config.chunking.max_words)?;
        let chunks = assembler.assemble(&keywords);
        let chunk_count = chunks.len();
        check_cancelled(cancel)?;

        let index = EmbeddingIndex::build(
            &self.config.embeddings_dir(),
            Arc::clone(&self.embedder),
            &chunks,
        )
        .await?;
        check_cancelled(cancel)?;

        let query = compose_query(&keywords, &request.role, &self.config.retrieval.query_suffix);
        let context = Retriever::new(&index, self.config.retrieval.clone())
            .retrieve(&query, self.config.retrieval.top_k)
            .await?;
        index.close();
        let retrieved_count = context.len();
        info!(
            "Retrieved {} of {} chunks for query '{}'",
            retrieved_count, chunk_count, query
        );

        let articles = load_articles(&store, &keywords);
        let prompt = self.template.render(&self.prompt_fields(
            request,
            &keywords,
            &context,
            &articles,
            &ticker_prices,
        ));
        check_cancelled(cancel)?;

        let raw = self.complete(prompt, cancel).await?;
        let recovered = recover(raw);
        let repaired = recovered.repaired;
        if repaired {
            warn!("Model output needed repair");
        }

        let report = recovered
            .into_object()
            .filter(|map| !map.is_empty())
            .map(LlmReport)
            .ok_or(ReportError::EmptyReport)?;

        let report_path = self.save_report(&keywords, &report)?;
        info!("Report run {} saved to {}", run_id, report_path.display());

        Ok(ReportOutcome {
            run_id,
            report,
            repaired,
            report_path,
            chunk_count,
            retrieved_count,
            collection,
        })
    }

    fn prepare_directories(&self) -> Result<(), ReportError> {
        for dir in [
            self.config.articles_dir(),
            self.config.embeddings_dir(),
            self.config.reports_json_dir(),
            self.config.reports_pdf_dir(),
        ] {
            fs::create_dir_all(&dir)?;
        }

        let removed = purge_reports(&self.config.reports_json_dir())?
            + purge_reports(&self.config.reports_pdf_dir())?;
        debug!("Removed {} previous report files", removed);
        Ok(())
    }

    async fn collect(
        &self,
        keywords: &[String],
        store: &ArticleStore,
        cancel: &CancellationToken,
    ) -> Result<CollectionSummary, ReportError> {
        let semaphore = Arc::new(Semaphore::new(self.config.sources.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for keyword in keywords {
            for collector in &self.collectors {
                let collector = Arc::clone(collector);
                let keyword = keyword.clone();
                let store = store.clone();
                let semaphore = Arc::clone(&semaphore);
                tasks.spawn(async move {
                    let name = collector.name();
                    let result = run_collector(collector, keyword.clone(), store, semaphore).await;
                    (name, keyword, result)
                });
            }
        }

        let mut summary = CollectionSummary {
            attempted: tasks.len(),
            ..CollectionSummary::default()
        };

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(summary.attempted as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Collecting {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };

        loop {
            let joined = tokio::select! {
                joined = tasks.join_next() => joined,
                () = cancel.cancelled() => {
                    tasks.abort_all();
                    bar.finish_and_clear();
                    return Err(ReportError::Cancelled);
                }
            };
            let Some(joined) = joined else {
                break;
            };
            bar.inc(1);

            match joined {
                Ok((name, keyword, Ok(records))) => {
                    bar.set_message(format!("{name} '{keyword}'"));
                    debug!("{} stored {} records for '{}'", name, records, keyword);
                    summary.succeeded += 1;
                    summary.records += records;
                }
                Ok((name, keyword, Err(e))) => {
                    warn!("{} collection failed for '{}': {:#}", name, keyword, e);
                    summary.failures += 1;
                }
                Err(e) => {
                    warn!("Collection task failed: {}", e);
                    summary.failures += 1;
                }
            }
        }

        bar.finish_and_clear();
        Ok(summary)
    }

    async fn ticker_prices(&self, ticker: &str) -> Vec<PricePoint> {
        let ticker = ticker.trim().to_string();
        if ticker.is_empty() || ticker == NO_TICKER {
            return Vec::new();
        }
        let Some(prices) = self.prices.as_ref().map(Arc::clone) else {
            debug!("No price source configured; skipping ticker {}", ticker);
            return Vec::new();
        };

        let days = self.config.sources.price_days;
        let symbol = ticker.clone();
        match tokio::task::spawn_blocking(move || prices.daily_prices(&symbol, days)).await {
            Ok(Ok(points)) => points,
            Ok(Err(e)) => {
                warn!("Failed to fetch prices for {}: {:#}", ticker, e);
                Vec::new()
            }
            Err(e) => {
                warn!("Price task for {} failed: {}", ticker, e);
                Vec::new()
            }
        }
    }

    fn prompt_fields(
        &self,
        request: &ReportRequest,
        keywords: &[String],
        context: &[String],
        articles: &[NewsArticle],
        ticker_prices: &[PricePoint],
    ) -> PromptFields {
        let ticker = request.ticker.trim();
        let language = request.language.trim();

        PromptFields {
            persona_name: request.persona.name.clone(),
            persona_description: request.persona.description.clone(),
            role: request.role.clone(),
            industry: request.industry.clone(),
            region: request.region.clone(),
            company_size: request.company_size.clone(),
            language: if language.is_empty() {
                DEFAULT_LANGUAGE.to_string()
            } else {
                language.to_string()
            },
            keyword: keywords.join(", "),
            date: Local::now().format("%Y-%m-%d").to_string(),
            context: context.join("\n"),
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.model.model_name().to_string()),
            ticker: if ticker.is_empty() {
                NO_TICKER.to_string()
            } else {
                ticker.to_string()
            },
            further_reading: format_further_reading(articles),
            ticker_insight: format_ticker_insight(ticker_prices),
        }
    }

    async fn complete(
        &self,
        prompt: String,
        cancel: &CancellationToken,
    ) -> Result<String, ReportError> {
        let model = Arc::clone(&self.model);
        let task = tokio::task::spawn_blocking(move || model.complete(SYSTEM_PROMPT, &prompt));

        tokio::select! {
            joined = task => match joined {
                Ok(Ok(text)) => Ok(text),
                Ok(Err(e)) => Err(ReportError::Llm(format!("{e:#}"))),
                Err(e) => Err(ReportError::Llm(e.to_string())),
            },
            () = cancel.cancelled() => Err(ReportError::Cancelled),
        }
    }

    fn save_report(&self, keywords: &[String], report: &LlmReport) -> Result<PathBuf, ReportError> {
        let path = self.config.reports_json_dir().join(report_file_name(keywords));
        let content = serde_json::to_string_pretty(report).map_err(io::Error::from)?;
        fs::write(&path, content)?;
        Ok(path)
    }
}

async fn run_collector(
    collector: Arc<dyn SourceCollector>,
    keyword: String,
    store: ArticleStore,
    semaphore: Arc<Semaphore>,
) -> anyhow::Result<usize> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .context("Collection semaphore closed")?;
    tokio::task::spawn_blocking(move || collector.collect(&keyword, &store))
        .await
        .context("Collector task failed")?
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), ReportError> {
    if cancel.is_cancelled() {
        Err(ReportError::Cancelled)
    } else {
        Ok(())
    }
}

/// Drop the previous run's category files so a failed source contributes nothing
fn clear_collected(store: &ArticleStore, keywords: &[String]) -> io::Result<()> {
    for keyword in keywords {
        let removed = store.clear_collected(keyword)?;
        if removed > 0 {
            debug!("Removed {} stale source files for '{}'", removed, keyword);
        }
    }
    Ok(())
}

/// Delete `*.json` and `*.pdf` files directly inside `dir`
fn purge_reports(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_report = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("json" | "pdf")
        );
        if is_report && path.is_file() {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// News articles for every keyword, in keyword order
fn load_articles(store: &ArticleStore, keywords: &[String]) -> Vec<NewsArticle> {
    keywords
        .iter()
        .flat_map(|keyword| {
            match store.load::<Vec<NewsArticle>>(keyword, SourceKind::News) {
                Ok(articles) => articles.unwrap_or_default(),
                Err(e) => {
                    warn!("Skipping news for '{}': {:#}", keyword, e);
                    Vec::new()
                }
            }
        })
        .collect()
}

/// `{keywords joined by _}_report.json`, spaces and path separators replaced
#[inline]
pub fn report_file_name(keywords: &[String]) -> String {
    let stem = keywords.join("_").replace([' ', '/', '\\'], "_");
    format!("{stem}_report.json")
}
