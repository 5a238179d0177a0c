
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use super::{ArticleStore, PriceHistory, PricePoint, SourceCollector, SourceKind};
use crate::config::SourcesConfig;
use crate::http::{agent_with_timeout, request_with_retry};

/// Alpha Vantage symbol search and daily adjusted price series
#[derive(Debug, Clone)]
pub struct AlphaVantageClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
    days: usize,
    retry_attempts: u32,
}

#[derive(Debug, Deserialize)]
struct SymbolSearchResponse {
    #[serde(rename = "bestMatches", default)]
    best_matches: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct DailySeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    series: Option<BTreeMap<String, BTreeMap<String, String>>>,
}

impl AlphaVantageClient {
    #[inline]
    pub fn new(config: &SourcesConfig, api_key: String) -> Self {
        Self {
            agent: agent_with_timeout(Duration::from_secs(config.timeout_seconds)),
            base_url: config.alpha_vantage_url.clone(),
            api_key,
            days: config.price_days,
            retry_attempts: config.retry_attempts,
        }
    }

    fn query(&self, params: &[(&str, &str)]) -> Result<String> {
        let body = request_with_retry(&self.base_url, self.retry_attempts, || {
            params
                .iter()
                .fold(self.agent.get(self.base_url.as_str()), |req, (k, v)| {
                    req.query(*k, *v)
                })
                .query("apikey", self.api_key.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        // Rate limiting and bad parameters come back as 200 with a message body
        let value: serde_json::Value =
            serde_json::from_str(&body).context("Failed to parse Alpha Vantage response")?;
        for key in ["Error Message", "Note", "Information"] {
            if let Some(message) = value.get(key).and_then(|m| m.as_str()) {
                return Err(anyhow!("Alpha Vantage: {}", message));
            }
        }

        Ok(body)
    }

    /// Best-matching ticker symbol for a company name or keyword
    #[inline]
    pub fn search_symbol(&self, keyword: &str) -> Result<Option<String>> {
        let body = self
            .query(&[("function", "SYMBOL_SEARCH"), ("keywords", keyword)])
            .with_context(|| format!("Symbol search failed for '{}'", keyword))?;

        let response: SymbolSearchResponse =
            serde_json::from_str(&body).context("Failed to parse symbol search response")?;

        Ok(response
            .best_matches
            .into_iter()
            .next()
            .and_then(|mut best| best.remove("1. symbol")))
    }
}

impl PriceHistory for AlphaVantageClient {
    #[inline]
    fn daily_prices(&self, symbol: &str, days: usize) -> Result<Vec<PricePoint>> {
        let body = self
            .query(&[
                ("function", "TIME_SERIES_DAILY_ADJUSTED"),
                ("symbol", symbol),
                ("outputsize", "compact"),
                ("datatype", "json"),
            ])
            .with_context(|| format!("Daily series request failed for {}", symbol))?;

        let response: DailySeriesResponse =
            serde_json::from_str(&body).context("Failed to parse daily series response")?;

        let series = response
            .series
            .ok_or_else(|| anyhow!("No daily series returned for {}", symbol))?;

        let points = series
            .into_iter()
            .rev()
            .take(days)
            .map(|(date, values)| parse_point(date, &values))
            .collect::<Result<Vec<_>>>()?;

        debug!("Fetched {} daily prices for {}", points.len(), symbol);
        Ok(points)
    }
}

fn parse_point(date: String, values: &BTreeMap<String, String>) -> Result<PricePoint> {
    let field = |name: &str| -> Result<f64> {
        values
            .get(name)
            .ok_or_else(|| anyhow!("Missing '{}' for {}", name, date))?
            .parse::<f64>()
            .with_context(|| format!("Invalid '{}' for {}", name, date))
    };

    let volume = values
        .get("6. volume")
        .ok_or_else(|| anyhow!("Missing volume for {}", date))?
        .parse::<u64>()
        .with_context(|| format!("Invalid volume for {}", date))?;

    Ok(PricePoint {
        open: field("1. open")?,
        high: field("2. high")?,
        low: field("3. low")?,
        close: field("4. close")?,
        adjusted_close: field("5. adjusted close")?,
        volume,
        date,
    })
}

impl SourceCollector for AlphaVantageClient {
    #[inline]
    fn name(&self) -> &'static str {
        "stock"
    }

    #[inline]
    fn collect(&self, keyword: &str, store: &ArticleStore) -> Result<usize> {
        let Some(symbol) = self.search_symbol(keyword)? else {
            debug!("No ticker symbol matches '{}'", keyword);
            return Ok(0);
        };

        let points = self.daily_prices(&symbol, self.days)?;
        let path = store.save(keyword, SourceKind::Stock, &points)?;
        info!(
            "Saved {} daily prices for {} to {}",
            points.len(),
            symbol,
            path.display()
        );
        Ok(points.len())
    }
}
