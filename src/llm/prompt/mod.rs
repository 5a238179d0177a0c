// Prompt template
// `{name}` placeholders, `{{` and `}}` for literal braces


use serde_json::json;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::config::{ConfigError, PromptConfig};
use crate::sources::{NewsArticle, PricePoint};

const BUILTIN_TEMPLATE: &str = include_str!("prompt.txt");

pub const PLACEHOLDERS: [&str; 14] = [
    "persona_name",
    "persona_description",
    "role",
    "industry",
    "region",
    "companySize",
    "language",
    "keyword",
    "date",
    "context",
    "model",
    "ticker",
    "further_reading",
    "ticker_insight",
];

const NO_TITLE: &str = "No title";
const NO_LINK: &str = "#";
const DEFAULT_READING_SUMMARY: &str = "Relevant to today's market movements.";
const NO_TICKER_DATA: &str = "No recent stock performance data available.";

/// Values substituted into the template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptFields {
    pub persona_name: String,
    pub persona_description: String,
    pub role: String,
    pub industry: String,
    pub region: String,
    pub company_size: String,
    pub language: String,
    pub keyword: String,
    pub date: String,
    pub context: String,
    pub model: String,
    pub ticker: String,
    pub further_reading: String,
    pub ticker_insight: String,
}

impl PromptFields {
    fn value(&self, name: &str) -> Option<&str> {
        let value = match name {
            "persona_name" => &self.persona_name,
            "persona_description" => &self.persona_description,
            "role" => &self.role,
            "industry" => &self.industry,
            "region" => &self.region,
            "companySize" => &self.company_size,
            "language" => &self.language,
            "keyword" => &self.keyword,
            "date" => &self.date,
            "context" => &self.context,
            "model" => &self.model,
            "ticker" => &self.ticker,
            "further_reading" => &self.further_reading,
            "ticker_insight" => &self.ticker_insight,
            _ => return None,
        };
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed, validated prompt template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// The template shipped with the crate
    #[inline]
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::parse(BUILTIN_TEMPLATE)
    }

    #[inline]
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::MissingTemplate(path.to_path_buf()));
        }
        let source = fs::read_to_string(path)?;
        debug!("Loaded prompt template from {}", path.display());
        Self::parse(&source)
    }

    /// Custom template when configured, otherwise the built-in one.
    ///
    /// A relative `template_path` is resolved against `base_dir`.
    #[inline]
    pub fn from_config(config: &PromptConfig, base_dir: &Path) -> Result<Self, ConfigError> {
        match &config.template_path {
            Some(path) if path.is_absolute() => Self::from_file(path),
            Some(path) => Self::from_file(&base_dir.join(path)),
            None => Self::builtin(),
        }
    }

    /// Parse `source`, rejecting unknown placeholders and unbalanced braces
    #[inline]
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => {
                                return Err(ConfigError::InvalidTemplate(format!(
                                    "unterminated placeholder '{{{}'",
                                    name
                                )));
                            }
                            Some(ch) => name.push(ch),
                        }
                    }
                    if !PLACEHOLDERS.contains(&name.as_str()) {
                        return Err(ConfigError::InvalidTemplate(format!(
                            "unknown placeholder '{{{}}}'",
                            name
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name));
                }
                '}' => {
                    return Err(ConfigError::InvalidTemplate(
                        "unmatched '}' (use '}}' for a literal brace)".to_string(),
                    ));
                }
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Fill every placeholder
    #[inline]
    pub fn render(&self, fields: &PromptFields) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Placeholder(name) => fields.value(name).unwrap_or_default(),
            })
            .collect()
    }
}

/// JSON list of the first two articles for the "further reading" section
#[inline]
pub fn format_further_reading(articles: &[NewsArticle]) -> String {
    let entries: Vec<serde_json::Value> = articles
        .iter()
        .take(2)
        .map(|article| {
            json!({
                "title": non_empty_or(&article.title, NO_TITLE),
                "link": non_empty_or(&article.url, NO_LINK),
                "summary": non_empty_or(&article.description, DEFAULT_READING_SUMMARY),
            })
        })
        .collect();

    serde_json::Value::Array(entries).to_string()
}

/// Plain-text price summary for the ticker section
#[inline]
pub fn format_ticker_insight(prices: &[PricePoint]) -> String {
    if prices.is_empty() {
        return NO_TICKER_DATA.to_string();
    }

    let lines: Vec<String> = prices
        .iter()
        .map(|p| {
            format!(
                "{}: Open={}, Close={}, Volume={}",
                p.date, p.open, p.close, p.volume
            )
        })
        .collect();

    format!("Recent 30-day stock performance:\n{}", lines.join("\n"))
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}
