use thiserror::Error;

pub type Result<T> = std::result::Result<T, BriefError>;

#[derive(Error, Debug)]
pub enum BriefError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Index error: {0}")]
    Index(#[from] index::IndexError),

    #[error("Report error: {0}")]
    Report(#[from] report::ReportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod api;
pub mod assembler;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod http;
pub mod index;
pub mod llm;
pub mod report;
pub mod retrieval;
pub mod sources;
