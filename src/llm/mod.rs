// Language model access
// Chat-completion client, prompt template and response recovery

pub mod client;
pub mod prompt;
pub mod recovery;

pub use client::ChatClient;
pub use prompt::{PromptFields, PromptTemplate};
pub use recovery::{RawResponse, Recovered, recover};

use anyhow::Result;

pub const SYSTEM_PROMPT: &str = "You are a helpful, concise financial analyst who generates structured JSON reports from data and persona context.";

/// A text-in, text-out model
///
/// Calls are blocking; async callers run them on a blocking worker.
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}
