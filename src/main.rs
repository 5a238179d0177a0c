use clap::{Parser, Subcommand};
use market_brief::Result;
use market_brief::commands::{generate_report, search_index, serve_api};
use market_brief::config::{Config, run_interactive_config, show_config};
use market_brief::report::{Persona, ReportRequest};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "market-brief")]
#[command(about = "Collects market signals for a persona's interests and writes an LLM-generated brief")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, collected articles, the index and reports
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama, the chat model and source credentials
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Generate a report for a persona
    Generate {
        /// Persona name
        #[arg(long)]
        name: String,
        /// Persona description
        #[arg(long, default_value = "")]
        description: String,
        /// Topic to collect and report on; repeat for several
        #[arg(long = "interest", required = true)]
        interests: Vec<String>,
        #[arg(long, default_value = "")]
        role: String,
        #[arg(long, default_value = "")]
        industry: String,
        #[arg(long, default_value = "")]
        region: String,
        #[arg(long, default_value = "")]
        company_size: String,
        /// Ticker whose recent prices are summarised, e.g. AAPL
        #[arg(long, default_value = "")]
        ticker: String,
        #[arg(long, default_value = "English")]
        language: String,
        /// Model name shown in the report prompt
        #[arg(long)]
        model: Option<String>,
    },
    /// Search the index built by the last run
    Search {
        query: String,
        /// Number of results
        #[arg(short, default_value_t = 5)]
        k: usize,
    },
    /// Serve the report API over HTTP
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => Config::default_base_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&base_dir)?;
            } else {
                run_interactive_config(&base_dir)?;
            }
        }
        Commands::Generate {
            name,
            description,
            interests,
            role,
            industry,
            region,
            company_size,
            ticker,
            language,
            model,
        } => {
            let request = ReportRequest {
                persona: Persona {
                    name,
                    description,
                    interests,
                },
                company_size,
                industry,
                region,
                role,
                ticker,
                language,
                model,
                callback_url: None,
            };
            generate_report(&base_dir, request).await?;
        }
        Commands::Search { query, k } => {
            search_index(&base_dir, &query, k).await?;
        }
        Commands::Serve { host, port } => {
            serve_api(&base_dir, &host, port).await?;
        }
    }

    Ok(())
}
