// src/main.rs

use anyhow::Context;
use keychat::cli;
use keychat::config::Config;
use keychat::error::{ConfigurationError, Result};
use keychat::keys::{self, KeyPool};
use keychat::llm::gemini::GeminiClient;
use keychat::session::Session;
use reqwest::Client;
use std::process::ExitCode;
use tracing::{error, info};

const KEYS_URL: &str = "https://aistudio.google.com/app/apikey";

// Silent unless RUST_LOG holds usable directives; the REPL prints its own diagnostics.
#[cfg(feature = "logging")]
fn log_filter(directives: Option<&str>) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;

    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("off"))
}

#[cfg(feature = "logging")]
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(log_filter(directives.as_deref()))
        .init();
}

#[cfg(not(feature = "logging"))]
fn init_tracing() {}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("Application error: {:?}", e);
            eprintln!("\n[ERROR] {:#}", e);
            if let Some(ConfigurationError::NoKeys(_)) = e.downcast_ref::<ConfigurationError>() {
                eprintln!("[INFO] Get your API key at: {}", KEYS_URL);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    info!("Starting keychat...");

    // Reads .env first, then the process environment
    let config = Config::load().context("Failed to load configuration")?;

    // First run: leave an instructional key file behind and stop
    if keys::create_template(&config.keys_file)
        .with_context(|| format!("Failed to create {}", config.keys_file.display()))?
    {
        println!("\n[INFO] Created {}", config.keys_file.display());
        println!("       Put your API keys there (one per line) and run again");
        println!("       {}\n", KEYS_URL);
        return Ok(ExitCode::SUCCESS);
    }

    let pool = KeyPool::from_file(&config.keys_file)?;
    info!(keys = pool.len(), "Loaded API keys");

    let http = Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let client = GeminiClient::new(http, &config.api_base_url, config.request_timeout());

    let model = Session::choose_model(&client, &pool, &config).await;
    let mut session = Session::new(client, pool, model, &config);

    cli::repl::run_interactive(&mut session).await?;
    Ok(ExitCode::SUCCESS)
}
