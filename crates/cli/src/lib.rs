//! Command-line surface: argument parsing, logging bootstrap, and the
//! wiring that turns configuration into a running agent.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use tabletalk_agent::{
    run_interactive, AnthropicClient, OneShotRunner, Renderer, Session, SessionStore,
};
use tabletalk_agent::prompt::{ALLOWED_TOOLS, SYSTEM_PROMPT};
use tabletalk_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use tabletalk_core::DatasetLoader;
use tabletalk_tools::{CalculateTotal, FilterByValue, GetTopN, ToolRegistry, ValidateData};

/// Conversational analysis over a product revenue dataset.
///
/// With a query argument the agent answers once and saves its run state;
/// without one it starts an interactive session.
#[derive(Debug, Parser)]
#[command(name = "tabletalk", version, about)]
pub struct Cli {
    /// Path to a TOML config file (default: tabletalk.toml if present).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Dataset CSV path, overriding config and DATA_PATH.
    #[arg(long, value_name = "FILE")]
    pub data_path: Option<PathBuf>,

    /// Log level for the log file (trace|debug|info|warn|error).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// One-shot question. Leave empty for interactive mode.
    #[arg(trailing_var_arg = true)]
    pub query: Vec<String>,
}

impl Cli {
    pub fn load_config(&self) -> Result<AppConfig, tabletalk_core::ConfigError> {
        AppConfig::load(LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                data_path: self.data_path.clone(),
                log_level: self.log_level.clone(),
            },
        })
    }

    pub fn one_shot_query(&self) -> Option<String> {
        let joined = self.query.join(" ");
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Installs console + file logging. The console stays quiet (warnings
/// only); full detail goes to a daily-rolling file. The returned guard
/// must live as long as the process so buffered lines get flushed.
pub fn init_logging(
    config: &AppConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, anyhow::Error> {
    let file_appender = tracing_appender::rolling::daily(&config.logging.dir, "tabletalk.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter = EnvFilter::try_new(&config.logging.level)
        .context("invalid log level in configuration")?;
    let file_layer = match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_filter(file_filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_filter(file_filter)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_filter(file_filter)
            .boxed(),
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry().with(file_layer).with(console_layer).init();
    Ok(guard)
}

pub fn build_registry(config: &AppConfig) -> ToolRegistry {
    let loader = || DatasetLoader::new(config.dataset.path.clone());
    let mut registry = ToolRegistry::default();
    registry.register(ValidateData::new(loader()));
    registry.register(CalculateTotal::new(loader()));
    registry.register(GetTopN::new(loader()));
    registry.register(FilterByValue::new(loader()));
    registry
}

fn build_client(
    config: &AppConfig,
    registry: Arc<ToolRegistry>,
) -> Result<Arc<AnthropicClient>, anyhow::Error> {
    let client = AnthropicClient::new(
        &config.reasoning,
        registry,
        config.state.transcripts_dir(),
    )
    .context("could not create reasoning client")?;
    Ok(Arc::new(client))
}

/// Warns about misconfiguration that will not fail until first use.
pub fn preflight(config: &AppConfig) {
    if config.reasoning.api_key.is_none() {
        warn!("no API key configured; set ANTHROPIC_API_KEY or CLAUDE_API_KEY");
        eprintln!("Warning: no API key configured (set ANTHROPIC_API_KEY or CLAUDE_API_KEY).");
    }
    if !config.dataset.path.exists() {
        warn!(path = %config.dataset.path.display(), "dataset file not found");
        eprintln!(
            "Warning: dataset not found at {}; tools will report errors.",
            config.dataset.path.display()
        );
    }
}

pub async fn run(cli: Cli) -> Result<(), anyhow::Error> {
    let config = cli.load_config().context("could not load configuration")?;
    let _log_guard = init_logging(&config)?;
    preflight(&config);

    let registry = Arc::new(build_registry(&config));
    info!(tools = ?registry.names(), dataset = %config.dataset.path.display(), "starting");
    let client = build_client(&config, registry)?;

    match cli.one_shot_query() {
        Some(query) => {
            let runner = OneShotRunner::new(
                client,
                &config.state,
                SYSTEM_PROMPT,
                ALLOWED_TOOLS.iter().map(|tool| tool.to_string()).collect(),
                config.reasoning.max_turns,
            );
            let mut renderer = Renderer::stdout();
            let outcome = runner.run(&query, &mut renderer).await?;
            println!("[Saved state] to {}", outcome.archived_path.display());
            println!("[Saved state] to {}", outcome.latest_path.display());
        }
        None => {
            let store = SessionStore::new(&config.state);
            let mut session = Session::new(
                client,
                store,
                SYSTEM_PROMPT,
                ALLOWED_TOOLS.iter().map(|tool| tool.to_string()).collect(),
                config.reasoning.max_turns,
            );
            run_interactive(&mut session).await?;
        }
    }

    Ok(())
}
