use clap::{Parser, ValueEnum};
use color_eyre::Result;
use std::path::PathBuf;
use tracing::error;

use datachat::config::{Config, PlannerProvider};
use datachat::repl::Session;

/// Conversational terminal data analyst
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable file logging at the given level (overrides RUST_LOG)
    #[arg(long = "logging", value_enum)]
    logging: Option<LogLevel>,
    /// Path to a config file (overrides default config discovery)
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Load a CSV dataset before the first turn
    #[arg(long = "load", value_name = "PATH")]
    load: Option<PathBuf>,
    /// Planner provider override
    #[arg(long = "provider", value_enum)]
    provider: Option<ProviderArg>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ProviderArg {
    Ollama,
    Openai,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    // Log to a file next to the session; the terminal stays clean for results.
    let cwd = std::env::current_dir()?;
    let level = match args.logging {
        Some(LogLevel::Error) => Some(tracing::Level::ERROR),
        Some(LogLevel::Warn) => Some(tracing::Level::WARN),
        Some(LogLevel::Info) => Some(tracing::Level::INFO),
        Some(LogLevel::Debug) => Some(tracing::Level::DEBUG),
        Some(LogLevel::Trace) => Some(tracing::Level::TRACE),
        None => Some(tracing::Level::WARN),
    };
    datachat::logging::init_with(Some(cwd.join("datachat.log")), level)?;

    let mut config = match Config::from_path(args.config.as_ref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "config load failed, falling back to defaults");
            eprintln!("config error: {e}; using defaults");
            Config::default()
        }
    };
    if let Some(provider) = args.provider {
        config.planner.provider = match provider {
            ProviderArg::Ollama => PlannerProvider::Ollama,
            ProviderArg::Openai => PlannerProvider::OpenAI,
        };
    }

    let mut session = Session::new(&config)?;
    println!("datachat — conversational data analyst");
    println!("operations: {}", session.operation_names().join(", "));

    if let Some(path) = &args.load {
        let result = session.load_dataset(&path.to_string_lossy());
        println!("{:#}", result.to_value());
    }

    println!("\nType your request (or 'exit'):");
    session.run()
}
