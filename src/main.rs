//! query-constructor CLI
//!
//! Resolves questions given as arguments, or one per stdin line, and prints
//! the SQL for each.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use query_constructor::llm::OllamaClient;
use query_constructor::{ConstructorConfig, QueryConstructor};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Learned question-to-SQL constructor for video statistics
#[derive(Parser, Debug)]
#[command(name = "query-constructor")]
#[command(version, about, long_about = None)]
struct Args {
    /// Questions to resolve; read from stdin when none are given
    questions: Vec<String>,

    /// JSON configuration file (defaults to environment variables)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Never call the fallback model
    #[arg(long)]
    no_llm: bool,

    /// Teach a pair, written as "QUESTION | SQL"; repeatable
    #[arg(long, value_name = "QUESTION | SQL")]
    learn: Vec<String>,

    /// Print counters and store sizes as JSON
    #[arg(long)]
    stats: bool,

    /// Clear the exact cache
    #[arg(long)]
    clear: bool,

    /// Remove every pattern and cached answer
    #[arg(long)]
    reset: bool,

    /// Print how each question was answered next to the SQL
    #[arg(long)]
    explain: bool,

    /// Seconds between background flushes
    #[arg(long, default_value_t = 30)]
    flush_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL"))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => ConstructorConfig::from_file(path)?,
        None => ConstructorConfig::from_env()?,
    };
    if args.no_llm {
        config.fallback.enabled = false;
    }

    if config.fallback.enabled {
        let client = OllamaClient::new(&config.fallback)?;
        if !client.health_check().await {
            warn!(url = %config.fallback.base_url, "Ollama server not reachable, fallback calls will fail");
        }
    }

    let constructor = Arc::new(QueryConstructor::new(config)?);
    let allow_fallback = !args.no_llm;

    if args.reset {
        constructor.reset();
        println!("store reset");
    } else if args.clear {
        constructor.clear_cache();
        println!("exact cache cleared");
    }

    for pair in &args.learn {
        let (question, sql) = pair
            .split_once('|')
            .with_context(|| format!("--learn expects \"QUESTION | SQL\", got: {pair}"))?;
        match constructor.add_manual_pattern(question, sql) {
            Some(outcome) => println!("learned pattern {} (count {})", outcome.key, outcome.count),
            None => println!("cached exactly; question has no pattern words"),
        }
    }

    let commands_only = args.reset || args.clear || args.stats || !args.learn.is_empty();
    if !args.questions.is_empty() {
        for question in &args.questions {
            answer(&constructor, question, allow_fallback, args.explain).await;
        }
    } else if !commands_only {
        let autoflush = constructor.spawn_autoflush(Duration::from_secs(args.flush_interval.max(1)));
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
            if line.trim().is_empty() {
                continue;
            }
            answer(&constructor, &line, allow_fallback, args.explain).await;
        }
        autoflush.abort();
    }

    let report = constructor.flush()?;
    info!(exact = report.exact_entries, patterns = report.patterns, "store flushed");

    if args.stats {
        println!("{}", serde_json::to_string_pretty(&constructor.stats())?);
    }

    Ok(())
}

async fn answer(constructor: &QueryConstructor, question: &str, allow_fallback: bool, explain: bool) {
    let resolution = constructor.resolve_detailed(question, allow_fallback).await;
    if explain {
        println!("[{}] {}", resolution.outcome.label(), resolution.sql);
    } else {
        println!("{}", resolution.sql);
    }
}
