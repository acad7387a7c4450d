// filechat - Performance-metric batching and AI response caching over Supabase
// Author: kelexine (https://github.com/kelexine)

use anyhow::Result;
use clap::Parser;
use filechat::cache::cache_key;
use filechat::cli::{Args, Command};
use filechat::config::AppConfig;
use filechat::metrics::{gather_metrics, PerformanceMetric};
use filechat::utils::logging;
use filechat::FileChat;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration
    let config = match &args.config {
        Some(path) => AppConfig::load_from(path, true)?,
        None => AppConfig::load()?,
    };

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    info!("Starting filechat v{}", env!("CARGO_PKG_VERSION"));

    // Phase 3: Run the command
    match args.command {
        Command::Key { prompt, provider, metadata } => {
            println!("{}", cache_key(&prompt, &provider, &metadata)?);
        }
        command => {
            let app = FileChat::connect(&config)?;
            let result = run(&app, command).await;

            // Phase 4: Final flush and teardown
            let outcome = app.shutdown().await;
            info!("Final metric flush: {:?}", outcome);
            result?;
        }
    }

    if args.show_metrics {
        print!("{}", gather_metrics());
    }

    Ok(())
}

async fn run(app: &FileChat, command: Command) -> Result<()> {
    match command {
        Command::Key { prompt, provider, metadata } => {
            println!("{}", cache_key(&prompt, &provider, &metadata)?);
        }
        Command::Get { prompt, provider, user, metadata } => {
            let found = app
                .cache()
                .get_cached_response(&prompt, &provider, &user, &metadata)
                .await;
            println!("{}", serde_json::to_string_pretty(&found)?);
        }
        Command::Put { prompt, response, provider, user, tokens, cost, metadata } => {
            app.cache()
                .set_cached_response(&prompt, &response, &provider, tokens, cost, &user, &metadata)
                .await;
            println!("{}", cache_key(&prompt, &provider, &metadata)?);
        }
        Command::Record { operation, duration_ms, failed, error, cache_hit } => {
            let mut metric = PerformanceMetric::new(operation, Duration::from_millis(duration_ms), !failed);
            metric.error = error;
            metric.cache_hit = cache_hit;
            app.batcher().record_metric(metric);
        }
        Command::Purge => match app.cache().purge_remote_expired().await {
            Some(removed) => println!("Removed {} expired rows", removed),
            None => anyhow::bail!("Remote cache sweep failed, see logs"),
        },
    }
    Ok(())
}
