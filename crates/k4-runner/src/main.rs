//! # k4-runner
//!
//! Entry point for the market-data sink writers.
//!
//! Loads a JSON configuration file, builds one writer per configured sink,
//! and feeds them newline-delimited JSON events read from stdin.
//!
//! # Usage
//!
//! ```bash
//! k4-runner config.json --log-level info < events.ndjson
//! ```
//!
//! End of input closes every writer queue; writers publish what is queued
//! and exit. Ctrl+C stops writers after their in-flight batch. A fatal
//! writer error stops the process with a non-zero status.

mod feed;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use k4_core::error::K4Error;
use tokio::io::BufReader;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::feed::{Router, run_feed};

/// Market-data sink writer runner.
#[derive(Parser)]
#[command(name = "k4-runner", about = "Market-data sink writer runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Optional log directory for file output. Overrides the config file.
    #[arg(long)]
    log_dir: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json: bool,
}

type WriterExit = (String, Result<(), K4Error>);

/// Log one writer exit; returns its fatal error, if any.
fn report(joined: Result<WriterExit, JoinError>) -> Option<anyhow::Error> {
    match joined {
        Ok((label, Ok(()))) => {
            info!("writer '{label}' stopped");
            None
        }
        Ok((label, Err(e))) => {
            error!("writer '{label}' failed: {e}");
            Some(e.into())
        }
        Err(e) => {
            error!("writer task aborted: {e}");
            Some(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration and initialize logging
    let config = k4_core::config::load_config(&cli.config)?;
    let level = cli.log_level.or(config.log.level.clone()).unwrap_or_else(|| "info".to_owned());
    let log_dir = cli.log_dir.or(config.log.dir.clone());
    k4_core::logging::init_logging(&level, log_dir.as_deref(), "k4-runner", cli.json || config.log.json);

    info!("k4-runner starting, config={}, log_level={level}", cli.config.display());
    info!("config loaded, {} sink(s)", config.sinks.len());

    // 2. Build writers; any configuration error is fatal
    let mut writers = Vec::with_capacity(config.sinks.len());
    for (idx, sink) in config.sinks.iter().enumerate() {
        match k4_sink::create_writer(sink) {
            Ok(w) => writers.push((w, sink.effective_queue_capacity())),
            Err(e) => {
                error!("sink[{idx}]: {e}");
                return Err(e.into());
            }
        }
    }

    // 3. Start one task per writer
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut router = Router::new();
    let mut tasks: JoinSet<WriterExit> = JoinSet::new();
    for (mut writer, capacity) in writers {
        let (tx, queue) = k4_sink::queue(capacity);
        router.add(writer.kind(), writer.label(), tx);
        let shutdown = stop_rx.clone();
        tasks.spawn(async move {
            let res = writer.run(queue, shutdown).await;
            (writer.label().to_owned(), res)
        });
    }
    info!("{} writer(s) started, reading events from stdin", router.len());

    // 4. Feed until EOF, Ctrl+C, or a writer stops on its own
    let mut failure = None;
    tokio::select! {
        stats = run_feed(BufReader::new(tokio::io::stdin()), &router, stop_rx.clone()) => match stats {
            Ok(s) => info!(
                "feed finished: {} event(s), {} delivered, {} unrouted, {} malformed",
                s.events, s.delivered, s.unrouted, s.malformed
            ),
            Err(e) => {
                error!("feed failed: {e}");
                stop_tx.send_replace(true);
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            stop_tx.send_replace(true);
        }
        Some(joined) = tasks.join_next() => {
            failure = report(joined);
            if failure.is_some() {
                warn!("stopping remaining writers");
                stop_tx.send_replace(true);
            }
        }
    }

    // 5. Close queues and wait for writers to drain
    drop(router);
    while let Some(joined) = tasks.join_next().await {
        if let Some(e) = report(joined) {
            failure.get_or_insert(e);
        }
    }

    match failure {
        Some(e) => Err(e),
        None => {
            info!("all writers stopped, goodbye");
            Ok(())
        }
    }
}
