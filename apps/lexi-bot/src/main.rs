mod config;
mod events;
mod handlers;
mod session;
mod signals;
mod store;
mod words;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lexi_otel::LogOptions;
use lexi_queue::SerialQueue;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::config::{BotConfig, ConfigArgs};
use crate::handlers::Bot;
use crate::session::Session;
use crate::signals::ShutdownSignal;
use crate::store::UserStore;
use crate::words::WordList;

#[derive(Parser)]
#[command(
    name = "lexi-bot",
    version,
    about = "Vocabulary word bot; every user event runs on one serial queue"
)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,
    /// Read events from this file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,
    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = BotConfig::resolve(&cli.config)?;
    if cli.print_config {
        println!("{}", toml::to_string_pretty(&cfg)?);
        return Ok(());
    }

    let mut log = LogOptions::from_env();
    if let Some(dir) = &cfg.log_dir {
        log = log.with_log_dir(dir);
    }
    lexi_otel::init(&log);
    lexi_otel::mark_restart();

    let words = WordList::load(&cfg.words_path)?;
    let store = UserStore::open(&cfg.store_path).await;
    tracing::info!(
        words = words.len(),
        users = store.len(),
        store = %cfg.store_path.display(),
        queue = %cfg.queue.name,
        "bot ready"
    );

    let queue = SerialQueue::new(cfg.queue.clone())?;
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_replies(rx));
    let session = Session::new(queue, Bot::new(words, cfg.hard_unlock_threshold), store, tx);

    let shutdown = ShutdownSignal::install();
    let result = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening input {}", path.display()))?;
            session::run(
                &session,
                BufReader::new(file),
                cfg.save_interval(),
                shutdown.recv(),
            )
            .await
        }
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            session::run(&session, stdin, cfg.save_interval(), shutdown.recv()).await
        }
    };
    tracing::info!(stats = ?session.queue().stats(), "queue drained; exiting");
    drop(session);
    printer.await.context("reply printer")??;
    result
}

async fn print_replies(mut rx: mpsc::UnboundedReceiver<String>) -> std::io::Result<()> {
    let mut out = tokio::io::stdout();
    while let Some(line) = rx.recv().await {
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
    }
    Ok(())
}
