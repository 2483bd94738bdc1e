mod config;
mod db;
mod documents;
mod error;
mod location;
mod models;
mod processor;
mod reminders;
mod session;

use chrono::Utc;
use config::AppConfig;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use documents::FileDocumentStore;
use location::{ManualLocationSource, Permission};
use processor::command_processor::CommandProcessor;
use reminders::{InactivityMonitor, LogNotifier};
use session::assembler::RouteAssembler;
use session::controller::SessionController;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting route recorder...");

    // Init sample buffer
    let pool = db::init_pool(&config.buffer_path()).await?;
    let buffer = db::SampleBuffer::open(pool).await?;
    info!("Opened sample buffer at {}", config.buffer_path().display());

    let source = Arc::new(ManualLocationSource::new(Permission::Granted));
    let store = Arc::new(FileDocumentStore::new(&config.document_root));

    let mut monitor = InactivityMonitor::new(
        Arc::new(LogNotifier),
        config.reminder_threshold(),
        config.reminder_check_interval(),
        Utc::now(),
    );
    monitor.start();

    let mut processor = CommandProcessor {
        source: source.clone(),
        controller: SessionController::new(source, buffer.clone(), config.watch_options()),
        assembler: RouteAssembler::new(buffer, store.clone()),
        store,
        monitor,
        user_id: config.user_id.clone(),
    };

    // Each stdin line is one command or position fix
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        processor.process_line(&line).await;
    }

    processor.shutdown().await;
    info!("Input closed, recorder stopped");

    Ok(())
}
