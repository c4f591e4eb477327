pub mod api;
pub mod commands;
pub mod config;
pub mod db;
pub mod logging;
pub mod store;
pub mod view;

use anyhow::Context;
use api::BackendClient;
use clap::Parser;
use commands::{Layout, Session};
use config::Config;
use db::Database;
use store::ChatStore;

pub fn run() -> anyhow::Result<()> {
    let config = Config::parse();
    let data_dir = config.data_dir()?;
    let _log_guard = logging::init_logging(&config.log_filter, &config.log_dir()?);

    let database = Database::new(&data_dir)
        .with_context(|| format!("Failed to open database in {}", data_dir.display()))?;
    let backend = BackendClient::new(&config.backend_url)?;
    let store = ChatStore::load(database, backend)?;
    tracing::info!(backend = %config.backend_url, data = ?data_dir, "starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(async {
        let cancel = store.cancel_handle();
        // Stops a streaming answer; at the prompt the session itself exits.
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received");
                cancel.cancel();
            }
        });

        let layout = Layout {
            width: config.width,
            history_lines: config.history_lines,
        };
        let input = tokio::io::BufReader::new(tokio::io::stdin());
        let mut session = Session::new(store, layout, input, std::io::stdout());
        session.run().await
    });
    // A stdin read may still be parked on a blocking thread.
    runtime.shutdown_background();
    result?;

    tracing::info!("session ended");
    Ok(())
}
