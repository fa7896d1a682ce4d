mod attribute;
mod cite;
mod config;
mod engine;
mod llm;
mod prompts;
mod render;
mod retrieve;
mod server;
mod sessions;
mod sources;
mod state;

use std::sync::Arc;

use tracing::{info, warn, Level};

use config::AppConfig;
use engine::ChatEngine;
use llm::LlmClient;
use sessions::SessionRegistry;
use sources::SharedLibrary;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let _ = dotenv::dotenv();
    let cfg = AppConfig::from_env();
    info!(bind = %cfg.bind_addr, data_dir = %cfg.data_dir.display(), "starting Terah backend");

    let library = Arc::new(SharedLibrary::new(
        cfg.data_dir.clone(),
        cfg.retrieval.row_cap,
        cfg.fetch_catalog,
    ));
    // Warm the memoized load so the first visitor doesn't pay for it; a
    // failure here still leaves lazy loading to retry per request.
    match library.get_or_load().await {
        Ok(lib) => info!(sources = lib.len(), "reference library ready"),
        Err(e) => warn!(error = %e, "reference preload failed; will retry on first query"),
    }

    let llm_client = Arc::new(LlmClient::new(cfg.llm.clone())?);
    info!(model = %cfg.llm.model, "completion client initialized");

    let engine = Arc::new(ChatEngine::new(
        llm_client,
        library,
        cfg.retrieval.clone(),
        cfg.citation_strategy,
        cfg.proofread,
    ));
    let sessions = Arc::new(SessionRegistry::new(cfg.session_ttl_secs));

    server::run_server(&cfg.bind_addr, AppState { engine, sessions }).await
}
