use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use tracing::{info, warn};

mod character;
mod config;
mod db;
mod error;
mod handlers;
mod llm;
mod pipeline;
mod render;
mod state;
mod storage;
mod tools;
mod utils;

use character::ExampleLibrary;
use config::CONFIG;
use db::database::Database;
use llm::{OpenAiCompletionClient, OpenAiPortraitClient};
use pipeline::GenerationDeps;
use state::AppState;
use storage::StorageLayout;
use tools::object_uploader::ObjectUploader;
use utils::http::get_http_client;
use utils::logging::init_logging;

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {err}");
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let _guards = init_logging();

    if CONFIG.openai_api_key.trim().is_empty() {
        return Err(anyhow!("OPENAI_API_KEY is required"));
    }

    let storage = StorageLayout::under(&CONFIG.storage_root);
    storage
        .ensure_directories()
        .await
        .context("Failed to create output directories")?;

    let examples = ExampleLibrary::load(CONFIG.examples_path.as_deref())?;
    info!(
        "Loaded {} example character sheet(s): {}",
        examples.len(),
        examples
            .entries()
            .iter()
            .map(|entry| entry.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let database = Database::init(&CONFIG.database_url).await?;

    let http = get_http_client().clone();
    let completion = OpenAiCompletionClient::new(
        http.clone(),
        &CONFIG.openai_base_url,
        &CONFIG.openai_api_key,
        &CONFIG.completion_model,
        CONFIG.completion_max_tokens,
        CONFIG.completion_temperature,
    );
    let portraits = OpenAiPortraitClient::new(
        http.clone(),
        &CONFIG.openai_base_url,
        &CONFIG.openai_api_key,
        &CONFIG.image_model,
        &CONFIG.image_size,
        storage.images_dir.clone(),
    );
    let uploader = CONFIG.object_storage.clone().map(|config| {
        info!("Mirroring portraits to bucket {}", config.bucket);
        ObjectUploader::new(http.clone(), config)
    });

    let deps = GenerationDeps {
        completion: Arc::new(completion),
        portraits: Arc::new(portraits),
        examples,
        storage,
        uploader,
        database: Some(database),
        portrait_embed: CONFIG.portrait_embed,
    };
    let state = AppState::new(
        deps,
        Duration::from_secs(CONFIG.rate_limit_seconds),
        CONFIG.default_portrait_count,
    )
    .with_session_limits(CONFIG.session_idle_ttl(), CONFIG.max_sessions);
    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(&CONFIG.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", CONFIG.bind_addr))?;
    info!(
        "Starting D&D Character Forge on http://{} (model={}, images={} {})",
        CONFIG.bind_addr, CONFIG.completion_model, CONFIG.image_model, CONFIG.image_size
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
