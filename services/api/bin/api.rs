//! Main Entrypoint for the Tutor API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the provider adapters and the turn orchestrator.
//! 3. Constructing the Axum router.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use std::{collections::HashMap, fs, net::SocketAddr, path::Path, sync::Arc};
use tracing::{info, warn};
use tutor_api::{
    config::Config,
    provider::{build_responder, build_synthesizer, build_transcriber, http_client},
    router::create_router,
    state::AppState,
};
use tutor_core::{orchestrator::TurnOrchestrator, prompt::PromptBuilder};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// A helper function to load prompts from a directory.
fn load_prompts(prompts_path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in fs::read_dir(prompts_path)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

fn prompt_builder(prompts_path: &Path) -> PromptBuilder {
    match load_prompts(prompts_path) {
        Ok(mut prompts) => match prompts.remove("tutor_persona") {
            Some(persona) => PromptBuilder::new(persona.trim()),
            None => {
                warn!(path = %prompts_path.display(), "tutor_persona.md not found, using built-in persona");
                PromptBuilder::default()
            }
        },
        Err(e) => {
            warn!(path = %prompts_path.display(), error = %e, "Could not read prompts directory, using built-in persona");
            PromptBuilder::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing providers...");

    // --- 3. Initialize Shared Services ---
    let http = http_client(config.provider_timeout).context("Failed to build HTTP client")?;
    let transcriber = build_transcriber(&config, http.clone())?;
    let responder = build_responder(&config, http.clone())?;
    let synthesizer = build_synthesizer(&config, http)?;

    let orchestrator = TurnOrchestrator::new(
        transcriber.clone(),
        responder.clone(),
        synthesizer.clone(),
        prompt_builder(&config.prompts_path),
    );
    let app_state = Arc::new(AppState::new(orchestrator));

    // --- 4. Create Router ---
    let app = create_router(app_state);

    // --- 5. Start Server ---
    info!(
        transcriber = transcriber.name(),
        responder = responder.name(),
        synthesizer = synthesizer.name(),
        model = %config.chat_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
