use anyhow::{Context, Result};
use clap::Parser;
use gemini_live::LiveConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use textbook_api::config::{Config, StorageBackend};
use textbook_api::gemini_adapter::GeminiSpeechConnector;
use textbook_api::prompt_loader::resolve_prompts;
use textbook_api::ws::{AppState, router};
use textbook_core::gemini_rest::GeminiRestClient;
use textbook_core::services::{MediaStorage, Services};
use textbook_core::storage::{GcsStorage, LocalStorage};
use textbook_core::{Pipeline, PipelineSettings};
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
struct Cli {
    /// Address to listen on; overrides BIND_ADDRESS
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// Directory of `<name>.md` prompt overrides; overrides PROMPTS_DIR
    #[arg(long)]
    prompts_dir: Option<PathBuf>,
}

fn build_services(config: &Config) -> Services {
    let gemini = Arc::new(
        GeminiRestClient::new(
            config.gemini_api_key.clone(),
            config.flash_model.clone(),
            config.imagen_model.clone(),
        )
        .with_base_url(&config.gemini_api_base),
    );

    let storage: Arc<dyn MediaStorage> = match &config.storage {
        StorageBackend::Local => Arc::new(LocalStorage::new(
            config.media_dir.clone(),
            &config.public_base_url,
        )),
        StorageBackend::Gcs {
            bucket,
            access_token,
        } => Arc::new(GcsStorage::new(bucket.clone(), access_token.clone())),
    };

    let speech = Arc::new(GeminiSpeechConnector::new(LiveConfig {
        url: config.live_url.clone(),
        api_key: config.gemini_api_key.clone(),
        model: config.live_model.clone(),
        voice: Some(config.live_voice.clone()),
        system_instruction: String::new(),
    }));

    Services {
        vision: gemini.clone(),
        text: gemini.clone(),
        images: gemini,
        storage,
        speech,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load application configuration")?;
    let args = Cli::parse();
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(dir) = args.prompts_dir {
        config.prompts_dir = Some(dir);
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!("Configuration loaded successfully. Starting Living Textbook server...");

    // --- 3. Load Prompts ---
    let prompts = resolve_prompts(config.prompts_dir.as_deref())
        .context("Failed to load LLM prompts")?;

    // --- 4. Build the shared pipeline ---
    let pipeline = Arc::new(Pipeline::new(
        build_services(&config),
        PipelineSettings {
            prompts,
            voice: Some(config.live_voice.clone()),
            media_concurrency: config.media_concurrency,
        },
    ));

    // --- 5. Serve ---
    if matches!(config.storage, StorageBackend::Local) {
        tokio::fs::create_dir_all(&config.media_dir)
            .await
            .with_context(|| format!("Failed to create {}", config.media_dir.display()))?;
    }
    let app = router(AppState { pipeline }, &config.media_dir);

    tracing::info!("Listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
