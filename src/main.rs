use std::{path::Path, sync::Arc};

use instube::{
    AppConfig, AppState, StartupError, build_router,
    capability::CapabilityProbe,
    cors::build_cors_layer,
    engine::YtDlpEngine,
    retention::spawn_retention_sweeper,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "instube=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run(AppConfig::from_env()).await {
        error!("Server error: {error}");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), StartupError> {
    let download_dir = config.download_dir();
    tokio::fs::create_dir_all(&download_dir)
        .await
        .map_err(|source| StartupError::DownloadDir {
            path: download_dir.clone(),
            source,
        })?;
    log_existing_downloads(&download_dir).await;

    match config.retention {
        Some(max_age) => {
            info!(
                "Downloads older than {}s are removed every {}s.",
                max_age.as_secs(),
                config.sweep_interval.as_secs()
            );
            spawn_retention_sweeper(download_dir.clone(), max_age, config.sweep_interval);
        }
        None => warn!("DOWNLOAD_RETENTION_SECONDS=0: downloads are kept forever."),
    }

    let state = AppState {
        engine: Arc::new(YtDlpEngine::new(
            config.ytdlp_program.clone(),
            config.ytdlp_timeout,
        )),
        probe: Arc::new(CapabilityProbe::new()),
        download_dir,
    };

    let mut app = build_router(state).layer(TraceLayer::new_for_http());
    if let Some(cors) = build_cors_layer(&config.allowed_origins)? {
        app = app.layer(cors);
    }

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: config.bind_addr.clone(),
            source,
        })?;

    info!("Server ready at http://{}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(StartupError::Serve)
}

async fn log_existing_downloads(download_dir: &Path) {
    let mut entries = match tokio::fs::read_dir(download_dir).await {
        Ok(entries) => entries,
        Err(error) => {
            error!("Error listing download folder: {error}");
            return;
        }
    };

    let mut names = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    let preview: Vec<_> = names.iter().take(5).collect();
    info!("Found {} existing downloads: {:?}", names.len(), preview);
}
