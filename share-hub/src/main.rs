use anyhow::Result;
use axum::{routing::get, serve, Router};
use clap::Parser;
use share_hub::api::{self, AppState};
use share_hub_core::{
    access::AccessEngine, activity::ActivityService, documents::DocumentService, events::EventBus,
    secret::SecretCodec, share::ShareLifecycle, store::FsStore, workspace::WorkspaceService,
};
use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "share-hub")]
#[command(about = "Shared file workspaces guarded by bearer secrets")]
struct Cli {
    /// Listen address
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Directory holding workspace, share and activity records
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory holding uploaded file contents
    #[arg(long, default_value = "uploads")]
    upload_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let store = Arc::new(FsStore::open(&cli.data_dir)?);
    let codec = Arc::new(SecretCodec::new());
    let events = EventBus::new();

    let engine = Arc::new(AccessEngine::new(
        store.clone(),
        codec.clone(),
        events.clone(),
    ));
    let documents = Arc::new(DocumentService::new(store.clone(), &cli.upload_dir));
    let workspaces = Arc::new(WorkspaceService::new(
        store.clone(),
        codec.clone(),
        documents.clone(),
    ));
    let shares = Arc::new(ShareLifecycle::new(
        store.clone(),
        store.clone(),
        codec,
        events,
    ));
    let activity = Arc::new(ActivityService::new(store));

    let state = AppState {
        engine,
        shares,
        workspaces,
        documents,
        activity,
    };

    let app = Router::new()
        .merge(api::router(state))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&cli.addr).await?;
    info!("listening on {}", cli.addr);
    serve(listener, app.into_make_service()).into_future().await?;
    Ok(())
}
