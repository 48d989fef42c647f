//! # wkmp-server
//!
//! The self-hosted music server's HTTP core: catalog, scan engine,
//! similarity engine, and media delivery wired together behind an Axum
//! router. Structure grounded in the teacher's `wkmp-ap/src/main.rs`.

mod error;
mod handlers;
mod routes;
mod similarity_runner;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::{RwLock, Semaphore};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wkmp_catalog::db::init_schema;
use wkmp_catalog::scanner::ScanEngine;
use wkmp_catalog::tag_parser::SymphoniaTagParser;
use wkmp_catalog::{CatalogStore, FeatureClient};
use wkmp_common::config::Config;
use wkmp_common::db::init_database;
use wkmp_media::{CoverResolver, CoverResolverConfig};

use crate::state::AppContext;

#[derive(Parser, Debug)]
#[command(name = "wkmp-server")]
#[command(about = "Self-hosted music server: catalog, similarity and delivery core")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Working directory override (db + caches).
    #[arg(short, long)]
    working_dir: Option<PathBuf>,

    /// Address to bind the HTTP server to, overrides config.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "wkmp_server=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let args = Args::parse();
    info!("starting wkmp-server");

    let mut config = Config::load(args.config.as_deref(), args.working_dir.clone())?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    let config = Arc::new(config);

    std::fs::create_dir_all(config.working_dir.clone())?;

    let pool = init_database(&config.db_path()).await?;
    init_schema(&pool).await?;

    let catalog = CatalogStore::new(pool);
    let parser = Arc::new(SymphoniaTagParser);

    let feature_client = config.feature_service_url.clone().map(FeatureClient::new);

    let scan_engine = Arc::new(ScanEngine::new(catalog.clone(), parser.clone(), feature_client.clone()));

    let cover = Arc::new(CoverResolver::new(catalog.clone(), parser.clone(), CoverResolverConfig {
        jpeg_quality: config.cover_jpeg_quality,
        max_source_file_size: config.cover_max_file_size,
        max_cache_entries: config.cover_max_cache_size,
        ..Default::default()
    }));

    let ctx = AppContext {
        config: Arc::clone(&config),
        catalog: catalog.clone(),
        scan_engine: Arc::clone(&scan_engine),
        cover: Arc::clone(&cover),
        similarity: Arc::new(RwLock::new(None)),
        transcode_slots: Arc::new(Semaphore::new(config.max_concurrent_transcodes)),
        feature_client,
    };

    similarity_runner::load_or_train_at_startup(&catalog, &config.cache_dir(), &ctx.similarity).await;

    tokio::spawn(run_scan_scheduler(Arc::clone(&scan_engine), catalog.clone()));
    tokio::spawn(similarity_runner::watch_scan_events(
        Arc::clone(&scan_engine),
        catalog.clone(),
        cover,
        config.cache_dir(),
        Arc::clone(&ctx.similarity),
    ));

    let app = routes::build_router(ctx);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Drives the scan engine per §4.7's scheduling rule: on each tick,
/// run a scan if one was requested manually, or if the next scheduled
/// occurrence (tracked since the previous completed scan) has arrived.
async fn run_scan_scheduler(scan_engine: Arc<ScanEngine>, catalog: CatalogStore) {
    let mut next_scheduled = None;

    loop {
        tokio::time::sleep(Duration::from_secs(60)).await;

        let settings = match catalog.scan_settings().await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to read scan settings");
                continue;
            }
        };

        let now = chrono::Utc::now();
        if next_scheduled.is_none() {
            next_scheduled = wkmp_catalog::scanner::next_occurrence(now, settings.period(), settings.start_of_day_secs);
        }

        let due = settings.manual_scan_requested || next_scheduled.map(|at| now >= at).unwrap_or(false);
        if !due {
            continue;
        }

        match scan_engine.run_once().await {
            Ok(stats) => {
                if stats.changed() {
                    info!(added = stats.added, updated = stats.updated, removed = stats.removed, "scan completed");
                }
            }
            Err(e) => {
                warn!(error = %e, "scheduled scan failed");
            }
        }

        let settings = catalog.scan_settings().await.unwrap_or(settings);
        next_scheduled = wkmp_catalog::scanner::next_occurrence(chrono::Utc::now(), settings.period(), settings.start_of_day_secs);
    }
}
