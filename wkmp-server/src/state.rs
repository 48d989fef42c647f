//! Shared application context handed to every Axum handler, grounded in
//! the teacher's `AppContext` (`wkmp-ap/src/api/server.rs`).

use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};
use wkmp_catalog::{CatalogStore, FeatureClient, ScanEngine};
use wkmp_common::config::Config;
use wkmp_media::CoverResolver;
use wkmp_similarity::SomSearcher;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub catalog: CatalogStore,
    pub scan_engine: Arc<ScanEngine>,
    pub cover: Arc<CoverResolver>,
    /// The live similarity searcher, swapped atomically on retrain; `None`
    /// until the first successful training or cache load.
    pub similarity: Arc<RwLock<Option<Arc<SomSearcher>>>>,
    /// Bounds in-flight transcodes (§4.9's per-connection concurrency cap).
    pub transcode_slots: Arc<Semaphore>,
    pub feature_client: Option<FeatureClient>,
}
