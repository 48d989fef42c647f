//! Wires the similarity engine (§4.8) into the server process: loads a
//! cached network at startup, retrains whenever a scan changes the
//! catalog, and keeps `AppContext::similarity` swapped to the latest
//! trained searcher. A successful retrain also flushes the cover cache,
//! since cover lookups and similarity queries are invalidated by the same
//! event (a catalog-changing scan).

use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use wkmp_catalog::{CatalogStore, ScanEngine, ScanEvent};
use wkmp_media::CoverResolver;
use wkmp_similarity::{train, SimilarityCache, SomSearcher, DEFAULT_ITERATIONS};

type SearcherSlot = Arc<RwLock<Option<Arc<SomSearcher>>>>;

/// Load the on-disk cache if it's still consistent with the catalog;
/// otherwise train once immediately so the server doesn't start with no
/// similarity index at all.
pub async fn load_or_train_at_startup(catalog: &CatalogStore, cache_dir: &Path, slot: &SearcherSlot) {
    match known_track_ids_and_dimensions(catalog).await {
        Ok((track_ids, dimensions)) => {
            if let Some(cache) = SimilarityCache::load_from_dir(cache_dir, dimensions, &track_ids) {
                install(slot, cache).await;
                info!("loaded similarity cache from disk");
                return;
            }
        }
        Err(e) => warn!(error = %e, "failed to inspect catalog before loading similarity cache"),
    }

    info!("no usable similarity cache, training at startup");
    retrain(catalog, cache_dir, slot).await;
}

/// Retrain unconditionally and, on success, persist + hot-swap the result.
pub async fn retrain(catalog: &CatalogStore, cache_dir: &Path, slot: &SearcherSlot) {
    match train(catalog, DEFAULT_ITERATIONS, |_, _| {}, || false).await {
        Ok(Some(outcome)) => {
            let cache = SimilarityCache {
                network: outcome.network,
                normalizer: outcome.normalizer,
                positions: outcome.positions,
            };
            if let Err(e) = cache.save_to_dir(cache_dir) {
                warn!(error = %e, "failed to persist similarity cache");
            }
            install(slot, cache).await;
            info!("similarity network retrained");
        }
        Ok(None) => info!("not enough feature data to train a similarity network yet"),
        Err(e) => warn!(error = %e, "similarity training failed"),
    }
}

async fn install(slot: &SearcherSlot, cache: SimilarityCache) {
    let median = cache.network.median_adjacent_distance();
    let searcher = Arc::new(SomSearcher::new(cache.network, cache.positions, median));
    *slot.write().await = Some(searcher);
}

async fn known_track_ids_and_dimensions(catalog: &CatalogStore) -> wkmp_common::Result<(Vec<i64>, usize)> {
    let feature_types = catalog.enabled_feature_types().await?;
    let dimensions = feature_types.iter().map(|ft| ft.dimensions as usize).sum();

    let mut track_ids = Vec::new();
    catalog.for_each_track_path(|id, _, _| track_ids.push(id)).await?;
    Ok((track_ids, dimensions))
}

/// Background task: every scan completion that changed at least one track
/// invalidates the cover cache and triggers a retrain (§4.8.2).
pub async fn watch_scan_events(
    scan_engine: Arc<ScanEngine>,
    catalog: CatalogStore,
    cover: Arc<CoverResolver>,
    cache_dir: std::path::PathBuf,
    slot: SearcherSlot,
) {
    let mut events = scan_engine.subscribe();
    loop {
        match events.recv().await {
            Ok(ScanEvent::Completed { stats }) if stats.changed() => {
                cover.flush_cache();
                retrain(&catalog, &cache_dir, &slot).await;
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}
