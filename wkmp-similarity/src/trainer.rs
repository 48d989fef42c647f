//! Orchestrates one training run (§4.8.1): pulls feature blobs and
//! catalog structure out of the [`wkmp_catalog::CatalogStore`], builds the
//! per-FeatureType weighted concatenated vectors, and drives
//! [`Network::train`].

use std::collections::{HashMap, HashSet};

use rand::thread_rng;
use wkmp_catalog::CatalogStore;
use wkmp_common::Result;

use crate::cache::EntityPositions;
use crate::network::Network;
use crate::normalizer::MinMaxNormalizer;

/// Default iteration count (§9 open question: legacy code often uses 1,
/// test tooling uses 20; left as configuration here).
pub const DEFAULT_ITERATIONS: usize = 1;

pub struct TrainingOutcome {
    pub network: Network,
    pub normalizer: MinMaxNormalizer,
    pub positions: EntityPositions,
    pub median_threshold: f64,
}

/// Gather every Features-bearing track's vector, ordered and weighted by
/// the enabled FeatureTypes in `SimilaritySettings`'s fixed order.
async fn gather_vectors(store: &CatalogStore) -> Result<(Vec<i64>, Vec<Vec<f64>>, Vec<f64>, usize)> {
    let feature_types = store.enabled_feature_types().await?;
    let dimensions: usize = feature_types.iter().map(|ft| ft.dimensions as usize).sum();

    let mut weights = Vec::with_capacity(dimensions);
    for ft in &feature_types {
        let per_dim_weight = ft.weight / ft.dimensions as f64;
        weights.extend(std::iter::repeat(per_dim_weight).take(ft.dimensions as usize));
    }

    let mut track_ids = Vec::new();
    let mut vectors = Vec::new();

    store
        .for_each_track_with_features(|track_id, data| {
            let parsed: Result<HashMap<String, Vec<f64>>, _> = serde_json::from_str(data);
            let Ok(named) = parsed else { return };

            let mut vector = Vec::with_capacity(dimensions);
            let mut shape_ok = true;
            for ft in &feature_types {
                match named.get(&ft.name) {
                    Some(v) if v.len() == ft.dimensions as usize => vector.extend_from_slice(v),
                    _ => {
                        shape_ok = false;
                        break;
                    }
                }
            }

            // Step 1: drop tracks whose feature vector shape mismatches
            // the current configuration.
            if shape_ok {
                track_ids.push(track_id);
                vectors.push(vector);
            }
        })
        .await?;

    Ok((track_ids, vectors, weights, dimensions))
}

/// Run one full training pass. Returns `None` if cancelled before
/// completion, or if there are no usable feature vectors to train on.
pub async fn train(
    store: &CatalogStore,
    iterations: usize,
    mut on_progress: impl FnMut(usize, usize),
    mut cancelled: impl FnMut() -> bool,
) -> Result<Option<TrainingOutcome>> {
    let (track_ids, raw_vectors, weights, dimensions) = gather_vectors(store).await?;

    if raw_vectors.is_empty() {
        return Ok(None);
    }

    let normalizer = MinMaxNormalizer::fit(&raw_vectors, dimensions);
    let normalized: Vec<Vec<f64>> = raw_vectors.iter().map(|v| normalizer.apply(v)).collect();

    let side = Network::side_for_sample_count(normalized.len());
    let mut rng = thread_rng();
    let mut network = Network::new_random(side, dimensions, weights, &mut rng);

    let ran = network.train(&normalized, iterations.max(1), &mut rng, &mut on_progress, &mut cancelled);
    if !ran {
        return Ok(None);
    }

    // Step 6: quantise each track, tracks may map to multiple positions
    // within the median-distance neighbourhood of their best match.
    let median_threshold = network.median_adjacent_distance();
    let mut track_positions: HashMap<i64, HashSet<(usize, usize)>> = HashMap::new();

    for (track_id, sample) in track_ids.iter().zip(normalized.iter()) {
        let bmu = network.bmu(sample);
        let bmu_pos = network.position_of(bmu);
        let mut positions = HashSet::from([bmu_pos]);

        for n in crate::network::four_neighbours(bmu_pos, network.side) {
            if network.distance_between_positions(bmu_pos, n) <= median_threshold * 0.75 {
                positions.insert(n);
            }
        }

        track_positions.insert(*track_id, positions);
    }

    let releases = release_positions(store, &track_positions).await?;
    let artists = artist_positions(store, &track_positions).await?;

    let positions = EntityPositions { tracks: track_positions, releases, artists };

    Ok(Some(TrainingOutcome { network, normalizer, positions, median_threshold }))
}

async fn release_positions(
    store: &CatalogStore,
    track_positions: &HashMap<i64, HashSet<(usize, usize)>>,
) -> Result<HashMap<i64, HashSet<(usize, usize)>>> {
    let mut out: HashMap<i64, HashSet<(usize, usize)>> = HashMap::new();

    for &track_id in track_positions.keys() {
        if let Some(track) = store.get_track(track_id).await? {
            if let Some(release_id) = track.release_id {
                if let Some(positions) = track_positions.get(&track_id) {
                    out.entry(release_id).or_default().extend(positions.iter().copied());
                }
            }
        }
    }

    Ok(out)
}

async fn artist_positions(
    store: &CatalogStore,
    track_positions: &HashMap<i64, HashSet<(usize, usize)>>,
) -> Result<HashMap<i64, HashSet<(usize, usize)>>> {
    let links = store.all_track_artist_links().await?;
    let mut out: HashMap<i64, HashSet<(usize, usize)>> = HashMap::new();

    for (track_id, artist_id) in links {
        if let Some(positions) = track_positions.get(&track_id) {
            out.entry(artist_id).or_default().extend(positions.iter().copied());
        }
    }

    Ok(out)
}
