//! Disk persistence (§4.8.2): the network, normaliser, and per-entity
//! position sets are written to a cache directory as plain text on
//! training completion. On load, a consistency check (grid size,
//! dimension count, missing entity positions) either accepts the cache or
//! deletes it and leaves the searcher absent until the next training.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::network::{Network, Position};
use crate::normalizer::MinMaxNormalizer;

const NETWORK_FILE: &str = "network.txt";
const NORMALIZER_FILE: &str = "normalizer.txt";
const POSITIONS_FILE: &str = "positions.txt";

#[derive(Debug, Clone, Default)]
pub struct EntityPositions {
    pub tracks: HashMap<i64, HashSet<Position>>,
    pub releases: HashMap<i64, HashSet<Position>>,
    pub artists: HashMap<i64, HashSet<Position>>,
}

fn format_positions(id: i64, label: &str, positions: &HashSet<Position>) -> String {
    let rendered = positions
        .iter()
        .map(|(x, y)| format!("{x},{y}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{label} {id} {rendered}\n")
}

impl EntityPositions {
    fn to_text(&self) -> String {
        let mut out = String::new();
        for (id, positions) in &self.tracks {
            out.push_str(&format_positions(*id, "track", positions));
        }
        for (id, positions) in &self.releases {
            out.push_str(&format_positions(*id, "release", positions));
        }
        for (id, positions) in &self.artists {
            out.push_str(&format_positions(*id, "artist", positions));
        }
        out
    }

    fn from_text(text: &str) -> Option<Self> {
        let mut result = Self::default();
        for line in text.lines() {
            let mut parts = line.split_whitespace();
            let label = parts.next()?;
            let id: i64 = parts.next()?.parse().ok()?;
            let mut positions = HashSet::new();
            for token in parts {
                let (x, y) = token.split_once(',')?;
                positions.insert((x.parse().ok()?, y.parse().ok()?));
            }
            match label {
                "track" => {
                    result.tracks.insert(id, positions);
                }
                "release" => {
                    result.releases.insert(id, positions);
                }
                "artist" => {
                    result.artists.insert(id, positions);
                }
                _ => return None,
            }
        }
        Some(result)
    }
}

pub struct SimilarityCache {
    pub network: Network,
    pub normalizer: MinMaxNormalizer,
    pub positions: EntityPositions,
}

impl SimilarityCache {
    pub fn save_to_dir(&self, dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(NETWORK_FILE), self.network.to_text())?;
        std::fs::write(dir.join(NORMALIZER_FILE), self.normalizer.to_text())?;
        std::fs::write(dir.join(POSITIONS_FILE), self.positions.to_text())?;
        Ok(())
    }

    /// Load from `dir`, validating the cache against the catalog's current
    /// shape. On any mismatch, the cache files are deleted and `None` is
    /// returned so the caller knows to wait for the next training run.
    pub fn load_from_dir(dir: &Path, expected_dimensions: usize, known_track_ids: &[i64]) -> Option<Self> {
        let network_text = std::fs::read_to_string(dir.join(NETWORK_FILE)).ok()?;
        let normalizer_text = std::fs::read_to_string(dir.join(NORMALIZER_FILE)).ok()?;
        let positions_text = std::fs::read_to_string(dir.join(POSITIONS_FILE)).ok()?;

        let network = Network::from_text(&network_text)?;
        let normalizer = MinMaxNormalizer::from_text(&normalizer_text)?;
        let positions = EntityPositions::from_text(&positions_text)?;

        let consistent = network.dimensions == expected_dimensions
            && network.refs.len() == network.side * network.side
            && normalizer.min.len() == expected_dimensions
            && known_track_ids.iter().all(|id| positions.tracks.contains_key(id))
            && positions
                .tracks
                .values()
                .flatten()
                .all(|&(x, y)| x < network.side && y < network.side);

        if !consistent {
            let _ = std::fs::remove_file(dir.join(NETWORK_FILE));
            let _ = std::fs::remove_file(dir.join(NORMALIZER_FILE));
            let _ = std::fs::remove_file(dir.join(POSITIONS_FILE));
            return None;
        }

        Some(Self { network, normalizer, positions })
    }

    pub fn delete(dir: &Path) {
        let _ = std::fs::remove_file(dir.join(NETWORK_FILE));
        let _ = std::fs::remove_file(dir.join(NORMALIZER_FILE));
        let _ = std::fs::remove_file(dir.join(POSITIONS_FILE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let network = Network::new_random(2, 2, vec![1.0, 1.0], &mut rng);
        let normalizer = MinMaxNormalizer { min: vec![0.0, 0.0], max: vec![1.0, 1.0] };
        let mut positions = EntityPositions::default();
        positions.tracks.insert(1, [(0, 0)].into_iter().collect());
        positions.tracks.insert(2, [(1, 1)].into_iter().collect());

        let cache = SimilarityCache { network, normalizer, positions };
        cache.save_to_dir(dir.path()).unwrap();

        let loaded = SimilarityCache::load_from_dir(dir.path(), 2, &[1, 2]).unwrap();
        assert_eq!(loaded.network.side, 2);
        assert_eq!(loaded.positions.tracks.len(), 2);
    }

    #[test]
    fn missing_entity_position_invalidates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let network = Network::new_random(2, 2, vec![1.0, 1.0], &mut rng);
        let normalizer = MinMaxNormalizer { min: vec![0.0, 0.0], max: vec![1.0, 1.0] };
        let positions = EntityPositions::default();

        let cache = SimilarityCache { network, normalizer, positions };
        cache.save_to_dir(dir.path()).unwrap();

        assert!(SimilarityCache::load_from_dir(dir.path(), 2, &[1]).is_none());
        assert!(!dir.path().join(NETWORK_FILE).exists());
    }

    #[test]
    fn dimension_mismatch_invalidates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let network = Network::new_random(2, 2, vec![1.0, 1.0], &mut rng);
        let normalizer = MinMaxNormalizer { min: vec![0.0, 0.0], max: vec![1.0, 1.0] };
        let cache = SimilarityCache { network, normalizer, positions: EntityPositions::default() };
        cache.save_to_dir(dir.path()).unwrap();

        assert!(SimilarityCache::load_from_dir(dir.path(), 5, &[]).is_none());
    }
}
