//! Querying (§4.8.3): given a set of input entities, gather similar ones
//! by walking outward from their occupied grid cells, expanding the
//! position set only while the nearest unclaimed neighbour stays under
//! the trained median-distance threshold.

use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::cache::EntityPositions;
use crate::network::{four_neighbours, Network, Position};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EntityKind {
    Track,
    Release,
    Artist,
}

/// An immutable, queryable similarity index: a trained network plus the
/// per-entity position assignments quantised from it. Constructed either
/// by training or by loading from cache; the server holds it behind an
/// `Arc` and swaps it atomically on retrain (§4.8).
pub struct SomSearcher {
    network: Network,
    positions: EntityPositions,
    median_threshold: f64,
    by_cell: HashMap<EntityKind, HashMap<Position, Vec<i64>>>,
}

impl SomSearcher {
    pub fn new(network: Network, positions: EntityPositions, median_threshold: f64) -> Self {
        let by_cell = build_reverse_index(&positions);
        Self { network, positions, median_threshold, by_cell }
    }

    pub fn similar_tracks(&self, ids: &[i64], max: usize) -> Vec<i64> {
        self.similar(EntityKind::Track, ids, max)
    }

    pub fn similar_releases(&self, id: i64, max: usize) -> Vec<i64> {
        self.similar(EntityKind::Release, &[id], max)
    }

    pub fn similar_artists(&self, id: i64, max: usize) -> Vec<i64> {
        self.similar(EntityKind::Artist, &[id], max)
    }

    fn positions_of(&self, kind: EntityKind, id: i64) -> Option<&HashSet<Position>> {
        match kind {
            EntityKind::Track => self.positions.tracks.get(&id),
            EntityKind::Release => self.positions.releases.get(&id),
            EntityKind::Artist => self.positions.artists.get(&id),
        }
    }

    fn similar(&self, kind: EntityKind, input_ids: &[i64], max: usize) -> Vec<i64> {
        let mut position_set: HashSet<Position> = HashSet::new();
        for &id in input_ids {
            if let Some(positions) = self.positions_of(kind, id) {
                position_set.extend(positions.iter().copied());
            }
        }

        if position_set.is_empty() {
            return Vec::new();
        }

        let excluded: HashSet<i64> = input_ids.iter().copied().collect();
        let mut returned: HashSet<i64> = HashSet::new();
        let mut result = Vec::new();
        let empty_cell: Vec<i64> = Vec::new();
        let cell_index = self.by_cell.get(&kind);

        let mut rng = thread_rng();

        loop {
            let mut shell_candidates: Vec<i64> = position_set
                .iter()
                .flat_map(|pos| cell_index.and_then(|idx| idx.get(pos)).unwrap_or(&empty_cell).iter().copied())
                .filter(|id| !excluded.contains(id) && !returned.contains(id))
                .collect();

            shell_candidates.sort_unstable();
            shell_candidates.dedup();
            shell_candidates.shuffle(&mut rng);

            for id in shell_candidates {
                if result.len() >= max {
                    break;
                }
                returned.insert(id);
                result.push(id);
            }

            if result.len() >= max {
                break;
            }

            match self.expand(&position_set) {
                Some(next) => position_set.insert(next),
                None => break,
            };
        }

        result
    }

    /// One step of position-set expansion: among all 4-neighbours of any
    /// position already in `position_set` (excluding positions already in
    /// the set), the candidate whose distance to its nearest in-set
    /// neighbour is smallest, provided that distance is below
    /// `median_threshold * 0.75`.
    fn expand(&self, position_set: &HashSet<Position>) -> Option<Position> {
        let threshold = self.median_threshold * 0.75;
        let mut best: Option<(Position, f64)> = None;

        let mut frontier: HashSet<Position> = HashSet::new();
        for &pos in position_set {
            for n in four_neighbours(pos, self.network.side) {
                if !position_set.contains(&n) {
                    frontier.insert(n);
                }
            }
        }

        for candidate in frontier {
            let nearest = position_set
                .iter()
                .map(|&in_set| self.network.distance_between_positions(candidate, in_set))
                .fold(f64::INFINITY, f64::min);

            if nearest >= threshold {
                continue;
            }

            match &best {
                Some((_, best_dist)) if *best_dist <= nearest => {}
                _ => best = Some((candidate, nearest)),
            }
        }

        best.map(|(pos, _)| pos)
    }
}

fn build_reverse_index(positions: &EntityPositions) -> HashMap<EntityKind, HashMap<Position, Vec<i64>>> {
    let mut out = HashMap::new();

    let mut tracks: HashMap<Position, Vec<i64>> = HashMap::new();
    for (&id, cells) in &positions.tracks {
        for &cell in cells {
            tracks.entry(cell).or_default().push(id);
        }
    }
    out.insert(EntityKind::Track, tracks);

    let mut releases: HashMap<Position, Vec<i64>> = HashMap::new();
    for (&id, cells) in &positions.releases {
        for &cell in cells {
            releases.entry(cell).or_default().push(id);
        }
    }
    out.insert(EntityKind::Release, releases);

    let mut artists: HashMap<Position, Vec<i64>> = HashMap::new();
    for (&id, cells) in &positions.artists {
        for &cell in cells {
            artists.entry(cell).or_default().push(id);
        }
    }
    out.insert(EntityKind::Artist, artists);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn toy_network() -> Network {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        Network::new_random(3, 2, vec![1.0, 1.0], &mut rng)
    }

    #[test]
    fn returns_empty_when_input_has_no_position() {
        let searcher = SomSearcher::new(toy_network(), EntityPositions::default(), 1.0);
        assert!(searcher.similar_tracks(&[999], 5).is_empty());
    }

    #[test]
    fn finds_candidates_sharing_a_cell() {
        let mut positions = EntityPositions::default();
        positions.tracks.insert(1, [(0, 0)].into_iter().collect());
        positions.tracks.insert(2, [(0, 0)].into_iter().collect());
        positions.tracks.insert(3, [(0, 0)].into_iter().collect());

        let searcher = SomSearcher::new(toy_network(), positions, 1.0);
        let result = searcher.similar_tracks(&[1], 5);
        assert_eq!(result.len(), 2);
        assert!(result.contains(&2));
        assert!(result.contains(&3));
    }

    #[test]
    fn excludes_the_input_itself() {
        let mut positions = EntityPositions::default();
        positions.tracks.insert(1, [(0, 0)].into_iter().collect());

        let searcher = SomSearcher::new(toy_network(), positions, 1.0);
        assert!(searcher.similar_tracks(&[1], 5).is_empty());
    }
}
