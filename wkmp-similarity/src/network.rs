//! The self-organising map itself (§4.8.1), grounded in the original
//! `Network.cpp`'s training loop: a square grid of reference vectors,
//! trained by competitive learning with a shrinking neighbourhood.

use rand::seq::SliceRandom;
use rand::Rng;

/// A grid position, `(x, y)`, with `x, y < side`.
pub type Position = (usize, usize);

#[derive(Debug, Clone)]
pub struct Network {
    pub side: usize,
    pub dimensions: usize,
    /// Per-dimension weight: a FeatureType's declared weight divided by its
    /// dimension count, so each FeatureType contributes its nominal weight
    /// regardless of how many dimensions it occupies.
    pub weights: Vec<f64>,
    /// Reference vectors, row-major: index `y * side + x`.
    pub refs: Vec<Vec<f64>>,
}

impl Network {
    /// Grid side per §4.8.1 step 3: `ceil(sqrt(N/2))`, floored at 1 so a
    /// tiny catalog still produces a usable (if trivial) map.
    pub fn side_for_sample_count(n: usize) -> usize {
        ((n as f64 / 2.0).sqrt().ceil() as usize).max(1)
    }

    pub fn new_random(side: usize, dimensions: usize, weights: Vec<f64>, rng: &mut impl Rng) -> Self {
        let refs = (0..side * side)
            .map(|_| (0..dimensions).map(|_| rng.gen_range(0.0..1.0)).collect())
            .collect();
        Self { side, dimensions, weights, refs }
    }

    pub fn index_of(&self, pos: Position) -> usize {
        pos.1 * self.side + pos.0
    }

    pub fn position_of(&self, index: usize) -> Position {
        (index % self.side, index / self.side)
    }

    /// Weighted squared-Euclidean distance between a sample and a
    /// reference vector.
    fn weighted_sq_distance(&self, a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b.iter())
            .zip(self.weights.iter())
            .map(|((x, y), w)| w * (x - y).powi(2))
            .sum()
    }

    /// Weighted distance between the reference vectors at two grid
    /// positions, used by position-set expansion at query time.
    pub fn distance_between_positions(&self, a: Position, b: Position) -> f64 {
        let ra = &self.refs[self.index_of(a)];
        let rb = &self.refs[self.index_of(b)];
        self.weighted_sq_distance(ra, rb).sqrt()
    }

    /// Euclidean distance between two grid positions (not weighted; used
    /// for the neighbourhood function and adjacency, not for sample
    /// quantisation).
    fn grid_distance(a: Position, b: Position) -> f64 {
        (((a.0 as f64 - b.0 as f64).powi(2) + (a.1 as f64 - b.1 as f64).powi(2))).sqrt()
    }

    /// Index of the reference vector closest (weighted) to `sample`: the
    /// best matching unit.
    pub fn bmu(&self, sample: &[f64]) -> usize {
        self.refs
            .iter()
            .enumerate()
            .map(|(i, r)| (i, self.weighted_sq_distance(sample, r)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Train in place for `iterations` epochs over `samples`, per §4.8.1
    /// step 5. `on_progress(iteration, total)` is called after each epoch;
    /// `cancelled()` is polled between epochs and short-circuits training.
    pub fn train(
        &mut self,
        samples: &[Vec<f64>],
        iterations: usize,
        rng: &mut impl Rng,
        mut on_progress: impl FnMut(usize, usize),
        mut cancelled: impl FnMut() -> bool,
    ) -> bool {
        let mut order: Vec<usize> = (0..samples.len()).collect();

        for i in 0..iterations {
            if cancelled() {
                return false;
            }

            let alpha = (-((i + 1) as f64) / iterations as f64).exp();
            let sigma = (-((i + 1) as f64) / iterations as f64).exp();

            order.shuffle(rng);

            for &sample_idx in &order {
                let sample = &samples[sample_idx];
                let bmu = self.bmu(sample);
                let bmu_pos = self.position_of(bmu);

                for idx in 0..self.refs.len() {
                    let pos = self.position_of(idx);
                    let d = Self::grid_distance(pos, bmu_pos);
                    let phi = (-(d * d) / (2.0 * sigma * sigma)).exp();
                    let factor = alpha * phi;
                    if factor < 1e-9 {
                        continue;
                    }
                    for dim in 0..self.dimensions {
                        let delta = sample[dim] - self.refs[idx][dim];
                        self.refs[idx][dim] += factor * delta;
                    }
                }
            }

            on_progress(i + 1, iterations);
        }

        true
    }

    /// Median pairwise distance between 4-neighbour-adjacent reference
    /// vectors (§4.8.1 step 7), used as the neighbourhood-expansion
    /// threshold at query time.
    pub fn median_adjacent_distance(&self) -> f64 {
        let mut distances = Vec::new();
        for y in 0..self.side {
            for x in 0..self.side {
                let idx = self.index_of((x, y));
                for (nx, ny) in four_neighbours((x, y), self.side) {
                    let n_idx = self.index_of((nx, ny));
                    if n_idx > idx {
                        distances.push(self.weighted_sq_distance(&self.refs[idx], &self.refs[n_idx]).sqrt());
                    }
                }
            }
        }
        if distances.is_empty() {
            return 0.0;
        }
        distances.sort_by(|a, b| a.partial_cmp(b).unwrap());
        distances[distances.len() / 2]
    }

    /// Serialise to a whitespace-delimited text representation,
    /// independent of any particular language's binary layout.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{} {}\n", self.side, self.dimensions));
        out.push_str(&self.weights.iter().map(|w| w.to_string()).collect::<Vec<_>>().join(" "));
        out.push('\n');
        for r in &self.refs {
            out.push_str(&r.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" "));
            out.push('\n');
        }
        out
    }

    pub fn from_text(text: &str) -> Option<Self> {
        let mut lines = text.lines();
        let mut header = lines.next()?.split_whitespace();
        let side: usize = header.next()?.parse().ok()?;
        let dimensions: usize = header.next()?.parse().ok()?;

        let weights: Vec<f64> = lines
            .next()?
            .split_whitespace()
            .map(|s| s.parse().ok())
            .collect::<Option<Vec<_>>>()?;
        if weights.len() != dimensions {
            return None;
        }

        let mut refs = Vec::with_capacity(side * side);
        for _ in 0..side * side {
            let row: Vec<f64> = lines
                .next()?
                .split_whitespace()
                .map(|s| s.parse().ok())
                .collect::<Option<Vec<_>>>()?;
            if row.len() != dimensions {
                return None;
            }
            refs.push(row);
        }

        Some(Self { side, dimensions, weights, refs })
    }
}

/// The grid positions 4-adjacent to `pos` on a `side × side` toroidal-free
/// grid (edges simply have fewer neighbours).
pub fn four_neighbours(pos: Position, side: usize) -> Vec<Position> {
    let (x, y) = pos;
    let mut out = Vec::with_capacity(4);
    if x > 0 {
        out.push((x - 1, y));
    }
    if x + 1 < side {
        out.push((x + 1, y));
    }
    if y > 0 {
        out.push((x, y - 1));
    }
    if y + 1 < side {
        out.push((x, y + 1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn side_for_sample_count_matches_ceil_sqrt_half() {
        assert_eq!(Network::side_for_sample_count(0), 1);
        assert_eq!(Network::side_for_sample_count(2), 1);
        assert_eq!(Network::side_for_sample_count(8), 2);
        assert_eq!(Network::side_for_sample_count(50), 5);
    }

    #[test]
    fn text_round_trips() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let net = Network::new_random(3, 4, vec![1.0, 1.0, 0.5, 0.5], &mut rng);
        let text = net.to_text();
        let parsed = Network::from_text(&text).unwrap();
        assert_eq!(parsed.side, net.side);
        assert_eq!(parsed.dimensions, net.dimensions);
        assert_eq!(parsed.weights, net.weights);
        assert_eq!(parsed.refs, net.refs);
    }

    #[test]
    fn four_neighbours_excludes_out_of_bounds() {
        assert_eq!(four_neighbours((0, 0), 3).len(), 2);
        assert_eq!(four_neighbours((1, 1), 3).len(), 4);
    }

    #[test]
    fn training_moves_references_toward_samples() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let mut net = Network::new_random(2, 2, vec![1.0, 1.0], &mut rng);
        let samples = vec![vec![0.9, 0.9]; 20];
        let ran = net.train(&samples, 5, &mut rng, |_, _| {}, || false);
        assert!(ran);
        let bmu = net.bmu(&[0.9, 0.9]);
        let dist = (net.refs[bmu][0] - 0.9).abs() + (net.refs[bmu][1] - 0.9).abs();
        assert!(dist < 1.0);
    }
}
