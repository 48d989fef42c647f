//! Min/max normaliser (§4.8.1 step 2), serialised alongside the network.

#[derive(Debug, Clone)]
pub struct MinMaxNormalizer {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl MinMaxNormalizer {
    pub fn fit(samples: &[Vec<f64>], dimensions: usize) -> Self {
        let mut min = vec![f64::INFINITY; dimensions];
        let mut max = vec![f64::NEG_INFINITY; dimensions];

        for sample in samples {
            for dim in 0..dimensions {
                min[dim] = min[dim].min(sample[dim]);
                max[dim] = max[dim].max(sample[dim]);
            }
        }

        for dim in 0..dimensions {
            if !min[dim].is_finite() {
                min[dim] = 0.0;
            }
            if !max[dim].is_finite() {
                max[dim] = 1.0;
            }
        }

        Self { min, max }
    }

    /// Apply the normaliser, returning a new vector with each dimension
    /// mapped into `[0, 1]`. A zero-width dimension maps every value to
    /// `0.5`, since no information is carried by a constant feature.
    pub fn apply(&self, sample: &[f64]) -> Vec<f64> {
        sample
            .iter()
            .enumerate()
            .map(|(dim, v)| {
                let span = self.max[dim] - self.min[dim];
                if span.abs() < 1e-12 {
                    0.5
                } else {
                    (v - self.min[dim]) / span
                }
            })
            .collect()
    }

    pub fn to_text(&self) -> String {
        format!(
            "{}\n{}\n",
            self.min.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" "),
            self.max.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" "),
        )
    }

    pub fn from_text(text: &str) -> Option<Self> {
        let mut lines = text.lines();
        let min: Vec<f64> = lines.next()?.split_whitespace().map(|s| s.parse().ok()).collect::<Option<_>>()?;
        let max: Vec<f64> = lines.next()?.split_whitespace().map(|s| s.parse().ok()).collect::<Option<_>>()?;
        if min.len() != max.len() {
            return None;
        }
        Some(Self { min, max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_min_and_max_to_zero_and_one() {
        let samples = vec![vec![0.0, 10.0], vec![5.0, 20.0], vec![10.0, 30.0]];
        let norm = MinMaxNormalizer::fit(&samples, 2);
        assert_eq!(norm.apply(&[0.0, 10.0]), vec![0.0, 0.0]);
        assert_eq!(norm.apply(&[10.0, 30.0]), vec![1.0, 1.0]);
    }

    #[test]
    fn constant_dimension_maps_to_half() {
        let samples = vec![vec![5.0], vec![5.0]];
        let norm = MinMaxNormalizer::fit(&samples, 1);
        assert_eq!(norm.apply(&[5.0]), vec![0.5]);
    }

    #[test]
    fn text_round_trips() {
        let norm = MinMaxNormalizer { min: vec![0.0, 1.0], max: vec![1.0, 5.0] };
        let text = norm.to_text();
        let parsed = MinMaxNormalizer::from_text(&text).unwrap();
        assert_eq!(parsed.min, norm.min);
        assert_eq!(parsed.max, norm.max);
    }
}
