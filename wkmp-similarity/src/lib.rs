//! # wkmp-similarity
//!
//! A self-organising map over track feature vectors (§4.8): training,
//! disk persistence, and nearest-neighbour style querying over
//! tracks/releases/artists.

pub mod cache;
pub mod network;
pub mod normalizer;
pub mod searcher;
pub mod trainer;

pub use cache::{EntityPositions, SimilarityCache};
pub use network::Network;
pub use normalizer::MinMaxNormalizer;
pub use searcher::SomSearcher;
pub use trainer::{train, TrainingOutcome, DEFAULT_ITERATIONS};
