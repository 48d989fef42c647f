//! # wkmp-catalog
//!
//! The media catalog: schema, the `CatalogStore` transactional session,
//! tag parsing, and the scan engine that keeps the two in sync with the
//! filesystem.

pub mod db;
pub mod feature_client;
pub mod models;
pub mod scanner;
pub mod tag_parser;

pub use db::{CatalogStore, NewArtist, NewRelease, NewTrack};
pub use feature_client::FeatureClient;
pub use scanner::{ScanEngine, ScanEvent, ScanState};
