//! # wkmp-common
//!
//! Shared code for the wkmp-server workspace:
//! - Common error type and result alias
//! - Configuration loading and working-directory resolution
//! - Shared database bootstrap (connection pool, generic tables)
//! - A generic broadcast-based progress/event bus
//! - The Subsonic-compatible entity ID codec
//! - Pagination clamping

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod id;
pub mod pagination;

pub use error::{Error, Result};
pub use events::EventBus;
