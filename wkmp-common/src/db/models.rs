//! Generic, cross-crate database rows.
//!
//! Catalog-specific rows (Track, Artist, Release, ...) live in
//! `wkmp-catalog::db`, which owns the schema they belong to.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single key/value row in the generic `settings` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
}
