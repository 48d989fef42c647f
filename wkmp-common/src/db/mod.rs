//! Shared database bootstrap and generic rows.

pub mod init;
pub mod models;

pub use init::*;
pub use models::*;
