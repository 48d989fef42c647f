//! Subsonic-compatible entity ID codec.
//!
//! IDs on the wire are rendered as `<kind>-<integer>`, e.g. `track-482`.
//! Parsing is strict: the split character must be exactly one `-`, and the
//! kind must be one of the known variants.

use crate::{Error, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Artist,
    Album,
    Track,
    Playlist,
    Root,
}

impl EntityKind {
    fn as_str(self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::Album => "album",
            EntityKind::Track => "track",
            EntityKind::Playlist => "playlist",
            EntityKind::Root => "root",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "artist" => Some(EntityKind::Artist),
            "album" => Some(EntityKind::Album),
            "track" => Some(EntityKind::Track),
            "playlist" => Some(EntityKind::Playlist),
            "root" => Some(EntityKind::Root),
            _ => None,
        }
    }
}

/// A rendered entity ID: a kind tag plus the dense integer primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityId {
    pub fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn track(id: i64) -> Self {
        Self::new(EntityKind::Track, id)
    }

    pub fn album(id: i64) -> Self {
        Self::new(EntityKind::Album, id)
    }

    pub fn artist(id: i64) -> Self {
        Self::new(EntityKind::Artist, id)
    }

    /// Parse a rendered ID of the form `<kind>-<integer>`. The split is on
    /// the *last* `-` so that nothing in `kind` itself needs escaping, but
    /// in practice `kind` never contains one.
    pub fn parse(rendered: &str) -> Result<Self> {
        let (kind_str, id_str) = rendered
            .rsplit_once('-')
            .ok_or_else(|| Error::BadRequest(format!("malformed entity id: {rendered}")))?;

        let kind = EntityKind::from_str(kind_str)
            .ok_or_else(|| Error::BadRequest(format!("unknown entity kind: {kind_str}")))?;

        let id: i64 = id_str
            .parse()
            .map_err(|_| Error::BadRequest(format!("malformed entity id: {rendered}")))?;

        Ok(EntityId { kind, id })
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind.as_str(), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_kind() {
        for (kind, id) in [
            (EntityKind::Artist, 1),
            (EntityKind::Album, 2),
            (EntityKind::Track, 3),
            (EntityKind::Playlist, 4),
            (EntityKind::Root, 5),
        ] {
            let rendered = EntityId::new(kind, id).to_string();
            let parsed = EntityId::parse(&rendered).unwrap();
            assert_eq!(parsed, EntityId::new(kind, id));
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(EntityId::parse("podcast-1").is_err());
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(EntityId::parse("track").is_err());
    }

    #[test]
    fn rejects_non_integer_id() {
        assert!(EntityId::parse("track-abc").is_err());
    }
}
