//! The catalog's relational model (§3 of the design).
//!
//! Every row is referenced by a dense `i64` primary key. All timestamps are
//! absolute UTC (`chrono::DateTime<Utc>`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// How a track's cover art is sourced, absent the sibling/default fallback
/// chain that the cover resolver walks at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverSource {
    None,
    Embedded,
}

impl CoverSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CoverSource::None => "none",
            CoverSource::Embedded => "embedded",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "embedded" => CoverSource::Embedded,
            _ => CoverSource::None,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    pub path: String,
    pub last_write_time: DateTime<Utc>,
    pub checksum: String,
    pub display_name: String,
    pub duration_secs: f64,
    pub track_number: Option<i64>,
    pub track_total: Option<i64>,
    pub disc_number: Option<i64>,
    pub disc_total: Option<i64>,
    pub release_date: Option<String>,
    pub original_release_date: Option<String>,
    pub musicbrainz_track_id: Option<String>,
    pub acousticbrainz_id: Option<String>,
    pub cover_source: String,
    pub release_id: Option<i64>,
    pub added_time: DateTime<Utc>,
}

impl Track {
    pub fn cover_source(&self) -> CoverSource {
        CoverSource::from_str(&self.cover_source)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Artist {
    pub id: i64,
    pub display_name: String,
    pub musicbrainz_artist_id: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Release {
    pub id: i64,
    pub display_name: String,
    pub musicbrainz_release_id: Option<String>,
    pub total_disc_count: Option<i64>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ClusterType {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Cluster {
    pub id: i64,
    pub cluster_type_id: i64,
    pub value: String,
}

/// A JSON-like bag of named numeric vectors attached to a track, stored
/// verbatim as the provider returned it (see the feature-service client).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Features {
    pub id: i64,
    pub track_id: i64,
    pub data: String,
}

impl Features {
    /// Parse the stored JSON blob into a name → vector map.
    pub fn vectors(&self) -> Result<std::collections::HashMap<String, Vec<f64>>, serde_json::Error> {
        serde_json::from_str(&self.data)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FeatureType {
    pub id: i64,
    pub name: String,
    pub dimensions: i64,
    pub weight: f64,
    pub enabled: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SimilaritySettings {
    pub id: i64,
    pub network: Option<String>,
    pub normalizer: Option<String>,
    pub scan_version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaRootType {
    Audio,
    Video,
}

impl MediaRootType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaRootType::Audio => "audio",
            MediaRootType::Video => "video",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "video" => MediaRootType::Video,
            _ => MediaRootType::Audio,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MediaRoot {
    pub id: i64,
    pub path: String,
    pub root_type: String,
}

impl MediaRoot {
    pub fn kind(&self) -> MediaRootType {
        MediaRootType::from_str(&self.root_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePeriod {
    Never,
    Daily,
    Weekly,
    Monthly,
}

impl UpdatePeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdatePeriod::Never => "never",
            UpdatePeriod::Daily => "daily",
            UpdatePeriod::Weekly => "weekly",
            UpdatePeriod::Monthly => "monthly",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "daily" => UpdatePeriod::Daily,
            "weekly" => UpdatePeriod::Weekly,
            "monthly" => UpdatePeriod::Monthly,
            _ => UpdatePeriod::Never,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScanSettings {
    pub id: i64,
    pub update_period: String,
    /// Seconds since local midnight.
    pub start_of_day_secs: i64,
    pub manual_scan_requested: bool,
    pub last_scan: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
    pub audio_extensions: String,
    pub video_extensions: String,
}

impl ScanSettings {
    pub fn period(&self) -> UpdatePeriod {
        UpdatePeriod::from_str(&self.update_period)
    }

    pub fn audio_extensions(&self) -> Vec<String> {
        split_extensions(&self.audio_extensions)
    }

    pub fn video_extensions(&self) -> Vec<String> {
        split_extensions(&self.video_extensions)
    }
}

fn split_extensions(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Per-root statistics accumulated during a scan (§4.7 step 4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
    pub scan_errors: u64,
}

impl ScanStats {
    pub fn changed(&self) -> bool {
        self.added > 0 || self.updated > 0 || self.removed > 0
    }

    pub fn merge(&mut self, other: &ScanStats) {
        self.added += other.added;
        self.updated += other.updated;
        self.removed += other.removed;
        self.scan_errors += other.scan_errors;
    }
}
