//! Scan engine (§4.7): a singleton owning a timer and a cancellation flag,
//! cycling `NotScheduled → Scheduled → InProgress → NotScheduled`.
//!
//! Grounded in the teacher's `wkmp-ai/src/services/file_scanner.rs` for the
//! walkdir-driven directory traversal shape, generalised to the
//! Track/Artist/Release/Cluster reconciliation this catalog needs.

use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;
use wkmp_common::events::EventBus;
use wkmp_common::Result;

use crate::db::{CatalogStore, NewArtist, NewRelease, NewTrack};
use crate::feature_client::FeatureClient;
use crate::models::{MediaRootType, ScanStats, UpdatePeriod};
use crate::tag_parser::TagParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    NotScheduled,
    Scheduled,
    InProgress,
}

#[derive(Debug, Clone)]
pub enum ScanEvent {
    RootStarted { root: String },
    RootCompleted { root: String, stats: ScanStats },
    Completed { stats: ScanStats },
    Cancelled,
}

/// Name of the marker file that excludes a directory subtree from the walk.
const DEFAULT_EXCLUSION_MARKER: &str = ".wkmp-ignore";

pub struct ScanEngine {
    store: CatalogStore,
    parser: Arc<dyn TagParser>,
    feature_client: Option<FeatureClient>,
    events: EventBus<ScanEvent>,
    state: Mutex<ScanState>,
    cancel: AtomicBool,
    exclusion_marker: String,
}

impl ScanEngine {
    pub fn new(store: CatalogStore, parser: Arc<dyn TagParser>, feature_client: Option<FeatureClient>) -> Self {
        Self {
            store,
            parser,
            feature_client,
            events: EventBus::default(),
            state: Mutex::new(ScanState::NotScheduled),
            cancel: AtomicBool::new(false),
            exclusion_marker: DEFAULT_EXCLUSION_MARKER.to_string(),
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> ScanState {
        *self.state.lock().await
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Run one full scan cycle: settings → walk every root → orphan sweep →
    /// feature fetch → completion bookkeeping. Returns the aggregate stats.
    pub async fn run_once(&self) -> Result<ScanStats> {
        {
            let mut state = self.state.lock().await;
            *state = ScanState::InProgress;
        }
        self.cancel.store(false, Ordering::SeqCst);

        let settings = self.store.scan_settings().await?;
        let audio_exts = settings.audio_extensions();
        let video_exts = settings.video_extensions();

        let roots = self.store.media_roots().await?;
        let mut total = ScanStats::default();

        for root in &roots {
            if self.cancelled() {
                break;
            }

            self.events.publish(ScanEvent::RootStarted { root: root.path.clone() });

            let extensions: &[String] = match root.kind() {
                MediaRootType::Audio => &audio_exts,
                MediaRootType::Video => &video_exts,
            };

            let stats = self.scan_root(&root.path, extensions).await?;
            total.merge(&stats);

            self.events.publish(ScanEvent::RootCompleted {
                root: root.path.clone(),
                stats: stats.clone(),
            });
        }

        if self.cancelled() {
            let mut state = self.state.lock().await;
            *state = ScanState::NotScheduled;
            self.events.publish(ScanEvent::Cancelled);
            return Ok(total);
        }

        let artists_removed = self.store.sweep_orphan_artists().await?;
        let releases_removed = self.store.sweep_orphan_releases().await?;
        let clusters_removed = self.store.sweep_orphan_clusters().await?;
        debug!(artists_removed, releases_removed, clusters_removed, "orphan sweep complete");

        if let Some(client) = &self.feature_client {
            self.fetch_missing_features(client).await;
        }

        let now = Utc::now();
        self.store.record_scan_completion(now, total.changed()).await?;

        {
            let mut state = self.state.lock().await;
            *state = ScanState::NotScheduled;
        }

        self.events.publish(ScanEvent::Completed { stats: total.clone() });
        Ok(total)
    }

    async fn scan_root(&self, root_path: &str, extensions: &[String]) -> Result<ScanStats> {
        let mut stats = ScanStats::default();
        let root = Path::new(root_path);

        // Step 1: drop cataloged tracks that are no longer present, no
        // longer under this root, or whose extension is no longer enabled.
        let mut stale = Vec::new();
        self.store
            .for_each_track_path(|id, path, _mtime| {
                let p = Path::new(path);
                let under_root = p.starts_with(root);
                if !under_root {
                    return;
                }
                let ext_ok = p
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| extensions.iter().any(|allowed| allowed.trim_start_matches('.') == e))
                    .unwrap_or(false);
                if !p.exists() || !ext_ok {
                    stale.push(id);
                }
            })
            .await?;

        for id in stale {
            self.store.delete_track(id).await?;
            stats.removed += 1;
        }

        // Step 2: recursive walk.
        let walker = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| {
                if !entry.file_type().is_dir() {
                    return true;
                }
                !entry.path().join(&self.exclusion_marker).exists()
            });

        for entry in walker {
            if self.cancelled() {
                break;
            }

            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "walk error");
                    stats.scan_errors += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let ext_matches = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.iter().any(|allowed| allowed.trim_start_matches('.') == e))
                .unwrap_or(false);
            if !ext_matches {
                continue;
            }

            match self.scan_file(path).await {
                Ok(Some(was_new)) => {
                    if was_new {
                        stats.added += 1;
                    } else {
                        stats.updated += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to scan file");
                    stats.scan_errors += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Returns `Some(was_new)` if the track was upserted, `None` if
    /// skip-if-unchanged applied.
    async fn scan_file(&self, path: &Path) -> Result<Option<bool>> {
        let path_str = path.to_string_lossy().to_string();
        let metadata = std::fs::metadata(path)?;
        let mtime: DateTime<Utc> = metadata.modified()?.into();

        if let Some(existing) = self.store.find_track_by_path(&path_str).await? {
            if existing.last_write_time == mtime {
                return Ok(None);
            }
        }

        let parsed = self.parser.parse(path)?;

        if !parsed.is_valid_audio() {
            // A pre-existing matching row is removed; an unreadable new
            // file is simply skipped.
            if let Some(existing) = self.store.find_track_by_path(&path_str).await? {
                self.store.delete_track(existing.id).await?;
            }
            return Ok(None);
        }

        let checksum = format!("{:08x}", compute_crc32(path)?);

        let display_name = parsed.title.clone().unwrap_or_else(|| {
            path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default()
        });

        let release = parsed.release_title.clone().map(|title| NewRelease {
            display_name: title,
            musicbrainz_release_id: parsed.release_mbid.map(|u| u.to_string()),
            total_disc_count: parsed.disc.total,
        });

        let artists = parsed
            .artists
            .iter()
            .map(|(name, mbid)| NewArtist {
                display_name: name.clone(),
                musicbrainz_artist_id: mbid.map(|u| u.to_string()),
            })
            .collect();

        let mut clusters = Vec::new();
        for type_name in ["GENRE", "MOOD"] {
            for value in parsed.cluster_values(type_name) {
                clusters.push((type_name.to_string(), value));
            }
        }

        let new_track = NewTrack {
            path: path_str,
            last_write_time: mtime,
            checksum,
            display_name,
            duration_secs: parsed.duration_secs,
            track_number: parsed.track.number,
            track_total: parsed.track.total,
            disc_number: parsed.disc.number,
            disc_total: parsed.disc.total,
            release_date: parsed.release_date.clone(),
            original_release_date: parsed.original_release_date.clone(),
            musicbrainz_track_id: parsed.track_mbid.map(|u| u.to_string()),
            cover_source: if parsed.has_embedded_picture() {
                crate::models::CoverSource::Embedded
            } else {
                crate::models::CoverSource::None
            },
            release,
            artists,
            clusters,
        };

        let mut tx = self.store.begin_write().await?;
        let (_, was_new) = self.store.upsert_track(&mut tx, &new_track).await?;
        tx.commit().await?;

        Ok(Some(was_new))
    }

    async fn fetch_missing_features(&self, client: &FeatureClient) {
        let mut pending: Vec<(i64, String)> = Vec::new();
        if let Err(e) = self
            .store
            .for_each_track_missing_features(|id, mbid| pending.push((id, mbid.to_string())))
            .await
        {
            error!(error = %e, "failed to enumerate tracks missing features");
            return;
        }

        for (track_id, mbid) in pending {
            if self.cancelled() {
                break;
            }
            match client.fetch(&mbid).await {
                Ok(blob) => {
                    if let Err(e) = self.store.store_features(track_id, &blob).await {
                        error!(track_id, error = %e, "failed to store fetched features");
                    }
                }
                Err(e) => {
                    warn!(track_id, mbid, error = %e, "feature fetch failed, skipping");
                }
            }
        }
    }
}

/// Content checksum (§3's `Track.checksum`): a CRC32 over the file's
/// bytes, grounded on `PathUtils::computeCrc32` (`utils/impl/Path.cpp`),
/// read in fixed-size chunks rather than loaded whole.
fn compute_crc32(path: &Path) -> Result<u32> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; 1024];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize())
}

/// Compute the next scheduled instant, per §4.7's scheduling rule, as a
/// pure function of `(now, period, start_of_day_secs)` so the math is
/// testable without wall-clock manipulation.
pub fn next_occurrence(now: DateTime<Utc>, period: UpdatePeriod, start_of_day_secs: i64) -> Option<DateTime<Utc>> {
    if period == UpdatePeriod::Never {
        return None;
    }

    let offset = NaiveTime::from_num_seconds_from_midnight_opt(
        start_of_day_secs.rem_euclid(86_400) as u32,
        0,
    )?;

    let today_at_offset = Utc
        .from_utc_datetime(&now.date_naive().and_time(offset));

    let candidate_day = match period {
        UpdatePeriod::Daily => {
            if now <= today_at_offset {
                now.date_naive()
            } else {
                now.date_naive() + Duration::days(1)
            }
        }
        UpdatePeriod::Weekly => {
            let days_until_monday = (7 - now.weekday().num_days_from_monday()) % 7;
            if days_until_monday == 0 && now <= today_at_offset {
                now.date_naive()
            } else if days_until_monday == 0 {
                now.date_naive() + Duration::days(7)
            } else {
                now.date_naive() + Duration::days(days_until_monday as i64)
            }
        }
        UpdatePeriod::Monthly => {
            if now.day() == 1 && now <= today_at_offset {
                now.date_naive()
            } else {
                let next_month = if now.month() == 12 {
                    chrono::NaiveDate::from_ymd_opt(now.year() + 1, 1, 1)
                } else {
                    chrono::NaiveDate::from_ymd_opt(now.year(), now.month() + 1, 1)
                };
                next_month.unwrap_or(now.date_naive())
            }
        }
        UpdatePeriod::Never => unreachable!(),
    };

    Some(Utc.from_utc_datetime(&candidate_day.and_time(offset)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn never_period_yields_no_schedule() {
        let now = Utc.with_ymd_and_hms(2026, 7, 26, 10, 0, 0).unwrap();
        assert_eq!(next_occurrence(now, UpdatePeriod::Never, 0), None);
    }

    #[test]
    fn daily_before_offset_uses_today() {
        let now = Utc.with_ymd_and_hms(2026, 7, 26, 1, 0, 0).unwrap();
        let next = next_occurrence(now, UpdatePeriod::Daily, 3 * 3600).unwrap();
        assert_eq!(next.date_naive(), now.date_naive());
        assert_eq!(next.hour(), 3);
    }

    #[test]
    fn daily_after_offset_uses_tomorrow() {
        let now = Utc.with_ymd_and_hms(2026, 7, 26, 10, 0, 0).unwrap();
        let next = next_occurrence(now, UpdatePeriod::Daily, 3 * 3600).unwrap();
        assert_eq!(next.date_naive(), now.date_naive() + Duration::days(1));
    }

    #[test]
    fn weekly_picks_next_monday() {
        // 2026-07-26 is a Sunday.
        let now = Utc.with_ymd_and_hms(2026, 7, 26, 10, 0, 0).unwrap();
        let next = next_occurrence(now, UpdatePeriod::Weekly, 0).unwrap();
        assert_eq!(next.weekday(), chrono::Weekday::Mon);
        assert!(next > now);
    }

    #[test]
    fn monthly_picks_first_of_next_month() {
        let now = Utc.with_ymd_and_hms(2026, 7, 26, 10, 0, 0).unwrap();
        let next = next_occurrence(now, UpdatePeriod::Monthly, 0).unwrap();
        assert_eq!(next.day(), 1);
        assert_eq!(next.month(), 8);
    }
}
