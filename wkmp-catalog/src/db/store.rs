//! The catalog store: a transactional session over the schema in
//! [`crate::db::schema`], with two transaction kinds (shared/read,
//! exclusive/write per §4.1) and cursor-style bulk iteration so a full
//! scan never has to load the whole catalog into memory.

use crate::models::*;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::{Sqlite, SqlitePool, Transaction};
use wkmp_common::{Error, Result};

/// A thin wrapper around the connection pool. "Shared" reads run directly
/// against the pool (sqlite serializes writers but allows concurrent
/// readers); "exclusive" writes go through [`CatalogStore::begin_write`],
/// whose `Transaction` enforces that every multi-row invariant in §3 is
/// checked and applied atomically.
#[derive(Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

/// Everything the scan engine has parsed for one track, ready to be
/// reconciled against the catalog inside a single write transaction.
pub struct NewTrack {
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
    pub cover_source: CoverSource,
    pub release: Option<NewRelease>,
    pub artists: Vec<NewArtist>,
    pub clusters: Vec<(String, String)>,
}

pub struct NewRelease {
    pub display_name: String,
    pub musicbrainz_release_id: Option<String>,
    pub total_disc_count: Option<i64>,
}

pub struct NewArtist {
    pub display_name: String,
    pub musicbrainz_artist_id: Option<String>,
}

impl CatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin an exclusive read/write transaction.
    pub async fn begin_write(&self) -> Result<Transaction<'_, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    // ---- MediaRoot -------------------------------------------------

    pub async fn media_roots(&self) -> Result<Vec<MediaRoot>> {
        Ok(sqlx::query_as::<_, MediaRoot>("SELECT * FROM media_roots")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn add_media_root(&self, path: &str, kind: MediaRootType) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO media_roots (path, root_type) VALUES (?, ?) RETURNING id",
        )
        .bind(path)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    // ---- ScanSettings ------------------------------------------------

    pub async fn scan_settings(&self) -> Result<ScanSettings> {
        Ok(sqlx::query_as::<_, ScanSettings>("SELECT * FROM scan_settings WHERE id = 1")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn request_manual_scan(&self) -> Result<()> {
        sqlx::query("UPDATE scan_settings SET manual_scan_requested = 1 WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// §3 invariant 5: clearing the manual-scan flag and recording
    /// `last_scan` (and, if anything changed, `last_update`) happen in one
    /// atomic statement.
    pub async fn record_scan_completion(&self, now: DateTime<Utc>, changed: bool) -> Result<()> {
        if changed {
            sqlx::query(
                "UPDATE scan_settings SET manual_scan_requested = 0, last_scan = ?, last_update = ? WHERE id = 1",
            )
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE scan_settings SET manual_scan_requested = 0, last_scan = ? WHERE id = 1",
            )
            .bind(now)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    // ---- Track lookup / bulk iteration --------------------------------

    pub async fn find_track_by_path(&self, path: &str) -> Result<Option<Track>> {
        Ok(sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_track(&self, id: i64) -> Result<Option<Track>> {
        Ok(sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Cursor over every cataloged track path + last-write-time, in path
    /// order, used by the scan engine's stale-track sweep (§4.7 step 1).
    pub async fn for_each_track_path<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(i64, &str, DateTime<Utc>),
    {
        let mut rows = sqlx::query_as::<_, (i64, String, DateTime<Utc>)>(
            "SELECT id, path, last_write_time FROM tracks ORDER BY path",
        )
        .fetch(&self.pool);

        while let Some((id, path, mtime)) = rows.try_next().await? {
            f(id, &path, mtime);
        }
        Ok(())
    }

    pub async fn delete_track(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM tracks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Cursor over tracks that have a known MusicBrainz track id but no
    /// `Features` row yet (§4.7's feature-fetch addon).
    pub async fn for_each_track_missing_features<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(i64, &str),
    {
        let mut rows = sqlx::query_as::<_, (i64, String)>(
            r#"
            SELECT t.id, t.musicbrainz_track_id FROM tracks t
            LEFT JOIN features feat ON feat.track_id = t.id
            WHERE t.musicbrainz_track_id IS NOT NULL AND feat.id IS NULL
            "#,
        )
        .fetch(&self.pool);

        while let Some((id, mbid)) = rows.try_next().await? {
            f(id, &mbid);
        }
        Ok(())
    }

    pub async fn store_features(&self, track_id: i64, data: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO features (track_id, data) VALUES (?, ?) ON CONFLICT(track_id) DO UPDATE SET data = excluded.data",
        )
        .bind(track_id)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Cursor over every track that has a `Features` row, for similarity
    /// training.
    pub async fn for_each_track_with_features<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(i64, &str),
    {
        let mut rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT track_id, data FROM features",
        )
        .fetch(&self.pool);

        while let Some((track_id, data)) = rows.try_next().await? {
            f(track_id, &data);
        }
        Ok(())
    }

    // ---- Reconciliation: upsert a parsed track inside a write tx ------

    /// Insert or update a track row plus its Artist/Release/Cluster
    /// references, all inside the caller's write transaction (§4.7 step 3).
    /// Returns `(track_id, was_new)`.
    pub async fn upsert_track(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        new: &NewTrack,
    ) -> Result<(i64, bool)> {
        let release_id = match &new.release {
            Some(r) => Some(self.resolve_release(tx, r).await?),
            None => None,
        };

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM tracks WHERE path = ?")
                .bind(&new.path)
                .fetch_optional(&mut **tx)
                .await?;

        let was_new = existing.is_none();

        let track_id = if let Some(id) = existing {
            sqlx::query(
                r#"
                UPDATE tracks SET
                    last_write_time = ?, checksum = ?, display_name = ?, duration_secs = ?,
                    track_number = ?, track_total = ?, disc_number = ?, disc_total = ?,
                    release_date = ?, original_release_date = ?, musicbrainz_track_id = ?,
                    cover_source = ?, release_id = ?
                WHERE id = ?
                "#,
            )
            .bind(new.last_write_time)
            .bind(&new.checksum)
            .bind(&new.display_name)
            .bind(new.duration_secs)
            .bind(new.track_number)
            .bind(new.track_total)
            .bind(new.disc_number)
            .bind(new.disc_total)
            .bind(&new.release_date)
            .bind(&new.original_release_date)
            .bind(&new.musicbrainz_track_id)
            .bind(new.cover_source.as_str())
            .bind(release_id)
            .bind(id)
            .execute(&mut **tx)
            .await?;
            id
        } else {
            sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO tracks (
                    path, last_write_time, checksum, display_name, duration_secs,
                    track_number, track_total, disc_number, disc_total,
                    release_date, original_release_date, musicbrainz_track_id,
                    cover_source, release_id
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(&new.path)
            .bind(new.last_write_time)
            .bind(&new.checksum)
            .bind(&new.display_name)
            .bind(new.duration_secs)
            .bind(new.track_number)
            .bind(new.track_total)
            .bind(new.disc_number)
            .bind(new.disc_total)
            .bind(&new.release_date)
            .bind(&new.original_release_date)
            .bind(&new.musicbrainz_track_id)
            .bind(new.cover_source.as_str())
            .bind(release_id)
            .fetch_one(&mut **tx)
            .await?
        };

        let mut artist_ids = Vec::with_capacity(new.artists.len());
        for artist in &new.artists {
            artist_ids.push(self.resolve_artist(tx, artist).await?);
        }
        self.set_track_artists(tx, track_id, &artist_ids).await?;

        let mut cluster_ids = Vec::with_capacity(new.clusters.len());
        for (type_name, value) in &new.clusters {
            cluster_ids.push(self.resolve_cluster(tx, type_name, value).await?);
        }
        self.set_track_clusters(tx, track_id, &cluster_ids).await?;

        Ok((track_id, was_new))
    }

    /// §3 invariant 3 (MBID canonicalisation): an MBID match always wins;
    /// a name-only match creates a new row only when no MBID is present on
    /// the incoming record.
    async fn resolve_artist(&self, tx: &mut Transaction<'_, Sqlite>, artist: &NewArtist) -> Result<i64> {
        if let Some(mbid) = &artist.musicbrainz_artist_id {
            if let Some(id) = sqlx::query_scalar::<_, i64>(
                "SELECT id FROM artists WHERE musicbrainz_artist_id = ?",
            )
            .bind(mbid)
            .fetch_optional(&mut **tx)
            .await?
            {
                return Ok(id);
            }

            return Ok(sqlx::query_scalar::<_, i64>(
                "INSERT INTO artists (display_name, musicbrainz_artist_id) VALUES (?, ?) RETURNING id",
            )
            .bind(&artist.display_name)
            .bind(mbid)
            .fetch_one(&mut **tx)
            .await?);
        }

        if let Some(id) = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM artists WHERE display_name = ? AND musicbrainz_artist_id IS NULL",
        )
        .bind(&artist.display_name)
        .fetch_optional(&mut **tx)
        .await?
        {
            return Ok(id);
        }

        Ok(sqlx::query_scalar::<_, i64>(
            "INSERT INTO artists (display_name, musicbrainz_artist_id) VALUES (?, NULL) RETURNING id",
        )
        .bind(&artist.display_name)
        .fetch_one(&mut **tx)
        .await?)
    }

    async fn resolve_release(&self, tx: &mut Transaction<'_, Sqlite>, release: &NewRelease) -> Result<i64> {
        if let Some(mbid) = &release.musicbrainz_release_id {
            if let Some(id) = sqlx::query_scalar::<_, i64>(
                "SELECT id FROM releases WHERE musicbrainz_release_id = ?",
            )
            .bind(mbid)
            .fetch_optional(&mut **tx)
            .await?
            {
                return Ok(id);
            }

            return Ok(sqlx::query_scalar::<_, i64>(
                "INSERT INTO releases (display_name, musicbrainz_release_id, total_disc_count) VALUES (?, ?, ?) RETURNING id",
            )
            .bind(&release.display_name)
            .bind(mbid)
            .bind(release.total_disc_count)
            .fetch_one(&mut **tx)
            .await?);
        }

        if let Some(id) = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM releases WHERE display_name = ? AND musicbrainz_release_id IS NULL",
        )
        .bind(&release.display_name)
        .fetch_optional(&mut **tx)
        .await?
        {
            return Ok(id);
        }

        Ok(sqlx::query_scalar::<_, i64>(
            "INSERT INTO releases (display_name, musicbrainz_release_id, total_disc_count) VALUES (?, NULL, ?) RETURNING id",
        )
        .bind(&release.display_name)
        .bind(release.total_disc_count)
        .fetch_one(&mut **tx)
        .await?)
    }

    async fn resolve_cluster(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        type_name: &str,
        value: &str,
    ) -> Result<i64> {
        let type_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM cluster_types WHERE name = ? AND enabled = 1")
                .bind(type_name)
                .fetch_optional(&mut **tx)
                .await?;

        let type_id = match type_id {
            Some(id) => id,
            None => {
                return Err(Error::InvalidInput(format!(
                    "unknown or disabled cluster type: {type_name}"
                )))
            }
        };

        if let Some(id) = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM clusters WHERE cluster_type_id = ? AND value = ?",
        )
        .bind(type_id)
        .bind(value)
        .fetch_optional(&mut **tx)
        .await?
        {
            return Ok(id);
        }

        Ok(sqlx::query_scalar::<_, i64>(
            "INSERT INTO clusters (cluster_type_id, value) VALUES (?, ?) RETURNING id",
        )
        .bind(type_id)
        .bind(value)
        .fetch_one(&mut **tx)
        .await?)
    }

    async fn set_track_artists(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        track_id: i64,
        artist_ids: &[i64],
    ) -> Result<()> {
        sqlx::query("DELETE FROM track_artists WHERE track_id = ?")
            .bind(track_id)
            .execute(&mut **tx)
            .await?;

        for (position, artist_id) in artist_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO track_artists (track_id, artist_id, position) VALUES (?, ?, ?)",
            )
            .bind(track_id)
            .bind(artist_id)
            .bind(position as i64)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn set_track_clusters(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        track_id: i64,
        cluster_ids: &[i64],
    ) -> Result<()> {
        sqlx::query("DELETE FROM track_clusters WHERE track_id = ?")
            .bind(track_id)
            .execute(&mut **tx)
            .await?;

        for cluster_id in cluster_ids {
            sqlx::query("INSERT OR IGNORE INTO track_clusters (track_id, cluster_id) VALUES (?, ?)")
                .bind(track_id)
                .bind(cluster_id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    // ---- Orphan sweep --------------------------------------------------

    /// §4.7 "orphan sweep": three separate write transactions, one per
    /// entity type, each deleting rows with no remaining referencing
    /// Track. Returns the number of rows deleted per entity.
    pub async fn sweep_orphan_artists(&self) -> Result<u64> {
        let mut tx = self.begin_write().await?;
        let result = sqlx::query(
            "DELETE FROM artists WHERE id NOT IN (SELECT DISTINCT artist_id FROM track_artists)",
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    pub async fn sweep_orphan_releases(&self) -> Result<u64> {
        let mut tx = self.begin_write().await?;
        let result = sqlx::query(
            "DELETE FROM releases WHERE id NOT IN (SELECT DISTINCT release_id FROM tracks WHERE release_id IS NOT NULL)",
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    pub async fn sweep_orphan_clusters(&self) -> Result<u64> {
        let mut tx = self.begin_write().await?;
        let result = sqlx::query(
            "DELETE FROM clusters WHERE id NOT IN (SELECT DISTINCT cluster_id FROM track_clusters)",
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    // ---- Catalog list endpoints (§4.9) ---------------------------------

    pub async fn list_tracks(&self, offset: i64, limit: i64) -> Result<Vec<Track>> {
        Ok(sqlx::query_as::<_, Track>(
            "SELECT * FROM tracks ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn list_releases(&self, offset: i64, limit: i64) -> Result<Vec<Release>> {
        Ok(sqlx::query_as::<_, Release>(
            "SELECT * FROM releases ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn list_artists(&self, offset: i64, limit: i64) -> Result<Vec<Artist>> {
        Ok(sqlx::query_as::<_, Artist>(
            "SELECT * FROM artists ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_release(&self, id: i64) -> Result<Option<Release>> {
        Ok(sqlx::query_as::<_, Release>("SELECT * FROM releases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_artist(&self, id: i64) -> Result<Option<Artist>> {
        Ok(sqlx::query_as::<_, Artist>("SELECT * FROM artists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn tracks_for_release(&self, release_id: i64) -> Result<Vec<Track>> {
        Ok(sqlx::query_as::<_, Track>(
            "SELECT * FROM tracks WHERE release_id = ? ORDER BY disc_number, track_number",
        )
        .bind(release_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Every (track_id, artist_id) link, for building release/artist
    /// position sets from track-level similarity assignments.
    pub async fn all_track_artist_links(&self) -> Result<Vec<(i64, i64)>> {
        Ok(sqlx::query_as::<_, (i64, i64)>(
            "SELECT track_id, artist_id FROM track_artists",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn tracks_for_artist(&self, artist_id: i64) -> Result<Vec<Track>> {
        Ok(sqlx::query_as::<_, Track>(
            r#"
            SELECT t.* FROM tracks t
            JOIN track_artists ta ON ta.track_id = t.id
            WHERE ta.artist_id = ?
            ORDER BY t.id
            "#,
        )
        .bind(artist_id)
        .fetch_all(&self.pool)
        .await?)
    }

    // ---- FeatureType / SimilaritySettings -------------------------------

    pub async fn enabled_feature_types(&self) -> Result<Vec<FeatureType>> {
        Ok(sqlx::query_as::<_, FeatureType>(
            "SELECT * FROM feature_types WHERE enabled = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn similarity_settings(&self) -> Result<SimilaritySettings> {
        Ok(sqlx::query_as::<_, SimilaritySettings>(
            "SELECT * FROM similarity_settings WHERE id = 1",
        )
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn bump_scan_version(&self) -> Result<i64> {
        sqlx::query("UPDATE similarity_settings SET scan_version = scan_version + 1, network = NULL, normalizer = NULL WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(self.similarity_settings().await?.scan_version)
    }

    pub async fn store_trained_network(&self, network: &str, normalizer: &str) -> Result<()> {
        sqlx::query("UPDATE similarity_settings SET network = ?, normalizer = ? WHERE id = 1")
            .bind(network)
            .bind(normalizer)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
