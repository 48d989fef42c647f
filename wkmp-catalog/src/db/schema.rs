//! Catalog schema creation. Mirrors `wkmp_common::db::init`'s one-function-
//! per-table style; every statement is an idempotent `CREATE TABLE IF NOT
//! EXISTS` so this can run on every startup.

use sqlx::SqlitePool;
use wkmp_common::Result;

/// Create every catalog table if it doesn't already exist, and seed the
/// singleton rows (`scan_settings`, `similarity_settings`).
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_media_roots(pool).await?;
    create_scan_settings(pool).await?;
    create_artists(pool).await?;
    create_releases(pool).await?;
    create_tracks(pool).await?;
    create_track_artists(pool).await?;
    create_cluster_types(pool).await?;
    create_clusters(pool).await?;
    create_track_clusters(pool).await?;
    create_feature_types(pool).await?;
    create_features(pool).await?;
    create_similarity_settings(pool).await?;
    Ok(())
}

async fn create_media_roots(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media_roots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE,
            root_type TEXT NOT NULL CHECK (root_type IN ('audio', 'video'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_scan_settings(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            update_period TEXT NOT NULL DEFAULT 'never',
            start_of_day_secs INTEGER NOT NULL DEFAULT 0,
            manual_scan_requested INTEGER NOT NULL DEFAULT 0,
            last_scan TIMESTAMP,
            last_update TIMESTAMP,
            audio_extensions TEXT NOT NULL DEFAULT '.mp3,.flac,.ogg,.oga,.m4a,.wav,.opus',
            video_extensions TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO scan_settings (id) VALUES (1)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_artists(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            display_name TEXT NOT NULL,
            musicbrainz_artist_id TEXT UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_releases(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS releases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            display_name TEXT NOT NULL,
            musicbrainz_release_id TEXT UNIQUE,
            total_disc_count INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_tracks(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE,
            last_write_time TIMESTAMP NOT NULL,
            checksum TEXT NOT NULL,
            display_name TEXT NOT NULL,
            duration_secs REAL NOT NULL,
            track_number INTEGER,
            track_total INTEGER,
            disc_number INTEGER,
            disc_total INTEGER,
            release_date TEXT,
            original_release_date TEXT,
            musicbrainz_track_id TEXT,
            acousticbrainz_id TEXT,
            cover_source TEXT NOT NULL DEFAULT 'none',
            release_id INTEGER REFERENCES releases(id) ON DELETE SET NULL,
            added_time TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_release ON tracks(release_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_track_artists(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS track_artists (
            track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
            artist_id INTEGER NOT NULL REFERENCES artists(id) ON DELETE CASCADE,
            position INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (track_id, artist_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_track_artists_artist ON track_artists(artist_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_cluster_types(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cluster_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            enabled INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    for name in ["GENRE", "MOOD"] {
        sqlx::query("INSERT OR IGNORE INTO cluster_types (name, enabled) VALUES (?, 1)")
            .bind(name)
            .execute(pool)
            .await?;
    }

    Ok(())
}

async fn create_clusters(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clusters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cluster_type_id INTEGER NOT NULL REFERENCES cluster_types(id) ON DELETE CASCADE,
            value TEXT NOT NULL,
            UNIQUE(cluster_type_id, value)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_track_clusters(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS track_clusters (
            track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
            cluster_id INTEGER NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
            PRIMARY KEY (track_id, cluster_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_track_clusters_cluster ON track_clusters(cluster_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_feature_types(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feature_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            dimensions INTEGER NOT NULL,
            weight REAL NOT NULL DEFAULT 1.0,
            enabled INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_features(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS features (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            track_id INTEGER NOT NULL UNIQUE REFERENCES tracks(id) ON DELETE CASCADE,
            data TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_similarity_settings(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS similarity_settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            network TEXT,
            normalizer TEXT,
            scan_version INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO similarity_settings (id, scan_version) VALUES (1, 0)")
        .execute(pool)
        .await?;

    Ok(())
}
