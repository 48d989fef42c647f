//! Cover resolver (§4.3), grounded in the original `CoverArtGrabber.cpp`'s
//! resolution order: embedded picture, then directory scan by
//! preference, then the parent directory for multi-disc releases, then a
//! configured default.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::imageops::FilterType;
use image::ImageFormat;
use rand::seq::SliceRandom;
use wkmp_catalog::models::CoverSource;
use wkmp_catalog::tag_parser::TagParser;
use wkmp_catalog::CatalogStore;
use wkmp_common::{Error, Result};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CoverKind {
    Track,
    Release,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct CacheKey {
    kind: CoverKind,
    id: i64,
    size: u32,
}

pub struct CoverResolverConfig {
    pub image_extensions: Vec<String>,
    pub preferred_names: Vec<String>,
    pub max_source_file_size: u64,
    pub jpeg_quality: u8,
    pub default_cover_path: Option<PathBuf>,
    pub max_cache_entries: usize,
}

impl Default for CoverResolverConfig {
    fn default() -> Self {
        Self {
            image_extensions: vec!["jpg".into(), "jpeg".into(), "png".into()],
            preferred_names: vec!["cover".into(), "front".into()],
            max_source_file_size: 10 * 1024 * 1024,
            jpeg_quality: 85,
            default_cover_path: None,
            max_cache_entries: 256,
        }
    }
}

/// A shared-locked, randomised-eviction cache of rescaled JPEG bytes
/// keyed by `(kind, id, size)`. Bounded-degree random eviction keeps the
/// critical section short under concurrent fills, at the cost of strict
/// recency ordering.
struct CoverCache {
    entries: HashMap<CacheKey, Vec<u8>>,
    order: Vec<CacheKey>,
}

impl CoverCache {
    fn new() -> Self {
        Self { entries: HashMap::new(), order: Vec::new() }
    }

    fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: CacheKey, bytes: Vec<u8>, max_entries: usize) {
        if !self.entries.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.entries.insert(key, bytes);

        while self.entries.len() > max_entries {
            let mut rng = rand::thread_rng();
            if self.order.is_empty() {
                break;
            }
            let idx = (0..self.order.len()).collect::<Vec<_>>().choose(&mut rng).copied().unwrap_or(0);
            let victim = self.order.swap_remove(idx);
            self.entries.remove(&victim);
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

pub struct CoverResolver {
    store: CatalogStore,
    parser: std::sync::Arc<dyn TagParser>,
    config: CoverResolverConfig,
    cache: Mutex<CoverCache>,
}

impl CoverResolver {
    pub fn new(store: CatalogStore, parser: std::sync::Arc<dyn TagParser>, config: CoverResolverConfig) -> Self {
        Self { store, parser, config, cache: Mutex::new(CoverCache::new()) }
    }

    pub fn flush_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    pub async fn get_for_track(&self, track_id: i64, size: u32) -> Result<Vec<u8>> {
        let key = CacheKey { kind: CoverKind::Track, id: track_id, size };
        if let Some(cached) = self.cache.lock().unwrap().get(&key) {
            return Ok(cached);
        }

        let track = self
            .store
            .get_track(track_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("track {track_id}")))?;

        let multi_disc = track.disc_total.unwrap_or(1) > 1;
        let path = Path::new(&track.path);

        let raw = if track.cover_source() == CoverSource::Embedded {
            self.embedded_picture(path)?
        } else {
            None
        };

        let raw = match raw {
            Some(bytes) => bytes,
            None => self
                .scan_directories(path, multi_disc)?
                .map(std::fs::read)
                .transpose()?
                .or(self.default_cover()?)
                .ok_or_else(|| Error::NotFound("no cover art available".into()))?,
        };

        let jpeg = rescale_to_jpeg(&raw, size, self.config.jpeg_quality)?;
        self.cache.lock().unwrap().insert(key, jpeg.clone(), self.config.max_cache_entries);
        Ok(jpeg)
    }

    pub async fn get_for_release(&self, release_id: i64, size: u32) -> Result<Vec<u8>> {
        let key = CacheKey { kind: CoverKind::Release, id: release_id, size };
        if let Some(cached) = self.cache.lock().unwrap().get(&key) {
            return Ok(cached);
        }

        let tracks = self.store.tracks_for_release(release_id).await?;
        let first = tracks
            .first()
            .ok_or_else(|| Error::NotFound(format!("release {release_id}")))?;

        let bytes = self.get_for_track(first.id, size).await?;
        self.cache.lock().unwrap().insert(key, bytes.clone(), self.config.max_cache_entries);
        Ok(bytes)
    }

    fn embedded_picture(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let parsed = self.parser.parse(path)?;
        Ok(parsed.pictures.into_iter().next().map(|p| p.data))
    }

    /// Directory scan rule: prefer the file named like the track, then a
    /// configured preferred name, then any remaining image in the
    /// directory; for multi-disc releases also consider the grandparent.
    fn scan_directories(&self, track_path: &Path, multi_disc: bool) -> Result<Option<PathBuf>> {
        let dir = track_path.parent();
        let base_name = track_path.file_stem().and_then(|s| s.to_str()).map(|s| s.to_ascii_lowercase());

        if let Some(dir) = dir {
            if let Some(found) = self.best_image_in(dir, base_name.as_deref())? {
                return Ok(Some(found));
            }
        }

        if multi_disc {
            if let Some(parent) = dir.and_then(|d| d.parent()) {
                if let Some(found) = self.best_image_in(parent, None)? {
                    return Ok(Some(found));
                }
            }
        }

        Ok(None)
    }

    fn best_image_in(&self, dir: &Path, base_name: Option<&str>) -> Result<Option<PathBuf>> {
        let mut by_base_name = None;
        let mut by_preferred: Option<(usize, PathBuf)> = None;
        let mut any = None;

        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(_) => return Ok(None),
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Ok(metadata) = entry.metadata() else { continue };
            if metadata.len() > self.config.max_source_file_size {
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else { continue };
            if !self.config.image_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)) {
                continue;
            }

            let stem = path.file_stem().and_then(|s| s.to_str()).map(|s| s.to_ascii_lowercase());

            if base_name.is_some() && stem.as_deref() == base_name {
                by_base_name = Some(path.clone());
            } else if let Some(stem) = &stem {
                if let Some(rank) = self.config.preferred_names.iter().position(|p| p.eq_ignore_ascii_case(stem)) {
                    if by_preferred.as_ref().map(|(best_rank, _)| rank < *best_rank).unwrap_or(true) {
                        by_preferred = Some((rank, path.clone()));
                    }
                }
            }
            any.get_or_insert(path);
        }

        Ok(by_base_name.or(by_preferred.map(|(_, path)| path)).or(any))
    }

    fn default_cover(&self) -> Result<Option<Vec<u8>>> {
        match &self.config.default_cover_path {
            Some(path) => Ok(Some(std::fs::read(path)?)),
            None => Ok(None),
        }
    }
}

fn rescale_to_jpeg(raw: &[u8], size: u32, quality: u8) -> Result<Vec<u8>> {
    let img = image::load_from_memory(raw).map_err(|e| Error::InvalidInput(format!("unreadable image: {e}")))?;
    let resized = img.resize_to_fill(size, size, FilterType::Lanczos3);

    let mut out = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut Cursor::new(&mut out), quality);
    resized
        .write_with_encoder(encoder)
        .map_err(|e| Error::Internal(format!("jpeg encode failed: {e}")))?;
    let _ = ImageFormat::Jpeg;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_evicts_when_over_capacity() {
        let mut cache = CoverCache::new();
        for i in 0..10 {
            cache.insert(CacheKey { kind: CoverKind::Track, id: i, size: 200 }, vec![0u8; 4], 5);
        }
        assert!(cache.entries.len() <= 5);
    }

    #[test]
    fn rescale_produces_decodable_jpeg() {
        let img = image::RgbImage::from_pixel(16, 16, image::Rgb([10, 20, 30]));
        let mut raw = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut raw), ImageFormat::Png)
            .unwrap();

        let jpeg = rescale_to_jpeg(&raw, 8, 80).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 8);
        assert_eq!(decoded.height(), 8);
    }
}
