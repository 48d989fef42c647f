//! HTTP handlers (§4.9, §6): catalog list endpoints plus the three
//! streaming operations (transcoded audio, cover art, ZIP download).

use std::path::Path as StdPath;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream;
use serde::Deserialize;
use tokio::sync::OwnedSemaphorePermit;
use wkmp_common::id::{EntityId, EntityKind};
use wkmp_common::pagination::clamp_page;
use wkmp_common::Error;
use wkmp_media::{Encoding, Transcoder, TranscodeParameters, ZipEntry, ZipStreamer};

use crate::error::{ApiError, ApiResult};
use crate::state::AppContext;

pub async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub offset: Option<i64>,
    pub size: Option<i64>,
}

pub async fn list_tracks(State(ctx): State<AppContext>, Query(page): Query<PageParams>) -> ApiResult<Response> {
    let clamped = clamp_page(page.offset, page.size, ctx.config.default_page_size, ctx.config.max_page_size);
    let tracks = ctx.catalog.list_tracks(clamped.offset, clamped.limit).await.map_err(ApiError::from)?;
    Ok(Json(tracks).into_response())
}

pub async fn list_releases(State(ctx): State<AppContext>, Query(page): Query<PageParams>) -> ApiResult<Response> {
    let clamped = clamp_page(page.offset, page.size, ctx.config.default_page_size, ctx.config.max_page_size);
    let releases = ctx.catalog.list_releases(clamped.offset, clamped.limit).await.map_err(ApiError::from)?;
    Ok(Json(releases).into_response())
}

pub async fn list_artists(State(ctx): State<AppContext>, Query(page): Query<PageParams>) -> ApiResult<Response> {
    let clamped = clamp_page(page.offset, page.size, ctx.config.default_page_size, ctx.config.max_page_size);
    let artists = ctx.catalog.list_artists(clamped.offset, clamped.limit).await.map_err(ApiError::from)?;
    Ok(Json(artists).into_response())
}

#[derive(Debug, Deserialize)]
pub struct SimilarParams {
    pub id: String,
    #[serde(default = "default_similar_max")]
    pub max: usize,
}

fn default_similar_max() -> usize {
    20
}

/// §4.8.3: similar entities for a single track/release/artist id. Returns
/// an empty list, not an error, while the network hasn't trained yet.
pub async fn similar(State(ctx): State<AppContext>, Query(params): Query<SimilarParams>) -> ApiResult<Response> {
    let entity = EntityId::parse(&params.id).map_err(ApiError::from)?;
    let max = params.max.min(200);

    if max == 0 {
        return Ok(Json(Vec::<i64>::new()).into_response());
    }

    let searcher = ctx.similarity.read().await.clone();
    let Some(searcher) = searcher else {
        return Ok(Json(Vec::<i64>::new()).into_response());
    };

    let ids = match entity.kind {
        EntityKind::Track => searcher.similar_tracks(&[entity.id], max),
        EntityKind::Album => searcher.similar_releases(entity.id, max),
        EntityKind::Artist => searcher.similar_artists(entity.id, max),
        other => return Err(ApiError::from(Error::BadRequest(format!("similarity not supported for {other:?}")))),
    };

    Ok(Json(ids).into_response())
}

#[derive(Debug, Deserialize)]
pub struct CoverParams {
    pub id: String,
    #[serde(default = "default_cover_kind")]
    pub kind: String,
    pub size: Option<u32>,
}

fn default_cover_kind() -> String {
    "track".to_string()
}

pub async fn cover(State(ctx): State<AppContext>, Query(params): Query<CoverParams>) -> ApiResult<Response> {
    let entity = EntityId::parse(&params.id).map_err(ApiError::from)?;
    let size = params.size.unwrap_or(300).clamp(16, 2048);

    let bytes = match params.kind.as_str() {
        "release" => ctx.cover.get_for_release(entity.id, size).await,
        _ => ctx.cover.get_for_track(entity.id, size).await,
    }
    .map_err(ApiError::from)?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub id: String,
    pub bitrate: Option<u32>,
    pub format: Option<String>,
    pub offset: Option<f64>,
}

fn parse_encoding(format: Option<&str>) -> Result<Encoding, Error> {
    match format.unwrap_or("mp3").to_ascii_lowercase().as_str() {
        "mp3" => Ok(Encoding::Mp3),
        "ogg_vorbis" | "vorbis" => Ok(Encoding::OggVorbis),
        "ogg_opus" | "opus" => Ok(Encoding::OggOpus),
        "matroska_opus" => Ok(Encoding::MatroskaOpus),
        "webm_vorbis" => Ok(Encoding::WebmVorbis),
        "pcm" | "pcm_signed_16_le" => Ok(Encoding::PcmSigned16Le),
        other => Err(Error::BadRequest(format!("unsupported encoding: {other}"))),
    }
}

/// §4.9: validate, resolve the track via a fast shared transaction, spawn
/// the transcoder, then stream its output as an async body. Range
/// requests are deliberately not honoured (the output isn't seekable);
/// seek-within-track is expressed as an input-side `offset` instead.
pub async fn stream(State(ctx): State<AppContext>, Query(params): Query<StreamParams>) -> ApiResult<Response> {
    let entity = EntityId::parse(&params.id).map_err(ApiError::from)?;
    if entity.kind != EntityKind::Track {
        return Err(ApiError::from(Error::BadRequest("stream id must be a track".into())));
    }

    let track = ctx
        .catalog
        .get_track(entity.id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::from(Error::NotFound(format!("track {}", entity.id))))?;

    let encoding = parse_encoding(params.format.as_deref()).map_err(ApiError::from)?;

    let permit = Arc::clone(&ctx.transcode_slots)
        .try_acquire_owned()
        .map_err(|_| ApiError::from(Error::ResourceExhausted("transcode slot limit reached".into())))?;

    let transcode_params = TranscodeParameters {
        encoding,
        bitrate: params.bitrate.map(|b| b / 1000).or(Some(128)),
        stream: None,
        offset: params.offset,
        strip_metadata: true,
    };

    let transcoder = Transcoder::start(&ctx.config.ffmpeg_file, StdPath::new(&track.path), &transcode_params)
        .map_err(|e| ApiError::from(Error::BadRequest(e.to_string())))?;

    let body = Body::from_stream(transcoder_stream(transcoder, permit));

    Response::builder()
        .header(header::CONTENT_TYPE, encoding_content_type(encoding))
        .body(body)
        .map_err(|e| ApiError::from(Error::Internal(e.to_string())))
}

fn encoding_content_type(encoding: Encoding) -> &'static str {
    match encoding {
        Encoding::Mp3 => "audio/mpeg",
        Encoding::OggVorbis | Encoding::OggOpus => "audio/ogg",
        Encoding::MatroskaOpus => "audio/x-matroska",
        Encoding::WebmVorbis => "audio/webm",
        Encoding::PcmSigned16Le => "audio/L16",
    }
}

fn transcoder_stream(
    transcoder: Transcoder,
    permit: OwnedSemaphorePermit,
) -> impl futures::Stream<Item = Result<Vec<u8>, std::io::Error>> {
    stream::unfold((transcoder, permit), |(mut t, permit)| async move {
        let mut buf = vec![0u8; 64 * 1024];
        match t.read_some(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(buf), (t, permit)))
            }
            Err(e) => Some((Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())), (t, permit))),
        }
    })
}

pub async fn download(
    State(ctx): State<AppContext>,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<Response> {
    let entries = match kind.as_str() {
        "track" => {
            let track = ctx
                .catalog
                .get_track(id)
                .await
                .map_err(ApiError::from)?
                .ok_or_else(|| ApiError::from(Error::NotFound(format!("track {id}"))))?;
            vec![zip_entry_for_track(&track)]
        }
        "release" => {
            let tracks = ctx.catalog.tracks_for_release(id).await.map_err(ApiError::from)?;
            tracks.iter().map(zip_entry_for_track).collect()
        }
        "artist" => {
            let tracks = ctx.catalog.tracks_for_artist(id).await.map_err(ApiError::from)?;
            tracks.iter().map(zip_entry_for_track).collect()
        }
        other => return Err(ApiError::from(Error::BadRequest(format!("unknown download kind: {other}")))),
    };

    if entries.is_empty() {
        return Err(ApiError::from(Error::NotFound(format!("{kind} {id}"))));
    }

    let total = ZipStreamer::total_size(&entries);
    let streamer = ZipStreamer::new(entries);

    let body = Body::from_stream(zip_stream(streamer));

    Response::builder()
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, total)
        .body(body)
        .map_err(|e| ApiError::from(Error::Internal(e.to_string())))
}

fn zip_entry_for_track(track: &wkmp_catalog::models::Track) -> ZipEntry {
    let path = StdPath::new(&track.path);
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let archive_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| track.display_name.clone());
    ZipEntry { archive_name, source_path: path.to_path_buf(), size }
}

fn zip_stream(mut streamer: ZipStreamer) -> impl futures::Stream<Item = Result<Vec<u8>, std::io::Error>> {
    stream::unfold(streamer, |mut s| async move {
        let mut buf = vec![0u8; 64 * 1024];
        match s.write_some(&mut buf) {
            Ok(0) if s.is_complete() => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(buf), s))
            }
            Err(e) => Some((Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())), s)),
        }
    })
}
