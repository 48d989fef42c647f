//! Tag parsing (§4.2): a single generic container/tag reader built on
//! `symphonia`, the crate the rest of this workspace already uses for
//! audio decoding. Every tag key is upper-cased before matching so the
//! same rules apply whether the source container is ID3, Vorbis comments,
//! or MP4 atoms.

use std::collections::HashMap;
use std::path::Path;

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, StandardTagKey, Value, Visual};
use symphonia::core::probe::Hint;
use uuid::Uuid;
use wkmp_common::{Error, Result};

/// A single embedded picture, MIME type plus raw bytes, in the order
/// found in the container.
#[derive(Debug, Clone)]
pub struct EmbeddedPicture {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Decomposition of a `"N"` or `"N/M"` tag value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NumberOfTotal {
    pub number: Option<i64>,
    pub total: Option<i64>,
}

fn split_number_of_total(raw: &str) -> NumberOfTotal {
    let mut parts = raw.splitn(2, '/');
    let number = parts.next().and_then(|s| s.trim().parse::<i64>().ok());
    let total = parts.next().and_then(|s| s.trim().parse::<i64>().ok());
    NumberOfTotal { number, total }
}

/// Everything the scan engine needs out of one file (§4.2's contract).
#[derive(Debug, Clone)]
pub struct ParsedTrack {
    pub stream_bitrates: Vec<u32>,
    pub duration_secs: f64,
    pub pictures: Vec<EmbeddedPicture>,
    /// Upper-cased tag key → raw string value, kept around for
    /// ClusterType matching after the well-known fields are extracted.
    pub tags: HashMap<String, String>,

    pub title: Option<String>,
    pub artists: Vec<(String, Option<Uuid>)>,
    pub release_title: Option<String>,
    pub release_mbid: Option<Uuid>,
    pub track: NumberOfTotal,
    pub disc: NumberOfTotal,
    pub release_date: Option<String>,
    pub original_release_date: Option<String>,
    pub track_mbid: Option<Uuid>,
}

impl ParsedTrack {
    /// §4.2: "A track is considered valid audio iff it has ≥1 audio
    /// stream AND duration > 0."
    pub fn is_valid_audio(&self) -> bool {
        !self.stream_bitrates.is_empty() && self.duration_secs > 0.0
    }

    pub fn has_embedded_picture(&self) -> bool {
        !self.pictures.is_empty()
    }

    /// Split a tag value whose key matches a configured ClusterType name
    /// on `/`, `,`, or `;` into a set of distinct values.
    pub fn cluster_values(&self, tag_key: &str) -> Vec<String> {
        self.tags
            .get(&tag_key.to_ascii_uppercase())
            .map(|raw| {
                raw.split(['/', ',', ';'])
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub trait TagParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<ParsedTrack>;
}

/// The default, symphonia-backed parser.
pub struct SymphoniaTagParser;

impl TagParser for SymphoniaTagParser {
    fn parse(&self, path: &Path) -> Result<ParsedTrack> {
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::InvalidInput(format!("unrecognised media container: {e}")))?;

        let mut format = probed.format;

        let stream_bitrates: Vec<u32> = format
            .tracks()
            .iter()
            .filter_map(|t| t.codec_params.sample_rate)
            .collect();

        let duration_secs = format
            .tracks()
            .iter()
            .find_map(|t| {
                let params = &t.codec_params;
                let n_frames = params.n_frames?;
                let time_base = params.time_base?;
                let time = time_base.calc_time(n_frames);
                Some(time.seconds as f64 + time.frac)
            })
            .unwrap_or(0.0);

        let mut tags: HashMap<String, String> = HashMap::new();
        let mut pictures = Vec::new();
        let mut title = None;
        let mut artist_names: Vec<String> = Vec::new();
        let mut artist_mbids: Vec<Uuid> = Vec::new();
        let mut release_title = None;
        let mut release_mbid = None;
        let mut track_raw = None;
        let mut disc_raw = None;
        let mut release_date = None;
        let mut original_release_date = None;
        let mut track_mbid = None;

        let mut drain_revision = |tags_list: &[symphonia::core::meta::Tag], visuals: &[Visual]| {
            for tag in tags_list {
                let key = tag.key.to_ascii_uppercase();
                let value = tag_value_to_string(&tag.value);

                match tag.std_key {
                    Some(StandardTagKey::TrackTitle) => title = Some(value.clone()),
                    Some(StandardTagKey::Artist) => {
                        artist_names = split_artists(&value);
                    }
                    Some(StandardTagKey::Album) => release_title = Some(value.clone()),
                    Some(StandardTagKey::MusicBrainzReleaseId) => {
                        release_mbid = Uuid::parse_str(value.trim()).ok();
                    }
                    Some(StandardTagKey::MusicBrainzTrackId) => {
                        track_mbid = Uuid::parse_str(value.trim()).ok();
                    }
                    Some(StandardTagKey::MusicBrainzArtistId) => {
                        artist_mbids = value
                            .split(['/', ';'])
                            .filter_map(|s| Uuid::parse_str(s.trim()).ok())
                            .collect();
                    }
                    Some(StandardTagKey::TrackNumber) => track_raw = Some(value.clone()),
                    Some(StandardTagKey::DiscNumber) => disc_raw = Some(value.clone()),
                    Some(StandardTagKey::Date) => release_date = Some(value.clone()),
                    Some(StandardTagKey::OriginalDate) => original_release_date = Some(value.clone()),
                    _ => {}
                }

                if key == "ARTISTS" {
                    artist_names = split_artists(&value);
                }
                if key == "TRACK" || key == "TRACKNUMBER" {
                    track_raw = Some(value.clone());
                }
                if key == "DISC" || key == "DISCNUMBER" {
                    disc_raw = Some(value.clone());
                }
                if key == "YEAR" || key == "TDOR" {
                    if release_date.is_none() {
                        release_date = Some(value.clone());
                    }
                }
                if key == "TORY" || key == "ORIGINALYEAR" {
                    if original_release_date.is_none() {
                        original_release_date = Some(value.clone());
                    }
                }

                tags.insert(key, value);
            }

            for visual in visuals {
                pictures.push(EmbeddedPicture {
                    mime_type: visual.media_type.clone(),
                    data: visual.data.to_vec(),
                });
            }
        };

        while let Some(revision) = format.metadata().pop() {
            drain_revision(revision.tags(), revision.visuals());
        }
        if let Some(revision) = format.metadata().current() {
            drain_revision(revision.tags(), revision.visuals());
        }

        // Original-date fallback (§4.2): if OriginalDate present but Date
        // absent, copy OriginalDate into Date.
        if release_date.is_none() {
            release_date = original_release_date.clone();
        }

        let artists = if artist_names.len() == artist_mbids.len() && !artist_names.is_empty() {
            artist_names
                .into_iter()
                .zip(artist_mbids.into_iter().map(Some))
                .collect()
        } else {
            artist_names.into_iter().map(|name| (name, None)).collect()
        };

        Ok(ParsedTrack {
            stream_bitrates,
            duration_secs,
            pictures,
            tags,
            title,
            artists,
            release_title,
            release_mbid,
            track: track_raw.as_deref().map(split_number_of_total).unwrap_or_default(),
            disc: disc_raw.as_deref().map(split_number_of_total).unwrap_or_default(),
            release_date,
            original_release_date,
            track_mbid,
        })
    }
}

fn split_artists(raw: &str) -> Vec<String> {
    raw.split(['/', ';'])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn tag_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Binary(_) => String::new(),
        Value::Boolean(b) => b.to_string(),
        Value::Flag => "1".to_string(),
        Value::Float(f) => f.to_string(),
        Value::SignedInt(i) => i.to_string(),
        Value::UnsignedInt(u) => u.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_number_of_total() {
        assert_eq!(
            split_number_of_total("3/12"),
            NumberOfTotal { number: Some(3), total: Some(12) }
        );
        assert_eq!(
            split_number_of_total("3"),
            NumberOfTotal { number: Some(3), total: None }
        );
    }

    #[test]
    fn splits_multivalued_artists_on_slash_and_semicolon() {
        assert_eq!(split_artists("Alice/Bob;Carol"), vec!["Alice", "Bob", "Carol"]);
    }
}
