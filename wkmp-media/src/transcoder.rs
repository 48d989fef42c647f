//! Transcoder (§4.5): builds a deterministic `ffmpeg` argument vector per
//! the encoding table and streams the encoded output through a
//! [`ChildProcess`]. Movable but not clonable, and safe to carry across
//! HTTP response continuations (§4.9).

use std::path::Path;

use wkmp_common::Result;

use crate::process_supervisor::ChildProcess;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Mp3,
    OggVorbis,
    OggOpus,
    MatroskaOpus,
    WebmVorbis,
    PcmSigned16Le,
}

impl Encoding {
    fn container_flag(self) -> &'static str {
        match self {
            Encoding::Mp3 => "mp3",
            Encoding::OggVorbis => "ogg",
            Encoding::OggOpus => "ogg",
            Encoding::MatroskaOpus => "matroska",
            Encoding::WebmVorbis => "webm",
            Encoding::PcmSigned16Le => "s16le",
        }
    }

    fn audio_codec(self) -> Option<&'static str> {
        match self {
            Encoding::Mp3 => None,
            Encoding::OggVorbis => Some("libvorbis"),
            Encoding::OggOpus => Some("libopus"),
            Encoding::MatroskaOpus => Some("libopus"),
            Encoding::WebmVorbis => Some("libvorbis"),
            Encoding::PcmSigned16Le => None,
        }
    }

    fn bitrate_required(self) -> bool {
        !matches!(self, Encoding::PcmSigned16Le)
    }
}

#[derive(Debug, Clone)]
pub struct TranscodeParameters {
    pub encoding: Encoding,
    /// Kbps; required unless `encoding` is `PcmSigned16Le`.
    pub bitrate: Option<u32>,
    pub stream: Option<u32>,
    /// Input-side seek offset, in seconds.
    pub offset: Option<f64>,
    pub strip_metadata: bool,
}

fn build_args(input: &Path, params: &TranscodeParameters) -> Vec<String> {
    let mut args = vec!["-hide_banner".to_string(), "-loglevel".to_string(), "quiet".to_string(), "-nostdin".to_string()];

    if let Some(offset) = params.offset {
        args.push("-ss".to_string());
        args.push(format!("{offset}"));
    }

    args.push("-i".to_string());
    args.push(input.to_string_lossy().to_string());

    // Drop video streams, including attached pictures.
    args.push("-vn".to_string());

    if let Some(stream) = params.stream {
        args.push("-map".to_string());
        args.push(format!("0:{stream}"));
    }

    if params.strip_metadata {
        args.push("-map_metadata".to_string());
        args.push("-1".to_string());
    }

    if let Some(codec) = params.encoding.audio_codec() {
        args.push("-c:a".to_string());
        args.push(codec.to_string());
    }

    if params.encoding.bitrate_required() {
        if let Some(bitrate) = params.bitrate {
            args.push("-b:a".to_string());
            args.push(format!("{bitrate}k"));
        }
    }

    if params.encoding == Encoding::PcmSigned16Le {
        args.push("-f".to_string());
        args.push("s16le".to_string());
    } else {
        args.push("-f".to_string());
        args.push(params.encoding.container_flag().to_string());
    }

    args.push("pipe:1".to_string());
    args
}

pub struct Transcoder {
    child: ChildProcess,
}

impl Transcoder {
    pub fn start(ffmpeg_path: &str, input: &Path, params: &TranscodeParameters) -> Result<Self> {
        let args = build_args(input, params);
        let child = ChildProcess::spawn(ffmpeg_path, &args)?;
        Ok(Self { child })
    }

    pub async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.child.read_some(buf).await
    }

    pub fn finished(&mut self) -> bool {
        self.child.finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mp3_args_include_bitrate_but_no_codec_flag() {
        let params = TranscodeParameters {
            encoding: Encoding::Mp3,
            bitrate: Some(192),
            stream: None,
            offset: None,
            strip_metadata: false,
        };
        let args = build_args(Path::new("/music/song.flac"), &params);
        assert!(args.contains(&"-b:a".to_string()));
        assert!(args.contains(&"192k".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
        assert!(args.contains(&"mp3".to_string()));
    }

    #[test]
    fn opus_args_select_libopus_codec() {
        let params = TranscodeParameters {
            encoding: Encoding::OggOpus,
            bitrate: Some(128),
            stream: None,
            offset: None,
            strip_metadata: false,
        };
        let args = build_args(Path::new("/music/song.flac"), &params);
        assert!(args.contains(&"libopus".to_string()));
        assert!(args.contains(&"ogg".to_string()));
    }

    #[test]
    fn pcm_ignores_bitrate() {
        let params = TranscodeParameters {
            encoding: Encoding::PcmSigned16Le,
            bitrate: Some(999),
            stream: None,
            offset: None,
            strip_metadata: false,
        };
        let args = build_args(Path::new("/music/song.flac"), &params);
        assert!(!args.contains(&"-b:a".to_string()));
        assert!(args.contains(&"s16le".to_string()));
    }

    #[test]
    fn offset_adds_seek_flag() {
        let params = TranscodeParameters {
            encoding: Encoding::Mp3,
            bitrate: Some(192),
            stream: None,
            offset: Some(30.5),
            strip_metadata: false,
        };
        let args = build_args(Path::new("/music/song.flac"), &params);
        let ss_pos = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss_pos + 1], "30.5");
    }
}
