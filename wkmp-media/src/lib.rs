//! # wkmp-media
//!
//! Everything downstream of the catalog that turns a Track into response
//! bytes: cover art resolution, transcoding, and ZIP delivery, plus the
//! child-process supervisor they're both built on.

pub mod cover;
pub mod process_supervisor;
pub mod transcoder;
pub mod zip;

pub use cover::{CoverResolver, CoverResolverConfig};
pub use process_supervisor::ChildProcess;
pub use transcoder::{Encoding, Transcoder, TranscodeParameters};
pub use zip::{ZipEntry, ZipStreamer};
