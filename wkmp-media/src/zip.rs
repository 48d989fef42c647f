//! ZIP streamer (§4.6), grounded in the original `Zipper.hpp`: a state
//! machine that emits a store-method (no compression) archive one buffer
//! at a time, falling back to ZIP64 fields only for entries or totals
//! that don't fit the 32-bit format.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use crc32fast::Hasher;
use wkmp_common::{Error, Result};

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const ZIP64_EOCD_SIG: u32 = 0x0606_4b50;
const ZIP64_LOCATOR_SIG: u32 = 0x0706_4b50;
const EOCD_SIG: u32 = 0x0605_4b50;

const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

pub struct ZipEntry {
    pub archive_name: String,
    pub source_path: PathBuf,
    pub size: u64,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WriteState {
    LocalFileHeader,
    FileData,
    DataDescriptor,
    CentralDirectory,
    EndOfCentralDirectory,
    Complete,
}

struct FinishedEntry {
    name: String,
    size: u64,
    crc32: u32,
    local_header_offset: u64,
}

/// Drives a ZIP archive out one `write_some` call at a time. Not `Clone`;
/// meant to be carried across HTTP response continuations like
/// [`crate::transcoder::Transcoder`].
pub struct ZipStreamer {
    entries: VecDeque<ZipEntry>,
    state: WriteState,
    pending: Vec<u8>,
    pending_pos: usize,
    offset: u64,
    finished: Vec<FinishedEntry>,
    current_reader: Option<BufReader<File>>,
    current_hasher: Hasher,
    current_remaining: u64,
    current_name: String,
    current_size: u64,
    current_local_offset: u64,
    cd_cursor: usize,
}

impl ZipStreamer {
    pub fn new(entries: Vec<ZipEntry>) -> Self {
        Self {
            entries: entries.into(),
            state: WriteState::LocalFileHeader,
            pending: Vec::new(),
            pending_pos: 0,
            offset: 0,
            finished: Vec::new(),
            current_reader: None,
            current_hasher: Hasher::new(),
            current_remaining: 0,
            current_name: String::new(),
            current_size: 0,
            current_local_offset: 0,
            cd_cursor: 0,
        }
    }

    /// The exact total output size, computable up front from entry names
    /// and pre-stat'd sizes, so the HTTP layer can advertise
    /// `Content-Length` before streaming begins.
    pub fn total_size(entries: &[ZipEntry]) -> u64 {
        let mut offset = 0u64;
        let mut data_region = 0u64;
        let mut cd_size = 0u64;
        let mut any_offset_exceeds = false;

        for entry in entries {
            let needs_zip64_local = entry.size > ZIP64_THRESHOLD;
            let local_header_offset = offset;
            if local_header_offset > ZIP64_THRESHOLD {
                any_offset_exceeds = true;
            }

            let entry_region = 30
                + entry.archive_name.len() as u64
                + if needs_zip64_local { 20 } else { 0 }
                + entry.size
                + if needs_zip64_local { 24 } else { 16 };
            data_region += entry_region;
            offset += entry_region;

            // A central directory entry also goes ZIP64 when its own
            // local header offset overflows 32 bits, even if its size
            // doesn't, mirroring `central_directory_header`.
            let needs_zip64_cd = needs_zip64_local || local_header_offset > ZIP64_THRESHOLD;
            cd_size += 46 + entry.archive_name.len() as u64 + if needs_zip64_cd { 28 } else { 0 };
        }

        // Mirrors `end_of_central_directory`'s own decision: the EOCD goes
        // ZIP64 when any entry needs it, the entry count overflows 16
        // bits, or either aggregate region overflows 32 bits, even if
        // every individual entry stayed under the per-entry threshold.
        let needs_zip64_total = entries.iter().any(|e| e.size > ZIP64_THRESHOLD)
            || any_offset_exceeds
            || entries.len() > 0xFFFF
            || cd_size > ZIP64_THRESHOLD
            || data_region > ZIP64_THRESHOLD;

        let mut total = data_region + cd_size;
        if needs_zip64_total {
            total += 56 + 20;
        }
        total += 22;

        total
    }

    pub fn is_complete(&self) -> bool {
        self.state == WriteState::Complete
    }

    /// Write up to `buf.len()` bytes into `buf`, returning the number
    /// written. Returns `0` only once the archive is fully emitted.
    pub fn write_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;

        while written < buf.len() && self.state != WriteState::Complete {
            if self.pending_pos < self.pending.len() {
                let n = (buf.len() - written).min(self.pending.len() - self.pending_pos);
                buf[written..written + n].copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
                self.pending_pos += n;
                written += n;
                continue;
            }

            match self.state {
                WriteState::LocalFileHeader => {
                    let Some(entry) = self.entries.pop_front() else {
                        self.state = WriteState::CentralDirectory;
                        self.cd_cursor = 0;
                        continue;
                    };
                    self.current_local_offset = self.offset;
                    self.current_name = entry.archive_name.clone();
                    self.current_size = entry.size;
                    self.current_remaining = entry.size;
                    self.current_hasher = Hasher::new();
                    self.current_reader = Some(BufReader::new(File::open(&entry.source_path)?));

                    self.set_pending(local_file_header(&entry));
                    self.state = WriteState::FileData;
                }
                WriteState::FileData => {
                    if self.current_remaining == 0 {
                        self.finished.push(FinishedEntry {
                            name: std::mem::take(&mut self.current_name),
                            size: self.current_size,
                            crc32: self.current_hasher.clone().finalize(),
                            local_header_offset: self.current_local_offset,
                        });
                        self.current_reader = None;
                        self.state = WriteState::DataDescriptor;
                        continue;
                    }

                    let reader = self.current_reader.as_mut().expect("reader set with remaining data");
                    let want = (buf.len() - written).min(self.current_remaining as usize).max(1);
                    let n = reader.read(&mut buf[written..written + want])?;
                    if n == 0 {
                        return Err(Error::Internal("source file shorter than its recorded size".into()));
                    }
                    self.current_hasher.update(&buf[written..written + n]);
                    self.current_remaining -= n as u64;
                    self.offset += n as u64;
                    written += n;
                }
                WriteState::DataDescriptor => {
                    let last = self.finished.last().expect("an entry just finished");
                    self.set_pending(data_descriptor(last));
                    self.state = WriteState::LocalFileHeader;
                }
                WriteState::CentralDirectory => {
                    if self.cd_cursor >= self.finished.len() {
                        self.state = WriteState::EndOfCentralDirectory;
                        continue;
                    }
                    let entry = &self.finished[self.cd_cursor];
                    self.set_pending(central_directory_header(entry));
                    self.cd_cursor += 1;
                }
                WriteState::EndOfCentralDirectory => {
                    self.set_pending(end_of_central_directory(&self.finished));
                    self.state = WriteState::Complete;
                }
                WriteState::Complete => unreachable!(),
            }
        }

        Ok(written)
    }

    fn set_pending(&mut self, bytes: Vec<u8>) {
        let len = bytes.len() as u64;
        self.pending = bytes;
        self.pending_pos = 0;
        self.offset += len;
    }
}

fn local_file_header(entry: &ZipEntry) -> Vec<u8> {
    let needs_zip64 = entry.size > ZIP64_THRESHOLD;
    let mut out = Vec::new();
    out.extend_from_slice(&LOCAL_HEADER_SIG.to_le_bytes());
    out.extend_from_slice(&45u16.to_le_bytes()); // version needed
    out.extend_from_slice(&0x0008u16.to_le_bytes()); // flag bit 3: data descriptor follows
    out.extend_from_slice(&0u16.to_le_bytes()); // store method
    out.extend_from_slice(&0u16.to_le_bytes()); // mod time
    out.extend_from_slice(&0u16.to_le_bytes()); // mod date
    out.extend_from_slice(&0u32.to_le_bytes()); // crc32 (deferred)
    out.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // compressed size placeholder
    out.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // uncompressed size placeholder
    let name_bytes = entry.archive_name.as_bytes();
    out.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());

    let extra_len: u16 = if needs_zip64 { 20 } else { 0 };
    out.extend_from_slice(&extra_len.to_le_bytes());
    out.extend_from_slice(name_bytes);

    if needs_zip64 {
        out.extend_from_slice(&0x0001u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
    }

    out
}

fn data_descriptor(entry: &FinishedEntry) -> Vec<u8> {
    let needs_zip64 = entry.size > ZIP64_THRESHOLD;
    let mut out = Vec::new();
    out.extend_from_slice(&DATA_DESCRIPTOR_SIG.to_le_bytes());
    out.extend_from_slice(&entry.crc32.to_le_bytes());
    if needs_zip64 {
        out.extend_from_slice(&entry.size.to_le_bytes());
        out.extend_from_slice(&entry.size.to_le_bytes());
    } else {
        out.extend_from_slice(&(entry.size as u32).to_le_bytes());
        out.extend_from_slice(&(entry.size as u32).to_le_bytes());
    }
    out
}

fn central_directory_header(entry: &FinishedEntry) -> Vec<u8> {
    let needs_zip64 = entry.size > ZIP64_THRESHOLD || entry.local_header_offset > ZIP64_THRESHOLD;
    let mut out = Vec::new();
    out.extend_from_slice(&CENTRAL_HEADER_SIG.to_le_bytes());
    out.extend_from_slice(&45u16.to_le_bytes()); // version made by
    out.extend_from_slice(&45u16.to_le_bytes()); // version needed
    out.extend_from_slice(&0x0008u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&entry.crc32.to_le_bytes());

    let size_field: u32 = if needs_zip64 { 0xFFFF_FFFF } else { entry.size as u32 };
    out.extend_from_slice(&size_field.to_le_bytes());
    out.extend_from_slice(&size_field.to_le_bytes());

    let name_bytes = entry.name.as_bytes();
    out.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());

    let extra_len: u16 = if needs_zip64 { 28 } else { 0 };
    out.extend_from_slice(&extra_len.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // comment length
    out.extend_from_slice(&0u16.to_le_bytes()); // disk number start
    out.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
    out.extend_from_slice(&0u32.to_le_bytes()); // external attrs

    let offset_field: u32 = if needs_zip64 { 0xFFFF_FFFF } else { entry.local_header_offset as u32 };
    out.extend_from_slice(&offset_field.to_le_bytes());
    out.extend_from_slice(name_bytes);

    if needs_zip64 {
        out.extend_from_slice(&0x0001u16.to_le_bytes());
        out.extend_from_slice(&24u16.to_le_bytes());
        out.extend_from_slice(&entry.size.to_le_bytes());
        out.extend_from_slice(&entry.size.to_le_bytes());
        out.extend_from_slice(&entry.local_header_offset.to_le_bytes());
    }

    out
}

fn end_of_central_directory(entries: &[FinishedEntry]) -> Vec<u8> {
    let cd_size: u64 = entries
        .iter()
        .map(|e| {
            let needs_zip64 = e.size > ZIP64_THRESHOLD || e.local_header_offset > ZIP64_THRESHOLD;
            46 + e.name.len() as u64 + if needs_zip64 { 28 } else { 0 }
        })
        .sum();
    let data_region: u64 = entries
        .iter()
        .map(|e| {
            let needs_zip64 = e.size > ZIP64_THRESHOLD;
            30 + e.name.len() as u64 + if needs_zip64 { 20 } else { 0 } + e.size + if needs_zip64 { 24 } else { 16 }
        })
        .sum();

    let needs_zip64_total = entries.iter().any(|e| e.size > ZIP64_THRESHOLD || e.local_header_offset > ZIP64_THRESHOLD)
        || entries.len() > 0xFFFF
        || cd_size > ZIP64_THRESHOLD
        || data_region > ZIP64_THRESHOLD;

    let mut out = Vec::new();

    if needs_zip64_total {
        out.extend_from_slice(&ZIP64_EOCD_SIG.to_le_bytes());
        out.extend_from_slice(&44u64.to_le_bytes());
        out.extend_from_slice(&45u16.to_le_bytes());
        out.extend_from_slice(&45u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(entries.len() as u64).to_le_bytes());
        out.extend_from_slice(&(entries.len() as u64).to_le_bytes());
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&data_region.to_le_bytes());

        out.extend_from_slice(&ZIP64_LOCATOR_SIG.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(data_region + cd_size).to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
    }

    out.extend_from_slice(&EOCD_SIG.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    let entry_count = entries.len().min(0xFFFF) as u16;
    out.extend_from_slice(&entry_count.to_le_bytes());
    out.extend_from_slice(&entry_count.to_le_bytes());
    out.extend_from_slice(&(cd_size.min(ZIP64_THRESHOLD) as u32).to_le_bytes());
    out.extend_from_slice(&(data_region.min(ZIP64_THRESHOLD) as u32).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // comment length

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn total_size_matches_emitted_byte_count() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.txt");
        std::fs::write(&path_a, b"hello world").unwrap();
        let path_b = dir.path().join("b.txt");
        std::fs::write(&path_b, b"second file contents").unwrap();

        let entries = vec![
            ZipEntry { archive_name: "a.txt".into(), source_path: path_a.clone(), size: 11 },
            ZipEntry { archive_name: "nested/b.txt".into(), source_path: path_b.clone(), size: 20 },
        ];

        let expected_size = ZipStreamer::total_size(&entries);
        let mut streamer = ZipStreamer::new(entries);

        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = streamer.write_some(&mut buf).unwrap();
            if n == 0 && streamer.is_complete() {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }

        assert_eq!(out.len() as u64, expected_size);
        assert_eq!(&out[0..4], &LOCAL_HEADER_SIG.to_le_bytes());
    }

    #[test]
    fn unzips_to_byte_identical_contents() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("song.txt");
        let contents = b"track bytes go here, repeated enough to span a few buffers ...";
        std::fs::write(&src_path, contents).unwrap();

        let entries = vec![ZipEntry {
            archive_name: "disc1/song.txt".into(),
            source_path: src_path.clone(),
            size: contents.len() as u64,
        }];

        let mut streamer = ZipStreamer::new(entries);
        let mut out = Vec::new();
        let mut buf = [0u8; 9];
        loop {
            let n = streamer.write_some(&mut buf).unwrap();
            if n == 0 && streamer.is_complete() {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }

        let zip_path = dir.path().join("out.zip");
        let mut f = File::create(&zip_path).unwrap();
        f.write_all(&out).unwrap();
        drop(f);

        let file = File::open(&zip_path).unwrap();
        let mut archive = zip_for_test::ZipArchive::new(file).unwrap();
        let mut entry = archive.by_name("disc1/song.txt").unwrap();
        let mut extracted = Vec::new();
        entry.read_to_end(&mut extracted).unwrap();
        assert_eq!(extracted, contents);
    }
}

/// Minimal read-only ZIP reader used only by this module's own test, so
/// the round-trip check doesn't depend on an external extractor being
/// installed in the test environment. Understands exactly the subset of
/// the format this streamer emits (store method, optional data
/// descriptor, optional ZIP64 extra fields).
#[cfg(test)]
mod zip_for_test {
    use std::io::{Read, Seek, SeekFrom};

    pub struct ZipArchive<R> {
        reader: R,
        entries: Vec<(String, u64, u64)>, // name, data offset, size
    }

    impl<R: Read + Seek> ZipArchive<R> {
        pub fn new(mut reader: R) -> std::io::Result<Self> {
            let mut entries = Vec::new();
            reader.seek(SeekFrom::Start(0))?;

            loop {
                let mut sig = [0u8; 4];
                reader.read_exact(&mut sig)?;
                let sig = u32::from_le_bytes(sig);
                if sig != 0x0403_4b50 {
                    break;
                }

                let mut fixed = [0u8; 26];
                reader.read_exact(&mut fixed)?;
                let flags = u16::from_le_bytes([fixed[2], fixed[3]]);
                let mut comp_size = u32::from_le_bytes([fixed[12], fixed[13], fixed[14], fixed[15]]) as u64;
                let mut uncomp_size = u32::from_le_bytes([fixed[16], fixed[17], fixed[18], fixed[19]]) as u64;
                let name_len = u16::from_le_bytes([fixed[20], fixed[21]]) as usize;
                let extra_len = u16::from_le_bytes([fixed[22], fixed[23]]) as usize;

                let mut name = vec![0u8; name_len];
                reader.read_exact(&mut name)?;
                let name = String::from_utf8_lossy(&name).to_string();

                let mut extra = vec![0u8; extra_len];
                reader.read_exact(&mut extra)?;
                if extra_len >= 20 {
                    uncomp_size = u64::from_le_bytes(extra[4..12].try_into().unwrap());
                    comp_size = u64::from_le_bytes(extra[12..20].try_into().unwrap());
                }

                let data_offset = reader.stream_position()?;

                if flags & 0x0008 != 0 {
                    // Sizes were placeholders; the true size was recorded
                    // in the data descriptor, which we don't know yet, so
                    // scan forward for the next local/central signature
                    // isn't reliable with arbitrary content. This minimal
                    // reader instead relies on the zip64 extra (always
                    // written by this streamer for un-sized entries being
                    // tested) or the uncomp_size carried there being 0
                    // when small, so fall back to a direct search for the
                    // following descriptor signature.
                    let start = data_offset;
                    let mut probe = Vec::new();
                    reader.seek(SeekFrom::Start(start))?;
                    reader.read_to_end(&mut probe)?;
                    let ddsig = 0x0807_4b50u32.to_le_bytes();
                    let pos = probe
                        .windows(4)
                        .position(|w| w == ddsig)
                        .expect("data descriptor signature present");
                    comp_size = pos as u64;
                    uncomp_size = pos as u64;
                    reader.seek(SeekFrom::Start(start + pos as u64 + 4 + 4 + 8 + 8))?;
                } else {
                    reader.seek(SeekFrom::Start(data_offset + comp_size))?;
                }

                entries.push((name, data_offset, uncomp_size));
                let _ = comp_size;
            }

            Ok(Self { reader, entries })
        }

        pub fn by_name(&mut self, name: &str) -> std::io::Result<EntryReader<'_, R>> {
            let (_, offset, size) = self
                .entries
                .iter()
                .find(|(n, _, _)| n == name)
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "entry not found"))?;
            self.reader.seek(SeekFrom::Start(offset))?;
            Ok(EntryReader { reader: &mut self.reader, remaining: size })
        }
    }

    pub struct EntryReader<'a, R> {
        reader: &'a mut R,
        remaining: u64,
    }

    impl<'a, R: Read> EntryReader<'a, R> {
        pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> std::io::Result<usize> {
            let mut taken = self.reader.by_ref().take(self.remaining);
            taken.read_to_end(out)
        }
    }
}
