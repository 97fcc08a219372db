use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::cabinet::Cabinet;
use crate::consts;
use crate::error::{Error, Result};
use crate::file::FileDescriptor;
use crate::inflate::{InflateStatus, RawInflater};
use crate::reader::FileReader;
use crate::volume::VolumeSource;

/// How a file's stored bytes are turned into its contents.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ExtractMethod {
    /// Inflate each length-prefixed chunk, then check the size and (for
    /// version 6 and later) the MD5 digest.
    #[default]
    Chunked,
    /// Split the compressed bytes of each volume at end-of-chunk markers and
    /// inflate the pieces.  Needed by some older installers; the size is
    /// checked but the MD5 digest is not.
    Legacy,
    /// Copy the stored bytes, deobfuscated but not decompressed.
    Raw,
}

impl<S: VolumeSource> Cabinet<S> {
    /// Extracts file `index` into `writer`, returning the number of bytes
    /// written.
    pub fn extract_to<W: Write>(
        &self,
        index: usize,
        writer: &mut W,
        method: ExtractMethod,
    ) -> Result<u64> {
        let mut reader = self.read_file(index)?;
        let file = reader.descriptor().clone();
        let index = reader.index();
        log::debug!(
            "Extracting file {} ({:?}, {} bytes, flags {:#x}) with {:?}",
            index,
            file.name(),
            file.expanded_size(),
            file.flags().bits(),
            method
        );
        match method {
            ExtractMethod::Chunked => {
                let mut context = md5::Context::new();
                let written =
                    extract_chunked(&mut reader, &file, writer, &mut context)?;
                check_size(index, &file, written)?;
                if self.major_version() > consts::LAST_V5_LAYOUT_VERSION {
                    let actual = format!("{:x}", context.compute());
                    let expected = file.md5_hex();
                    if !actual.eq_ignore_ascii_case(&expected) {
                        return Err(Error::ChecksumMismatch {
                            index,
                            expected,
                            actual,
                        });
                    }
                }
                Ok(written)
            }
            ExtractMethod::Legacy => {
                let written = extract_legacy(&mut reader, &file, writer)?;
                check_size(index, &file, written)?;
                Ok(written)
            }
            ExtractMethod::Raw => extract_raw(&mut reader, &file, writer),
        }
    }

    /// Extracts file `index` to a new file at `path`, returning the number
    /// of bytes written.  The output file is removed if extraction fails.
    pub fn extract_file<P: AsRef<Path>>(
        &self,
        index: usize,
        path: P,
        method: ExtractMethod,
    ) -> Result<u64> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        let result = self
            .extract_to(index, &mut writer, method)
            .and_then(|written| {
                writer.flush()?;
                Ok(written)
            });
        drop(writer);
        if result.is_err() {
            if let Err(error) = fs::remove_file(path) {
                log::warn!(
                    "Could not remove partial output {}: {}",
                    path.display(),
                    error
                );
            }
        }
        result
    }
}

fn readable_size(file: &FileDescriptor) -> u64 {
    if file.is_compressed() {
        file.compressed_size()
    } else {
        file.expanded_size()
    }
}

fn check_size(index: usize, file: &FileDescriptor, written: u64) -> Result<()> {
    if written != file.expanded_size() {
        return Err(Error::SizeMismatch {
            index,
            expected: file.expanded_size(),
            actual: written,
        });
    }
    Ok(())
}

fn extract_chunked<S: VolumeSource, W: Write>(
    reader: &mut FileReader<'_, S>,
    file: &FileDescriptor,
    writer: &mut W,
    context: &mut md5::Context,
) -> Result<u64> {
    let mut inflater = RawInflater::new();
    let mut input = Vec::with_capacity(u16::MAX as usize + 1);
    let mut output = Vec::with_capacity(consts::BUFFER_SIZE);
    let total = readable_size(file);
    let mut remaining = total;
    let mut written = 0u64;
    while remaining > 0 {
        if file.is_compressed() {
            let mut prefix = [0u8; 2];
            reader.read(&mut prefix)?;
            let length = u16::from_le_bytes(prefix) as usize;
            if length == 0 {
                return Err(Error::ZeroLengthChunk {
                    index: reader.index(),
                    volume: reader.volume(),
                });
            }
            input.resize(length, 0);
            reader.read(&mut input)?;
            // The inflater expects one byte past the chunk.
            input.push(0);
            let result = inflater.inflate(&input, &mut output);
            if !result.status.is_tolerated() {
                return Err(Error::Decompression {
                    index: reader.index(),
                    volume: reader.volume(),
                    chunk_length: length,
                    bytes_consumed: total - remaining,
                    status: result.status,
                });
            }
            if result.status == InflateStatus::DataError {
                log::trace!(
                    "Tolerating data error in chunk of file {}",
                    reader.index()
                );
            }
            let consumed = 2 + length as u64;
            if consumed > remaining {
                log::warn!(
                    "Chunk of file {} runs {} bytes past its compressed size",
                    reader.index(),
                    consumed - remaining
                );
            }
            remaining = remaining.saturating_sub(consumed);
        } else {
            let count = remaining.min(consts::BUFFER_SIZE as u64) as usize;
            output.resize(count, 0);
            reader.read(&mut output)?;
            remaining -= count as u64;
        }
        context.consume(&output);
        writer.write_all(&output)?;
        written += output.len() as u64;
    }
    Ok(written)
}

fn extract_legacy<S: VolumeSource, W: Write>(
    reader: &mut FileReader<'_, S>,
    file: &FileDescriptor,
    writer: &mut W,
) -> Result<u64> {
    if !file.is_compressed() {
        return extract_raw(reader, file, writer);
    }
    let mut inflater = RawInflater::new();
    let mut input = Vec::new();
    let mut output = Vec::with_capacity(consts::BUFFER_SIZE);
    let total = file.compressed_size();
    let mut remaining = total;
    let mut written = 0u64;
    while remaining > 0 {
        let available = remaining.min(reader.volume_bytes_left());
        if available == 0 {
            reader.open_next_volume()?;
            continue;
        }
        reader.ensure_stored(available)?;
        input.resize(available as usize, 0);
        reader.read(&mut input)?;
        let mut consumed = total - remaining;
        remaining -= available;

        let mut rest = input.as_slice();
        while !rest.is_empty() {
            let length = match chunk_length(rest) {
                Some(length) => length,
                None => {
                    return Err(Error::MissingChunkMarker {
                        index: reader.index(),
                        volume: reader.volume(),
                        remaining: rest.len(),
                    });
                }
            };
            let (chunk, tail) = rest.split_at(length);
            let result = inflater.inflate_streaming(chunk, &mut output);
            if !matches!(
                result.status,
                InflateStatus::Ok | InflateStatus::StreamEnd
            ) {
                return Err(Error::Decompression {
                    index: reader.index(),
                    volume: reader.volume(),
                    chunk_length: length,
                    bytes_consumed: consumed,
                    status: result.status,
                });
            }
            writer.write_all(&output)?;
            written += output.len() as u64;
            consumed += length as u64;
            rest = tail;
        }
    }
    Ok(written)
}

fn extract_raw<S: VolumeSource, W: Write>(
    reader: &mut FileReader<'_, S>,
    file: &FileDescriptor,
    writer: &mut W,
) -> Result<u64> {
    let mut buffer = vec![0u8; consts::BUFFER_SIZE];
    let mut remaining = readable_size(file);
    let mut written = 0u64;
    while remaining > 0 {
        let count = remaining.min(consts::BUFFER_SIZE as u64) as usize;
        reader.read(&mut buffer[..count])?;
        writer.write_all(&buffer[..count])?;
        remaining -= count as u64;
        written += count as u64;
    }
    Ok(written)
}

fn find_marker(input: &[u8], from: usize) -> Option<usize> {
    input
        .get(from..)?
        .windows(consts::END_OF_CHUNK.len())
        .position(|window| window == consts::END_OF_CHUNK)
        .map(|position| from + position)
}

/// Returns the length of the first chunk in `input`, including its
/// end-of-chunk marker.  A deflate block never starts with a set bit, so a
/// marker followed by one is part of the compressed data and the search
/// continues past it.
fn chunk_length(input: &[u8]) -> Option<usize> {
    let marker_len = consts::END_OF_CHUNK.len();
    let mut at = find_marker(input, 0)?;
    while at + marker_len < input.len() && input[at + marker_len] & 1 != 0 {
        match find_marker(input, at + 1) {
            Some(next) => {
                log::warn!(
                    "End-of-chunk marker at {} is inside compressed data",
                    at
                );
                at = next;
            }
            None => break,
        }
    }
    Some(at + marker_len)
}
