use std::io::{Read, Seek, SeekFrom};

use crate::consts;
use crate::error::{Error, Result};
use crate::file::FileDescriptor;
use crate::header::{parse_common_header, parse_volume_header, VolumeHeader};
use crate::obfuscation::Obfuscation;
use crate::volume::{VolumeKind, VolumeSource};

/// Reads the stored bytes of one file, crossing into later volumes as its
/// data runs out in the current one and removing any obfuscation.  The bytes
/// are still compressed if the file is.
pub struct FileReader<'a, S: VolumeSource> {
    source: &'a S,
    index: usize,
    major_version: u32,
    file_count: u32,
    file: FileDescriptor,
    volume: OpenVolume<S::Volume>,
    obfuscation: Obfuscation,
}

struct OpenVolume<V> {
    number: u32,
    stream: V,
    header: VolumeHeader,
    position: u64,
    bytes_left: u64,
    end: u64,
}

impl<'a, S: VolumeSource> FileReader<'a, S> {
    /// Opens the volume holding the start of file `index`.  Older cabinets
    /// record only the header volume in their descriptors, so for those the
    /// volumes are searched forward, up to `max_volumes` of them, for the
    /// first one whose file range reaches `index`.
    pub(crate) fn new(
        source: &'a S,
        major_version: u32,
        file_count: u32,
        index: usize,
        descriptor: &FileDescriptor,
        max_volumes: u32,
    ) -> Result<FileReader<'a, S>> {
        let mut file = descriptor.clone();
        if file.volume() == 0 || file.volume() == u16::MAX as u32 {
            file.set_volume(1);
        }
        let mut searched = 0;
        let volume = loop {
            let (stream, header) =
                open_volume_file(source, file.volume(), major_version)?;
            if major_version <= consts::LAST_V5_LAYOUT_VERSION
                && index as u64 > header.last_file_index as u64
            {
                searched += 1;
                if searched >= max_volumes {
                    invalid_descriptor!(
                        index,
                        "no volume among the {} searched contains the file",
                        searched
                    );
                }
                log::trace!(
                    "File {} is past the last file {} of volume {}",
                    index,
                    header.last_file_index,
                    file.volume()
                );
                file.set_volume(next_volume_number(file.volume()));
                continue;
            }
            let number = file.volume();
            break locate_file(
                stream,
                number,
                header,
                &mut file,
                index,
                major_version,
                file_count,
            )?;
        };
        Ok(FileReader {
            source,
            index,
            major_version,
            file_count,
            file,
            volume,
            obfuscation: Obfuscation::new(),
        })
    }

    /// Returns the index of the file being read.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns this session's view of the file's descriptor, including a
    /// SPLIT flag discovered while opening volumes.
    pub fn descriptor(&self) -> &FileDescriptor {
        &self.file
    }

    /// Returns the number of the volume currently being read.
    pub fn volume(&self) -> u32 {
        self.volume.number
    }

    /// Returns the volume header of the volume currently being read.
    pub fn volume_header(&self) -> &VolumeHeader {
        &self.volume.header
    }

    /// Returns how many of the file's bytes remain in the current volume.
    pub fn volume_bytes_left(&self) -> u64 {
        self.volume.bytes_left
    }

    /// Fails with [`Error::Truncated`] unless the current volume really
    /// holds `count` more bytes.
    pub(crate) fn ensure_stored(&self, count: u64) -> Result<()> {
        if self.volume.end.saturating_sub(self.volume.position) < count {
            return Err(Error::Truncated {
                what: format!(
                    "data of file {} in volume {} ({} bytes wanted, {} stored)",
                    self.index,
                    self.volume.number,
                    count,
                    self.volume.end.saturating_sub(self.volume.position)
                ),
                offset: Some(self.volume.position),
            });
        }
        Ok(())
    }

    /// Fills `buf` completely, opening later volumes as needed.  Obfuscated
    /// data is restored before returning.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.volume.bytes_left == 0 {
                self.open_next_volume()?;
                continue;
            }
            let wanted = (buf.len() - filled) as u64;
            let count = wanted.min(self.volume.bytes_left) as usize;
            let chunk = &mut buf[filled..filled + count];
            if let Err(error) = self.volume.stream.read_exact(chunk) {
                return Err(Error::reading(
                    error,
                    format!(
                        "data of file {} in volume {}",
                        self.index, self.volume.number
                    ),
                    Some(self.volume.position),
                ));
            }
            self.volume.position += count as u64;
            self.volume.bytes_left -= count as u64;
            filled += count;
        }
        if self.file.is_obfuscated() {
            self.obfuscation.deobfuscate(buf);
        }
        Ok(())
    }

    /// Moves on to the volume after the current one.
    pub(crate) fn open_next_volume(&mut self) -> Result<()> {
        let number = next_volume_number(self.volume.number);
        let (stream, header) =
            open_volume_file(self.source, number, self.major_version)?;
        self.file.set_volume(number);
        self.volume = locate_file(
            stream,
            number,
            header,
            &mut self.file,
            self.index,
            self.major_version,
            self.file_count,
        )?;
        Ok(())
    }
}

fn next_volume_number(number: u32) -> u32 {
    match number.wrapping_add(1) {
        0 => 1,
        n if n == u16::MAX as u32 => 1,
        n => n,
    }
}

fn open_volume_file<S: VolumeSource>(
    source: &S,
    number: u32,
    major_version: u32,
) -> Result<(S::Volume, VolumeHeader)> {
    let mut stream = match source.open_volume(number, VolumeKind::Cabinet)? {
        Some(stream) => stream,
        None => {
            return Err(Error::VolumeMissing {
                volume: number,
                location: source.describe(number, VolumeKind::Cabinet),
            });
        }
    };
    let what = format!("header of volume {}", number);
    let common = parse_common_header(&mut stream)
        .map_err(|error| Error::reading(error, what.as_str(), Some(0)))?;
    common.check_signature()?;
    let header = parse_volume_header(&mut stream, major_version).map_err(
        |error| {
            Error::reading(
                error,
                what.as_str(),
                Some(consts::COMMON_HEADER_SIZE as u64),
            )
        },
    )?;
    log::debug!(
        "Volume {} holds files {} to {}",
        number,
        header.first_file_index,
        header.last_file_index
    );
    Ok((stream, header))
}

/// Works out where the file's bytes start in this volume and how many of
/// them it holds, then seeks there.
fn locate_file<V: Read + Seek>(
    mut stream: V,
    number: u32,
    header: VolumeHeader,
    file: &mut FileDescriptor,
    index: usize,
    major_version: u32,
    file_count: u32,
) -> Result<OpenVolume<V>> {
    let index32 = index as u32;
    if major_version == consts::LAST_V5_LAYOUT_VERSION && !file.is_split() {
        let is_split = (index32 + 1 < file_count
            && index32 == header.last_file_index
            && header.last_file_size_compressed != file.compressed_size())
            || (index32 > 0
                && index32 == header.first_file_index
                && header.first_file_size_compressed
                    != file.compressed_size());
        if is_split {
            log::debug!(
                "File {} is split at volume {} (compressed size {})",
                index,
                number,
                file.compressed_size()
            );
            file.set_split();
        }
    }

    let (offset, expanded, compressed) = if file.is_split() {
        if index32 == header.last_file_index
            && header.last_file_offset != consts::LAST_FILE_OFFSET_UNSET
        {
            (
                header.last_file_offset,
                header.last_file_size_expanded,
                header.last_file_size_compressed,
            )
        } else if index32 == header.first_file_index {
            (
                header.first_file_offset,
                header.first_file_size_expanded,
                header.first_file_size_compressed,
            )
        } else {
            invalid_descriptor!(
                index,
                "split file is neither the first ({}) nor the last ({}) \
                 file of volume {}",
                header.first_file_index,
                header.last_file_index,
                number
            );
        }
    } else {
        (file.data_offset(), file.expanded_size(), file.compressed_size())
    };
    let bytes_left = if file.is_compressed() { compressed } else { expanded };
    let end = stream.seek(SeekFrom::End(0))?;
    if offset.saturating_add(bytes_left) > end {
        log::debug!(
            "File {} claims {} bytes at {} but volume {} ends at {}",
            index,
            bytes_left,
            offset,
            number,
            end
        );
    }
    stream.seek(SeekFrom::Start(offset))?;
    Ok(OpenVolume {
        number,
        stream,
        header,
        position: offset,
        bytes_left,
        end,
    })
}
