use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::slice;

use byteorder::{LittleEndian, ReadBytesExt};
use time::PrimitiveDateTime;

use crate::blast;
use crate::consts;
use crate::datetime::datetime_from_dos;
use crate::error::{Error, ForeignFormat, Result};
use crate::string::read_prefixed_string;

/// The fixed header at the start of an InstallShield 3 archive.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct V3Header {
    /// Always `0x8c655d13`.
    pub signature: u32,
    /// A second signature word, not checked.
    pub signature2: u32,
    /// Nonzero if the archive spans several disks.
    pub is_multivolume: u16,
    /// Total number of files.
    pub file_count: u16,
    /// Packed DOS timestamp of the archive.
    pub datetime: u32,
    /// Total compressed size.
    pub compressed_size: u32,
    /// Total uncompressed size.
    pub uncompressed_size: u32,
    /// Number of disks in the set.
    pub volume_total: u8,
    /// This disk's number.
    pub volume_number: u8,
    /// Start of the data continued from the previous disk.
    pub split_begin: u32,
    /// End of the data continued on the next disk.
    pub split_end: u32,
    /// Absolute offset of the table of contents.
    pub toc_address: u32,
    /// Number of directories in the table of contents.
    pub dir_count: u16,
}

fn parse_v3_header<R: Read>(mut reader: R) -> io::Result<V3Header> {
    let signature = reader.read_u32::<LittleEndian>()?;
    let signature2 = reader.read_u32::<LittleEndian>()?;
    let _reserved1 = reader.read_u16::<LittleEndian>()?;
    let is_multivolume = reader.read_u16::<LittleEndian>()?;
    let file_count = reader.read_u16::<LittleEndian>()?;
    let datetime = reader.read_u32::<LittleEndian>()?;
    let compressed_size = reader.read_u32::<LittleEndian>()?;
    let uncompressed_size = reader.read_u32::<LittleEndian>()?;
    let _reserved2 = reader.read_u32::<LittleEndian>()?;
    let volume_total = reader.read_u8()?;
    let volume_number = reader.read_u8()?;
    let _reserved3 = reader.read_u8()?;
    let split_begin = reader.read_u32::<LittleEndian>()?;
    let split_end = reader.read_u32::<LittleEndian>()?;
    let toc_address = reader.read_u32::<LittleEndian>()?;
    let _reserved4 = reader.read_u32::<LittleEndian>()?;
    let dir_count = reader.read_u16::<LittleEndian>()?;
    Ok(V3Header {
        signature,
        signature2,
        is_multivolume,
        file_count,
        datetime,
        compressed_size,
        uncompressed_size,
        volume_total,
        volume_number,
        split_begin,
        split_end,
        toc_address,
        dir_count,
    })
}

/// A directory listed in a V3 archive's table of contents.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct V3Directory {
    name: String,
    file_count: u16,
}

impl V3Directory {
    /// Returns the directory's name, with `/` separators.  Empty for the
    /// archive root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of files in the directory.
    pub fn file_count(&self) -> u16 {
        self.file_count
    }
}

/// A member of a V3 archive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompressedFile {
    path: String,
    name: String,
    index: u16,
    uncompressed_size: u32,
    compressed_size: u32,
    offset: u64,
    datetime: u32,
    attributes: u8,
    is_split: bool,
    volume_start: u8,
    volume_end: u8,
}

impl CompressedFile {
    /// Returns the member's path within the archive, `directory/name`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the member's name without its directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the index recorded in the table of contents.
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Returns the size of the member once exploded.
    pub fn uncompressed_size(&self) -> u32 {
        self.uncompressed_size
    }

    /// Returns the size of the member's compressed data.
    pub fn compressed_size(&self) -> u32 {
        self.compressed_size
    }

    /// Returns the offset of the member's data relative to the start of the
    /// data area.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the member's modification time, if it is a valid DOS
    /// timestamp.
    pub fn datetime(&self) -> Option<PrimitiveDateTime> {
        datetime_from_dos(self.datetime)
    }

    /// Returns the packed DOS timestamp.
    pub fn dos_datetime(&self) -> u32 {
        self.datetime
    }

    /// Returns the DOS attribute bits.
    pub fn attributes(&self) -> u8 {
        self.attributes
    }

    /// Returns true if the member continues on another disk.
    pub fn is_split(&self) -> bool {
        self.is_split
    }

    /// Returns the disk the member starts on.
    pub fn volume_start(&self) -> u8 {
        self.volume_start
    }

    /// Returns the disk the member ends on.
    pub fn volume_end(&self) -> u8 {
        self.volume_end
    }
}

/// An InstallShield 3 (`.Z`) archive: one file holding a table of contents
/// and a series of exploded members.
pub struct V3Archive<R> {
    reader: R,
    header: V3Header,
    directories: Vec<V3Directory>,
    files: Vec<CompressedFile>,
    paths: HashMap<String, usize>,
}

impl V3Archive<BufReader<File>> {
    /// Opens the archive at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<V3Archive<BufReader<File>>> {
        V3Archive::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> V3Archive<R> {
    /// Reads the header and table of contents of an archive.
    pub fn new(mut reader: R) -> Result<V3Archive<R>> {
        let size = reader.seek(SeekFrom::End(0))?;
        if size <= consts::V3_HEADER_SIZE {
            return Err(Error::Truncated {
                what: format!("V3 archive header ({} byte archive)", size),
                offset: Some(0),
            });
        }
        reader.seek(SeekFrom::Start(0))?;
        let header = parse_v3_header(&mut reader)
            .map_err(|error| Error::reading(error, "V3 archive header", Some(0)))?;
        if header.signature != consts::V3_SIGNATURE {
            let foreign = match ForeignFormat::from_signature(header.signature)
            {
                Some(ForeignFormat::InstallShieldV3) | None => None,
                other => other,
            };
            return Err(Error::NotThisFormat {
                expected: "InstallShield 3 archive",
                signature: header.signature,
                foreign,
            });
        }
        if header.toc_address as u64 >= size {
            return Err(Error::InvalidData(format!(
                "table of contents at {:#x} is past the end of the {} byte \
                 archive",
                header.toc_address, size
            )));
        }
        log::debug!(
            "V3 archive: {} directories, {} files, table of contents at {:#x}",
            header.dir_count,
            header.file_count,
            header.toc_address
        );

        reader.seek(SeekFrom::Start(header.toc_address as u64))?;
        let mut directories = Vec::with_capacity(header.dir_count as usize);
        for index in 0..header.dir_count {
            let position = reader.stream_position()?;
            let directory = read_directory(&mut reader).map_err(|error| {
                Error::reading(
                    error,
                    format!("V3 directory record {}", index),
                    Some(position),
                )
            })?;
            directories.push(directory);
        }

        let mut files = Vec::with_capacity(header.file_count as usize);
        let mut paths = HashMap::new();
        let mut offset = 0u64;
        for directory in directories.iter() {
            for _ in 0..directory.file_count {
                let position = reader.stream_position()?;
                let mut file = read_file_record(&mut reader, &directory.name)
                    .map_err(|error| {
                        Error::reading(
                            error,
                            format!("V3 file record {}", files.len()),
                            Some(position),
                        )
                    })?;
                file.offset = offset;
                offset += file.compressed_size as u64;
                if paths.contains_key(&file.path) {
                    log::warn!("Duplicate V3 member {:?}", file.path);
                } else {
                    paths.insert(file.path.clone(), files.len());
                }
                files.push(file);
            }
        }

        Ok(V3Archive { reader, header, directories, files, paths })
    }

    /// Returns the archive header.
    pub fn header(&self) -> &V3Header {
        &self.header
    }

    /// Returns the directories in table-of-contents order.
    pub fn directories(&self) -> &[V3Directory] {
        &self.directories
    }

    /// Returns an iterator over the members in table-of-contents order.
    pub fn files(&self) -> slice::Iter<'_, CompressedFile> {
        self.files.iter()
    }

    /// Looks up a member by path.  Either separator is accepted, and an
    /// exact match is preferred over a case-insensitive one.
    pub fn file(&self, path: &str) -> Option<&CompressedFile> {
        let path = normalize_path(path);
        if let Some(&index) = self.paths.get(&path) {
            return Some(&self.files[index]);
        }
        self.files.iter().find(|file| file.path.eq_ignore_ascii_case(&path))
    }

    /// Returns true if the archive has a member at `path`.
    pub fn exists(&self, path: &str) -> bool {
        self.file(path).is_some()
    }

    /// Explodes the member at `path` into a new buffer.
    pub fn extract(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.extract_to(path, &mut output)?;
        Ok(output)
    }

    /// Explodes the member at `path` into `writer`, returning the number of
    /// bytes written.
    pub fn extract_to<W: Write>(
        &mut self,
        path: &str,
        writer: &mut W,
    ) -> Result<u64> {
        let file = match self.file(path) {
            Some(file) => file.clone(),
            None => return Err(Error::NotFound(path.to_string())),
        };
        let offset = consts::V3_DATA_START + file.offset;
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut data = Vec::new();
        (&mut self.reader)
            .take(file.compressed_size as u64)
            .read_to_end(&mut data)
            .map_err(|error| {
                Error::reading(
                    error,
                    format!("data of {}", file.path),
                    Some(offset),
                )
            })?;
        if data.len() < file.compressed_size as usize {
            return Err(Error::Truncated {
                what: format!(
                    "data of {} ({} of {} bytes)",
                    file.path,
                    data.len(),
                    file.compressed_size
                ),
                offset: Some(offset),
            });
        }
        let written = blast::explode(&data, writer).map_err(|source| {
            Error::Blast { path: file.path.clone(), offset, source }
        })?;
        if written != file.uncompressed_size as u64 {
            log::warn!(
                "{} exploded to {} bytes, expected {}",
                file.path,
                written,
                file.uncompressed_size
            );
        }
        Ok(written)
    }

    /// Returns the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

fn skip<R: Seek>(reader: &mut R, count: i64) -> io::Result<()> {
    if count > 0 {
        reader.seek(SeekFrom::Current(count))?;
    }
    Ok(())
}

fn read_directory<R: Read + Seek>(reader: &mut R) -> io::Result<V3Directory> {
    let file_count = reader.read_u16::<LittleEndian>()?;
    let chunk_size = reader.read_u16::<LittleEndian>()?;
    let name_length = reader.read_u16::<LittleEndian>()?;
    let name = read_prefixed_string(reader, name_length as usize)?;
    skip(
        reader,
        chunk_size as i64
            - name_length as i64
            - consts::V3_DIRECTORY_RECORD_SIZE as i64,
    )?;
    Ok(V3Directory { name: normalize_path(&name), file_count })
}

fn read_file_record<R: Read + Seek>(
    reader: &mut R,
    directory: &str,
) -> io::Result<CompressedFile> {
    let volume_end = reader.read_u8()?;
    let index = reader.read_u16::<LittleEndian>()?;
    let uncompressed_size = reader.read_u32::<LittleEndian>()?;
    let compressed_size = reader.read_u32::<LittleEndian>()?;
    let _offset = reader.read_u32::<LittleEndian>()?;
    let datetime = reader.read_u32::<LittleEndian>()?;
    let _reserved1 = reader.read_u32::<LittleEndian>()?;
    let chunk_size = reader.read_u16::<LittleEndian>()?;
    let attributes = reader.read_u8()?;
    let is_split = reader.read_u8()? != 0;
    let _reserved2 = reader.read_u8()?;
    let volume_start = reader.read_u8()?;
    let name_length = reader.read_u8()?;
    let name = read_prefixed_string(reader, name_length as usize)?;
    skip(
        reader,
        chunk_size as i64
            - (consts::V3_FILE_RECORD_SIZE as i64 + name_length as i64),
    )?;
    let path = if directory.is_empty() {
        normalize_path(&name)
    } else {
        normalize_path(&format!("{}/{}", directory, name))
    };
    Ok(CompressedFile {
        path,
        name,
        index,
        uncompressed_size,
        compressed_size,
        offset: 0,
        datetime,
        attributes,
        is_split,
        volume_start,
        volume_end,
    })
}
