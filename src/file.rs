use std::fmt::Write as _;
use std::io::{self, Read};
use std::slice;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::consts;

/// The flag bits of a [`FileDescriptor`].
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct FileFlags(u16);

impl FileFlags {
    /// The file's data crosses a volume boundary.
    pub const SPLIT: FileFlags = FileFlags(consts::FILE_SPLIT);
    /// The file's data is scrambled; see
    /// [`Obfuscation`](crate::Obfuscation).
    pub const OBFUSCATED: FileFlags = FileFlags(consts::FILE_OBFUSCATED);
    /// The file's data is a sequence of length-prefixed deflate chunks.
    pub const COMPRESSED: FileFlags = FileFlags(consts::FILE_COMPRESSED);
    /// The file cannot be extracted.
    pub const INVALID: FileFlags = FileFlags(consts::FILE_INVALID);

    /// Wraps raw flag bits.
    pub fn from_bits(bits: u16) -> FileFlags {
        FileFlags(bits)
    }

    /// Returns the raw flag bits.
    pub fn bits(self) -> u16 {
        self.0
    }

    /// Returns true if every bit of `other` is set in `self`.
    pub fn contains(self, other: FileFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    pub(crate) fn insert(&mut self, other: FileFlags) {
        self.0 |= other.0;
    }
}

/// Says which of a file's link fields are meaningful.  A file linking to a
/// previous one is an alias: its bytes live under that other index.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum LinkFlags {
    /// No links.
    #[default]
    None,
    /// Only `link_previous` is set.
    Previous,
    /// Only `link_next` is set.
    Next,
    /// Both links are set.
    Both,
}

impl LinkFlags {
    pub(crate) fn from_bits(bits: u8) -> LinkFlags {
        match bits & consts::LINK_BOTH {
            consts::LINK_NONE => LinkFlags::None,
            consts::LINK_PREV => LinkFlags::Previous,
            consts::LINK_NEXT => LinkFlags::Next,
            _ => LinkFlags::Both,
        }
    }

    /// Returns true if the previous link is set (alone or with the next
    /// link).
    pub fn has_previous(self) -> bool {
        matches!(self, LinkFlags::Previous | LinkFlags::Both)
    }

    /// Returns true if the next link is set (alone or with the previous
    /// link).
    pub fn has_next(self) -> bool {
        matches!(self, LinkFlags::Next | LinkFlags::Both)
    }
}

/// An iterator over the file descriptors in a cabinet.
#[derive(Clone)]
pub struct FileDescriptors<'a> {
    pub(crate) iter: slice::Iter<'a, FileDescriptor>,
}

impl<'a> Iterator for FileDescriptors<'a> {
    type Item = &'a FileDescriptor;

    fn next(&mut self) -> Option<&'a FileDescriptor> {
        self.iter.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

impl<'a> ExactSizeIterator for FileDescriptors<'a> {}

/// Metadata about one file stored in a cabinet set.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileDescriptor {
    pub(crate) name: String,
    pub(crate) name_offset: u32,
    directory_index: u32,
    flags: FileFlags,
    expanded_size: u64,
    compressed_size: u64,
    data_offset: u64,
    md5: [u8; 16],
    volume: u32,
    link_previous: u32,
    link_next: u32,
    link_flags: LinkFlags,
}

impl FileDescriptor {
    /// Returns the file's name, without its directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the index of the directory holding this file.
    pub fn directory_index(&self) -> u32 {
        self.directory_index
    }

    /// Returns the file's flags.
    pub fn flags(&self) -> FileFlags {
        self.flags
    }

    /// Returns the size of the file once extracted, in bytes.
    pub fn expanded_size(&self) -> u64 {
        self.expanded_size
    }

    /// Returns the number of bytes the file's data occupies in the cabinet
    /// set, including chunk length prefixes.
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// Returns the number of stored bytes: the compressed size for
    /// compressed files, the expanded size otherwise.
    pub fn stored_size(&self) -> u64 {
        if self.is_compressed() {
            self.compressed_size
        } else {
            self.expanded_size
        }
    }

    /// Returns the offset of the file's data in its starting volume.
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    /// Returns the stored MD5 digest.  All zeroes before major version 5.
    pub fn md5(&self) -> &[u8; 16] {
        &self.md5
    }

    /// Returns the stored MD5 digest as lowercase hex.
    pub fn md5_hex(&self) -> String {
        let mut hex = String::with_capacity(32);
        for byte in self.md5.iter() {
            let _ = write!(hex, "{:02x}", byte);
        }
        hex
    }

    /// Returns the 1-based number of the volume the file's data starts in.
    pub fn volume(&self) -> u32 {
        self.volume
    }

    /// Returns the index of the file this one aliases, if
    /// [`link_flags`](Self::link_flags) has the previous link.
    pub fn link_previous(&self) -> u32 {
        self.link_previous
    }

    /// Returns the index of the next file sharing this file's data.
    pub fn link_next(&self) -> u32 {
        self.link_next
    }

    /// Returns which link fields are meaningful.
    pub fn link_flags(&self) -> LinkFlags {
        self.link_flags
    }

    /// Returns true if the file's data crosses a volume boundary.
    pub fn is_split(&self) -> bool {
        self.flags.contains(FileFlags::SPLIT)
    }

    /// Returns true if the file's data is obfuscated.
    pub fn is_obfuscated(&self) -> bool {
        self.flags.contains(FileFlags::OBFUSCATED)
    }

    /// Returns true if the file's data is deflate-compressed.
    pub fn is_compressed(&self) -> bool {
        self.flags.contains(FileFlags::COMPRESSED)
    }

    /// Returns true if the INVALID flag is set.
    pub fn is_invalid(&self) -> bool {
        self.flags.contains(FileFlags::INVALID)
    }

    /// Returns true unless the file is flagged invalid or lacks a name or
    /// data offset.
    pub fn is_valid(&self) -> bool {
        !self.is_invalid() && self.name_offset != 0 && self.data_offset != 0
    }

    pub(crate) fn set_split(&mut self) {
        self.flags.insert(FileFlags::SPLIT);
    }

    pub(crate) fn set_volume(&mut self, volume: u32) {
        self.volume = volume;
    }
}

/// Which on-disk record a file descriptor is stored as.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum DescriptorLayout {
    /// 32-bit sizes, located through the file table; major 5 adds an MD5.
    V5 { has_md5: bool },
    /// 64-bit sizes, MD5 and links, packed at a fixed stride.
    V6Plus,
}

impl DescriptorLayout {
    pub(crate) fn for_version(major_version: u32) -> DescriptorLayout {
        if major_version <= consts::LAST_V5_LAYOUT_VERSION {
            DescriptorLayout::V5 {
                has_md5: major_version == consts::LAST_V5_LAYOUT_VERSION,
            }
        } else {
            DescriptorLayout::V6Plus
        }
    }
}

struct FileDescriptorV5 {
    name_offset: u32,
    directory_index: u32,
    flags: u16,
    expanded_size: u32,
    compressed_size: u32,
    data_offset: u32,
    md5: [u8; 16],
}

impl FileDescriptorV5 {
    fn parse<R: Read>(mut reader: R, has_md5: bool) -> io::Result<Self> {
        let name_offset = reader.read_u32::<LittleEndian>()?;
        let directory_index = reader.read_u32::<LittleEndian>()?;
        let flags = reader.read_u16::<LittleEndian>()?;
        let expanded_size = reader.read_u32::<LittleEndian>()?;
        let compressed_size = reader.read_u32::<LittleEndian>()?;
        let mut _reserved = [0u8; 0x14];
        reader.read_exact(&mut _reserved)?;
        let data_offset = reader.read_u32::<LittleEndian>()?;
        let mut md5 = [0u8; 16];
        if has_md5 {
            reader.read_exact(&mut md5)?;
        }
        Ok(FileDescriptorV5 {
            name_offset,
            directory_index,
            flags,
            expanded_size,
            compressed_size,
            data_offset,
            md5,
        })
    }

    fn into_descriptor(self, volume: u32) -> FileDescriptor {
        FileDescriptor {
            name: String::new(),
            name_offset: self.name_offset,
            directory_index: self.directory_index,
            flags: FileFlags::from_bits(self.flags),
            expanded_size: self.expanded_size as u64,
            compressed_size: self.compressed_size as u64,
            data_offset: self.data_offset as u64,
            md5: self.md5,
            volume,
            link_previous: 0,
            link_next: 0,
            link_flags: LinkFlags::None,
        }
    }
}

struct FileDescriptorV6 {
    flags: u16,
    expanded_size: u64,
    compressed_size: u64,
    data_offset: u64,
    md5: [u8; 16],
    name_offset: u32,
    directory_index: u16,
    link_previous: u32,
    link_next: u32,
    link_flags: u8,
    volume: u16,
}

impl FileDescriptorV6 {
    fn parse<R: Read>(mut reader: R) -> io::Result<Self> {
        let flags = reader.read_u16::<LittleEndian>()?;
        let expanded_size = reader.read_u64::<LittleEndian>()?;
        let compressed_size = reader.read_u64::<LittleEndian>()?;
        let data_offset = reader.read_u64::<LittleEndian>()?;
        let mut md5 = [0u8; 16];
        reader.read_exact(&mut md5)?;
        let mut _reserved1 = [0u8; 0x10];
        reader.read_exact(&mut _reserved1)?;
        let name_offset = reader.read_u32::<LittleEndian>()?;
        let directory_index = reader.read_u16::<LittleEndian>()?;
        let mut _reserved2 = [0u8; 0x0c];
        reader.read_exact(&mut _reserved2)?;
        let link_previous = reader.read_u32::<LittleEndian>()?;
        let link_next = reader.read_u32::<LittleEndian>()?;
        let link_flags = reader.read_u8()?;
        let volume = reader.read_u16::<LittleEndian>()?;
        Ok(FileDescriptorV6 {
            flags,
            expanded_size,
            compressed_size,
            data_offset,
            md5,
            name_offset,
            directory_index,
            link_previous,
            link_next,
            link_flags,
            volume,
        })
    }

    fn into_descriptor(self) -> FileDescriptor {
        FileDescriptor {
            name: String::new(),
            name_offset: self.name_offset,
            directory_index: self.directory_index as u32,
            flags: FileFlags::from_bits(self.flags),
            expanded_size: self.expanded_size,
            compressed_size: self.compressed_size,
            data_offset: self.data_offset,
            md5: self.md5,
            volume: self.volume as u32,
            link_previous: self.link_previous,
            link_next: self.link_next,
            link_flags: LinkFlags::from_bits(self.link_flags),
        }
    }
}

/// Parses one file descriptor; the name is resolved separately through
/// `name_offset`.  `volume` is the header volume the record came from, which
/// older layouts use as the file's starting volume.
pub(crate) fn parse_file_descriptor<R: Read>(
    reader: R,
    layout: DescriptorLayout,
    volume: u32,
) -> io::Result<FileDescriptor> {
    let descriptor = match layout {
        DescriptorLayout::V5 { has_md5 } => {
            FileDescriptorV5::parse(reader, has_md5)?.into_descriptor(volume)
        }
        DescriptorLayout::V6Plus => {
            FileDescriptorV6::parse(reader)?.into_descriptor()
        }
    };
    if !descriptor.is_compressed()
        && descriptor.compressed_size != descriptor.expanded_size
    {
        log::warn!(
            "Uncompressed file has compressed size {} but expanded size {}",
            descriptor.compressed_size,
            descriptor.expanded_size
        );
    }
    Ok(descriptor)
}
