use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::consts;
use crate::error::{Error, ForeignFormat, Result};

/// The 20-byte record at the start of every `.hdr` and `.cab` volume.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommonHeader {
    /// The file signature; `ISc(` for a valid volume.
    pub signature: u32,
    /// The raw version field.  See [`major_version`].
    pub version: u32,
    /// Nonzero when further volumes follow this one.
    pub volume_info: u32,
    /// Absolute offset of the descriptor within this volume.
    pub descriptor_offset: u32,
    /// Size of the descriptor region; zero for data-only volumes.
    pub descriptor_size: u32,
}

impl CommonHeader {
    /// Returns the major InstallShield version encoded in the header.
    pub fn major_version(&self) -> u32 {
        major_version(self.version)
    }

    /// Returns true if this volume carries no descriptor (and so no file
    /// metadata of its own).
    pub fn is_header_only(&self) -> bool {
        self.descriptor_size == 0
    }

    pub(crate) fn check_signature(&self) -> Result<()> {
        if self.signature != consts::CABINET_SIGNATURE {
            return Err(Error::NotThisFormat {
                expected: "InstallShield cabinet",
                signature: self.signature,
                foreign: ForeignFormat::from_signature(self.signature),
            });
        }
        Ok(())
    }
}

pub(crate) fn parse_common_header<R: Read>(
    mut reader: R,
) -> io::Result<CommonHeader> {
    let signature = reader.read_u32::<LittleEndian>()?;
    let version = reader.read_u32::<LittleEndian>()?;
    let volume_info = reader.read_u32::<LittleEndian>()?;
    let descriptor_offset = reader.read_u32::<LittleEndian>()?;
    let descriptor_size = reader.read_u32::<LittleEndian>()?;
    Ok(CommonHeader {
        signature,
        version,
        volume_info,
        descriptor_offset,
        descriptor_size,
    })
}

/// Derives the major InstallShield version from a raw version field.
///
/// The top byte selects the encoding: tag 1 keeps the major version in bits
/// 12 to 15, tags 2 and 4 store the version times 100 in the low 16 bits.
/// Unknown tags yield 0, which selects the oldest record layouts.
pub fn major_version(version: u32) -> u32 {
    match version >> 24 {
        1 => (version >> 12) & 0xf,
        2 | 4 => (version & 0xffff) / 100,
        tag => {
            log::warn!(
                "Unknown version tag {:#04x} in version field {:#010x}",
                tag,
                version
            );
            0
        }
    }
}

/// The per-volume table of contents that locates every other record.  All
/// offsets are relative to the descriptor's own position in the volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Descriptor {
    /// Offset of the string area.
    pub strings_offset: u32,
    /// Offset of the component list.
    pub component_list_offset: u32,
    /// Offset of the file table.
    pub file_table_offset: u32,
    /// Size of the file table.
    pub file_table_size: u32,
    /// Second copy of the file table size; disagreement is tolerated.
    pub file_table_size2: u32,
    /// Number of directories.
    pub directory_count: u32,
    /// Number of files.
    pub file_count: u32,
    /// Offset, within the file table, of the packed file descriptors
    /// (major version 6 and later).
    pub file_table_offset2: u32,
    /// Number of components.
    pub component_count: u16,
    /// Offset of the setup types table.
    pub setup_types_offset: u32,
    /// Number of setup types.
    pub setup_type_count: u16,
    /// Heads of the file-group offset lists; zero means an empty slot.
    pub file_group_offsets: [u32; consts::MAX_FILE_GROUP_COUNT],
    /// Heads of the component offset lists; zero means an empty slot.
    pub component_offsets: [u32; consts::MAX_COMPONENT_COUNT],
}

pub(crate) fn parse_descriptor<R: Read>(
    mut reader: R,
) -> io::Result<Descriptor> {
    let strings_offset = reader.read_u32::<LittleEndian>()?;
    let _reserved1 = reader.read_u32::<LittleEndian>()?;
    let component_list_offset = reader.read_u32::<LittleEndian>()?;
    let file_table_offset = reader.read_u32::<LittleEndian>()?;
    let _reserved2 = reader.read_u32::<LittleEndian>()?;
    let file_table_size = reader.read_u32::<LittleEndian>()?;
    let file_table_size2 = reader.read_u32::<LittleEndian>()?;
    let directory_count = reader.read_u32::<LittleEndian>()?;
    let _reserved3 = reader.read_u64::<LittleEndian>()?;
    let file_count = reader.read_u32::<LittleEndian>()?;
    let file_table_offset2 = reader.read_u32::<LittleEndian>()?;
    let component_count = reader.read_u16::<LittleEndian>()?;
    let setup_types_offset = reader.read_u32::<LittleEndian>()?;
    let setup_type_count = reader.read_u16::<LittleEndian>()?;
    let mut _reserved4 = [0u8; 6];
    reader.read_exact(&mut _reserved4)?;
    let mut file_group_offsets = [0u32; consts::MAX_FILE_GROUP_COUNT];
    reader.read_u32_into::<LittleEndian>(&mut file_group_offsets)?;
    let mut component_offsets = [0u32; consts::MAX_COMPONENT_COUNT];
    reader.read_u32_into::<LittleEndian>(&mut component_offsets)?;
    Ok(Descriptor {
        strings_offset,
        component_list_offset,
        file_table_offset,
        file_table_size,
        file_table_size2,
        directory_count,
        file_count,
        file_table_offset2,
        component_count,
        setup_types_offset,
        setup_type_count,
        file_group_offsets,
        component_offsets,
    })
}

/// The record following the common header of a `.cab` volume, describing
/// which files it holds and where split files begin and end in it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct VolumeHeader {
    /// Offset of the first data byte in the volume.
    pub data_offset: u64,
    /// Index of the first file with data in this volume.
    pub first_file_index: u32,
    /// Index of the last file with data in this volume.
    pub last_file_index: u32,
    /// Offset of the first file's data in this volume.
    pub first_file_offset: u64,
    /// Expanded size of the first file's portion in this volume.
    pub first_file_size_expanded: u64,
    /// Compressed size of the first file's portion in this volume.
    pub first_file_size_compressed: u64,
    /// Offset of the last file's data in this volume.
    pub last_file_offset: u64,
    /// Expanded size of the last file's portion in this volume.
    pub last_file_size_expanded: u64,
    /// Compressed size of the last file's portion in this volume.
    pub last_file_size_compressed: u64,
}

pub(crate) fn parse_volume_header<R: Read>(
    mut reader: R,
    major_version: u32,
) -> io::Result<VolumeHeader> {
    if major_version <= consts::LAST_V5_LAYOUT_VERSION {
        let data_offset = reader.read_u32::<LittleEndian>()? as u64;
        let _reserved = reader.read_u32::<LittleEndian>()?;
        let first_file_index = reader.read_u32::<LittleEndian>()?;
        let last_file_index = reader.read_u32::<LittleEndian>()?;
        let first_file_offset = reader.read_u32::<LittleEndian>()? as u64;
        let first_file_size_expanded =
            reader.read_u32::<LittleEndian>()? as u64;
        let first_file_size_compressed =
            reader.read_u32::<LittleEndian>()? as u64;
        let mut last_file_offset = reader.read_u32::<LittleEndian>()? as u64;
        if last_file_offset == 0 {
            last_file_offset = consts::LAST_FILE_OFFSET_UNSET;
        }
        let last_file_size_expanded =
            reader.read_u32::<LittleEndian>()? as u64;
        let last_file_size_compressed =
            reader.read_u32::<LittleEndian>()? as u64;
        Ok(VolumeHeader {
            data_offset,
            first_file_index,
            last_file_index,
            first_file_offset,
            first_file_size_expanded,
            first_file_size_compressed,
            last_file_offset,
            last_file_size_expanded,
            last_file_size_compressed,
        })
    } else {
        Ok(VolumeHeader {
            data_offset: reader.read_u64::<LittleEndian>()?,
            first_file_index: reader.read_u32::<LittleEndian>()?,
            last_file_index: reader.read_u32::<LittleEndian>()?,
            first_file_offset: reader.read_u64::<LittleEndian>()?,
            first_file_size_expanded: reader.read_u64::<LittleEndian>()?,
            first_file_size_compressed: reader.read_u64::<LittleEndian>()?,
            last_file_offset: reader.read_u64::<LittleEndian>()?,
            last_file_size_expanded: reader.read_u64::<LittleEndian>()?,
            last_file_size_compressed: reader.read_u64::<LittleEndian>()?,
        })
    }
}

/// One node of a linked list of file groups or components.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct OffsetList {
    pub name_offset: u32,
    pub descriptor_offset: u32,
    pub next_offset: u32,
}

pub(crate) fn parse_offset_list<R: Read>(
    mut reader: R,
) -> io::Result<OffsetList> {
    let name_offset = reader.read_u32::<LittleEndian>()?;
    let descriptor_offset = reader.read_u32::<LittleEndian>()?;
    let next_offset = reader.read_u32::<LittleEndian>()?;
    Ok(OffsetList { name_offset, descriptor_offset, next_offset })
}
