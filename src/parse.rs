use std::collections::HashSet;
use std::io::{self, Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::consts;
use crate::error::{Error, Result};
use crate::file::{parse_file_descriptor, DescriptorLayout, FileDescriptor};
use crate::group::{Component, ComponentRecord, FileGroup, FileGroupRecord};
use crate::header::{
    major_version, parse_common_header, parse_descriptor, parse_offset_list,
    CommonHeader, Descriptor, OffsetList,
};
use crate::string::read_null_terminated_string;

/// One parsed header volume: the common header and, when the volume carries
/// a descriptor, every directory, file, file group and component it lists.
#[derive(Clone, Debug)]
pub struct CabinetHeader {
    volume: u32,
    common: CommonHeader,
    major_version: u32,
    descriptor: Option<Descriptor>,
    file_table: Vec<u32>,
    directories: Vec<String>,
    files: Vec<FileDescriptor>,
    file_groups: Vec<FileGroup>,
    components: Vec<Component>,
}

impl CabinetHeader {
    /// Reads a volume from `reader` up to the end of its descriptor area and
    /// parses it.  Data-only volumes are recognised from their first 20
    /// bytes without reading further.
    pub fn read<R: Read>(
        mut reader: R,
        volume: u32,
        forced_version: Option<u32>,
    ) -> Result<CabinetHeader> {
        let mut data = vec![0u8; consts::COMMON_HEADER_SIZE];
        reader
            .read_exact(&mut data)
            .map_err(|error| Error::reading(error, "common header", Some(0)))?;
        let common = parse_common_header(data.as_slice())?;
        common.check_signature()?;
        if !common.is_header_only() {
            let end = common.descriptor_offset as u64
                + common.descriptor_size as u64;
            let rest = end.saturating_sub(consts::COMMON_HEADER_SIZE as u64);
            reader.take(rest).read_to_end(&mut data)?;
        }
        CabinetHeader::parse(&data, volume, forced_version)
    }

    /// Parses a volume held in memory.  `volume` is the volume's 1-based
    /// number within its set; `forced_version` overrides the major version
    /// derived from the header.
    pub fn parse(
        data: &[u8],
        volume: u32,
        forced_version: Option<u32>,
    ) -> Result<CabinetHeader> {
        let common = parse_common_header(data).map_err(|error| {
            Error::reading(error, "common header", Some(0))
        })?;
        common.check_signature()?;
        let major_version =
            forced_version.unwrap_or_else(|| major_version(common.version));
        log::debug!(
            "Volume {}: version field {:#010x}, major version {}",
            volume,
            common.version,
            major_version
        );
        let mut header = CabinetHeader {
            volume,
            common,
            major_version,
            descriptor: None,
            file_table: Vec::new(),
            directories: Vec::new(),
            files: Vec::new(),
            file_groups: Vec::new(),
            components: Vec::new(),
        };
        if common.is_header_only() {
            return Ok(header);
        }

        let arena = Arena {
            data,
            base: common.descriptor_offset as u64,
            is_utf16: major_version >= consts::FIRST_UTF16_VERSION,
        };
        let descriptor = arena.record(0, "descriptor", |r| parse_descriptor(r))?;
        if descriptor.file_table_size != descriptor.file_table_size2 {
            log::warn!(
                "File table sizes disagree ({} and {}), continuing",
                descriptor.file_table_size,
                descriptor.file_table_size2
            );
        }

        let file_table_base = descriptor.file_table_offset as u64;
        let layout = DescriptorLayout::for_version(major_version);
        let table_len = match layout {
            DescriptorLayout::V5 { .. } => {
                descriptor.directory_count as u64
                    + descriptor.file_count as u64
            }
            DescriptorLayout::V6Plus => descriptor.directory_count as u64,
        };
        header.file_table =
            arena.record(file_table_base, "file table", |reader| {
                read_offset_table(reader, table_len)
            })?;

        for &offset in
            header.file_table.iter().take(descriptor.directory_count as usize)
        {
            let name = arena
                .string(file_table_base + offset as u64, "directory name")?;
            header.directories.push(name);
        }

        for index in 0..descriptor.file_count as u64 {
            let offset = match layout {
                DescriptorLayout::V5 { .. } => {
                    let slot = (descriptor.directory_count as u64 + index)
                        as usize;
                    file_table_base + header.file_table[slot] as u64
                }
                DescriptorLayout::V6Plus => {
                    file_table_base
                        + descriptor.file_table_offset2 as u64
                        + index * consts::FILE_DESCRIPTOR_SIZE_V6
                }
            };
            let mut file = arena.record(offset, "file descriptor", |r| {
                parse_file_descriptor(r, layout, volume)
            })?;
            if file.name_offset != 0 {
                file.name = arena.string(
                    file_table_base + file.name_offset as u64,
                    "file name",
                )?;
            }
            header.files.push(file);
        }

        for &head in descriptor.file_group_offsets.iter() {
            for node in arena.offset_list(head, "file group list")? {
                let record = arena.record(
                    node.descriptor_offset as u64,
                    "file group",
                    |r| FileGroupRecord::parse(r, major_version),
                )?;
                let name = arena
                    .string(record.name_offset as u64, "file group name")?;
                header.file_groups.push(record.into_group(name));
            }
        }

        for &head in descriptor.component_offsets.iter() {
            for node in arena.offset_list(head, "component list")? {
                let record = arena.record(
                    node.descriptor_offset as u64,
                    "component",
                    |r| ComponentRecord::parse(r, major_version),
                )?;
                let name_offset = match record.identifier_offset {
                    0 => node.name_offset,
                    offset => offset,
                };
                let name =
                    arena.string(name_offset as u64, "component name")?;
                let display_name = match record.display_name_offset {
                    0 => None,
                    offset => Some(arena.string(
                        offset as u64,
                        "component display name",
                    )?),
                };
                let table_offset = record.file_group_names_offset as u64;
                let name_offsets = arena.record(
                    table_offset,
                    "component file group table",
                    |r| read_offset_table(r, record.file_group_count as u64),
                )?;
                let mut file_group_names =
                    Vec::with_capacity(name_offsets.len());
                for offset in name_offsets {
                    file_group_names.push(arena.string(
                        offset as u64,
                        "component file group name",
                    )?);
                }
                header.components.push(record.into_component(
                    name,
                    display_name,
                    file_group_names,
                ));
            }
        }

        header.descriptor = Some(descriptor);
        Ok(header)
    }

    /// Returns the volume's 1-based number within its set.
    pub fn volume(&self) -> u32 {
        self.volume
    }

    /// Returns the common header.
    pub fn common_header(&self) -> &CommonHeader {
        &self.common
    }

    /// Returns the major version used to pick record layouts.
    pub fn major_version(&self) -> u32 {
        self.major_version
    }

    /// Returns the descriptor, or `None` for a data-only volume.
    pub fn descriptor(&self) -> Option<&Descriptor> {
        self.descriptor.as_ref()
    }

    /// Returns the raw file table offsets.
    pub fn file_table(&self) -> &[u32] {
        &self.file_table
    }

    /// Returns the directory names.
    pub fn directories(&self) -> &[String] {
        &self.directories
    }

    /// Returns the file descriptors.
    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    /// Returns the file groups in discovery order.
    pub fn file_groups(&self) -> &[FileGroup] {
        &self.file_groups
    }

    /// Returns the components in discovery order.
    pub fn components(&self) -> &[Component] {
        &self.components
    }
}

fn read_offset_table<R: Read>(mut reader: R, count: u64) -> io::Result<Vec<u32>> {
    let mut table = Vec::new();
    for _ in 0..count {
        table.push(reader.read_u32::<LittleEndian>()?);
    }
    Ok(table)
}

/// Bounds-checked access to records addressed relative to the descriptor.
struct Arena<'a> {
    data: &'a [u8],
    base: u64,
    is_utf16: bool,
}

impl<'a> Arena<'a> {
    fn cursor(&self, offset: u64, what: &str) -> Result<Cursor<&'a [u8]>> {
        let absolute = self.base + offset;
        if absolute > self.data.len() as u64 {
            return Err(Error::Truncated {
                what: what.to_string(),
                offset: Some(absolute),
            });
        }
        let mut cursor = Cursor::new(self.data);
        cursor.set_position(absolute);
        Ok(cursor)
    }

    fn record<T, F>(&self, offset: u64, what: &str, parse: F) -> Result<T>
    where
        F: FnOnce(&mut Cursor<&'a [u8]>) -> io::Result<T>,
    {
        let mut cursor = self.cursor(offset, what)?;
        parse(&mut cursor)
            .map_err(|error| Error::reading(error, what, Some(self.base + offset)))
    }

    fn string(&self, offset: u64, what: &str) -> Result<String> {
        let is_utf16 = self.is_utf16;
        self.record(offset, what, |reader| {
            read_null_terminated_string(reader, is_utf16)
        })
    }

    /// Walks the offset list starting at `head` until a zero next offset.
    fn offset_list(
        &self,
        head: u32,
        what: &str,
    ) -> Result<Vec<OffsetList>> {
        let mut nodes = Vec::new();
        let mut visited = HashSet::new();
        let mut next = head;
        while next != 0 {
            if !visited.insert(next) {
                return Err(Error::InvalidData(format!(
                    "{} revisits node at offset {:#x}",
                    what, next
                )));
            }
            if nodes.len() == consts::MAX_OFFSET_LIST_NODES {
                return Err(Error::InvalidData(format!(
                    "{} is longer than {} nodes",
                    what,
                    consts::MAX_OFFSET_LIST_NODES
                )));
            }
            let node = self.record(next as u64, what, |r| parse_offset_list(r))?;
            next = node.next_offset;
            nodes.push(node);
        }
        Ok(nodes)
    }
}
