use std::io::{self, Read};
use std::ops::RangeInclusive;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::consts;

/// A named, contiguous range of files.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileGroup {
    name: String,
    expanded_size: u64,
    compressed_size: u64,
    attributes: u16,
    first_file: u32,
    last_file: u32,
}

impl FileGroup {
    /// Returns the group's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the total expanded size of the group's files.
    pub fn expanded_size(&self) -> u64 {
        self.expanded_size
    }

    /// Returns the total compressed size of the group's files.
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// Returns the raw attribute bits.
    pub fn attributes(&self) -> u16 {
        self.attributes
    }

    /// Returns the index of the group's first file.
    pub fn first_file(&self) -> u32 {
        self.first_file
    }

    /// Returns the index of the group's last file.
    pub fn last_file(&self) -> u32 {
        self.last_file
    }

    /// Returns the indices of the group's files.  Empty when the range is
    /// reversed.
    pub fn files(&self) -> RangeInclusive<u32> {
        self.first_file..=self.last_file
    }
}

pub(crate) struct FileGroupRecord {
    pub name_offset: u32,
    expanded_size: u64,
    compressed_size: u64,
    attributes: u16,
    first_file: u32,
    last_file: u32,
}

impl FileGroupRecord {
    pub(crate) fn parse<R: Read>(
        mut reader: R,
        major_version: u32,
    ) -> io::Result<FileGroupRecord> {
        let name_offset = reader.read_u32::<LittleEndian>()?;
        let (expanded_size, compressed_size, attributes);
        if major_version <= consts::LAST_V5_LAYOUT_VERSION {
            expanded_size = reader.read_u32::<LittleEndian>()? as u64;
            let mut _reserved1 = [0u8; 32];
            reader.read_exact(&mut _reserved1)?;
            compressed_size = reader.read_u32::<LittleEndian>()? as u64;
            let mut _reserved2 = [0u8; 30];
            reader.read_exact(&mut _reserved2)?;
            attributes = reader.read_u16::<LittleEndian>()?;
        } else {
            expanded_size = reader.read_u64::<LittleEndian>()?;
            compressed_size = reader.read_u64::<LittleEndian>()?;
            attributes = reader.read_u16::<LittleEndian>()?;
        }
        let first_file = reader.read_u32::<LittleEndian>()?;
        let last_file = reader.read_u32::<LittleEndian>()?;
        Ok(FileGroupRecord {
            name_offset,
            expanded_size,
            compressed_size,
            attributes,
            first_file,
            last_file,
        })
    }

    pub(crate) fn into_group(self, name: String) -> FileGroup {
        FileGroup {
            name,
            expanded_size: self.expanded_size,
            compressed_size: self.compressed_size,
            attributes: self.attributes,
            first_file: self.first_file,
            last_file: self.last_file,
        }
    }
}

/// Offsets of a component's install/uninstall script hooks.  The scripts are
/// never run; the offsets are kept for inspection.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ComponentHooks {
    /// Offset of the "on installing" handler name.
    pub on_installing: u32,
    /// Offset of the "on installed" handler name.
    pub on_installed: u32,
    /// Offset of the "on uninstalling" handler name.
    pub on_uninstalling: u32,
    /// Offset of the "on uninstalled" handler name.
    pub on_uninstalled: u32,
}

/// A named, installable unit referencing file groups by name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Component {
    name: String,
    display_name: Option<String>,
    status: u16,
    component_index: u16,
    file_group_names: Vec<String>,
    hooks: ComponentHooks,
}

impl Component {
    /// Returns the component's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name shown to users, if the component has one.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns the raw status field.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns the component's own index field.
    pub fn component_index(&self) -> u16 {
        self.component_index
    }

    /// Returns the names of the file groups this component installs.
    pub fn file_group_names(&self) -> &[String] {
        &self.file_group_names
    }

    /// Returns the offsets of the lifecycle hooks.
    pub fn hooks(&self) -> ComponentHooks {
        self.hooks
    }
}

pub(crate) struct ComponentRecord {
    pub identifier_offset: u32,
    pub display_name_offset: u32,
    pub file_group_count: u16,
    pub file_group_names_offset: u32,
    status: u16,
    component_index: u16,
    hooks: ComponentHooks,
}

impl ComponentRecord {
    pub(crate) fn parse<R: Read>(
        mut reader: R,
        major_version: u32,
    ) -> io::Result<ComponentRecord> {
        let identifier_offset = reader.read_u32::<LittleEndian>()?;
        let _descriptor_offset = reader.read_u32::<LittleEndian>()?;
        let display_name_offset = reader.read_u32::<LittleEndian>()?;
        let status = reader.read_u16::<LittleEndian>()?;
        let _password_offset = reader.read_u32::<LittleEndian>()?;
        let _misc_offset = reader.read_u32::<LittleEndian>()?;
        let component_index = reader.read_u16::<LittleEndian>()?;
        let _name_offset = reader.read_u32::<LittleEndian>()?;
        let _cdrom_folder_offset = reader.read_u32::<LittleEndian>()?;
        let _http_location_offset = reader.read_u32::<LittleEndian>()?;
        let _ftp_location_offset = reader.read_u32::<LittleEndian>()?;
        let mut _guid = [0u8; 32];
        reader.read_exact(&mut _guid)?;
        let _clsid_offset = reader.read_u32::<LittleEndian>()?;
        let mut _reserved1 = [0u8; 28];
        reader.read_exact(&mut _reserved1)?;
        let reserved2_size =
            if major_version <= consts::LAST_V5_LAYOUT_VERSION { 2 } else { 1 };
        let mut _reserved2 = [0u8; 2];
        reader.read_exact(&mut _reserved2[..reserved2_size])?;
        let _depends_count = reader.read_u16::<LittleEndian>()?;
        let _depends_offset = reader.read_u32::<LittleEndian>()?;
        let file_group_count = reader.read_u16::<LittleEndian>()?;
        if file_group_count as usize > consts::MAX_FILE_GROUP_COUNT {
            invalid_data!(
                "Component lists {} file groups (max is {})",
                file_group_count,
                consts::MAX_FILE_GROUP_COUNT
            );
        }
        let file_group_names_offset = reader.read_u32::<LittleEndian>()?;
        let _x3_count = reader.read_u16::<LittleEndian>()?;
        let _x3_offset = reader.read_u32::<LittleEndian>()?;
        let _sub_components_count = reader.read_u16::<LittleEndian>()?;
        let _sub_components_offset = reader.read_u32::<LittleEndian>()?;
        let _next_component_offset = reader.read_u32::<LittleEndian>()?;
        let hooks = ComponentHooks {
            on_installing: reader.read_u32::<LittleEndian>()?,
            on_installed: reader.read_u32::<LittleEndian>()?,
            on_uninstalling: reader.read_u32::<LittleEndian>()?,
            on_uninstalled: reader.read_u32::<LittleEndian>()?,
        };
        Ok(ComponentRecord {
            identifier_offset,
            display_name_offset,
            file_group_count,
            file_group_names_offset,
            status,
            component_index,
            hooks,
        })
    }

    pub(crate) fn into_component(
        self,
        name: String,
        display_name: Option<String>,
        file_group_names: Vec<String>,
    ) -> Component {
        Component {
            name,
            display_name,
            status: self.status,
            component_index: self.component_index,
            file_group_names,
            hooks: self.hooks,
        }
    }
}
