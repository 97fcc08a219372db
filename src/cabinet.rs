use std::path::Path;

use crate::consts;
use crate::error::{Error, Result};
use crate::file::{FileDescriptor, FileDescriptors};
use crate::group::{Component, FileGroup};
use crate::parse::CabinetHeader;
use crate::reader::FileReader;
use crate::volume::{FsVolumes, VolumeKind, VolumeSource};

/// Options for opening a cabinet set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenOptions {
    version: Option<u32>,
    max_link_hops: usize,
    max_volumes: u32,
}

impl OpenOptions {
    /// Creates the default options.
    pub fn new() -> OpenOptions {
        OpenOptions {
            version: None,
            max_link_hops: consts::DEFAULT_MAX_LINK_HOPS,
            max_volumes: consts::DEFAULT_MAX_VOLUMES,
        }
    }

    /// Overrides the major version computed from the header's version
    /// field.  Some installers write a version field that does not match
    /// the record layouts they use.
    pub fn force_version(&mut self, version: Option<u32>) -> &mut OpenOptions {
        self.version = version;
        self
    }

    /// Sets how many "previous" links extraction follows before giving up.
    pub fn max_link_hops(&mut self, hops: usize) -> &mut OpenOptions {
        self.max_link_hops = hops;
        self
    }

    /// Sets how many volumes are opened, both when reading the header chain
    /// and when searching for a file's first volume.
    pub fn max_volumes(&mut self, volumes: u32) -> &mut OpenOptions {
        self.max_volumes = volumes.max(1);
        self
    }

    /// Opens the cabinet set containing the volume at `path`.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<Cabinet<FsVolumes>> {
        self.open_source(FsVolumes::from_path(path))
    }

    /// Opens a cabinet set from any volume source.
    pub fn open_source<S: VolumeSource>(&self, source: S) -> Result<Cabinet<S>> {
        Cabinet::with_options(source, self.clone())
    }
}

impl Default for OpenOptions {
    fn default() -> OpenOptions {
        OpenOptions::new()
    }
}

/// An open InstallShield cabinet set.
///
/// The headers of every volume are parsed up front; file data is read from
/// the volumes on demand.
pub struct Cabinet<S: VolumeSource = FsVolumes> {
    source: S,
    headers: Vec<CabinetHeader>,
    primary: Option<usize>,
    options: OpenOptions,
}

impl Cabinet<FsVolumes> {
    /// Opens the cabinet set containing the volume at `path`, which may name
    /// any of its `.hdr` or `.cab` files.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Cabinet<FsVolumes>> {
        OpenOptions::new().open(path)
    }
}

impl<S: VolumeSource> Cabinet<S> {
    /// Opens a cabinet set from the given volume source with default
    /// options.
    pub fn with_source(source: S) -> Result<Cabinet<S>> {
        Cabinet::with_options(source, OpenOptions::new())
    }

    fn with_options(source: S, options: OpenOptions) -> Result<Cabinet<S>> {
        let mut headers = Vec::new();
        let mut try_header = true;
        for index in 1..=options.max_volumes {
            let mut stream = None;
            if try_header {
                stream = source.open_volume(index, VolumeKind::Header)?;
                if stream.is_some() {
                    try_header = false;
                }
            }
            if stream.is_none() {
                stream = source.open_volume(index, VolumeKind::Cabinet)?;
            }
            let stream = match stream {
                Some(stream) => stream,
                None => break,
            };
            let header = CabinetHeader::read(stream, index, options.version)?;
            headers.push(header);
        }
        if headers.is_empty() {
            return Err(Error::VolumeMissing {
                volume: 1,
                location: source.describe(1, VolumeKind::Cabinet),
            });
        }
        let primary =
            headers.iter().position(|header| header.descriptor().is_some());
        match primary {
            Some(index) => log::debug!(
                "Opened {} volume(s); descriptor in volume {}",
                headers.len(),
                headers[index].volume()
            ),
            None => log::warn!(
                "None of the {} volume(s) carries a descriptor",
                headers.len()
            ),
        }
        Ok(Cabinet { source, headers, primary, options })
    }

    /// Returns the volume source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the parsed header of every volume, in volume order.
    pub fn headers(&self) -> &[CabinetHeader] {
        &self.headers
    }

    /// Returns the number of volumes found when the set was opened.
    pub fn volume_count(&self) -> usize {
        self.headers.len()
    }

    fn primary(&self) -> Option<&CabinetHeader> {
        self.primary.map(|index| &self.headers[index])
    }

    /// Returns the major version that drives record layouts.
    pub fn major_version(&self) -> u32 {
        match self.primary() {
            Some(header) => header.major_version(),
            None => self.headers[0].major_version(),
        }
    }

    /// Returns the number of files, including invalid entries.
    pub fn file_count(&self) -> usize {
        self.primary().map_or(0, |header| header.files().len())
    }

    /// Returns the number of directories.
    pub fn directory_count(&self) -> usize {
        self.primary().map_or(0, |header| header.directories().len())
    }

    /// Returns the number of components.
    pub fn component_count(&self) -> usize {
        self.primary().map_or(0, |header| header.components().len())
    }

    /// Returns the number of file groups.
    pub fn file_group_count(&self) -> usize {
        self.primary().map_or(0, |header| header.file_groups().len())
    }

    /// Returns an iterator over the file descriptors.
    pub fn files(&self) -> FileDescriptors<'_> {
        let files = self.primary().map_or(&[][..], |header| header.files());
        FileDescriptors { iter: files.iter() }
    }

    /// Returns the descriptor of file `index`.
    pub fn file_descriptor(&self, index: usize) -> Result<&FileDescriptor> {
        let files = self.primary().map_or(&[][..], |header| header.files());
        match files.get(index) {
            Some(file) => Ok(file),
            None => invalid_descriptor!(
                index,
                "index out of range (the cabinet has {} files)",
                files.len()
            ),
        }
    }

    /// Returns the name of file `index`.
    pub fn file_name(&self, index: usize) -> Option<&str> {
        self.file_descriptor(index).ok().map(FileDescriptor::name)
    }

    /// Returns true if file `index` exists and can be extracted.
    pub fn is_file_valid(&self, index: usize) -> bool {
        self.file_descriptor(index).map_or(false, FileDescriptor::is_valid)
    }

    /// Returns the expanded size of file `index`.
    pub fn file_size(&self, index: usize) -> Option<u64> {
        self.file_descriptor(index).ok().map(FileDescriptor::expanded_size)
    }

    /// Returns the directory index of file `index`.
    pub fn file_directory_index(&self, index: usize) -> Option<u32> {
        self.file_descriptor(index).ok().map(FileDescriptor::directory_index)
    }

    /// Returns the name of the directory holding file `index`.
    pub fn file_directory(&self, index: usize) -> Option<&str> {
        let directory = self.file_directory_index(index)?;
        self.directory_name(directory as usize)
    }

    /// Returns the name of directory `index`.
    pub fn directory_name(&self, index: usize) -> Option<&str> {
        self.primary()?.directories().get(index).map(String::as_str)
    }

    /// Returns the components.
    pub fn components(&self) -> &[Component] {
        self.primary().map_or(&[][..], |header| header.components())
    }

    /// Returns the name of component `index`.
    pub fn component_name(&self, index: usize) -> Option<&str> {
        self.components().get(index).map(Component::name)
    }

    /// Returns the file groups.
    pub fn file_groups(&self) -> &[FileGroup] {
        self.primary().map_or(&[][..], |header| header.file_groups())
    }

    /// Returns the name of file group `index`.
    pub fn file_group_name(&self, index: usize) -> Option<&str> {
        self.file_groups().get(index).map(FileGroup::name)
    }

    /// Finds a file group by name.
    pub fn find_file_group(&self, name: &str) -> Option<&FileGroup> {
        self.file_groups().iter().find(|group| group.name() == name)
    }

    /// Returns the indices of the files in `group`, clamped to the files
    /// that exist.
    pub fn file_group_files(&self, group: &FileGroup) -> Vec<usize> {
        let count = self.file_count();
        group
            .files()
            .map(|index| index as usize)
            .take_while(|&index| index < count)
            .collect()
    }

    /// Returns the file groups installed by component `index`, skipping
    /// names that match no group.
    pub fn component_file_groups(&self, index: usize) -> Vec<&FileGroup> {
        let component = match self.components().get(index) {
            Some(component) => component,
            None => return Vec::new(),
        };
        component
            .file_group_names()
            .iter()
            .filter_map(|name| self.find_file_group(name))
            .collect()
    }

    /// Follows "previous" links from file `index` to the entry that holds
    /// the data, checking each entry along the way.
    pub(crate) fn resolve_file(
        &self,
        index: usize,
    ) -> Result<(usize, &FileDescriptor)> {
        let mut current = index;
        let mut hops = 0;
        loop {
            let file = self.file_descriptor(current)?;
            if file.is_invalid() {
                invalid_descriptor!(current, "flagged invalid");
            }
            if file.data_offset() == 0 {
                invalid_descriptor!(current, "zero data offset");
            }
            if !file.link_flags().has_previous() {
                return Ok((current, file));
            }
            if hops >= self.options.max_link_hops {
                return Err(Error::ChainCycle { index, hops });
            }
            log::trace!(
                "File {} links to previous file {}",
                current,
                file.link_previous()
            );
            current = file.link_previous() as usize;
            hops += 1;
        }
    }

    /// Opens a reader over the stored bytes of file `index`, after following
    /// its links.  The bytes are deobfuscated but still compressed if the
    /// file is.
    pub fn read_file(&self, index: usize) -> Result<FileReader<'_, S>> {
        let (index, file) = self.resolve_file(index)?;
        FileReader::new(
            &self.source,
            self.major_version(),
            self.file_count() as u32,
            index,
            file,
            self.options.max_volumes,
        )
    }
}
