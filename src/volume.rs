use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The two kinds of volume file in a cabinet set.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum VolumeKind {
    /// A `.hdr` file holding only the descriptor.
    Header,
    /// A `.cab` file holding file data, and sometimes the descriptor.
    Cabinet,
}

impl VolumeKind {
    /// Returns the lowercase file extension for this kind.
    pub fn extension(self) -> &'static str {
        match self {
            VolumeKind::Header => "hdr",
            VolumeKind::Cabinet => "cab",
        }
    }
}

/// Opens the numbered volumes of a cabinet set.
pub trait VolumeSource {
    /// The stream type of an open volume.
    type Volume: Read + Seek;

    /// Opens volume `index` (1-based) of the given kind, returning `None` if
    /// it does not exist.
    fn open_volume(
        &self,
        index: u32,
        kind: VolumeKind,
    ) -> io::Result<Option<Self::Volume>>;

    /// Describes where volume `index` would be found, for error messages.
    fn describe(&self, index: u32, kind: VolumeKind) -> String;
}

/// Volumes named `{prefix}{index}.{hdr,cab}` in one directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FsVolumes {
    directory: PathBuf,
    prefix: String,
}

impl FsVolumes {
    /// Derives the naming pattern from the path of any volume in the set:
    /// `disk1/data1.hdr` and `disk1/data2.cab` both give `disk1/data`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> FsVolumes {
        let path = path.as_ref();
        let directory = match path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::new(),
        };
        let stem = match path.file_stem() {
            Some(stem) => stem.to_string_lossy().into_owned(),
            None => String::new(),
        };
        let prefix = stem.trim_end_matches(|c: char| c.is_ascii_digit());
        FsVolumes { directory, prefix: prefix.to_string() }
    }

    /// Returns the directory holding the volumes.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the file name prefix shared by the volumes.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the path of a volume, using a lowercase extension.
    pub fn volume_path(&self, index: u32, kind: VolumeKind) -> PathBuf {
        self.directory
            .join(format!("{}{}.{}", self.prefix, index, kind.extension()))
    }

    /// Finds an existing volume file, trying the lowercase and uppercase
    /// extensions before scanning the directory for a case-insensitive
    /// match of the whole name.
    pub fn find_volume(
        &self,
        index: u32,
        kind: VolumeKind,
    ) -> io::Result<Option<PathBuf>> {
        let extension = kind.extension();
        for ext in [extension.to_string(), extension.to_ascii_uppercase()] {
            let path = self
                .directory
                .join(format!("{}{}.{}", self.prefix, index, ext));
            if path.is_file() {
                return Ok(Some(path));
            }
        }
        let wanted = format!("{}{}.{}", self.prefix, index, extension);
        let directory = if self.directory.as_os_str().is_empty() {
            Path::new(".")
        } else {
            self.directory.as_path()
        };
        let entries = match fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(error) => return Err(error),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().eq_ignore_ascii_case(&wanted)
                && entry.path().is_file()
            {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }
}

impl VolumeSource for FsVolumes {
    type Volume = BufReader<File>;

    fn open_volume(
        &self,
        index: u32,
        kind: VolumeKind,
    ) -> io::Result<Option<BufReader<File>>> {
        match self.find_volume(index, kind)? {
            Some(path) => {
                log::debug!("Opening volume {}", path.display());
                Ok(Some(BufReader::new(File::open(path)?)))
            }
            None => Ok(None),
        }
    }

    fn describe(&self, index: u32, kind: VolumeKind) -> String {
        self.volume_path(index, kind).display().to_string()
    }
}

/// Volumes held in memory, for embedding applications and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryVolumes {
    volumes: HashMap<(u32, VolumeKind), Arc<[u8]>>,
}

impl MemoryVolumes {
    /// Creates an empty set.
    pub fn new() -> MemoryVolumes {
        MemoryVolumes { volumes: HashMap::new() }
    }

    /// Adds or replaces a volume.
    pub fn insert<D: Into<Arc<[u8]>>>(
        &mut self,
        index: u32,
        kind: VolumeKind,
        data: D,
    ) -> &mut MemoryVolumes {
        self.volumes.insert((index, kind), data.into());
        self
    }

    /// Adds or replaces a volume, builder style.
    pub fn with<D: Into<Arc<[u8]>>>(
        mut self,
        index: u32,
        kind: VolumeKind,
        data: D,
    ) -> MemoryVolumes {
        self.insert(index, kind, data);
        self
    }

    /// Removes a volume, returning its data.
    pub fn remove(&mut self, index: u32, kind: VolumeKind) -> Option<Arc<[u8]>> {
        self.volumes.remove(&(index, kind))
    }
}

impl VolumeSource for MemoryVolumes {
    type Volume = Cursor<Arc<[u8]>>;

    fn open_volume(
        &self,
        index: u32,
        kind: VolumeKind,
    ) -> io::Result<Option<Cursor<Arc<[u8]>>>> {
        Ok(self.volumes.get(&(index, kind)).map(|data| Cursor::new(data.clone())))
    }

    fn describe(&self, index: u32, kind: VolumeKind) -> String {
        format!("in-memory volume {}.{}", index, kind.extension())
    }
}
