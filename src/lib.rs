//! A library for reading [InstallShield](https://en.wikipedia.org/wiki/InstallShield)
//! cabinet sets (`data1.hdr`, `data1.cab`, `data2.cab`, ...) and
//! InstallShield 3 (`.Z`) archives.
//!
//! ```no_run
//! use iscab::{Cabinet, ExtractMethod};
//!
//! let cabinet = Cabinet::open("disk1/data1.hdr")?;
//! for index in 0..cabinet.file_count() {
//!     if !cabinet.is_file_valid(index) {
//!         continue;
//!     }
//!     let name = cabinet.file_name(index).unwrap_or_default();
//!     let mut contents = Vec::new();
//!     cabinet.extract_to(index, &mut contents, ExtractMethod::Chunked)?;
//!     println!("{}: {} bytes", name, contents.len());
//! }
//! # Ok::<(), iscab::Error>(())
//! ```

#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod blast;
mod cabinet;
mod consts;
mod datetime;
mod error;
mod extract;
mod file;
mod group;
mod header;
mod inflate;
mod obfuscation;
mod parse;
mod reader;
mod string;
mod v3;
mod volume;

pub use crate::cabinet::{Cabinet, OpenOptions};
pub use crate::datetime::{datetime_from_bits, datetime_from_dos};
pub use crate::error::{Error, ForeignFormat, Result};
pub use crate::extract::ExtractMethod;
pub use crate::file::{FileDescriptor, FileDescriptors, FileFlags, LinkFlags};
pub use crate::group::{Component, ComponentHooks, FileGroup};
pub use crate::header::{major_version, CommonHeader, Descriptor, VolumeHeader};
pub use crate::inflate::{InflateStatus, Inflated, RawInflater};
pub use crate::obfuscation::Obfuscation;
pub use crate::parse::CabinetHeader;
pub use crate::reader::FileReader;
pub use crate::v3::{CompressedFile, V3Archive, V3Directory, V3Header};
pub use crate::volume::{FsVolumes, MemoryVolumes, VolumeKind, VolumeSource};
