use std::fmt;
use std::io;

use thiserror::Error;

use crate::blast::BlastError;
use crate::consts;
use crate::inflate::InflateStatus;

/// An archive format that is sometimes confused with an InstallShield
/// cabinet but that must be opened with a different tool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ForeignFormat {
    /// A Microsoft cabinet (`MSCF`).
    MicrosoftCabinet,
    /// An InstallShield 3 archive; open it with
    /// [`V3Archive`](crate::V3Archive) instead.
    InstallShieldV3,
    /// A ZIP archive.
    Zip,
    /// A Windows executable, typically a self-extracting installer.
    Executable,
}

impl ForeignFormat {
    pub(crate) fn from_signature(signature: u32) -> Option<ForeignFormat> {
        match signature {
            consts::MSCF_SIGNATURE => Some(ForeignFormat::MicrosoftCabinet),
            consts::V3_SIGNATURE => Some(ForeignFormat::InstallShieldV3),
            consts::ZIP_SIGNATURE => Some(ForeignFormat::Zip),
            _ if signature as u16 == consts::MZ_SIGNATURE => {
                Some(ForeignFormat::Executable)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ForeignFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ForeignFormat::MicrosoftCabinet => {
                "Microsoft cabinet, use a Microsoft CAB extractor"
            }
            ForeignFormat::InstallShieldV3 => {
                "InstallShield 3 archive, open it as a V3 archive"
            }
            ForeignFormat::Zip => "ZIP archive",
            ForeignFormat::Executable => {
                "Windows executable, unpack the installer first"
            }
        })
    }
}

fn describe_foreign(foreign: &Option<ForeignFormat>) -> String {
    match foreign {
        Some(format) => format!(" (looks like a {})", format),
        None => String::new(),
    }
}

/// Errors produced while reading cabinets and V3 archives.
#[derive(Debug, Error)]
pub enum Error {
    /// An underlying I/O operation failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The input does not begin with the expected signature.
    #[error(
        "not an {expected}: signature {signature:#010x}{}",
        describe_foreign(.foreign)
    )]
    NotThisFormat {
        /// The kind of file that was expected.
        expected: &'static str,
        /// The first four bytes of the input, little-endian.
        signature: u32,
        /// A recognised foreign format, if any.
        foreign: Option<ForeignFormat>,
    },

    /// A record or string lies beyond the end of the available data.
    #[error("truncated {what}{}", describe_offset(.offset))]
    Truncated {
        /// What was being read.
        what: String,
        /// Where it was being read from, when known.
        offset: Option<u64>,
    },

    /// A structurally impossible value was found.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A file index is out of range or its descriptor cannot be extracted.
    #[error("invalid file descriptor {index}: {reason}")]
    InvalidDescriptor {
        /// The file index.
        index: usize,
        /// Why the descriptor was rejected.
        reason: String,
    },

    /// A volume of a multi-volume set could not be found.
    #[error("volume {volume} not found (looked for {location})")]
    VolumeMissing {
        /// The 1-based volume number.
        volume: u32,
        /// The place that was searched.
        location: String,
    },

    /// Following a file's "previous" links did not terminate.
    #[error("link chain from file {index} did not end after {hops} hops")]
    ChainCycle {
        /// The file index extraction started from.
        index: usize,
        /// How many links were followed.
        hops: usize,
    },

    /// A compressed file contains a chunk whose length prefix is zero.
    #[error("zero-length chunk in file {index} (volume {volume})")]
    ZeroLengthChunk {
        /// The file index.
        index: usize,
        /// The volume the chunk prefix was read from.
        volume: u32,
    },

    /// Legacy extraction found no end-of-chunk marker in the remaining
    /// compressed bytes.
    #[error(
        "no end-of-chunk marker in the last {remaining} compressed bytes \
         of file {index} (volume {volume})"
    )]
    MissingChunkMarker {
        /// The file index.
        index: usize,
        /// The volume being read.
        volume: u32,
        /// How many compressed bytes were left unscanned.
        remaining: usize,
    },

    /// A deflate chunk could not be decompressed.
    #[error(
        "failed to inflate chunk of file {index} in volume {volume} \
         ({chunk_length} byte chunk, {bytes_consumed} compressed bytes \
         already consumed): {status}"
    )]
    Decompression {
        /// The file index.
        index: usize,
        /// The volume the chunk was read from.
        volume: u32,
        /// The compressed length of the failing chunk.
        chunk_length: usize,
        /// Compressed bytes of the file consumed before this chunk.
        bytes_consumed: u64,
        /// The inflater's verdict.
        status: InflateStatus,
    },

    /// An explode (blast) stream in a V3 archive was malformed.
    #[error("failed to explode {path} (data at offset {offset:#x}): {source}")]
    Blast {
        /// The archive path of the file.
        path: String,
        /// The absolute offset of the compressed data.
        offset: u64,
        /// The decoder's verdict.
        #[source]
        source: BlastError,
    },

    /// Extraction produced a different number of bytes than declared.
    #[error("file {index} expanded to {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// The file index.
        index: usize,
        /// The declared expanded size.
        expected: u64,
        /// The number of bytes actually produced.
        actual: u64,
    },

    /// Extracted bytes do not match the MD5 digest stored for the file.
    #[error(
        "file {index} failed MD5 verification: expected {expected}, \
         got {actual}"
    )]
    ChecksumMismatch {
        /// The file index.
        index: usize,
        /// The stored digest, in lowercase hex.
        expected: String,
        /// The digest of the extracted bytes, in lowercase hex.
        actual: String,
    },

    /// No file with the given path exists in a V3 archive.
    #[error("no file named {0:?} in archive")]
    NotFound(String),
}

fn describe_offset(offset: &Option<u64>) -> String {
    match offset {
        Some(offset) => format!(" at offset {:#x}", offset),
        None => String::new(),
    }
}

impl Error {
    /// Converts an I/O error raised while reading `what` into the most
    /// specific variant: end-of-file becomes [`Error::Truncated`] and
    /// malformed-data errors become [`Error::InvalidData`].
    pub(crate) fn reading(
        error: io::Error,
        what: impl Into<String>,
        offset: Option<u64>,
    ) -> Error {
        match error.kind() {
            io::ErrorKind::UnexpectedEof => {
                Error::Truncated { what: what.into(), offset }
            }
            io::ErrorKind::InvalidData => {
                Error::InvalidData(format!("{}: {}", what.into(), error))
            }
            _ => Error::Io(error),
        }
    }
}

/// A specialized `Result` for this crate's operations.
pub type Result<T> = std::result::Result<T, Error>;
