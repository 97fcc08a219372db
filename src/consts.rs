pub const CABINET_SIGNATURE: u32 = 0x28635349; // "ISc(" stored little-endian
pub const MSCF_SIGNATURE: u32 = 0x4643534d; // "MSCF" stored little-endian
pub const V3_SIGNATURE: u32 = 0x8c655d13;
pub const ZIP_SIGNATURE: u32 = 0x04034b50; // "PK\x03\x04"
pub const MZ_SIGNATURE: u16 = 0x5a4d; // "MZ"

pub const COMMON_HEADER_SIZE: usize = 20;
pub const FILE_DESCRIPTOR_SIZE_V6: u64 = 0x57;

pub const MAX_FILE_GROUP_COUNT: usize = 71;
pub const MAX_COMPONENT_COUNT: usize = 71;
pub const MAX_OFFSET_LIST_NODES: usize = 4096;
pub const MAX_STRING_SIZE: usize = 0x1000;

// Major versions at which the layouts change:
pub const LAST_V5_LAYOUT_VERSION: u32 = 5;
pub const FIRST_UTF16_VERSION: u32 = 17;

// File descriptor flags:
pub const FILE_SPLIT: u16 = 0x1;
pub const FILE_OBFUSCATED: u16 = 0x2;
pub const FILE_COMPRESSED: u16 = 0x4;
pub const FILE_INVALID: u16 = 0x8;

// File descriptor link flags:
pub const LINK_NONE: u8 = 0x0;
pub const LINK_PREV: u8 = 0x1;
pub const LINK_NEXT: u8 = 0x2;
pub const LINK_BOTH: u8 = 0x3;

// A zero "last file offset" in an IS5 volume header reads as this value.
pub const LAST_FILE_OFFSET_UNSET: u64 = 0x7fff_ffff;

pub const BUFFER_SIZE: usize = 0x10000;
pub const END_OF_CHUNK: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

pub const DEFAULT_MAX_LINK_HOPS: usize = 64;
pub const DEFAULT_MAX_VOLUMES: u32 = 1024;

// V3 (.Z) archives:
pub const V3_HEADER_SIZE: u64 = 51;
pub const V3_DATA_START: u64 = 255;
pub const V3_DIRECTORY_RECORD_SIZE: u64 = 6;
pub const V3_FILE_RECORD_SIZE: u64 = 30;
