#![allow(dead_code)]

use std::fs;
use std::path::Path;

use flate2::{Compress, Compression, FlushCompress};

use iscab::{MemoryVolumes, Obfuscation, VolumeKind};

// ========================================================================= //

const VERSION_6: u32 = 0x0100_6000;
const DESCRIPTOR_OFFSET: usize = 0x200;
const DATA_START: usize = 20 + 0x40;
const CHUNK_SIZE: usize = 0x8000;

/// Deflates `data` into independently decodable, sync-flushed chunks.
pub fn deflate_chunks(data: &[u8]) -> Vec<Vec<u8>> {
    data.chunks(CHUNK_SIZE)
        .map(|piece| {
            let mut compressor = Compress::new(Compression::best(), false);
            let mut out = Vec::with_capacity(piece.len() + 1024);
            compressor
                .compress_vec(piece, &mut out, FlushCompress::Sync)
                .unwrap();
            out
        })
        .collect()
}

/// Encodes `data` as an explode stream of uncoded literals.
pub fn blast_literals(data: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0, 4];
    let mut buffer = 0u32;
    let mut count = 0u32;
    let mut put = |value: u32, bits: u32, bytes: &mut Vec<u8>| {
        buffer |= value << count;
        count += bits;
        while count >= 8 {
            bytes.push(buffer as u8);
            buffer >>= 8;
            count -= 8;
        }
    };
    for &byte in data {
        put(0, 1, &mut bytes);
        put(byte as u32, 8, &mut bytes);
    }
    // Length 519 (symbol 15, all ones, stored inverted) ends the stream.
    put(1, 1, &mut bytes);
    put(0, 7, &mut bytes);
    put(0xff, 8, &mut bytes);
    put(0, 7, &mut bytes);
    bytes
}

// ========================================================================= //

/// A file to store in a synthetic cabinet set.
#[derive(Clone)]
pub struct FileSpec {
    name: String,
    directory: u16,
    contents: Vec<u8>,
    compressed: bool,
    obfuscated: bool,
    legacy: bool,
    invalid: bool,
    no_data: bool,
    bad_md5: bool,
    declared_size: Option<u64>,
    declared_compressed_size: Option<u64>,
    link_previous: Option<u32>,
    stored: Option<Vec<u8>>,
}

impl FileSpec {
    pub fn new(name: &str, contents: &[u8]) -> FileSpec {
        FileSpec {
            name: name.to_string(),
            directory: 0,
            contents: contents.to_vec(),
            compressed: true,
            obfuscated: false,
            legacy: false,
            invalid: false,
            no_data: false,
            bad_md5: false,
            declared_size: None,
            declared_compressed_size: None,
            link_previous: None,
            stored: None,
        }
    }

    pub fn directory(mut self, directory: u16) -> FileSpec {
        self.directory = directory;
        self
    }

    pub fn uncompressed(mut self) -> FileSpec {
        self.compressed = false;
        self
    }

    pub fn obfuscated(mut self) -> FileSpec {
        self.obfuscated = true;
        self
    }

    /// Stores the chunks back to back without length prefixes.
    pub fn legacy(mut self) -> FileSpec {
        self.legacy = true;
        self
    }

    pub fn invalid(mut self) -> FileSpec {
        self.invalid = true;
        self
    }

    /// Records a zero data offset for the file.
    pub fn without_data(mut self) -> FileSpec {
        self.no_data = true;
        self
    }

    pub fn bad_md5(mut self) -> FileSpec {
        self.bad_md5 = true;
        self
    }

    pub fn declared_size(mut self, size: u64) -> FileSpec {
        self.declared_size = Some(size);
        self
    }

    pub fn declared_compressed_size(mut self, size: u64) -> FileSpec {
        self.declared_compressed_size = Some(size);
        self
    }

    pub fn linked_to(mut self, index: u32) -> FileSpec {
        self.link_previous = Some(index);
        self
    }

    /// Stores `bytes` verbatim in place of the encoded contents.
    pub fn stored_as(mut self, bytes: &[u8]) -> FileSpec {
        self.stored = Some(bytes.to_vec());
        self
    }

    /// Returns the bytes as stored in the volumes.
    pub fn stored_bytes(&self) -> Vec<u8> {
        if let Some(ref stored) = self.stored {
            return stored.clone();
        }
        let mut stored = Vec::new();
        if self.compressed {
            for chunk in deflate_chunks(&self.contents) {
                if !self.legacy {
                    stored.extend_from_slice(&(chunk.len() as u16).to_le_bytes());
                }
                stored.extend_from_slice(&chunk);
            }
        } else {
            stored.extend_from_slice(&self.contents);
        }
        if self.obfuscated {
            Obfuscation::new().obfuscate(&mut stored);
        }
        stored
    }
}

#[derive(Clone, Copy, Default)]
struct Placement {
    volume: u32,
    offset: u64,
    stored_size: u64,
    split: bool,
}

struct Piece {
    index: u32,
    offset: u64,
    length: u64,
}

#[derive(Default)]
struct DataVolume {
    data: Vec<u8>,
    pieces: Vec<Piece>,
}

// ========================================================================= //

/// Assembles version 6 cabinet sets: a `data1.hdr` holding the descriptor
/// and one or more data-only `.cab` volumes.
pub struct CabinetFixture {
    directories: Vec<String>,
    files: Vec<FileSpec>,
    groups: Vec<(String, u32, u32)>,
    components: Vec<(String, Option<String>, Vec<String>)>,
    volume_capacity: usize,
}

impl CabinetFixture {
    pub fn new() -> CabinetFixture {
        CabinetFixture {
            directories: vec![String::new()],
            files: Vec::new(),
            groups: Vec::new(),
            components: Vec::new(),
            volume_capacity: usize::MAX,
        }
    }

    pub fn directory(mut self, name: &str) -> CabinetFixture {
        self.directories.push(name.to_string());
        self
    }

    pub fn file(mut self, spec: FileSpec) -> CabinetFixture {
        self.files.push(spec);
        self
    }

    pub fn group(mut self, name: &str, first: u32, last: u32) -> CabinetFixture {
        self.groups.push((name.to_string(), first, last));
        self
    }

    pub fn component(
        mut self,
        name: &str,
        display_name: Option<&str>,
        groups: &[&str],
    ) -> CabinetFixture {
        self.components.push((
            name.to_string(),
            display_name.map(str::to_string),
            groups.iter().map(|name| name.to_string()).collect(),
        ));
        self
    }

    /// Limits how many data bytes each `.cab` volume holds, so that larger
    /// files are split across volumes.
    pub fn volume_capacity(mut self, capacity: usize) -> CabinetFixture {
        self.volume_capacity = capacity;
        self
    }

    /// Returns the volumes as (number, kind, contents).
    pub fn volumes(&self) -> Vec<(u32, VolumeKind, Vec<u8>)> {
        let (placements, data_volumes) = self.place_files();
        let mut volumes =
            vec![(1, VolumeKind::Header, self.header_volume(&placements))];
        for (number, volume) in data_volumes.iter().enumerate() {
            volumes.push((
                number as u32 + 1,
                VolumeKind::Cabinet,
                data_volume(volume),
            ));
        }
        volumes
    }

    pub fn build(&self) -> MemoryVolumes {
        let mut volumes = MemoryVolumes::new();
        for (number, kind, data) in self.volumes() {
            volumes.insert(number, kind, data);
        }
        volumes
    }

    pub fn write_to(&self, directory: &Path, prefix: &str) {
        for (number, kind, data) in self.volumes() {
            let name = format!("{}{}.{}", prefix, number, kind.extension());
            fs::write(directory.join(name), data).unwrap();
        }
    }

    fn place_files(&self) -> (Vec<Placement>, Vec<DataVolume>) {
        let mut volumes = vec![DataVolume::default()];
        let mut placements = vec![Placement::default(); self.files.len()];
        for (index, spec) in self.files.iter().enumerate() {
            if spec.link_previous.is_some() {
                continue;
            }
            let stored = spec.stored_bytes();
            let mut rest = stored.as_slice();
            let mut start = None;
            let mut pieces = 0;
            loop {
                let room = self.volume_capacity
                    - volumes.last().map_or(0, |volume| volume.data.len());
                if room == 0 {
                    volumes.push(DataVolume::default());
                    continue;
                }
                let number = volumes.len() as u32;
                let volume = volumes.last_mut().unwrap();
                let take = room.min(rest.len());
                let offset = (DATA_START + volume.data.len()) as u64;
                volume.pieces.push(Piece {
                    index: index as u32,
                    offset,
                    length: take as u64,
                });
                volume.data.extend_from_slice(&rest[..take]);
                start.get_or_insert((number, offset));
                rest = &rest[take..];
                pieces += 1;
                if rest.is_empty() {
                    break;
                }
                volumes.push(DataVolume::default());
            }
            let (volume, offset) = start.unwrap();
            placements[index] = Placement {
                volume,
                offset,
                stored_size: stored.len() as u64,
                split: pieces > 1,
            };
        }
        for (index, spec) in self.files.iter().enumerate() {
            if let Some(target) = spec.link_previous {
                let mut placement = placements[target as usize];
                if placement.volume == 0 {
                    placement = Placement { volume: 1, offset: 1, ..placement };
                }
                placements[index] = placement;
            }
        }
        (placements, volumes)
    }

    fn header_volume(&self, placements: &[Placement]) -> Vec<u8> {
        let mut blob = Blob(vec![0u8; 0x276]);

        let file_table = blob.len();
        let directory_table = blob.reserve(4 * self.directories.len());
        for (index, name) in self.directories.iter().enumerate() {
            let offset = blob.string(name);
            blob.put_u32(directory_table + 4 * index, (offset - file_table) as u32);
        }
        let name_offsets: Vec<usize> = self
            .files
            .iter()
            .map(|spec| blob.string(&spec.name) - file_table)
            .collect();

        let descriptors = blob.len();
        for (index, spec) in self.files.iter().enumerate() {
            let placement = placements[index];
            let mut flags = 0u16;
            if placement.split {
                flags |= 0x1;
            }
            if spec.obfuscated {
                flags |= 0x2;
            }
            if spec.compressed {
                flags |= 0x4;
            }
            if spec.invalid {
                flags |= 0x8;
            }
            let expanded = spec
                .declared_size
                .unwrap_or(spec.contents.len() as u64);
            let compressed = match spec.declared_compressed_size {
                Some(size) => size,
                None if spec.compressed => placement.stored_size,
                None => expanded,
            };
            let mut md5 = md5::compute(&spec.contents).0;
            if spec.bad_md5 {
                md5[0] ^= 0xff;
            }
            let at = blob.reserve(0x57);
            blob.put_u16(at, flags);
            blob.put_u64(at + 0x02, expanded);
            blob.put_u64(at + 0x0a, compressed);
            let data_offset = if spec.no_data { 0 } else { placement.offset };
            blob.put_u64(at + 0x12, data_offset);
            blob.put_bytes(at + 0x1a, &md5);
            blob.put_u32(at + 0x3a, name_offsets[index] as u32);
            blob.put_u16(at + 0x3e, spec.directory);
            if let Some(target) = spec.link_previous {
                blob.put_u32(at + 0x4c, target);
                blob.0[at + 0x54] = 0x1;
            }
            blob.put_u16(at + 0x55, placement.volume as u16);
        }
        let file_table_size = blob.len() - file_table;

        let mut previous_node = None;
        for (index, (name, first, last)) in self.groups.iter().enumerate() {
            let name_offset = blob.string(name);
            let record = blob.reserve(30);
            blob.put_u32(record, name_offset as u32);
            blob.put_u64(record + 4, 1000 * (index as u64 + 1));
            blob.put_u64(record + 12, 500 * (index as u64 + 1));
            blob.put_u32(record + 22, *first);
            blob.put_u32(record + 26, *last);
            let node = blob.reserve(12);
            blob.put_u32(node, name_offset as u32);
            blob.put_u32(node + 4, record as u32);
            match previous_node {
                Some(previous) => blob.put_u32(previous + 8, node as u32),
                None => blob.put_u32(0x3e, node as u32),
            }
            previous_node = Some(node);
        }

        for (index, (name, display_name, groups)) in
            self.components.iter().enumerate()
        {
            let name_offset = blob.string(name);
            let display_offset = match display_name {
                Some(display_name) => blob.string(display_name),
                None => 0,
            };
            let group_names: Vec<usize> =
                groups.iter().map(|group| blob.string(group)).collect();
            let table = blob.reserve(4 * group_names.len());
            for (slot, offset) in group_names.iter().enumerate() {
                blob.put_u32(table + 4 * slot, *offset as u32);
            }
            let record = blob.reserve(149);
            blob.put_u32(record, name_offset as u32);
            blob.put_u32(record + 8, display_offset as u32);
            blob.put_u16(record + 12, 1);
            blob.put_u16(record + 22, index as u16);
            blob.put_u16(record + 0x6f, group_names.len() as u16);
            blob.put_u32(record + 0x71, table as u32);
            let node = blob.reserve(12);
            blob.put_u32(node, name_offset as u32);
            blob.put_u32(node + 4, record as u32);
            // One list per slot.
            blob.put_u32(0x15a + 4 * index, node as u32);
        }

        blob.put_u32(0x0c, file_table as u32);
        blob.put_u32(0x14, file_table_size as u32);
        blob.put_u32(0x18, file_table_size as u32);
        blob.put_u32(0x1c, self.directories.len() as u32);
        blob.put_u32(0x28, self.files.len() as u32);
        blob.put_u32(0x2c, (descriptors - file_table) as u32);
        blob.put_u16(0x30, self.components.len() as u16);

        let mut data = common_header(DESCRIPTOR_OFFSET as u32, blob.len() as u32);
        data.resize(DESCRIPTOR_OFFSET, 0);
        data.extend_from_slice(&blob.0);
        data
    }
}

fn common_header(descriptor_offset: u32, descriptor_size: u32) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"ISc(");
    data.extend_from_slice(&VERSION_6.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&descriptor_offset.to_le_bytes());
    data.extend_from_slice(&descriptor_size.to_le_bytes());
    data
}

fn data_volume(volume: &DataVolume) -> Vec<u8> {
    let mut data = common_header(0, 0);
    let empty = Piece { index: 0, offset: 0, length: 0 };
    let first = volume.pieces.first().unwrap_or(&empty);
    let last = volume.pieces.last().unwrap_or(&empty);
    data.extend_from_slice(&(DATA_START as u64).to_le_bytes());
    data.extend_from_slice(&first.index.to_le_bytes());
    data.extend_from_slice(&last.index.to_le_bytes());
    for piece in [first, last] {
        data.extend_from_slice(&piece.offset.to_le_bytes());
        data.extend_from_slice(&piece.length.to_le_bytes());
        data.extend_from_slice(&piece.length.to_le_bytes());
    }
    assert_eq!(data.len(), DATA_START);
    data.extend_from_slice(&volume.data);
    data
}

/// The descriptor area of a header volume, addressed relative to its start.
struct Blob(Vec<u8>);

impl Blob {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn reserve(&mut self, size: usize) -> usize {
        let at = self.0.len();
        self.0.resize(at + size, 0);
        at
    }

    fn string(&mut self, value: &str) -> usize {
        let at = self.0.len();
        self.0.extend_from_slice(value.as_bytes());
        self.0.push(0);
        at
    }

    fn put_bytes(&mut self, at: usize, bytes: &[u8]) {
        self.0[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn put_u16(&mut self, at: usize, value: u16) {
        self.put_bytes(at, &value.to_le_bytes());
    }

    fn put_u32(&mut self, at: usize, value: u32) {
        self.put_bytes(at, &value.to_le_bytes());
    }

    fn put_u64(&mut self, at: usize, value: u64) {
        self.put_bytes(at, &value.to_le_bytes());
    }
}

// ========================================================================= //

/// Assembles a V3 archive whose members are stored as explode streams of
/// literals.
pub fn v3_archive(members: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut directories: Vec<(&str, Vec<(&str, &[u8])>)> = Vec::new();
    for &(directory, name, contents) in members {
        match directories.iter_mut().find(|entry| entry.0 == directory) {
            Some(entry) => entry.1.push((name, contents)),
            None => directories.push((directory, vec![(name, contents)])),
        }
    }

    let mut data_area = Vec::new();
    let mut toc = Vec::new();
    for (directory, files) in directories.iter() {
        toc.extend_from_slice(&(files.len() as u16).to_le_bytes());
        toc.extend_from_slice(&((6 + directory.len() + 2) as u16).to_le_bytes());
        toc.extend_from_slice(&(directory.len() as u16).to_le_bytes());
        toc.extend_from_slice(directory.as_bytes());
        toc.extend_from_slice(&[0, 0]);
    }
    for (_, files) in directories.iter() {
        for (index, (name, contents)) in files.iter().enumerate() {
            let compressed = blast_literals(contents);
            toc.push(1);
            toc.extend_from_slice(&(index as u16).to_le_bytes());
            toc.extend_from_slice(&(contents.len() as u32).to_le_bytes());
            toc.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
            toc.extend_from_slice(&0xffff_ffffu32.to_le_bytes());
            toc.extend_from_slice(&0x4c26_7a75u32.to_le_bytes());
            toc.extend_from_slice(&[0; 4]);
            toc.extend_from_slice(&((30 + name.len() + 1) as u16).to_le_bytes());
            toc.extend_from_slice(&[0x20, 0, 0, 1]);
            toc.push(name.len() as u8);
            toc.extend_from_slice(name.as_bytes());
            toc.push(0);
            data_area.extend_from_slice(&compressed);
        }
    }

    let toc_address = 255 + data_area.len();
    let mut data = Vec::new();
    data.extend_from_slice(&0x8c655d13u32.to_le_bytes());
    data.extend_from_slice(&[0; 8]);
    data.extend_from_slice(&(members.len() as u16).to_le_bytes());
    data.extend_from_slice(&[0; 16]);
    data.extend_from_slice(&[1, 1, 0]);
    data.extend_from_slice(&[0; 8]);
    data.extend_from_slice(&(toc_address as u32).to_le_bytes());
    data.extend_from_slice(&[0; 4]);
    data.extend_from_slice(&(directories.len() as u16).to_le_bytes());
    assert_eq!(data.len(), 51);
    data.resize(255, 0);
    data.extend_from_slice(&data_area);
    data.extend_from_slice(&toc);
    data
}

// ========================================================================= //
