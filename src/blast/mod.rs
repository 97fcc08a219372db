//! Decoder for the PKWare Data Compression Library "implode" format, as
//! used by InstallShield 3 archives.
//!
//! The format codes literals (optionally), match lengths and match distances
//! with three fixed Huffman tables, and copies matches out of a 4 KiB
//! sliding window.

use std::io::{self, Write};
use std::sync::OnceLock;

use thiserror::Error;

mod bits;
mod huffman;

use self::bits::BitReader;
use self::huffman::Huffman;

/// Size of the sliding window.
const MAX_WINDOW: usize = 4096;

/// The match length that ends a stream.
const END_OF_STREAM: usize = 519;

// Run-length encoded code lengths of the three tables.
const LITERAL_LENGTHS: [u8; 98] = [
    11, 124, 8, 7, 28, 7, 188, 13, 76, 4, 10, 8, 12, 10, 12, 10, 8, 23, 8, 9,
    7, 6, 7, 8, 7, 6, 55, 8, 23, 24, 12, 11, 7, 9, 11, 12, 6, 7, 22, 5, 7, 24,
    6, 11, 9, 6, 7, 22, 7, 11, 38, 7, 9, 8, 25, 11, 8, 11, 9, 12, 8, 12, 5,
    38, 5, 38, 5, 11, 7, 5, 6, 21, 6, 10, 53, 8, 7, 24, 10, 27, 44, 253, 253,
    253, 252, 252, 252, 13, 12, 45, 12, 45, 12, 61, 12, 45, 44, 173,
];
const LENGTH_LENGTHS: [u8; 6] = [2, 35, 36, 53, 38, 23];
const DISTANCE_LENGTHS: [u8; 7] = [2, 20, 53, 230, 247, 151, 248];

// Base values and extra bits of the sixteen length symbols.
const LENGTH_BASE: [u16; 16] =
    [3, 2, 4, 5, 6, 7, 8, 9, 10, 12, 16, 24, 40, 72, 136, 264];
const LENGTH_EXTRA: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8];

/// Errors from decoding an exploded stream.
#[derive(Debug, Error)]
pub enum BlastError {
    /// The literal flag in the first byte is neither 0 nor 1.
    #[error("invalid literal flag in header")]
    InvalidHeader,
    /// The dictionary size in the second byte is not 4, 5 or 6.
    #[error("invalid dictionary size in header")]
    InvalidDictionarySize,
    /// A match refers to data before the start of the output.
    #[error("match distance is too far back")]
    DistanceTooFar,
    /// The input ended before the end-of-stream code.
    #[error("unexpected end of compressed data")]
    UnexpectedEof,
    /// Writing decoded bytes failed.
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
    /// No symbol matches the bits read.
    #[error("invalid Huffman code")]
    InvalidCode,
    /// One of the built-in Huffman tables is over-subscribed.
    #[error("invalid built-in Huffman table ({0})")]
    InvalidTable(i32),
}

impl BlastError {
    /// Returns the status code the reference decoder reports for this
    /// error.
    pub fn code(&self) -> i32 {
        match self {
            BlastError::InvalidHeader => -1,
            BlastError::InvalidDictionarySize => -2,
            BlastError::DistanceTooFar => -3,
            BlastError::UnexpectedEof => 2,
            BlastError::Output(_) => 1,
            BlastError::InvalidCode => -9,
            BlastError::InvalidTable(left) => *left,
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
struct Tables {
    literal: Huffman,
    length: Huffman,
    distance: Huffman,
}

static TABLES: OnceLock<Result<Tables, i32>> = OnceLock::new();

fn build_table(compact: &[u8]) -> Result<Huffman, i32> {
    let (huffman, left) = Huffman::construct(compact);
    if left < 0 {
        return Err(left);
    }
    Ok(huffman)
}

fn build_tables() -> Result<Tables, i32> {
    Ok(Tables {
        literal: build_table(&LITERAL_LENGTHS)?,
        length: build_table(&LENGTH_LENGTHS)?,
        distance: build_table(&DISTANCE_LENGTHS)?,
    })
}

fn tables() -> Result<&'static Tables, BlastError> {
    match TABLES.get_or_init(build_tables) {
        Ok(tables) => Ok(tables),
        Err(left) => Err(BlastError::InvalidTable(*left)),
    }
}

/// Decodes `input` into `writer`, returning the number of bytes written.
///
/// Bytes decoded before an error are still written out, unless the error
/// came from the writer itself.
pub fn explode<W: Write>(input: &[u8], writer: &mut W) -> Result<u64, BlastError> {
    let tables = tables()?;
    let mut reader = BitReader::new(input);
    let mut window = Window::new(writer);
    match decompress(tables, &mut reader, &mut window) {
        Ok(()) => {
            window.flush()?;
            log::trace!(
                "Exploded {} of {} input bytes into {} bytes",
                reader.position(),
                input.len(),
                window.written
            );
            Ok(window.written)
        }
        Err(BlastError::Output(error)) => Err(BlastError::Output(error)),
        Err(error) => {
            if let Err(flush_error) = window.flush() {
                log::trace!("Flush after {} failed: {}", error, flush_error);
            }
            Err(error)
        }
    }
}

/// Decodes `input` into a new buffer.
pub fn decode(input: &[u8]) -> Result<Vec<u8>, BlastError> {
    let mut output = Vec::new();
    explode(input, &mut output)?;
    Ok(output)
}

fn decompress<W: Write>(
    tables: &Tables,
    reader: &mut BitReader<'_>,
    window: &mut Window<'_, W>,
) -> Result<(), BlastError> {
    let coded_literals = reader.bits(8)?;
    if coded_literals > 1 {
        return Err(BlastError::InvalidHeader);
    }
    let dictionary = reader.bits(8)?;
    if !(4..=6).contains(&dictionary) {
        return Err(BlastError::InvalidDictionarySize);
    }
    loop {
        if reader.bits(1)? == 1 {
            let symbol = tables.length.decode(reader)?;
            let length = LENGTH_BASE[symbol] as usize
                + reader.bits(LENGTH_EXTRA[symbol] as u32)? as usize;
            if length == END_OF_STREAM {
                return Ok(());
            }
            let shift = if length == 2 { 2 } else { dictionary };
            let distance = (tables.distance.decode(reader)? << shift)
                + reader.bits(shift)? as usize
                + 1;
            if window.first && distance > window.next {
                return Err(BlastError::DistanceTooFar);
            }
            window.copy(distance, length)?;
        } else {
            let literal = if coded_literals == 1 {
                tables.literal.decode(reader)? as u8
            } else {
                reader.bits(8)? as u8
            };
            window.push(literal)?;
        }
    }
}

struct Window<'w, W: Write> {
    data: Box<[u8; MAX_WINDOW]>,
    next: usize,
    /// True until the window has been filled once.
    first: bool,
    writer: &'w mut W,
    written: u64,
}

impl<'w, W: Write> Window<'w, W> {
    fn new(writer: &'w mut W) -> Window<'w, W> {
        Window {
            data: Box::new([0; MAX_WINDOW]),
            next: 0,
            first: true,
            writer,
            written: 0,
        }
    }

    fn push(&mut self, byte: u8) -> Result<(), BlastError> {
        self.data[self.next] = byte;
        self.next += 1;
        if self.next == MAX_WINDOW {
            self.flush()?;
            self.first = false;
        }
        Ok(())
    }

    /// Appends `length` bytes starting `distance` bytes back.  The ranges
    /// may overlap, in which case the copy repeats the earlier bytes.
    fn copy(&mut self, distance: usize, mut length: usize) -> Result<(), BlastError> {
        while length > 0 {
            let (mut from, limit) = if self.next < distance {
                (self.next + MAX_WINDOW - distance, distance)
            } else {
                (self.next - distance, MAX_WINDOW)
            };
            let count = (limit - self.next).min(length);
            length -= count;
            for _ in 0..count {
                self.data[self.next] = self.data[from];
                self.next += 1;
                from += 1;
            }
            if self.next == MAX_WINDOW {
                self.flush()?;
                self.first = false;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BlastError> {
        if self.next > 0 {
            self.writer
                .write_all(&self.data[..self.next])
                .map_err(BlastError::Output)?;
            self.written += self.next as u64;
            self.next = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use super::{
        build_tables, decode, explode, huffman::Huffman, BlastError,
        DISTANCE_LENGTHS, LENGTH_BASE, LENGTH_EXTRA, LENGTH_LENGTHS,
        LITERAL_LENGTHS,
    };

    struct BitWriter {
        bytes: Vec<u8>,
        buffer: u32,
        count: u32,
    }

    impl BitWriter {
        fn new() -> BitWriter {
            BitWriter { bytes: Vec::new(), buffer: 0, count: 0 }
        }

        fn put(&mut self, value: u32, count: u32) {
            self.buffer |= value << self.count;
            self.count += count;
            while self.count >= 8 {
                self.bytes.push(self.buffer as u8);
                self.buffer >>= 8;
                self.count -= 8;
            }
        }

        fn finish(mut self) -> Vec<u8> {
            if self.count > 0 {
                self.bytes.push(self.buffer as u8);
            }
            self.bytes
        }
    }

    /// Canonical (code, length) pairs for each symbol of a table.
    fn canonical_codes(compact: &[u8]) -> Vec<(u32, u32)> {
        let mut lengths = Vec::new();
        for &byte in compact {
            for _ in 0..(byte >> 4) + 1 {
                lengths.push((byte & 0x0f) as u32);
            }
        }
        let mut count = [0u32; 14];
        for &length in &lengths {
            count[length as usize] += 1;
        }
        count[0] = 0;
        let mut next = [0u32; 14];
        let mut code = 0;
        for length in 1..14 {
            code = (code + count[length - 1]) << 1;
            next[length] = code;
        }
        lengths
            .iter()
            .map(|&length| {
                let code = next[length as usize];
                next[length as usize] += 1;
                (code, length)
            })
            .collect()
    }

    /// Writes streams the decoder accepts: codes go out most significant
    /// bit first, each bit inverted.
    struct Encoder {
        bits: BitWriter,
        coded_literals: bool,
        dictionary: u32,
        literal: Vec<(u32, u32)>,
        length: Vec<(u32, u32)>,
        distance: Vec<(u32, u32)>,
    }

    impl Encoder {
        fn new(coded_literals: bool, dictionary: u32) -> Encoder {
            let mut bits = BitWriter::new();
            bits.put(coded_literals as u32, 8);
            bits.put(dictionary, 8);
            Encoder {
                bits,
                coded_literals,
                dictionary,
                literal: canonical_codes(&LITERAL_LENGTHS),
                length: canonical_codes(&LENGTH_LENGTHS),
                distance: canonical_codes(&DISTANCE_LENGTHS),
            }
        }

        fn code(&mut self, (code, length): (u32, u32)) {
            for bit in (0..length).rev() {
                self.bits.put(((code >> bit) & 1) ^ 1, 1);
            }
        }

        fn literal(&mut self, byte: u8) {
            self.bits.put(0, 1);
            if self.coded_literals {
                let code = self.literal[byte as usize];
                self.code(code);
            } else {
                self.bits.put(byte as u32, 8);
            }
        }

        fn length(&mut self, length: usize) {
            self.bits.put(1, 1);
            let symbol = (0..16)
                .find(|&s| {
                    let base = LENGTH_BASE[s] as usize;
                    length >= base && length - base < 1 << LENGTH_EXTRA[s]
                })
                .unwrap();
            let code = self.length[symbol];
            self.code(code);
            self.bits.put(
                (length - LENGTH_BASE[symbol] as usize) as u32,
                LENGTH_EXTRA[symbol] as u32,
            );
        }

        fn copy(&mut self, length: usize, distance: usize) {
            self.length(length);
            let shift = if length == 2 { 2 } else { self.dictionary };
            let value = (distance - 1) as u32;
            let code = self.distance[(value >> shift) as usize];
            self.code(code);
            self.bits.put(value & ((1 << shift) - 1), shift);
        }

        fn finish(mut self) -> Vec<u8> {
            self.length(519);
            self.bits.finish()
        }
    }

    #[test]
    fn reference_vector() {
        let input = [0x00, 0x04, 0x82, 0x24, 0x25, 0x8f, 0x80, 0x7f];
        assert_eq!(decode(&input).unwrap(), b"AIAIAIAIAIAIA");
    }

    #[test]
    fn tables_are_complete_and_deterministic() {
        for compact in
            [&LITERAL_LENGTHS[..], &LENGTH_LENGTHS[..], &DISTANCE_LENGTHS[..]]
        {
            let (first, left) = Huffman::construct(compact);
            assert!(left >= 0);
            let (second, _) = Huffman::construct(compact);
            assert_eq!(first, second);
        }
        assert_eq!(build_tables().unwrap(), build_tables().unwrap());
    }

    #[test]
    fn uncoded_literals() {
        let mut encoder = Encoder::new(false, 4);
        for &byte in b"hello, world" {
            encoder.literal(byte);
        }
        assert_eq!(decode(&encoder.finish()).unwrap(), b"hello, world");
    }

    #[test]
    fn coded_literals() {
        let text = lipsum::lipsum(60);
        let mut encoder = Encoder::new(true, 5);
        for &byte in text.as_bytes() {
            encoder.literal(byte);
        }
        assert_eq!(decode(&encoder.finish()).unwrap(), text.as_bytes());
    }

    #[test]
    fn overlapping_copy() {
        let mut encoder = Encoder::new(false, 4);
        encoder.literal(b'a');
        encoder.literal(b'b');
        encoder.copy(9, 2);
        encoder.copy(2, 1);
        assert_eq!(decode(&encoder.finish()).unwrap(), b"abababababaaa");
    }

    #[test]
    fn copies_across_window_wrap() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i * 7 % 251) as u8).collect();
        let mut encoder = Encoder::new(false, 6);
        for &byte in &data {
            encoder.literal(byte);
        }
        encoder.copy(100, 4096);
        encoder.copy(518, 3000);
        let output = decode(&encoder.finish()).unwrap();
        assert_eq!(output.len(), 5000 + 100 + 518);
        assert_eq!(&output[..5000], &data[..]);
        assert_eq!(&output[5000..5100], &data[904..1004]);
        for (offset, &byte) in output[5100..].iter().enumerate() {
            assert_eq!(byte, output[2100 + offset]);
        }
    }

    #[test]
    fn distance_before_start() {
        let mut encoder = Encoder::new(false, 4);
        encoder.literal(b'x');
        encoder.copy(3, 2);
        let mut output = Vec::new();
        let error = explode(&encoder.finish(), &mut output).unwrap_err();
        assert!(matches!(error, BlastError::DistanceTooFar));
        assert_eq!(error.code(), -3);
        // Bytes decoded before the error are still written.
        assert_eq!(output, b"x");
    }

    #[test]
    fn bad_headers() {
        assert_eq!(decode(&[2, 4]).unwrap_err().code(), -1);
        assert_eq!(decode(&[0, 7]).unwrap_err().code(), -2);
        assert_eq!(decode(&[0, 3]).unwrap_err().code(), -2);
        assert_eq!(decode(&[0]).unwrap_err().code(), 2);
    }

    #[test]
    fn truncated_stream() {
        let mut encoder = Encoder::new(false, 4);
        encoder.literal(b'q');
        let mut input = encoder.finish();
        input.truncate(3);
        assert!(matches!(decode(&input), Err(BlastError::UnexpectedEof)));
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writer_errors_are_reported() {
        let input = [0x00, 0x04, 0x82, 0x24, 0x25, 0x8f, 0x80, 0x7f];
        let error = explode(&input, &mut FailingWriter).unwrap_err();
        assert!(matches!(error, BlastError::Output(_)));
        assert_eq!(error.code(), 1);
    }
}
