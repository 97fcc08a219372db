use super::bits::BitReader;
use super::BlastError;

/// Longest code length in any table.
pub(crate) const MAX_BITS: usize = 13;

/// A canonical Huffman decoding table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Huffman {
    /// Number of codes of each length.
    count: [u16; MAX_BITS + 1],
    /// Symbols ordered by code length, then by value.
    symbol: Vec<u16>,
}

impl Huffman {
    /// Builds a table from run-length encoded code lengths: each byte holds
    /// a length in its low nibble and a repeat count minus one in its high
    /// nibble.
    ///
    /// Returns the table with the number of unused codes, which is zero for
    /// a complete code and negative if the lengths over-subscribe it.
    pub(crate) fn construct(compact: &[u8]) -> (Huffman, i32) {
        let mut lengths = Vec::new();
        for &byte in compact {
            let repeat = (byte >> 4) as usize + 1;
            let length = byte & 0x0f;
            lengths.extend(std::iter::repeat(length).take(repeat));
        }

        let mut count = [0u16; MAX_BITS + 1];
        for &length in lengths.iter() {
            count[length as usize] += 1;
        }
        let mut huffman = Huffman { count, symbol: vec![0; lengths.len()] };
        if count[0] as usize == lengths.len() {
            return (huffman, 0);
        }

        let mut left: i32 = 1;
        for &codes in count.iter().skip(1) {
            left <<= 1;
            left -= codes as i32;
            if left < 0 {
                return (huffman, left);
            }
        }

        let mut offsets = [0usize; MAX_BITS + 1];
        for length in 1..MAX_BITS {
            offsets[length + 1] = offsets[length] + count[length] as usize;
        }
        for (symbol, &length) in lengths.iter().enumerate() {
            if length != 0 {
                let slot = &mut offsets[length as usize];
                huffman.symbol[*slot] = symbol as u16;
                *slot += 1;
            }
        }
        (huffman, left)
    }

    /// Decodes one symbol.  Codes are stored with their bits inverted.
    pub(crate) fn decode(
        &self,
        reader: &mut BitReader<'_>,
    ) -> Result<usize, BlastError> {
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for &count in self.count.iter().skip(1) {
            code |= (reader.bits(1)? ^ 1) as i32;
            let count = count as i32;
            if code - first < count {
                return Ok(self.symbol[(index + code - first) as usize] as usize);
            }
            index += count;
            first += count;
            first <<= 1;
            code <<= 1;
        }
        Err(BlastError::InvalidCode)
    }
}
