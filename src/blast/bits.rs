use super::BlastError;

/// Reads bits least-significant first from a byte slice.
pub(crate) struct BitReader<'a> {
    input: &'a [u8],
    position: usize,
    buffer: u32,
    count: u32,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(input: &'a [u8]) -> BitReader<'a> {
        BitReader { input, position: 0, buffer: 0, count: 0 }
    }

    /// Returns the next `need` bits (at most 16) as an integer, the first
    /// bit read in the lowest position.
    pub(crate) fn bits(&mut self, need: u32) -> Result<u32, BlastError> {
        debug_assert!(need <= 16);
        let mut value = self.buffer;
        while self.count < need {
            let byte = match self.input.get(self.position) {
                Some(&byte) => byte,
                None => return Err(BlastError::UnexpectedEof),
            };
            self.position += 1;
            value |= (byte as u32) << self.count;
            self.count += 8;
        }
        self.buffer = value >> need;
        self.count -= need;
        Ok(value & ((1 << need) - 1))
    }

    /// Returns how many input bytes have been loaded.
    pub(crate) fn position(&self) -> usize {
        self.position
    }
}
