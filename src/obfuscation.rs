const XOR_KEY: u8 = 0xd5;
const SEED_MODULUS: u32 = 0x47;

/// The position-dependent byte scrambling InstallShield applies to some file
/// data.  The seed advances by one for every byte processed, so one
/// `Obfuscation` must be used for a whole file, in order.
#[derive(Clone, Debug, Default)]
pub struct Obfuscation {
    seed: u32,
}

impl Obfuscation {
    /// Returns a codec positioned at the start of a file.
    pub fn new() -> Obfuscation {
        Obfuscation { seed: 0 }
    }

    /// Returns a codec positioned `seed` bytes into a file.
    pub fn with_seed(seed: u32) -> Obfuscation {
        Obfuscation { seed }
    }

    /// Returns the number of bytes processed so far.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Restores the original bytes of `buf` in place.
    pub fn deobfuscate(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = (*byte ^ XOR_KEY).rotate_right(2).wrapping_sub(self.key());
            self.seed = self.seed.wrapping_add(1);
        }
    }

    /// Scrambles `buf` in place; the exact inverse of `deobfuscate`.
    pub fn obfuscate(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = byte.wrapping_add(self.key()).rotate_left(2) ^ XOR_KEY;
            self.seed = self.seed.wrapping_add(1);
        }
    }

    fn key(&self) -> u8 {
        (self.seed % SEED_MODULUS) as u8
    }
}
