use crate::Generator;
use crc32fast::Hasher;
use snip_core::ShortCode;

/// Derives codes from the CRC-32 (IEEE) checksum of the content.
///
/// The code space is 32 bits, so distinct URLs can share a code.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32Generator;

impl Crc32Generator {
    pub fn new() -> Self {
        Self
    }

    /// Computes the raw checksum of `content`.
    pub fn checksum(content: &[u8]) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(content);
        hasher.finalize()
    }
}

impl Generator for Crc32Generator {
    fn generate(&self, content: &[u8]) -> ShortCode {
        ShortCode::from_checksum(Self::checksum(content))
    }
}
