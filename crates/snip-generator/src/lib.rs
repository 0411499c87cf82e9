pub mod checksum;

pub use checksum::Crc32Generator;

use snip_core::ShortCode;

/// Trait for deriving short codes from URL content.
///
/// Implementations are pure functions of the input bytes and don't interact
/// with storage. The same bytes must always yield the same code, across
/// process restarts and storage backends.
///
/// Generators are not required to be collision free. A collision surfaces
/// as a conflict when the code is stored.
pub trait Generator: Send + Sync + 'static {
    /// Derives the short code for `content`.
    fn generate(&self, content: &[u8]) -> ShortCode;
}
