//! Transaction reference generation.

use rand::rngs::OsRng;
use rand::RngCore;

/// Number of random bytes in a reference suffix (two hex chars each).
pub const REFERENCE_ENTROPY_BYTES: usize = 11;

/// Produces unique, human-traceable transaction references such as
/// `Deposit3fa94c0b1e77d2a8c4f901`.
///
/// Holds no state; every call draws fresh bytes from the operating
/// system's CSPRNG, so it can be shared freely between tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceGenerator;

impl ReferenceGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate a reference for a movement of the given kind.
    ///
    /// The kind is capitalised (first letter upper case, the rest lower
    /// case) so `P2PTransfer` becomes the prefix `P2ptransfer`.
    pub fn generate(&self, kind: &str) -> String {
        let mut bytes = [0u8; REFERENCE_ENTROPY_BYTES];
        OsRng.fill_bytes(&mut bytes);

        let mut reference = capitalize(kind);
        reference.push_str(&hex::encode(bytes));
        reference
    }
}

fn capitalize(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
