use crate::CodeGenerator;
use portal_core::{GeneratorError, ShortCode};
use rand::rngs::OsRng;
use rand::TryRngCore;

/// The 62 characters a generated code is drawn from.
pub const ALPHABET: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// Largest multiple of 62 that fits in a byte. Bytes at or above it are
// rejected so every character stays equally likely.
const REJECTION_BOUND: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

/// Draws every character independently and uniformly from [`ALPHABET`]
/// using the operating system's CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl RandomCodeGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, length: usize) -> Result<ShortCode, GeneratorError> {
        if length == 0 {
            return Err(GeneratorError::InvalidLength(length));
        }

        let mut code = String::with_capacity(length);
        // Roughly 3% of bytes get rejected, so a small surplus usually
        // finishes in one read.
        let mut bytes = vec![0u8; length + length / 8 + 8];

        while code.len() < length {
            OsRng
                .try_fill_bytes(&mut bytes)
                .map_err(|e| GeneratorError::Entropy(e.to_string()))?;

            for &byte in bytes.iter().filter(|&&b| b < REJECTION_BOUND) {
                code.push(ALPHABET[usize::from(byte) % ALPHABET.len()] as char);
                if code.len() == length {
                    break;
                }
            }
        }

        Ok(ShortCode::new_unchecked(code))
    }
}
