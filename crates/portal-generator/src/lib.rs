pub mod random;

pub use random::{RandomCodeGenerator, ALPHABET};

use portal_core::{GeneratorError, ShortCode};

/// Trait for generating candidate short codes.
///
/// Implementations are pure generators that don't interact with storage;
/// uniqueness is established by the caller against the store.
pub trait CodeGenerator: Send + Sync + 'static {
    /// Generates a candidate code of exactly `length` characters.
    fn generate(&self, length: usize) -> Result<ShortCode, GeneratorError>;
}
