pub mod seq;

pub use seq::SeqGenerator;

use uuid::Uuid;

/// Trait for generating link ids.
///
/// Implementations are pure generators that don't interact with storage; the
/// store rejects an id that was already handed out.
pub trait Generator: Send + Sync + 'static {
    /// Generates an id that should be globally unique.
    fn generate(&self) -> String;
}

/// Random ids: the bytes of a v4 uuid, base58 encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomGenerator;

impl Generator for RandomGenerator {
    fn generate(&self) -> String {
        bs58::encode(Uuid::new_v4().as_bytes()).into_string()
    }
}
