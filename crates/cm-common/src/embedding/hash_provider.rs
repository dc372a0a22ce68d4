use async_trait::async_trait;
use siphasher::sip::SipHasher13;
use std::hash::{Hash, Hasher};

use super::{EmbeddingFailure, EmbeddingProvider};

/// Fixed seeds for deterministic hashing.
/// Changing either value changes every embedding this backend produces.
const HASH_SEED_K0: u64 = 0x517c_c1b7_2722_0a95;
const HASH_SEED_K1: u64 = 0x6c62_272e_07bb_0142;

/// Feature-hashing embedding backend.
///
/// - No model, no network (usable offline and in tests)
/// - O(n) in the token count
/// - SipHash-1-3 with fixed seeds keeps vectors stable across Rust versions
pub struct HashEmbeddingProvider {
    dimension: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Hash a token to a dimension index.
    fn hash_token(&self, token: &str) -> usize {
        let mut hasher = SipHasher13::new_with_keys(HASH_SEED_K0, HASH_SEED_K1);
        token.hash(&mut hasher);
        (hasher.finish() as usize) % self.dimension
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in Self::tokens(text) {
            let idx = self.hash_token(&token);
            // Sign hashing: even hash of "<token>_sign" adds, odd subtracts.
            let sign = if self.hash_token(&format!("{token}_sign")) % 2 == 0 {
                1.0
            } else {
                -1.0
            };
            vector[idx] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingFailure> {
        Ok(self.embed_text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_normalized_vectors() {
        let provider = HashEmbeddingProvider::new(256);
        let emb = provider.embed_text("rust postgres distributed systems");

        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!(
            (norm - 1.0).abs() < 1e-5,
            "L2 norm should be 1.0, got {norm}"
        );
    }

    #[test]
    fn is_deterministic_for_identical_text() {
        let provider = HashEmbeddingProvider::new(128);
        let a = provider.embed_text("Rust, Kafka, Berlin");
        let b = provider.embed_text("Rust, Kafka, Berlin");
        assert_eq!(a, b);
    }

    #[test]
    fn overlapping_text_lands_closer_than_disjoint_text() {
        let provider = HashEmbeddingProvider::new(256);
        let query = provider.embed_text("rust aws terraform");
        let similar = provider.embed_text("rust aws docker");
        let different = provider.embed_text("cobol mainframe oracle");

        let dot = |a: &[f32], b: &[f32]| -> f32 {
            a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
        };

        assert!(dot(&query, &similar) > dot(&query, &different));
    }

    #[test]
    fn zero_dimension_is_clamped_to_one() {
        let provider = HashEmbeddingProvider::new(0);
        assert_eq!(provider.dimension(), 1);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let provider = HashEmbeddingProvider::new(16);
        let emb = provider.embed_text("");
        assert!(emb.iter().all(|v| *v == 0.0));
    }
}
