//! In-process deterministic embedder
//!
//! Hashes word and bigram tokens onto D buckets with alternating sign and
//! L2-normalizes the result. Not a semantic model; it gives stable,
//! dimension-correct vectors where related texts overlap on shared tokens,
//! which is what offline deployments and tests need.

use async_trait::async_trait;

use super::{EmbeddingError, EmbeddingProvider};

/// FNV-1a 64-bit offset basis
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
/// FNV-1a 64-bit prime
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable across platforms and compiler versions, unlike `DefaultHasher`
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Deterministic local embedding provider
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create an embedder producing vectors of `dimension` floats
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect()
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        let tokens = Self::tokens(text);
        if tokens.is_empty() {
            // Zero vector; cosine against it is defined as 0
            return vector;
        }

        {
            let mut bump = |token: &str| {
                let h = fnv1a(token.as_bytes());
                let bucket = (h % self.dimension as u64) as usize;
                let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
                vector[bucket] += sign;
            };

            for token in &tokens {
                bump(token);
            }
            for pair in tokens.windows(2) {
                bump(&format!("{} {}", pair[0], pair[1]));
            }
        }

        let norm = vector.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x = (*x as f64 / norm) as f32;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
