//! Embedder trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! a deterministic [`HashEmbedder`], and pure helpers for vector
//! serialization and distance computation.
//!
//! Network and model-backed embedders (OpenAI, Ollama, fastembed) live in
//! the `folio` application crate.

use anyhow::Result;
use async_trait::async_trait;

/// A text embedding backend.
///
/// Implementations are constructed once at process start and shared by
/// reference between ingestion and search.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts. Output order matches input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercase alphanumeric token is hashed (FNV-1a) into one of `dims`
/// buckets with a hash-derived sign; the result is L2-normalised. Texts that
/// share vocabulary land close together, which is enough for offline use
/// and tests. No model download, no network.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    /// Embed synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let lower = text.to_lowercase();
        for token in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dims as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        h ^= *b as u64;
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Encode a float vector as little-endian f32 bytes.
///
/// ```rust
/// use folio_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes. Trailing bytes that do not form a full
/// value are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Squared Euclidean distance. Callers guarantee equal lengths.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Map a non-negative distance to a similarity in `(0, 1]`.
pub fn distance_to_similarity(distance: f32) -> f64 {
    1.0 / (1.0 + distance as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_squared_l2() {
        assert_eq!(squared_l2(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(squared_l2(&[1.5, -2.0], &[1.5, -2.0]), 0.0);
    }

    #[test]
    fn test_similarity_is_bounded_and_decreasing() {
        assert_eq!(distance_to_similarity(0.0), 1.0);
        let a = distance_to_similarity(0.5);
        let b = distance_to_similarity(2.0);
        assert!(a > b && b > 0.0);
    }

    #[test]
    fn test_hash_embedder_deterministic_and_normalized() {
        let e = HashEmbedder::new(64);
        let a = e.embed_text("Annual revenue grew");
        let b = e.embed_text("annual REVENUE grew");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embedder_shared_vocabulary_is_closer() {
        let e = HashEmbedder::new(1024);
        let q = e.embed_text("revenue growth");
        let a = e.embed_text("annual revenue grew 16 percent");
        let b = e.embed_text("vacation policy offers 20 days");
        assert!(squared_l2(&q, &a) < squared_l2(&q, &b));
    }

    #[test]
    fn test_hash_embedder_empty_text_is_zero_vector() {
        let e = HashEmbedder::new(8);
        assert!(e.embed_text("  ...  ").iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_embed_matches_batch() {
        let e = HashEmbedder::new(32);
        let single = e.embed("quarterly report").await.unwrap();
        let batch = e
            .embed_batch(&["quarterly report".to_string()])
            .await
            .unwrap();
        assert_eq!(single, batch[0]);
        assert_eq!(e.dims(), 32);
    }
}
