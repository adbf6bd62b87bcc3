//! Embedding providers.
//!
//! - [`HashingEmbedder`]: deterministic, offline feature hashing. Good enough
//!   to rank CAD operation names and tags against each other, and stable
//!   across processes so persisted embeddings stay comparable.
//! - [`HttpEmbedder`]: any OpenAI-compatible `/embeddings` endpoint.

use async_trait::async_trait;
use cadlens_core::error::MemoryError;
use cadlens_core::store::Embedder;
use serde::Deserialize;
use tracing::{debug, warn};

/// Default vector length for [`HashingEmbedder`].
pub const DEFAULT_DIMENSIONS: usize = 256;

/// Bag-of-tokens embedder using FNV-1a feature hashing.
///
/// Tokens are lowercase runs of alphanumerics and `_`. Snake-case tokens
/// also contribute their parts at half weight, so `open_model` lands near
/// `open model`. Vectors are L2-normalised.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Synchronous embedding; the trait method delegates here.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lower = text.to_lowercase();

        for token in lower
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|t| !t.is_empty())
        {
            self.add_feature(&mut vector, token, 1.0);
            if token.contains('_') {
                for part in token.split('_').filter(|p| !p.is_empty()) {
                    self.add_feature(&mut vector, part, 0.5);
                }
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], token: &str, weight: f32) {
        let hash = fnv1a(token.as_bytes());
        let index = (hash % self.dimensions as u64) as usize;
        // High bit picks the sign so unrelated collisions tend to cancel out.
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ *b as u64).wrapping_mul(PRIME))
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        Ok(self.embed_text(text))
    }
}

/// Embedder backed by an OpenAI-compatible HTTP API.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl HttpEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
        }
    }

    fn parse_response(&self, body: &str) -> Result<Vec<f32>, MemoryError> {
        let parsed: EmbeddingApiResponse = serde_json::from_str(body).map_err(|e| {
            MemoryError::EmbeddingFailed(format!("Failed to parse embedding response: {e}"))
        })?;
        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| MemoryError::EmbeddingFailed("Response contained no embeddings".into()))?;

        if embedding.len() != self.dimensions {
            return Err(MemoryError::EmbeddingFailed(format!(
                "Expected {} dimensions from {}, got {}",
                self.dimensions,
                self.model,
                embedding.len()
            )));
        }
        Ok(embedding)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
            "dimensions": self.dimensions,
            "encoding_format": "float",
        });

        debug!(model = %self.model, chars = text.len(), "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(format!("Network error: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Embedding request rejected");
            return Err(MemoryError::EmbeddingFailed(format!(
                "Embedding API returned {status}: {text}"
            )));
        }

        self.parse_response(&text)
    }
}

// --- Embedding API types ---

#[derive(Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
