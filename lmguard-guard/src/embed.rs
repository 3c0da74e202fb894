use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::errors::EmbeddingError;

/// Converts text into a fixed-length vector. Implementations must always
/// return vectors of length [`dimension`](EmbeddingProvider::dimension).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn dimension(&self) -> usize;
}

const WORD_SEED: u64 = 0x5eed_0001;
const TRIGRAM_SEED: u64 = 0x5eed_0003;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Local feature-hashing embedder: word unigrams plus character trigrams of
/// the lowercased, punctuation-stripped text, hashed into `dimension` signed
/// buckets and L2-normalized. Rephrasings that differ only in case,
/// punctuation or spacing map to the same vector.
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        if words.is_empty() {
            return Err(EmbeddingError::Empty);
        }

        let mut vector = vec![0.0f32; self.dimension];
        for word in &words {
            self.accumulate(&mut vector, word.as_bytes(), WORD_SEED, 1.0);
        }
        let normalized: Vec<char> = format!(" {} ", words.join(" ")).chars().collect();
        for window in normalized.windows(3) {
            let trigram: String = window.iter().collect();
            self.accumulate(&mut vector, trigram.as_bytes(), TRIGRAM_SEED, TRIGRAM_WEIGHT);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(EmbeddingError::Empty);
        }
        vector.iter_mut().for_each(|x| *x /= norm);
        Ok(vector)
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], seed: u64, weight: f32) {
        let hash = xxh3_64_with_seed(feature, seed);
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_sync(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

pub const OPENAI_EMBEDDING_DIM: usize = 1536;

/// OpenAI-compatible `/v1/embeddings` client.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    client: Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| EmbeddingError::Transport(format!("client init failed: {err}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimension: OPENAI_EMBEDDING_DIM,
            client,
        })
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|err| EmbeddingError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(EmbeddingError::Transport(format!(
                "http {}",
                response.status().as_u16()
            )));
        }
        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| EmbeddingError::Malformed(err.to_string()))?;
        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|datum| datum.embedding)
            .ok_or_else(|| EmbeddingError::Malformed("empty data array".into()))?;
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::Malformed(format!(
                "expected {} dimensions, got {}",
                self.dimension,
                embedding.len()
            )));
        }
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
