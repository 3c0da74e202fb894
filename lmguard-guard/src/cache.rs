use lmguard_core_models::{Category, DecisionSource, GuardDecision, PolicyVerdict};
use parking_lot::Mutex;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::errors::CacheError;

pub const DEFAULT_MAX_ITEMS: usize = 1000;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.88;

/// Embedding of the message plus the categories that made it borderline.
/// Holds no text, so nothing identifying is retained.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheKey {
    pub embedding: Vec<f32>,
    pub context: Vec<Category>,
}

impl CacheKey {
    pub fn new(embedding: Vec<f32>, context: impl IntoIterator<Item = Category>) -> Self {
        let mut context: Vec<Category> = context.into_iter().collect();
        context.sort();
        context.dedup();
        Self { embedding, context }
    }

    pub fn for_verdict(embedding: Vec<f32>, verdict: &PolicyVerdict) -> Self {
        Self::new(
            embedding,
            verdict.triggering_findings.iter().map(|f| f.category),
        )
    }
}

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub decision: GuardDecision,
    /// Logical clock value of the last insert or hit.
    pub last_used: u64,
    pub last_used_at: OffsetDateTime,
    inserted: u64,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub max_items: usize,
    pub similarity_threshold: f32,
    pub dimension: usize,
}

impl CacheConfig {
    pub fn new(dimension: usize) -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            dimension,
        }
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.max_items == 0 {
            return Err(CacheError::InvalidConfig("max_items must be at least 1".into()));
        }
        if self.dimension == 0 {
            return Err(CacheError::InvalidConfig("dimension must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(CacheError::InvalidConfig(format!(
                "similarity_threshold {} outside 0..=1",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Default)]
struct CacheState {
    entries: Vec<CacheEntry>,
    clock: u64,
    next_insert: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Index and similarity of the closest entry with the same context whose
    /// similarity strictly exceeds `threshold`.
    fn best_match(&self, key: &CacheKey, threshold: f32) -> Option<(usize, f32)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.key.context == key.context)
            .map(|(index, entry)| (index, cosine(&key.embedding, &entry.key.embedding)))
            .filter(|(_, similarity)| *similarity > threshold)
            .fold(None, |best: Option<(usize, f32)>, candidate| match best {
                Some(current) if current.1 >= candidate.1 => Some(current),
                _ => Some(candidate),
            })
    }

    fn evict_over(&mut self, max_items: usize) {
        while self.entries.len() > max_items {
            let victim = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, entry)| (entry.last_used, entry.inserted))
                .map(|(index, _)| index);
            match victim {
                Some(index) => {
                    self.entries.swap_remove(index);
                    debug!("semantic cache evicted lru entry");
                }
                None => break,
            }
        }
    }
}

/// Bounded approximate-match store for agentic decisions.
///
/// Every operation holds the mutex for its whole read-modify-write, so the
/// size bound and recency order hold under concurrent callers.
pub struct SemanticCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl SemanticCache {
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(CacheState::default()),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the decision of the most similar entry above the threshold,
    /// tagged as a cache hit, and marks that entry most recently used.
    pub fn lookup(&self, key: &CacheKey) -> Option<GuardDecision> {
        if let Err(err) = self.check(&key.embedding) {
            warn!(error = %err, "semantic cache lookup skipped");
            return None;
        }
        let mut state = self.state.lock();
        self.repair(&mut state);
        let (index, similarity) = state.best_match(key, self.config.similarity_threshold)?;
        let now = state.tick();
        let entry = &mut state.entries[index];
        entry.last_used = now;
        entry.last_used_at = OffsetDateTime::now_utc();
        debug!(similarity, "semantic cache hit");
        Some(entry.decision.clone().with_source(DecisionSource::CacheHit))
    }

    /// Stores a decision. A near-duplicate of an existing key replaces that
    /// entry's decision instead of adding a second one. Evicts the least
    /// recently used entries past `max_items`.
    pub fn insert(&self, key: CacheKey, decision: GuardDecision) -> Result<(), CacheError> {
        self.check(&key.embedding)?;
        let mut state = self.state.lock();
        let now = state.tick();
        let at = OffsetDateTime::now_utc();
        if let Some((index, _)) = state.best_match(&key, self.config.similarity_threshold) {
            let entry = &mut state.entries[index];
            entry.decision = decision;
            entry.last_used = now;
            entry.last_used_at = at;
            return Ok(());
        }
        let inserted = state.next_insert;
        state.next_insert += 1;
        state.entries.push(CacheEntry {
            key,
            decision,
            last_used: now,
            last_used_at: at,
            inserted,
        });
        state.evict_over(self.config.max_items);
        Ok(())
    }

    fn check(&self, embedding: &[f32]) -> Result<(), CacheError> {
        if embedding.len() != self.config.dimension {
            return Err(CacheError::DimensionMismatch {
                expected: self.config.dimension,
                got: embedding.len(),
            });
        }
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(CacheError::NonFinite);
        }
        Ok(())
    }

    fn repair(&self, state: &mut CacheState) {
        let before = state.entries.len();
        state
            .entries
            .retain(|entry| self.check(&entry.key.embedding).is_ok());
        let dropped = before - state.entries.len();
        if dropped > 0 {
            warn!(dropped, "semantic cache dropped malformed entries");
        }
    }
}

/// Cosine similarity; zero vectors are dissimilar to everything.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
