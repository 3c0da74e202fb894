use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use lmguard_core_models::{mask_spans, GuardDecision, Message, PolicyVerdict};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::arbiter::{parse_decision, Arbiter, ArbiterRequest};
use crate::cache::{CacheKey, SemanticCache};
use crate::embed::EmbeddingProvider;
use crate::errors::EmbeddingError;

pub const DEFAULT_ARBITER_TIMEOUT: Duration = Duration::from_millis(1000);

/// Resolves borderline verdicts: cache first, then the arbiter under a
/// deadline, then the block fallback.
#[derive(Clone)]
pub struct AgenticGuard {
    embedder: Arc<dyn EmbeddingProvider>,
    cache: Arc<SemanticCache>,
    arbiter: Arc<dyn Arbiter>,
    timeout: Duration,
}

impl AgenticGuard {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        cache: Arc<SemanticCache>,
        arbiter: Arc<dyn Arbiter>,
    ) -> Self {
        Self {
            embedder,
            cache,
            arbiter,
            timeout: DEFAULT_ARBITER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<SemanticCache> {
        &self.cache
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Never fails: timeouts, arbiter errors and unparseable replies all
    /// yield [`GuardDecision::fallback`]. Embedding and arbitration share a
    /// single deadline of `timeout` from entry.
    ///
    /// The cache key is embedded from the message with every redaction span
    /// masked; when that is impossible the cache is bypassed.
    ///
    /// The arbiter call runs on its own task. If the caller is dropped while
    /// waiting, that task still finishes (bounded by the timeout) and caches
    /// its result.
    pub async fn decide(
        &self,
        message: &Message,
        context: &[Message],
        verdict: &PolicyVerdict,
    ) -> GuardDecision {
        let deadline = Instant::now() + self.timeout;
        let key = match cache_text(message, verdict) {
            Some(text) => match self.embed(&text, deadline).await {
                Ok(embedding) => Some(CacheKey::for_verdict(embedding, verdict)),
                Err(err) => {
                    warn!(error = %err, "embedding failed, bypassing semantic cache");
                    None
                }
            },
            None => {
                warn!("redaction target cannot be masked, bypassing semantic cache");
                None
            }
        };

        if let Some(hit) = key.as_ref().and_then(|key| self.cache.lookup(key)) {
            return hit;
        }

        let request = ArbiterRequest::new(message, context, verdict);
        let arbiter = self.arbiter.clone();
        let cache = self.cache.clone();
        let timeout = self.timeout;
        let task = tokio::spawn(async move {
            let decision = match tokio::time::timeout_at(deadline, arbiter.arbitrate(&request)).await {
                Ok(Ok(raw)) => match parse_decision(&raw) {
                    Ok(decision) => decision,
                    Err(err) => {
                        warn!(error = %err, "arbiter reply rejected, falling back to block");
                        return GuardDecision::fallback();
                    }
                },
                Ok(Err(err)) => {
                    warn!(error = %err, "arbiter call failed, falling back to block");
                    return GuardDecision::fallback();
                }
                Err(_) => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "arbiter timed out, falling back to block");
                    return GuardDecision::fallback();
                }
            };
            if let Some(key) = key {
                if let Err(err) = cache.insert(key, decision.clone()) {
                    warn!(error = %err, "semantic cache insert rejected");
                }
            }
            debug!(action = %decision.action, "arbiter decided");
            decision
        });

        match task.await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(error = %err, "arbiter task aborted, falling back to block");
                GuardDecision::fallback()
            }
        }
    }

    async fn embed(&self, text: &str, deadline: Instant) -> Result<Vec<f32>, EmbeddingError> {
        tokio::time::timeout_at(deadline, self.embedder.embed(text))
            .await
            .map_err(|_| EmbeddingError::Timeout)?
    }
}

/// The text the cache key is derived from. Raw PII never reaches the
/// embedder or the cache.
fn cache_text<'a>(message: &'a Message, verdict: &PolicyVerdict) -> Option<Cow<'a, str>> {
    if verdict.redactions.is_empty() {
        return Some(Cow::Borrowed(&message.content));
    }
    mask_spans(&message.content, &verdict.redactions).map(Cow::Owned)
}
