use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lmguard_core_models::{
    Category, Confidence, DecisionSource, Finding, GuardDecision, Message, Outcome, PolicyVerdict,
    Severity,
};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::ArbiterError;

const EXPLANATION_LIMIT: usize = 120;

const SYSTEM_PROMPT: &str = "You review messages a student sent to an AI tutor. \
Decide whether the message may reach the tutor. Reply with a single JSON object: \
{\"action\": \"allow\"|\"redact\"|\"block\"|\"rewrite_review\", \"confidence\": number between 0 and 1, \
\"explanation\": short string, \"rewrite\": string or null}.";

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FindingBrief {
    pub category: Category,
    pub severity: Severity,
    pub detail: String,
}

/// Everything the arbiter sees about one borderline message.
#[derive(Clone, Debug, Serialize)]
pub struct ArbiterRequest {
    pub message: String,
    pub context: Vec<Message>,
    pub findings: Vec<FindingBrief>,
    pub policy_reason: String,
}

impl ArbiterRequest {
    pub fn new(message: &Message, context: &[Message], verdict: &PolicyVerdict) -> Self {
        Self {
            message: message.content.clone(),
            context: context.to_vec(),
            findings: verdict
                .triggering_findings
                .iter()
                .map(|f: &Finding| FindingBrief {
                    category: f.category,
                    severity: f.severity,
                    detail: f.detail.clone(),
                })
                .collect(),
            policy_reason: verdict.reason.clone(),
        }
    }
}

/// Returns the arbiter's raw reply; [`parse_decision`] interprets it.
#[async_trait]
pub trait Arbiter: Send + Sync {
    async fn arbitrate(&self, request: &ArbiterRequest) -> Result<String, ArbiterError>;
}

// `rewrite` is accepted and ignored; rewritten content is never forwarded.
#[derive(Deserialize)]
struct ArbiterReply {
    action: String,
    confidence: f64,
    explanation: String,
}

/// Parses `{"action", "confidence", "explanation", "rewrite"?}`, optionally
/// wrapped in a Markdown code fence. Unknown actions and confidences outside
/// `[0, 1]` are rejected rather than clamped.
pub fn parse_decision(raw: &str) -> Result<GuardDecision, ArbiterError> {
    let body = strip_code_fence(raw);
    let reply: ArbiterReply = serde_json::from_str(body)
        .map_err(|err| ArbiterError::Unparseable(err.to_string()))?;
    let action = Outcome::parse(&reply.action)
        .ok_or_else(|| ArbiterError::Unparseable(format!("unknown action `{}`", reply.action)))?;
    if !(0.0..=1.0).contains(&reply.confidence) {
        return Err(ArbiterError::Unparseable(format!(
            "confidence {} outside 0..=1",
            reply.confidence
        )));
    }
    let explanation: String = reply.explanation.chars().take(EXPLANATION_LIMIT).collect();
    Ok(GuardDecision {
        action,
        confidence: Confidence::new(reply.confidence),
        source: DecisionSource::Agent,
        explanation: (!explanation.is_empty()).then_some(explanation),
    })
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// OpenAI-compatible chat-completions arbiter.
#[derive(Clone)]
pub struct HttpArbiter {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl HttpArbiter {
    /// `timeout` caps the HTTP exchange itself; the guard applies its own,
    /// usually shorter, deadline on top.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ArbiterError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ArbiterError::Transport(format!("client init failed: {err}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    fn user_prompt(request: &ArbiterRequest) -> Result<String, ArbiterError> {
        serde_json::to_string(request).map_err(|err| ArbiterError::Transport(err.to_string()))
    }
}

#[async_trait]
impl Arbiter for HttpArbiter {
    async fn arbitrate(&self, request: &ArbiterRequest) -> Result<String, ArbiterError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": Self::user_prompt(request)?},
            ],
        });
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| ArbiterError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ArbiterError::Status(response.status().as_u16()));
        }
        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|err| ArbiterError::Unparseable(err.to_string()))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ArbiterError::Unparseable("completion has no content".into()))
    }
}

/// Arbiter used when no endpoint is configured. Every call fails, so
/// borderline traffic falls back to block.
#[derive(Clone, Debug, Default)]
pub struct UnavailableArbiter;

#[async_trait]
impl Arbiter for UnavailableArbiter {
    async fn arbitrate(&self, _request: &ArbiterRequest) -> Result<String, ArbiterError> {
        Err(ArbiterError::Unavailable("no arbiter endpoint configured".into()))
    }
}

/// Scripted arbiter: replies are served in order after an optional delay.
#[derive(Default)]
pub struct MockArbiter {
    replies: Mutex<VecDeque<Result<String, ArbiterError>>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn reply(self, raw: impl Into<String>) -> Self {
        self.replies.lock().push_back(Ok(raw.into()));
        self
    }

    pub fn fail(self, err: ArbiterError) -> Self {
        self.replies.lock().push_back(Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Arbiter for MockArbiter {
    async fn arbitrate(&self, _request: &ArbiterRequest) -> Result<String, ArbiterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ArbiterError::Unavailable("mock arbiter exhausted".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let decision = parse_decision(
            r#"{"action": "allow", "confidence": 0.9, "explanation": "asks for hints", "rewrite": null}"#,
        )
        .unwrap();
        assert_eq!(decision.action, Outcome::Allow);
        assert_eq!(decision.confidence.value(), 0.9);
        assert_eq!(decision.source, DecisionSource::Agent);
        assert_eq!(decision.explanation.as_deref(), Some("asks for hints"));
    }

    #[test]
    fn strips_markdown_fences() {
        let raw = "```json\n{\"action\": \"rewrite_review\", \"confidence\": 0.4, \"explanation\": \"\"}\n```";
        let decision = parse_decision(raw).unwrap();
        assert_eq!(decision.action, Outcome::RewriteReview);
        assert_eq!(decision.explanation, None);
    }

    #[test]
    fn rejects_out_of_range_confidence_and_unknown_action() {
        assert!(parse_decision(r#"{"action": "allow", "confidence": 1.5, "explanation": "x"}"#).is_err());
        assert!(parse_decision(r#"{"action": "borderline", "confidence": 0.5, "explanation": "x"}"#).is_err());
        assert!(parse_decision(r#"{"action": "allow", "explanation": "x"}"#).is_err());
        assert!(parse_decision("I think this is fine").is_err());
    }

    #[test]
    fn truncates_long_explanations() {
        let long = "a".repeat(300);
        let raw = format!(r#"{{"action": "block", "confidence": 0.7, "explanation": "{long}"}}"#);
        let decision = parse_decision(&raw).unwrap();
        assert_eq!(decision.explanation.unwrap().chars().count(), 120);
    }
}
