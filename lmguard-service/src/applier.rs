use lmguard_core_models::{mask_spans, Finding, Message, Outcome};
use tracing::warn;

pub use lmguard_core_models::REDACTION_PLACEHOLDER;
pub const REFUSAL_MESSAGE: &str =
    "This message can't be sent to your tutor. Please rephrase your question and try again.";
pub const PENDING_REVIEW_MESSAGE: &str =
    "Your message has been sent for review. You'll get a response once it has been checked.";

/// Final action together with the text that leaves the guard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    pub action: Outcome,
    pub output: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ActionApplier;

impl ActionApplier {
    /// `findings` are the detections to mask when the outcome is `Redact`.
    /// Redaction escalates to `Block` when there is nothing spanned to mask
    /// or when any finding lacks a span.
    pub fn apply(&self, outcome: Outcome, message: &Message, findings: &[Finding]) -> Applied {
        match outcome {
            Outcome::Allow => Applied {
                action: Outcome::Allow,
                output: message.content.clone(),
            },
            Outcome::Redact => match mask_spans(&message.content, findings) {
                Some(output) => Applied {
                    action: Outcome::Redact,
                    output,
                },
                None => {
                    warn!("redaction target without span, escalating to block");
                    Self::refuse()
                }
            },
            Outcome::Block => Self::refuse(),
            Outcome::RewriteReview => Applied {
                action: Outcome::RewriteReview,
                output: PENDING_REVIEW_MESSAGE.to_string(),
            },
        }
    }

    fn refuse() -> Applied {
        Applied {
            action: Outcome::Block,
            output: REFUSAL_MESSAGE.to_string(),
        }
    }
}
