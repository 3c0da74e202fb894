use serde::{Deserialize, Serialize};

use crate::{Message, ModelError, Outcome};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub student_id: Option<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            student_id: None,
        }
    }

    pub fn with_student(mut self, student_id: impl Into<String>) -> Self {
        self.student_id = Some(student_id.into());
        self
    }

    /// Index of the latest user turn, which is the message under scan.
    pub fn latest_user_index(&self) -> Option<usize> {
        self.messages.iter().rposition(Message::is_user)
    }

    /// Splits the conversation into the latest user message and the turns
    /// before it.
    pub fn split_latest(&self) -> Result<(&Message, &[Message]), ModelError> {
        let index = self
            .latest_user_index()
            .ok_or(ModelError::Missing("user message"))?;
        Ok((&self.messages[index], &self.messages[..index]))
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.messages.is_empty() {
            return Err(ModelError::Missing("messages"));
        }
        let (latest, _) = self.split_latest()?;
        latest.validate()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub action: Outcome,
    pub output: String,
    pub policy_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_confidence: Option<f64>,
}
