use crate::{ChatRequest, Finding, Message, ModelError};

pub trait InvariantCheck {
    fn validate(&self) -> Result<(), ModelError>;
}

impl InvariantCheck for Message {
    fn validate(&self) -> Result<(), ModelError> {
        Message::validate(self)
    }
}

impl InvariantCheck for ChatRequest {
    fn validate(&self) -> Result<(), ModelError> {
        ChatRequest::validate(self)
    }
}

impl InvariantCheck for Finding {
    fn validate(&self) -> Result<(), ModelError> {
        match self.span {
            Some(span) if span.start >= span.end => {
                Err(ModelError::Invariant("finding span must be non-empty"))
            }
            _ => Ok(()),
        }
    }
}
