use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A message withheld from the student pending human or secondary review.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewTicket {
    pub ticket_id: Uuid,
    pub hashed_student_id: String,
    pub reason: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
}

impl ReviewTicket {
    pub fn new(
        hashed_student_id: impl Into<String>,
        reason: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            ticket_id: Uuid::now_v7(),
            hashed_student_id: hashed_student_id.into(),
            reason: reason.into(),
            content: content.into(),
            submitted_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Submission must not block the request that produced the ticket.
pub trait ReviewQueue: Send + Sync {
    fn submit(&self, ticket: ReviewTicket);

    /// Pending tickets, oldest first.
    fn pending(&self) -> Vec<ReviewTicket>;

    fn resolve(&self, ticket_id: Uuid) -> Option<ReviewTicket>;
}

pub const DEFAULT_REVIEW_CAPACITY: usize = 1000;

/// Bounded FIFO; the oldest ticket is dropped once capacity is reached.
pub struct InMemoryReviewQueue {
    capacity: usize,
    tickets: Mutex<VecDeque<ReviewTicket>>,
}

impl InMemoryReviewQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tickets: Mutex::new(VecDeque::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.tickets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryReviewQueue {
    fn default() -> Self {
        Self::new(DEFAULT_REVIEW_CAPACITY)
    }
}

impl ReviewQueue for InMemoryReviewQueue {
    fn submit(&self, ticket: ReviewTicket) {
        let mut tickets = self.tickets.lock();
        if tickets.len() == self.capacity {
            if let Some(dropped) = tickets.pop_front() {
                tracing::warn!(ticket_id = %dropped.ticket_id, "review queue full, dropping oldest ticket");
            }
        }
        tickets.push_back(ticket);
    }

    fn pending(&self) -> Vec<ReviewTicket> {
        self.tickets.lock().iter().cloned().collect()
    }

    fn resolve(&self, ticket_id: Uuid) -> Option<ReviewTicket> {
        let mut tickets = self.tickets.lock();
        let index = tickets.iter().position(|t| t.ticket_id == ticket_id)?;
        tickets.remove(index)
    }
}
