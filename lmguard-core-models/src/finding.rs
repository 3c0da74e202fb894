use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize};

use crate::ModelError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Pii,
    AcademicDishonesty,
    Injection,
    Toxicity,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Pii,
        Category::AcademicDishonesty,
        Category::Injection,
        Category::Toxicity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Pii => "pii",
            Category::AcademicDishonesty => "academic_dishonesty",
            Category::Injection => "injection",
            Category::Toxicity => "toxicity",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity score in `[0, 100]`. Values outside the range are clamped on
/// construction and on deserialization.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Severity(u8);

impl Severity {
    pub const MAX: Severity = Severity(100);
    pub const MIN: Severity = Severity(0);

    pub fn new(value: u32) -> Self {
        Self(value.min(100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        Ok(Severity::new(raw.clamp(0, 100) as u32))
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Half-open byte range `start..end` into the scanned content.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn check(&self, content: &str) -> Result<(), ModelError> {
        let valid = self.start < self.end
            && self.end <= content.len()
            && content.is_char_boundary(self.start)
            && content.is_char_boundary(self.end);
        if valid {
            Ok(())
        } else {
            Err(ModelError::InvalidSpan {
                start: self.start,
                end: self.end,
                len: content.len(),
            })
        }
    }

    pub fn overlaps_or_touches(&self, other: &Span) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// A single detection produced by exactly one scanner.
///
/// `detail` names the rule that fired and never carries the matched text,
/// so findings can be handed to the audit trail as-is.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Finding {
    pub category: Category,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    pub detail: String,
}

impl Finding {
    pub fn new(category: Category, severity: Severity, detail: impl Into<String>) -> Self {
        Self {
            category,
            severity,
            span: None,
            detail: detail.into(),
        }
    }

    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.span = Some(Span::new(start, end));
        self
    }

    pub fn key(&self) -> (Category, Option<Span>) {
        (self.category, self.span)
    }
}
