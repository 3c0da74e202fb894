use crate::finding::{Finding, Span};

pub const REDACTION_PLACEHOLDER: &str = "[REDACTED]";

/// Replaces each merged finding span with [`REDACTION_PLACEHOLDER`].
///
/// `None` when any finding is span-less, a span does not fit `content`, or
/// there is nothing to mask. Callers treat `None` as "cannot be masked".
pub fn mask_spans(content: &str, findings: &[Finding]) -> Option<String> {
    let mut spans: Vec<Span> = Vec::with_capacity(findings.len());
    for finding in findings {
        let span = finding.span?;
        span.check(content).ok()?;
        spans.push(span);
    }
    if spans.is_empty() {
        return None;
    }
    spans.sort();

    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if last.overlaps_or_touches(&span) => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }

    let mut output = String::with_capacity(content.len());
    let mut cursor = 0;
    for span in merged {
        output.push_str(&content[cursor..span.start]);
        output.push_str(REDACTION_PLACEHOLDER);
        cursor = span.end;
    }
    output.push_str(&content[cursor..]);
    Some(output)
}

#[cfg(test)]
mod tests {
    use crate::{Category, Severity};

    use super::*;

    fn pii(start: usize, end: usize) -> Finding {
        Finding::new(Category::Pii, Severity::new(80), "test").with_span(start, end)
    }

    #[test]
    fn merges_overlapping_and_touching_spans() {
        assert_eq!(
            mask_spans("abcdefghij", &[pii(6, 8), pii(1, 4), pii(3, 6)]).as_deref(),
            Some("a[REDACTED]ij")
        );
    }

    #[test]
    fn refuses_spanless_or_out_of_range() {
        let spanless = Finding::new(Category::Pii, Severity::new(100), "scanner_failure:pii");
        assert!(mask_spans("text", &[pii(0, 2), spanless]).is_none());
        assert!(mask_spans("text", &[pii(2, 9)]).is_none());
        assert!(mask_spans("text", &[]).is_none());
    }

    #[test]
    fn respects_char_boundaries() {
        // 'é' is two bytes; a span ending inside it cannot be masked.
        assert!(mask_spans("café kid@x.io", &[pii(0, 4)]).is_none());
        assert_eq!(
            mask_spans("café kid@x.io", &[pii(6, 14)]).as_deref(),
            Some("café [REDACTED]")
        );
    }
}
