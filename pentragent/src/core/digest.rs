//! Bounded summaries of finished transcripts.

use serde::Serialize;

use super::transcript::TranscriptOutcome;

/// Compact record of what one lead attempted and learned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Digest {
    pub text: String,
    pub dead_end: bool,
    /// True when the summarizer failed and `text` is the fixed fallback.
    pub fallback: bool,
}

impl Digest {
    /// Build a digest from oracle text, bounded to `max_chars` characters.
    pub fn new(text: &str, dead_end: bool, max_chars: usize) -> Self {
        Self {
            text: truncate_chars(text.trim(), max_chars),
            dead_end,
            fallback: false,
        }
    }

    /// Digest used when the summarizer could not produce one.
    ///
    /// Only failed leads are marked a dead end; a lead that concluded or was
    /// cut off can still spawn follow-ups.
    pub fn unavailable(outcome: &TranscriptOutcome) -> Self {
        Self {
            text: format!("summary unavailable (lead {outcome})"),
            dead_end: outcome.is_failed(),
            fallback: true,
        }
    }
}

/// Keep at most `max_chars` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(&"..."[..max_chars.min(3)]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_kept_verbatim() {
        let digest = Digest::new("  open port 22 only  ", false, 100);
        assert_eq!(digest.text, "open port 22 only");
        assert!(!digest.fallback);
    }

    #[test]
    fn long_text_is_cut_on_char_boundary() {
        let text = "é".repeat(50);
        let digest = Digest::new(&text, true, 10);
        assert_eq!(digest.text.chars().count(), 10);
        assert!(digest.text.ends_with("..."));
        assert!(digest.dead_end);
    }

    #[test]
    fn tiny_limits_stay_within_bound() {
        assert_eq!(truncate_chars("abcdef", 2), "..");
        assert_eq!(truncate_chars("abcdef", 0), "");
    }

    #[test]
    fn fallback_names_the_outcome() {
        let digest = Digest::unavailable(&TranscriptOutcome::RepeatGuard {
            command: "id".to_string(),
        });
        assert!(digest.fallback);
        assert!(digest.text.starts_with("summary unavailable (lead inconclusive"));
        assert!(digest.text.contains("`id`"));
        assert!(!digest.dead_end);
    }
}
