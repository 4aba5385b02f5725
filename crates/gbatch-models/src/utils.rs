//! Small helpers shared across crates.

/// Maximum length of an error string persisted on a job.
pub const MAX_ERROR_LEN: usize = 500;

/// Truncate an error message to at most `max` characters.
///
/// Cuts on a char boundary and marks the cut with an ellipsis.
pub fn truncate_error(msg: &str, max: usize) -> String {
    if msg.chars().count() <= max {
        return msg.to_string();
    }
    let mut out: String = msg.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_untouched() {
        assert_eq!(truncate_error("boom", 10), "boom");
    }

    #[test]
    fn test_long_message_truncated() {
        let msg = "x".repeat(600);
        let out = truncate_error(&msg, MAX_ERROR_LEN);
        assert_eq!(out.chars().count(), MAX_ERROR_LEN);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        let msg = "é".repeat(20);
        let out = truncate_error(&msg, 5);
        assert_eq!(out, "éééé…");
    }
}
