//! Text helpers shared across the pipeline crates.
//!
//! Scanning is intentionally dumb: lowercase substring checks, no regex.
//! The tolerant response parsing in `executors` owns anything smarter.

/// Truncate `text` to at most `max` bytes on a char boundary, appending a
/// marker when anything was cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &text[..end])
}

/// Case-insensitive check for any of `phrases` appearing in `text`.
pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    let lowered = text.to_lowercase();
    phrases.iter().any(|p| lowered.contains(&p.to_lowercase()))
}

/// Number of distinct `keywords` that appear in `text`, case-insensitive.
pub fn keyword_hits(text: &str, keywords: &[&str]) -> usize {
    let lowered = text.to_lowercase();
    keywords
        .iter()
        .filter(|k| lowered.contains(&k.to_lowercase()))
        .count()
}

/// Count occurrences of each phrase in `text`, case-insensitive, summed.
/// Used for red-flag tallies where repeats matter.
pub fn phrase_occurrences(text: &str, phrases: &[&str]) -> usize {
    let lowered = text.to_lowercase();
    phrases
        .iter()
        .map(|p| lowered.matches(&p.to_lowercase()).count())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_text_untouched() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_long_text_marked() {
        let out = truncate("abcdefghij", 4);
        assert_eq!(out, "abcd...[truncated]");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        // 'é' is two bytes; cutting at 1 would split it
        let out = truncate("état", 1);
        assert!(out.starts_with("...[truncated]") || out.ends_with("...[truncated]"));
    }

    #[test]
    fn contains_any_is_case_insensitive() {
        assert!(contains_any("I CANNOT do this", &["i cannot"]));
        assert!(!contains_any("all good here", &["i cannot", "unable to"]));
    }

    #[test]
    fn keyword_hits_counts_distinct_keywords() {
        let text = "The approach: three steps, with tests for each step.";
        assert_eq!(keyword_hits(text, &["approach", "steps", "tests", "risk"]), 3);
    }

    #[test]
    fn phrase_occurrences_counts_repeats() {
        assert_eq!(phrase_occurrences("TODO one, todo two", &["todo"]), 2);
    }
}
