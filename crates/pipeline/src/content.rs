//! Validity checks for prep documents.
//!
//! A prep response that is too short, contains a known refusal phrase, or
//! never touches the prep vocabulary is treated as a failed prep, not as a
//! plan. These are the Prepping→Prepped guard; the tolerant plan extraction
//! only runs on documents that pass.

use thiserror::Error;
use utils::text::keyword_hits;

pub const MIN_PREP_CHARS: usize = 120;
pub const MIN_KEYWORD_HITS: usize = 2;

/// Phrases that mark a refusal or a dead end rather than a plan.
const FAILURE_PHRASES: &[&str] = &[
    "i cannot",
    "i can't",
    "i am unable",
    "unable to complete",
    "as an ai",
    "i apologize, but",
    "cannot assist with",
];

/// A real prep document talks about at least a couple of these.
const PREP_VOCABULARY: &[&str] = &[
    "approach",
    "plan",
    "step",
    "test",
    "file",
    "change",
    "implement",
    "risk",
    "dependency",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentIssue {
    #[error("prep document too short ({length} chars, need {minimum})")]
    TooShort { length: usize, minimum: usize },
    #[error("prep document contains a failure phrase: {0:?}")]
    FailurePhrase(String),
    #[error("prep document covers {hits} topical keyword(s), need {minimum}")]
    LowCoverage { hits: usize, minimum: usize },
}

pub fn validate_prep_document(text: &str) -> Result<(), ContentIssue> {
    let length = text.trim().chars().count();
    if length < MIN_PREP_CHARS {
        return Err(ContentIssue::TooShort {
            length,
            minimum: MIN_PREP_CHARS,
        });
    }
    let lowered = text.to_lowercase();
    if let Some(phrase) = FAILURE_PHRASES.iter().find(|p| lowered.contains(*p)) {
        return Err(ContentIssue::FailurePhrase((*phrase).to_string()));
    }
    let hits = keyword_hits(text, PREP_VOCABULARY);
    if hits < MIN_KEYWORD_HITS {
        return Err(ContentIssue::LowCoverage {
            hits,
            minimum: MIN_KEYWORD_HITS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plausible_prep() -> String {
        "Approach: extend the parser in two steps. \
         1. Add a failing test for the regression. \
         2. Change the tokenizer file to handle the edge case and implement \
         the fix behind the existing interface. Risk is low."
            .to_string()
    }

    #[test]
    fn test_plausible_document_passes() {
        assert_eq!(validate_prep_document(&plausible_prep()), Ok(()));
    }

    #[test]
    fn test_forty_chars_fails_minimum_length() {
        let short = "Plan: fix the parser, add a test now.001"; // 40 chars
        assert_eq!(short.chars().count(), 40);
        assert_eq!(
            validate_prep_document(short),
            Err(ContentIssue::TooShort {
                length: 40,
                minimum: MIN_PREP_CHARS,
            })
        );
    }

    #[test]
    fn test_refusal_phrase_fails_whatever_the_length() {
        let text = format!(
            "{} Unfortunately I cannot access the repository from here.",
            plausible_prep()
        );
        assert!(matches!(
            validate_prep_document(&text),
            Err(ContentIssue::FailurePhrase(_))
        ));
    }

    #[test]
    fn test_off_topic_document_fails_coverage() {
        let text = "The weather today was pleasant and the coffee was good. \
                    We talked about many things, none of them related to the \
                    bounty at hand, for quite a long while indeed.";
        assert!(matches!(
            validate_prep_document(text),
            Err(ContentIssue::LowCoverage { hits: 0, .. })
        ));
    }

    #[test]
    fn test_single_keyword_is_not_enough() {
        let text = "This plan is long enough to clear the minimum length \
                    requirement because it rambles on and on without saying \
                    anything concrete about the work to be done here at all.";
        assert_eq!(
            validate_prep_document(text),
            Err(ContentIssue::LowCoverage {
                hits: 1,
                minimum: MIN_KEYWORD_HITS,
            })
        );
    }
}
