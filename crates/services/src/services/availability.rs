//! Cross-source availability validation.
//!
//! Combines the tracker's assignment signal and the marketplace's claim
//! signal into one availability verdict. The stored `available` flag on a
//! progress record is display-only; admission always goes through
//! [`ConsistencyValidator::check`] with freshly fetched signals.

use thiserror::Error;
use tracing::warn;

use crate::services::marketplace::MarketSignal;
use crate::services::tracker::TrackerSignal;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AvailabilityError {
    /// The marketplace lists the task as openly available while another
    /// signal says it is taken. That combination means at least one source
    /// is lying, so no verdict is safe.
    #[error("conflicting signals: {detail}")]
    ConflictingSignals { detail: String },
    #[error("no availability signal from any source")]
    NoSignals,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityVerdict {
    pub available: bool,
    /// Cross-source disagreements and coverage gaps worth recording, none
    /// of them severe enough to block a verdict.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyValidator;

impl ConsistencyValidator {
    /// Availability is `no assignee AND not claimed`, computed over the
    /// sources that responded. A missing source degrades to a single-source
    /// verdict with a warning; a listing that claims to be open while
    /// assigned or claimed is a hard error.
    pub fn check(
        tracker: Option<&TrackerSignal>,
        market: Option<&MarketSignal>,
    ) -> Result<AvailabilityVerdict, AvailabilityError> {
        if tracker.is_none() && market.is_none() {
            return Err(AvailabilityError::NoSignals);
        }

        let assigned = tracker.is_some_and(|s| s.assignee.is_some());
        let claimed = market.is_some_and(|s| s.claimed);
        let listed_open = market.and_then(|s| s.listed_open);

        if listed_open == Some(true) && (assigned || claimed) {
            let detail = match (assigned, claimed) {
                (true, true) => "listed open but assigned and claimed".to_string(),
                (true, false) => format!(
                    "listed open but assigned to {}",
                    tracker
                        .and_then(|s| s.assignee.as_deref())
                        .unwrap_or("someone")
                ),
                _ => "listed open but already claimed".to_string(),
            };
            warn!("Availability conflict: {detail}");
            return Err(AvailabilityError::ConflictingSignals { detail });
        }

        let mut warnings = Vec::new();
        if tracker.is_none() {
            warnings.push("single source: no tracker signal".to_string());
        }
        if market.is_none() {
            warnings.push("single source: no marketplace signal".to_string());
        }
        // Disagreement without the open-listing conflict: one source says
        // taken, the other free. The AND above already lands on the
        // conservative answer; record the split.
        if tracker.is_some() && market.is_some() && assigned != claimed {
            warnings.push(if assigned {
                "tracker reports an assignee but the marketplace shows no claim".to_string()
            } else {
                "marketplace reports a claim but the tracker shows no assignee".to_string()
            });
        }
        if listed_open == Some(false) && !assigned && !claimed {
            warnings.push("marketplace lists the task as closed despite no claim".to_string());
        }

        Ok(AvailabilityVerdict {
            available: !assigned && !claimed,
            warnings,
        })
    }
}
