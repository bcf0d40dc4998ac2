//! Confidence scoring: pluggable strategy behind the matcher and the fuzzy reconciler.
//!
//! Default: `DefaultConfidenceScorer` (fixed heuristics).
//! `AppState` and the worker `JobContext` hold an `Arc<dyn ConfidenceScorer>`,
//! so an alternative matching algorithm can be swapped in at startup.

use crate::models::library::Library;

pub const NEW_LIBRARY_CONFIDENCE: f64 = 0.8;
pub const SAME_VERSION_CONFIDENCE: f64 = 0.95;
pub const OTHER_VERSION_CONFIDENCE: f64 = 0.70;

/// The scorer's pick among fuzzy candidates.
#[derive(Debug, Clone)]
pub struct FuzzyMatch<'a> {
    pub suggested: Option<&'a Library>,
    /// 0.0 – 1.0
    pub confidence: f64,
}

pub trait ConfidenceScorer: Send + Sync {
    /// Confidence recorded when an exact-match miss creates a new library.
    fn new_library_confidence(&self) -> f64;

    /// Chooses a suggestion among name-similar candidates for a row.
    fn score_candidates<'a>(
        &self,
        row_version: Option<&str>,
        candidates: &'a [Library],
    ) -> FuzzyMatch<'a>;
}

// ────────────────────────────────────────────────────────────────────────────
// DefaultConfidenceScorer
// ────────────────────────────────────────────────────────────────────────────

/// Takes the first candidate: 0.95 when its version equals the row's exactly,
/// 0.70 otherwise, 0 when there is none.
pub struct DefaultConfidenceScorer;

impl ConfidenceScorer for DefaultConfidenceScorer {
    fn new_library_confidence(&self) -> f64 {
        NEW_LIBRARY_CONFIDENCE
    }

    fn score_candidates<'a>(
        &self,
        row_version: Option<&str>,
        candidates: &'a [Library],
    ) -> FuzzyMatch<'a> {
        match candidates.first() {
            Some(candidate) => {
                let confidence = if row_version == Some(candidate.version.as_str()) {
                    SAME_VERSION_CONFIDENCE
                } else {
                    OTHER_VERSION_CONFIDENCE
                };
                FuzzyMatch {
                    suggested: Some(candidate),
                    confidence,
                }
            }
            None => FuzzyMatch {
                suggested: None,
                confidence: 0.0,
            },
        }
    }
}
