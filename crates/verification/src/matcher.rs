//! Face similarity seam.

use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Opaque reference to a stored photo (object key, URL, ...).
pub type PhotoRef = str;

/// Matcher failures. Never fatal to the gate: a failed score parks the
/// attempt for manual review.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatcherError {
    /// Selfie or reference image could not be loaded
    #[error("Image unavailable: {0}")]
    ImageUnavailable(String),

    /// No face detected in the selfie
    #[error("No face detected in {0}")]
    NoFace(String),

    /// Classifier backend failed
    #[error("Matcher backend error: {0}")]
    Backend(String),
}

/// External face-similarity classifier.
///
/// Implementations must be pure with respect to the engine: the same
/// inputs may be scored repeatedly.
pub trait FaceMatcher: Send + Sync {
    /// Similarity between `selfie` and `reference` in 0–100.
    fn score(&self, selfie: &PhotoRef, reference: &PhotoRef) -> Result<f64, MatcherError>;
}

/// Matcher returning pre-programmed scores per selfie reference.
///
/// Used by tests and demo deployments.
#[derive(Debug, Default)]
pub struct FixedScoreMatcher {
    scores: RwLock<HashMap<String, Result<f64, MatcherError>>>,
    default_score: Option<f64>,
}

impl FixedScoreMatcher {
    /// Matcher that fails for any selfie without a programmed score.
    pub fn new() -> Self {
        Self::default()
    }

    /// Matcher answering `score` for any selfie without a programmed score.
    pub fn with_default(score: f64) -> Self {
        Self {
            scores: RwLock::new(HashMap::new()),
            default_score: Some(score),
        }
    }

    /// Program the score for a selfie.
    pub fn set_score(&self, selfie: impl Into<String>, score: f64) {
        if let Ok(mut scores) = self.scores.write() {
            scores.insert(selfie.into(), Ok(score));
        }
    }

    /// Program a failure for a selfie.
    pub fn set_failure(&self, selfie: impl Into<String>, error: MatcherError) {
        if let Ok(mut scores) = self.scores.write() {
            scores.insert(selfie.into(), Err(error));
        }
    }
}

impl FaceMatcher for FixedScoreMatcher {
    fn score(&self, selfie: &PhotoRef, _reference: &PhotoRef) -> Result<f64, MatcherError> {
        let scores = self
            .scores
            .read()
            .map_err(|_| MatcherError::Backend("score table poisoned".to_string()))?;
        match scores.get(selfie) {
            Some(result) => result.clone(),
            None => self
                .default_score
                .ok_or_else(|| MatcherError::ImageUnavailable(selfie.to_string())),
        }
    }
}
