//! Threshold policy turning a similarity score into an outcome.

use crate::matcher::MatcherError;
use crate::profiles::DeviceTrust;
use fleetops_core::VerificationConfig;
use fleetops_domain::{DecisionSource, VerificationOutcome};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Reason given to drivers on an automatic rejection.
pub const AUTO_REJECT_REASON: &str = "selfie did not match the enrolled photo";

/// Reason given when the device is revoked.
pub const DEVICE_REJECT_REASON: &str = "device not trusted";

/// Where a score falls relative to the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreBand {
    /// At or above the high threshold
    Accept,
    /// Between the thresholds
    Ambiguous,
    /// Below the low threshold
    Reject,
}

/// Accept/reject thresholds on the 0–100 similarity scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerificationPolicy {
    high_threshold: f64,
    low_threshold: f64,
}

impl VerificationPolicy {
    /// Default accept threshold
    pub const DEFAULT_HIGH_THRESHOLD: f64 = 85.0;
    /// Default reject threshold
    pub const DEFAULT_LOW_THRESHOLD: f64 = 60.0;

    /// Policy with default thresholds.
    pub fn new() -> Self {
        Self {
            high_threshold: Self::DEFAULT_HIGH_THRESHOLD,
            low_threshold: Self::DEFAULT_LOW_THRESHOLD,
        }
    }

    /// Policy with custom thresholds; they are swapped if given inverted.
    pub fn with_thresholds(high_threshold: f64, low_threshold: f64) -> Self {
        Self {
            high_threshold: high_threshold.max(low_threshold),
            low_threshold: low_threshold.min(high_threshold),
        }
    }

    /// Policy from the `[verification]` config section.
    pub fn from_config(config: &VerificationConfig) -> Self {
        Self::with_thresholds(config.high_threshold, config.low_threshold)
    }

    /// Accept threshold.
    pub fn high_threshold(&self) -> f64 {
        self.high_threshold
    }

    /// Reject threshold.
    pub fn low_threshold(&self) -> f64 {
        self.low_threshold
    }

    /// Classify a score.
    pub fn band(&self, score: f64) -> ScoreBand {
        if score >= self.high_threshold {
            ScoreBand::Accept
        } else if score < self.low_threshold {
            ScoreBand::Reject
        } else {
            ScoreBand::Ambiguous
        }
    }

    /// Whether the matcher should be consulted at all.
    pub fn needs_score(&self, device_trust: DeviceTrust) -> bool {
        device_trust != DeviceTrust::Revoked
    }

    /// Decide an attempt.
    ///
    /// `score` is `None` when the matcher was skipped (revoked device).
    /// Out-of-range scores and matcher failures go to manual review.
    pub fn decide(
        &self,
        device_trust: DeviceTrust,
        score: Option<Result<f64, MatcherError>>,
    ) -> VerificationOutcome {
        if device_trust == DeviceTrust::Revoked {
            return VerificationOutcome::Rejected {
                source: DecisionSource::AutoReject,
                reason: DEVICE_REJECT_REASON.to_string(),
            };
        }

        let score = match score {
            Some(Ok(score)) if (0.0..=100.0).contains(&score) => score,
            Some(Ok(score)) => {
                debug!(score, "Matcher score out of range, parking for review");
                return VerificationOutcome::PendingReview;
            }
            Some(Err(e)) => {
                debug!(error = %e, "Matcher failed, parking for review");
                return VerificationOutcome::PendingReview;
            }
            None => return VerificationOutcome::PendingReview,
        };

        match (self.band(score), device_trust) {
            (ScoreBand::Accept, DeviceTrust::Trusted) => VerificationOutcome::Verified {
                source: DecisionSource::AutoMatch,
            },
            (ScoreBand::Reject, _) => VerificationOutcome::Rejected {
                source: DecisionSource::AutoReject,
                reason: AUTO_REJECT_REASON.to_string(),
            },
            _ => VerificationOutcome::PendingReview,
        }
    }
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self::new()
    }
}
