//! Shift-start identity verification records.
//!
//! ```text
//! UNVERIFIED ──submit──► VERIFIED | REJECTED | MANUAL_REVIEW
//! REJECTED   ──submit──► VERIFIED | REJECTED | MANUAL_REVIEW   (retry)
//! MANUAL_REVIEW ──admin──► VERIFIED | REJECTED
//! ```

use crate::error::{DomainError, Result};
use fleetops_core::{AdminId, DriverId, ShiftId, VerificationId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Biometric gate sub-state of a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// Nothing submitted yet
    Unverified,
    /// Identity confirmed
    Verified,
    /// Identity not confirmed; a fresh selfie may be submitted
    Rejected,
    /// Waiting on an admin decision
    ManualReview,
}

impl VerificationStatus {
    /// All statuses.
    pub const ALL: [VerificationStatus; 4] = [
        VerificationStatus::Unverified,
        VerificationStatus::Verified,
        VerificationStatus::Rejected,
        VerificationStatus::ManualReview,
    ];

    /// Whether a new selfie may be submitted from this status.
    pub fn accepts_submission(self) -> bool {
        matches!(
            self,
            VerificationStatus::Unverified | VerificationStatus::Rejected
        )
    }

    /// Stable storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Unverified => "UNVERIFIED",
            VerificationStatus::Verified => "VERIFIED",
            VerificationStatus::Rejected => "REJECTED",
            VerificationStatus::ManualReview => "MANUAL_REVIEW",
        }
    }

    /// Inverse of [`VerificationStatus::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a verification attempt was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionSource {
    AutoMatch,
    AutoReject,
    AdminApprove,
    AdminReject,
}

impl DecisionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionSource::AutoMatch => "AUTO_MATCH",
            DecisionSource::AutoReject => "AUTO_REJECT",
            DecisionSource::AdminApprove => "ADMIN_APPROVE",
            DecisionSource::AdminReject => "ADMIN_REJECT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            DecisionSource::AutoMatch,
            DecisionSource::AutoReject,
            DecisionSource::AdminApprove,
            DecisionSource::AdminReject,
        ]
        .into_iter()
        .find(|s| s.as_str() == value)
    }
}

/// Admin verdict on a parked attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminDecision {
    Approve,
    Reject,
}

/// Result of a submission or admin decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationOutcome {
    /// Identity confirmed
    Verified {
        /// Auto match or admin approval
        source: DecisionSource,
    },
    /// Identity not confirmed
    Rejected {
        /// Auto reject or admin rejection
        source: DecisionSource,
        /// Why, shown to the driver
        reason: String,
    },
    /// Parked until an admin decides
    PendingReview,
}

impl VerificationOutcome {
    /// Sub-state of the shift after this outcome.
    pub fn status(&self) -> VerificationStatus {
        match self {
            VerificationOutcome::Verified { .. } => VerificationStatus::Verified,
            VerificationOutcome::Rejected { .. } => VerificationStatus::Rejected,
            VerificationOutcome::PendingReview => VerificationStatus::ManualReview,
        }
    }
}

/// One shift-start verification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub id: VerificationId,
    pub shift_id: ShiftId,
    pub driver_id: DriverId,
    /// Opaque reference to the captured selfie
    pub selfie_ref: String,
    /// Matcher similarity 0–100, absent when the matcher was not consulted
    pub similarity: Option<f64>,
    pub status: VerificationStatus,
    pub decision: Option<DecisionSource>,
    pub reviewer_id: Option<AdminId>,
    pub reason: Option<String>,
    pub created_at: u64,
    pub resolved_at: Option<u64>,
}

impl VerificationRecord {
    /// Record an attempt together with its immediate outcome.
    pub fn new(
        shift_id: ShiftId,
        driver_id: DriverId,
        selfie_ref: impl Into<String>,
        similarity: Option<f64>,
        outcome: &VerificationOutcome,
        now: u64,
    ) -> Self {
        let mut record = Self {
            id: VerificationId::generate(),
            shift_id,
            driver_id,
            selfie_ref: selfie_ref.into(),
            similarity,
            status: VerificationStatus::ManualReview,
            decision: None,
            reviewer_id: None,
            reason: None,
            created_at: now,
            resolved_at: None,
        };
        record.apply(outcome, None, now);
        record
    }

    fn apply(&mut self, outcome: &VerificationOutcome, reviewer: Option<AdminId>, now: u64) {
        self.status = outcome.status();
        match outcome {
            VerificationOutcome::Verified { source } => {
                self.decision = Some(*source);
                self.resolved_at = Some(now);
            }
            VerificationOutcome::Rejected { source, reason } => {
                self.decision = Some(*source);
                self.reason = Some(reason.clone());
                self.resolved_at = Some(now);
            }
            VerificationOutcome::PendingReview => {}
        }
        if reviewer.is_some() {
            self.reviewer_id = reviewer;
        }
    }

    /// Apply an admin verdict to a parked attempt.
    pub fn resolve_by_admin(
        &mut self,
        reviewer: AdminId,
        outcome: &VerificationOutcome,
        now: u64,
    ) -> Result<()> {
        if self.status != VerificationStatus::ManualReview {
            return Err(DomainError::InvalidTransition {
                entity: "verification",
                from: self.status.to_string(),
                to: outcome.status().to_string(),
            });
        }
        if matches!(outcome, VerificationOutcome::PendingReview) {
            return Err(DomainError::InvariantViolation(
                "admin decisions must resolve the attempt".to_string(),
            ));
        }
        self.apply(outcome, Some(reviewer), now);
        Ok(())
    }
}
