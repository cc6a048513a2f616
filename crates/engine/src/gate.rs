//! Verification Gate
//!
//! Decides whether a pending shift's driver is who they claim to be.
//!
//! ```text
//! Submit(selfie) ─► device revoked ─────────────► REJECTED
//!               └─► matcher score ─► ≥ HIGH ────► VERIFIED (trusted device)
//!                                 ├► < LOW ─────► REJECTED
//!                                 └► otherwise ─► MANUAL_REVIEW ─AdminDecide─► VERIFIED | REJECTED
//! ```
//!
//! A rejected attempt may be retried with a fresh selfie. Each attempt is
//! its own record; the shift carries the status of the latest one.

use crate::engine::FleetEngine;
use crate::error::{EngineError, Result};
use fleetops_core::{event_types, time::now_ms, AdminId, EventBuilder, ShiftId};
use fleetops_domain::{
    require_reason, AdminDecision, DecisionSource, ShiftStatus, VerificationOutcome,
    VerificationRecord, VerificationStatus,
};
use fleetops_store::StoreError;
use tracing::{debug, info};

impl FleetEngine {
    /// Submit a shift-start selfie.
    pub async fn submit_verification(
        &self,
        shift_id: &ShiftId,
        selfie_ref: &str,
    ) -> Result<VerificationRecord> {
        let selfie_ref = selfie_ref.trim();
        if selfie_ref.is_empty() {
            return Err(EngineError::Validation("selfie reference is required".to_string()));
        }

        let _guard = self.lock_shift(shift_id).await;
        let mut shift = self.shift(shift_id)?;
        if shift.status == ShiftStatus::Closed {
            return Err(EngineError::ShiftAlreadyClosed(shift.id));
        }
        if shift.status != ShiftStatus::PendingVerification
            || !shift.verification_status.accepts_submission()
        {
            return Err(EngineError::VerificationNotOpen {
                shift_id: shift.id,
                status: shift.status,
                verification: shift.verification_status,
            });
        }

        let profile = self.profiles.profile(&shift.driver_id)?;
        let score = if self.policy.needs_score(profile.device_trust) {
            let reference = profile
                .reference_photo
                .as_deref()
                .filter(|r| !r.trim().is_empty())
                .ok_or_else(|| EngineError::ReferencePhotoMissing(shift.driver_id.clone()))?;
            Some(self.matcher.score(selfie_ref, reference))
        } else {
            None
        };
        let similarity = score.as_ref().and_then(|s| s.as_ref().ok().copied());
        let outcome = self.policy.decide(profile.device_trust, score);

        let record = VerificationRecord::new(
            shift.id.clone(),
            shift.driver_id.clone(),
            selfie_ref,
            similarity,
            &outcome,
            now_ms(),
        );
        let before = shift.clone();
        shift.verification_status = outcome.status();
        self.store
            .update_shift(&shift, before.status, before.verification_status)?;
        if let Err(e) = self.store.insert_verification(&record) {
            self.undo(
                "verification status",
                shift.id.as_str(),
                self.store
                    .update_shift(&before, shift.status, shift.verification_status),
            );
            return Err(e.into());
        }

        info!(
            shift_id = %shift.id,
            driver_id = %shift.driver_id,
            similarity = ?similarity,
            device_trust = ?profile.device_trust,
            status = %record.status,
            "Verification submitted"
        );
        self.emit_outcome(&record, &outcome);

        self.maybe_auto_activate(shift);
        Ok(record)
    }

    /// Resolve an attempt parked in MANUAL_REVIEW.
    ///
    /// Rejection needs a reason. A decision on an attempt that is no longer
    /// parked fails with `STALE_VERIFICATION`.
    pub async fn admin_decide(
        &self,
        shift_id: &ShiftId,
        reviewer: &AdminId,
        decision: AdminDecision,
        reason: &str,
    ) -> Result<VerificationRecord> {
        let outcome = match decision {
            AdminDecision::Approve => VerificationOutcome::Verified {
                source: DecisionSource::AdminApprove,
            },
            AdminDecision::Reject => VerificationOutcome::Rejected {
                source: DecisionSource::AdminReject,
                reason: require_reason(reason, "reject a verification")?,
            },
        };

        let _guard = self.lock_shift(shift_id).await;
        let mut shift = self.shift(shift_id)?;
        if shift.status != ShiftStatus::PendingVerification
            || shift.verification_status != VerificationStatus::ManualReview
        {
            debug!(
                shift_id = %shift.id,
                status = %shift.status,
                verification = %shift.verification_status,
                "Stale admin decision"
            );
            return Err(EngineError::StaleVerification(shift.id));
        }

        let mut record = self
            .store
            .latest_verification(&shift.id)?
            .ok_or_else(|| EngineError::not_found("verification", &shift.id))?;
        if record.status != VerificationStatus::ManualReview {
            return Err(EngineError::StaleVerification(shift.id));
        }
        record.resolve_by_admin(reviewer.clone(), &outcome, now_ms())?;

        // The record is resolved only after the shift has moved
        let before = shift.clone();
        shift.verification_status = outcome.status();
        self.store
            .update_shift(&shift, before.status, before.verification_status)?;
        if let Err(e) = self
            .store
            .update_verification(&record, VerificationStatus::ManualReview)
        {
            self.undo(
                "verification status",
                shift.id.as_str(),
                self.store
                    .update_shift(&before, shift.status, shift.verification_status),
            );
            return Err(match e {
                StoreError::StaleWrite { .. } => EngineError::StaleVerification(shift.id.clone()),
                other => other.into(),
            });
        }

        info!(
            shift_id = %shift.id,
            driver_id = %shift.driver_id,
            reviewer = %reviewer,
            status = %record.status,
            "Verification decided by admin"
        );
        self.emit_outcome(&record, &outcome);

        self.maybe_auto_activate(shift);
        Ok(record)
    }

    fn emit_outcome(&self, record: &VerificationRecord, outcome: &VerificationOutcome) {
        let event = match outcome {
            VerificationOutcome::PendingReview => {
                EventBuilder::new(event_types::VERIFICATION_REVIEW_REQUESTED, &record.shift_id)
            }
            _ => EventBuilder::new(event_types::VERIFICATION_RESOLVED, &record.shift_id)
                .to_driver(&record.driver_id),
        };
        self.emit(event.payload(record).build());
    }
}
