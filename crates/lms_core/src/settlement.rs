//! crates/lms_core/src/settlement.rs
//!
//! Turns a confirmed charge into course access. A charge is first persisted
//! as a payment row with status "recorded", then the enrollment is granted,
//! then the row is marked "settled". The unique reference makes the whole
//! flow replay-safe: verify, webhook and retries all funnel through here
//! and at most one row (and one grant) survives per reference.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{NewPayment, Payment};
use crate::ports::{DatabaseService, PortError, PortResult};

/// Access kind written onto enrollments granted by a payment.
pub const PAYMENT_STATUS_PAID: &str = "paid";

/// Converts a provider amount in minor units (kobo, cents) to major units.
pub fn minor_to_major(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// What a settlement attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// The enrollment is active and the payment is settled.
    Granted,
    /// The reference had already been settled earlier; nothing changed.
    AlreadyProcessed,
    /// The payment row is stored but the grant could not be applied.
    /// Reconciliation will retry it.
    RecordedUnsettled { reason: String },
}

pub struct PaymentSettlement {
    db: Arc<dyn DatabaseService>,
}

impl PaymentSettlement {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Records a confirmed charge and applies the enrollment grant.
    ///
    /// Both the verify flow and the webhook call this with the same
    /// reference; whichever lands second sees the stored row and either
    /// resumes an interrupted grant or reports `AlreadyProcessed`.
    pub async fn settle(&self, charge: NewPayment) -> PortResult<SettlementOutcome> {
        if let Some(existing) = self.db.get_payment_by_reference(&charge.reference).await? {
            if existing.is_settled() {
                tracing::debug!(reference = %charge.reference, "payment already settled, skipping");
                return Ok(SettlementOutcome::AlreadyProcessed);
            }
            // An earlier attempt recorded the charge but died before the
            // grant. Finish it now.
            tracing::info!(reference = %charge.reference, "resuming unsettled payment");
            return self.apply_grant(&existing).await;
        }

        let payment = match self.db.insert_payment(charge.clone()).await {
            Ok(payment) => payment,
            Err(PortError::AlreadyExists(_)) => {
                // A concurrent settle won the insert race. Re-read its row
                // and converge on the same grant.
                match self.db.get_payment_by_reference(&charge.reference).await? {
                    Some(existing) if existing.is_settled() => {
                        return Ok(SettlementOutcome::AlreadyProcessed);
                    }
                    Some(existing) => return self.apply_grant(&existing).await,
                    None => {
                        return Err(PortError::Unexpected(format!(
                            "payment {} reported as duplicate but not found",
                            charge.reference
                        )));
                    }
                }
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            reference = %payment.reference,
            user_id = %payment.user_id,
            course_id = %payment.course_id,
            channel = %payment.channel,
            "payment recorded"
        );

        self.apply_grant(&payment).await
    }

    /// Grants the enrollment for a recorded payment and marks it settled.
    /// Both writes are idempotent, so a crashed attempt can run again.
    async fn apply_grant(&self, payment: &Payment) -> PortResult<SettlementOutcome> {
        if let Err(e) = self
            .db
            .upsert_enrollment(payment.user_id, payment.course_id, PAYMENT_STATUS_PAID)
            .await
        {
            tracing::warn!(
                reference = %payment.reference,
                error = %e,
                "payment recorded but enrollment grant failed"
            );
            return Ok(SettlementOutcome::RecordedUnsettled {
                reason: e.to_string(),
            });
        }

        if let Err(e) = self.db.mark_payment_settled(payment.id).await {
            // The learner has access; only the marker is stale. The next
            // reconcile pass rewrites it.
            tracing::warn!(
                reference = %payment.reference,
                error = %e,
                "enrollment granted but settle marker not written"
            );
        }

        Ok(SettlementOutcome::Granted)
    }

    /// Finishes grants for payments stuck in "recorded". Run periodically
    /// in the background; every action it takes is a replay of `settle`'s
    /// own idempotent writes.
    pub async fn reconcile(&self, limit: usize) -> PortResult<ReconcileReport> {
        let stuck = self.db.list_unsettled_payments(limit).await?;
        let mut report = ReconcileReport::default();

        for payment in stuck {
            match self.apply_grant(&payment).await? {
                SettlementOutcome::Granted => report.settled += 1,
                _ => report.failed += 1,
            }
        }

        if report.settled > 0 || report.failed > 0 {
            tracing::info!(
                settled = report.settled,
                failed = report.failed,
                "payment reconciliation pass finished"
            );
        }

        Ok(report)
    }

    /// Whether a reference has completed settlement. Used by the mobile
    /// money status endpoint to answer polls without calling the provider.
    pub async fn is_settled(&self, reference: &str) -> PortResult<bool> {
        Ok(self
            .db
            .get_payment_by_reference(reference)
            .await?
            .map(|p| p.is_settled())
            .unwrap_or(false))
    }
}

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub settled: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_units_become_major_with_two_decimals() {
        assert_eq!(minor_to_major(500_000).to_string(), "5000.00");
        assert_eq!(minor_to_major(1).to_string(), "0.01");
        assert_eq!(minor_to_major(0).to_string(), "0.00");
    }
}
