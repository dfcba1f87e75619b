use crate::application::dispatcher::NotificationDispatcher;
use crate::domain::payment::{Payment, PaymentStatus, minor_units};
use crate::domain::policy::{self, PARTIAL_THRESHOLD_HOURS, RefundDecision, RefundTier};
use crate::domain::ports::{
    AppointmentStoreBox, ClockHandle, PaymentStoreBox, RefundGatewayBox,
};
use crate::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// A cancellation request that cannot proceed. Local, synchronous, and free
/// of side effects: no gateway call, no state mutation, no notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefundRejection {
    #[error("payment already refunded{}", .refunded_at.map(|at| format!(" at {at}")).unwrap_or_default())]
    AlreadyRefunded {
        refunded_at: Option<DateTime<Utc>>,
    },
    #[error("payment has not succeeded yet")]
    NotYetSucceeded,
    #[error("a failed payment cannot be refunded")]
    CannotRefundFailed,
    #[error("payment has no associated appointment")]
    NoAssociatedAppointment,
    #[error("payment not found")]
    PaymentNotFound,
}

/// Structured result returned to the caller (an HTTP controller, an admin
/// action, the CLI). Serializable in any format.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct RefundOutcome {
    pub success: bool,
    pub refund_type: RefundTier,
    pub refund_amount: Decimal,
    pub error: Option<String>,
    pub gateway_ref: Option<String>,
}

impl RefundOutcome {
    fn succeeded(tier: RefundTier, amount: Decimal, gateway_ref: Option<String>) -> Self {
        Self {
            success: true,
            refund_type: tier,
            refund_amount: amount,
            error: None,
            gateway_ref,
        }
    }

    fn rejected(rejection: RefundRejection) -> Self {
        Self {
            success: false,
            refund_type: RefundTier::None,
            refund_amount: Decimal::ZERO,
            error: Some(rejection.to_string()),
            gateway_ref: None,
        }
    }

    fn failed(tier: RefundTier, message: impl Into<String>) -> Self {
        Self {
            success: false,
            refund_type: tier,
            refund_amount: Decimal::ZERO,
            error: Some(message.into()),
            gateway_ref: None,
        }
    }
}

/// The transactional core of the cancellation flow.
///
/// Validates eligibility, computes the refund decision, calls the gateway
/// when a non-zero refund applies, persists the payment transition, and
/// dispatches the outcome to the payer. Within one call the order is strict:
/// gateway, then persist, then notify — the notification content depends on
/// confirmed state.
pub struct RefundOrchestrator {
    payments: PaymentStoreBox,
    appointments: AppointmentStoreBox,
    gateway: RefundGatewayBox,
    clock: ClockHandle,
    dispatcher: NotificationDispatcher,
    /// Per-payment exclusivity so concurrent cancellations of the same
    /// payment serialize and the already-refunded check stays race-free.
    locks: Mutex<HashMap<u32, Arc<Mutex<()>>>>,
}

impl RefundOrchestrator {
    pub fn new(
        payments: PaymentStoreBox,
        appointments: AppointmentStoreBox,
        gateway: RefundGatewayBox,
        clock: ClockHandle,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            payments,
            appointments,
            gateway,
            clock,
            dispatcher,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Processes a cancellation refund for `payment_id`.
    ///
    /// Never panics and never propagates an error: validation failures and
    /// gateway failures come back as structured failure outcomes, and
    /// anything unexpected is logged and converted to a generic failure.
    /// Re-calling on an already-refunded payment is safely rejected without a
    /// second gateway call.
    pub async fn process_refund(&self, payment_id: u32, reason: &str) -> RefundOutcome {
        let lock = self.payment_lock(payment_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            match self.try_process(payment_id, reason).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(payment = payment_id, error = %err, "refund processing failed unexpectedly");
                    RefundOutcome::failed(
                        RefundTier::None,
                        "internal error while processing refund",
                    )
                }
            }
        };
        drop(lock);
        self.release_payment_lock(payment_id).await;
        outcome
    }

    async fn try_process(&self, payment_id: u32, reason: &str) -> Result<RefundOutcome> {
        info!(payment = payment_id, reason, "processing cancellation refund");

        let Some(mut payment) = self.payments.get(payment_id).await? else {
            return Ok(RefundOutcome::rejected(RefundRejection::PaymentNotFound));
        };

        // Eligibility checks, in order, each short-circuiting.
        match payment.status {
            PaymentStatus::Refunded => {
                return Ok(RefundOutcome::rejected(RefundRejection::AlreadyRefunded {
                    refunded_at: payment.refunded_at,
                }));
            }
            PaymentStatus::Pending => {
                return Ok(RefundOutcome::rejected(RefundRejection::NotYetSucceeded));
            }
            PaymentStatus::Failed => {
                return Ok(RefundOutcome::rejected(RefundRejection::CannotRefundFailed));
            }
            PaymentStatus::Succeeded => {}
        }
        let Some(appointment_id) = payment.appointment else {
            return Ok(RefundOutcome::rejected(
                RefundRejection::NoAssociatedAppointment,
            ));
        };
        let Some(appointment) = self.appointments.get(appointment_id).await? else {
            return Ok(RefundOutcome::rejected(
                RefundRejection::NoAssociatedAppointment,
            ));
        };

        let now = self.clock.now();
        let decision = policy::decide(payment.amount, appointment.start_time, now);

        if decision.tier == RefundTier::None {
            // A valid terminal state, not an error: the cancellation stands,
            // no money moves, and the payer is told why.
            self.notify_no_refund(&payment).await;
            return Ok(RefundOutcome::succeeded(
                RefundTier::None,
                Decimal::ZERO,
                None,
            ));
        }

        let amount_minor_units = minor_units(decision.amount)?;
        let idempotency_key = format!("refund-{payment_id}");
        match self
            .gateway
            .create_refund(&payment.gateway_ref, amount_minor_units, &idempotency_key)
            .await
        {
            Ok(refund) => {
                if let Err(err) = self.persist_refunded(&mut payment, now).await {
                    error!(
                        payment = payment.id,
                        gateway_refund = %refund.id,
                        error = %err,
                        "gateway refund succeeded but local persist failed; manual reconciliation required"
                    );
                    return Ok(RefundOutcome::failed(
                        decision.tier,
                        "refund recorded at gateway but local state update failed",
                    ));
                }
                info!(
                    payment = payment.id,
                    tier = %decision.tier,
                    amount = %decision.amount,
                    gateway_refund = %refund.id,
                    "refund processed"
                );
                self.notify_refund_processed(&payment, &decision).await;
                Ok(RefundOutcome::succeeded(
                    decision.tier,
                    decision.amount,
                    Some(refund.id),
                ))
            }
            Err(err) => {
                // No mutation and no notification on this path: never tell
                // the user a refund happened when it did not.
                match &err {
                    GatewayError::Timeout => error!(
                        payment = payment.id,
                        tier = %decision.tier,
                        "gateway timed out; refund outcome unknown, do not retry blindly"
                    ),
                    GatewayError::Rejected(message) => warn!(
                        payment = payment.id,
                        tier = %decision.tier,
                        message,
                        "gateway rejected refund"
                    ),
                    GatewayError::Transport(message) => warn!(
                        payment = payment.id,
                        tier = %decision.tier,
                        message,
                        "gateway unreachable"
                    ),
                }
                Ok(RefundOutcome::failed(decision.tier, err.to_string()))
            }
        }
    }

    async fn persist_refunded(&self, payment: &mut Payment, now: DateTime<Utc>) -> Result<()> {
        payment.mark_refunded(now)?;
        self.payments.store(payment.clone()).await
    }

    async fn notify_no_refund(&self, payment: &Payment) {
        self.dispatcher
            .notify(
                payment.payer,
                "no_refund",
                "Cancellation received",
                &format!(
                    "Your appointment was cancelled less than {PARTIAL_THRESHOLD_HOURS} hours \
                     before its start time, so no refund is due."
                ),
                Some(format!("/payments/{}", payment.id)),
            )
            .await;
    }

    async fn notify_refund_processed(&self, payment: &Payment, decision: &RefundDecision) {
        self.dispatcher
            .notify(
                payment.payer,
                "refund_processed",
                "Refund processed",
                &format!(
                    "A {} refund of ${:.2} has been issued to your original payment method.",
                    decision.tier, decision.amount
                ),
                Some(format!("/payments/{}", payment.id)),
            )
            .await;
    }

    async fn payment_lock(&self, payment_id: u32) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(payment_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Removes the map entry once no in-flight call holds the lock, keeping
    /// the map bounded by the number of concurrent cancellations rather than
    /// the number of distinct payments ever seen.
    async fn release_payment_lock(&self, payment_id: u32) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(&payment_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&payment_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::appointment::Appointment;
    use crate::domain::payment::Amount;
    use crate::domain::ports::{AppointmentStore, Clock, NotificationStore, PaymentStore};
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::gateway::SandboxGateway;
    use crate::infrastructure::in_memory::{
        InMemoryAppointmentStore, InMemoryNotificationStore, InMemoryPaymentStore,
        InMemoryPreferenceStore, InMemoryTaskQueue,
    };
    use chrono::Duration;
    use rust_decimal_macros::dec;

    struct Harness {
        payments: InMemoryPaymentStore,
        appointments: InMemoryAppointmentStore,
        notifications: InMemoryNotificationStore,
        queue: InMemoryTaskQueue,
        gateway: SandboxGateway,
        clock: FixedClock,
        orchestrator: RefundOrchestrator,
    }

    fn harness() -> Harness {
        let payments = InMemoryPaymentStore::new();
        let appointments = InMemoryAppointmentStore::new();
        let notifications = InMemoryNotificationStore::new();
        let prefs = InMemoryPreferenceStore::new();
        let queue = InMemoryTaskQueue::new();
        let gateway = SandboxGateway::new();
        let clock = FixedClock::default();

        let dispatcher = NotificationDispatcher::new(
            Box::new(prefs),
            Box::new(notifications.clone()),
            Box::new(queue.clone()),
            Arc::new(clock.clone()),
        );
        let orchestrator = RefundOrchestrator::new(
            Box::new(payments.clone()),
            Box::new(appointments.clone()),
            Box::new(gateway.clone()),
            Arc::new(clock.clone()),
            dispatcher,
        );

        Harness {
            payments,
            appointments,
            notifications,
            queue,
            gateway,
            clock,
            orchestrator,
        }
    }

    /// Seeds a succeeded 150.00 payment whose appointment starts `hours`
    /// hours from the fixed clock's now.
    async fn seed_payment(h: &Harness, hours: i64) {
        let now = h.clock.now();
        let mut payment = Payment::new(1, 10, Some(5), Amount::new(dec!(150.00)).unwrap(), "pi_1");
        payment.mark_succeeded(now).unwrap();
        h.payments.store(payment).await.unwrap();
        h.appointments
            .store(Appointment::new(5, 10, 20, now + Duration::hours(hours)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_full_refund_flow() {
        let h = harness();
        seed_payment(&h, 50).await;

        let outcome = h.orchestrator.process_refund(1, "feeling better").await;

        assert!(outcome.success);
        assert_eq!(outcome.refund_type, RefundTier::Full);
        assert_eq!(outcome.refund_amount, dec!(150.00));
        assert!(outcome.gateway_ref.is_some());

        let calls = h.gateway.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].payment_intent_ref, "pi_1");
        assert_eq!(calls[0].amount_minor_units, 15000);
        assert_eq!(calls[0].idempotency_key, "refund-1");

        let payment = h.payments.get(1).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert_eq!(payment.refunded_at, Some(h.clock.now()));

        let rows = h.notifications.for_user(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category, "refund_processed");
        assert_eq!(h.queue.enqueued().await.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_refund_at_exact_boundary() {
        let h = harness();
        seed_payment(&h, 24).await;

        let outcome = h.orchestrator.process_refund(1, "schedule conflict").await;

        assert!(outcome.success);
        assert_eq!(outcome.refund_type, RefundTier::Partial);
        assert_eq!(outcome.refund_amount, dec!(75.00));
        assert_eq!(h.gateway.calls().await[0].amount_minor_units, 7500);
    }

    #[tokio::test]
    async fn test_no_refund_is_still_success() {
        let h = harness();
        seed_payment(&h, 2).await;

        let outcome = h.orchestrator.process_refund(1, "last minute").await;

        assert!(outcome.success);
        assert_eq!(outcome.refund_type, RefundTier::None);
        assert_eq!(outcome.refund_amount, Decimal::ZERO);
        assert!(h.gateway.calls().await.is_empty());

        // Payment untouched, payer told why.
        let payment = h.payments.get(1).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Succeeded);
        let rows = h.notifications.for_user(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category, "no_refund");
    }

    #[tokio::test]
    async fn test_already_refunded_is_rejected_without_gateway_call() {
        let h = harness();
        seed_payment(&h, 50).await;

        let first = h.orchestrator.process_refund(1, "cancel").await;
        assert!(first.success);

        let second = h.orchestrator.process_refund(1, "cancel again").await;
        assert!(!second.success);
        assert!(second.error.as_deref().unwrap().contains("already refunded"));
        assert_eq!(h.gateway.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_and_failed_payments_rejected() {
        let h = harness();
        let pending = Payment::new(2, 10, Some(5), Amount::new(dec!(10.0)).unwrap(), "pi_2");
        h.payments.store(pending).await.unwrap();

        let outcome = h.orchestrator.process_refund(2, "cancel").await;
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("not succeeded"));

        let mut failed = Payment::new(3, 10, Some(5), Amount::new(dec!(10.0)).unwrap(), "pi_3");
        failed.mark_failed().unwrap();
        h.payments.store(failed).await.unwrap();

        let outcome = h.orchestrator.process_refund(3, "cancel").await;
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("failed payment"));

        assert!(h.gateway.calls().await.is_empty());
        assert!(h.notifications.for_user(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_appointment_rejected() {
        let h = harness();
        let now = h.clock.now();
        let mut detached = Payment::new(4, 10, None, Amount::new(dec!(10.0)).unwrap(), "pi_4");
        detached.mark_succeeded(now).unwrap();
        h.payments.store(detached).await.unwrap();

        let outcome = h.orchestrator.process_refund(4, "cancel").await;
        assert!(!outcome.success);
        assert!(
            outcome
                .error
                .as_deref()
                .unwrap()
                .contains("no associated appointment")
        );
        assert!(h.gateway.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_payment_rejected() {
        let h = harness();
        let outcome = h.orchestrator.process_refund(99, "cancel").await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("payment not found"));
    }

    #[tokio::test]
    async fn test_gateway_rejection_leaves_payment_unchanged() {
        let h = harness();
        seed_payment(&h, 50).await;
        h.gateway.reject_with("payment intent not found").await;

        let outcome = h.orchestrator.process_refund(1, "cancel").await;

        assert!(!outcome.success);
        assert_eq!(outcome.refund_type, RefundTier::Full);
        assert!(
            outcome
                .error
                .as_deref()
                .unwrap()
                .contains("payment intent not found")
        );

        let payment = h.payments.get(1).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Succeeded);
        assert!(payment.refunded_at.is_none());
        // No notification on the failure path.
        assert!(h.notifications.for_user(10).await.unwrap().is_empty());
        assert!(h.queue.enqueued().await.is_empty());
    }

    #[tokio::test]
    async fn test_gateway_timeout_surfaces_as_failure() {
        let h = harness();
        seed_payment(&h, 50).await;
        h.gateway.time_out().await;

        let outcome = h.orchestrator.process_refund(1, "cancel").await;

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("timed out"));
        let payment = h.payments.get(1).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_payment_locks_released_after_processing() {
        let h = harness();
        seed_payment(&h, 50).await;

        h.orchestrator.process_refund(1, "cancel").await;
        h.orchestrator.process_refund(99, "unknown payment").await;

        // No entries linger once the calls complete.
        assert!(h.orchestrator.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_outcome_serializes_to_json() {
        let h = harness();
        seed_payment(&h, 2).await;

        let outcome = h.orchestrator.process_refund(1, "cancel").await;
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], serde_json::json!(true));
        assert_eq!(json["refund_type"], serde_json::json!("none"));
    }
}
