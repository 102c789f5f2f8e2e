//! Status updates derived from a webhook event.

use crate::providers::{PaymentStatus, WebhookEventType};
use crate::store::{AgreementStatus, DebtStatus, NotificationKind};

/// What a webhook changes. `None` fields stay as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub payment_status: Option<PaymentStatus>,
    pub agreement_status: Option<AgreementStatus>,
    pub debt_status: Option<DebtStatus>,
    pub notification: Option<NotificationKind>,
    /// Set when this update is the one that marks the payment received.
    pub payment_received: bool,
}

impl StatusUpdate {
    pub fn is_noop(&self) -> bool {
        self.payment_status.is_none() && self.agreement_status.is_none()
    }
}

struct Target {
    payment: Option<PaymentStatus>,
    agreement: Option<AgreementStatus>,
    debt: Option<DebtStatus>,
    notification: Option<NotificationKind>,
}

fn target_for(event: WebhookEventType) -> Target {
    use WebhookEventType::*;
    match event {
        PaymentReceived => Target {
            payment: Some(PaymentStatus::Received),
            agreement: Some(AgreementStatus::Paid),
            debt: Some(DebtStatus::Paid),
            notification: Some(NotificationKind::PaymentConfirmed),
        },
        PaymentRefunded => Target {
            payment: Some(PaymentStatus::Refunded),
            agreement: Some(AgreementStatus::Cancelled),
            debt: Some(DebtStatus::Open),
            notification: None,
        },
        // The vendor drops the charge; the payment keeps its last status.
        PaymentDeleted => Target {
            payment: None,
            agreement: Some(AgreementStatus::Cancelled),
            debt: Some(DebtStatus::Open),
            notification: None,
        },
        PaymentConfirmed => Target {
            payment: Some(PaymentStatus::Confirmed),
            agreement: None,
            debt: None,
            notification: Some(NotificationKind::PaymentProcessing),
        },
        PaymentOverdue => Target {
            payment: Some(PaymentStatus::Overdue),
            agreement: None,
            debt: None,
            notification: Some(NotificationKind::PaymentOverdue),
        },
        PaymentCreated => Target {
            payment: Some(PaymentStatus::Pending),
            agreement: None,
            debt: None,
            notification: None,
        },
    }
}

/// Compute the update for `event` given the agreement's current statuses.
///
/// Payment and agreement targets are guarded separately: a target the current
/// status cannot legally move to is dropped, so a stale or repeated delivery
/// yields a no-op instead of resurrecting a settled agreement. A cancelled
/// agreement accepts nothing further. The debt follows any status change;
/// notifications only follow a payment status change.
pub fn derive_status_update(
    event: WebhookEventType,
    current_payment: PaymentStatus,
    current_agreement: AgreementStatus,
) -> StatusUpdate {
    if current_agreement == AgreementStatus::Cancelled {
        return StatusUpdate::default();
    }
    let target = target_for(event);

    let payment_status = target
        .payment
        .filter(|next| *next != current_payment && current_payment.can_transition_to(*next));

    let agreement_status = target
        .agreement
        .filter(|next| *next != current_agreement && current_agreement.can_transition_to(*next));

    let changed = payment_status.is_some() || agreement_status.is_some();
    StatusUpdate {
        payment_status,
        agreement_status,
        debt_status: target.debt.filter(|_| changed),
        notification: target.notification.filter(|_| payment_status.is_some()),
        payment_received: payment_status == Some(PaymentStatus::Received),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_received_from_pending() {
        let update = derive_status_update(
            WebhookEventType::PaymentReceived,
            PaymentStatus::Pending,
            AgreementStatus::Active,
        );
        assert_eq!(update.payment_status, Some(PaymentStatus::Received));
        assert_eq!(update.agreement_status, Some(AgreementStatus::Paid));
        assert_eq!(update.debt_status, Some(DebtStatus::Paid));
        assert_eq!(update.notification, Some(NotificationKind::PaymentConfirmed));
        assert!(update.payment_received);
    }

    #[test]
    fn test_repeated_received_is_noop() {
        let update = derive_status_update(
            WebhookEventType::PaymentReceived,
            PaymentStatus::Received,
            AgreementStatus::Paid,
        );
        assert!(update.is_noop());
        assert_eq!(update.notification, None);
        assert_eq!(update.debt_status, None);
    }

    #[test]
    fn test_stale_overdue_after_received_is_ignored() {
        let update = derive_status_update(
            WebhookEventType::PaymentOverdue,
            PaymentStatus::Received,
            AgreementStatus::Paid,
        );
        assert!(update.is_noop());
    }

    #[test]
    fn test_refund_cancels_agreement_and_reopens_debt() {
        let update = derive_status_update(
            WebhookEventType::PaymentRefunded,
            PaymentStatus::Received,
            AgreementStatus::Paid,
        );
        assert_eq!(update.payment_status, Some(PaymentStatus::Refunded));
        assert_eq!(update.agreement_status, Some(AgreementStatus::Cancelled));
        assert_eq!(update.debt_status, Some(DebtStatus::Open));
        assert_eq!(update.notification, None);
    }

    #[test]
    fn test_confirmed_and_overdue_oscillate() {
        let overdue = derive_status_update(
            WebhookEventType::PaymentOverdue,
            PaymentStatus::Confirmed,
            AgreementStatus::Active,
        );
        assert_eq!(overdue.payment_status, Some(PaymentStatus::Overdue));
        assert_eq!(overdue.agreement_status, None);
        assert_eq!(overdue.notification, Some(NotificationKind::PaymentOverdue));

        let back = derive_status_update(
            WebhookEventType::PaymentConfirmed,
            PaymentStatus::Overdue,
            AgreementStatus::Active,
        );
        assert_eq!(back.payment_status, Some(PaymentStatus::Confirmed));
        assert_eq!(back.notification, Some(NotificationKind::PaymentProcessing));
    }

    #[test]
    fn test_created_never_rewinds() {
        assert!(derive_status_update(
            WebhookEventType::PaymentCreated,
            PaymentStatus::Pending,
            AgreementStatus::Pending,
        )
        .is_noop());
        assert!(derive_status_update(
            WebhookEventType::PaymentCreated,
            PaymentStatus::Confirmed,
            AgreementStatus::Active,
        )
        .is_noop());
    }

    #[test]
    fn test_refund_cancels_from_any_open_state() {
        for (payment, agreement) in [
            (PaymentStatus::Pending, AgreementStatus::Active),
            (PaymentStatus::Overdue, AgreementStatus::Active),
            (PaymentStatus::Confirmed, AgreementStatus::Pending),
        ] {
            let update =
                derive_status_update(WebhookEventType::PaymentRefunded, payment, agreement);
            assert_eq!(
                update.payment_status,
                Some(PaymentStatus::Refunded),
                "from {}",
                payment
            );
            assert_eq!(update.agreement_status, Some(AgreementStatus::Cancelled));
            assert_eq!(update.debt_status, Some(DebtStatus::Open));
            assert_eq!(update.notification, None);
        }
    }

    #[test]
    fn test_refund_already_recorded_still_cancels_agreement() {
        let update = derive_status_update(
            WebhookEventType::PaymentRefunded,
            PaymentStatus::Refunded,
            AgreementStatus::Paid,
        );
        assert_eq!(update.payment_status, None);
        assert_eq!(update.agreement_status, Some(AgreementStatus::Cancelled));
        assert_eq!(update.debt_status, Some(DebtStatus::Open));
    }

    #[test]
    fn test_deleted_cancels_without_touching_payment_status() {
        for payment in [PaymentStatus::Pending, PaymentStatus::Received] {
            let update = derive_status_update(
                WebhookEventType::PaymentDeleted,
                payment,
                AgreementStatus::Paid,
            );
            assert_eq!(update.payment_status, None);
            assert_eq!(update.agreement_status, Some(AgreementStatus::Cancelled));
            assert_eq!(update.debt_status, Some(DebtStatus::Open));
            assert!(!update.is_noop());
        }
    }

    #[test]
    fn test_cancelled_agreement_is_frozen() {
        for event in WebhookEventType::ALL {
            let update =
                derive_status_update(event, PaymentStatus::Pending, AgreementStatus::Cancelled);
            assert!(update.is_noop(), "{} on a cancelled agreement", event);
            assert_eq!(update.debt_status, None);
            assert_eq!(update.notification, None);
        }
    }
}
