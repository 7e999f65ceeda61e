//! Payment transaction domain entity and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::booking::{Position, TeamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Created,
    Authorized,
    Captured,
    Failed,
    Refunded,
    Abandoned,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Created => "created",
            TxStatus::Authorized => "authorized",
            TxStatus::Captured => "captured",
            TxStatus::Failed => "failed",
            TxStatus::Refunded => "refunded",
            TxStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(TxStatus::Created),
            "authorized" => Some(TxStatus::Authorized),
            "captured" => Some(TxStatus::Captured),
            "failed" => Some(TxStatus::Failed),
            "refunded" => Some(TxStatus::Refunded),
            "abandoned" => Some(TxStatus::Abandoned),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TxStatus::Authorized | TxStatus::Captured)
    }

    /// Allowed edges of the payment lifecycle. Success is only reachable from `created`.
    pub fn can_transition_to(&self, next: TxStatus) -> bool {
        use TxStatus::*;
        matches!(
            (self, next),
            (Created, Authorized | Captured | Failed | Abandoned)
                | (Authorized | Captured, Refunded)
        )
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    Credit,
    Gateway,
    Combined,
    InPerson,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Credit => "credit",
            PaymentMethod::Gateway => "gateway",
            PaymentMethod::Combined => "combined",
            PaymentMethod::InPerson => "in-person",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "credit" => Some(PaymentMethod::Credit),
            "gateway" => Some(PaymentMethod::Gateway),
            "combined" => Some(PaymentMethod::Combined),
            "in-person" => Some(PaymentMethod::InPerson),
            _ => None,
        }
    }
}

/// The roster position a joining player pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTarget {
    pub team: TeamId,
    pub position: Position,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionNotes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinTarget>,
    /// Set on compensation ledger entries: the transaction being refunded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_of: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transaction cannot move from {from} to {to}")]
pub struct TransitionError {
    pub from: TxStatus,
    pub to: TxStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub booking_ids: Vec<Uuid>,
    /// Players whose roster entries this transaction pays for.
    pub paid_for: Vec<Uuid>,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub status: TxStatus,
    pub method: PaymentMethod,
    pub credit_used: i64,
    pub credit_reserved: bool,
    pub credit_deducted: bool,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub webhook_verified: bool,
    pub notes: TransactionNotes,
    pub refunded_amount: i64,
    pub refund_id: Option<String>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: i64,
}

impl Transaction {
    pub fn new(
        user_id: Uuid,
        booking_ids: Vec<Uuid>,
        paid_for: Vec<Uuid>,
        amount: i64,
        currency: String,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            booking_ids,
            paid_for,
            amount,
            currency,
            status: TxStatus::Created,
            method,
            credit_used: 0,
            credit_reserved: false,
            credit_deducted: false,
            gateway_order_id: None,
            gateway_payment_id: None,
            gateway_signature: None,
            webhook_verified: false,
            notes: TransactionNotes::default(),
            refunded_amount: 0,
            refund_id: None,
            failure_reason: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Part of the amount charged through the gateway.
    pub fn gateway_portion(&self) -> i64 {
        self.amount - self.credit_used
    }

    /// Credit still held against the owner's balance.
    pub fn holds_credit(&self) -> bool {
        self.credit_reserved && !self.credit_deducted && self.status == TxStatus::Created
    }

    /// Ledger entry recording a pro-rated credit refund of `source`.
    pub fn refund_entry(
        source: &Transaction,
        booking_id: Uuid,
        amount: i64,
        credit_portion: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let mut entry = Transaction::new(
            source.user_id,
            vec![booking_id],
            source.paid_for.clone(),
            amount,
            source.currency.clone(),
            PaymentMethod::Credit,
            now,
        );
        entry.status = TxStatus::Refunded;
        entry.credit_used = credit_portion;
        entry.refunded_amount = amount;
        entry.notes.refund_of = Some(source.id);
        entry
    }

    /// Ledger entry for a gateway payment that arrived on an order whose transaction was
    /// already settled. The whole payment goes back to the payer's stored credit.
    pub fn returned_payment_entry(
        source: &Transaction,
        payment_id: &str,
        amount: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let mut entry = Transaction::new(
            source.user_id,
            source.booking_ids.clone(),
            Vec::new(),
            amount,
            source.currency.clone(),
            PaymentMethod::Gateway,
            now,
        );
        entry.status = TxStatus::Refunded;
        entry.gateway_payment_id = Some(payment_id.to_string());
        entry.webhook_verified = true;
        entry.paid_at = Some(now);
        entry.refunded_amount = amount;
        entry.failure_reason = Some(reason.to_string());
        entry.notes.refund_of = Some(source.id);
        entry
    }

    /// Settles money that arrived for a transaction that can no longer be fulfilled:
    /// the gateway-paid portion went back to stored credit.
    pub fn mark_compensated(&mut self, refunded: i64, reason: &str, now: DateTime<Utc>) {
        self.status = TxStatus::Refunded;
        self.refunded_amount = refunded;
        self.failure_reason = Some(reason.to_string());
        self.updated_at = now;
    }

    pub fn transition(&mut self, next: TxStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn() -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            vec![Uuid::new_v4()],
            vec![],
            400,
            "INR".to_string(),
            PaymentMethod::Combined,
            Utc::now(),
        )
    }

    #[test]
    fn created_is_the_only_entry_state() {
        let t = txn();
        assert_eq!(t.status, TxStatus::Created);
    }

    #[test]
    fn success_paths() {
        assert!(TxStatus::Created.can_transition_to(TxStatus::Captured));
        assert!(TxStatus::Created.can_transition_to(TxStatus::Authorized));
        assert!(TxStatus::Captured.can_transition_to(TxStatus::Refunded));
        assert!(TxStatus::Authorized.can_transition_to(TxStatus::Refunded));
    }

    #[test]
    fn abandoned_only_from_created() {
        assert!(TxStatus::Created.can_transition_to(TxStatus::Abandoned));
        for from in [
            TxStatus::Authorized,
            TxStatus::Captured,
            TxStatus::Failed,
            TxStatus::Refunded,
            TxStatus::Abandoned,
        ] {
            assert!(!from.can_transition_to(TxStatus::Abandoned), "{from}");
        }
    }

    #[test]
    fn terminal_states_stay_put() {
        assert!(!TxStatus::Failed.can_transition_to(TxStatus::Captured));
        assert!(!TxStatus::Failed.can_transition_to(TxStatus::Authorized));
        assert!(!TxStatus::Refunded.can_transition_to(TxStatus::Captured));
        assert!(!TxStatus::Abandoned.can_transition_to(TxStatus::Captured));
        assert!(!TxStatus::Captured.can_transition_to(TxStatus::Failed));
        assert!(!TxStatus::Created.can_transition_to(TxStatus::Refunded));
    }

    #[test]
    fn transition_rejects_illegal_edge() {
        let mut t = txn();
        let err = t.transition(TxStatus::Refunded, Utc::now()).unwrap_err();
        assert_eq!(err.from, TxStatus::Created);
        assert_eq!(t.status, TxStatus::Created);
    }

    #[test]
    fn hold_only_while_created() {
        let mut t = txn();
        t.credit_used = 100;
        t.credit_reserved = true;
        assert!(t.holds_credit());
        assert_eq!(t.gateway_portion(), 300);

        t.transition(TxStatus::Failed, Utc::now()).unwrap();
        assert!(!t.holds_credit());
    }

    #[test]
    fn returned_payment_entry_points_at_source() {
        let source = txn();
        let entry = Transaction::returned_payment_entry(
            &source,
            "pay_2",
            300,
            "duplicate_payment",
            Utc::now(),
        );
        assert_eq!(entry.user_id, source.user_id);
        assert_eq!(entry.status, TxStatus::Refunded);
        assert_eq!(entry.refunded_amount, 300);
        assert_eq!(entry.gateway_order_id, None);
        assert_eq!(entry.gateway_payment_id.as_deref(), Some("pay_2"));
        assert_eq!(entry.notes.refund_of, Some(source.id));
        assert!(entry.paid_for.is_empty());
    }

    #[test]
    fn method_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::InPerson).unwrap(),
            "\"in-person\""
        );
        assert_eq!(PaymentMethod::parse("in-person"), Some(PaymentMethod::InPerson));
    }
}
