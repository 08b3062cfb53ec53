//! Ledger transaction types for chatledger.
//!
//! Every balance change appends exactly one `LedgerTransaction`. Rows are
//! never mutated or deleted afterwards; the ledger is the audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{TransactionId, UserId};

/// A committed ledger entry recording one balance change.
///
/// `amount_units` is signed: credits (deposit, refund, bonus) are positive,
/// usage debits are negative. The before/after snapshots satisfy
/// `balance_after_units == balance_before_units + amount_units`, and
/// `balance_after_units` equals the balance row's value at commit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Type of transaction.
    pub tx_type: TransactionType,

    /// Amount in minor units. Positive = credit, negative = debit.
    pub amount_units: i64,

    /// Account balance immediately before this transaction.
    pub balance_before_units: i64,

    /// Account balance immediately after this transaction.
    pub balance_after_units: i64,

    /// Human-readable description.
    pub description: String,

    /// Opaque metadata (model, token counts, mode, prompt preview, ...).
    /// Written by callers, never interpreted by the processor.
    pub metadata: serde_json::Value,

    /// Caller-supplied key making the operation at-most-once across retries.
    pub idempotency_key: String,

    /// Commit status. Only `completed` exists: commits are all-or-nothing.
    pub status: TransactionStatus,

    /// When the transaction was committed.
    pub created_at: DateTime<Utc>,
}

/// A request for the transaction processor: everything needed to append one
/// ledger entry, before the balance snapshots are known.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// The user whose balance to mutate.
    pub user_id: UserId,

    /// Type of transaction.
    pub tx_type: TransactionType,

    /// Signed amount in minor units.
    pub amount_units: i64,

    /// Human-readable description.
    pub description: String,

    /// Opaque metadata payload.
    pub metadata: serde_json::Value,

    /// Idempotency key, unique per logical operation.
    pub idempotency_key: String,
}

impl NewTransaction {
    /// Build a deposit (positive credit).
    #[must_use]
    pub fn deposit(
        user_id: UserId,
        amount_units: i64,
        description: String,
        metadata: serde_json::Value,
        idempotency_key: String,
    ) -> Self {
        Self {
            user_id,
            tx_type: TransactionType::Deposit,
            amount_units,
            description,
            metadata,
            idempotency_key,
        }
    }

    /// Build a usage charge. The amount is always stored negated so the
    /// ledger records debits as negative regardless of the caller's sign.
    #[must_use]
    pub fn usage(
        user_id: UserId,
        amount_units: i64,
        description: String,
        metadata: serde_json::Value,
        idempotency_key: String,
    ) -> Self {
        Self {
            user_id,
            tx_type: TransactionType::Usage,
            amount_units: -amount_units.abs(),
            description,
            metadata,
            idempotency_key,
        }
    }

    /// Build a refund (positive credit).
    #[must_use]
    pub fn refund(
        user_id: UserId,
        amount_units: i64,
        description: String,
        metadata: serde_json::Value,
        idempotency_key: String,
    ) -> Self {
        Self {
            user_id,
            tx_type: TransactionType::Refund,
            amount_units,
            description,
            metadata,
            idempotency_key,
        }
    }

    /// Build a bonus grant (positive credit).
    #[must_use]
    pub fn bonus(
        user_id: UserId,
        amount_units: i64,
        description: String,
        metadata: serde_json::Value,
        idempotency_key: String,
    ) -> Self {
        Self {
            user_id,
            tx_type: TransactionType::Bonus,
            amount_units,
            description,
            metadata,
            idempotency_key,
        }
    }

    /// Materialize the committed ledger entry given the balance snapshot the
    /// processor observed under lock.
    #[must_use]
    pub fn into_transaction(self, balance_before_units: i64) -> LedgerTransaction {
        LedgerTransaction {
            id: TransactionId::generate(),
            user_id: self.user_id,
            tx_type: self.tx_type,
            amount_units: self.amount_units,
            balance_before_units,
            balance_after_units: balance_before_units + self.amount_units,
            description: self.description,
            metadata: self.metadata,
            idempotency_key: self.idempotency_key,
            status: TransactionStatus::Completed,
            created_at: Utc::now(),
        }
    }
}

/// Type of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Externally verified payment credited to the balance.
    Deposit,

    /// Metered usage of a paid feature (debit).
    Usage,

    /// Credit returned after a failed or reversed charge.
    Refund,

    /// Promotional grant (e.g. the welcome bonus).
    Bonus,
}

impl TransactionType {
    /// Check if this transaction type adds funds (positive balance change).
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Deposit | Self::Refund | Self::Bonus)
    }

    /// Check if this transaction type removes funds (negative balance change).
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Usage)
    }

    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Usage => "usage",
            Self::Refund => "refund",
            Self::Bonus => "bonus",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "usage" => Ok(Self::Usage),
            "refund" => Ok(Self::Refund),
            "bonus" => Ok(Self::Bonus),
            other => Err(format!("unknown transaction type: {other}")),
        }
    }
}

/// Commit status of a ledger transaction.
///
/// No pending or failed state is modeled: the processor either commits the
/// whole transaction or writes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// The transaction committed and is visible in the ledger.
    Completed,
}

impl TransactionStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_amount_is_always_negative() {
        let user_id = UserId::generate();
        let tx = NewTransaction::usage(
            user_id,
            100,
            "LLM usage".into(),
            serde_json::json!({"model": "claude-3-5-sonnet"}),
            "key-1".into(),
        );
        assert_eq!(tx.amount_units, -100);

        // Negative input is normalized too.
        let tx = NewTransaction::usage(
            user_id,
            -250,
            "LLM usage".into(),
            serde_json::Value::Null,
            "key-2".into(),
        );
        assert_eq!(tx.amount_units, -250);
    }

    #[test]
    fn snapshots_are_consistent() {
        let user_id = UserId::generate();
        let tx = NewTransaction::deposit(
            user_id,
            1000,
            "Deposit".into(),
            serde_json::Value::Null,
            "key-3".into(),
        )
        .into_transaction(500);

        assert_eq!(tx.balance_before_units, 500);
        assert_eq!(tx.balance_after_units, 1500);
        assert_eq!(
            tx.balance_after_units,
            tx.balance_before_units + tx.amount_units
        );
        assert_eq!(tx.status, TransactionStatus::Completed);
    }

    #[test]
    fn transaction_type_is_credit_debit() {
        assert!(TransactionType::Deposit.is_credit());
        assert!(TransactionType::Refund.is_credit());
        assert!(TransactionType::Bonus.is_credit());
        assert!(!TransactionType::Usage.is_credit());

        assert!(TransactionType::Usage.is_debit());
        assert!(!TransactionType::Deposit.is_debit());
    }

    #[test]
    fn transaction_type_string_roundtrip() {
        for tx_type in [
            TransactionType::Deposit,
            TransactionType::Usage,
            TransactionType::Refund,
            TransactionType::Bonus,
        ] {
            let parsed: TransactionType = tx_type.as_str().parse().unwrap();
            assert_eq!(parsed, tx_type);
        }
        assert!("chargeback".parse::<TransactionType>().is_err());
    }
}
