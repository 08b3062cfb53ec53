//! Error types for chatledger.

use crate::ids::IdError;

/// Result type for chatledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in ledger operations.
///
/// All ledger-affecting errors abort the atomic unit with no partial state.
/// A duplicate idempotency key is deliberately *not* an error: the processor
/// resolves it to the original transaction's outcome.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// No balance row exists for the user. Never auto-created.
    #[error("account not found: {user_id}")]
    AccountNotFound {
        /// The user ID that was not found.
        user_id: String,
    },

    /// A debit would drive the balance below zero. Surfaced distinctly so
    /// callers can map it to a payment-required response.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Current balance in minor units.
        balance: i64,
        /// Required amount in minor units.
        required: i64,
    },

    /// Transaction not found.
    #[error("transaction not found: {transaction_id}")]
    TransactionNotFound {
        /// The transaction ID that was not found.
        transaction_id: String,
    },

    /// A balance row already exists for the user.
    #[error("account already exists: {user_id}")]
    AccountAlreadyExists {
        /// The user ID that already exists.
        user_id: String,
    },

    /// The amount is not acceptable (zero, or wrong sign for the operation).
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Underlying store unreachable or erroring. Transient; safe to retry
    /// with the same idempotency key.
    #[error("storage error: {0}")]
    Storage(String),

    /// A stored row could not be decoded into its domain type.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl LedgerError {
    /// Whether retrying the operation with the same idempotency key is safe
    /// and potentially useful.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
