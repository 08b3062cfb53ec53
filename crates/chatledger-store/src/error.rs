//! Error types for chatledger storage.

use chatledger_core::LedgerError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No balance row for the requested user.
    #[error("account not found: {user_id}")]
    AccountNotFound {
        /// The user ID that was not found.
        user_id: String,
    },

    /// No transaction with the requested ID.
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

    /// A debit would drive the balance below zero.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Current balance in minor units.
        balance: i64,
        /// Required amount in minor units.
        required: i64,
    },

    /// The amount is not acceptable for the operation.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// A stored row could not be decoded into its domain type.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound { user_id } => Self::AccountNotFound { user_id },
            StoreError::TransactionNotFound { transaction_id } => {
                Self::TransactionNotFound { transaction_id }
            }
            StoreError::AccountAlreadyExists { user_id } => Self::AccountAlreadyExists { user_id },
            StoreError::InsufficientBalance { balance, required } => {
                Self::InsufficientBalance { balance, required }
            }
            StoreError::InvalidAmount(msg) => Self::InvalidAmount(msg),
            StoreError::Database(msg) => Self::Storage(msg),
            StoreError::Serialization(msg) => Self::Serialization(msg),
        }
    }
}
