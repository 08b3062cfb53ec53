//! Storage layer for chatledger.
//!
//! This crate owns the atomic transaction processor: the single writer to the
//! balance table and the transaction ledger. The [`LedgerStore`] trait
//! abstracts the backend; [`PgLedgerStore`] is the production PostgreSQL
//! implementation and [`MemoryStore`] mirrors its semantics for tests.
//!
//! # Atomicity
//!
//! `process_transaction` is the only operation that mutates a balance, and it
//! commits the balance mutation and the ledger append as one unit: either
//! both are visible or neither is. Concurrent calls for the same account
//! serialize on the balance row; correctness relies on the store's
//! transactional isolation, never on in-process locks held across requests.
//!
//! # Idempotency
//!
//! Every transaction carries a caller-supplied idempotency key with a unique
//! index behind it. Replaying a key returns the original transaction instead
//! of applying a second effect, so a caller that timed out can safely retry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;

use chatledger_core::{
    AccountBalance, ApiUsageRecord, DailyUsage, LedgerTransaction, NewTransaction, TransactionId,
    UserId,
};

/// The storage trait defining all ledger operations.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Create the balance row for a new account, starting at zero.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AccountAlreadyExists` if the row exists, or a
    /// database error.
    async fn create_account(&self, user_id: UserId, currency: &str) -> Result<AccountBalance>;

    /// Get the balance row for a user.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AccountNotFound` if no row exists.
    async fn balance(&self, user_id: UserId) -> Result<AccountBalance>;

    // =========================================================================
    // Transaction Processing
    // =========================================================================

    /// Atomically apply a balance change and append the ledger entry.
    ///
    /// Locks the account's balance row, validates the amount and (for debits)
    /// sufficiency, then writes the new balance and the transaction row in
    /// one atomic unit. If the idempotency key was already used, the original
    /// transaction is returned and nothing is written.
    ///
    /// # Errors
    ///
    /// - `StoreError::AccountNotFound` if no balance row exists.
    /// - `StoreError::InsufficientBalance` if a debit would go negative.
    /// - `StoreError::InvalidAmount` if the amount is zero.
    /// - `StoreError::Database` for underlying store failures; nothing was
    ///   written and the same key may be retried.
    async fn process_transaction(&self, new: NewTransaction) -> Result<LedgerTransaction>;

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::TransactionNotFound` if no row exists.
    async fn transaction(&self, transaction_id: TransactionId) -> Result<LedgerTransaction>;

    /// List a user's transactions, newest first, paginated.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn transactions_for_user(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerTransaction>>;

    // =========================================================================
    // Usage Audit (best-effort satellite, outside the atomic core)
    // =========================================================================

    /// Insert a usage audit record correlated to a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails. Failures here never
    /// roll back the transaction the record refers to.
    async fn record_api_usage(&self, record: &ApiUsageRecord) -> Result<()>;

    /// Daily usage rollups for the trailing `days`, newest day first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn usage_stats(&self, user_id: UserId, days: i64) -> Result<Vec<DailyUsage>>;
}
