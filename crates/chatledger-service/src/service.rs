//! The balance service façade.

use std::sync::Arc;

use serde::Serialize;

use chatledger_core::{
    message_charge_units, AccountBalance, ApiUsageRecord, ChatMode, DailyUsage, LedgerTransaction,
    NewTransaction, Result, UserId,
};
use chatledger_store::{LedgerStore, PgLedgerStore};

use crate::audit::AuditQueue;
use crate::config::ServiceConfig;

/// The API surface consumed by request handlers.
///
/// Every money-moving method delegates to the store's atomic transaction
/// processor with a fixed transaction type. Reads go straight through.
/// `log_api_usage` crosses the deliberate weak-consistency boundary: it is
/// queued best-effort and can never fail or roll back a charge.
pub struct BalanceService {
    store: Arc<dyn LedgerStore>,
    audit: AuditQueue,
    config: ServiceConfig,
}

/// Outcome of a pre-flight affordability check.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Quote {
    /// What the message would cost, in minor units.
    pub required_units: i64,

    /// Current balance in minor units: the same figure the processor
    /// validates debits against at commit time.
    pub balance_units: i64,

    /// Whether the charge fits. Handlers must not start the LLM call when
    /// this is false.
    pub affordable: bool,
}

impl BalanceService {
    /// Build the service on top of an existing store.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, config: ServiceConfig) -> Self {
        let audit = AuditQueue::spawn(
            store.clone(),
            config.audit_max_attempts,
            config.audit_backoff_ms,
        );
        Self {
            store,
            audit,
            config,
        }
    }

    /// Connect to PostgreSQL, run migrations, and build the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or migrations fail.
    pub async fn connect(config: ServiceConfig) -> Result<Self> {
        let store = PgLedgerStore::connect(&config.database_url, config.max_connections).await?;
        store.migrate().await?;
        tracing::info!(
            currency = %config.currency,
            welcome_bonus_units = %config.welcome_bonus_units,
            "balance service connected"
        );
        Ok(Self::new(Arc::new(store), config))
    }

    /// Stop the audit worker after draining pending records.
    pub async fn shutdown(self) {
        self.audit.shutdown().await;
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Create the balance row for a new account, in the configured currency.
    ///
    /// # Errors
    ///
    /// Fails if the account already has a balance row.
    pub async fn create_account(&self, user_id: UserId) -> Result<AccountBalance> {
        let balance = self
            .store
            .create_account(user_id, &self.config.currency)
            .await?;
        tracing::info!(user_id = %user_id, currency = %balance.currency, "account created");
        Ok(balance)
    }

    /// Read the current balance.
    ///
    /// # Errors
    ///
    /// Fails with `AccountNotFound` if no balance row exists.
    pub async fn balance(&self, user_id: UserId) -> Result<AccountBalance> {
        Ok(self.store.balance(user_id).await?)
    }

    // =========================================================================
    // Money movement
    // =========================================================================

    /// Credit an externally verified payment.
    ///
    /// The caller is responsible for deduplicating payment proofs before
    /// calling; the ledger's idempotency key is the second line of defense.
    ///
    /// # Errors
    ///
    /// Fails if the account does not exist or the amount is not positive.
    pub async fn deposit(
        &self,
        user_id: UserId,
        amount_units: i64,
        description: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Result<LedgerTransaction> {
        let amount_units = require_positive(amount_units)?;
        Ok(self
            .store
            .process_transaction(NewTransaction::deposit(
                user_id,
                amount_units,
                description.into(),
                metadata,
                fresh_idempotency_key(),
            ))
            .await?)
    }

    /// Debit metered usage of a paid feature.
    ///
    /// Pass the same `idempotency_key` when retrying after a timeout to get
    /// at-most-once semantics; with `None` a fresh key is generated.
    ///
    /// # Errors
    ///
    /// Surfaces `InsufficientBalance` distinctly so callers can map it to a
    /// payment-required response.
    pub async fn charge(
        &self,
        user_id: UserId,
        amount_units: i64,
        description: impl Into<String>,
        metadata: serde_json::Value,
        idempotency_key: Option<String>,
    ) -> Result<LedgerTransaction> {
        let amount_units = require_positive(amount_units)?;
        Ok(self
            .store
            .process_transaction(NewTransaction::usage(
                user_id,
                amount_units,
                description.into(),
                metadata,
                idempotency_key.unwrap_or_else(fresh_idempotency_key),
            ))
            .await?)
    }

    /// Credit back a previous charge (e.g. after a provider failure).
    ///
    /// # Errors
    ///
    /// Fails if the account does not exist or the amount is not positive.
    pub async fn refund(
        &self,
        user_id: UserId,
        amount_units: i64,
        description: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Result<LedgerTransaction> {
        let amount_units = require_positive(amount_units)?;
        Ok(self
            .store
            .process_transaction(NewTransaction::refund(
                user_id,
                amount_units,
                description.into(),
                metadata,
                fresh_idempotency_key(),
            ))
            .await?)
    }

    /// Credit a promotional grant.
    ///
    /// # Errors
    ///
    /// Fails if the account does not exist or the amount is not positive.
    pub async fn bonus(
        &self,
        user_id: UserId,
        amount_units: i64,
        description: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Result<LedgerTransaction> {
        let amount_units = require_positive(amount_units)?;
        Ok(self
            .store
            .process_transaction(NewTransaction::bonus(
                user_id,
                amount_units,
                description.into(),
                metadata,
                fresh_idempotency_key(),
            ))
            .await?)
    }

    /// Grant the configured welcome bonus to a new account, best-effort.
    ///
    /// Registration must not abort because a bonus failed, so errors are
    /// logged and swallowed here.
    pub async fn grant_welcome_bonus(&self, user_id: UserId) {
        let result = self
            .bonus(
                user_id,
                self.config.welcome_bonus_units,
                "Welcome bonus",
                serde_json::json!({ "source": "registration" }),
            )
            .await;

        if let Err(err) = result {
            tracing::warn!(user_id = %user_id, error = %err, "welcome bonus failed");
        }
    }

    // =========================================================================
    // Pricing and affordability
    // =========================================================================

    /// Price a message in the given mode, in minor units.
    #[must_use]
    pub fn quote(&self, mode: ChatMode, message: &str) -> i64 {
        message_charge_units(mode, message)
    }

    /// Price a message and compare it against the current balance.
    ///
    /// Handlers call this before the LLM request starts, so an unaffordable
    /// request is rejected before any provider-side money is spent.
    ///
    /// # Errors
    ///
    /// Fails with `AccountNotFound` if no balance row exists.
    pub async fn check_affordable(
        &self,
        user_id: UserId,
        mode: ChatMode,
        message: &str,
    ) -> Result<Quote> {
        let required_units = self.quote(mode, message);
        let balance = self.store.balance(user_id).await?;

        Ok(Quote {
            required_units,
            balance_units: balance.balance_units,
            affordable: balance.can_afford(required_units),
        })
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// List the user's transactions, newest first.
    ///
    /// # Errors
    ///
    /// Fails if the underlying store errors.
    pub async fn transaction_history(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerTransaction>> {
        Ok(self
            .store
            .transactions_for_user(user_id, limit, offset)
            .await?)
    }

    /// Record a usage audit row correlated to a committed transaction.
    ///
    /// Queued best-effort: never fails the caller and never rolls back the
    /// transaction it refers to.
    pub fn log_api_usage(&self, record: ApiUsageRecord) {
        self.audit.submit(record);
    }

    /// Daily usage rollups for the trailing `days`, newest first.
    ///
    /// # Errors
    ///
    /// Fails if the underlying store errors.
    pub async fn usage_stats(&self, user_id: UserId, days: i64) -> Result<Vec<DailyUsage>> {
        Ok(self.store.usage_stats(user_id, days).await?)
    }
}

fn fresh_idempotency_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn require_positive(amount_units: i64) -> Result<i64> {
    if amount_units <= 0 {
        return Err(chatledger_core::LedgerError::InvalidAmount(format!(
            "amount must be positive, got {amount_units}"
        )));
    }
    Ok(amount_units)
}
