//! PostgreSQL storage implementation.
//!
//! The atomic transaction processor is an explicit application-level
//! transaction: begin, `SELECT .. FOR UPDATE` the balance row, validate,
//! insert the ledger row, update the balance, commit. Row-level locking makes
//! concurrent operations on the same account serialize; accounts never block
//! each other.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use chatledger_core::{
    AccountBalance, ApiUsageRecord, DailyUsage, LedgerTransaction, NewTransaction, TransactionId,
    TransactionStatus, UserId,
};

use crate::error::{Result, StoreError};
use crate::LedgerStore;

const SELECT_TRANSACTION_COLUMNS: &str = "SELECT id, user_id, tx_type, amount_units, \
     balance_before_units, balance_after_units, description, metadata, idempotency_key, \
     status, created_at FROM transactions";

/// PostgreSQL-backed ledger store.
///
/// Holds a connection pool with explicit lifecycle: open it at process start
/// with [`PgLedgerStore::connect`], pass the store around by reference or
/// `Arc`, and let the pool close at shutdown. No singleton.
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Connect to the database and build a pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (e.g. one shared with other subsystems).
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails to apply.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
        executor: impl sqlx::PgExecutor<'_>,
    ) -> Result<Option<LedgerTransaction>> {
        let sql = format!("{SELECT_TRANSACTION_COLUMNS} WHERE idempotency_key = $1");
        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(key)
            .fetch_optional(executor)
            .await?;
        row.map(TransactionRow::into_transaction).transpose()
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn create_account(&self, user_id: UserId, currency: &str) -> Result<AccountBalance> {
        let inserted: std::result::Result<BalanceRow, sqlx::Error> = sqlx::query_as(
            "INSERT INTO balances (user_id, currency) VALUES ($1, $2) \
             RETURNING user_id, balance_units, locked_units, currency, created_at, updated_at",
        )
        .bind(user_id.as_uuid())
        .bind(currency)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(row) => Ok(row.into_balance()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::AccountAlreadyExists {
                user_id: user_id.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn balance(&self, user_id: UserId) -> Result<AccountBalance> {
        let row: Option<BalanceRow> = sqlx::query_as(
            "SELECT user_id, balance_units, locked_units, currency, created_at, updated_at \
             FROM balances WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(BalanceRow::into_balance)
            .ok_or_else(|| StoreError::AccountNotFound {
                user_id: user_id.to_string(),
            })
    }

    // =========================================================================
    // Transaction Processing
    // =========================================================================

    async fn process_transaction(&self, new: NewTransaction) -> Result<LedgerTransaction> {
        if new.amount_units == 0 {
            return Err(StoreError::InvalidAmount("amount must be non-zero".into()));
        }

        let mut tx = self.pool.begin().await?;

        // Replay: a retried key resolves to the original outcome, no writes.
        if let Some(existing) = self
            .find_by_idempotency_key(&new.idempotency_key, &mut *tx)
            .await?
        {
            tracing::debug!(
                user_id = %new.user_id,
                idempotency_key = %new.idempotency_key,
                transaction_id = %existing.id,
                "idempotent replay, returning original transaction"
            );
            return Ok(existing);
        }

        let balance_before: Option<i64> =
            sqlx::query_scalar("SELECT balance_units FROM balances WHERE user_id = $1 FOR UPDATE")
                .bind(new.user_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

        let Some(balance_before) = balance_before else {
            return Err(StoreError::AccountNotFound {
                user_id: new.user_id.to_string(),
            });
        };

        // The row lock serializes same-account writers, so a same-key racer
        // that waited on it resumes here after the winner committed. Check
        // the key again before validating, or the loser would judge the
        // already-debited balance and report a failure for a charge that
        // committed.
        if let Some(existing) = self
            .find_by_idempotency_key(&new.idempotency_key, &mut *tx)
            .await?
        {
            tracing::debug!(
                user_id = %new.user_id,
                idempotency_key = %new.idempotency_key,
                transaction_id = %existing.id,
                "idempotent replay after lock wait, returning original transaction"
            );
            return Ok(existing);
        }

        if new.amount_units < 0 && balance_before + new.amount_units < 0 {
            return Err(StoreError::InsufficientBalance {
                balance: balance_before,
                required: -new.amount_units,
            });
        }

        let idempotency_key = new.idempotency_key.clone();
        let entry = new.into_transaction(balance_before);

        sqlx::query("UPDATE balances SET balance_units = $2, updated_at = NOW() WHERE user_id = $1")
            .bind(entry.user_id.as_uuid())
            .bind(entry.balance_after_units)
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query(
            "INSERT INTO transactions \
             (id, user_id, tx_type, amount_units, balance_before_units, balance_after_units, \
              description, metadata, idempotency_key, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(entry.id.to_string())
        .bind(entry.user_id.as_uuid())
        .bind(entry.tx_type.as_str())
        .bind(entry.amount_units)
        .bind(entry.balance_before_units)
        .bind(entry.balance_after_units)
        .bind(&entry.description)
        .bind(&entry.metadata)
        .bind(&entry.idempotency_key)
        .bind(entry.status.as_str())
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await?;
                tracing::info!(
                    user_id = %entry.user_id,
                    transaction_id = %entry.id,
                    tx_type = %entry.tx_type,
                    amount_units = %entry.amount_units,
                    balance_after_units = %entry.balance_after_units,
                    "ledger transaction committed"
                );
                Ok(entry)
            }
            Err(err) if is_unique_violation(&err) => {
                // Lost a same-key race after our replay check; the dropped
                // `tx` rolls back and the winner's row is the outcome.
                drop(tx);
                self.find_by_idempotency_key(&idempotency_key, &self.pool)
                    .await?
                    .ok_or_else(|| {
                        StoreError::Database(format!(
                            "unique violation for idempotency key {idempotency_key} but no row found"
                        ))
                    })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn transaction(&self, transaction_id: TransactionId) -> Result<LedgerTransaction> {
        let sql = format!("{SELECT_TRANSACTION_COLUMNS} WHERE id = $1");
        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(transaction_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TransactionRow::into_transaction)
            .transpose()?
            .ok_or_else(|| StoreError::TransactionNotFound {
                transaction_id: transaction_id.to_string(),
            })
    }

    async fn transactions_for_user(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerTransaction>> {
        let sql = format!(
            "{SELECT_TRANSACTION_COLUMNS} WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
            .bind(user_id.as_uuid())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(TransactionRow::into_transaction)
            .collect()
    }

    // =========================================================================
    // Usage Audit
    // =========================================================================

    async fn record_api_usage(&self, record: &ApiUsageRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO api_usage \
             (user_id, transaction_id, model, tokens_used, cost_units, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.user_id.as_uuid())
        .bind(record.transaction_id.to_string())
        .bind(&record.model)
        .bind(record.tokens_used)
        .bind(record.cost_units)
        .bind(&record.metadata)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn usage_stats(&self, user_id: UserId, days: i64) -> Result<Vec<DailyUsage>> {
        let days = i32::try_from(days.max(0)).unwrap_or(i32::MAX);

        let rows = sqlx::query(
            "SELECT (created_at AT TIME ZONE 'UTC')::date AS day, model, \
                    COUNT(*) AS requests, \
                    COALESCE(SUM(tokens_used), 0)::bigint AS tokens, \
                    COALESCE(SUM(cost_units), 0)::bigint AS cost \
             FROM api_usage \
             WHERE user_id = $1 AND created_at > NOW() - make_interval(days => $2) \
             GROUP BY 1, 2 \
             ORDER BY 1 DESC",
        )
        .bind(user_id.as_uuid())
        .bind(days)
        .fetch_all(&self.pool)
        .await?;

        let mut stats: Vec<DailyUsage> = Vec::new();
        for row in rows {
            let day: NaiveDate = row.try_get("day")?;
            let model: String = row.try_get("model")?;
            let requests: i64 = row.try_get("requests")?;
            let tokens: i64 = row.try_get("tokens")?;
            let cost: i64 = row.try_get("cost")?;

            match stats.last_mut() {
                Some(entry) if entry.date == day => {
                    entry.request_count += requests;
                    entry.total_tokens += tokens;
                    entry.total_cost_units += cost;
                    entry.models_used.insert(model, requests);
                }
                _ => {
                    let mut entry = DailyUsage::empty(day);
                    entry.request_count = requests;
                    entry.total_tokens = tokens;
                    entry.total_cost_units = cost;
                    entry.models_used.insert(model, requests);
                    stats.push(entry);
                }
            }
        }

        Ok(stats)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err.as_database_error().map(sqlx::error::DatabaseError::kind),
        Some(sqlx::error::ErrorKind::UniqueViolation)
    )
}

/// Raw balance row as stored.
#[derive(sqlx::FromRow)]
struct BalanceRow {
    user_id: uuid::Uuid,
    balance_units: i64,
    locked_units: i64,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BalanceRow {
    fn into_balance(self) -> AccountBalance {
        AccountBalance {
            user_id: UserId::from_uuid(self.user_id),
            balance_units: self.balance_units,
            locked_units: self.locked_units,
            currency: self.currency,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Raw transaction row as stored.
#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: String,
    user_id: uuid::Uuid,
    tx_type: String,
    amount_units: i64,
    balance_before_units: i64,
    balance_after_units: i64,
    description: String,
    metadata: serde_json::Value,
    idempotency_key: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_transaction(self) -> Result<LedgerTransaction> {
        let id = self
            .id
            .parse()
            .map_err(|_| StoreError::Serialization(format!("bad transaction id: {}", self.id)))?;
        let tx_type = self
            .tx_type
            .parse()
            .map_err(StoreError::Serialization)?;
        if self.status != TransactionStatus::Completed.as_str() {
            return Err(StoreError::Serialization(format!(
                "unexpected transaction status: {}",
                self.status
            )));
        }

        Ok(LedgerTransaction {
            id,
            user_id: UserId::from_uuid(self.user_id),
            tx_type,
            amount_units: self.amount_units,
            balance_before_units: self.balance_before_units,
            balance_after_units: self.balance_after_units,
            description: self.description,
            metadata: self.metadata,
            idempotency_key: self.idempotency_key,
            status: TransactionStatus::Completed,
            created_at: self.created_at,
        })
    }
}
