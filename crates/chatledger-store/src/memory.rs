//! In-memory storage implementation.
//!
//! Mirrors the PostgreSQL processor's semantics exactly (validation order,
//! idempotent replay, snapshots) so ledger properties can be exercised in
//! tests without a database. A single mutex stands in for row-level locking;
//! it is never held across an await point.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};

use chatledger_core::{
    AccountBalance, ApiUsageRecord, DailyUsage, LedgerTransaction, NewTransaction, TransactionId,
    UserId,
};

use crate::error::{Result, StoreError};
use crate::LedgerStore;

/// In-memory ledger store for tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    balances: HashMap<UserId, AccountBalance>,
    transactions: Vec<LedgerTransaction>,
    by_id: HashMap<TransactionId, usize>,
    by_key: HashMap<String, usize>,
    usage: Vec<ApiUsageRecord>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn create_account(&self, user_id: UserId, currency: &str) -> Result<AccountBalance> {
        let mut inner = self.lock();
        if inner.balances.contains_key(&user_id) {
            return Err(StoreError::AccountAlreadyExists {
                user_id: user_id.to_string(),
            });
        }
        let balance = AccountBalance::new(user_id, currency);
        inner.balances.insert(user_id, balance.clone());
        Ok(balance)
    }

    async fn balance(&self, user_id: UserId) -> Result<AccountBalance> {
        self.lock()
            .balances
            .get(&user_id)
            .cloned()
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

        let mut inner = self.lock();

        if let Some(&idx) = inner.by_key.get(&new.idempotency_key) {
            return Ok(inner.transactions[idx].clone());
        }

        let balance_before = inner
            .balances
            .get(&new.user_id)
            .map(|b| b.balance_units)
            .ok_or_else(|| StoreError::AccountNotFound {
                user_id: new.user_id.to_string(),
            })?;

        if new.amount_units < 0 && balance_before + new.amount_units < 0 {
            return Err(StoreError::InsufficientBalance {
                balance: balance_before,
                required: -new.amount_units,
            });
        }

        let entry = new.into_transaction(balance_before);

        if let Some(balance) = inner.balances.get_mut(&entry.user_id) {
            balance.balance_units = entry.balance_after_units;
            balance.updated_at = entry.created_at;
        }

        let idx = inner.transactions.len();
        inner.by_id.insert(entry.id, idx);
        inner.by_key.insert(entry.idempotency_key.clone(), idx);
        inner.transactions.push(entry.clone());

        Ok(entry)
    }

    async fn transaction(&self, transaction_id: TransactionId) -> Result<LedgerTransaction> {
        let inner = self.lock();
        inner
            .by_id
            .get(&transaction_id)
            .map(|&idx| inner.transactions[idx].clone())
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
        let inner = self.lock();
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);

        Ok(inner
            .transactions
            .iter()
            .rev() // append order == commit order, so reversed is newest first
            .filter(|tx| tx.user_id == user_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    // =========================================================================
    // Usage Audit
    // =========================================================================

    async fn record_api_usage(&self, record: &ApiUsageRecord) -> Result<()> {
        self.lock().usage.push(record.clone());
        Ok(())
    }

    async fn usage_stats(&self, user_id: UserId, days: i64) -> Result<Vec<DailyUsage>> {
        let inner = self.lock();
        let cutoff = Utc::now() - Duration::days(days.max(0));

        let mut by_day: HashMap<NaiveDate, DailyUsage> = HashMap::new();
        for record in inner
            .usage
            .iter()
            .filter(|r| r.user_id == user_id && r.created_at > cutoff)
        {
            by_day
                .entry(record.created_at.date_naive())
                .or_insert_with(|| DailyUsage::empty(record.created_at.date_naive()))
                .absorb(record);
        }

        let mut stats: Vec<DailyUsage> = by_day.into_values().collect();
        stats.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatledger_core::TransactionType;

    async fn funded_account(store: &MemoryStore, units: i64) -> UserId {
        let user_id = UserId::generate();
        store.create_account(user_id, "USD").await.unwrap();
        if units > 0 {
            store
                .process_transaction(NewTransaction::deposit(
                    user_id,
                    units,
                    "Test deposit".into(),
                    serde_json::Value::Null,
                    uuid::Uuid::new_v4().to_string(),
                ))
                .await
                .unwrap();
        }
        user_id
    }

    #[tokio::test]
    async fn create_account_is_once_only() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();

        let balance = store.create_account(user_id, "USD").await.unwrap();
        assert_eq!(balance.balance_units, 0);

        let err = store.create_account(user_id, "USD").await.unwrap_err();
        assert!(matches!(err, StoreError::AccountAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn deposit_then_charge_roundtrip() {
        let store = MemoryStore::new();
        let user_id = funded_account(&store, 1000).await;

        let tx = store
            .process_transaction(NewTransaction::usage(
                user_id,
                400,
                "API usage".into(),
                serde_json::json!({"model": "sonnet"}),
                "charge-1".into(),
            ))
            .await
            .unwrap();

        assert_eq!(tx.tx_type, TransactionType::Usage);
        assert_eq!(tx.amount_units, -400);
        assert_eq!(tx.balance_before_units, 1000);
        assert_eq!(tx.balance_after_units, 600);

        let balance = store.balance(user_id).await.unwrap();
        assert_eq!(balance.balance_units, 600);
    }

    #[tokio::test]
    async fn insufficient_balance_writes_nothing() {
        let store = MemoryStore::new();
        let user_id = funded_account(&store, 100).await;

        let err = store
            .process_transaction(NewTransaction::usage(
                user_id,
                150,
                "API usage".into(),
                serde_json::Value::Null,
                "charge-too-big".into(),
            ))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::InsufficientBalance {
                balance: 100,
                required: 150
            }
        ));

        // Balance unchanged and no ledger row appended.
        assert_eq!(store.balance(user_id).await.unwrap().balance_units, 100);
        let history = store.transactions_for_user(user_id, 10, 0).await.unwrap();
        assert_eq!(history.len(), 1); // only the funding deposit
    }

    #[tokio::test]
    async fn idempotent_replay_returns_original() {
        let store = MemoryStore::new();
        let user_id = funded_account(&store, 1000).await;

        let charge = |key: &str| {
            NewTransaction::usage(
                user_id,
                500,
                "API usage".into(),
                serde_json::Value::Null,
                key.into(),
            )
        };

        let first = store.process_transaction(charge("key-k")).await.unwrap();
        let second = store.process_transaction(charge("key-k")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.balance(user_id).await.unwrap().balance_units, 500);

        let debits: Vec<_> = store
            .transactions_for_user(user_id, 10, 0)
            .await
            .unwrap()
            .into_iter()
            .filter(|tx| tx.tx_type == TransactionType::Usage)
            .collect();
        assert_eq!(debits.len(), 1);
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let store = MemoryStore::new();
        let user_id = funded_account(&store, 100).await;

        let err = store
            .process_transaction(NewTransaction::deposit(
                user_id,
                0,
                "nothing".into(),
                serde_json::Value::Null,
                "zero".into(),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn unknown_account_is_a_hard_failure() {
        let store = MemoryStore::new();
        let err = store
            .process_transaction(NewTransaction::deposit(
                UserId::generate(),
                100,
                "Deposit".into(),
                serde_json::Value::Null,
                "no-account".into(),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AccountNotFound { .. }));
    }

    #[tokio::test]
    async fn balance_matches_latest_transaction_snapshot() {
        let store = MemoryStore::new();
        let user_id = funded_account(&store, 0).await;

        let amounts = [(500, true), (200, false), (50, false), (300, true)];
        for (i, (amount, credit)) in amounts.into_iter().enumerate() {
            let key = format!("op-{i}");
            let new = if credit {
                NewTransaction::deposit(
                    user_id,
                    amount,
                    "Deposit".into(),
                    serde_json::Value::Null,
                    key,
                )
            } else {
                NewTransaction::usage(
                    user_id,
                    amount,
                    "Charge".into(),
                    serde_json::Value::Null,
                    key,
                )
            };
            store.process_transaction(new).await.unwrap();
        }

        let history = store.transactions_for_user(user_id, 1, 0).await.unwrap();
        let balance = store.balance(user_id).await.unwrap();
        assert_eq!(history[0].balance_after_units, balance.balance_units);
        assert_eq!(balance.balance_units, 550);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_paginated() {
        let store = MemoryStore::new();
        let user_id = funded_account(&store, 0).await;

        for i in 0..5 {
            store
                .process_transaction(NewTransaction::deposit(
                    user_id,
                    100 + i,
                    format!("Deposit {i}"),
                    serde_json::Value::Null,
                    format!("dep-{i}"),
                ))
                .await
                .unwrap();
        }

        let page = store.transactions_for_user(user_id, 2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].description, "Deposit 4");
        assert_eq!(page[1].description, "Deposit 3");

        let page = store.transactions_for_user(user_id, 2, 4).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].description, "Deposit 0");
    }

    #[tokio::test]
    async fn usage_stats_roll_up_by_day_and_model() {
        let store = MemoryStore::new();
        let user_id = funded_account(&store, 0).await;
        let other = funded_account(&store, 0).await;

        for (who, model, tokens, cost) in [
            (user_id, "sonnet", 100, 20),
            (user_id, "sonnet", 200, 20),
            (user_id, "opus", 50, 52),
            (other, "sonnet", 999, 99),
        ] {
            store
                .record_api_usage(&ApiUsageRecord::new(
                    who,
                    TransactionId::generate(),
                    model,
                    tokens,
                    cost,
                    serde_json::Value::Null,
                ))
                .await
                .unwrap();
        }

        let stats = store.usage_stats(user_id, 30).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].request_count, 3);
        assert_eq!(stats[0].total_tokens, 350);
        assert_eq!(stats[0].total_cost_units, 92);
        assert_eq!(stats[0].models_used["sonnet"], 2);
        assert_eq!(stats[0].models_used["opus"], 1);
    }
}
