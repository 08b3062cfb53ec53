//! Common test utilities for chatledger-service integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use chatledger_core::UserId;
use chatledger_service::{BalanceService, ServiceConfig};
use chatledger_store::MemoryStore;

/// Test harness: a balance service over the in-memory store, with one
/// account already created.
pub struct TestHarness {
    /// The service under test.
    pub service: Arc<BalanceService>,
    /// Direct handle to the backing store, for post-shutdown inspection.
    pub store: Arc<MemoryStore>,
    /// The account created for this harness.
    pub user_id: UserId,
}

impl TestHarness {
    /// Create a harness with a fresh store and a zero-balance account.
    pub async fn new() -> Self {
        let config = ServiceConfig {
            welcome_bonus_units: 100,
            audit_max_attempts: 3,
            audit_backoff_ms: 1, // keep retries fast in tests
            ..ServiceConfig::default()
        };
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(BalanceService::new(store.clone(), config));

        let user_id = UserId::generate();
        service
            .create_account(user_id)
            .await
            .expect("account creation failed");

        Self {
            service,
            store,
            user_id,
        }
    }

    /// Create a harness whose account holds `units` already.
    pub async fn funded(units: i64) -> Self {
        let harness = Self::new().await;
        harness
            .service
            .deposit(
                harness.user_id,
                units,
                "Test funding",
                serde_json::Value::Null,
            )
            .await
            .expect("funding deposit failed");
        harness
    }

    /// Current spendable balance of the harness account.
    pub async fn balance_units(&self) -> i64 {
        self.service
            .balance(self.user_id)
            .await
            .expect("balance read failed")
            .balance_units
    }
}
