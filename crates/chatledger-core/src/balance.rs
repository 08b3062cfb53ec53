//! Account balance types for chatledger.
//!
//! One `AccountBalance` row exists per user. It is created once at account
//! registration and only ever mutated by the transaction processor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Default currency for new accounts.
pub const DEFAULT_CURRENCY: &str = "USD";

/// A prepaid balance for a single user account.
///
/// Amounts are in minor units (1 unit = $0.001). `balance_units` is the
/// spendable total; `locked_units` covers funds reserved but not yet debited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    /// The owning user (foreign key into the account system).
    pub user_id: UserId,

    /// Spendable funds in minor units. Never negative after a committed charge.
    pub balance_units: i64,

    /// Funds reserved but not yet debited, in minor units. Always >= 0.
    pub locked_units: i64,

    /// Currency code, fixed per account.
    pub currency: String,

    /// When the balance row was created.
    pub created_at: DateTime<Utc>,

    /// When the balance row was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl AccountBalance {
    /// Create a new zero balance for a user.
    #[must_use]
    pub fn new(user_id: UserId, currency: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance_units: 0,
            locked_units: 0,
            currency: currency.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Funds available for spending (balance minus locked reservations).
    #[must_use]
    pub const fn available_units(&self) -> i64 {
        self.balance_units - self.locked_units
    }

    /// Check whether a debit of `amount_units` would keep the balance at or
    /// above zero.
    ///
    /// Gates on the raw `balance_units`, the same criterion the transaction
    /// processor applies at commit time, so a passing pre-flight predicts a
    /// committing debit. `locked_units` only affects [`Self::available_units`]
    /// reporting.
    #[must_use]
    pub const fn can_afford(&self, amount_units: i64) -> bool {
        self.balance_units >= amount_units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_balance_is_zero() {
        let balance = AccountBalance::new(UserId::generate(), DEFAULT_CURRENCY);
        assert_eq!(balance.balance_units, 0);
        assert_eq!(balance.locked_units, 0);
        assert_eq!(balance.currency, "USD");
    }

    #[test]
    fn available_subtracts_locked() {
        let mut balance = AccountBalance::new(UserId::generate(), DEFAULT_CURRENCY);
        balance.balance_units = 1000;
        balance.locked_units = 300;

        assert_eq!(balance.available_units(), 700);
    }

    #[test]
    fn affordability_gates_on_raw_balance() {
        let mut balance = AccountBalance::new(UserId::generate(), DEFAULT_CURRENCY);
        balance.balance_units = 1000;
        balance.locked_units = 300;

        // Matches the commit-time check: locked funds do not shrink it.
        assert!(balance.can_afford(1000));
        assert!(!balance.can_afford(1001));
    }
}
