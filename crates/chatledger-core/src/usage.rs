//! API usage audit types.
//!
//! `ApiUsageRecord` is a satellite audit row correlated to a ledger
//! transaction. It is written best-effort, outside the atomic money-movement
//! path, and feeds the daily usage rollups.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{TransactionId, UserId};

/// One recorded API call, correlated to the transaction that billed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiUsageRecord {
    /// The user who made the call.
    pub user_id: UserId,

    /// The ledger transaction that billed this call.
    pub transaction_id: TransactionId,

    /// Model that served the request.
    pub model: String,

    /// Total tokens consumed, as reported by the provider.
    pub tokens_used: i64,

    /// What the call cost, in minor units.
    pub cost_units: i64,

    /// Request context (mode, temperature, prompt word count, ...).
    pub metadata: serde_json::Value,

    /// When the usage occurred.
    pub created_at: DateTime<Utc>,
}

impl ApiUsageRecord {
    /// Create a usage record timestamped now.
    #[must_use]
    pub fn new(
        user_id: UserId,
        transaction_id: TransactionId,
        model: impl Into<String>,
        tokens_used: i64,
        cost_units: i64,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            user_id,
            transaction_id,
            model: model.into(),
            tokens_used,
            cost_units,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Usage aggregated over one calendar day for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyUsage {
    /// The day (UTC).
    pub date: NaiveDate,

    /// Number of billed API calls.
    pub request_count: i64,

    /// Sum of tokens across the day's calls.
    pub total_tokens: i64,

    /// Sum of costs in minor units.
    pub total_cost_units: i64,

    /// Request counts per model.
    pub models_used: HashMap<String, i64>,
}

impl DailyUsage {
    /// Create an empty rollup for a day.
    #[must_use]
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            request_count: 0,
            total_tokens: 0,
            total_cost_units: 0,
            models_used: HashMap::new(),
        }
    }

    /// Fold one usage record into the rollup.
    pub fn absorb(&mut self, record: &ApiUsageRecord) {
        self.request_count += 1;
        self.total_tokens += record.tokens_used;
        self.total_cost_units += record.cost_units;
        *self.models_used.entry(record.model.clone()).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_usage_absorbs_records() {
        let user_id = UserId::generate();
        let date = Utc::now().date_naive();
        let mut day = DailyUsage::empty(date);

        for (model, tokens, cost) in [("sonnet", 120, 20), ("sonnet", 80, 20), ("opus", 40, 52)] {
            day.absorb(&ApiUsageRecord::new(
                user_id,
                TransactionId::generate(),
                model,
                tokens,
                cost,
                serde_json::Value::Null,
            ));
        }

        assert_eq!(day.request_count, 3);
        assert_eq!(day.total_tokens, 240);
        assert_eq!(day.total_cost_units, 92);
        assert_eq!(day.models_used["sonnet"], 2);
        assert_eq!(day.models_used["opus"], 1);
    }
}
