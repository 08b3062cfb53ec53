//! Core types for the chatledger prepaid balance subsystem.
//!
//! This crate provides the foundational types used throughout chatledger:
//!
//! - **Identifiers**: `UserId`, `TransactionId`
//! - **Balances**: `AccountBalance`
//! - **Ledger**: `LedgerTransaction`, `TransactionType`, `NewTransaction`
//! - **Usage**: `ApiUsageRecord`, `DailyUsage`
//! - **Pricing**: `ChatMode`, `message_charge_units`
//!
//! # Minor units
//!
//! **1 unit = $0.001 (a millidollar)**
//!
//! - User deposits $1 → balance grows by 1000 units
//! - A `simple` chat message costs $0.02 → 20 units
//! - Stored as `i64` integer units to avoid floating point precision issues
//! - Display: `units / UNITS_PER_USD` = USD

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod balance;
pub mod error;
pub mod ids;
pub mod pricing;
pub mod transaction;
pub mod usage;

pub use balance::AccountBalance;
pub use error::{LedgerError, Result};
pub use ids::{IdError, TransactionId, UserId};
pub use pricing::{message_charge_units, token_usage_charge_units, ChatMode, TokenRate, UNITS_PER_USD};
pub use transaction::{LedgerTransaction, NewTransaction, TransactionStatus, TransactionType};
pub use usage::{ApiUsageRecord, DailyUsage};
