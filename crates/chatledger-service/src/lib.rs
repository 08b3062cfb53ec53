//! Balance service façade for chatledger.
//!
//! [`BalanceService`] is the API surface request handlers consume: deposit,
//! charge, refund, bonus, balance reads, history, usage stats, and the
//! pre-flight affordability check that must run before any paid LLM call.
//! All money movement funnels through the store's atomic transaction
//! processor; this crate adds operation naming, idempotency key generation,
//! and the best-effort boundary around audit writes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod config;
pub mod service;

pub use audit::AuditQueue;
pub use config::ServiceConfig;
pub use service::{BalanceService, Quote};
