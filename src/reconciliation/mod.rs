//! Reconciliation of account histories against asserted balances

pub mod engine;

pub use engine::*;
