//! Ledger facade: accounts, manual transactions and the orchestrating [`Ledger`]

pub mod account;
pub mod core;
pub mod transaction;

pub use account::*;
pub use core::*;
pub use transaction::*;
