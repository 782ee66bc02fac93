//! # Ledger Reconciliation
//!
//! Statement import and checkpoint-based balance reconciliation for
//! personal finance ledgers.
//!
//! ## Features
//!
//! - **Statement parsing**: Institution rulesets for delimited exports and
//!   multi-line statement text, with declarative transaction classification
//! - **Batch import**: Duplicate detection by transaction id and atomic writes
//! - **Reconciliation**: Balance checkpoints explained by adjustment
//!   transactions, refreshed whenever earlier history changes
//! - **Auditing**: Read-only validation of checkpoints against history
//! - **Storage abstraction**: Database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use ledger_reconciliation::{
//!     AccountKind, CheckpointType, Currency, Institution, Ledger, MemoryStorage, RulesetKey,
//! };
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//!
//! # async fn run() -> ledger_reconciliation::LedgerResult<()> {
//! let mut ledger = Ledger::new(MemoryStorage::new());
//! ledger
//!     .create_account(
//!         "card".to_string(),
//!         "user-1".to_string(),
//!         "Sapphire".to_string(),
//!         AccountKind::CreditCard,
//!         Currency::usd(),
//!     )
//!     .await?;
//!
//! let csv = "Transaction Date,Post Date,Description,Category,Type,Amount,Memo\n\
//!            01/03/2024,01/04/2024,COFFEE,Food & Drink,Sale,-4.50,\n";
//! let key = RulesetKey::new(Institution::Chase, AccountKind::CreditCard);
//! ledger.import_statement_into(csv, &key, "card").await?;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
//! ledger
//!     .reconcile("card", date, BigDecimal::from(-5), CheckpointType::Statement)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod import;
pub mod ledger;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::EngineConfig;
pub use import::*;
pub use ledger::*;
pub use reconciliation::*;
pub use traits::*;
pub use types::*;
pub use utils::MemoryStorage;
