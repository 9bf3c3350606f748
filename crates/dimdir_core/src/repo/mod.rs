//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Write paths validate domain invariants before SQL mutations.
//! - Repository APIs return semantic errors (`UnknownAddress`,
//!   `DanglingReference`) in addition to DB transport errors.

pub mod content_repo;
pub mod ledger_repo;
pub mod relation_repo;
