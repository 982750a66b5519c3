//! # gov-audit
//!
//! Durable, tamper-evident storage for Governor's policy audit trail.
//!
//! The policy engine keeps a bounded in-memory log of [`AuditEntry`] values.
//! Attaching a [`JournalObserver`] to the engine persists every entry to a
//! JSONL file in which each record carries the SHA-256 hash of the previous
//! line. [`AuditJournal::verify_chain`] detects any insertion, deletion, or
//! edit.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gov_audit::JournalObserver;
//! use gov_policy::PolicyEngine;
//!
//! let engine = PolicyEngine::new();
//! engine.add_observer(Arc::new(JournalObserver::open("/tmp/gov-audit.jsonl").unwrap()));
//! ```
//!
//! [`AuditEntry`]: gov_policy::AuditEntry

pub mod error;
pub mod hasher;
pub mod journal;

pub use error::AuditError;
pub use journal::{AuditJournal, AuditRecord, JournalObserver};
