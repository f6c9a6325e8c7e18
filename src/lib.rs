//! mailguard - phishing detection and auto-quarantine
//!
//! Classifies mailbox messages with a frozen scoring model, quarantines the
//! malicious ones, and keeps an auditable, explainable decision log.
//!
//! ## Module Organization
//!
//! - `scan/`: background sweep coordinator (paging, worker pool, dispatch)
//! - `scorer/`: frozen classifier and local surrogate explanations
//! - `narrative/`: rationale synthesis (template and external strategies)
//! - `store/`: SQLite decision log with idempotent check-then-append
//! - `remediation/`: quarantine/restore/purge against the mailbox service
//! - `mailbox/`: mailbox service boundary (trait + REST client)
//! - `config/`: configuration management
//! - `types/`: data structures and error types

pub mod config;
pub mod mailbox;
pub mod narrative;
pub mod remediation;
pub mod scan;
pub mod scorer;
pub mod store;
pub mod types;
