//! Unified error types for the crate
//!
//! This module defines error types that:
//! - Are serializable so they can cross process boundaries (status API, logs)
//! - Provide actionable error messages
//! - Map collaborator failures to the taxonomy the scanner recovers from

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error type for services and the scan pipeline
///
/// Collaborator failures must arrive here as structured variants, never as
/// sentinel strings to be pattern-matched downstream.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum MailguardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Mailbox error: {0}")]
    Mailbox(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Scoring model error: {0}")]
    Model(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

// Implement From for common error types

impl From<std::io::Error> for MailguardError {
    fn from(err: std::io::Error) -> Self {
        MailguardError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for MailguardError {
    fn from(err: toml::de::Error) -> Self {
        MailguardError::Config(err.to_string())
    }
}

impl From<rusqlite::Error> for MailguardError {
    fn from(err: rusqlite::Error) -> Self {
        MailguardError::Database(err.to_string())
    }
}

impl From<r2d2::Error> for MailguardError {
    fn from(err: r2d2::Error) -> Self {
        MailguardError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for MailguardError {
    fn from(err: serde_json::Error) -> Self {
        MailguardError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for MailguardError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MailguardError::Timeout(err.to_string())
        } else {
            MailguardError::Network(err.to_string())
        }
    }
}
