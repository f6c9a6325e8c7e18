//! Mailbox service boundary
//!
//! The provider (Gmail-shaped REST API) sits behind the [`MailboxService`]
//! trait so the scan pipeline can be exercised against an in-memory fake.
//! Transport and token refresh live outside this crate; workers only ever see
//! an immutable [`CredentialSnapshot`] captured at trigger time.

pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::error::MailguardError;

/// Label applied to quarantined messages.
pub const LABEL_QUARANTINE: &str = "TRASH";
/// Label removed when a message is quarantined and restored when it comes back.
pub const LABEL_INBOX: &str = "INBOX";

/// Read-only mailbox credentials captured when a sweep is triggered.
///
/// Workers never mutate this; a token refresh produces a *new* snapshot for
/// subsequent calls instead of updating a shared live object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSnapshot {
    /// Account identity (email address)
    pub account: String,
    /// Bearer token for the mailbox API
    pub access_token: String,
}

impl CredentialSnapshot {
    pub fn new(account: impl Into<String>, access_token: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            account: account.into(),
            access_token: access_token.into(),
        })
    }
}

/// One page of message identifiers from a folder listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Lightweight message metadata: enough to classify, never the full body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMeta {
    pub id: String,
    pub sender: String,
    pub subject: String,
    /// Short body excerpt as provided by the service
    pub snippet: String,
    pub label_ids: Vec<String>,
}

/// Fallible mailbox operations, one network call each.
///
/// Implementations report failures as structured [`MailguardError`] variants;
/// callers must never have to pattern-match on error message text.
#[async_trait]
pub trait MailboxService: Send + Sync {
    /// List message ids in a folder, paginated.
    async fn list_messages(
        &self,
        creds: &CredentialSnapshot,
        folder: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage, MailguardError>;

    /// Fetch sender, subject and a short excerpt for one message.
    async fn get_metadata(
        &self,
        creds: &CredentialSnapshot,
        message_id: &str,
    ) -> Result<MessageMeta, MailguardError>;

    /// Apply and remove labels on a message in one call.
    async fn modify_labels(
        &self,
        creds: &CredentialSnapshot,
        message_id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<(), MailguardError>;

    /// Permanently delete a message.
    async fn delete_message(
        &self,
        creds: &CredentialSnapshot,
        message_id: &str,
    ) -> Result<(), MailguardError>;
}
