//! Remediation actions against the mailbox service
//!
//! Each operation is a single idempotent-intent call: apply or remove the
//! quarantine label, or permanently delete. The executor reports success as
//! a bool and never raises; retry policy belongs to the scan coordinator,
//! one level up, per message rather than per call.

use std::sync::Arc;
use tracing::{info, warn};

use crate::mailbox::{CredentialSnapshot, MailboxService, LABEL_INBOX, LABEL_QUARANTINE};

/// Applies verdict consequences to the mailbox.
pub struct RemediationExecutor {
    mailbox: Arc<dyn MailboxService>,
}

impl RemediationExecutor {
    pub fn new(mailbox: Arc<dyn MailboxService>) -> Self {
        Self { mailbox }
    }

    /// Move a message into quarantine. Returns false on any service failure,
    /// including "already quarantined".
    pub async fn quarantine(&self, creds: &CredentialSnapshot, message_id: &str) -> bool {
        match self
            .mailbox
            .modify_labels(creds, message_id, &[LABEL_QUARANTINE], &[LABEL_INBOX])
            .await
        {
            Ok(()) => {
                info!("Quarantined message {}", message_id);
                true
            }
            Err(e) => {
                warn!("Failed to quarantine message {}: {}", message_id, e);
                false
            }
        }
    }

    /// Restore a quarantined message to the inbox.
    pub async fn restore(&self, creds: &CredentialSnapshot, message_id: &str) -> bool {
        match self
            .mailbox
            .modify_labels(creds, message_id, &[LABEL_INBOX], &[LABEL_QUARANTINE])
            .await
        {
            Ok(()) => {
                info!("Restored message {}", message_id);
                true
            }
            Err(e) => {
                warn!("Failed to restore message {}: {}", message_id, e);
                false
            }
        }
    }

    /// Permanently remove a message.
    pub async fn purge(&self, creds: &CredentialSnapshot, message_id: &str) -> bool {
        match self.mailbox.delete_message(creds, message_id).await {
            Ok(()) => {
                info!("Purged message {}", message_id);
                true
            }
            Err(e) => {
                warn!("Failed to purge message {}: {}", message_id, e);
                false
            }
        }
    }
}
