//! Gmail-shaped REST implementation of [`MailboxService`]
//!
//! Thin boundary client: one HTTP call per trait method, bearer auth from the
//! credential snapshot, bounded per-call timeout. Token acquisition and
//! refresh are out of scope; an expired token surfaces as a structured
//! `Mailbox` error and the affected message is simply skipped by the sweep.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{CredentialSnapshot, MailboxService, MessageMeta, MessagePage};
use crate::config::MailboxConfig;
use crate::types::error::MailguardError;

/// REST mailbox client
pub struct RestMailbox {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<ListEntry>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ListEntry {
    id: String,
}

#[derive(Deserialize)]
struct MetadataResponse {
    id: String,
    #[serde(default)]
    snippet: String,
    #[serde(rename = "labelIds", default)]
    label_ids: Vec<String>,
    #[serde(default)]
    payload: MetadataPayload,
}

#[derive(Deserialize, Default)]
struct MetadataPayload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Deserialize)]
struct Header {
    name: String,
    value: String,
}

impl RestMailbox {
    pub fn new(config: &MailboxConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.call_timeout_secs))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/users/me/messages", self.base_url)
    }

    fn check_status(status: StatusCode, context: &str) -> Result<(), MailguardError> {
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            return Err(MailguardError::MessageNotFound(context.to_string()));
        }
        Err(MailguardError::Mailbox(format!(
            "{} returned status {}",
            context, status
        )))
    }
}

#[async_trait]
impl MailboxService for RestMailbox {
    async fn list_messages(
        &self,
        creds: &CredentialSnapshot,
        folder: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage, MailguardError> {
        let mut query: Vec<(&str, String)> = vec![
            ("maxResults", page_size.to_string()),
            ("labelIds", folder.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        debug!("Listing {} (page_size={})", folder, page_size);

        let resp = self
            .client
            .get(self.messages_url())
            .bearer_auth(&creds.access_token)
            .query(&query)
            .send()
            .await?;

        Self::check_status(resp.status(), "list_messages")?;

        let parsed: ListResponse = resp.json().await?;
        Ok(MessagePage {
            ids: parsed.messages.into_iter().map(|m| m.id).collect(),
            next_page_token: parsed.next_page_token,
        })
    }

    async fn get_metadata(
        &self,
        creds: &CredentialSnapshot,
        message_id: &str,
    ) -> Result<MessageMeta, MailguardError> {
        let url = format!("{}/{}", self.messages_url(), message_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&creds.access_token)
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "From"),
                ("metadataHeaders", "Subject"),
            ])
            .send()
            .await?;

        Self::check_status(resp.status(), message_id)?;

        let parsed: MetadataResponse = resp.json().await?;

        let mut sender = String::new();
        let mut subject = String::new();
        for header in &parsed.payload.headers {
            match header.name.as_str() {
                "From" => sender = header.value.clone(),
                "Subject" => subject = header.value.clone(),
                _ => {}
            }
        }

        Ok(MessageMeta {
            id: parsed.id,
            sender,
            subject,
            snippet: parsed.snippet,
            label_ids: parsed.label_ids,
        })
    }

    async fn modify_labels(
        &self,
        creds: &CredentialSnapshot,
        message_id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<(), MailguardError> {
        let url = format!("{}/{}/modify", self.messages_url(), message_id);
        let body = serde_json::json!({
            "addLabelIds": add,
            "removeLabelIds": remove,
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&creds.access_token)
            .json(&body)
            .send()
            .await?;

        Self::check_status(resp.status(), message_id)
    }

    async fn delete_message(
        &self,
        creds: &CredentialSnapshot,
        message_id: &str,
    ) -> Result<(), MailguardError> {
        let url = format!("{}/{}", self.messages_url(), message_id);
        let resp = self
            .client
            .delete(&url)
            .bearer_auth(&creds.access_token)
            .send()
            .await?;

        Self::check_status(resp.status(), message_id)
    }
}
