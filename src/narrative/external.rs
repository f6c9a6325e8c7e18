//! External narrative generation
//!
//! Best-effort call to an Ollama-compatible text-generation endpoint for a
//! more naturalistic rationale. Every failure mode (connection refused,
//! timeout, non-2xx, malformed body, trivially short output) yields `None`
//! and the caller falls back to the local template. Failures are never
//! surfaced as errors.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::NarrativeContext;
use crate::config::NarrativeConfig;

/// Prompt template sent to the generation endpoint.
const NARRATIVE_PROMPT: &str = r#"You are a security analyst. In two sentences, explain to a
non-technical user why the following email was classified as phishing.

From: {sender}
Subject: {subject}
Body excerpt: {body}
Detection confidence: {confidence}
Highest-risk tokens: {tokens}

Respond with the explanation only. No preamble."#;

/// Generated text shorter than this (after trimming) is rejected as noise.
const MIN_RESPONSE_LEN: usize = 20;

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for the optional narrative-generation service.
pub struct ExternalSynthesizer {
    client: Client,
    url: String,
    model: String,
}

impl ExternalSynthesizer {
    pub fn new(config: &NarrativeConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            url: format!("{}/api/generate", config.url.trim_end_matches('/')),
            model: config.model.clone(),
        }
    }

    /// Generate a rationale, or `None` when the local fallback should be used.
    pub async fn generate(&self, ctx: &NarrativeContext<'_>) -> Option<String> {
        let prompt = build_prompt(ctx);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": 0.2,
                "num_predict": 120
            }
        });

        debug!("Requesting external narrative from {}", self.url);

        let resp = match self.client.post(&self.url).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("External narrative request failed: {}", e);
                return None;
            }
        };

        if !resp.status().is_success() {
            warn!("External narrative endpoint returned status {}", resp.status());
            return None;
        }

        let parsed: GenerateResponse = match resp.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to parse external narrative response: {}", e);
                return None;
            }
        };

        let text = parsed.response.trim().to_string();
        if text.len() < MIN_RESPONSE_LEN {
            debug!("External narrative too short ({} chars), rejecting", text.len());
            return None;
        }

        Some(text)
    }
}

fn build_prompt(ctx: &NarrativeContext<'_>) -> String {
    let tokens = ctx
        .tokens
        .iter()
        .take(5)
        .map(|t| t.token.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let body: String = ctx.body_excerpt.chars().take(500).collect();

    NARRATIVE_PROMPT
        .replace("{sender}", ctx.sender)
        .replace("{subject}", if ctx.subject.is_empty() { "(no subject)" } else { ctx.subject })
        .replace("{body}", &body)
        .replace("{confidence}", &format!("{:.0}%", ctx.confidence * 100.0))
        .replace("{tokens}", &tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenWeight;

    #[test]
    fn test_prompt_contains_evidence() {
        let tokens = vec![
            TokenWeight { token: "urgent".into(), weight: 0.4 },
            TokenWeight { token: "verify".into(), weight: 0.2 },
        ];
        let ctx = NarrativeContext {
            sender: "attacker@example.com",
            subject: "Act now",
            body_excerpt: "Urgent: verify your account",
            confidence: 0.92,
            tokens: &tokens,
        };

        let prompt = build_prompt(&ctx);
        assert!(prompt.contains("attacker@example.com"));
        assert!(prompt.contains("Act now"));
        assert!(prompt.contains("urgent, verify"));
        assert!(prompt.contains("92%"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_yields_none() {
        let config = NarrativeConfig {
            mode: "external".into(),
            // Nothing listens here
            url: "http://127.0.0.1:1".into(),
            model: "test".into(),
            timeout_secs: 1,
        };
        let synth = ExternalSynthesizer::new(&config);
        let tokens = vec![TokenWeight { token: "urgent".into(), weight: 0.4 }];
        let ctx = NarrativeContext {
            sender: "a@example.com",
            subject: "s",
            body_excerpt: "b",
            confidence: 0.9,
            tokens: &tokens,
        };

        assert!(synth.generate(&ctx).await.is_none());
    }
}
