pub mod error;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A token and its contribution weight from the local surrogate explanation.
/// Weights are always non-negative; mitigating tokens are sign-flipped before
/// they reach this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenWeight {
    pub token: String,
    pub weight: f64,
}

/// Structured explanation attached to positive verdicts.
///
/// `phishing_tokens` holds up to 5 risk indicators, `safe_tokens` up to 3
/// mitigating indicators. Both empty for safe verdicts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    #[serde(default)]
    pub phishing_tokens: Vec<TokenWeight>,
    #[serde(default)]
    pub safe_tokens: Vec<TokenWeight>,
}

impl Explanation {
    pub fn is_empty(&self) -> bool {
        self.phishing_tokens.is_empty() && self.safe_tokens.is_empty()
    }
}

/// Action recorded against a message as a consequence of its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemediationAction {
    Quarantined,
    Delivered,
    Restored,
    Purged,
    Sent,
}

impl RemediationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quarantined => "quarantined",
            Self::Delivered => "delivered",
            Self::Restored => "restored",
            Self::Purged => "purged",
            Self::Sent => "sent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "quarantined" => Some(Self::Quarantined),
            "delivered" => Some(Self::Delivered),
            "restored" => Some(Self::Restored),
            "purged" => Some(Self::Purged),
            "sent" => Some(Self::Sent),
            _ => None,
        }
    }
}

/// One row of the decision log.
///
/// `message_id` is the mailbox provider's opaque identifier. It is `None`
/// only on legacy rows written before the identifier scheme existed; those
/// rows are matched by `(sender, subject)` as a lossy best-effort fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub id: i64,
    pub message_id: Option<String>,
    pub sender: String,
    pub receiver: Option<String>,
    pub subject: String,
    pub body_excerpt: String,
    pub is_phishing: bool,
    pub confidence: f64,
    pub rationale: String,
    pub explanation: Explanation,
    pub action_taken: RemediationAction,
    pub created_at: DateTime<Utc>,
}

/// A new decision about to be appended to the store.
#[derive(Debug, Clone)]
pub struct NewVerdict {
    pub message_id: String,
    pub sender: String,
    pub subject: String,
    pub body_excerpt: String,
    pub is_phishing: bool,
    pub confidence: f64,
    pub rationale: String,
    pub explanation: Explanation,
    pub action_taken: RemediationAction,
}
