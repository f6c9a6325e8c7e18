//! Rationale synthesis
//!
//! Turns the scorer's token-level explanation into a short human-readable
//! rationale. Two interchangeable strategies behind one [`Synthesizer`]:
//! a deterministic local template path, and an optional external
//! text-generation call that silently falls back to the template path on any
//! failure. Callers never observe the external path failing.

pub mod external;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::NarrativeConfig;
use crate::types::TokenWeight;
use external::ExternalSynthesizer;

/// Rationale used when a positive verdict has no usable tokens.
pub const INCONCLUSIVE_RATIONALE: &str =
    "The detector flagged anomalous patterns but could not isolate specific linguistic triggers.";

/// Rationale recorded for safe verdicts.
pub const SAFE_RATIONALE: &str = "Automated heuristics and linguistic analysis indicate this \
     message maintains a high integrity score. No malicious payloads or social engineering \
     patterns identified.";

/// Rationale recorded when the scoring model was unavailable.
pub const NOT_SCORED_RATIONALE: &str =
    "Not scored: the classification model is unavailable. Message delivered unmodified.";

/// Named social-engineering tactic used to phrase the rationale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Archetype {
    CredentialHarvesting,
    HighPressure,
    FinancialFraud,
    Impersonation,
    GeneralPhishing,
}

impl Archetype {
    pub fn label(&self) -> &'static str {
        match self {
            Self::CredentialHarvesting => "Credential Harvesting",
            Self::HighPressure => "High-Pressure Social Engineering",
            Self::FinancialFraud => "Financial Fraud",
            Self::Impersonation => "Impersonation Attack",
            Self::GeneralPhishing => "General Phishing",
        }
    }

    /// Match the top tokens to an archetype. First match in declaration
    /// order wins so the mapping stays deterministic.
    pub fn detect(tokens: &[TokenWeight]) -> Self {
        let joined = tokens
            .iter()
            .take(3)
            .map(|t| t.token.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        const ARCHETYPES: &[(Archetype, &[&str])] = &[
            (
                Archetype::CredentialHarvesting,
                &["password", "login", "account", "verify"],
            ),
            (
                Archetype::HighPressure,
                &["urgent", "immediate", "expire", "now"],
            ),
            (
                Archetype::FinancialFraud,
                &["winner", "prize", "gift", "money", "claim"],
            ),
            (
                Archetype::Impersonation,
                &["security", "alert", "suspended"],
            ),
        ];

        for (archetype, keywords) in ARCHETYPES {
            if keywords.iter().any(|k| joined.contains(k)) {
                return *archetype;
            }
        }
        Archetype::GeneralPhishing
    }
}

/// Context handed to a synthesis strategy for one positive verdict.
#[derive(Debug, Clone)]
pub struct NarrativeContext<'a> {
    pub sender: &'a str,
    pub subject: &'a str,
    pub body_excerpt: &'a str,
    pub confidence: f64,
    pub tokens: &'a [TokenWeight],
}

/// Rationale synthesis capability, strategy selected by configuration.
pub enum Synthesizer {
    Template,
    External(ExternalSynthesizer),
}

impl Synthesizer {
    pub fn from_config(config: &NarrativeConfig) -> Self {
        match config.mode.as_str() {
            "external" => Self::External(ExternalSynthesizer::new(config)),
            _ => Self::Template,
        }
    }

    /// Produce a non-empty rationale for a positive verdict.
    pub async fn synthesize(&self, ctx: &NarrativeContext<'_>) -> String {
        match self {
            Self::Template => template_rationale(ctx),
            Self::External(external) => match external.generate(ctx).await {
                Some(text) => text,
                None => {
                    debug!("External narrative unavailable, using template rationale");
                    template_rationale(ctx)
                }
            },
        }
    }
}

/// Deterministic local rationale built from the archetype and evidence.
pub fn template_rationale(ctx: &NarrativeContext<'_>) -> String {
    if ctx.tokens.is_empty() {
        return INCONCLUSIVE_RATIONALE.to_string();
    }

    let archetype = Archetype::detect(ctx.tokens);
    let evidence = ctx
        .tokens
        .iter()
        .take(3)
        .map(|t| format!("'{}'", t.token))
        .collect::<Vec<_>>()
        .join(", ");

    let subject_clause = if ctx.subject.is_empty() {
        String::new()
    } else {
        let truncated: String = ctx.subject.chars().take(30).collect();
        format!(" within the subject line '{}...'", truncated)
    };

    // Several interchangeable phrasings; the pick is a pure function of the
    // context so re-synthesizing a message yields the same sentence.
    let variant = (ctx.subject.len() + ctx.tokens.len()) % 3;
    match variant {
        0 => format!(
            "Detected {} indicators. The use of high-risk tokens like {}{} suggests a \
             deliberate attempt to manipulate the recipient. Classified as a confirmed \
             threat based on these observed behavioral vectors.",
            archetype.label(),
            evidence,
            subject_clause,
        ),
        1 => format!(
            "This message matches the {} archetype. High-risk tokens {}{} indicate an \
             attempt to pressure the recipient into an unsafe action.",
            archetype.label(),
            evidence,
            subject_clause,
        ),
        _ => format!(
            "{} patterns identified: the tokens {}{} carried the strongest weight in this \
             classification and are characteristic of this attack category.",
            archetype.label(),
            evidence,
            subject_clause,
        ),
    }
}
