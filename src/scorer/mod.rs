//! Phishing scorer
//!
//! Wraps a frozen bag-of-words logistic model exported by the training
//! pipeline as a JSON artifact. Classification never fails: a missing or
//! unreadable artifact puts the scorer in "unavailable" mode where every
//! verdict is negative with confidence 0.0 and an explicit marker, so a
//! broken model can never block mail delivery or crash a sweep.

pub mod explain;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::types::TokenWeight;

/// Positive-class probability must strictly exceed this for a phishing
/// verdict. Deliberately above the naive 0.5 midpoint: a false positive
/// loses legitimate mail, a false negative is just an unquarantined message.
pub const DECISION_THRESHOLD: f64 = 0.70;

/// Perturbation samples drawn per explained message.
const SURROGATE_SAMPLES: usize = 200;

/// Frozen scoring artifact: token weights plus bias for a logistic model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringModel {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub trained_at: Option<String>,
    pub bias: f64,
    pub weights: HashMap<String, f64>,
}

/// Outcome of classifying one message excerpt.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub is_phishing: bool,
    /// Probability of the *predicted* class, not the positive class.
    pub confidence: f64,
    /// Top risk indicators (positive contribution), at most 5.
    pub risk_tokens: Vec<TokenWeight>,
    /// Top mitigating indicators (sign-flipped), at most 3.
    pub safe_tokens: Vec<TokenWeight>,
    /// False when the scoring artifact was not loaded.
    pub model_available: bool,
}

impl Verdict {
    fn unavailable() -> Self {
        Self {
            is_phishing: false,
            confidence: 0.0,
            risk_tokens: Vec::new(),
            safe_tokens: Vec::new(),
            model_available: false,
        }
    }
}

/// Message scorer holding the (optionally absent) frozen model.
pub struct Scorer {
    model: Option<ScoringModel>,
}

impl Scorer {
    /// Load the artifact from disk. Absence or corruption is not an error;
    /// the scorer starts in unavailable mode and logs why.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "Scoring model not found at {}, classification disabled until trained",
                path.display()
            );
            return Self { model: None };
        }

        match fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|json| serde_json::from_str::<ScoringModel>(&json).map_err(|e| e.to_string()))
        {
            Ok(model) => {
                debug!(
                    "Loaded scoring model v{} ({} token weights)",
                    model.version,
                    model.weights.len()
                );
                Self { model: Some(model) }
            }
            Err(e) => {
                warn!("Failed to load scoring model from {}: {}", path.display(), e);
                Self { model: None }
            }
        }
    }

    /// Build a scorer from an in-memory model (tests, embedded defaults).
    pub fn from_model(model: ScoringModel) -> Self {
        Self { model: Some(model) }
    }

    /// A scorer with no artifact: always-negative verdicts with the marker.
    pub fn unavailable() -> Self {
        Self { model: None }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    /// Classify a message excerpt.
    ///
    /// Positive verdicts carry a token-level explanation from the local
    /// surrogate; negative verdicts carry none.
    pub fn classify(&self, text: &str) -> Verdict {
        let model = match &self.model {
            Some(m) => m,
            None => return Verdict::unavailable(),
        };

        let positive_prob = model.positive_probability(text);
        let is_phishing = is_positive(positive_prob);
        let confidence = if is_phishing {
            positive_prob
        } else {
            1.0 - positive_prob
        };

        let (risk_tokens, safe_tokens) = if is_phishing {
            let contributions = explain::local_surrogate(text, SURROGATE_SAMPLES, |sample| {
                model.positive_probability(sample)
            });
            split_contributions(contributions)
        } else {
            (Vec::new(), Vec::new())
        };

        Verdict {
            is_phishing,
            confidence,
            risk_tokens,
            safe_tokens,
            model_available: true,
        }
    }
}

impl ScoringModel {
    /// Positive-class probability for a text under the logistic model.
    pub fn positive_probability(&self, text: &str) -> f64 {
        let mut score = self.bias;
        for token in tokenize(text) {
            if let Some(weight) = self.weights.get(&token) {
                score += weight;
            }
        }
        sigmoid(score)
    }
}

/// Strict-greater threshold comparison, shared with the tests.
pub fn is_positive(positive_prob: f64) -> bool {
    positive_prob > DECISION_THRESHOLD
}

/// Lowercase alphanumeric runs, the same token shape the trainer used.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Split signed surrogate contributions into capped, rounded indicator lists.
fn split_contributions(contributions: Vec<(String, f64)>) -> (Vec<TokenWeight>, Vec<TokenWeight>) {
    let mut risk: Vec<TokenWeight> = Vec::new();
    let mut safe: Vec<TokenWeight> = Vec::new();

    // Contributions arrive sorted by descending magnitude
    for (token, weight) in contributions {
        if weight > 0.0 && risk.len() < 5 {
            risk.push(TokenWeight {
                token,
                weight: round3(weight),
            });
        } else if weight < 0.0 && safe.len() < 3 {
            safe.push(TokenWeight {
                token,
                weight: round3(-weight),
            });
        }
    }

    // Rounding can flatten tiny contributions to zero; drop them
    risk.retain(|t| t.weight > 0.0);
    safe.retain(|t| t.weight > 0.0);

    (risk, safe)
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_model() -> ScoringModel {
        let weights = [
            ("urgent", 2.0),
            ("verify", 1.5),
            ("account", 1.2),
            ("suspension", 1.3),
            ("immediately", 0.8),
            ("password", 1.4),
            ("meeting", -1.5),
            ("rescheduled", -1.0),
            ("tomorrow", -0.5),
            ("regards", -0.8),
        ]
        .into_iter()
        .map(|(t, w)| (t.to_string(), w))
        .collect();

        ScoringModel {
            version: 1,
            trained_at: None,
            bias: -2.5,
            weights,
        }
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(!is_positive(0.5));
        assert!(!is_positive(0.69));
        assert!(!is_positive(0.70));
        assert!(is_positive(0.700001));
        assert!(is_positive(0.99));
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Urgent: Verify your ACCOUNT now!"),
            vec!["urgent", "verify", "your", "account", "now"]
        );
        assert_eq!(tokenize("  "), Vec::<String>::new());
        assert_eq!(tokenize("3pm-meeting"), vec!["3pm", "meeting"]);
    }

    #[test]
    fn test_phishing_body_is_positive_with_explanation() {
        let scorer = Scorer::from_model(test_model());
        let verdict =
            scorer.classify("Urgent: Verify your account immediately to avoid suspension");

        assert!(verdict.is_phishing);
        assert!(verdict.confidence > DECISION_THRESHOLD);
        assert!(verdict.model_available);

        assert!(!verdict.risk_tokens.is_empty());
        assert!(verdict.risk_tokens.len() <= 5);
        assert!(verdict.safe_tokens.len() <= 3);
        // "urgent" carries the largest weight and must surface as an indicator
        assert!(verdict.risk_tokens.iter().any(|t| t.token == "urgent"));
        for t in &verdict.risk_tokens {
            assert!(t.weight > 0.0);
            // Rounded to 3 decimal places
            assert!((t.weight * 1000.0 - (t.weight * 1000.0).round()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_benign_body_is_negative_without_explanation() {
        let scorer = Scorer::from_model(test_model());
        let verdict = scorer.classify("Meeting rescheduled to 3pm tomorrow");

        assert!(!verdict.is_phishing);
        // Confidence is the probability of the predicted (safe) class
        assert!(verdict.confidence > 0.9);
        assert!(verdict.risk_tokens.is_empty());
        assert!(verdict.safe_tokens.is_empty());
    }

    #[test]
    fn test_unavailable_model_marker() {
        let scorer = Scorer::unavailable();
        let verdict = scorer.classify("Urgent: verify your password now");

        assert!(!verdict.is_phishing);
        assert_eq!(verdict.confidence, 0.0);
        assert!(!verdict.model_available);
    }

    #[test]
    fn test_load_missing_artifact_degrades() {
        let scorer = Scorer::load("/nonexistent/model.json");
        assert!(!scorer.is_available());
        assert!(!scorer.classify("urgent verify account").model_available);
    }

    #[test]
    fn test_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, serde_json::to_string(&test_model()).unwrap()).unwrap();

        let scorer = Scorer::load(&path);
        assert!(scorer.is_available());
        assert!(scorer.classify("urgent urgent verify password account").is_phishing);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let scorer = Scorer::from_model(test_model());
        let text = "Urgent security alert: verify your account password immediately";
        let a = scorer.classify(text);
        let b = scorer.classify(text);
        assert_eq!(a.is_phishing, b.is_phishing);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.risk_tokens, b.risk_tokens);
        assert_eq!(a.safe_tokens, b.safe_tokens);
    }
}
