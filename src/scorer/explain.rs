//! Local surrogate explanation
//!
//! Approximates the model's decision for a single input by masking random
//! subsets of its distinct tokens, rescoring each perturbed variant, and
//! attributing to every token the mean shift in positive probability between
//! samples where it is present and samples where it is absent.
//!
//! The sampler is seeded from a SHA-256 of the input text, so explaining the
//! same message always produces the same attribution. Decisions stay
//! reproducible and auditable.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::tokenize;

/// Signed per-token contributions to the positive class, sorted by
/// descending magnitude. Positive means "pushes toward phishing".
pub fn local_surrogate<F>(text: &str, num_samples: usize, score_fn: F) -> Vec<(String, f64)>
where
    F: Fn(&str) -> f64,
{
    let stream = tokenize(text);
    if stream.is_empty() {
        return Vec::new();
    }

    // Distinct tokens in order of first appearance; masking a token removes
    // every occurrence, as the surrogate treats token presence as the feature.
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut distinct: Vec<&str> = Vec::new();
    for token in &stream {
        if !index.contains_key(token.as_str()) {
            index.insert(token.as_str(), distinct.len());
            distinct.push(token.as_str());
        }
    }

    let mut rng = seeded_rng(text);

    let mut present_sum = vec![0.0f64; distinct.len()];
    let mut present_count = vec![0usize; distinct.len()];
    let mut absent_sum = vec![0.0f64; distinct.len()];
    let mut absent_count = vec![0usize; distinct.len()];

    let mut mask = vec![true; distinct.len()];
    for sample in 0..num_samples + 2 {
        match sample {
            // Anchor samples: everything present, everything absent, so every
            // token has at least one observation on each side.
            0 => mask.iter_mut().for_each(|m| *m = true),
            1 => mask.iter_mut().for_each(|m| *m = false),
            _ => mask.iter_mut().for_each(|m| *m = rng.gen_bool(0.5)),
        }

        let perturbed: Vec<&str> = stream
            .iter()
            .map(|t| t.as_str())
            .filter(|t| mask[index[*t]])
            .collect();
        let score = score_fn(&perturbed.join(" "));

        for (i, &present) in mask.iter().enumerate() {
            if present {
                present_sum[i] += score;
                present_count[i] += 1;
            } else {
                absent_sum[i] += score;
                absent_count[i] += 1;
            }
        }
    }

    let mut contributions: Vec<(String, f64)> = distinct
        .iter()
        .enumerate()
        .map(|(i, token)| {
            let present_mean = present_sum[i] / present_count[i].max(1) as f64;
            let absent_mean = absent_sum[i] / absent_count[i].max(1) as f64;
            (token.to_string(), present_mean - absent_mean)
        })
        .collect();

    contributions.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    contributions
}

fn seeded_rng(text: &str) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    StdRng::from_seed(seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Toy linear scorer over a couple of loaded words.
    fn toy_score(text: &str) -> f64 {
        let mut score: f64 = 0.0;
        for token in tokenize(text) {
            score += match token.as_str() {
                "urgent" => 0.6,
                "verify" => 0.3,
                "thanks" => -0.4,
                _ => 0.0,
            };
        }
        score
    }

    #[test]
    fn test_empty_text_has_no_contributions() {
        assert!(local_surrogate("", 50, toy_score).is_empty());
        assert!(local_surrogate("!!! ...", 50, toy_score).is_empty());
    }

    #[test]
    fn test_signs_follow_the_model() {
        let contributions = local_surrogate("urgent please verify thanks", 200, toy_score);

        let weight = |t: &str| {
            contributions
                .iter()
                .find(|(token, _)| token == t)
                .map(|(_, w)| *w)
                .unwrap()
        };

        assert!(weight("urgent") > 0.0);
        assert!(weight("verify") > 0.0);
        assert!(weight("thanks") < 0.0);
        // Strongest signal ranks first
        assert_eq!(contributions[0].0, "urgent");
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let a = local_surrogate("urgent verify your account", 100, toy_score);
        let b = local_surrogate("urgent verify your account", 100, toy_score);
        assert_eq!(a, b);
    }

    #[test]
    fn test_repeated_tokens_collapse_to_one_feature() {
        let contributions = local_surrogate("urgent urgent urgent", 100, toy_score);
        assert_eq!(contributions.len(), 1);
        // Three occurrences all toggle together
        assert!(contributions[0].1 > 1.0);
    }
}
