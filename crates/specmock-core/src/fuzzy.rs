//! Approximate resolution of a user-supplied key against a declared key set.
//!
//! Resolution runs in phases and stops at the first that succeeds:
//!
//! 1. exact match,
//! 2. normalized match (case and separators ignored, `db_host` ≈ `dbHost`),
//! 3. weighted token overlap. Keys are split into tokens on case and
//!    separator boundaries, each token weighted by its inverse document
//!    frequency across the key set, and the score is the harmonic mean of how
//!    much of the candidate the input covers and how much of the input the
//!    candidate covers.
//!
//! A token-overlap match is accepted only when it clears the threshold, is
//! not tied with another key, carries the tokens that tell it apart from its
//! near-duplicates, and ends with the suffix shared by its family of keys.

use std::collections::HashMap;

/// Minimum token-overlap score for a fuzzy match.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Outcome of resolving one input key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyMatch<'a> {
    Exact(&'a str),
    Normalized(&'a str),
    Fuzzy { key: &'a str, score: f64 },
    NoMatch,
}

impl<'a> KeyMatch<'a> {
    /// The resolved key, if any.
    pub fn key(&self) -> Option<&'a str> {
        match *self {
            KeyMatch::Exact(key) | KeyMatch::Normalized(key) => Some(key),
            KeyMatch::Fuzzy { key, .. } => Some(key),
            KeyMatch::NoMatch => None,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, KeyMatch::Exact(_))
    }
}

#[derive(Debug, Clone)]
struct KnownKey {
    key: String,
    normalized: String,
    tokens: Vec<String>,
}

/// Resolves inputs against a fixed set of known keys.
#[derive(Debug, Clone)]
pub struct FuzzyKeyMatcher {
    keys: Vec<KnownKey>,
    idf: HashMap<String, f64>,
    threshold: f64,
}

impl FuzzyKeyMatcher {
    pub fn new<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        let keys: Vec<KnownKey> = keys
            .into_iter()
            .map(|key| {
                let key = key.into();
                KnownKey {
                    normalized: normalize(&key),
                    tokens: tokenize(&key),
                    key,
                }
            })
            .collect();

        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        for known in &keys {
            let mut unique = known.tokens.clone();
            unique.sort();
            unique.dedup();
            for token in unique {
                *document_frequency.entry(token).or_default() += 1;
            }
        }
        let n = keys.len() as f64;
        let idf = document_frequency
            .into_iter()
            .map(|(token, df)| (token, (1.0 + n / df as f64).ln()))
            .collect();

        Self {
            keys,
            idf,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.key.as_str())
    }

    pub fn resolve(&self, input: &str) -> KeyMatch<'_> {
        if let Some(known) = self.keys.iter().find(|k| k.key == input) {
            return KeyMatch::Exact(&known.key);
        }

        let normalized = normalize(input);
        let mut same: Vec<&KnownKey> = self
            .keys
            .iter()
            .filter(|k| !normalized.is_empty() && k.normalized == normalized)
            .collect();
        match same.len() {
            0 => {}
            1 => return KeyMatch::Normalized(&same.remove(0).key),
            _ => return KeyMatch::NoMatch,
        }

        let input_tokens = tokenize(input);
        if input_tokens.is_empty() {
            return KeyMatch::NoMatch;
        }

        let mut scored: Vec<(usize, f64)> = self
            .keys
            .iter()
            .enumerate()
            .map(|(i, known)| (i, self.score(&input_tokens, &known.tokens)))
            .filter(|(_, score)| *score >= self.threshold)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let Some(&(best, score)) = scored.first() else {
            return KeyMatch::NoMatch;
        };
        if scored
            .get(1)
            .is_some_and(|&(_, runner_up)| (score - runner_up).abs() < 1e-9)
        {
            return KeyMatch::NoMatch;
        }
        if !self.has_discriminators(best, &input_tokens) || !self.has_family_suffix(best, &input_tokens) {
            return KeyMatch::NoMatch;
        }
        KeyMatch::Fuzzy {
            key: &self.keys[best].key,
            score,
        }
    }

    /// The key the input most likely meant, when it is not already exact.
    pub fn suggest(&self, input: &str) -> Option<&str> {
        match self.resolve(input) {
            KeyMatch::Exact(_) | KeyMatch::NoMatch => None,
            other => other.key(),
        }
    }

    fn weight(&self, token: &str) -> f64 {
        self.idf
            .get(token)
            .copied()
            .unwrap_or_else(|| (1.0 + self.keys.len() as f64).ln())
    }

    fn score(&self, input: &[String], candidate: &[String]) -> f64 {
        let covered = |from: &[String], by: &[String]| -> f64 {
            let total: f64 = from.iter().map(|t| self.weight(t)).sum();
            if total == 0.0 {
                return 0.0;
            }
            let hit: f64 = from
                .iter()
                .filter(|t| by.iter().any(|b| similar(t, b)))
                .map(|t| self.weight(t))
                .sum();
            hit / total
        };
        let candidate_coverage = covered(candidate, input);
        let input_coverage = covered(input, candidate);
        if candidate_coverage + input_coverage == 0.0 {
            return 0.0;
        }
        2.0 * candidate_coverage * input_coverage / (candidate_coverage + input_coverage)
    }

    /// Keys sharing all but one token with `best` are its near-duplicates;
    /// the tokens that set `best` apart from each of them must be present.
    fn has_discriminators(&self, best: usize, input: &[String]) -> bool {
        let tokens = &self.keys[best].tokens;
        self.keys.iter().enumerate().all(|(i, other)| {
            if i == best {
                return true;
            }
            let shared = tokens.iter().filter(|t| other.tokens.contains(t)).count();
            let near = shared > 0 && shared + 1 >= tokens.len().max(other.tokens.len());
            if !near {
                return true;
            }
            tokens
                .iter()
                .filter(|t| !other.tokens.contains(t))
                .all(|t| input.iter().any(|i| similar(i, t)))
        })
    }

    /// When the last token of `best` ends several keys, it is a family
    /// suffix (`...TimeoutMs`) and the input must carry it too.
    fn has_family_suffix(&self, best: usize, input: &[String]) -> bool {
        let Some(suffix) = self.keys[best].tokens.last() else {
            return true;
        };
        let family = self
            .keys
            .iter()
            .filter(|k| k.tokens.len() > 1 && k.tokens.last() == Some(suffix))
            .count();
        family < 2 || input.iter().any(|t| similar(t, suffix))
    }
}

/// Lowercase and drop everything but letters and digits.
pub fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split a key into lowercase tokens on separators and case boundaries:
/// `maxHTTPRetries` → `max`, `http`, `retries`.
pub fn tokenize(key: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in key.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let chars: Vec<char> = word.chars().collect();
        let mut current = String::new();
        for (i, &ch) in chars.iter().enumerate() {
            if ch.is_uppercase() && !current.is_empty() {
                let prev_lower = chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit();
                let next_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
                let prev_upper = chars[i - 1].is_uppercase();
                if prev_lower || (prev_upper && next_lower) {
                    tokens.push(std::mem::take(&mut current).to_lowercase());
                }
            }
            current.push(ch);
        }
        if !current.is_empty() {
            tokens.push(current.to_lowercase());
        }
    }
    tokens
}

fn similar(a: &str, b: &str) -> bool {
    a == b || (a.chars().count() >= 4 && b.chars().count() >= 4 && levenshtein(a, b) <= 1)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];
    for (i, a_char) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}
