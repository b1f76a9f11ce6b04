use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerdictError};

/// Stable identifier of a graph node.
///
/// Used as the context key and the result-tree key. It is never derived
/// from a display string.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Ordered, non-empty label vocabulary.
///
/// The last label is the sentinel ("unknown" / "not enough info") that a
/// label-enforcing node falls back to when the model output cannot be
/// parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelSet(Vec<String>);

impl LabelSet {
    /// Build a label set. Labels are upper-cased; an empty list is rejected.
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels
            .into_iter()
            .map(|l| l.into().trim().to_uppercase())
            .collect();
        if labels.is_empty() {
            return Err(VerdictError::Config("label set must not be empty".into()));
        }
        if labels.iter().any(|l| l.is_empty()) {
            return Err(VerdictError::Config("labels must not be blank".into()));
        }
        Ok(Self(labels))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.iter().any(|l| l == label)
    }

    /// The fallback label (last in the list).
    pub fn sentinel(&self) -> &str {
        // Non-empty by construction.
        &self.0[self.0.len() - 1]
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Position of a label in vocabulary order.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.0.iter().position(|l| l == label)
    }

    /// Resolve a free-form continuation to a member of this set.
    ///
    /// Takes the first whitespace-delimited token, upper-cases it, and
    /// returns it when it is an exact member. Anything else, punctuation
    /// included, resolves to the sentinel.
    pub fn resolve(&self, continuation: &str) -> String {
        let token = continuation
            .split_whitespace()
            .next()
            .map(str::to_uppercase)
            .unwrap_or_default();
        if self.contains(&token) {
            token
        } else {
            self.sentinel().to_string()
        }
    }
}

impl Default for LabelSet {
    /// The three-way fact-verification vocabulary.
    fn default() -> Self {
        Self(vec![
            "SUPPORTS".to_string(),
            "REFUTES".to_string(),
            "NOT ENOUGH INFO".to_string(),
        ])
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

impl<'de> Deserialize<'de> for LabelSet {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Vec::<String>::deserialize(deserializer)?;
        LabelSet::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Sampling parameters passed to a generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    /// Stochastic sampling when true; greedy decoding otherwise.
    pub do_sample: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 1024,
            temperature: 0.7,
            do_sample: true,
        }
    }
}

impl GenerationParams {
    /// Greedy decoding with the given output budget.
    pub fn deterministic(max_new_tokens: u32) -> Self {
        Self {
            max_new_tokens,
            temperature: 0.0,
            do_sample: false,
        }
    }
}

/// Normalize a reference or predicted label: trim, strip a single trailing
/// period, uppercase.
pub fn normalize_label(label: &str) -> String {
    let trimmed = label.trim();
    trimmed
        .strip_suffix('.')
        .unwrap_or(trimmed)
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fever() -> LabelSet {
        LabelSet::new(["SUPPORTS", "REFUTES", "NOT ENOUGH INFO"]).unwrap()
    }

    #[test]
    fn test_empty_label_set_rejected() {
        let empty: Vec<String> = vec![];
        assert!(LabelSet::new(empty).is_err());
        assert!(LabelSet::new(["TRUE", "  "]).is_err());
    }

    #[test]
    fn test_labels_uppercased_and_sentinel_is_last() {
        let labels = LabelSet::new(["fake", "True"]).unwrap();
        assert_eq!(labels.as_slice(), &["FAKE".to_string(), "TRUE".to_string()]);
        assert_eq!(labels.sentinel(), "TRUE");
        assert_eq!(fever().sentinel(), "NOT ENOUGH INFO");
    }

    #[test]
    fn test_resolve_first_token() {
        let labels = fever();
        assert_eq!(labels.resolve("supports, because the record says so"), "NOT ENOUGH INFO");
        assert_eq!(labels.resolve("REFUTES the claim entirely"), "REFUTES");
        assert_eq!(labels.resolve("  Supports\nmore text"), "SUPPORTS");
    }

    #[test]
    fn test_resolve_requires_exact_token() {
        let labels = LabelSet::new(["FAKE", "TRUE"]).unwrap();
        assert_eq!(labels.resolve("true."), "TRUE");
        assert_eq!(labels.resolve("fake. It was invented."), "TRUE");
        assert_eq!(labels.resolve("fake it was invented."), "FAKE");
        assert_eq!(fever().resolve("supports."), "NOT ENOUGH INFO");
    }

    #[test]
    fn test_resolve_garbage_falls_back_to_sentinel() {
        let labels = fever();
        for junk in ["", "   ", "???", "NOT", "maybe SUPPORTS", "\u{1F600} yes", "supports!"] {
            let out = labels.resolve(junk);
            assert!(labels.contains(&out), "{out} not in vocabulary");
            assert_eq!(out, "NOT ENOUGH INFO", "input {junk:?}");
        }
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  true. "), "TRUE");
        assert_eq!(normalize_label("Not Enough Info"), "NOT ENOUGH INFO");
        assert_eq!(normalize_label("REFUTES.."), "REFUTES.");
    }

    #[test]
    fn test_label_set_deserialize_validates() {
        let ok: LabelSet = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(ok.sentinel(), "B");
        assert!(serde_json::from_str::<LabelSet>("[]").is_err());
    }

    #[test]
    fn test_node_id_display() {
        let id = NodeId::from("judge");
        assert_eq!(id.to_string(), "judge");
        assert_eq!(id.as_str(), "judge");
    }
}
