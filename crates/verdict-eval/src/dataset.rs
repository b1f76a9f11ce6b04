use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use verdict_core::config::EvaluationConfig;
use verdict_core::error::{Result, VerdictError};
use verdict_core::types::normalize_label;

/// Reference label as stored in a record: a single string, or a sequence
/// whose last element is the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelField {
    One(String),
    Many(Vec<String>),
}

impl LabelField {
    /// Normalized reference label (empty when the sequence is empty).
    pub fn reference(&self) -> String {
        match self {
            LabelField::One(label) => normalize_label(label),
            LabelField::Many(labels) => labels.last().map(|l| normalize_label(l)).unwrap_or_default(),
        }
    }
}

/// One labelled claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    #[serde(alias = "title")]
    pub claim: String,
    pub label: LabelField,
}

impl Example {
    pub fn new(claim: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            label: LabelField::One(label.into()),
        }
    }

    pub fn reference(&self) -> String {
        self.label.reference()
    }
}

/// Ordered sequence of examples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    examples: Vec<Example>,
}

impl Dataset {
    pub fn from_examples(examples: Vec<Example>) -> Self {
        let examples = examples
            .into_iter()
            .map(|mut ex| {
                ex.claim = ex.claim.trim().to_string();
                ex
            })
            .collect();
        Self { examples }
    }

    /// Load JSON Lines records of the form `{"claim": ..., "label": ...}`.
    /// Blank lines are skipped.
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| VerdictError::Dataset(format!("{}: {}", path.display(), e)))?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut examples = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let example: Example = serde_json::from_str(&line)
                .map_err(|e| VerdictError::Dataset(format!("line {}: {}", idx + 1, e)))?;
            examples.push(example);
        }
        Ok(Self::from_examples(examples))
    }

    /// Deterministic shuffle.
    pub fn shuffle(mut self, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        self.examples.shuffle(&mut rng);
        self
    }

    /// Keep the first `n` examples.
    pub fn take(mut self, n: usize) -> Self {
        self.examples.truncate(n);
        self
    }

    /// Keep only the first occurrence of each claim.
    pub fn dedupe(mut self) -> Self {
        let mut seen = HashSet::new();
        self.examples.retain(|ex| seen.insert(ex.claim.clone()));
        self
    }

    /// Apply the evaluation options: optional shuffle, subset, optional
    /// de-duplication of the subset.
    pub fn prepare(self, options: &EvaluationConfig) -> Self {
        let total = self.len();
        let mut ds = self;
        if options.shuffle {
            ds = ds.shuffle(options.seed);
        }
        ds = ds.take(options.subset);
        let sampled = ds.len();
        if options.dedupe {
            ds = ds.dedupe();
        }
        info!(total, sampled, unique = ds.len(), "Dataset prepared");
        ds
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn iter(&self) -> impl Iterator<Item = &Example> {
        self.examples.iter()
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}
