use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use verdict_core::types::NodeId;

/// Ancestor outputs visible to a node, plus the memoized evidence block.
///
/// A node records its output into its own copy and hands each child a
/// further copy, so siblings never observe one another's writes. Cloning is
/// the isolation boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    outputs: HashMap<NodeId, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cached_evidence: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output recorded by an ancestor node, if any.
    pub fn get(&self, id: &NodeId) -> Option<&str> {
        self.outputs.get(id).map(String::as_str)
    }

    /// Like [`Context::get`], keyed by a plain string.
    pub fn get_str(&self, id: &str) -> Option<&str> {
        self.get(&NodeId::from(id))
    }

    pub fn record(&mut self, id: NodeId, output: impl Into<String>) {
        self.outputs.insert(id, output.into());
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.outputs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn cached_evidence(&self) -> Option<&str> {
        self.cached_evidence.as_deref()
    }

    pub fn set_cached_evidence(&mut self, evidence: impl Into<String>) {
        self.cached_evidence = Some(evidence.into());
    }
}
