use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use verdict_core::error::{Result, VerdictError};
use verdict_core::types::NodeId;

use crate::context::Context;
use crate::executor::{ExecutionResult, Executor};
use crate::node::Node;

/// A named, ordered list of root nodes.
pub struct Pipeline {
    name: String,
    roots: Vec<Arc<Node>>,
    executor: Executor,
}

impl Pipeline {
    /// Build a pipeline from at least one root.
    ///
    /// The same node may be reachable along several paths, but two distinct
    /// nodes sharing one id are rejected.
    pub fn new<I, R>(name: impl Into<String>, roots: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: Into<Arc<Node>>,
    {
        let roots: Vec<Arc<Node>> = roots.into_iter().map(Into::into).collect();
        if roots.is_empty() {
            return Err(VerdictError::EmptyPipeline);
        }
        check_unique_ids(&roots)?;
        Ok(Self {
            name: name.into(),
            roots,
            executor: Executor::default(),
        })
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roots(&self) -> &[Arc<Node>] {
        &self.roots
    }

    /// Run every root on `claim`, each with a fresh context, in list order.
    pub async fn predict(&self, claim: &str) -> Result<Vec<(NodeId, ExecutionResult)>> {
        let mut results = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            let tree = self.executor.invoke(root, claim, Context::new()).await?;
            results.push((root.id().clone(), tree));
        }
        debug!(pipeline = %self.name, roots = results.len(), "Prediction complete");
        Ok(results)
    }

    /// Tree of the first root plus its final label.
    pub async fn predict_final_label(&self, claim: &str) -> Result<(ExecutionResult, String)> {
        let (_, tree) = self
            .predict(claim)
            .await?
            .into_iter()
            .next()
            .ok_or(VerdictError::EmptyPipeline)?;
        let label = final_label(&tree).to_string();
        Ok((tree, label))
    }

    /// Graphviz DOT rendering of the graph, one statement per node and edge.
    pub fn to_dot(&self) -> String {
        let mut out = format!("digraph {} {{\n", quote(&self.name));
        let mut seen = HashSet::new();
        for root in &self.roots {
            write_dot(root, &mut seen, &mut out);
        }
        out.push_str("}\n");
        out
    }
}

/// Output reached by always descending into the last child.
pub fn final_label(tree: &ExecutionResult) -> &str {
    &tree.last_leaf().output
}

/// Leaf outputs of a result tree, depth-first in child order.
pub fn collect_leaf_outputs(tree: &ExecutionResult) -> Vec<String> {
    tree.leaf_outputs()
}

fn check_unique_ids(roots: &[Arc<Node>]) -> Result<()> {
    let mut owners: HashMap<&NodeId, *const Node> = HashMap::new();
    let mut stack: Vec<&Arc<Node>> = roots.iter().rev().collect();
    while let Some(node) = stack.pop() {
        let ptr = Arc::as_ptr(node);
        if let Some(existing) = owners.get(node.id()).copied() {
            if existing == ptr {
                continue;
            }
            return Err(VerdictError::GraphConstruction(format!(
                "two different nodes share the id '{}'",
                node.id()
            )));
        }
        owners.insert(node.id(), ptr);
        stack.extend(node.children().iter().rev());
    }
    Ok(())
}

fn write_dot(node: &Node, seen: &mut HashSet<NodeId>, out: &mut String) {
    if !seen.insert(node.id().clone()) {
        return;
    }
    out.push_str(&format!("    {};\n", quote(node.id().as_str())));
    for child in node.children() {
        out.push_str(&format!(
            "    {} -> {};\n",
            quote(node.id().as_str()),
            quote(child.id().as_str())
        ));
        write_dot(child, seen, out);
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.roots.iter().map(|r| r.id().as_str()).collect();
        write!(f, "{}", ids.join(" | "))
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("roots", &self.roots)
            .field("executor", &self.executor)
            .finish()
    }
}
