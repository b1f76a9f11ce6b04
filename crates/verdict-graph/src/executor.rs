use std::time::Instant;

use futures::future::{join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use tracing::debug;

use verdict_core::config::EngineConfig;
use verdict_core::error::Result;
use verdict_core::types::NodeId;

use crate::context::Context;
use crate::node::Node;

/// Output of one node together with the results of its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub node_id: NodeId,
    pub output: String,
    /// Child results in declared order.
    #[serde(default)]
    pub children: Vec<ExecutionResult>,
}

impl ExecutionResult {
    pub fn leaf(node_id: impl Into<NodeId>, output: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            output: output.into(),
            children: Vec::new(),
        }
    }

    /// Result of the direct child with the given id.
    pub fn child(&self, id: &str) -> Option<&ExecutionResult> {
        self.children.iter().find(|c| c.node_id.as_str() == id)
    }

    /// Result of any descendant (or self) with the given id, depth-first.
    pub fn find(&self, id: &str) -> Option<&ExecutionResult> {
        if self.node_id.as_str() == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The result reached by always descending into the last child.
    pub fn last_leaf(&self) -> &ExecutionResult {
        let mut node = self;
        while let Some(last) = node.children.last() {
            node = last;
        }
        node
    }

    /// Leaf outputs, depth-first in child order.
    pub fn leaf_outputs(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<String>) {
        if self.children.is_empty() {
            out.push(self.output.clone());
        } else {
            for child in &self.children {
                child.collect_leaves(out);
            }
        }
    }
}

/// Walks a node graph for one raw input.
///
/// Every node transforms the raw input against its own context copy,
/// optionally generates, records its output, then hands each child a fresh
/// copy. With `parallel_children` set, the children of a node run
/// concurrently; results keep declared order either way.
#[derive(Debug, Clone, Copy)]
pub struct Executor {
    parallel_children: bool,
}

impl Default for Executor {
    fn default() -> Self {
        Self {
            parallel_children: true,
        }
    }
}

impl Executor {
    pub fn new(parallel_children: bool) -> Self {
        Self { parallel_children }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.parallel_children)
    }

    pub fn sequential() -> Self {
        Self::new(false)
    }

    pub fn parallel_children(&self) -> bool {
        self.parallel_children
    }

    /// Invoke `node` with `raw_input` and the inbound context.
    ///
    /// A failing node aborts its subtree. Siblings already running are
    /// awaited, then the first error in declared order is returned.
    pub fn invoke<'a>(
        &'a self,
        node: &'a Node,
        raw_input: &'a str,
        inbound: Context,
    ) -> BoxFuture<'a, Result<ExecutionResult>> {
        Box::pin(async move {
            let start = Instant::now();
            let mut ctx = inbound;

            let node_input = node.transform().apply(&mut ctx, raw_input).await;
            let output = match node.generation() {
                None => node_input,
                Some(generation) => generation.run(node.id(), &node_input).await?,
            };
            ctx.record(node.id().clone(), output.clone());

            debug!(
                node = %node.id(),
                model = node.generation().map(|g| g.model()).unwrap_or("router"),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Node produced output"
            );

            let children = if self.parallel_children && node.children().len() > 1 {
                let pending = node
                    .children()
                    .iter()
                    .map(|child| self.invoke(child, raw_input, ctx.clone()));
                join_all(pending)
                    .await
                    .into_iter()
                    .collect::<Result<Vec<_>>>()?
            } else {
                let mut done = Vec::with_capacity(node.children().len());
                for child in node.children() {
                    done.push(self.invoke(child, raw_input, ctx.clone()).await?);
                }
                done
            };

            Ok(ExecutionResult {
                node_id: node.id().clone(),
                output,
                children,
            })
        })
    }
}
