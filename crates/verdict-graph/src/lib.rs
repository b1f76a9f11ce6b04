//! Debate graphs: nodes, per-branch contexts, the execution engine, and
//! pipelines that reduce a result tree to one label.

pub mod context;
pub mod executor;
pub mod node;
pub mod pipeline;
pub mod transform;

pub use context::Context;
pub use executor::{ExecutionResult, Executor};
pub use node::{Node, NodeGeneration, Retrieval};
pub use pipeline::{collect_leaf_outputs, final_label, Pipeline};
pub use transform::{Chain, FnTransform, Identity, InputTransform, Normalize, Template, WithEvidence};
