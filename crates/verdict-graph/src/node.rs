use std::fmt;
use std::sync::Arc;

use tracing::warn;

use verdict_core::error::{Result, VerdictError};
use verdict_core::traits::{SearchProvider, TextGenerator};
use verdict_core::types::{GenerationParams, LabelSet, NodeId};

use crate::transform::{Identity, InputTransform};

/// Evidence source consulted by a generating node before prompting.
#[derive(Clone)]
pub struct Retrieval {
    pub provider: Arc<dyn SearchProvider>,
    pub snippets: usize,
}

/// Generation capability of a node.
#[derive(Clone)]
pub struct NodeGeneration {
    generator: Arc<dyn TextGenerator>,
    instructions: Option<String>,
    params: GenerationParams,
    enforce_labels: bool,
    labels: LabelSet,
    retrieval: Option<Retrieval>,
}

impl NodeGeneration {
    /// Label-enforcing generation with default parameters and labels.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            instructions: None,
            params: GenerationParams::default(),
            enforce_labels: true,
            labels: LabelSet::default(),
            retrieval: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_labels(mut self, labels: LabelSet) -> Self {
        self.labels = labels;
        self
    }

    /// Keep the free-form continuation instead of resolving it to a label.
    pub fn free_form(mut self) -> Self {
        self.enforce_labels = false;
        self
    }

    pub fn with_retrieval(mut self, provider: Arc<dyn SearchProvider>, snippets: usize) -> Self {
        self.retrieval = Some(Retrieval { provider, snippets });
        self
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn enforces_labels(&self) -> bool {
        self.enforce_labels
    }

    /// Assemble the prompt for `input`, with an optional evidence block.
    pub fn build_prompt(&self, input: &str, evidence: &str) -> String {
        let mut prompt = String::new();
        if !evidence.is_empty() {
            prompt.push_str("Context:\n");
            prompt.push_str(evidence);
            prompt.push_str("\n\n");
        }
        match &self.instructions {
            Some(instructions) => prompt.push_str(instructions),
            None => prompt.push_str(&format!(
                "Classify the claim below as one of: {}. Output only the label.",
                self.labels
            )),
        }
        prompt.push_str("\n\nClaim: ");
        prompt.push_str(input);
        prompt.push_str("\nLabel:");
        prompt
    }

    /// Run retrieval (if configured), prompt the model, and post-process.
    pub async fn run(&self, node_id: &NodeId, input: &str) -> Result<String> {
        let evidence = match &self.retrieval {
            Some(retrieval) => match retrieval.provider.search(input, retrieval.snippets).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(node = %node_id, error = %e, "Retrieval failed, prompting without evidence");
                    String::new()
                }
            },
            None => String::new(),
        };

        let prompt = self.build_prompt(input, &evidence);
        let raw = self.generator.generate(&prompt, self.params).await?;
        let continuation = strip_prompt(&raw, &prompt);

        if self.enforce_labels {
            Ok(self.labels.resolve(continuation))
        } else {
            Ok(continuation.to_string())
        }
    }
}

/// Drop the echoed prompt from a backend reply and trim the remainder.
pub fn strip_prompt<'a>(raw: &'a str, prompt: &str) -> &'a str {
    raw.strip_prefix(prompt)
        .or_else(|| raw.get(prompt.len()..))
        .unwrap_or_default()
        .trim()
}

/// A vertex of a debate graph.
///
/// A node without a generation capability is a router: it emits its
/// transformed input unchanged. Nodes are immutable once built; children are
/// shared behind `Arc` and attached in declared order.
#[derive(Clone)]
pub struct Node {
    id: NodeId,
    transform: Arc<dyn InputTransform>,
    generation: Option<NodeGeneration>,
    children: Vec<Arc<Node>>,
}

impl Node {
    /// A router node with the identity transform.
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            transform: Arc::new(Identity),
            generation: None,
            children: Vec::new(),
        }
    }

    /// A generating node with the identity transform.
    pub fn generating(id: impl Into<NodeId>, generation: NodeGeneration) -> Self {
        Self::new(id).with_generation(generation)
    }

    pub fn with_transform(mut self, transform: impl InputTransform) -> Self {
        self.transform = Arc::new(transform);
        self
    }

    pub fn with_shared_transform(mut self, transform: Arc<dyn InputTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_generation(mut self, generation: NodeGeneration) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Attach children after any existing ones, preserving order.
    ///
    /// Fails when a child reuses the parent's id or a sibling's id.
    pub fn add_children<I, C>(mut self, children: I) -> Result<Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<Arc<Node>>,
    {
        for child in children {
            let child = child.into();
            if child.id == self.id {
                return Err(VerdictError::GraphConstruction(format!(
                    "node '{}' cannot be its own child",
                    self.id
                )));
            }
            if self.children.iter().any(|c| c.id == child.id) {
                return Err(VerdictError::GraphConstruction(format!(
                    "node '{}' already has a child with id '{}'",
                    self.id, child.id
                )));
            }
            self.children.push(child);
        }
        Ok(self)
    }

    /// Attach a single child.
    pub fn add_child(self, child: impl Into<Arc<Node>>) -> Result<Self> {
        self.add_children([child.into()])
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn transform(&self) -> &dyn InputTransform {
        self.transform.as_ref()
    }

    pub fn generation(&self) -> Option<&NodeGeneration> {
        self.generation.as_ref()
    }

    pub fn is_router(&self) -> bool {
        self.generation.is_none()
    }

    pub fn children(&self) -> &[Arc<Node>] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("model", &self.generation.as_ref().map(|g| g.model()))
            .field(
                "children",
                &self.children.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.id)
    }
}
