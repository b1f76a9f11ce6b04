//! Built-in debate pipelines, generalized over any label set.
//!
//! Every pipeline starts at a `normaliser` router. Debate nodes are chained
//! into one spine so each node can read the output of every earlier
//! participant, and the verdict node is always the last leaf.

use std::sync::Arc;

use verdict_core::config::AppConfig;
use verdict_core::error::{Result, VerdictError};
use verdict_core::traits::{SearchProvider, TextGenerator};
use verdict_core::types::{GenerationParams, LabelSet};
use verdict_graph::{Chain, Executor, Node, NodeGeneration, Normalize, Pipeline, Template, WithEvidence};
use verdict_llm::BackendRegistry;

/// Id of the root router shared by all built-in pipelines.
pub const ROOT_ID: &str = "normaliser";

/// Template reference to the root's output.
const CLAIM: &str = "{node:normaliser}";

pub const PIPELINE_NAMES: &[&str] = &[
    "base",
    "base+search",
    "debate",
    "debate+search",
    "debate-ext",
    "debate-ext+search",
    "debate-ext2",
    "debate-ext2+search",
];

/// One-line description of a built-in pipeline.
pub fn describe(name: &str) -> Option<&'static str> {
    let shape = name.strip_suffix("+search").unwrap_or(name);
    let text = match shape {
        "base" => "single classifier",
        "debate" => "one debater per label, then a judge",
        "debate-ext" => "debaters, two response rounds, closing remarks, then a judge",
        "debate-ext2" => "two full debate rounds joined by additional arguments, then a judge",
        _ => return None,
    };
    PIPELINE_NAMES.contains(&name).then_some(text)
}

/// Factory for the built-in pipelines.
pub struct Catalog {
    model: Arc<dyn TextGenerator>,
    explainer: Arc<dyn TextGenerator>,
    labels: LabelSet,
    params: GenerationParams,
    search: Option<(Arc<dyn SearchProvider>, usize)>,
    executor: Executor,
}

impl Catalog {
    /// `model` argues, `explainer` delivers the verdict.
    pub fn new(
        model: Arc<dyn TextGenerator>,
        explainer: Arc<dyn TextGenerator>,
        labels: LabelSet,
    ) -> Self {
        Self {
            model,
            explainer,
            labels,
            params: GenerationParams::default(),
            search: None,
            executor: Executor::default(),
        }
    }

    pub fn from_config(config: &AppConfig, registry: &BackendRegistry) -> Result<Self> {
        let model = registry.get(&config.model.model_id)?;
        let explainer = registry.get(&config.explainer().model_id)?;
        Ok(Self::new(model, explainer, config.labels.clone())
            .with_params(config.generation.params())
            .with_executor(Executor::from_config(&config.engine)))
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    /// Evidence source for the `+search` variants.
    pub fn with_search(mut self, provider: Arc<dyn SearchProvider>, snippets: usize) -> Self {
        self.search = Some((provider, snippets));
        self
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn names() -> &'static [&'static str] {
        PIPELINE_NAMES
    }

    pub fn build(&self, name: &str) -> Result<Pipeline> {
        if !PIPELINE_NAMES.contains(&name) {
            return Err(VerdictError::Config(format!(
                "unknown pipeline '{}' (available: {})",
                name,
                PIPELINE_NAMES.join(", ")
            )));
        }
        let (shape, with_search) = match name.strip_suffix("+search") {
            Some(shape) => (shape, true),
            None => (name, false),
        };

        let mut spine = vec![self.root(with_search)?];
        match shape {
            "base" => spine.push(self.base_classifier()),
            "debate" => {
                spine.extend(self.debaters(""));
                spine.push(self.judge());
            }
            "debate-ext" => {
                spine.extend(self.debaters(""));
                spine.extend(self.responses(""));
                spine.extend(self.closings(""));
                spine.push(self.extended_judge());
            }
            _ => {
                spine.extend(self.debaters(""));
                spine.extend(self.responses(""));
                spine.push(self.additional_arguments());
                spine.extend(self.debaters("-r2"));
                spine.extend(self.responses("-r2"));
                spine.extend(self.closings("-r2"));
                spine.push(self.extended_judge());
            }
        }

        Ok(Pipeline::new(name, [link(spine)?])?.with_executor(self.executor))
    }

    /// Build the named pipelines in order; an empty list selects all.
    pub fn build_selected(&self, names: &[String]) -> Result<Vec<Pipeline>> {
        if names.is_empty() {
            return PIPELINE_NAMES.iter().map(|n| self.build(n)).collect();
        }
        names.iter().map(|n| self.build(n)).collect()
    }

    fn root(&self, with_search: bool) -> Result<Node> {
        let root = Node::new(ROOT_ID);
        if !with_search {
            return Ok(root.with_transform(Normalize));
        }
        let (provider, snippets) = self.search.clone().ok_or_else(|| {
            VerdictError::Config("search pipelines need a search provider".into())
        })?;
        Ok(root.with_transform(
            Chain::new()
                .then(Normalize)
                .then(WithEvidence::new(provider, snippets)),
        ))
    }

    fn argue(&self, instructions: String) -> NodeGeneration {
        NodeGeneration::new(self.model.clone())
            .free_form()
            .with_params(self.params)
            .with_labels(self.labels.clone())
            .with_instructions(instructions)
    }

    fn decide(&self, generator: &Arc<dyn TextGenerator>, instructions: String) -> NodeGeneration {
        NodeGeneration::new(generator.clone())
            .with_params(self.params)
            .with_labels(self.labels.clone())
            .with_instructions(instructions)
    }

    fn base_classifier(&self) -> Node {
        let instructions = format!("Label the claim as {}.", alternatives(&self.labels));
        Node::generating("base-clf", self.decide(&self.model, instructions))
            .with_transform(Template::new(CLAIM))
    }

    fn debaters(&self, round: &str) -> Vec<Node> {
        let template = if round.is_empty() {
            CLAIM.to_string()
        } else {
            format!("{}\n\nNew arguments:\n{{node:additional-arguments}}\n", CLAIM)
        };
        self.labels
            .iter()
            .map(|label| {
                let instructions = format!(
                    "You are a fact-checking debater. Argue that the claim is {label}. \
                     Explain in 1-3 paragraphs why {label} is the right label."
                );
                Node::generating(role_id("debater", label, round), self.argue(instructions))
                    .with_transform(Template::new(template.clone()))
            })
            .collect()
    }

    fn responses(&self, round: &str) -> Vec<Node> {
        let first = self.labels.iter().map(|label| {
            let template = format!("{}\n\n{}\n", CLAIM, self.transcript("debater", round));
            Node::generating(
                role_id("response1", label, round),
                self.argue(format!("Respond defending {label} in 1-2 paragraphs.")),
            )
            .with_transform(Template::new(template))
        });
        let second = self.labels.iter().map(|label| {
            let template = format!("{}\n\n{}\n", CLAIM, self.transcript("response1", round));
            Node::generating(
                role_id("response2", label, round),
                self.argue(format!("Second response for {label}.")),
            )
            .with_transform(Template::new(template))
        });
        first.chain(second).collect()
    }

    /// Closing remarks per label, reading the second responses of
    /// `last_round`. A pipeline closes once, so the ids carry no round.
    fn closings(&self, last_round: &str) -> Vec<Node> {
        self.labels
            .iter()
            .map(|label| {
                let template = format!(
                    "{}\n\n{{node:{}}}\n",
                    CLAIM,
                    role_id("response2", label, last_round)
                );
                Node::generating(
                    role_id("closing", label, ""),
                    self.argue(format!("Closing remarks for {label}.")),
                )
                .with_transform(Template::new(template))
            })
            .collect()
    }

    fn additional_arguments(&self) -> Node {
        let template = format!(
            "{}\n\nEarlier arguments:\n\n{}\n",
            CLAIM,
            self.transcript("response2", "")
        );
        Node::generating(
            "additional-arguments",
            self.argue("Provide new arguments after two full rounds.".to_string()),
        )
        .with_transform(Template::new(template))
    }

    fn judge(&self) -> Node {
        let arguments: Vec<String> = self
            .labels
            .iter()
            .map(|label| format!("{} arguments:\n{{node:{}}}", label, role_id("debater", label, "")))
            .collect();
        let instructions = format!(
            "You are an impartial fact-checking judge. Choose {}.",
            alternatives(&self.labels)
        );
        Node::generating("judge", self.decide(&self.explainer, instructions))
            .with_transform(Template::new(format!("{}\n\n{}\n", CLAIM, arguments.join("\n\n"))))
    }

    fn extended_judge(&self) -> Node {
        let instructions = format!(
            "Final judge decision after full debate. Choose {}.",
            alternatives(&self.labels)
        );
        Node::generating("judge-extended", self.decide(&self.explainer, instructions))
            .with_transform(Template::new(format!(
                "{}\n\n{}\n",
                CLAIM,
                self.transcript("closing", "")
            )))
    }

    /// `LABEL:\n{node:<role>-<label><round>}` blocks for every label.
    fn transcript(&self, role: &str, round: &str) -> String {
        self.labels
            .iter()
            .map(|label| format!("{}:\n{{node:{}}}", label, role_id(role, label, round)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Chain nodes into a spine: each node becomes the only child of the one
/// before it. Returns the head.
fn link(spine: Vec<Node>) -> Result<Node> {
    let mut nodes = spine.into_iter().rev();
    let mut head = nodes.next().ok_or(VerdictError::EmptyPipeline)?;
    for parent in nodes {
        head = parent.add_child(head)?;
    }
    Ok(head)
}

fn role_id(role: &str, label: &str, round: &str) -> String {
    format!("{}-{}{}", role, label.replace(' ', "-"), round)
}

/// "A", "A or B", "A, B, or C".
fn alternatives(labels: &LabelSet) -> String {
    match labels.as_slice() {
        [only] => only.clone(),
        [a, b] => format!("{} or {}", a, b),
        [init @ .., last] => format!("{}, or {}", init.join(", "), last),
        [] => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use verdict_graph::ExecutionResult;
    use verdict_test_utils::{ScriptedGenerator, StaticSearch};

    fn binary() -> LabelSet {
        LabelSet::new(["FAKE", "TRUE"]).unwrap()
    }

    fn catalog(labels: LabelSet) -> (Catalog, Arc<ScriptedGenerator>) {
        let gen = Arc::new(
            ScriptedGenerator::new("m")
                .when("debater", "an argument")
                .when("Respond", "a response")
                .when("Second response", "another response")
                .when("Closing", "closing words")
                .when("new arguments", "more arguments")
                .otherwise("FAKE"),
        );
        let search = Arc::new(StaticSearch::new(["snippet one", "snippet two"]));
        let catalog = Catalog::new(gen.clone(), gen.clone(), labels).with_search(search, 3);
        (catalog, gen)
    }

    /// Node ids along the path that always takes the last child.
    fn spine_ids(tree: &ExecutionResult) -> Vec<String> {
        let mut ids = vec![tree.node_id.to_string()];
        let mut node = tree;
        while let Some(last) = node.children.last() {
            ids.push(last.node_id.to_string());
            node = last;
        }
        ids
    }

    #[test]
    fn test_alternatives() {
        assert_eq!(alternatives(&LabelSet::new(["X"]).unwrap()), "X");
        assert_eq!(alternatives(&binary()), "FAKE or TRUE");
        assert_eq!(
            alternatives(&LabelSet::default()),
            "SUPPORTS, REFUTES, or NOT ENOUGH INFO"
        );
    }

    #[test]
    fn test_every_name_builds() {
        let (catalog, _) = catalog(LabelSet::default());
        for name in PIPELINE_NAMES {
            let pipeline = catalog.build(name).unwrap();
            assert_eq!(pipeline.name(), *name);
            assert_eq!(pipeline.to_string(), ROOT_ID);
            assert!(describe(name).is_some());
        }
        assert_eq!(catalog.build_selected(&[]).unwrap().len(), PIPELINE_NAMES.len());
    }

    #[test]
    fn test_unknown_name_rejected() {
        let (catalog, _) = catalog(binary());
        assert!(matches!(catalog.build("debate-9"), Err(VerdictError::Config(_))));
        assert!(describe("debate-9").is_none());
    }

    #[test]
    fn test_search_variant_needs_provider() {
        let gen = Arc::new(ScriptedGenerator::constant("m", "TRUE"));
        let catalog = Catalog::new(gen.clone(), gen, binary());
        assert!(catalog.build("base").is_ok());
        assert!(matches!(catalog.build("base+search"), Err(VerdictError::Config(_))));
    }

    #[tokio::test]
    async fn test_base_punctuated_reply_lands_on_sentinel() {
        let gen = Arc::new(ScriptedGenerator::constant("m", "true."));
        let catalog = Catalog::new(gen.clone(), gen, binary());
        let pipeline = catalog.build("base").unwrap();
        let (tree, label) = pipeline.predict_final_label("  the sky is blue").await.unwrap();
        assert_eq!(label, "TRUE");
        assert_eq!(tree.output, "The sky is blue");
    }

    #[tokio::test]
    async fn test_debate_judge_sees_every_argument() {
        let (catalog, gen) = catalog(binary());
        let pipeline = catalog.build("debate").unwrap();
        let (tree, label) = pipeline.predict_final_label("Cats can fly").await.unwrap();

        assert_eq!(label, "FAKE");
        assert_eq!(
            spine_ids(&tree),
            vec!["normaliser", "debater-FAKE", "debater-TRUE", "judge"]
        );
        let judge_prompt = gen
            .prompts()
            .into_iter()
            .find(|p| p.contains("impartial"))
            .unwrap();
        assert!(judge_prompt.contains("FAKE arguments:\nan argument"));
        assert!(judge_prompt.contains("TRUE arguments:\nan argument"));
        assert!(judge_prompt.ends_with("\nLabel:"));
    }

    #[tokio::test]
    async fn test_extended_debates_end_with_extended_judge() {
        let (catalog, _) = catalog(LabelSet::default());
        let pipeline = catalog.build("debate-ext").unwrap();
        let (tree, label) = pipeline.predict_final_label("Water boils at 100C").await.unwrap();
        let ids = spine_ids(&tree);
        assert_eq!(ids.len(), 1 + 3 + 3 + 3 + 3 + 1);
        assert!(ids.contains(&"closing-NOT-ENOUGH-INFO".to_string()));
        assert_eq!(ids.last().unwrap(), "judge-extended");
        assert_eq!(label, "NOT ENOUGH INFO");

        let pipeline = catalog.build("debate-ext2").unwrap();
        let (tree, _) = pipeline.predict_final_label("Water boils at 100C").await.unwrap();
        let ids = spine_ids(&tree);
        assert!(ids.contains(&"additional-arguments".to_string()));
        assert!(ids.contains(&"debater-SUPPORTS-r2".to_string()));
        assert!(ids.contains(&"response2-REFUTES-r2".to_string()));
        assert_eq!(tree.find("closing-SUPPORTS").unwrap().output, "closing words");
    }

    /// Answers every call with a distinct `reply<n>` and keeps the prompts.
    #[derive(Default)]
    struct Numbered {
        prompts: std::sync::Mutex<Vec<String>>,
    }

    impl TextGenerator for Numbered {
        fn model(&self) -> &str {
            "numbered"
        }

        fn generate<'a>(
            &'a self,
            prompt: &'a str,
            _params: GenerationParams,
        ) -> BoxFuture<'a, Result<String>> {
            Box::pin(async move {
                let mut prompts = self.prompts.lock().unwrap();
                prompts.push(prompt.to_string());
                Ok(format!("{} reply<{}>", prompt, prompts.len()))
            })
        }
    }

    #[tokio::test]
    async fn test_second_round_closing_reads_second_round_responses() {
        let gen = Arc::new(Numbered::default());
        let catalog = Catalog::new(gen.clone(), gen.clone(), binary());
        let pipeline = catalog.build("debate-ext2").unwrap();
        let (tree, _) = pipeline.predict_final_label("Cats can fly").await.unwrap();

        for label in ["FAKE", "TRUE"] {
            let first = &tree.find(&format!("response2-{label}")).unwrap().output;
            let second = &tree.find(&format!("response2-{label}-r2")).unwrap().output;
            assert_ne!(first, second);

            let closing = gen
                .prompts
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.contains(&format!("Closing remarks for {label}.")))
                .cloned()
                .unwrap();
            assert!(closing.contains(second.as_str()), "{closing}");
            assert!(!closing.contains(first.as_str()), "{closing}");
            assert!(tree.find(&format!("closing-{label}")).is_some());
        }
    }

    #[tokio::test]
    async fn test_search_variant_feeds_evidence_to_classifier() {
        let (catalog, gen) = catalog(binary());
        let pipeline = catalog.build("base+search").unwrap();
        let (tree, _) = pipeline.predict_final_label("cats can fly").await.unwrap();

        assert_eq!(tree.output, "Cats can fly\n\nContext:\nsnippet one\nsnippet two");
        assert!(gen.prompts()[0].contains("Claim: Cats can fly\n\nContext:\nsnippet one"));
    }
}
