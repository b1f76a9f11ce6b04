//! Input transforms: how a node turns the raw claim plus ancestor outputs
//! into its own input.

use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use regex::{Captures, Regex};
use tracing::warn;

use verdict_core::traits::SearchProvider;
use verdict_core::types::NodeId;

use crate::context::Context;

/// Maps `(context, raw input)` to a node's input.
///
/// A transform may read ancestor outputs and may populate the context's
/// memoized evidence block. It never fails: retrieval problems degrade to an
/// empty evidence block.
pub trait InputTransform: Send + Sync + 'static {
    fn apply<'a>(&'a self, ctx: &'a mut Context, input: &'a str) -> BoxFuture<'a, String>;
}

/// Passes the raw input through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl InputTransform for Identity {
    fn apply<'a>(&'a self, _ctx: &'a mut Context, input: &'a str) -> BoxFuture<'a, String> {
        Box::pin(async move { input.to_string() })
    }
}

/// Trims the claim and capitalizes its first character.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalize;

impl Normalize {
    pub fn normalize(text: &str) -> String {
        let text = text.trim();
        let mut chars = text.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl InputTransform for Normalize {
    fn apply<'a>(&'a self, _ctx: &'a mut Context, input: &'a str) -> BoxFuture<'a, String> {
        Box::pin(async move { Self::normalize(input) })
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{(claim|node:([^{}]+))\}").expect("valid placeholder pattern"))
}

/// Text template over the claim and ancestor outputs.
///
/// `{claim}` expands to the raw input, `{node:<id>}` to the output recorded
/// by ancestor `<id>` (empty when that node is not an ancestor). Other text
/// is copied verbatim.
#[derive(Debug, Clone)]
pub struct Template {
    template: String,
}

impl Template {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Ids referenced by `{node:<id>}` placeholders, in order of appearance.
    pub fn referenced_nodes(&self) -> Vec<NodeId> {
        placeholder_pattern()
            .captures_iter(&self.template)
            .filter_map(|caps| caps.get(2).map(|m| NodeId::from(m.as_str())))
            .collect()
    }

    pub fn render(&self, ctx: &Context, claim: &str) -> String {
        placeholder_pattern()
            .replace_all(&self.template, |caps: &Captures| match caps.get(2) {
                Some(id) => ctx.get_str(id.as_str()).unwrap_or_default().to_string(),
                None => claim.to_string(),
            })
            .into_owned()
    }
}

impl InputTransform for Template {
    fn apply<'a>(&'a self, ctx: &'a mut Context, input: &'a str) -> BoxFuture<'a, String> {
        Box::pin(async move { self.render(ctx, input) })
    }
}

/// Appends one evidence block retrieved for the input.
///
/// The block is fetched at most once per context lineage: the first
/// application stores it in the context and later ones reuse it.
pub struct WithEvidence {
    provider: Arc<dyn SearchProvider>,
    snippets: usize,
}

impl WithEvidence {
    pub fn new(provider: Arc<dyn SearchProvider>, snippets: usize) -> Self {
        Self { provider, snippets }
    }
}

impl InputTransform for WithEvidence {
    fn apply<'a>(&'a self, ctx: &'a mut Context, input: &'a str) -> BoxFuture<'a, String> {
        Box::pin(async move {
            let evidence = match ctx.cached_evidence() {
                Some(cached) => cached.to_string(),
                None => {
                    let fetched = match self.provider.search(input, self.snippets).await {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Evidence retrieval failed, continuing without it");
                            String::new()
                        }
                    };
                    ctx.set_cached_evidence(fetched.clone());
                    fetched
                }
            };
            format!("{}\n\nContext:\n{}", input, evidence)
        })
    }
}

/// Applies transforms left to right, feeding each output into the next.
#[derive(Default, Clone)]
pub struct Chain {
    steps: Vec<Arc<dyn InputTransform>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, step: impl InputTransform) -> Self {
        self.steps.push(Arc::new(step));
        self
    }
}

impl InputTransform for Chain {
    fn apply<'a>(&'a self, ctx: &'a mut Context, input: &'a str) -> BoxFuture<'a, String> {
        Box::pin(async move {
            let mut current = input.to_string();
            for step in &self.steps {
                current = step.apply(ctx, &current).await;
            }
            current
        })
    }
}

/// Adapts a synchronous closure over `(context, input)`.
pub struct FnTransform<F>(pub F);

impl<F> InputTransform for FnTransform<F>
where
    F: Fn(&Context, &str) -> String + Send + Sync + 'static,
{
    fn apply<'a>(&'a self, ctx: &'a mut Context, input: &'a str) -> BoxFuture<'a, String> {
        let out = (self.0)(&*ctx, input);
        Box::pin(async move { out })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_test_utils::{FailingSearch, StaticSearch};

    #[tokio::test]
    async fn test_identity_and_normalize() {
        let mut ctx = Context::new();
        assert_eq!(Identity.apply(&mut ctx, "  raw ").await, "  raw ");
        assert_eq!(Normalize.apply(&mut ctx, "  the moon is cheese ").await, "The moon is cheese");
        assert_eq!(Normalize::normalize("   "), "");
        assert_eq!(Normalize::normalize("élan"), "Élan");
    }

    #[tokio::test]
    async fn test_template_reads_ancestors() {
        let mut ctx = Context::new();
        ctx.record(NodeId::from("debater-FAKE"), "made up");
        let template = Template::new(
            "Headline: {claim}\n\nFAKE:\n{node:debater-FAKE}\n\nTRUE:\n{node:debater-TRUE}\n",
        );
        let out = template.apply(&mut ctx, "Cats can fly").await;
        assert_eq!(out, "Headline: Cats can fly\n\nFAKE:\nmade up\n\nTRUE:\n\n");
        assert_eq!(
            template.referenced_nodes(),
            vec![NodeId::from("debater-FAKE"), NodeId::from("debater-TRUE")]
        );
    }

    #[tokio::test]
    async fn test_template_leaves_other_braces() {
        let ctx = Context::new();
        let template = Template::new("{json} {claim}");
        assert_eq!(template.render(&ctx, "x"), "{json} x");
    }

    #[tokio::test]
    async fn test_evidence_memoized() {
        let search = Arc::new(StaticSearch::new(["a", "b", "c", "d"]));
        let transform = WithEvidence::new(search.clone(), 2);
        let mut ctx = Context::new();

        let first = transform.apply(&mut ctx, "Claim").await;
        let second = transform.apply(&mut ctx, "Claim").await;

        assert_eq!(first, "Claim\n\nContext:\na\nb");
        assert_eq!(first, second);
        assert_eq!(search.calls(), 1);
        assert_eq!(ctx.cached_evidence(), Some("a\nb"));
    }

    #[tokio::test]
    async fn test_evidence_failure_degrades() {
        let transform = WithEvidence::new(Arc::new(FailingSearch), 3);
        let mut ctx = Context::new();
        let out = transform.apply(&mut ctx, "Claim").await;
        assert_eq!(out, "Claim\n\nContext:\n");
    }

    #[tokio::test]
    async fn test_chain_normalize_then_evidence() {
        let search = Arc::new(StaticSearch::new(["snippet"]));
        let chain = Chain::new()
            .then(Normalize)
            .then(WithEvidence::new(search, 3));
        let mut ctx = Context::new();
        let out = chain.apply(&mut ctx, " water is wet").await;
        assert_eq!(out, "Water is wet\n\nContext:\nsnippet");
    }

    #[tokio::test]
    async fn test_fn_transform() {
        let mut ctx = Context::new();
        ctx.record(NodeId::from("a"), "A");
        let t = FnTransform(|ctx: &Context, input: &str| {
            format!("{}:{}", input, ctx.get_str("a").unwrap_or("-"))
        });
        assert_eq!(t.apply(&mut ctx, "x").await, "x:A");
    }
}
