use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::GenerationParams;

/// Text generation backend.
///
/// Returns the prompt followed by the generated continuation; callers strip
/// the echoed prefix themselves.
pub trait TextGenerator: Send + Sync + 'static {
    /// Model identity this backend serves (used for logging and registry keys).
    fn model(&self) -> &str;

    /// Generate a continuation for `prompt`.
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        params: GenerationParams,
    ) -> BoxFuture<'a, Result<String>>;
}

/// Evidence retrieval — returns a newline-joined block of text snippets.
pub trait SearchProvider: Send + Sync + 'static {
    fn search<'a>(&'a self, query: &'a str, max_results: usize) -> BoxFuture<'a, Result<String>>;
}
