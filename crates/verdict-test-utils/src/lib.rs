//! Deterministic stand-ins for the generation backend and the search
//! client, plus small dataset fixtures.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;

use verdict_core::error::{Result, VerdictError};
use verdict_core::traits::{SearchProvider, TextGenerator};
use verdict_core::types::GenerationParams;

/// A generator that echoes the prompt followed by a scripted continuation.
///
/// Rules are checked in insertion order against the prompt; the first rule
/// whose needle occurs in the prompt wins. Every prompt is recorded.
pub struct ScriptedGenerator {
    model: String,
    rules: Vec<(String, String)>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            rules: Vec::new(),
            fallback: String::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always continue with `continuation`.
    pub fn constant(model: impl Into<String>, continuation: impl Into<String>) -> Self {
        Self::new(model).otherwise(continuation)
    }

    /// Continue with `continuation` when the prompt contains `needle`.
    pub fn when(mut self, needle: impl Into<String>, continuation: impl Into<String>) -> Self {
        self.rules.push((needle.into(), continuation.into()));
        self
    }

    /// Continuation used when no rule matches.
    pub fn otherwise(mut self, continuation: impl Into<String>) -> Self {
        self.fallback = continuation.into();
        self
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }

    fn continuation_for(&self, prompt: &str) -> &str {
        self.rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, c)| c.as_str())
            .unwrap_or(&self.fallback)
    }
}

impl TextGenerator for ScriptedGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        _params: GenerationParams,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            if let Ok(mut seen) = self.prompts.lock() {
                seen.push(prompt.to_string());
            }
            Ok(format!("{} {}", prompt, self.continuation_for(prompt)))
        })
    }
}

/// A generator whose every call fails like an unreachable server.
pub struct FailingGenerator {
    model: String,
}

impl FailingGenerator {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into() }
    }
}

impl TextGenerator for FailingGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    fn generate<'a>(
        &'a self,
        _prompt: &'a str,
        _params: GenerationParams,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            Err(VerdictError::GenerationFailed {
                model: self.model.clone(),
                status: Some(400),
                message: "backend rejected the request".into(),
            })
        })
    }
}

/// A search provider that returns fixed snippets and counts calls.
pub struct StaticSearch {
    snippets: Vec<String>,
    calls: AtomicUsize,
}

impl StaticSearch {
    pub fn new<I, S>(snippets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            snippets: snippets.into_iter().map(Into::into).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SearchProvider for StaticSearch {
    fn search<'a>(&'a self, _query: &'a str, max_results: usize) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .snippets
                .iter()
                .take(max_results)
                .cloned()
                .collect::<Vec<_>>()
                .join("\n"))
        })
    }
}

/// A search provider that is always throttled.
pub struct FailingSearch;

impl SearchProvider for FailingSearch {
    fn search<'a>(&'a self, _query: &'a str, _max_results: usize) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            Err(VerdictError::RetrievalThrottled {
                status: 429,
                attempts: 5,
            })
        })
    }
}

/// Write JSON Lines records to a temporary file.
pub fn temp_jsonl(records: &[serde_json::Value]) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    for record in records {
        writeln!(tmp, "{}", record).expect("write record");
    }
    tmp.flush().expect("flush records");
    tmp
}
