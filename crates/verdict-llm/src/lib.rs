pub mod providers;
pub mod registry;
pub mod retry;

use verdict_core::config::ModelConfig;
use verdict_core::error::{Result, VerdictError};
use verdict_core::traits::TextGenerator;

pub use providers::openai::CompletionsClient;
pub use registry::BackendRegistry;
pub use retry::RetryingGenerator;

/// Create a generation client based on the provider name.
pub fn create_generator(config: &ModelConfig) -> Result<Box<dyn TextGenerator>> {
    match config.provider.as_str() {
        // All supported servers speak the OpenAI completions protocol
        "openai" | "vllm" | "ollama" | "tgi" | "llamacpp" | "openrouter" => {
            Ok(Box::new(CompletionsClient::new(config)?))
        }
        other => Err(VerdictError::Config(format!(
            "unsupported generation provider: {}",
            other
        ))),
    }
}
