use std::io::Write;

use verdict_core::config::AppConfig;
use verdict_core::VerdictError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
labels = ["FAKE", "TRUE"]

[model]
provider = "vllm"
model_id = "tiiuae/falcon-7b-instruct"
base_url = "http://localhost:8000/v1"

[explainer]
provider = "openai"
model_id = "gpt-3.5-turbo-instruct"
api_key = "sk-test-key"

[generation]
max_new_tokens = 256
temperature = 0.2
do_sample = false

[retry]
max_retries = 1

[search]
snippets = 5
min_delay_ms = 0
max_delay_ms = 0

[engine]
parallel_children = false

[evaluation]
dataset = "data/fake-news.jsonl"
subset = 1500
shuffle = true
pipelines = ["base", "debate-ext"]
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.labels.as_slice(), &["FAKE".to_string(), "TRUE".to_string()]);
    assert_eq!(config.model.provider, "vllm");
    assert_eq!(config.model.base_url.as_deref(), Some("http://localhost:8000/v1"));

    let explainer = config.explainer();
    assert_eq!(explainer.model_id, "gpt-3.5-turbo-instruct");
    assert_eq!(explainer.api_key, Some("sk-test-key".to_string()));

    let params = config.generation.params();
    assert_eq!(params.max_new_tokens, 256);
    assert!(!params.do_sample);

    assert_eq!(config.retry.max_retries, 1);
    assert_eq!(config.search.snippets, 5);
    assert_eq!(config.search.max_retries, 5);
    assert!(!config.engine.parallel_children);
    assert_eq!(config.evaluation.subset, 1500);
    assert!(config.evaluation.shuffle);
    assert_eq!(config.evaluation.pipelines, vec!["base", "debate-ext"]);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("VERDICT_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
model_id = "test-model"
api_key = "${VERDICT_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("VERDICT_TEST_API_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[model]
model_id = "llama3.2"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.labels.sentinel(), "NOT ENOUGH INFO");
    assert!(config.explainer.is_none());
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.search.endpoint, "https://html.duckduckgo.com/html/");
    assert_eq!(config.search.timeout_secs, 10);
    assert_eq!(config.evaluation.seed, 42);
    assert!(config.evaluation.dedupe);
    assert_eq!(config.log_path().to_str(), Some("benchmark.jsonl"));
}

#[test]
fn test_missing_config_file() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/verdict.toml")).unwrap_err();
    assert!(matches!(err, VerdictError::ConfigNotFound(_)));
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = AppConfig::from_toml("[model]\nmodel_id = \"m\"\n").expect("parse");
    let rendered = toml::to_string_pretty(&config).expect("render");
    let reparsed = AppConfig::from_toml(&rendered).expect("reparse");
    assert_eq!(reparsed.labels, config.labels);
    assert_eq!(reparsed.search.region, "us-en");
}
