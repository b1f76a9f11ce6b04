use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use verdict_core::config::{AppConfig, ModelConfig};
use verdict_core::traits::SearchProvider;
use verdict_eval::catalog::describe;
use verdict_eval::{Catalog, Dataset, Evaluator, PredictionLog, PIPELINE_NAMES};
use verdict_llm::BackendRegistry;
use verdict_search::FetchClient;

#[derive(Parser)]
#[command(name = "verdict", version, about = "Claim verification with debating language models")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "verdict.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate pipelines against a labelled dataset
    Eval {
        /// Pipeline to run (repeatable; default: all configured)
        #[arg(short, long = "pipeline")]
        pipelines: Vec<String>,
        /// JSON Lines dataset (overrides evaluation.dataset)
        #[arg(short, long)]
        dataset: Option<PathBuf>,
        /// Number of examples (overrides evaluation.subset)
        #[arg(long)]
        subset: Option<usize>,
        /// Do not write the prediction log
        #[arg(long)]
        no_log: bool,
    },
    /// Run one pipeline on a single claim
    Predict {
        /// Pipeline name
        #[arg(short, long, default_value = "debate")]
        pipeline: String,
        /// The claim to verify
        #[arg(trailing_var_arg = true, required = true)]
        claim: Vec<String>,
    },
    /// List the built-in pipelines
    Pipelines,
    /// Print a pipeline graph in Graphviz DOT format
    Graph {
        /// Pipeline name
        name: String,
    },
    /// Run a web search and print the snippets
    Search {
        /// Maximum number of snippets (default: search.snippets)
        #[arg(short, long)]
        max: Option<usize>,
        #[arg(trailing_var_arg = true, required = true)]
        query: Vec<String>,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("verdict=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "verdict", &mut std::io::stdout());
        return Ok(());
    }

    if let Commands::Pipelines = &cli.command {
        for name in PIPELINE_NAMES {
            println!("{:<20} {}", name, describe(name).unwrap_or_default());
        }
        return Ok(());
    }

    let config = if cli.config.exists() {
        info!(path = %cli.config.display(), "Loading config");
        AppConfig::load(&cli.config)?
    } else {
        eprintln!(
            "Warning: {} not found, using environment defaults (VERDICT_MODEL, VERDICT_BASE_URL, OPENAI_API_KEY)",
            cli.config.display()
        );
        create_env_config()?
    };

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Graph { name } => {
            let pipeline = build_catalog(&config)?.build(&name)?;
            print!("{}", pipeline.to_dot());
        }
        Commands::Search { max, query } => {
            let client = FetchClient::from_config(&config.search)?;
            let snippets = client
                .search(&query.join(" "), max.unwrap_or(config.search.snippets))
                .await?;
            if snippets.is_empty() {
                println!("(no results)");
            } else {
                println!("{}", snippets);
            }
        }
        Commands::Predict { pipeline, claim } => {
            let pipeline = build_catalog(&config)?.build(&pipeline)?;
            let (tree, label) = pipeline.predict_final_label(&claim.join(" ")).await?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
            println!("Label: {}", label);
        }
        Commands::Eval {
            pipelines,
            dataset,
            subset,
            no_log,
        } => {
            run_eval(&config, pipelines, dataset, subset, no_log).await?;
        }
        Commands::Pipelines | Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Backends, search client and catalog wired from configuration.
fn build_catalog(config: &AppConfig) -> anyhow::Result<Catalog> {
    let registry = BackendRegistry::from_config(config)?;
    let search: Arc<dyn SearchProvider> = Arc::new(FetchClient::from_config(&config.search)?);
    Ok(Catalog::from_config(config, &registry)?.with_search(search, config.search.snippets))
}

async fn run_eval(
    config: &AppConfig,
    pipelines: Vec<String>,
    dataset: Option<PathBuf>,
    subset: Option<usize>,
    no_log: bool,
) -> anyhow::Result<()> {
    let path = dataset
        .or_else(|| config.evaluation.dataset.as_ref().map(PathBuf::from))
        .context("no dataset: pass --dataset or set evaluation.dataset")?;

    let mut options = config.evaluation.clone();
    if let Some(n) = subset {
        options.subset = n;
    }
    let dataset = Dataset::from_jsonl(&path)?.prepare(&options);
    println!("Running evaluation on {} examples...", dataset.len());

    let names = if pipelines.is_empty() {
        options.pipelines.clone()
    } else {
        pipelines
    };
    let pipelines = build_catalog(config)?.build_selected(&names)?;

    let mut evaluator = Evaluator::new(config.labels.clone());
    if !no_log {
        evaluator = evaluator.with_log(PredictionLog::open(&config.log_path()).await?);
    }

    for pipeline in &pipelines {
        println!("Evaluating pipeline: {}", pipeline.name());
        let summary = evaluator.evaluate(pipeline, &dataset).await?;
        println!("{}", summary);
        println!("{}", "-".repeat(80));
    }

    println!("Done.");
    Ok(())
}

fn create_env_config() -> anyhow::Result<AppConfig> {
    let api_key = std::env::var("OPENAI_API_KEY").ok();
    let base_url = std::env::var("VERDICT_BASE_URL").ok();

    let (provider, default_model, base_url) = match (&api_key, base_url) {
        (_, Some(url)) => ("openai", "tiiuae/falcon-7b-instruct", Some(url)),
        (Some(_), None) => ("openai", "gpt-3.5-turbo-instruct", None),
        // Default to a local Ollama server
        (None, None) => ("ollama", "llama3.2", Some("http://localhost:11434/v1".to_string())),
    };
    let model_id = std::env::var("VERDICT_MODEL").unwrap_or_else(|_| default_model.to_string());

    let config = AppConfig {
        labels: Default::default(),
        model: ModelConfig {
            provider: provider.to_string(),
            model_id,
            api_key,
            base_url,
            timeout_secs: 120,
        },
        explainer: None,
        generation: Default::default(),
        retry: Default::default(),
        search: Default::default(),
        engine: Default::default(),
        evaluation: Default::default(),
    };
    config.validate()?;
    Ok(config)
}
