use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use verdict_core::error::Result;
use verdict_core::types::{normalize_label, LabelSet};
use verdict_graph::{ExecutionResult, Pipeline};

use crate::dataset::Dataset;
use crate::metrics::Report;

/// How often progress is logged, in examples.
const PROGRESS_EVERY: usize = 10;

/// One line of the prediction log.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRecord {
    pub timestamp: String,
    pub pipeline: String,
    pub claim: String,
    pub predicted: String,
    pub reference: String,
    pub correct: bool,
    pub tree: ExecutionResult,
}

/// Append-only JSONL log of predictions.
///
/// Every record is flushed as soon as it is written, so a crashed run keeps
/// all completed lines.
pub struct PredictionLog {
    path: PathBuf,
    writer: tokio::io::BufWriter<tokio::fs::File>,
}

impl PredictionLog {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        info!(path = %path.display(), "Prediction log opened");
        Ok(Self {
            path: path.to_path_buf(),
            writer: tokio::io::BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&mut self, record: &PredictionRecord) -> Result<()> {
        let line = format!("{}\n", serde_json::to_string(record)?);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Outcome of evaluating one pipeline over a dataset.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub pipeline: String,
    /// Examples that produced a prediction.
    pub evaluated: usize,
    /// Examples whose prediction failed; excluded from the report.
    pub failed: usize,
    pub report: Report,
}

impl fmt::Display for PipelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pipeline: {}", self.pipeline)?;
        writeln!(f, "Evaluated: {} (failed: {})", self.evaluated, self.failed)?;
        write!(f, "{}", self.report)
    }
}

/// Runs pipelines over a dataset and scores their final labels.
pub struct Evaluator {
    labels: LabelSet,
    log: Option<PredictionLog>,
}

impl Evaluator {
    pub fn new(labels: LabelSet) -> Self {
        Self { labels, log: None }
    }

    pub fn with_log(mut self, log: PredictionLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Evaluate one pipeline.
    ///
    /// A failing example is logged and skipped; the run carries on with the
    /// next one.
    pub async fn evaluate(&mut self, pipeline: &Pipeline, dataset: &Dataset) -> Result<PipelineSummary> {
        let total = dataset.len();
        let mut references = Vec::with_capacity(total);
        let mut predictions = Vec::with_capacity(total);
        let mut failed = 0;

        info!(pipeline = %pipeline.name(), examples = total, "Evaluating pipeline");

        for (idx, example) in dataset.iter().enumerate() {
            let reference = example.reference();
            match pipeline.predict_final_label(&example.claim).await {
                Ok((tree, raw)) => {
                    let predicted = normalize_label(&raw);
                    let record = PredictionRecord {
                        timestamp: Utc::now().to_rfc3339(),
                        pipeline: pipeline.name().to_string(),
                        claim: example.claim.clone(),
                        predicted: predicted.clone(),
                        reference: reference.clone(),
                        correct: predicted == reference,
                        tree,
                    };
                    if let Some(log) = self.log.as_mut() {
                        if let Err(e) = log.append(&record).await {
                            error!(error = %e, path = %log.path().display(), "Failed to write prediction log");
                        }
                    }
                    references.push(reference);
                    predictions.push(predicted);
                }
                Err(e) => {
                    failed += 1;
                    error!(
                        pipeline = %pipeline.name(),
                        claim = %example.claim,
                        error = %e,
                        "Example failed"
                    );
                }
            }

            let done = idx + 1;
            if done % PROGRESS_EVERY == 0 || done == total {
                info!(pipeline = %pipeline.name(), done, total, failed, "Progress");
            }
        }

        let report = Report::compute(&self.labels, &references, &predictions)?;
        info!(
            pipeline = %pipeline.name(),
            accuracy = report.accuracy,
            evaluated = references.len(),
            failed,
            "Pipeline evaluated"
        );
        Ok(PipelineSummary {
            pipeline: pipeline.name().to_string(),
            evaluated: references.len(),
            failed,
            report,
        })
    }

    /// Evaluate pipelines in order.
    pub async fn evaluate_all(
        &mut self,
        pipelines: &[Pipeline],
        dataset: &Dataset,
    ) -> Result<Vec<PipelineSummary>> {
        let mut summaries = Vec::with_capacity(pipelines.len());
        for pipeline in pipelines {
            summaries.push(self.evaluate(pipeline, dataset).await?);
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use verdict_core::traits::TextGenerator;
    use verdict_graph::{Node, NodeGeneration};
    use verdict_test_utils::{FailingGenerator, ScriptedGenerator};

    use crate::dataset::Example;

    fn labels() -> LabelSet {
        LabelSet::new(["FAKE", "TRUE"]).unwrap()
    }

    fn classifier(gen: Arc<dyn TextGenerator>) -> Pipeline {
        let root = Node::new("root")
            .add_child(Node::generating("clf", NodeGeneration::new(gen).with_labels(labels())))
            .unwrap();
        Pipeline::new("clf", [root]).unwrap()
    }

    fn dataset() -> Dataset {
        Dataset::from_examples(vec![
            Example::new("The earth is flat", "FAKE"),
            Example::new("Water is wet", "true."),
            Example::new("Cats bark", "FAKE"),
        ])
    }

    #[tokio::test]
    async fn test_scores_final_labels() {
        let gen = Arc::new(
            ScriptedGenerator::new("m")
                .when("earth", "FAKE")
                .when("Water", "TRUE")
                .otherwise("TRUE"),
        );
        let mut evaluator = Evaluator::new(labels());
        let summary = evaluator.evaluate(&classifier(gen), &dataset()).await.unwrap();

        assert_eq!(summary.evaluated, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.report.correct, 2);
        assert_eq!(summary.report.confusion, vec![vec![1, 1], vec![0, 1]]);
        assert!(summary.to_string().starts_with("Pipeline: clf\n"));
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let mut evaluator = Evaluator::new(labels());
        let ok = classifier(Arc::new(ScriptedGenerator::constant("ok", "FAKE")));
        let broken = classifier(Arc::new(FailingGenerator::new("down")));

        let summaries = evaluator.evaluate_all(&[broken, ok], &dataset()).await.unwrap();
        assert_eq!(summaries[0].failed, 3);
        assert_eq!(summaries[0].evaluated, 0);
        assert_eq!(summaries[0].report.total, 0);
        assert_eq!(summaries[1].report.correct, 2);
    }

    #[tokio::test]
    async fn test_prediction_log_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("bench.jsonl");
        let log = PredictionLog::open(&path).await.unwrap();
        let mut evaluator = Evaluator::new(labels()).with_log(log);

        let gen = Arc::new(ScriptedGenerator::constant("m", "FAKE"));
        evaluator.evaluate(&classifier(gen), &dataset()).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1]["claim"], "Water is wet");
        assert_eq!(lines[1]["reference"], "TRUE");
        assert_eq!(lines[1]["predicted"], "FAKE");
        assert_eq!(lines[1]["correct"], false);
        assert_eq!(lines[1]["tree"]["children"][0]["node_id"], "clf");
    }
}
