//! Evaluation of debate pipelines against labelled claims.

pub mod catalog;
pub mod dataset;
pub mod metrics;
pub mod runner;

pub use catalog::{Catalog, PIPELINE_NAMES};
pub use dataset::{Dataset, Example, LabelField};
pub use metrics::{ClassMetrics, Report};
pub use runner::{Evaluator, PipelineSummary, PredictionLog, PredictionRecord};
