use std::fmt;

use serde::Serialize;

use verdict_core::error::{Result, VerdictError};
use verdict_core::types::LabelSet;

/// Precision, recall, F1 and support of one label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Classification report over a fixed label vocabulary.
///
/// The confusion matrix has one row per reference label and one column per
/// predicted label, both in vocabulary order. Pairs involving a label
/// outside the vocabulary count toward accuracy only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub per_class: Vec<ClassMetrics>,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    pub confusion: Vec<Vec<usize>>,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

impl Report {
    pub fn compute(labels: &LabelSet, references: &[String], predictions: &[String]) -> Result<Self> {
        if references.len() != predictions.len() {
            return Err(VerdictError::Metrics(format!(
                "{} references but {} predictions",
                references.len(),
                predictions.len()
            )));
        }

        let n = labels.len();
        let mut confusion = vec![vec![0usize; n]; n];
        let mut correct = 0;
        for (reference, predicted) in references.iter().zip(predictions) {
            if reference == predicted {
                correct += 1;
            }
            if let (Some(r), Some(p)) = (labels.index_of(reference), labels.index_of(predicted)) {
                confusion[r][p] += 1;
            }
        }

        let per_class: Vec<ClassMetrics> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let tp = confusion[i][i];
                let predicted = predictions.iter().filter(|p| *p == label).count();
                let support = references.iter().filter(|r| *r == label).count();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                ClassMetrics {
                    label: label.clone(),
                    precision,
                    recall,
                    f1: f1(precision, recall),
                    support,
                }
            })
            .collect();

        let support: usize = per_class.iter().map(|c| c.support).sum();
        let mean = |get: fn(&ClassMetrics) -> f64| -> f64 {
            per_class.iter().map(get).sum::<f64>() / n as f64
        };
        let weighted = |get: fn(&ClassMetrics) -> f64| -> f64 {
            if support == 0 {
                0.0
            } else {
                per_class.iter().map(|c| get(c) * c.support as f64).sum::<f64>() / support as f64
            }
        };

        let macro_avg = ClassMetrics {
            label: "macro avg".into(),
            precision: mean(|c| c.precision),
            recall: mean(|c| c.recall),
            f1: mean(|c| c.f1),
            support,
        };
        let weighted_avg = ClassMetrics {
            label: "weighted avg".into(),
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
            support,
        };

        Ok(Self {
            total: references.len(),
            correct,
            accuracy: ratio(correct, references.len()),
            per_class,
            macro_avg,
            weighted_avg,
            confusion,
        })
    }

    pub fn class(&self, label: &str) -> Option<&ClassMetrics> {
        self.per_class.iter().find(|c| c.label == label)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .per_class
            .iter()
            .map(|c| c.label.len())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(12);

        writeln!(f, "Accuracy: {:.3}% ({}/{})", self.accuracy * 100.0, self.correct, self.total)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$}  {:>9}  {:>9}  {:>9}  {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for class in &self.per_class {
            write_row(f, class, width)?;
        }
        writeln!(f)?;
        write_row(f, &self.macro_avg, width)?;
        write_row(f, &self.weighted_avg, width)?;

        writeln!(f)?;
        writeln!(f, "Confusion matrix (rows = reference, columns = predicted):")?;
        let cell = self
            .confusion
            .iter()
            .flatten()
            .map(|v| v.to_string().len())
            .max()
            .unwrap_or(1);
        for (class, counts) in self.per_class.iter().zip(&self.confusion) {
            let cells: Vec<String> = counts.iter().map(|v| format!("{:>cell$}", v)).collect();
            writeln!(f, "{:>width$}  [{}]", class.label, cells.join(" "))?;
        }
        Ok(())
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, c: &ClassMetrics, width: usize) -> fmt::Result {
    writeln!(
        f,
        "{:>width$}  {:>9.4}  {:>9.4}  {:>9.4}  {:>9}",
        c.label, c.precision, c.recall, c.f1, c.support
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let labels = LabelSet::new(["FAKE", "TRUE"]).unwrap();
        let err = Report::compute(&labels, &strings(&["FAKE"]), &[]).unwrap_err();
        assert!(matches!(err, VerdictError::Metrics(_)));
    }

    #[test]
    fn test_binary_report() {
        let labels = LabelSet::new(["FAKE", "TRUE"]).unwrap();
        let refs = strings(&["FAKE", "FAKE", "TRUE", "TRUE"]);
        let preds = strings(&["FAKE", "TRUE", "TRUE", "TRUE"]);
        let report = Report::compute(&labels, &refs, &preds).unwrap();

        assert_eq!(report.correct, 3);
        assert!(approx(report.accuracy, 0.75));
        assert_eq!(report.confusion, vec![vec![1, 1], vec![0, 2]]);

        let fake = report.class("FAKE").unwrap();
        assert!(approx(fake.precision, 1.0));
        assert!(approx(fake.recall, 0.5));
        assert!(approx(fake.f1, 2.0 / 3.0));
        assert_eq!(fake.support, 2);

        let truth = report.class("TRUE").unwrap();
        assert!(approx(truth.precision, 2.0 / 3.0));
        assert!(approx(truth.recall, 1.0));
        assert!(approx(report.macro_avg.recall, 0.75));
        assert_eq!(report.weighted_avg.support, 4);
    }

    #[test]
    fn test_out_of_vocabulary_counts_toward_accuracy_only() {
        let labels = LabelSet::new(["FAKE", "TRUE"]).unwrap();
        let refs = strings(&["MIXED", "TRUE"]);
        let preds = strings(&["MIXED", "FAKE"]);
        let report = Report::compute(&labels, &refs, &preds).unwrap();
        assert_eq!(report.correct, 1);
        assert_eq!(report.confusion, vec![vec![0, 0], vec![1, 0]]);
        assert!(approx(report.class("FAKE").unwrap().precision, 0.0));
    }

    #[test]
    fn test_empty_input() {
        let report = Report::compute(&LabelSet::default(), &[], &[]).unwrap();
        assert_eq!(report.total, 0);
        assert!(approx(report.accuracy, 0.0));
        assert!(approx(report.weighted_avg.f1, 0.0));
    }

    #[test]
    fn test_display_contains_sections() {
        let labels = LabelSet::default();
        let refs = strings(&["SUPPORTS", "REFUTES"]);
        let preds = strings(&["SUPPORTS", "NOT ENOUGH INFO"]);
        let text = Report::compute(&labels, &refs, &preds).unwrap().to_string();
        assert!(text.starts_with("Accuracy: 50.000% (1/2)"));
        assert!(text.contains("NOT ENOUGH INFO"));
        assert!(text.contains("macro avg"));
        assert!(text.contains("Confusion matrix"));
    }
}
