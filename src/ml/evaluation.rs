use crate::error::{AppError, Result};
use crate::ingest::IncidentWriter;
use crate::ml::classifier::Classifier;
use crate::ml::encoder::FeatureMatrix;
use crate::ml::models::{ClassMetrics, ModelMetrics, Prediction};
use crate::models::{Incident, RiskLabel};
use ndarray::{Array2, Axis};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;
use tracing::info;

/// Extra columns appended to misclassified incident rows
pub const MISCLASSIFIED_COLUMNS: [&str; 5] = [
    "_true_label",
    "_pred_label",
    "_pred_prob_LOW",
    "_pred_prob_MEDIUM",
    "_pred_prob_HIGH",
];

/// Confusion matrix; rows are true classes, columns predicted classes
pub fn confusion_matrix(y_true: &[usize], y_pred: &[usize]) -> Array2<usize> {
    let mut matrix = Array2::zeros((RiskLabel::COUNT, RiskLabel::COUNT));
    for (&t, &p) in y_true.iter().zip(y_pred) {
        if t < RiskLabel::COUNT && p < RiskLabel::COUNT {
            matrix[[t, p]] += 1;
        }
    }
    matrix
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

/// Per-class precision, recall and F1 plus their averages.
///
/// Zero denominators yield 0 rather than an error.
pub fn calculate_metrics(y_true: &[usize], y_pred: &[usize]) -> ModelMetrics {
    let n_samples = y_true.len();
    if n_samples == 0 {
        return ModelMetrics::new();
    }

    let matrix = confusion_matrix(y_true, y_pred);
    let correct: usize = (0..RiskLabel::COUNT).map(|k| matrix[[k, k]]).sum();
    let accuracy = ratio(correct, n_samples);

    let mut per_class = BTreeMap::new();
    for label in RiskLabel::ALL {
        let k = label.index();
        let tp = matrix[[k, k]];
        let predicted = matrix.column(k).sum();
        let support = matrix.row(k).sum();

        let precision = ratio(tp, predicted);
        let recall = ratio(tp, support);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        per_class.insert(
            label,
            ClassMetrics {
                precision,
                recall,
                f1_score,
                support,
            },
        );
    }

    let n_classes = RiskLabel::COUNT as f64;
    let macro_avg = |f: fn(&ClassMetrics) -> f64| per_class.values().map(f).sum::<f64>() / n_classes;
    let weighted_avg = |f: fn(&ClassMetrics) -> f64| {
        per_class
            .values()
            .map(|m| f(m) * m.support as f64)
            .sum::<f64>()
            / n_samples as f64
    };

    ModelMetrics {
        accuracy,
        precision: macro_avg(|m| m.precision),
        recall: macro_avg(|m| m.recall),
        f1_score: macro_avg(|m| m.f1_score),
        weighted_precision: weighted_avg(|m| m.precision),
        weighted_recall: weighted_avg(|m| m.recall),
        weighted_f1_score: weighted_avg(|m| m.f1_score),
        confusion_matrix: Some(matrix),
        per_class_metrics: per_class,
    }
}

/// Text report: one line per class, accuracy, macro and weighted averages
pub fn classification_report(metrics: &ModelMetrics) -> String {
    let total = metrics.support();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{:>14} {:>9} {:>9} {:>9} {:>9}",
        "", "precision", "recall", "f1-score", "support"
    );
    let _ = writeln!(out);
    for (label, m) in &metrics.per_class_metrics {
        let _ = writeln!(
            out,
            "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            label.to_string(),
            m.precision,
            m.recall,
            m.f1_score,
            m.support
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:>14} {:>9} {:>9} {:>9.2} {:>9}",
        "accuracy", "", "", metrics.accuracy, total
    );
    let _ = writeln!(
        out,
        "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
        "macro avg", metrics.precision, metrics.recall, metrics.f1_score, total
    );
    let _ = writeln!(
        out,
        "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
        "weighted avg",
        metrics.weighted_precision,
        metrics.weighted_recall,
        metrics.weighted_f1_score,
        total
    );
    out
}

/// Confusion matrix as an aligned text table, true classes down the side
pub fn confusion_matrix_table(matrix: &Array2<usize>) -> String {
    let mut out = String::new();
    let _ = write!(out, "{:>14}", "true \\ pred");
    for label in RiskLabel::ALL {
        let _ = write!(out, " {:>9}", label.to_string());
    }
    let _ = writeln!(out);
    for label in RiskLabel::ALL {
        let _ = write!(out, "{:>14}", label.to_string());
        for count in matrix.row(label.index()) {
            let _ = write!(out, " {:>9}", count);
        }
        let _ = writeln!(out);
    }
    out
}

/// Write the confusion matrix as CSV with `true_*` rows and `pred_*` columns
pub fn write_confusion_matrix<W: Write>(writer: W, matrix: &Array2<usize>) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec![String::new()];
    header.extend(RiskLabel::ALL.iter().map(|l| format!("pred_{}", l)));
    csv_writer.write_record(&header)?;

    for label in RiskLabel::ALL {
        let mut record = vec![format!("true_{}", label)];
        record.extend(matrix.row(label.index()).iter().map(|c| c.to_string()));
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// A test row whose predicted label differs from its true label
#[derive(Debug, Clone)]
pub struct Misclassified {
    pub row: usize,
    pub true_label: RiskLabel,
    pub prediction: Prediction<RiskLabel>,
}

impl Misclassified {
    /// Values for [`MISCLASSIFIED_COLUMNS`]
    pub fn extra_fields(&self) -> Vec<String> {
        let mut fields = vec![self.true_label.to_string(), self.prediction.value.to_string()];
        fields.extend(self.prediction.probabilities.iter().map(|p| format!("{:.6}", p)));
        fields
    }
}

/// Everything produced by scoring the test set
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub metrics: ModelMetrics,
    pub predictions: Vec<Prediction<RiskLabel>>,
    pub misclassified: Vec<Misclassified>,
}

impl Evaluation {
    /// Classification report followed by the confusion matrix
    pub fn report(&self) -> String {
        let mut out = classification_report(&self.metrics);
        if let Some(matrix) = &self.metrics.confusion_matrix {
            let _ = writeln!(out);
            let _ = writeln!(out, "Confusion Matrix:");
            out.push_str(&confusion_matrix_table(matrix));
        }
        out
    }

    /// Write misclassified incidents with their true/predicted labels and probabilities
    pub fn write_misclassified<W: Write>(&self, writer: W, incidents: &[Incident]) -> Result<()> {
        let mut writer = IncidentWriter::from_writer(writer, &MISCLASSIFIED_COLUMNS)?;
        for miss in &self.misclassified {
            let incident = incidents.get(miss.row).ok_or_else(|| {
                AppError::Internal(format!("misclassified row {} out of range", miss.row))
            })?;
            writer.write(incident, &miss.extra_fields())?;
        }
        writer.finish()?;
        Ok(())
    }
}

/// Scores a held-out set with a trained classifier
pub struct Evaluator;

impl Evaluator {
    pub fn evaluate(
        classifier: &dyn Classifier,
        matrix: &FeatureMatrix,
        incidents: &[Incident],
    ) -> Result<Evaluation> {
        if incidents.len() != matrix.n_samples() {
            return Err(AppError::Validation(format!(
                "{} incidents for {} feature rows",
                incidents.len(),
                matrix.n_samples()
            )));
        }

        let true_labels = incidents
            .iter()
            .map(|incident| {
                incident.risk_label().ok_or_else(|| {
                    AppError::Processing(format!("incident {} has no risk label", incident.id))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let proba = classifier.predict_proba(&matrix.values)?;
        let predictions = proba
            .axis_iter(Axis(0))
            .map(|row| Prediction::from_probabilities(&row.to_vec()))
            .collect::<Result<Vec<_>>>()?;

        let y_true: Vec<usize> = true_labels.iter().map(|l| l.index()).collect();
        let y_pred: Vec<usize> = predictions.iter().map(|p| p.value.index()).collect();
        let metrics = calculate_metrics(&y_true, &y_pred);

        let misclassified: Vec<Misclassified> = predictions
            .iter()
            .zip(&true_labels)
            .enumerate()
            .filter(|(_, (prediction, truth))| prediction.value != **truth)
            .map(|(row, (prediction, truth))| Misclassified {
                row,
                true_label: *truth,
                prediction: prediction.clone(),
            })
            .collect();

        info!(
            accuracy = metrics.accuracy,
            macro_f1 = metrics.f1_score,
            misclassified = misclassified.len(),
            "Evaluation complete"
        );

        Ok(Evaluation {
            metrics,
            predictions,
            misclassified,
        })
    }
}
