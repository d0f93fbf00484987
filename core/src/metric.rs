//! Evaluation metrics over true and predicted labels.

use crate::{
    error::{BacktestError, BacktestResult},
    types::Label,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Ratio(f64),
    Confusion(ConfusionMatrix),
}

/// Counts with `Overdue` as the positive class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_positive:  usize,
    pub false_positive: usize,
    pub true_negative:  usize,
    pub false_negative: usize,
}

impl ConfusionMatrix {
    pub fn tally(y_true: &[Label], y_pred: &[Label]) -> BacktestResult<Self> {
        if y_true.len() != y_pred.len() {
            return Err(BacktestError::LengthMismatch {
                features: y_pred.len(),
                labels: y_true.len(),
            });
        }
        let mut m = Self::default();
        for (truth, pred) in y_true.iter().zip(y_pred) {
            match (truth, pred) {
                (Label::Overdue, Label::Overdue) => m.true_positive += 1,
                (Label::NonOverdue, Label::Overdue) => m.false_positive += 1,
                (Label::NonOverdue, Label::NonOverdue) => m.true_negative += 1,
                (Label::Overdue, Label::NonOverdue) => m.false_negative += 1,
            }
        }
        Ok(m)
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

pub trait Metric {
    fn name(&self) -> &'static str;

    fn compute(&self, y_true: &[Label], y_pred: &[Label]) -> BacktestResult<MetricValue>;

    fn format(&self, value: &MetricValue) -> String {
        match value {
            MetricValue::Ratio(v) => format!("{}: {v:.4}", self.name()),
            MetricValue::Confusion(m) => format!(
                "{}: tp={} fp={} tn={} fn={}",
                self.name(),
                m.true_positive,
                m.false_positive,
                m.true_negative,
                m.false_negative
            ),
        }
    }
}

/// A scalar metric read off the confusion matrix.
struct RatioMetric {
    name: &'static str,
    read: fn(&ConfusionMatrix) -> f64,
}

impl Metric for RatioMetric {
    fn name(&self) -> &'static str {
        self.name
    }

    fn compute(&self, y_true: &[Label], y_pred: &[Label]) -> BacktestResult<MetricValue> {
        let m = ConfusionMatrix::tally(y_true, y_pred)?;
        Ok(MetricValue::Ratio((self.read)(&m)))
    }
}

struct ConfusionMetric;

impl Metric for ConfusionMetric {
    fn name(&self) -> &'static str {
        "confusion_matrix"
    }

    fn compute(&self, y_true: &[Label], y_pred: &[Label]) -> BacktestResult<MetricValue> {
        Ok(MetricValue::Confusion(ConfusionMatrix::tally(y_true, y_pred)?))
    }
}

pub fn get_metric(name: &str) -> BacktestResult<Box<dyn Metric>> {
    let metric: Box<dyn Metric> = match name {
        "accuracy" => Box::new(RatioMetric { name: "accuracy", read: ConfusionMatrix::accuracy }),
        "precision" => Box::new(RatioMetric { name: "precision", read: ConfusionMatrix::precision }),
        "recall" => Box::new(RatioMetric { name: "recall", read: ConfusionMatrix::recall }),
        "f1" => Box::new(RatioMetric { name: "f1", read: ConfusionMatrix::f1 }),
        "confusion_matrix" => Box::new(ConfusionMetric),
        _ => {
            return Err(BacktestError::UnknownMetric {
                name: name.to_string(),
            })
        }
    };
    Ok(metric)
}

#[cfg(test)]
mod tests {
    use super::*;
    use Label::{NonOverdue as N, Overdue as O};

    #[test]
    fn zero_denominators_report_zero() {
        let m = ConfusionMatrix::tally(&[N, N], &[N, N]).unwrap();
        assert_eq!(m.precision(), 0.0);
        assert_eq!(m.recall(), 0.0);
        assert_eq!(m.f1(), 0.0);
        assert_eq!(m.accuracy(), 1.0);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        assert!(ConfusionMatrix::tally(&[O], &[O, N]).is_err());
    }
}
