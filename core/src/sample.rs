//! Samples: one customer's features, ground truth and prediction.

use crate::{
    error::{BacktestError, BacktestResult},
    features::FeatureIndex,
    types::{AgreementId, CustomerId, Label},
};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    customer:   CustomerId,
    agreements: Vec<AgreementId>,
    x:          Vec<f64>,
    y:          Label,
    y_pred:     Option<Label>,
}

impl Sample {
    pub fn new(customer: CustomerId, agreements: Vec<AgreementId>, x: Vec<f64>, y: Label) -> Self {
        Self {
            customer,
            agreements,
            x,
            y,
            y_pred: None,
        }
    }

    pub fn customer(&self) -> &CustomerId {
        &self.customer
    }

    pub fn agreements(&self) -> &[AgreementId] {
        &self.agreements
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> Label {
        self.y
    }

    pub fn y_pred(&self) -> Option<Label> {
        self.y_pred
    }

    /// The only mutation a sample ever sees.
    pub fn set_prediction(&mut self, label: Label) {
        self.y_pred = Some(label);
    }
}

/// An ordered cohort of samples sharing one feature index. Every sample's
/// vector has exactly `index.len()` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Samples {
    index:   FeatureIndex,
    samples: Vec<Sample>,
}

impl Samples {
    pub fn new(index: FeatureIndex) -> Self {
        Self {
            index,
            samples: Vec::new(),
        }
    }

    pub fn with_samples(index: FeatureIndex, samples: Vec<Sample>) -> BacktestResult<Self> {
        let mut cohort = Self::new(index);
        cohort.samples.reserve(samples.len());
        for sample in samples {
            cohort.push(sample)?;
        }
        Ok(cohort)
    }

    pub fn feature_index(&self) -> &FeatureIndex {
        &self.index
    }

    pub fn push(&mut self, sample: Sample) -> BacktestResult<()> {
        if sample.x.len() != self.index.len() {
            return Err(BacktestError::DimensionMismatch {
                expected: self.index.len(),
                actual: sample.x.len(),
            });
        }
        self.samples.push(sample);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Sample> {
        self.samples.iter_mut()
    }

    /// Ground-truth labels in sample order.
    pub fn labels(&self) -> Vec<Label> {
        self.samples.iter().map(Sample::y).collect()
    }

    /// Predicted labels in sample order; `None` where not yet predicted.
    pub fn predictions(&self) -> Vec<Option<Label>> {
        self.samples.iter().map(Sample::y_pred).collect()
    }

    /// One row per sample, one column per feature.
    pub fn feature_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.samples.len(), self.index.len()), |(row, col)| {
            self.samples[row].x[col]
        })
    }

    /// Samples matching `keep`, with the same feature index.
    pub fn subset<F>(&self, keep: F) -> Samples
    where
        F: Fn(&Sample) -> bool,
    {
        Samples {
            index:   self.index.clone(),
            samples: self.samples.iter().filter(|s| keep(s)).cloned().collect(),
        }
    }

    /// Per-feature mean. All zeros for an empty cohort.
    pub fn feature_means(&self) -> Array1<f64> {
        self.feature_matrix()
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.index.len()))
    }

    /// Per-feature population standard deviation.
    pub fn feature_std_devs(&self) -> Array1<f64> {
        if self.samples.is_empty() {
            return Array1::zeros(self.index.len());
        }
        self.feature_matrix().std_axis(Axis(0), 0.0)
    }
}

impl<'a> IntoIterator for &'a Samples {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
