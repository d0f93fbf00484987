//! Deviation analysis: how far each predicted-overdue test customer sits
//! from the non-overdue training population on the most relevant features.
//!
//! Features whose reference standard deviation is zero have no scale to
//! measure against. They are left out of every sample's ranking and named
//! in `DeviationReport::skipped_features`.

use crate::{
    config::{AnalysisConfig, ImportanceOrder},
    error::{BacktestError, BacktestResult},
    features::FeatureIndex,
    model::get_classifier,
    sample::Samples,
    types::{AgreementId, CustomerId, Label},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature:    String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDeviation {
    pub feature: String,
    pub value:   f64,
    pub mean:    f64,
    pub std_dev: f64,
    pub ratio:   f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDeviation {
    pub customer:   CustomerId,
    pub agreements: Vec<AgreementId>,
    pub predicted:  Label,
    /// Most anomalous first.
    pub deviations: Vec<FeatureDeviation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationReport {
    pub importance_order: ImportanceOrder,
    pub selected_features: Vec<FeatureImportance>,
    pub skipped_features: Vec<String>,
    pub reference_count: usize,
    pub samples: Vec<SampleDeviation>,
}

impl DeviationReport {
    /// Write as pretty JSON, creating parent directories as needed.
    pub fn write(&self, path: &Path) -> BacktestResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::info!("analysis: deviation report written to {}", path.display());
        Ok(())
    }
}

pub struct DeviationAnalysis<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> DeviationAnalysis<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Rank features with the configured importance model fitted on the
    /// whole training cohort, then measure the test cohort against it.
    pub fn run(&self, train: &Samples, test: &Samples) -> BacktestResult<DeviationReport> {
        if train.feature_index() != test.feature_index() {
            return Err(BacktestError::FeatureIndexMismatch);
        }
        let model_config = &self.config.importance_model;
        let mut model = get_classifier(&model_config.name, &model_config.params)?;
        model.fit(train.feature_matrix().view(), &train.labels())?;
        let importances = model.feature_importances()?;

        let selected = select_top(
            train.feature_index(),
            &importances,
            self.config.top_n,
            self.config.importance_order,
        )?;
        deviations(train, test, selected, self.config.importance_order)
    }
}

/// Pick `top_n` features by importance in the given order. Ties keep
/// feature-index order.
pub fn select_top(
    index: &FeatureIndex,
    importances: &[f64],
    top_n: usize,
    order: ImportanceOrder,
) -> BacktestResult<Vec<FeatureImportance>> {
    if importances.len() != index.len() {
        return Err(BacktestError::DimensionMismatch {
            expected: index.len(),
            actual: importances.len(),
        });
    }
    let mut ranked: Vec<FeatureImportance> = index
        .names()
        .iter()
        .zip(importances)
        .map(|(name, &importance)| FeatureImportance {
            feature: name.clone(),
            importance,
        })
        .collect();
    match order {
        ImportanceOrder::Descending => ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance)),
        ImportanceOrder::Ascending => ranked.sort_by(|a, b| a.importance.total_cmp(&b.importance)),
    }
    ranked.truncate(top_n);
    Ok(ranked)
}

/// `|value - mean| / std_dev`, or `None` when the reference has no spread.
pub fn deviation_ratio(value: f64, mean: f64, std_dev: f64) -> Option<f64> {
    if std_dev == 0.0 || !std_dev.is_finite() {
        None
    } else {
        Some((value - mean).abs() / std_dev)
    }
}

/// Build the report from already-selected features. Both cohorts must
/// share one feature index.
pub fn deviations(
    train: &Samples,
    test: &Samples,
    selected: Vec<FeatureImportance>,
    order: ImportanceOrder,
) -> BacktestResult<DeviationReport> {
    if train.feature_index() != test.feature_index() {
        return Err(BacktestError::FeatureIndexMismatch);
    }
    let reference = train.subset(|s| s.y() == Label::NonOverdue);
    let targets = test.subset(|s| s.y_pred() == Some(Label::Overdue));
    let means = reference.feature_means();
    let std_devs = reference.feature_std_devs();

    let mut columns = Vec::with_capacity(selected.len());
    let mut skipped_features = Vec::new();
    for feature in &selected {
        let position = test.feature_index().position(&feature.feature).ok_or_else(|| {
            BacktestError::MissingField {
                table: "feature".into(),
                field: feature.feature.clone(),
            }
        })?;
        if deviation_ratio(0.0, means[position], std_devs[position]).is_none() {
            skipped_features.push(feature.feature.clone());
        } else {
            columns.push((feature.feature.as_str(), position));
        }
    }
    if !skipped_features.is_empty() {
        log::warn!(
            "analysis: {} selected features have zero spread in the reference set: {}",
            skipped_features.len(),
            skipped_features.join(", ")
        );
    }

    let samples: Vec<SampleDeviation> = targets
        .iter()
        .map(|sample| {
            let mut deviations: Vec<FeatureDeviation> = columns
                .iter()
                .filter_map(|&(name, position)| {
                    let value = sample.x()[position];
                    let (mean, std_dev) = (means[position], std_devs[position]);
                    deviation_ratio(value, mean, std_dev).map(|ratio| FeatureDeviation {
                        feature: name.to_string(),
                        value,
                        mean,
                        std_dev,
                        ratio,
                    })
                })
                .collect();
            deviations.sort_by(|a, b| b.ratio.total_cmp(&a.ratio));
            SampleDeviation {
                customer: sample.customer().clone(),
                agreements: sample.agreements().to_vec(),
                predicted: Label::Overdue,
                deviations,
            }
        })
        .collect();

    log::info!(
        "analysis: {} flagged customers against {} reference customers",
        samples.len(),
        reference.len()
    );
    Ok(DeviationReport {
        importance_order: order,
        selected_features: selected,
        skipped_features,
        reference_count: reference.len(),
        samples,
    })
}
