//! The backtest driver.
//!
//! EXECUTION ORDER (fixed):
//!   1. Read and filter the train cohort's tables, build its samples.
//!   2. Same for the test cohort.
//!   3. Require identical feature indices.
//!   4. Fit the model on train, predict test.
//!   5. Persist both cohorts.
//!   6. Deviation report, then metrics report.
//!
//! Every named filter, model and metric is resolved in `Backtest::new`, so
//! configuration errors surface before any file is opened.

use crate::{
    analysis::{DeviationAnalysis, DeviationReport},
    config::{BacktestConfig, CohortMonths},
    error::{BacktestError, BacktestResult},
    loan_filter::FilterChain,
    metric::{get_metric, Metric},
    model::{get_classifier, Classifier},
    record_reader::RecordReader,
    sample::Samples,
    sample_builder::{CohortTables, SamplesBuilder},
    store::SampleStore,
    types::{Cohort, Label, RunId},
};
use serde::Serialize;
use std::path::Path;

/// One evaluated metric: its name and the formatted report line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricLine {
    pub name: String,
    pub line: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestSummary {
    pub run_id:            RunId,
    pub feature_count:     usize,
    pub train_samples:     usize,
    pub test_samples:      usize,
    pub actual_overdue:    usize,
    pub predicted_overdue: usize,
    pub flagged_customers: usize,
    pub metrics:           Vec<MetricLine>,
}

pub struct Backtest {
    config:  BacktestConfig,
    filters: FilterChain,
    model:   Box<dyn Classifier>,
    metrics: Vec<Box<dyn Metric>>,
}

impl Backtest {
    pub fn new(config: BacktestConfig) -> BacktestResult<Self> {
        let filters = FilterChain::resolve(&config.filters)?;
        let model = get_classifier(&config.model.name, &config.model.params)?;
        let importance = &config.analysis.importance_model;
        get_classifier(&importance.name, &importance.params)?;
        let metrics = config
            .metrics
            .iter()
            .map(|name| get_metric(name))
            .collect::<BacktestResult<Vec<_>>>()?;

        log::info!(
            "backtest: filters [{}], model '{}', {} metrics",
            filters.names().join(", "),
            model.name(),
            metrics.len()
        );
        Ok(Self {
            config,
            filters,
            model,
            metrics,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Read the four tables of one cohort and filter its feature-period loans.
    pub fn read_cohort(&self, months: &CohortMonths) -> BacktestResult<CohortTables> {
        let reader = RecordReader::new(&self.config.schema, &self.config.keys);
        let feature_loans = reader.read_loans(&self.config.loan_files(&months.feature_months))?;
        let feature_loans = self.filters.apply(feature_loans)?;
        let label_loans = reader.read_loans(&self.config.loan_files(&months.label_months))?;
        let transactions = reader.read_transactions(&self.config.transaction_files(&months.feature_months))?;
        let products = reader.read_products(&self.config.product_files(&months.feature_months))?;
        Ok(CohortTables {
            feature_loans,
            label_loans,
            transactions,
            products,
        })
    }

    pub fn build_samples(&self, cohort: Cohort, months: &CohortMonths) -> BacktestResult<Samples> {
        log::info!("backtest: building {cohort} cohort from {:?}", months.feature_months);
        let tables = self.read_cohort(months)?;
        SamplesBuilder::new(&self.config.features, &self.config.labels).build(&tables)
    }

    /// Fit on the train cohort and write a prediction into every test sample.
    /// Returns the predictions in test order.
    pub fn run_cohorts(&mut self, train: &Samples, test: &mut Samples) -> BacktestResult<Vec<Label>> {
        if train.feature_index() != test.feature_index() {
            return Err(BacktestError::FeatureIndexMismatch);
        }
        let labels = train.labels();
        if !labels.is_empty() && labels.iter().all(|l| *l == labels[0]) {
            log::warn!(
                "backtest: every training label is {}; the model can only predict that class",
                labels[0].name()
            );
        }

        self.model.fit(train.feature_matrix().view(), &labels)?;
        let predictions = self.model.predict(test.feature_matrix().view())?;
        if predictions.len() != test.len() {
            return Err(BacktestError::LengthMismatch {
                features: test.len(),
                labels: predictions.len(),
            });
        }
        for (sample, label) in test.iter_mut().zip(&predictions) {
            sample.set_prediction(*label);
        }

        let flagged = predictions.iter().filter(|l| **l == Label::Overdue).count();
        log::info!(
            "backtest: {} fitted on {} samples, {flagged}/{} test samples predicted overdue",
            self.model.name(),
            train.len(),
            test.len()
        );
        Ok(predictions)
    }

    pub fn evaluate(&self, y_true: &[Label], y_pred: &[Label]) -> BacktestResult<Vec<MetricLine>> {
        self.metrics
            .iter()
            .map(|metric| {
                let value = metric.compute(y_true, y_pred)?;
                Ok(MetricLine {
                    name: metric.name().to_string(),
                    line: metric.format(&value),
                })
            })
            .collect()
    }

    pub fn analyse(&self, train: &Samples, test: &Samples) -> BacktestResult<DeviationReport> {
        DeviationAnalysis::new(&self.config.analysis).run(train, test)
    }

    pub fn run(&mut self, store: &SampleStore, run_id: &str) -> BacktestResult<BacktestSummary> {
        store.insert_run(run_id, env!("CARGO_PKG_VERSION"))?;

        let train_months = self.config.train.clone();
        let test_months = self.config.test.clone();
        let train = self.build_samples(Cohort::Train, &train_months)?;
        let mut test = self.build_samples(Cohort::Test, &test_months)?;

        let predictions = self.run_cohorts(&train, &mut test)?;

        store.save_samples(run_id, Cohort::Train, &train)?;
        store.save_samples(run_id, Cohort::Test, &test)?;

        let report = self.analyse(&train, &test)?;
        report.write(&self.config.output.deviation_report)?;

        let y_true = test.labels();
        let metrics = self.evaluate(&y_true, &predictions)?;
        write_metrics_report(&self.config.output.metrics_report, &metrics)?;

        Ok(BacktestSummary {
            run_id: run_id.to_string(),
            feature_count: train.feature_index().len(),
            train_samples: train.len(),
            test_samples: test.len(),
            actual_overdue: y_true.iter().filter(|l| **l == Label::Overdue).count(),
            predicted_overdue: predictions.iter().filter(|l| **l == Label::Overdue).count(),
            flagged_customers: report.samples.len(),
            metrics,
        })
    }
}

/// One formatted line per metric.
pub fn write_metrics_report(path: &Path, metrics: &[MetricLine]) -> BacktestResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let text: String = metrics.iter().map(|m| format!("{}\n", m.line)).collect();
    std::fs::write(path, text)?;
    log::info!("backtest: metrics report written to {}", path.display());
    Ok(())
}
