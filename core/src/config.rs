use crate::{
    error::{BacktestError, BacktestResult},
    schema::{FieldSchema, FieldType},
};
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Names of the two identifier columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFields {
    pub agreement: String,
    pub customer: String,
}

/// One directory per table type; each holds one file per month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDirs {
    pub loans: PathBuf,
    pub transactions: PathBuf,
    pub products: PathBuf,
}

/// Months observed for features, and months whose loans supply labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortMonths {
    pub feature_months: Vec<String>,
    pub label_months: Vec<String>,
}

/// A rule or model resolved by name, with free-form parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedConfig {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl NamedConfig {
    pub fn new(name: impl Into<String>, params: serde_json::Value) -> Self {
        Self { name: name.into(), params }
    }
}

/// Decode the parameter object of a named rule or model.
/// Missing params decode as an empty object.
pub fn parse_params<T: DeserializeOwned>(owner: &str, params: &serde_json::Value) -> BacktestResult<T> {
    let params = if params.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        params.clone()
    };
    serde_json::from_value(params).map_err(|e| BacktestError::InvalidParam {
        owner: owner.to_string(),
        param: "params".into(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Numeric loan fields summarised per customer.
    pub loan_fields: Vec<String>,
    /// Numeric transaction fields summarised per customer.
    pub transaction_fields: Vec<String>,
    #[serde(default)]
    pub transaction_category_field: Option<String>,
    /// Category values counted individually. Fixed here so every cohort
    /// gets the same columns.
    #[serde(default)]
    pub transaction_categories: Vec<String>,
    pub product_date_field: String,
    #[serde(default = "default_date_format")]
    pub product_date_format: String,
    pub product_reference_date: NaiveDate,
    #[serde(default = "default_recent_days")]
    pub product_recent_days: i64,
}

fn default_date_format() -> String {
    "%Y/%m/%d".into()
}

fn default_recent_days() -> i64 {
    90
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Loan field holding days (or amount) overdue.
    pub overdue_field: String,
    /// A latest value strictly above this marks the agreement overdue.
    #[serde(default)]
    pub overdue_threshold: f64,
}

/// Which end of the importance ranking feeds the deviation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceOrder {
    /// Most important features first.
    Descending,
    /// Least important first; matches the legacy report.
    Ascending,
}

impl Default for ImportanceOrder {
    fn default() -> Self {
        Self::Descending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub top_n: usize,
    #[serde(default)]
    pub importance_order: ImportanceOrder,
    pub importance_model: NamedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub deviation_report: PathBuf,
    pub metrics_report: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub schema: FieldSchema,
    pub keys: KeyFields,
    pub dirs: TableDirs,
    pub train: CohortMonths,
    pub test: CohortMonths,
    /// Applied in order to each cohort's feature-period loans.
    #[serde(default)]
    pub filters: Vec<NamedConfig>,
    pub model: NamedConfig,
    pub metrics: Vec<String>,
    pub features: FeatureConfig,
    pub labels: LabelConfig,
    pub analysis: AnalysisConfig,
    pub output: OutputConfig,
}

impl BacktestConfig {
    /// Load from a JSON file.
    /// In tests, use BacktestConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        log::info!(
            "config: {} schema fields, {} filters, model '{}'",
            config.schema.len(),
            config.filters.len(),
            config.model.name
        );
        Ok(config)
    }

    pub fn loan_files(&self, months: &[String]) -> Vec<PathBuf> {
        month_files(&self.dirs.loans, months)
    }

    pub fn transaction_files(&self, months: &[String]) -> Vec<PathBuf> {
        month_files(&self.dirs.transactions, months)
    }

    pub fn product_files(&self, months: &[String]) -> Vec<PathBuf> {
        month_files(&self.dirs.products, months)
    }

    /// Point every table directory under `root` (`root/loans`, ...).
    pub fn with_data_root(mut self, root: &Path) -> Self {
        self.dirs = TableDirs {
            loans: root.join("loans"),
            transactions: root.join("transactions"),
            products: root.join("products"),
        };
        self
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        let schema: FieldSchema = [
            ("agreement_no", FieldType::Text),
            ("customer_no", FieldType::Text),
            ("balance", FieldType::Float),
            ("overdue_days", FieldType::Int),
            ("product_type", FieldType::Text),
            ("amount", FieldType::Float),
            ("channel", FieldType::Text),
            ("product_code", FieldType::Text),
            ("sign_date", FieldType::Text),
        ]
        .into_iter()
        .map(|(name, t)| (name.to_string(), t))
        .collect();

        Self {
            schema,
            keys: KeyFields {
                agreement: "agreement_no".into(),
                customer: "customer_no".into(),
            },
            dirs: TableDirs {
                loans: "data/loans".into(),
                transactions: "data/transactions".into(),
                products: "data/products".into(),
            },
            train: CohortMonths {
                feature_months: vec!["2014-01".into(), "2014-02".into()],
                label_months: vec!["2014-03".into()],
            },
            test: CohortMonths {
                feature_months: vec!["2014-02".into(), "2014-03".into()],
                label_months: vec!["2014-04".into()],
            },
            filters: vec![NamedConfig::new(
                "numeric_range",
                serde_json::json!({ "field": "balance", "min": 0.0 }),
            )],
            model: NamedConfig::new(
                "random_forest",
                serde_json::json!({ "n_estimators": 25, "max_depth": 6, "seed": 7 }),
            ),
            metrics: vec![
                "accuracy".into(),
                "precision".into(),
                "recall".into(),
                "f1".into(),
                "confusion_matrix".into(),
            ],
            features: FeatureConfig {
                loan_fields: vec!["balance".into(), "overdue_days".into()],
                transaction_fields: vec!["amount".into()],
                transaction_category_field: Some("channel".into()),
                transaction_categories: vec!["atm".into(), "pos".into(), "online".into()],
                product_date_field: "sign_date".into(),
                product_date_format: default_date_format(),
                product_reference_date: NaiveDate::from_ymd_opt(2014, 3, 31).unwrap_or_default(),
                product_recent_days: default_recent_days(),
            },
            labels: LabelConfig {
                overdue_field: "overdue_days".into(),
                overdue_threshold: 0.0,
            },
            analysis: AnalysisConfig {
                top_n: 20,
                importance_order: ImportanceOrder::Descending,
                importance_model: NamedConfig::new(
                    "random_forest",
                    serde_json::json!({ "n_estimators": 100, "seed": 11 }),
                ),
            },
            output: OutputConfig {
                deviation_report: "out/deviation.json".into(),
                metrics_report: "out/metrics.txt".into(),
            },
        }
    }
}

fn month_files(dir: &Path, months: &[String]) -> Vec<PathBuf> {
    months.iter().map(|month| dir.join(month)).collect()
}
