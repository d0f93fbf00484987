use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Delimited read error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Configuration ──────────────────────────────────────────
    #[error("Filter '{name}' not found")]
    UnknownFilter { name: String },

    #[error("Model '{name}' not found")]
    UnknownModel { name: String },

    #[error("Metric '{name}' not found")]
    UnknownMetric { name: String },

    #[error("Invalid parameter '{param}' for '{owner}': {reason}")]
    InvalidParam {
        owner: String,
        param: String,
        reason: String,
    },

    #[error("Field '{field}' not present in {table} table")]
    MissingField { table: String, field: String },

    // ── Data format ────────────────────────────────────────────
    #[error("{file}: missing header line")]
    MissingHeader { file: String },

    #[error("{file}: header differs from the first file of the group")]
    HeaderMismatch { file: String },

    #[error("{file}:{line}: row has {actual} columns, need at least {expected}")]
    ShortRow {
        file: String,
        line: u64,
        expected: usize,
        actual: usize,
    },

    #[error("{file}:{line}: row has {actual} columns, header has {expected}")]
    ColumnCount {
        file: String,
        line: u64,
        expected: usize,
        actual: usize,
    },

    #[error("{file}:{line}: field '{field}' cannot parse {raw:?} as {kind}")]
    ParseValue {
        file: String,
        line: u64,
        field: String,
        raw: String,
        kind: &'static str,
    },

    #[error("Customer '{customer}': field '{field}' holds unparseable date {raw:?}")]
    InvalidDate {
        customer: String,
        field: String,
        raw: String,
    },

    // ── Data integrity ─────────────────────────────────────────
    #[error("Sorted keys diverge at position {position}: features '{feature_key}', labels '{label_key}'")]
    KeyMismatch {
        position: usize,
        feature_key: String,
        label_key: String,
    },

    #[error("Feature rows ({features}) and label rows ({labels}) differ in length")]
    LengthMismatch { features: usize, labels: usize },

    #[error("Customer '{customer}' missing from the agreement index")]
    MissingCustomer { customer: String },

    #[error("Agreement '{agreement}' missing from the loan table")]
    MissingAgreement { agreement: String },

    #[error("Training and test feature indices differ")]
    FeatureIndexMismatch,

    #[error("Vector width mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Model '{name}' used before fit")]
    NotFitted { name: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type BacktestResult<T> = Result<T, BacktestError>;
