//! Shared primitive types used across the entire backtest.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The canonical run identifier.
pub type RunId = String;

/// A fresh, collision-free run identifier.
pub fn new_run_id() -> RunId {
    format!("backtest-{}", uuid::Uuid::new_v4())
}

/// A borrower. One customer may hold several agreements.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub String);

/// One loan contract.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgreementId(pub String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AgreementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for AgreementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CustomerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<String> for AgreementId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Binary delinquency class, ground truth or predicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    NonOverdue,
    Overdue,
}

impl Label {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::NonOverdue => 0.0,
            Self::Overdue => 1.0,
        }
    }

    /// Map a class code back to a label. Anything at or above 0.5 is overdue.
    pub fn from_f64(value: f64) -> Self {
        if value >= 0.5 {
            Self::Overdue
        } else {
            Self::NonOverdue
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Self::NonOverdue => 0,
            Self::Overdue => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NonOverdue => "non_overdue",
            Self::Overdue => "overdue",
        }
    }
}

/// Which half of a backtest a sample collection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cohort {
    Train,
    Test,
}

impl Cohort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
