use thiserror::Error;

use crate::channels::SeriesLabel;

#[derive(Error, Debug)]
pub enum SrkfError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Numerical instability{}: {detail}", location(.series, .sample))]
    NumericalInstability {
        series: Option<SeriesLabel>,
        sample: Option<usize>,
        detail: String,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual} ({context})")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        context: String,
    },

    #[error("Run cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

fn location(series: &Option<SeriesLabel>, sample: &Option<usize>) -> String {
    match (series, sample) {
        (Some(s), Some(t)) => format!(" in {} series at sample {}", s, t),
        (Some(s), None) => format!(" in {} series", s),
        (None, Some(t)) => format!(" at sample {}", t),
        (None, None) => String::new(),
    }
}

impl SrkfError {
    pub fn instability(detail: impl Into<String>) -> Self {
        SrkfError::NumericalInstability {
            series: None,
            sample: None,
            detail: detail.into(),
        }
    }

    /// Attach series/sample context to numeric errors raised deep inside an update.
    pub fn at(self, label: SeriesLabel, t: usize) -> Self {
        match self {
            SrkfError::NumericalInstability { detail, .. } => SrkfError::NumericalInstability {
                series: Some(label),
                sample: Some(t),
                detail,
            },
            SrkfError::DimensionMismatch {
                expected,
                actual,
                context,
            } => SrkfError::DimensionMismatch {
                expected,
                actual,
                context: format!("{} series at sample {}: {}", label, t, context),
            },
            other => other,
        }
    }

    /// Short machine-readable kind, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            SrkfError::Validation(_) => "validation",
            SrkfError::NumericalInstability { .. } => "numerical_instability",
            SrkfError::DimensionMismatch { .. } => "dimension_mismatch",
            SrkfError::Cancelled(_) => "cancelled",
            SrkfError::IoError(_) => "io",
            SrkfError::CsvError(_) => "csv",
            SrkfError::JsonError(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, SrkfError>;
