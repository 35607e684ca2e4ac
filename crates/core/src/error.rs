use std::fmt;
use thiserror::Error;

/// Which uploaded file a record or error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRole {
    Sales,
    Writeoffs,
}

impl FileRole {
    pub fn as_str(self) -> &'static str {
        match self {
            FileRole::Sales => "sales",
            FileRole::Writeoffs => "writeoffs",
        }
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum IngestError {
    /// The file cannot be read as a table, lacks a required column, or has too many bad rows.
    #[error("{file} file does not match the expected schema: {detail} (malformed rows: {malformed} of {total})")]
    SchemaMismatch {
        file: FileRole,
        detail: String,
        column: Option<String>,
        malformed: usize,
        total: usize,
    },

    #[error("{file} file contains no usable rows")]
    EmptyInput { file: FileRole },
}

impl IngestError {
    pub fn file(&self) -> FileRole {
        match self {
            IngestError::SchemaMismatch { file, .. } | IngestError::EmptyInput { file } => *file,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::SchemaMismatch { .. } => "schema_mismatch",
            IngestError::EmptyInput { .. } => "empty_input",
        }
    }

    /// Input that is not tabular at all (broken workbook, undecodable header).
    pub(crate) fn not_tabular(file: FileRole, detail: impl Into<String>) -> Self {
        IngestError::SchemaMismatch {
            file,
            detail: detail.into(),
            column: None,
            malformed: 0,
            total: 0,
        }
    }

    pub(crate) fn missing_column(file: FileRole, column: &str) -> Self {
        IngestError::SchemaMismatch {
            file,
            detail: format!("missing required column `{column}`"),
            column: Some(column.to_string()),
            malformed: 0,
            total: 0,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid configuration value for `{field}` ({value}): {reason}")]
    InvalidThreshold {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("invalid override rule #{index}: {reason}")]
    InvalidRule { index: usize, reason: String },

    #[error("failed to read config file '{path}': {detail}")]
    Read { path: String, detail: String },

    #[error("failed to parse config file '{path}': {detail}")]
    Parse { path: String, detail: String },
}

impl ConfigError {
    pub(crate) fn threshold(field: &'static str, value: impl fmt::Display, reason: &'static str) -> Self {
        ConfigError::InvalidThreshold {
            field,
            value: value.to_string(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum WeatherError {
    #[error("weather unavailable for {location}: {reason}")]
    Unavailable { location: String, reason: String },
}

/// Failure of a whole forecast run. Never partial.
///
/// Configuration problems are not represented here: an [`EngineConfig`](crate::EngineConfig)
/// is validated when it is loaded, before any run can start.
#[derive(Debug, Clone, Error)]
pub enum ForecastError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("invalid request parameter `{field}`: {reason}")]
    InvalidRequest { field: &'static str, reason: String },
}

impl ForecastError {
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::Ingest(e) => e.kind(),
            ForecastError::InvalidRequest { .. } => "invalid_request",
        }
    }
}
