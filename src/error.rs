use indicatif::style::TemplateError;
use thiserror::Error;

pub type FeatureResult<T> = Result<T, FeatureError>;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cast(#[from] CastError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Errors raised while loading or validating configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required configuration file is missing: {0}")]
    MissingFile(String),

    #[error("Failed to parse YAML in '{file}': {source}")]
    Yaml {
        file: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Progress bar error")]
    ProgressBar(#[from] TemplateError),
}

/// A column could not be coerced to its declared type.
#[derive(Debug, Error)]
pub enum CastError {
    #[error("Cannot cast column '{column}' to {dtype}: {msg}")]
    Column {
        column: String,
        dtype: String,
        msg: String,
    },

    #[error("Standardization of '{file}' failed: {source}")]
    File {
        file: String,
        #[source]
        source: Box<FeatureError>,
    },
}

/// Errors related to column availability, stage ordering and frame execution.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Batch '{batch}' requires column '{column}' which is not in the schema")]
    MissingColumn { batch: String, column: String },

    #[error("Batch '{batch}' requires column '{column}' which is only produced later by '{producer}'")]
    DependencyOrder {
        batch: String,
        column: String,
        producer: String,
    },

    #[error("Data frame error: {0}")]
    DataFrame(String),
}

/// Errors related to File I/O and serialization.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Failed to read data: {0}")]
    ReadFailed(String),

    #[error("Failed to write data: {0}")]
    WriteFailed(String),
}

/// Errors related to internal system invariants and bugs.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}
