use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("cannot read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("{path} is missing required column '{column}'")]
    MissingColumn { path: String, column: String },
    #[error("{path} contains no data rows")]
    Empty { path: String },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv export error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("http client error: {0}")]
    Client(String),
    #[error("transport error for {source_id} -> {target_id}: {reason}")]
    Transport {
        source_id: String,
        target_id: String,
        reason: String,
    },
    #[error("merge {source_id} -> {target_id} rejected with status {status}: {body}")]
    Rejected {
        source_id: String,
        target_id: String,
        status: u16,
        body: String,
    },
}
