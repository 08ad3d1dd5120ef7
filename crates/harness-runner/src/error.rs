use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown dataset size '{0}' (expected one of 100K, 300K, 10M, 30M, 100M)")]
    UnknownSize(String),

    #[error("k must be a positive integer")]
    InvalidK,

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("download of {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to launch engine '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine exited with status {code} after {elapsed_secs:.1}s")]
    NonZeroExit { code: i32, elapsed_secs: f64 },

    #[error("engine terminated by signal after {elapsed_secs:.1}s")]
    Killed { elapsed_secs: f64 },

    #[error("engine failed: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed run metadata in {path}: {reason}")]
    MalformedMetadata { path: PathBuf, reason: String },

    #[error("malformed result cell at row {row}, column {column}: '{cell}'")]
    MalformedResultRow {
        row: usize,
        column: usize,
        cell: String,
    },

    #[error("ragged result: row {row} has {found} cells, expected {expected}")]
    RaggedResult {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("result file {0} contains no rows")]
    EmptyResult(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "hdf5")]
    #[error("hdf5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error("{0}")]
    Invalid(String),
}

/// A failed run, tagged with the stage that failed.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("fetch: {0}")]
    Fetch(#[from] FetchError),

    #[error("engine: {0}")]
    Engine(#[from] EngineError),

    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("archive: failed to copy {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HarnessError {
    pub fn stage(&self) -> &'static str {
        match self {
            HarnessError::Config(_) => "configuration",
            HarnessError::Fetch(_) => "fetch",
            HarnessError::Engine(_) => "engine",
            HarnessError::Decode(_) => "decode",
            HarnessError::Store(_) => "store",
            HarnessError::Archive { .. } => "archive",
        }
    }
}
