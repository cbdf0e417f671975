use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid run identifier: {0}")]
    InvalidRunId(String),

    #[error("invalid search parameter: {0}")]
    InvalidParameter(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("no identifier sources configured")]
    NoSources,

    #[error("failed to read identifier source {path}: {message}")]
    SourceRead { path: String, message: String },

    #[error("identifier source {path} has no column named {column}")]
    SourceColumnMissing { path: String, column: String },

    #[error("catalog destination is not writable: {0}")]
    CatalogUnwritable(String),

    #[error("failed to read catalog {path}: {message}")]
    CatalogRead { path: String, message: String },

    #[error("failed to read cache directory {path}: {message}")]
    CacheDirRead { path: String, message: String },

    #[error("no cache artifact for catalog entries: {}", .entries.join(", "))]
    #[diagnostic(help("every catalog entry needs exactly one artifact named after its file name"))]
    CacheUnmapped { entries: Vec<String> },

    #[error("ambiguous cache artifacts for {entry}: {}", .candidates.join(", "))]
    CacheAmbiguous {
        entry: String,
        candidates: Vec<String>,
    },

    #[error("wort request failed: {0}")]
    WortHttp(String),

    #[error("wort returned status {status}: {message}")]
    WortStatus { status: u16, message: String },

    #[error("incomplete download: expected {expected} bytes, received {received}")]
    IncompleteDownload { expected: u64, received: u64 },

    #[error("invalid signature payload: {0}")]
    InvalidSignature(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
