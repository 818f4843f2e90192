use thiserror::Error;

/// Error taxonomy for the index (spec §6/§7).
///
/// `GraphChanged` is retried internally by the query path and should
/// never reach a caller unless the retry budget is exhausted, which
/// indicates either a writer-gate bug or pathological contention.
#[derive(Debug, Error)]
pub enum HnswError {
    #[error("snapshot has an invalid or missing header")]
    InvalidHeader,

    #[error("operation is invalid for the current graph state: {0}")]
    InvalidOperation(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("graph mutated during search; retry budget exhausted")]
    GraphChanged,

    #[error("snapshot archive is corrupt: {0}")]
    Archive(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HnswError>;
