//! Typed failures that callers need to tell apart. Everything else travels as
//! plain `anyhow::Error` with context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CurateError {
    /// Imgur client-wide quota is nearly spent. Continuing risks an IP ban.
    #[error("imgur client quota exhausted ({remaining} requests left); stop for a day")]
    QuotaExhausted { remaining: i64 },

    #[error("{path} has already been {stage}-filtered")]
    AlreadyFiltered { path: String, stage: &'static str },

    #[error("cannot run {stage} filter on {path}: {reason}")]
    OutOfOrder { path: String, stage: &'static str, reason: String },

    #[error("image id {0} is not present in the annotations")]
    UnknownId(String),

    #[error("nothing to merge: provided {0} file(s), need at least two")]
    NothingToMerge(usize),

    #[error("refusing to delete merged sources: {0}")]
    DeleteRefused(String),

    #[error("invalid annotations file {path}: missing key '{key}'")]
    MissingKey { path: String, key: String },

    #[error("detector returned {got} results for {expected} images")]
    DetectorMismatch { expected: usize, got: usize },
}
