use std::path::PathBuf;

use thiserror::Error;

use crate::middle_end::ssa::{ParseError, ValidationError};

/// Errors surfaced to the caller of the analysis.
///
/// Everything here means the input module could not be loaded; once a module
/// is valid, resolution itself never fails (unresolvable values and cycles
/// degrade into smaller or partial candidate sets instead).
#[derive(Debug, Error)]
pub enum Error {
    /// The input or output file could not be accessed.
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input file name does not have a supported extension.
    #[error("unsupported file type for {0}, expected one of: ssa, json, dot")]
    FileType(String),

    /// The textual module failed to parse.
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// The JSON module failed to deserialize.
    #[error("malformed module json: {0}")]
    Json(#[from] serde_json::Error),

    /// The module parsed but is not well formed.
    #[error("invalid module:\n{0}")]
    Invalid(#[from] ValidationError),

    /// A rewrite targeted an instruction that is not a call.
    #[error("cannot set the callee of {0}: not a call instruction")]
    NotACall(String),
}

pub type Result<T> = std::result::Result<T, Error>;
