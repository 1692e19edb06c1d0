use thiserror::Error;

use crate::pipeline::Stage;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("decode failure: {0}")]
    DecodeFailure(String),

    #[error("geometry failure: {0}")]
    GeometryFailure(String),

    #[error("deadline exceeded before the {0} stage")]
    DeadlineExceeded(Stage),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Flat classification of an [`Error`], independent of the stage it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    DecodeFailure,
    GeometryFailure,
    DeadlineExceeded,
    Io,
    Json,
}

impl Error {
    /// Attach the pipeline stage that raised this error.
    ///
    /// Errors that already carry a stage keep the original one.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            e @ (Error::Stage { .. } | Error::DeadlineExceeded(_)) => e,
            e => Error::Stage {
                stage,
                source: Box::new(e),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::DecodeFailure(_) => ErrorKind::DecodeFailure,
            Error::GeometryFailure(_) => ErrorKind::GeometryFailure,
            Error::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            Error::Stage { source, .. } => source.kind(),
            Error::Io(_) => ErrorKind::Io,
            Error::Json(_) => ErrorKind::Json,
        }
    }

    /// The stage that raised this error, if it came out of the pipeline.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            Error::DeadlineExceeded(stage) => Some(*stage),
            _ => None,
        }
    }

    /// Only decode failures can be caused by transient upstream corruption.
    /// Everything else is deterministic for a given input.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::DecodeFailure
    }
}

pub type Result<T> = std::result::Result<T, Error>;
