use std::io;

use crossbeam::channel::SendError;
use thiserror::Error;

/// Error type for pool lifecycle operations.
///
/// Job faults never show up here; they are reported as [`JobError`] by the
/// worker and only logged by the pool.
#[derive(Error, Debug)]
pub enum PoolError {
    /// IO error, e.g. a worker thread could not be spawned.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration could not be parsed.
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A pool needs at least one worker.
    #[error("Invalid thread count: {0}")]
    InvalidThreads(usize),

    /// `run` was called before a transformation was assigned.
    #[error("No transformation function assigned")]
    MissingFunction,

    /// `run` was called on a pool that has already been run.
    #[error("Pool has already been run")]
    AlreadyRun,

    /// The input stream was closed with `in_done`.
    #[error("Input stream is closed")]
    InputClosed,

    /// Error with a string message.
    #[error("{0}")]
    StringError(String),
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

impl<T> From<SendError<T>> for PoolError {
    fn from(_: SendError<T>) -> Self {
        PoolError::InputClosed
    }
}

/// A fault raised while processing one input.
#[derive(Error, Debug)]
pub enum JobError<I> {
    /// The transformation panicked.
    #[error("param: {input:?}, {detail}")]
    Panicked {
        /// The input the transformation was running on.
        input: I,
        /// The panic message, if one could be recovered.
        detail: String,
    },

    /// Copying the input panicked before the transformation ran.
    #[error("input could not be cloned: {detail}")]
    CloneFailed {
        /// The panic message, if one could be recovered.
        detail: String,
    },
}

impl<I> JobError<I> {
    /// The input the job was running on, if it survived the fault.
    pub fn input(&self) -> Option<&I> {
        match self {
            JobError::Panicked { input, .. } => Some(input),
            JobError::CloneFailed { .. } => None,
        }
    }

    /// The panic message.
    pub fn detail(&self) -> &str {
        match self {
            JobError::Panicked { detail, .. } | JobError::CloneFailed { detail } => detail,
        }
    }
}
