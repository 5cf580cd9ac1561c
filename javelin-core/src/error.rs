use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("workspace directory was not found at {0}")]
    MissingWorkspace(PathBuf),
    #[error("no startable module: {0}")]
    NotStartable(String),
    #[error("repl target is not available: {0}")]
    ReplTarget(String),
    #[error("internal scheduler fault in {program} at step {step}: {message}")]
    Internal {
        program: String,
        step: usize,
        message: String,
    },
}
