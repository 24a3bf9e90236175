use std::path::PathBuf;
use thiserror::Error;

/// Failures of the analyzer itself, as opposed to findings in the code it
/// analyzes.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}:{line}:{column}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("invalid ignore pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },
}

impl GuardError {
    pub(crate) fn parse(path: impl Into<PathBuf>, err: &syn::Error) -> Self {
        let start = err.span().start();
        GuardError::Parse {
            path: path.into(),
            line: start.line,
            column: start.column + 1,
            message: err.to_string(),
        }
    }
}
