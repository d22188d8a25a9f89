//! Error types for the Composer facade.
//!
//! Setup problems (missing working directory or manifest) surface at
//! construction time and are fatal to that instance. Execution failures carry
//! the captured output as diagnostic context and are caller-recoverable.
//! Malformed output lines are never errors; the parsers skip them.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The target project directory does not exist.
    #[error("working directory does not exist: {0}")]
    WorkingDirMissing(PathBuf),

    /// The embedded transport requires a composer.json in the working directory.
    #[error("composer.json not found in {0}")]
    ManifestMissing(PathBuf),

    /// Composer finished with a non-zero status.
    #[error("composer exited with status {status}")]
    ExecutionFailed {
        status: i32,
        /// Output captured up to the failure, one entry per line.
        output: Vec<String>,
    },

    /// Composer reported a fatal exception in its output even though the
    /// status code did not carry it. The message is the detail line Composer
    /// printed after the exception marker.
    #[error("{0}")]
    ToolException(String),

    /// Spawning the process or switching the working directory failed.
    #[error("failed to run composer: {0}")]
    Io(#[from] std::io::Error),

    /// The embedded application failed before producing a status code.
    #[error(transparent)]
    App(#[from] anyhow::Error),
}

impl Error {
    /// Captured output lines attached to the failure, if any.
    pub fn output(&self) -> &[String] {
        match self {
            Error::ExecutionFailed { output, .. } => output,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_failed_exposes_output() {
        let error = Error::ExecutionFailed {
            status: 2,
            output: vec!["  - Installing vendor/pkg".to_string()],
        };
        assert_eq!(error.output(), ["  - Installing vendor/pkg"]);
        assert_eq!(error.to_string(), "composer exited with status 2");
    }

    #[test]
    fn test_other_variants_have_no_output() {
        let error = Error::ToolException("Your requirements could not be resolved.".to_string());
        assert!(error.output().is_empty());
        assert_eq!(
            error.to_string(),
            "Your requirements could not be resolved."
        );
    }
}
