//! Error types for the runner module.

use camino::Utf8PathBuf;
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Failures before the diagnostic pipeline is in place. Everything after
/// that travels through the diagnostic sink instead.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    /// The source directory does not exist or is not a directory.
    #[error("source directory `{path}` does not exist")]
    #[diagnostic(code(mk2cmake::runner::source_dir_missing))]
    SourceDirMissing {
        path: Utf8PathBuf,
        #[help]
        help: String,
    },

    /// A path on the command line was not valid UTF-8.
    #[error("path `{path:?}` must be valid UTF-8")]
    #[diagnostic(code(mk2cmake::runner::non_utf8_path))]
    NonUtf8Path { path: PathBuf },
}
