//! Source locations for everything read out of a Makefile.
//!
//! Every syntax node, diagnostic, and unknown construct carries one of these
//! so downstream renderers can point back at the offending line.

use camino::Utf8PathBuf;
use serde::Serialize;
use std::fmt;

/// A position inside one of the discovered Makefiles.
///
/// Lines and columns are 1-based; column 1 is used for line-oriented
/// constructs where a finer position adds nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLocation {
    pub path: Utf8PathBuf,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, line: u32, column: u32) -> Self {
        Self {
            path: path.into(),
            line,
            column,
        }
    }

    /// Location for a whole line.
    #[must_use]
    pub fn line_of(path: impl Into<Utf8PathBuf>, line: u32) -> Self {
        Self::new(path, line, 1)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.line, self.column)
    }
}
