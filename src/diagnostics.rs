//! Deduplicated, severity-tagged diagnostic collection.
//!
//! Every pipeline stage appends to one shared [`DiagnosticSink`]. Entries are
//! deduplicated on insert by the full (severity, code, message, location,
//! origin) tuple, kept in insertion order, and exposed through a sorted view
//! for rendering. The sink never performs I/O on its own; the renderer is
//! handed an arbitrary [`std::io::Write`].

use crate::location::SourceLocation;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::io;

/// Diagnostic severity. `Error` halts the pipeline at the next stage
/// boundary; the other two never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warn,
    Info,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable diagnostic codes. The wire names are part of the tool's contract
/// with external renderers and must not change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DiagCode {
    ConfigMissing,
    ConfigSchema,
    DiscoveryEntryMissing,
    DiscoveryCycle,
    DiscoveryIncludeMissing,
    DiscoveryIncludeOptionalMissing,
    DiscoverySubdirMissing,
    FsRead,
    ParserConditional,
    UnknownConstruct,
    EvalRecursiveLoop,
    EvalUnsupportedFunc,
    EvalNoSource,
    IrDupTarget,
    IrUnknownDep,
    IrUnmappedFlag,
    IrGlobalFlagOverlap,
    IrCycle,
    EmitWriteFail,
    EmitUnknownType,
    Internal,
}

impl DiagCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigMissing => "CONFIG_MISSING",
            Self::ConfigSchema => "CONFIG_SCHEMA",
            Self::DiscoveryEntryMissing => "DISCOVERY_ENTRY_MISSING",
            Self::DiscoveryCycle => "DISCOVERY_CYCLE",
            Self::DiscoveryIncludeMissing => "DISCOVERY_INCLUDE_MISSING",
            Self::DiscoveryIncludeOptionalMissing => "DISCOVERY_INCLUDE_OPTIONAL_MISSING",
            Self::DiscoverySubdirMissing => "DISCOVERY_SUBDIR_MISSING",
            Self::FsRead => "FS_READ",
            Self::ParserConditional => "PARSER_CONDITIONAL",
            Self::UnknownConstruct => "UNKNOWN_CONSTRUCT",
            Self::EvalRecursiveLoop => "EVAL_RECURSIVE_LOOP",
            Self::EvalUnsupportedFunc => "EVAL_UNSUPPORTED_FUNC",
            Self::EvalNoSource => "EVAL_NO_SOURCE",
            Self::IrDupTarget => "IR_DUP_TARGET",
            Self::IrUnknownDep => "IR_UNKNOWN_DEP",
            Self::IrUnmappedFlag => "IR_UNMAPPED_FLAG",
            Self::IrGlobalFlagOverlap => "IR_GLOBAL_FLAG_OVERLAP",
            Self::IrCycle => "IR_CYCLE",
            Self::EmitWriteFail => "EMIT_WRITE_FAIL",
            Self::EmitUnknownType => "EMIT_UNKNOWN_TYPE",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage a diagnostic originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Config,
    Discovery,
    Parse,
    Evaluate,
    BuildGraph,
    Emit,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Discovery => "discovery",
            Self::Parse => "parse",
            Self::Evaluate => "evaluate",
            Self::BuildGraph => "build_graph",
            Self::Emit => "emit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One collected diagnostic. Equality (used for deduplication) covers the
/// whole tuple, including location and origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagCode,
    pub message: String,
    pub location: Option<SourceLocation>,
    pub origin: Option<Stage>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(severity: Severity, code: DiagCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            location: None,
            origin: None,
        }
    }

    #[must_use]
    pub fn error(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    #[must_use]
    pub fn warn(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warn, code, message)
    }

    #[must_use]
    pub fn info(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, message)
    }

    #[must_use]
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub fn from_stage(mut self, stage: Stage) -> Self {
        self.origin = Some(stage);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code, self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " ({loc})")?;
        }
        Ok(())
    }
}

/// Append-only diagnostic collection with dedup-on-insert.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    entries: Vec<Diagnostic>,
    seen: HashSet<Diagnostic>,
}

impl DiagnosticSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a diagnostic unless an identical one is already present.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.seen.insert(diagnostic.clone()) {
            self.entries.push(diagnostic);
        }
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = Diagnostic>) {
        for item in items {
            self.push(item);
        }
    }

    #[must_use]
    pub fn any_error(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    /// Exit status for the whole run: 1 iff any error was recorded.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.any_error())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Diagnostics in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Presentation order: severity descending, then code, then insertion
    /// index. The stable sort preserves insertion order within a group.
    #[must_use]
    pub fn sorted(&self) -> Vec<&Diagnostic> {
        let mut view: Vec<&Diagnostic> = self.entries.iter().collect();
        view.sort_by_key(|d| (d.severity, d.code));
        view
    }

    /// Render the sorted view to `out`, one diagnostic per line. With
    /// `verbose` the originating stage tag is appended.
    pub fn render(&self, out: &mut impl io::Write, verbose: bool) -> io::Result<()> {
        for diag in self.sorted() {
            if verbose {
                if let Some(origin) = diag.origin {
                    writeln!(out, "{diag} [{origin}]")?;
                    continue;
                }
            }
            writeln!(out, "{diag}")?;
        }
        Ok(())
    }

    /// JSON payload for external renderers.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self.entries)
    }
}
