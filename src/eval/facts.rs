//! Evaluated build facts: what the evaluator hands to the IR builder.

use crate::location::SourceLocation;
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// Source language of a compile, inferred from the tool or file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    C,
    Cpp,
    Asm,
    Other,
}

impl Language {
    /// The CMake `LANGUAGES` spelling, when one exists.
    #[must_use]
    pub fn cmake_name(self) -> Option<&'static str> {
        match self {
            Self::C => Some("C"),
            Self::Cpp => Some("CXX"),
            Self::Asm => Some("ASM"),
            Self::Other => None,
        }
    }

    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "c" => Self::C,
            "cc" | "cpp" | "cxx" | "c++" | "m" | "mm" => Self::Cpp,
            "s" | "asm" => Self::Asm,
            _ => Self::Other,
        }
    }
}

/// What a recognized recipe line does with the toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Compile,
    Link,
    Archive,
}

/// Flag buckets for project-global configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagBucket {
    C,
    Cpp,
    Asm,
    Link,
    All,
}

/// A feature toggle captured from a global assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggle {
    Bool(bool),
    Text(String),
}

/// One expanded recipe line with the location of the raw command.
#[derive(Debug, Clone)]
pub struct EvaluatedCommand {
    pub text: String,
    pub location: SourceLocation,
}

/// A rule after variable expansion. Pattern rules stay symbolic (`%` intact)
/// until the IR builder instantiates them.
#[derive(Debug, Clone)]
pub struct EvaluatedRule {
    pub targets: Vec<String>,
    pub prerequisites: Vec<String>,
    pub recipe: Vec<EvaluatedCommand>,
    pub is_pattern: bool,
    pub location: SourceLocation,
}

/// One compile/link/archive fact extracted from a recipe line. A line with
/// several inputs yields one record per input, all sharing the extraction.
#[derive(Debug, Clone)]
pub struct InferredCompile {
    pub source: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub language: Language,
    pub kind: ToolKind,
    pub flags: Vec<String>,
    pub include_dirs: Vec<String>,
    pub defines: Vec<String>,
    pub libs: Vec<String>,
    pub location: SourceLocation,
}

/// Configuration shared across targets, captured from pre-rule and
/// designated-global-file assignments.
#[derive(Debug, Clone, Default)]
pub struct ProjectGlobals {
    pub vars: IndexMap<String, String>,
    pub flags: BTreeMap<FlagBucket, Vec<String>>,
    pub defines: Vec<String>,
    pub includes: Vec<String>,
    pub toggles: IndexMap<String, Toggle>,
    /// Files the captured assignments originated from, in first-seen order.
    pub origins: Vec<Utf8PathBuf>,
}

impl ProjectGlobals {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
            && self.flags.values().all(Vec::is_empty)
            && self.defines.is_empty()
            && self.includes.is_empty()
            && self.toggles.is_empty()
    }

    #[must_use]
    pub fn bucket(&self, bucket: FlagBucket) -> &[String] {
        self.flags.get(&bucket).map_or(&[], Vec::as_slice)
    }
}

/// Everything evaluation produced, in deterministic order.
#[derive(Debug, Default)]
pub struct BuildFacts {
    pub rules: Vec<EvaluatedRule>,
    pub compiles: Vec<InferredCompile>,
    pub custom_commands: Vec<EvaluatedRule>,
    pub globals: ProjectGlobals,
}
