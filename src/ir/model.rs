//! IR data model: projects, targets, and link items.

use crate::eval::facts::{Language, ProjectGlobals};
use crate::location::SourceLocation;
use camino::Utf8PathBuf;
use std::collections::BTreeSet;

/// What kind of CMake target an artifact maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Executable,
    StaticLibrary,
    SharedLibrary,
    ObjectLibrary,
    Interface,
    Imported,
    Custom,
}

impl TargetType {
    /// Internal libraries are the alias-bearing kinds.
    #[must_use]
    pub fn is_library(self) -> bool {
        matches!(
            self,
            Self::StaticLibrary | Self::SharedLibrary | Self::ObjectLibrary
        )
    }

    /// Parse the configuration spelling (`static_library`, `executable`, …).
    #[must_use]
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name {
            "executable" => Some(Self::Executable),
            "static_library" => Some(Self::StaticLibrary),
            "shared_library" => Some(Self::SharedLibrary),
            "object_library" => Some(Self::ObjectLibrary),
            "interface" => Some(Self::Interface),
            "imported" => Some(Self::Imported),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Property visibility on the generated target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
    Interface,
}

impl Visibility {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
            Self::Private => "PRIVATE",
            Self::Interface => "INTERFACE",
        }
    }

    #[must_use]
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name {
            "PUBLIC" => Some(Self::Public),
            "PRIVATE" => Some(Self::Private),
            "INTERFACE" => Some(Self::Interface),
            _ => None,
        }
    }
}

/// One entry of `target_link_libraries`, partitioned by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkItem {
    /// A library built by this project, referenced through its alias.
    Internal { alias: String },
    /// A raw link token left for the system linker (`m`, `pthread`, a path).
    External { token: String },
    /// A named imported target promoted by configuration.
    Imported { target: String },
}

impl LinkItem {
    /// The text that ends up in the generated call.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Internal { alias } => alias,
            Self::External { token } => token,
            Self::Imported { target } => target,
        }
    }

    /// Partition rank: internal aliases first, then external raw tokens,
    /// then imported targets.
    #[must_use]
    pub fn partition(&self) -> u8 {
        match self {
            Self::Internal { .. } => 0,
            Self::External { .. } => 1,
            Self::Imported { .. } => 2,
        }
    }
}

/// One source file of a target, posix-normalized and deduplicated.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: Utf8PathBuf,
    pub language: Language,
    pub flags: Vec<String>,
}

/// A shell command preserved for a custom target.
#[derive(Debug, Clone)]
pub struct CustomCommand {
    pub commands: Vec<String>,
    pub location: SourceLocation,
}

/// One generated CMake target.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    /// `<Namespace>::<Logical>`; present exactly on internal libraries.
    pub alias: Option<String>,
    pub ty: TargetType,
    /// The Make artifact this target was derived from.
    pub artifact: Utf8PathBuf,
    pub sources: Vec<SourceFile>,
    pub include_dirs: Vec<String>,
    pub defines: Vec<String>,
    pub compile_options: Vec<String>,
    pub link_options: Vec<String>,
    pub link_libraries: Vec<LinkItem>,
    /// Names of other project targets this one depends on (alias preferred).
    pub dependencies: Vec<String>,
    pub visibility: Visibility,
    pub custom_commands: Vec<CustomCommand>,
}

impl Target {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TargetType, artifact: Utf8PathBuf) -> Self {
        Self {
            name: name.into(),
            alias: None,
            ty,
            artifact,
            sources: Vec::new(),
            include_dirs: Vec::new(),
            defines: Vec::new(),
            compile_options: Vec::new(),
            link_options: Vec::new(),
            link_libraries: Vec::new(),
            dependencies: Vec::new(),
            visibility: Visibility::Private,
            custom_commands: Vec::new(),
        }
    }
}

/// The validated IR root handed to the emitter. Never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub version: Option<String>,
    pub namespace: String,
    pub languages: BTreeSet<Language>,
    pub targets: Vec<Target>,
    pub globals: ProjectGlobals,
}

impl Project {
    #[must_use]
    pub fn find_target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }
}
