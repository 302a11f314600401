//! Typed view over the user-supplied conversion configuration.
//!
//! The configuration arrives as a YAML mapping; this module projects it into
//! [`ConversionConfig`] while reporting schema problems through the
//! diagnostic sink. Unknown keys are warnings (errors under `strict`);
//! wrong-shaped values are always errors.

use crate::diagnostics::{DiagCode, Diagnostic, DiagnosticSink, Stage};
use crate::workspace::Workspace;
use camino::Utf8Path;
use glob::Pattern;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeMap;

/// Target types accepted in `target_mappings.*.type_override`.
pub const VALID_TARGET_TYPES: &[&str] = &[
    "executable",
    "static_library",
    "shared_library",
    "object_library",
    "interface",
    "imported",
    "custom",
];

/// Visibility keywords accepted in `target_mappings.*.visibility`.
pub const VALID_VISIBILITIES: &[&str] = &["PUBLIC", "PRIVATE", "INTERFACE"];

const DEFAULT_GLOBAL_CONFIG_FILES: &[&str] = &["config.mk", "rules.mk", "defs.mk"];

const KNOWN_KEYS: &[&str] = &[
    "project_name",
    "version",
    "namespace",
    "languages",
    "target_mappings",
    "flag_mappings",
    "ignore_paths",
    "global_config_files",
    "link_overrides",
    "packaging_enabled",
    "strict",
];

/// Per-target rename and property overrides.
#[derive(Debug, Clone, Default)]
pub struct TargetMapping {
    pub dest_name: String,
    pub type_override: Option<String>,
    pub link_libs: Vec<String>,
    pub include_dirs: Vec<String>,
    pub defines: Vec<String>,
    pub options: Vec<String>,
    pub visibility: Option<String>,
}

/// Forced library-role classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkClassification {
    Internal,
    External,
    Imported,
}

#[derive(Debug, Clone)]
pub struct LinkOverride {
    pub classification: LinkClassification,
    pub alias: Option<String>,
    pub imported_target: Option<String>,
}

/// The fully validated configuration consumed by the pipeline.
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub project_name: Option<String>,
    pub version: Option<String>,
    pub namespace: Option<String>,
    pub languages: Option<Vec<String>>,
    pub target_mappings: BTreeMap<String, TargetMapping>,
    pub flag_mappings: IndexMap<String, String>,
    pub ignore_paths: Vec<String>,
    pub global_config_files: Vec<String>,
    pub link_overrides: BTreeMap<String, LinkOverride>,
    pub packaging_enabled: bool,
    pub strict: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            project_name: None,
            version: None,
            namespace: None,
            languages: None,
            target_mappings: BTreeMap::new(),
            flag_mappings: IndexMap::new(),
            ignore_paths: Vec::new(),
            global_config_files: DEFAULT_GLOBAL_CONFIG_FILES
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            link_overrides: BTreeMap::new(),
            packaging_enabled: false,
            strict: false,
        }
    }
}

impl ConversionConfig {
    /// Load the configuration from an optional YAML file.
    ///
    /// A missing explicit path is `CONFIG_MISSING`; no path at all yields the
    /// defaults. `strict` is the CLI flag; the file's own `strict` key is
    /// honored on top of it.
    pub fn load(
        path: Option<&Utf8Path>,
        strict: bool,
        workspace: &dyn Workspace,
        sink: &mut DiagnosticSink,
    ) -> Self {
        let Some(path) = path else {
            return Self {
                strict,
                ..Self::default()
            };
        };
        if !workspace.is_file(path) {
            sink.push(
                Diagnostic::error(DiagCode::ConfigMissing, format!("config file not found: {path}"))
                    .from_stage(Stage::Config),
            );
            return Self {
                strict,
                ..Self::default()
            };
        }
        let text = match workspace.read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                sink.push(
                    Diagnostic::error(DiagCode::FsRead, format!("failed to read {path}: {err}"))
                        .from_stage(Stage::Config),
                );
                return Self {
                    strict,
                    ..Self::default()
                };
            }
        };
        let value: Value = match serde_yml::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                sink.push(
                    Diagnostic::error(
                        DiagCode::ConfigSchema,
                        format!("invalid YAML in {path}: {err}"),
                    )
                    .from_stage(Stage::Config),
                );
                return Self {
                    strict,
                    ..Self::default()
                };
            }
        };
        Self::from_value(&value, strict, sink)
    }

    /// Project a parsed mapping into the typed configuration.
    pub fn from_value(value: &Value, cli_strict: bool, sink: &mut DiagnosticSink) -> Self {
        let mut config = Self::default();
        let Value::Object(map) = value else {
            if !value.is_null() {
                sink.push(
                    Diagnostic::error(DiagCode::ConfigSchema, "config root must be a mapping")
                        .from_stage(Stage::Config),
                );
            }
            config.strict = cli_strict;
            return config;
        };

        // Strict must be known before unknown-key severities can be decided.
        let file_strict = map.get("strict").and_then(Value::as_bool).unwrap_or(false);
        config.strict = cli_strict || file_strict;
        if let Some(v) = map.get("strict") {
            if !v.is_boolean() {
                schema_error(sink, "strict must be a boolean");
            }
        }

        for key in map.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                let diag = if config.strict {
                    Diagnostic::error(DiagCode::ConfigSchema, format!("unknown config key: {key}"))
                } else {
                    Diagnostic::warn(DiagCode::ConfigSchema, format!("unknown config key: {key}"))
                };
                sink.push(diag.from_stage(Stage::Config));
            }
        }

        config.project_name = string_field(map, "project_name", sink);
        config.version = string_field(map, "version", sink);
        config.namespace = string_field(map, "namespace", sink);
        config.languages = string_list_field(map, "languages", sink);
        if let Some(paths) = string_list_field(map, "ignore_paths", sink) {
            config.ignore_paths = normalize_ignore_paths(&paths, sink);
        }
        if let Some(files) = string_list_field(map, "global_config_files", sink) {
            if !files.is_empty() {
                config.global_config_files = files;
            }
        }
        if let Some(v) = map.get("packaging_enabled") {
            match v.as_bool() {
                Some(b) => config.packaging_enabled = b,
                None => schema_error(sink, "packaging_enabled must be a boolean"),
            }
        }
        config.flag_mappings = flag_mappings_field(map, sink);
        config.target_mappings = target_mappings_field(map, sink);
        config.link_overrides = link_overrides_field(map, sink);
        config
    }

    /// True when `path` matches any configured ignore glob.
    #[must_use]
    pub fn should_ignore(&self, path: &str) -> bool {
        if self.ignore_paths.is_empty() || path.is_empty() {
            return false;
        }
        let posix = path.replace('\\', "/");
        self.ignore_paths.iter().any(|pattern| {
            Pattern::new(pattern).is_ok_and(|p| p.matches(&posix))
        })
    }

    /// The effective namespace: configured, else sanitized project name.
    #[must_use]
    pub fn resolved_namespace(&self, fallback_project: &str) -> String {
        let raw = self
            .namespace
            .as_deref()
            .or(self.project_name.as_deref())
            .unwrap_or(fallback_project);
        sanitize_identifier(raw)
    }

    #[must_use]
    pub fn link_override(&self, name: &str) -> Option<&LinkOverride> {
        self.link_overrides.get(name)
    }
}

/// Strip non-identifier characters; a leading digit gets an underscore
/// prefix so the result is always a valid CMake identifier.
#[must_use]
pub fn sanitize_identifier(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if stripped.is_empty() {
        return "project".to_owned();
    }
    if stripped.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("_{stripped}")
    } else {
        stripped
    }
}

fn schema_error(sink: &mut DiagnosticSink, message: impl Into<String>) {
    sink.push(Diagnostic::error(DiagCode::ConfigSchema, message).from_stage(Stage::Config));
}

fn string_field(
    map: &serde_json::Map<String, Value>,
    key: &str,
    sink: &mut DiagnosticSink,
) -> Option<String> {
    match map.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            schema_error(sink, format!("{key} must be a string"));
            None
        }
    }
}

fn string_list_field(
    map: &serde_json::Map<String, Value>,
    key: &str,
    sink: &mut DiagnosticSink,
) -> Option<Vec<String>> {
    match map.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item.as_str() {
                    Some(s) => out.push(s.to_owned()),
                    None => {
                        schema_error(sink, format!("{key} entries must be strings"));
                        return None;
                    }
                }
            }
            Some(out)
        }
        Some(_) => {
            schema_error(sink, format!("{key} must be a list of strings"));
            None
        }
    }
}

fn normalize_ignore_paths(paths: &[String], sink: &mut DiagnosticSink) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for raw in paths {
        if raw.trim().is_empty() {
            schema_error(sink, "ignore_paths entries must not be empty");
            continue;
        }
        if raw.contains("..") {
            schema_error(sink, format!("ignore_paths entry must not traverse upward: {raw}"));
            continue;
        }
        let norm = raw.replace('\\', "/").trim_end_matches('/').to_owned();
        if seen.insert(norm.clone()) {
            out.push(norm);
        }
    }
    out
}

fn flag_mappings_field(
    map: &serde_json::Map<String, Value>,
    sink: &mut DiagnosticSink,
) -> IndexMap<String, String> {
    let mut out = IndexMap::new();
    match map.get("flag_mappings") {
        None | Some(Value::Null) => {}
        Some(Value::Object(entries)) => {
            for (flag, replacement) in entries {
                match replacement.as_str() {
                    Some(s) => {
                        out.insert(flag.clone(), s.to_owned());
                    }
                    None => schema_error(
                        sink,
                        format!("flag_mappings.{flag} must map to a string"),
                    ),
                }
            }
        }
        Some(_) => schema_error(sink, "flag_mappings must be a mapping"),
    }
    out
}

fn target_mappings_field(
    map: &serde_json::Map<String, Value>,
    sink: &mut DiagnosticSink,
) -> BTreeMap<String, TargetMapping> {
    let mut out = BTreeMap::new();
    match map.get("target_mappings") {
        None | Some(Value::Null) => {}
        Some(Value::Object(entries)) => {
            for (name, spec) in entries {
                let Value::Object(spec) = spec else {
                    schema_error(sink, format!("target_mappings.{name} must be a mapping"));
                    continue;
                };
                let mut mapping = TargetMapping {
                    dest_name: string_field(spec, "dest_name", sink).unwrap_or_else(|| name.clone()),
                    type_override: string_field(spec, "type_override", sink),
                    link_libs: string_list_field(spec, "link_libs", sink).unwrap_or_default(),
                    include_dirs: string_list_field(spec, "include_dirs", sink).unwrap_or_default(),
                    defines: string_list_field(spec, "defines", sink).unwrap_or_default(),
                    options: string_list_field(spec, "options", sink).unwrap_or_default(),
                    visibility: string_field(spec, "visibility", sink),
                };
                if let Some(ty) = &mapping.type_override {
                    if !VALID_TARGET_TYPES.contains(&ty.as_str()) {
                        schema_error(
                            sink,
                            format!("target_mappings.{name}.type_override is not a target type: {ty}"),
                        );
                        mapping.type_override = None;
                    }
                }
                if let Some(vis) = &mapping.visibility {
                    if !VALID_VISIBILITIES.contains(&vis.as_str()) {
                        schema_error(
                            sink,
                            format!("target_mappings.{name}.visibility must be PUBLIC, PRIVATE, or INTERFACE"),
                        );
                        mapping.visibility = None;
                    }
                }
                out.insert(name.clone(), mapping);
            }
        }
        Some(_) => schema_error(sink, "target_mappings must be a mapping"),
    }
    out
}

fn link_overrides_field(
    map: &serde_json::Map<String, Value>,
    sink: &mut DiagnosticSink,
) -> BTreeMap<String, LinkOverride> {
    let mut out = BTreeMap::new();
    match map.get("link_overrides") {
        None | Some(Value::Null) => {}
        Some(Value::Object(entries)) => {
            for (name, spec) in entries {
                let Value::Object(spec) = spec else {
                    schema_error(sink, format!("link_overrides.{name} must be a mapping"));
                    continue;
                };
                let classification = match string_field(spec, "classification", sink).as_deref() {
                    Some("internal") => LinkClassification::Internal,
                    Some("external") => LinkClassification::External,
                    Some("imported") => LinkClassification::Imported,
                    other => {
                        schema_error(
                            sink,
                            format!(
                                "link_overrides.{name}.classification must be internal, external, or imported (got {})",
                                other.unwrap_or("nothing")
                            ),
                        );
                        continue;
                    }
                };
                out.insert(
                    name.clone(),
                    LinkOverride {
                        classification,
                        alias: string_field(spec, "alias", sink),
                        imported_target: string_field(spec, "imported_target", sink),
                    },
                );
            }
        }
        Some(_) => schema_error(sink, "link_overrides must be a mapping"),
    }
    out
}
