//! Bookkeeping for Make and CMake fragments the translator cannot render.
//!
//! Each entry receives a stable `UC`-prefixed id, a best-effort structural
//! summary of the offending fragment, and enough surrounding context to guide
//! a manual fix-up. Recording an entry also emits a paired
//! `UNKNOWN_CONSTRUCT` diagnostic whose severity mirrors the construct's
//! impact.

use crate::diagnostics::{DiagCode, Diagnostic, DiagnosticSink, Severity};
use crate::location::SourceLocation;
use camino::Utf8PathBuf;
use serde::Serialize;
use std::fmt;

const SNIPPET_LIMIT: usize = 200;

/// Classification of an unmappable fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCategory {
    MakeSyntax,
    MakeFunction,
    ShellCommand,
    ConditionalLogic,
    ToolchainSpecific,
    Other,
}

impl UnknownCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MakeSyntax => "make_syntax",
            Self::MakeFunction => "make_function",
            Self::ShellCommand => "shell_command",
            Self::ConditionalLogic => "conditional_logic",
            Self::ToolchainSpecific => "toolchain_specific",
            Self::Other => "other",
        }
    }
}

/// Pipeline phase the construct was encountered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Parse,
    Evaluate,
    BuildGraph,
    CmakeGeneration,
}

/// How much of the construct made it into the generated CMake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CmakeStatus {
    NotGenerated,
    PartiallyGenerated,
    Approximate,
}

/// Recommended follow-up for the migrating engineer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    ManualReview,
    ManualCustomCommand,
    RequiresMapping,
}

/// Phase and severity of the construct's effect on the translation.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Impact {
    pub phase: Phase,
    pub severity: Severity,
}

impl Impact {
    #[must_use]
    pub fn new(phase: Phase, severity: Severity) -> Self {
        Self { phase, severity }
    }
}

/// Surrounding state captured at the point of failure.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UnknownContext {
    pub enclosing_targets: Vec<String>,
    pub variables_in_scope: Vec<String>,
    pub include_stack: Vec<Utf8PathBuf>,
}

/// One recorded unmappable fragment.
#[derive(Debug, Clone, Serialize)]
pub struct UnknownConstruct {
    pub id: String,
    pub category: UnknownCategory,
    pub location: SourceLocation,
    pub raw_snippet: String,
    pub normalized_form: String,
    pub context: UnknownContext,
    pub impact: Impact,
    pub cmake_status: CmakeStatus,
    pub suggested_action: SuggestedAction,
}

impl fmt::Display for UnknownConstruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} ({})",
            self.id,
            self.category.as_str(),
            self.normalized_form,
            self.location
        )
    }
}

/// Everything the caller supplies; id assignment and snippet trimming happen
/// inside the registry.
#[derive(Debug)]
pub struct UnknownDraft {
    pub category: UnknownCategory,
    pub location: SourceLocation,
    pub raw_snippet: String,
    pub normalized_form: Option<String>,
    pub context: UnknownContext,
    pub impact: Impact,
    pub cmake_status: CmakeStatus,
    pub suggested_action: SuggestedAction,
}

impl UnknownDraft {
    #[must_use]
    pub fn new(
        category: UnknownCategory,
        location: SourceLocation,
        raw_snippet: impl Into<String>,
        impact: Impact,
    ) -> Self {
        Self {
            category,
            location,
            raw_snippet: raw_snippet.into(),
            normalized_form: None,
            context: UnknownContext::default(),
            impact,
            cmake_status: CmakeStatus::NotGenerated,
            suggested_action: SuggestedAction::ManualReview,
        }
    }

    #[must_use]
    pub fn normalized(mut self, form: impl Into<String>) -> Self {
        self.normalized_form = Some(form.into());
        self
    }

    #[must_use]
    pub fn context(mut self, context: UnknownContext) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn status(mut self, status: CmakeStatus) -> Self {
        self.cmake_status = status;
        self
    }

    #[must_use]
    pub fn action(mut self, action: SuggestedAction) -> Self {
        self.suggested_action = action;
        self
    }
}

/// Append-only registry with monotonic ids, reset per run.
#[derive(Debug, Default)]
pub struct UnknownRegistry {
    items: Vec<UnknownConstruct>,
    counter: u32,
}

impl UnknownRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a construct and emit the paired `UNKNOWN_CONSTRUCT` diagnostic.
    pub fn record(&mut self, sink: &mut DiagnosticSink, draft: UnknownDraft) -> &UnknownConstruct {
        self.counter += 1;
        let raw = truncate(draft.raw_snippet.trim(), SNIPPET_LIMIT);
        let normalized = draft
            .normalized_form
            .filter(|form| !form.trim().is_empty())
            .map_or_else(|| raw.clone(), |form| truncate(form.trim(), SNIPPET_LIMIT));
        let construct = UnknownConstruct {
            id: format!("UC{:04}", self.counter),
            category: draft.category,
            location: draft.location,
            raw_snippet: raw,
            normalized_form: normalized,
            context: draft.context,
            impact: draft.impact,
            cmake_status: draft.cmake_status,
            suggested_action: draft.suggested_action,
        };
        sink.push(
            Diagnostic::new(
                construct.impact.severity,
                DiagCode::UnknownConstruct,
                format!(
                    "{}: unsupported {}: {}",
                    construct.id,
                    construct.category.as_str(),
                    construct.normalized_form
                ),
            )
            .at(construct.location.clone()),
        );
        self.items.push(construct);
        self.items.last().expect("just pushed")
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnknownConstruct> {
        self.items.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// JSON payload for external renderers.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self.items)
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    text.chars().take(limit).collect()
}

/// Rewrite a `$(func args…)` call into a structural `func(arg, arg)` summary.
///
/// Plain variable references are left verbatim, so
/// `$(eval $(call DEFINE_RULE,$(t)))` becomes
/// `eval(call(DEFINE_RULE, $(t)))`. Returns `None` when the snippet is not a
/// call form at all.
#[must_use]
pub fn normalize_call(snippet: &str) -> Option<String> {
    let trimmed = snippet.trim();
    let inner = strip_dollar_parens(trimmed)?;
    let (name, rest) = split_call(inner)?;
    let args: Vec<String> = split_top_level_commas(rest)
        .into_iter()
        .map(|arg| {
            let arg = arg.trim();
            normalize_call(arg).unwrap_or_else(|| arg.to_owned())
        })
        .collect();
    Some(format!("{name}({})", args.join(", ")))
}

/// Rewrite a conditional test into an `if LHS == RHS` summary, stripping
/// variable wrappers from the operands. `ifeq ($(CC),clang)` becomes
/// `if CC == clang`.
#[must_use]
pub fn normalize_conditional(test: &str) -> Option<String> {
    let trimmed = test.trim();
    for (keyword, op) in [("ifeq", "=="), ("ifneq", "!=")] {
        if let Some(rest) = trimmed.strip_prefix(keyword) {
            let rest = rest.trim();
            let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
            let parts = split_top_level_commas(inner);
            if parts.len() != 2 {
                return None;
            }
            let lhs = strip_var_wrapper(parts[0].trim());
            let rhs = strip_var_wrapper(parts[1].trim());
            return Some(format!("if {lhs} {op} {rhs}"));
        }
    }
    for (keyword, form) in [("ifdef", "defined"), ("ifndef", "!defined")] {
        if let Some(rest) = trimmed.strip_prefix(keyword) {
            let name = rest.trim();
            if !name.is_empty() {
                return Some(format!("if {form} {name}"));
            }
        }
    }
    None
}

fn strip_dollar_parens(text: &str) -> Option<&str> {
    let body = text.strip_prefix("$(")?.strip_suffix(')')?;
    balanced(body).then_some(body)
}

fn strip_var_wrapper(operand: &str) -> String {
    strip_dollar_parens(operand).map_or_else(|| operand.to_owned(), str::to_owned)
}

/// Split `call DEFINE_RULE,$(t)` into the call name and its argument text.
/// A bare `$(VAR)` body has no argument text and is not a call.
fn split_call(body: &str) -> Option<(&str, &str)> {
    let split_at = body.find(|c: char| c.is_whitespace() || c == ',')?;
    let name = &body[..split_at];
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || "-_".contains(c)) {
        return None;
    }
    let rest = body[split_at..].trim_start_matches(|c: char| c.is_whitespace());
    Some((name, rest))
}

fn split_top_level_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' | '{' => depth += 1,
            ')' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn balanced(text: &str) -> bool {
    let mut depth = 0i32;
    for ch in text.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_call_normalizes_structurally() {
        let raw = "$(eval $(call DEFINE_RULE,$(t)))";
        assert_eq!(
            normalize_call(raw).as_deref(),
            Some("eval(call(DEFINE_RULE, $(t)))")
        );
    }

    #[test]
    fn shell_call_keeps_command_text() {
        assert_eq!(
            normalize_call("$(shell perl gen.pl)").as_deref(),
            Some("shell(perl gen.pl)")
        );
    }

    #[test]
    fn plain_variable_is_not_a_call() {
        assert_eq!(normalize_call("$(t)"), None);
    }

    #[test]
    fn ifeq_becomes_comparison() {
        assert_eq!(
            normalize_conditional("ifeq ($(CC),clang)").as_deref(),
            Some("if CC == clang")
        );
    }

    #[test]
    fn ifneq_negates() {
        assert_eq!(
            normalize_conditional("ifneq ($(OS),Windows_NT)").as_deref(),
            Some("if OS != Windows_NT")
        );
    }

    #[test]
    fn ids_are_zero_padded_and_monotonic() {
        let mut registry = UnknownRegistry::new();
        let mut sink = DiagnosticSink::new();
        let loc = SourceLocation::line_of("Makefile", 1);
        let first = registry
            .record(
                &mut sink,
                UnknownDraft::new(
                    UnknownCategory::MakeFunction,
                    loc.clone(),
                    "$(shell date)",
                    Impact::new(Phase::Evaluate, Severity::Warn),
                ),
            )
            .id
            .clone();
        let second = registry
            .record(
                &mut sink,
                UnknownDraft::new(
                    UnknownCategory::MakeSyntax,
                    loc,
                    "export FOO",
                    Impact::new(Phase::Parse, Severity::Warn),
                ),
            )
            .id
            .clone();
        assert_eq!(first, "UC0001");
        assert_eq!(second, "UC0002");
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn paired_diagnostic_mirrors_impact_severity() {
        let mut registry = UnknownRegistry::new();
        let mut sink = DiagnosticSink::new();
        registry.record(
            &mut sink,
            UnknownDraft::new(
                UnknownCategory::ToolchainSpecific,
                SourceLocation::line_of("Makefile", 9),
                "windres app.rc",
                Impact::new(Phase::CmakeGeneration, Severity::Error),
            ),
        );
        let diag = sink.iter().next().expect("one diagnostic");
        assert_eq!(diag.code, DiagCode::UnknownConstruct);
        assert_eq!(diag.severity, Severity::Error);
        assert!(sink.any_error());
    }

    #[test]
    fn long_snippets_are_trimmed() {
        let mut registry = UnknownRegistry::new();
        let mut sink = DiagnosticSink::new();
        let raw = "x".repeat(500);
        let uc = registry.record(
            &mut sink,
            UnknownDraft::new(
                UnknownCategory::Other,
                SourceLocation::line_of("Makefile", 1),
                raw,
                Impact::new(Phase::BuildGraph, Severity::Warn),
            ),
        );
        assert_eq!(uc.raw_snippet.len(), 200);
        assert_eq!(uc.normalized_form.len(), 200);
    }
}
