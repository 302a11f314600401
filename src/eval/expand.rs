//! Textual variable expansion with recursion-loop detection.
//!
//! `$(NAME)`, `${NAME}`, and single-character `$X` references expand
//! recursively until nothing changes. A per-call in-progress set catches
//! self-referential recursive chains: re-entering a variable already being
//! expanded raises `EVAL_RECURSIVE_LOOP` and yields the empty string so
//! evaluation continues. Automatic variables are resolved from a per-recipe
//! table and are never stored in the environment.

use crate::config::ConversionConfig;
use crate::diagnostics::{DiagCode, Diagnostic, DiagnosticSink, Severity, Stage};
use crate::eval::env::VariableEnv;
use crate::eval::functions;
use crate::location::SourceLocation;
use crate::unknown::{
    normalize_call, Impact, Phase, UnknownCategory, UnknownContext, UnknownDraft, UnknownRegistry,
};
use crate::workspace::Workspace;
use camino::Utf8Path;
use std::collections::HashSet;

/// Automatic variables for one recipe line.
#[derive(Debug, Clone, Default)]
pub struct AutoVars {
    pub target: String,
    pub first_prereq: String,
    pub all_prereqs: String,
    pub newer_prereqs: String,
    pub stem: String,
}

impl AutoVars {
    /// Build the table from a rule's expanded targets and prerequisites.
    /// `$?` is approximated as all prerequisites; no real timestamps exist
    /// at translation time.
    #[must_use]
    pub fn for_rule(targets: &[String], prerequisites: &[String]) -> Self {
        let mut deduped: Vec<&str> = Vec::new();
        for prereq in prerequisites {
            if !deduped.contains(&prereq.as_str()) {
                deduped.push(prereq);
            }
        }
        let all = deduped.join(" ");
        let target = targets.first().cloned().unwrap_or_default();
        let stem = Utf8Path::new(&target)
            .file_stem()
            .unwrap_or_default()
            .to_owned();
        Self {
            first_prereq: prerequisites.first().cloned().unwrap_or_default(),
            newer_prereqs: all.clone(),
            all_prereqs: all,
            target,
            stem,
        }
    }

    #[must_use]
    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "@" => Some(&self.target),
            "<" => Some(&self.first_prereq),
            "^" => Some(&self.all_prereqs),
            "?" => Some(&self.newer_prereqs),
            "*" => Some(&self.stem),
            _ => None,
        }
    }
}

/// Shared services for one expansion call tree. The environment travels as a
/// separate argument so `foreach` can substitute a scoped copy.
pub struct ExpandCtx<'a> {
    pub workspace: &'a dyn Workspace,
    pub config: &'a ConversionConfig,
    /// Directory `$(wildcard)` patterns resolve against (the source root).
    pub base_dir: &'a Utf8Path,
    pub location: &'a SourceLocation,
    pub auto: Option<&'a AutoVars>,
    /// Targets of the enclosing rule, for unknown-construct context.
    pub scope_targets: &'a [String],
    pub sink: &'a mut DiagnosticSink,
    pub unknowns: &'a mut UnknownRegistry,
}

/// Expand every variable and function reference in `text`.
pub fn expand(text: &str, env: &VariableEnv, cx: &mut ExpandCtx) -> String {
    let mut in_progress = HashSet::new();
    expand_inner(text, env, cx, &mut in_progress)
}

pub(crate) fn expand_inner(
    text: &str,
    env: &VariableEnv,
    cx: &mut ExpandCtx,
    in_progress: &mut HashSet<String>,
) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        if chars[i] != '$' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        match chars.get(i + 1) {
            Some('$') => {
                out.push('$');
                i += 2;
            }
            Some(open @ ('(' | '{')) => {
                let close = if *open == '(' { ')' } else { '}' };
                match find_matching(&chars, i + 2, *open, close) {
                    Some(end) => {
                        let inner: String = chars[i + 2..end].iter().collect();
                        out.push_str(&resolve_ref(&inner, env, cx, in_progress));
                        i = end + 1;
                    }
                    None => {
                        // Unterminated reference; emit the rest verbatim.
                        out.extend(&chars[i..]);
                        i = chars.len();
                    }
                }
            }
            Some(single) => {
                let name = single.to_string();
                if let Some(auto) = cx.auto {
                    if let Some(value) = auto.lookup(&name) {
                        out.push_str(value);
                        i += 2;
                        continue;
                    }
                }
                out.push_str(&lookup_variable(&name, env, cx, in_progress));
                i += 2;
            }
            None => {
                out.push('$');
                i += 1;
            }
        }
    }
    out
}

/// Resolve the inside of a `$(...)` reference: a function call, a
/// substitution reference, or a plain (possibly computed) variable name.
fn resolve_ref(
    inner: &str,
    env: &VariableEnv,
    cx: &mut ExpandCtx,
    in_progress: &mut HashSet<String>,
) -> String {
    if let Some((name, args)) = split_function(inner) {
        if let Some(result) = functions::call(name, args, env, cx, in_progress) {
            return result;
        }
        record_unsupported_function(inner, env, cx);
        return String::new();
    }

    let name = if inner.contains('$') {
        expand_inner(inner, env, cx, in_progress)
    } else {
        inner.to_owned()
    };
    let name = name.trim();

    if let Some((var, from, to)) = parse_subst_ref(name) {
        let value = lookup_variable(var, env, cx, in_progress);
        return value
            .split_whitespace()
            .map(|word| substitute_suffix(word, from, to))
            .collect::<Vec<_>>()
            .join(" ");
    }
    lookup_variable(name, env, cx, in_progress)
}

fn lookup_variable(
    name: &str,
    env: &VariableEnv,
    cx: &mut ExpandCtx,
    in_progress: &mut HashSet<String>,
) -> String {
    if name.is_empty() {
        return String::new();
    }
    if let Some(auto) = cx.auto {
        if let Some(value) = auto.lookup(name) {
            return value.to_owned();
        }
    }
    let Some(binding) = env.lookup(name) else {
        return String::new();
    };
    if !in_progress.insert(name.to_owned()) {
        cx.sink.push(
            Diagnostic::error(
                DiagCode::EvalRecursiveLoop,
                format!("recursive expansion loop on variable `{name}`"),
            )
            .at(cx.location.clone())
            .from_stage(Stage::Evaluate),
        );
        return String::new();
    }
    let value = binding.value.clone();
    let result = expand_inner(&value, env, cx, in_progress);
    in_progress.remove(name);
    result
}

fn record_unsupported_function(inner: &str, env: &VariableEnv, cx: &mut ExpandCtx) {
    let raw = format!("$({inner})");
    let name = inner.split([' ', '\t', ',']).next().unwrap_or(inner);
    cx.sink.push(
        Diagnostic::warn(
            DiagCode::EvalUnsupportedFunc,
            format!("unsupported make function `{name}`"),
        )
        .at(cx.location.clone())
        .from_stage(Stage::Evaluate),
    );
    let draft = UnknownDraft::new(
        UnknownCategory::MakeFunction,
        cx.location.clone(),
        raw.clone(),
        Impact::new(Phase::Evaluate, Severity::Warn),
    )
    .context(UnknownContext {
        enclosing_targets: cx.scope_targets.to_vec(),
        variables_in_scope: env.names(),
        include_stack: vec![cx.location.path.clone()],
    });
    let draft = match normalize_call(&raw) {
        Some(form) => draft.normalized(form),
        None => draft,
    };
    cx.unknowns.record(cx.sink, draft);
}

/// `NAME args…` where the name is a word followed by whitespace or a comma.
/// Returns `None` for plain variable references such as `CC` or `t`.
fn split_function(inner: &str) -> Option<(&str, &str)> {
    let split_at = inner.find(|c: char| c.is_whitespace() || c == ',')?;
    let name = &inner[..split_at];
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return None;
    }
    let args = inner[split_at..].trim_start();
    Some((name, args))
}

/// `VAR:from=to` substitution references.
fn parse_subst_ref(name: &str) -> Option<(&str, &str, &str)> {
    let colon = name.find(':')?;
    let eq = name[colon..].find('=')? + colon;
    let var = &name[..colon];
    if var.is_empty() || var.contains(char::is_whitespace) {
        return None;
    }
    Some((var, &name[colon + 1..eq], &name[eq + 1..]))
}

fn substitute_suffix(word: &str, from: &str, to: &str) -> String {
    if from.contains('%') {
        if let Some(stem) = crate::eval::pattern::stem_match(word, from) {
            return crate::eval::pattern::stem_substitute(to, stem);
        }
        return word.to_owned();
    }
    word.strip_suffix(from)
        .map_or_else(|| word.to_owned(), |head| format!("{head}{to}"))
}

fn find_matching(chars: &[char], start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        if c == open {
            depth += 1;
        } else if c == close {
            if depth == 0 {
                return Some(i);
            }
            depth -= 1;
        }
        i += 1;
    }
    None
}
