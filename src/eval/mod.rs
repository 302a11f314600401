//! Evaluation: syntax trees + variable environment → build facts.
//!
//! Consumes the parsed files in discovery order, maintaining one
//! [`VariableEnv`] across all of them (Make include semantics). Conditionals
//! are resolved here, assignments follow GNU semantics per operator, rules
//! are expanded with automatic variables, and recipe lines feed compile
//! inference. Assignments seen before the first rule, or living in a
//! designated global-config file, accumulate into [`ProjectGlobals`].

pub mod compile;
pub mod env;
pub mod expand;
pub mod facts;
pub mod functions;
pub mod pattern;

use crate::config::ConversionConfig;
use crate::diagnostics::{DiagnosticSink, Severity};
use crate::location::SourceLocation;
use crate::makefile::ast::{AssignKind, Node, RecipeLine};
use crate::unknown::{
    normalize_conditional, Impact, Phase, UnknownCategory, UnknownContext, UnknownDraft,
    UnknownRegistry,
};
use crate::workspace::{relative_from, Workspace};
use camino::{Utf8Path, Utf8PathBuf};
use env::VariableEnv;
use expand::{AutoVars, ExpandCtx};
use facts::{BuildFacts, EvaluatedCommand, EvaluatedRule, FlagBucket, Toggle};
use std::collections::BTreeSet;

/// One parsed makefile, in discovery order.
#[derive(Debug)]
pub struct ParsedMakefile {
    pub path: Utf8PathBuf,
    pub nodes: Vec<Node>,
}

/// Evaluate the concatenated node stream into build facts.
pub fn evaluate(
    files: &[ParsedMakefile],
    source_dir: &Utf8Path,
    config: &ConversionConfig,
    workspace: &dyn Workspace,
    sink: &mut DiagnosticSink,
    unknowns: &mut UnknownRegistry,
) -> BuildFacts {
    let global_files: BTreeSet<String> = config
        .global_config_files
        .iter()
        .map(|name| {
            Utf8Path::new(name)
                .file_name()
                .unwrap_or(name.as_str())
                .to_owned()
        })
        .collect();
    let mut evaluator = Evaluator {
        config,
        workspace,
        source_dir,
        sink,
        unknowns,
        env: VariableEnv::new(),
        facts: BuildFacts::default(),
        seen_rule: false,
        global_files,
    };
    for file in files {
        evaluator.process_nodes(&file.nodes);
    }
    evaluator.finish()
}

struct Evaluator<'a> {
    config: &'a ConversionConfig,
    workspace: &'a dyn Workspace,
    source_dir: &'a Utf8Path,
    sink: &'a mut DiagnosticSink,
    unknowns: &'a mut UnknownRegistry,
    env: VariableEnv,
    facts: BuildFacts,
    seen_rule: bool,
    global_files: BTreeSet<String>,
}

enum CondTest {
    Compare {
        lhs: String,
        rhs: String,
        negated: bool,
    },
    Defined {
        name: String,
        negated: bool,
    },
    Unsupported,
}

impl Evaluator<'_> {
    fn process_nodes(&mut self, nodes: &[Node]) {
        for node in nodes {
            match node {
                Node::Assign(assign) => self.handle_assign(assign),
                Node::Conditional(cond) => self.handle_conditional(cond),
                Node::Rule(rule) => self.handle_rule(
                    &rule.targets,
                    &rule.prerequisites,
                    &rule.recipe,
                    false,
                    &rule.location,
                ),
                Node::Pattern(pattern) => self.handle_rule(
                    std::slice::from_ref(&pattern.target_pattern),
                    &pattern.prereq_patterns,
                    &pattern.recipe,
                    true,
                    &pattern.location,
                ),
                Node::Raw(raw) => {
                    if self.is_ignored(&raw.location.path) {
                        continue;
                    }
                    // A shell line owned by no rule has no CMake home; keep
                    // the expanded text for the report and flag it.
                    let expanded = self.expand_at(&raw.command, &raw.location, None, &[]);
                    let draft = UnknownDraft::new(
                        UnknownCategory::ShellCommand,
                        raw.location.clone(),
                        &raw.command,
                        Impact::new(Phase::Evaluate, Severity::Warn),
                    )
                    .action(crate::unknown::SuggestedAction::ManualCustomCommand)
                    .context(UnknownContext {
                        variables_in_scope: self.env.names(),
                        include_stack: vec![raw.location.path.clone()],
                        ..UnknownContext::default()
                    });
                    self.unknowns.record(self.sink, draft);
                    self.facts.custom_commands.push(EvaluatedRule {
                        targets: Vec::new(),
                        prerequisites: Vec::new(),
                        recipe: vec![EvaluatedCommand {
                            text: expanded,
                            location: raw.location.clone(),
                        }],
                        is_pattern: false,
                        location: raw.location.clone(),
                    });
                }
                // Include graph membership was settled during discovery.
                Node::Include(_) => {}
            }
        }
    }

    fn handle_assign(&mut self, assign: &crate::makefile::ast::VariableAssign) {
        if self.is_ignored(&assign.location.path) {
            return;
        }
        match assign.kind {
            AssignKind::Simple => {
                let expanded = self.expand_at(&assign.value, &assign.location, None, &[]);
                self.env.set(&assign.name, expanded, AssignKind::Simple);
            }
            AssignKind::Recursive => {
                self.env
                    .set(&assign.name, assign.value.clone(), AssignKind::Recursive);
            }
            AssignKind::Append => match self.env.lookup(&assign.name).cloned() {
                None => {
                    // GNU treats += on an unbound name as a recursive binding.
                    self.env
                        .set(&assign.name, assign.value.clone(), AssignKind::Recursive);
                }
                Some(binding) => {
                    let appended = if binding.kind == AssignKind::Simple {
                        let expanded = self.expand_at(&assign.value, &assign.location, None, &[]);
                        join_with_space(&binding.value, &expanded)
                    } else {
                        join_with_space(&binding.value, &assign.value)
                    };
                    self.env.set(&assign.name, appended, binding.kind);
                }
            },
            AssignKind::Conditional => {
                if !self.env.is_bound(&assign.name) {
                    self.env
                        .set(&assign.name, assign.value.clone(), AssignKind::Recursive);
                }
            }
        }
        if self.is_global_origin(&assign.location) {
            self.record_global(assign);
        }
    }

    fn handle_conditional(&mut self, cond: &crate::makefile::ast::Conditional) {
        match self.parse_conditional(&cond.test) {
            CondTest::Compare { lhs, rhs, negated } => {
                let lhs = self.expand_at(&lhs, &cond.location, None, &[]);
                let rhs = self.expand_at(&rhs, &cond.location, None, &[]);
                let equal = lhs.trim() == rhs.trim();
                self.take_branch(cond, equal != negated);
            }
            CondTest::Defined { name, negated } => {
                let defined = match self.env.lookup(&name).cloned() {
                    Some(binding) => !self
                        .expand_at(&binding.value, &cond.location, None, &[])
                        .trim()
                        .is_empty(),
                    None => false,
                };
                self.take_branch(cond, defined != negated);
            }
            CondTest::Unsupported => {
                // Indeterminate frame: drop both branches and record it.
                let draft = UnknownDraft::new(
                    UnknownCategory::ConditionalLogic,
                    cond.location.clone(),
                    &cond.test,
                    Impact::new(Phase::Evaluate, Severity::Warn),
                )
                .context(UnknownContext {
                    variables_in_scope: self.env.names(),
                    include_stack: vec![cond.location.path.clone()],
                    ..UnknownContext::default()
                });
                let draft = match normalize_conditional(&cond.test) {
                    Some(form) => draft.normalized(form),
                    None => draft,
                };
                self.unknowns.record(self.sink, draft);
            }
        }
    }

    fn take_branch(&mut self, cond: &crate::makefile::ast::Conditional, condition: bool) {
        let branch = if condition {
            &cond.true_branch
        } else {
            &cond.false_branch
        };
        self.env.push_scope();
        self.process_nodes(branch);
        self.env.pop_scope();
    }

    fn handle_rule(
        &mut self,
        targets_raw: &[String],
        prereqs_raw: &[String],
        recipe: &[RecipeLine],
        is_pattern: bool,
        location: &SourceLocation,
    ) {
        if self.is_ignored(&location.path) {
            return;
        }
        let targets = self.expand_words(targets_raw, location);
        let prerequisites = self.expand_words(prereqs_raw, location);
        if targets.is_empty() {
            return;
        }
        if targets.iter().chain(&prerequisites).any(|word| {
            self.config.should_ignore(word)
        }) {
            return;
        }
        self.seen_rule = true;
        let auto = AutoVars::for_rule(&targets, &prerequisites);
        let commands: Vec<EvaluatedCommand> = recipe
            .iter()
            .map(|line| EvaluatedCommand {
                text: self.expand_at(&line.text, &line.location, Some(&auto), &targets),
                location: line.location.clone(),
            })
            .collect();
        self.facts.rules.push(EvaluatedRule {
            targets,
            prerequisites,
            recipe: commands,
            is_pattern,
            location: location.clone(),
        });
    }

    /// Expand a raw word list and re-split on whitespace, since one raw word
    /// can expand to many.
    fn expand_words(&mut self, raw: &[String], location: &SourceLocation) -> Vec<String> {
        let mut out = Vec::new();
        for word in raw {
            let expanded = self.expand_at(word, location, None, &[]);
            out.extend(expanded.split_whitespace().map(str::to_owned));
        }
        out
    }

    fn expand_at(
        &mut self,
        text: &str,
        location: &SourceLocation,
        auto: Option<&AutoVars>,
        scope_targets: &[String],
    ) -> String {
        let mut cx = ExpandCtx {
            workspace: self.workspace,
            config: self.config,
            base_dir: self.source_dir,
            location,
            auto,
            scope_targets,
            sink: &mut *self.sink,
            unknowns: &mut *self.unknowns,
        };
        expand::expand(text, &self.env, &mut cx)
    }

    fn parse_conditional(&self, test: &str) -> CondTest {
        let trimmed = test.trim();
        for (keyword, negated) in [("ifeq", false), ("ifneq", true)] {
            let Some(rest) = trimmed.strip_prefix(keyword) else {
                continue;
            };
            if !rest.starts_with([' ', '\t', '(']) {
                continue;
            }
            let rest = rest.trim();
            if let Some(inner) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
                let parts = split_two(inner);
                if let Some((lhs, rhs)) = parts {
                    return CondTest::Compare { lhs, rhs, negated };
                }
            }
            if let Some((lhs, rhs)) = parse_quoted_pair(rest) {
                return CondTest::Compare { lhs, rhs, negated };
            }
            return CondTest::Unsupported;
        }
        for (keyword, negated) in [("ifdef", false), ("ifndef", true)] {
            let Some(rest) = trimmed.strip_prefix(keyword) else {
                continue;
            };
            let name = rest.trim();
            if !name.is_empty() && !name.contains(char::is_whitespace) {
                return CondTest::Defined {
                    name: name.to_owned(),
                    negated,
                };
            }
            return CondTest::Unsupported;
        }
        CondTest::Unsupported
    }

    fn is_ignored(&self, path: &Utf8Path) -> bool {
        let relative = relative_from(path, self.source_dir);
        self.config.should_ignore(relative.as_str())
    }

    fn is_global_origin(&self, location: &SourceLocation) -> bool {
        if !self.seen_rule {
            return true;
        }
        location
            .path
            .file_name()
            .is_some_and(|name| self.global_files.contains(name))
    }

    fn record_global(&mut self, assign: &crate::makefile::ast::VariableAssign) {
        let snapshot = match self.env.lookup(&assign.name).cloned() {
            Some(binding) if binding.kind == AssignKind::Simple => binding.value,
            Some(binding) => self.expand_at(&binding.value, &assign.location, None, &[]),
            None => return,
        };
        let globals = &mut self.facts.globals;
        globals.vars.insert(assign.name.clone(), snapshot.clone());
        if !globals.origins.contains(&assign.location.path) {
            globals.origins.push(assign.location.path.clone());
        }
        if let Some(bucket) = flag_bucket(&assign.name) {
            for token in snapshot.split_whitespace() {
                if let Some(dir) = token.strip_prefix("-I") {
                    if !dir.is_empty() {
                        push_unique(&mut globals.includes, dir);
                    }
                } else if let Some(def) = token.strip_prefix("-D") {
                    if !def.is_empty() {
                        push_unique(&mut globals.defines, def);
                    }
                } else {
                    push_unique(globals.flags.entry(bucket).or_default(), token);
                }
            }
        } else if looks_like_toggle(&assign.name, &snapshot) {
            globals
                .toggles
                .insert(assign.name.clone(), coerce_toggle(&snapshot));
        }
    }

    fn finish(mut self) -> BuildFacts {
        let mut compiles = Vec::new();
        for rule in &self.facts.rules {
            if rule.is_pattern {
                continue;
            }
            compiles.extend(compile::infer_from_rule(rule, self.sink));
        }
        compiles.retain(|compile| {
            !self.config.should_ignore(compile.source.as_str())
                && !self.config.should_ignore(compile.output.as_str())
        });
        self.facts.compiles = compiles;

        let rules = std::mem::take(&mut self.facts.rules);
        for rule in rules {
            let is_custom = !rule.is_pattern
                && !rule.recipe.is_empty()
                && !compile::has_tool_line(&rule);
            if is_custom {
                self.facts.custom_commands.push(rule);
            } else {
                self.facts.rules.push(rule);
            }
        }
        self.facts
    }
}

fn flag_bucket(name: &str) -> Option<FlagBucket> {
    if name.ends_with("CXXFLAGS") || name.ends_with("CPPFLAGS") {
        Some(FlagBucket::Cpp)
    } else if name.ends_with("ASFLAGS") {
        Some(FlagBucket::Asm)
    } else if name.ends_with("LDFLAGS") || name.ends_with("LIBS") {
        Some(FlagBucket::Link)
    } else if name.ends_with("CFLAGS") {
        Some(FlagBucket::C)
    } else if name.ends_with("FLAGS") {
        Some(FlagBucket::All)
    } else {
        None
    }
}

fn looks_like_toggle(name: &str, value: &str) -> bool {
    const PREFIXES: &[&str] = &["WITH_", "ENABLE_", "USE_", "HAVE_"];
    PREFIXES.iter().any(|prefix| name.starts_with(prefix)) || parse_boolish(value).is_some()
}

fn coerce_toggle(value: &str) -> Toggle {
    parse_boolish(value).map_or_else(|| Toggle::Text(value.to_owned()), Toggle::Bool)
}

fn parse_boolish(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "yes" | "true" => Some(true),
        "0" | "off" | "no" | "false" => Some(false),
        _ => None,
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !list.iter().any(|existing| existing == value) {
        list.push(value.to_owned());
    }
}

fn join_with_space(head: &str, tail: &str) -> String {
    if head.is_empty() {
        tail.to_owned()
    } else {
        format!("{head} {tail}")
    }
}

fn split_two(inner: &str) -> Option<(String, String)> {
    let bytes = inner.as_bytes();
    let mut depth = 0usize;
    for (idx, byte) in bytes.iter().enumerate() {
        match byte {
            b'(' | b'{' => depth += 1,
            b')' | b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                return Some((
                    inner[..idx].trim().to_owned(),
                    inner[idx + 1..].trim().to_owned(),
                ));
            }
            _ => {}
        }
    }
    None
}

/// `ifeq "a" "b"` style operands.
fn parse_quoted_pair(rest: &str) -> Option<(String, String)> {
    let mut parts = Vec::new();
    let mut remaining = rest.trim();
    for _ in 0..2 {
        let quote = remaining.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let end = remaining[1..].find(quote)? + 1;
        parts.push(remaining[1..end].to_owned());
        remaining = remaining[end + 1..].trim();
    }
    remaining.is_empty().then(|| {
        let rhs = parts.pop().expect("two parts");
        let lhs = parts.pop().expect("two parts");
        (lhs, rhs)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::makefile::parser;

    fn evaluate_str(text: &str) -> (BuildFacts, DiagnosticSink, UnknownRegistry) {
        evaluate_files(&[("/proj/Makefile", text)])
    }

    fn evaluate_files(files: &[(&str, &str)]) -> (BuildFacts, DiagnosticSink, UnknownRegistry) {
        let mut sink = DiagnosticSink::new();
        let mut unknowns = UnknownRegistry::new();
        let workspace = crate::workspace::MemWorkspace::new();
        let config = ConversionConfig::default();
        let parsed: Vec<ParsedMakefile> = files
            .iter()
            .map(|(path, text)| ParsedMakefile {
                path: Utf8PathBuf::from(*path),
                nodes: parser::parse(text, Utf8Path::new(path), &mut sink, &mut unknowns),
            })
            .collect();
        let facts = evaluate(
            &parsed,
            Utf8Path::new("/proj"),
            &config,
            &workspace,
            &mut sink,
            &mut unknowns,
        );
        (facts, sink, unknowns)
    }

    #[test]
    fn simple_assignment_expands_immediately() {
        let (facts, _, _) = evaluate_str("CC := gcc\nOPT := -O2\nFULL := $(CC) $(OPT)\napp: ; $(FULL) -o app main.c\n");
        let rule = &facts.rules[0];
        assert_eq!(rule.recipe[0].text, "gcc -O2 -o app main.c");
    }

    #[test]
    fn recursive_assignment_sees_later_bindings() {
        let (facts, _, _) = evaluate_str("FULL = $(CC)\nCC := gcc\napp: ; $(FULL) -o app main.c\n");
        assert_eq!(facts.rules[0].recipe[0].text, "gcc -o app main.c");
    }

    #[test]
    fn append_to_simple_expands_now() {
        let (facts, _, _) = evaluate_str("FLAGS := -O2\nFLAGS += -g\nprint: ; echo $(FLAGS)\n");
        assert_eq!(facts.custom_commands[0].recipe[0].text, "echo -O2 -g");
    }

    #[test]
    fn conditional_assignment_binds_once() {
        let (facts, _, _) = evaluate_str("CC := gcc\nCC ?= clang\nX ?= fallback\np: ; echo $(CC) $(X)\n");
        assert_eq!(facts.custom_commands[0].recipe[0].text, "echo gcc fallback");
    }

    #[test]
    fn ifeq_picks_matching_branch() {
        let text = "CC := gcc\nifeq ($(CC),gcc)\nA := yes\nelse\nA := no\nendif\np: ; echo $(A)\n";
        let (facts, _, _) = evaluate_str(text);
        assert_eq!(facts.custom_commands[0].recipe[0].text, "echo yes");
    }

    #[test]
    fn branch_assignments_persist_after_the_frame() {
        let text = "ifdef MISSING\nB := 1\nelse\nB := 2\nendif\np: ; echo $(B)\n";
        let (facts, _, _) = evaluate_str(text);
        assert_eq!(facts.custom_commands[0].recipe[0].text, "echo 2");
    }

    #[test]
    fn unsupported_conditional_drops_both_branches() {
        let text = "ifeq (complex\nA := 1\nendif\np: ; echo [$(A)]\n";
        let (facts, _, unknowns) = evaluate_str(text);
        assert_eq!(facts.custom_commands[0].recipe[0].text, "echo []");
        assert_eq!(unknowns.len(), 1);
        assert_eq!(
            unknowns.iter().next().expect("uc").category,
            UnknownCategory::ConditionalLogic
        );
    }

    #[test]
    fn globals_capture_stops_at_first_rule() {
        let text = "CFLAGS := -O2\napp: main.c\n\tgcc -o app main.c\nLATE := 1\n";
        let (facts, _, _) = evaluate_str(text);
        assert!(facts.globals.vars.contains_key("CFLAGS"));
        assert!(!facts.globals.vars.contains_key("LATE"));
        assert_eq!(facts.globals.bucket(FlagBucket::C), ["-O2"]);
    }

    #[test]
    fn global_config_file_captures_even_after_rules() {
        let files = [
            ("/proj/Makefile", "early: ; true\ninclude config.mk\n"),
            ("/proj/config.mk", "CFLAGS := -Wall -Iinclude -DNDEBUG\n"),
        ];
        let (facts, _, _) = evaluate_files(&files);
        assert_eq!(facts.globals.bucket(FlagBucket::C), ["-Wall"]);
        assert_eq!(facts.globals.includes, vec!["include"]);
        assert_eq!(facts.globals.defines, vec!["NDEBUG"]);
    }

    #[test]
    fn flag_buckets_split_by_suffix() {
        let text = "CXXFLAGS := -std=c++17\nLDFLAGS := -static\nASFLAGS := -g\nMY_CFLAGS := -Os\n";
        let (facts, _, _) = evaluate_str(text);
        assert_eq!(facts.globals.bucket(FlagBucket::Cpp), ["-std=c++17"]);
        assert_eq!(facts.globals.bucket(FlagBucket::Link), ["-static"]);
        assert_eq!(facts.globals.bucket(FlagBucket::Asm), ["-g"]);
        assert_eq!(facts.globals.bucket(FlagBucket::C), ["-Os"]);
    }

    #[test]
    fn feature_toggles_are_coerced() {
        let text = "ENABLE_LTO := on\nWITH_SSL := 0\nPLATFORM := linux\nUSE_ZLIB := maybe\n";
        let (facts, _, _) = evaluate_str(text);
        assert_eq!(facts.globals.toggles["ENABLE_LTO"], Toggle::Bool(true));
        assert_eq!(facts.globals.toggles["WITH_SSL"], Toggle::Bool(false));
        assert_eq!(
            facts.globals.toggles["USE_ZLIB"],
            Toggle::Text("maybe".to_owned())
        );
        assert!(!facts.globals.toggles.contains_key("PLATFORM"));
    }

    #[test]
    fn compile_inference_runs_over_rules() {
        let text = "main.o: main.c\n\tgcc -c main.c -o main.o\napp: main.o\n\tgcc -o app main.o\n";
        let (facts, sink, _) = evaluate_str(text);
        assert!(!sink.any_error());
        assert_eq!(facts.compiles.len(), 2);
        assert_eq!(facts.rules.len(), 2);
        assert!(facts.custom_commands.is_empty());
    }

    #[test]
    fn non_tool_rules_become_custom_commands() {
        let text = "docs:\n\tdoxygen Doxyfile\n";
        let (facts, _, _) = evaluate_str(text);
        assert!(facts.rules.is_empty());
        assert_eq!(facts.custom_commands.len(), 1);
        assert_eq!(facts.custom_commands[0].targets, vec!["docs"]);
    }

    #[test]
    fn auto_vars_flow_into_recipes() {
        let text = "app: main.o util.o\n\tgcc -o $@ $^\n";
        let (facts, _, _) = evaluate_str(text);
        assert_eq!(facts.rules[0].recipe[0].text, "gcc -o app main.o util.o");
    }

    #[test]
    fn pattern_rules_stay_symbolic() {
        let text = "%.o: %.c\n\tgcc -c $< -o $@\n";
        let (facts, _, _) = evaluate_str(text);
        assert_eq!(facts.rules.len(), 1);
        assert!(facts.rules[0].is_pattern);
        assert_eq!(facts.rules[0].recipe[0].text, "gcc -c %.c -o %.o");
        assert!(facts.compiles.is_empty(), "patterns instantiate later");
    }

    #[test]
    fn stray_shell_line_is_flagged_for_manual_review() {
        let (facts, _, unknowns) = evaluate_str("\techo orphan\n");
        assert_eq!(facts.custom_commands.len(), 1);
        assert_eq!(unknowns.len(), 1);
        let uc = unknowns.iter().next().expect("uc");
        assert_eq!(uc.category, UnknownCategory::ShellCommand);
    }

    #[test]
    fn quoted_ifeq_form_is_supported() {
        let text = "CC := gcc\nifeq \"$(CC)\" \"gcc\"\nR := quoted\nendif\np: ; echo $(R)\n";
        let (facts, _, _) = evaluate_str(text);
        assert_eq!(facts.custom_commands[0].recipe[0].text, "echo quoted");
    }
}
