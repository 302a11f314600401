//! Line-oriented Makefile parser.
//!
//! Backslash continuations are joined first, comments are stripped (except
//! `\#` and anything inside `$(...)`), then each logical line is classified
//! in a fixed order: conditional directives, includes, recipe lines,
//! rules, assignments. Anything left over is recorded as an unknown
//! construct and parsing continues.
//!
//! The parser never expands variables, never resolves include paths, and
//! never runs a shell; it is pure over its input buffer apart from the two
//! shared sinks.

use crate::diagnostics::{DiagCode, Diagnostic, DiagnosticSink, Severity, Stage};
use crate::location::SourceLocation;
use crate::makefile::ast::{
    AssignKind, Conditional, IncludeStmt, Node, PatternRule, RawCommand, RecipeLine, Rule,
    VariableAssign,
};
use crate::unknown::{
    Impact, Phase, UnknownCategory, UnknownContext, UnknownDraft, UnknownRegistry,
};
use camino::Utf8Path;

/// Parse one Makefile into a list of syntax nodes.
pub fn parse(
    text: &str,
    path: &Utf8Path,
    sink: &mut DiagnosticSink,
    unknowns: &mut UnknownRegistry,
) -> Vec<Node> {
    Parser::new(path, sink, unknowns).run(text)
}

struct CondFrame {
    test: String,
    location: SourceLocation,
    true_branch: Vec<Node>,
    false_branch: Vec<Node>,
    in_else: bool,
    /// Set for the synthetic frame opened by `else ifeq …`; closing it also
    /// closes its parent.
    chained: bool,
}

struct RuleBuilder {
    targets: Vec<String>,
    prerequisites: Vec<String>,
    recipe: Vec<RecipeLine>,
    location: SourceLocation,
}

struct LogicalLine {
    text: String,
    line: u32,
}

struct Parser<'a> {
    path: &'a Utf8Path,
    sink: &'a mut DiagnosticSink,
    unknowns: &'a mut UnknownRegistry,
    nodes: Vec<Node>,
    frames: Vec<CondFrame>,
    rule: Option<RuleBuilder>,
}

impl<'a> Parser<'a> {
    fn new(
        path: &'a Utf8Path,
        sink: &'a mut DiagnosticSink,
        unknowns: &'a mut UnknownRegistry,
    ) -> Self {
        Self {
            path,
            sink,
            unknowns,
            nodes: Vec::new(),
            frames: Vec::new(),
            rule: None,
        }
    }

    fn run(mut self, text: &str) -> Vec<Node> {
        for logical in join_continuations(text) {
            self.consume(&logical);
        }
        self.flush_rule();
        while let Some(frame) = self.frames.pop() {
            self.sink.push(
                Diagnostic::error(
                    DiagCode::ParserConditional,
                    format!("missing endif for conditional `{}`", frame.test),
                )
                .at(frame.location.clone())
                .from_stage(Stage::Parse),
            );
            // Keep whatever the open frame accumulated; partial work is
            // still useful to later stages.
            self.push_node(Node::Conditional(Conditional {
                test: frame.test,
                true_branch: frame.true_branch,
                false_branch: frame.false_branch,
                location: frame.location,
            }));
        }
        self.nodes
    }

    fn consume(&mut self, logical: &LogicalLine) {
        let loc = SourceLocation::line_of(self.path, logical.line);
        if logical.text.starts_with('\t') {
            let command = logical.text[1..].to_owned();
            if let Some(rule) = &mut self.rule {
                rule.recipe.push(RecipeLine {
                    text: command,
                    location: loc,
                });
            } else if !command.trim().is_empty() {
                self.push_node(Node::Raw(RawCommand {
                    command: command.trim().to_owned(),
                    location: loc,
                }));
            }
            return;
        }

        let stripped = strip_comment(&logical.text);
        let stripped = stripped.trim();
        if stripped.is_empty() {
            // Blank and comment-only lines do not terminate a rule body.
            return;
        }
        self.flush_rule();

        let keyword = stripped.split_whitespace().next().unwrap_or_default();
        match keyword {
            "ifeq" | "ifneq" | "ifdef" | "ifndef" => {
                self.frames.push(CondFrame {
                    test: stripped.to_owned(),
                    location: loc,
                    true_branch: Vec::new(),
                    false_branch: Vec::new(),
                    in_else: false,
                    chained: false,
                });
            }
            "else" => self.consume_else(stripped, loc),
            "endif" => self.consume_endif(loc),
            "include" | "-include" | "sinclude" => {
                let optional = keyword != "include";
                let paths: Vec<String> = stripped
                    .split_whitespace()
                    .skip(1)
                    .map(str::to_owned)
                    .collect();
                self.push_node(Node::Include(IncludeStmt {
                    paths,
                    optional,
                    location: loc,
                }));
            }
            _ => self.consume_statement(stripped, loc),
        }
    }

    fn consume_else(&mut self, stripped: &str, loc: SourceLocation) {
        let Some(frame) = self.frames.last_mut() else {
            self.sink.push(
                Diagnostic::error(DiagCode::ParserConditional, "unmatched else")
                    .at(loc)
                    .from_stage(Stage::Parse),
            );
            return;
        };
        if frame.in_else {
            self.sink.push(
                Diagnostic::error(DiagCode::ParserConditional, "duplicate else")
                    .at(loc)
                    .from_stage(Stage::Parse),
            );
            return;
        }
        frame.in_else = true;
        let rest = stripped["else".len()..].trim();
        if !rest.is_empty() {
            // `else ifeq (…)` opens a chained frame whose endif also closes
            // the enclosing one.
            self.frames.push(CondFrame {
                test: rest.to_owned(),
                location: loc,
                true_branch: Vec::new(),
                false_branch: Vec::new(),
                in_else: false,
                chained: true,
            });
        }
    }

    fn consume_endif(&mut self, loc: SourceLocation) {
        loop {
            let Some(frame) = self.frames.pop() else {
                self.sink.push(
                    Diagnostic::error(DiagCode::ParserConditional, "unmatched endif")
                        .at(loc)
                        .from_stage(Stage::Parse),
                );
                return;
            };
            let chained = frame.chained;
            self.push_node(Node::Conditional(Conditional {
                test: frame.test,
                true_branch: frame.true_branch,
                false_branch: frame.false_branch,
                location: frame.location,
            }));
            if !chained {
                return;
            }
        }
    }

    fn consume_statement(&mut self, stripped: &str, loc: SourceLocation) {
        match classify_statement(stripped) {
            Some(Statement::Rule { targets, prerequisites, inline_recipe }) => {
                let mut builder = RuleBuilder {
                    targets,
                    prerequisites,
                    recipe: Vec::new(),
                    location: loc.clone(),
                };
                if let Some(inline) = inline_recipe {
                    builder.recipe.push(RecipeLine {
                        text: inline,
                        location: loc,
                    });
                }
                self.rule = Some(builder);
            }
            Some(Statement::Assign { name, value, kind }) => {
                self.push_node(Node::Assign(VariableAssign {
                    name,
                    value,
                    kind,
                    location: loc,
                }));
            }
            None => {
                let draft = UnknownDraft::new(
                    UnknownCategory::MakeSyntax,
                    loc,
                    stripped,
                    Impact::new(Phase::Parse, Severity::Warn),
                )
                .context(UnknownContext {
                    include_stack: vec![self.path.to_owned()],
                    ..UnknownContext::default()
                });
                self.unknowns.record(self.sink, draft);
            }
        }
    }

    fn flush_rule(&mut self) {
        let Some(builder) = self.rule.take() else {
            return;
        };
        let node = if builder.targets.iter().any(|t| t.contains('%')) {
            let target_pattern = builder
                .targets
                .iter()
                .find(|t| t.contains('%'))
                .cloned()
                .unwrap_or_default();
            Node::Pattern(PatternRule {
                target_pattern,
                prereq_patterns: builder.prerequisites,
                recipe: builder.recipe,
                location: builder.location,
            })
        } else {
            Node::Rule(Rule {
                targets: builder.targets,
                prerequisites: builder.prerequisites,
                recipe: builder.recipe,
                location: builder.location,
            })
        };
        self.push_node(node);
    }

    fn push_node(&mut self, node: Node) {
        if let Some(frame) = self.frames.last_mut() {
            if frame.in_else {
                frame.false_branch.push(node);
            } else {
                frame.true_branch.push(node);
            }
        } else {
            self.nodes.push(node);
        }
    }
}

enum Statement {
    Rule {
        targets: Vec<String>,
        prerequisites: Vec<String>,
        inline_recipe: Option<String>,
    },
    Assign {
        name: String,
        value: String,
        kind: AssignKind,
    },
}

/// Decide whether a logical line is a rule or an assignment by finding the
/// first top-level `:` (not part of `:=`) or assignment operator.
fn classify_statement(line: &str) -> Option<Statement> {
    let bytes = line.as_bytes();
    let mut depth = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'$' if matches!(bytes.get(i + 1), Some(b'(' | b'{')) => {
                depth += 1;
                i += 2;
                continue;
            }
            b')' | b'}' if depth > 0 => depth -= 1,
            b':' if depth == 0 => {
                if bytes.get(i + 1) == Some(&b'=') {
                    return build_assign(line, i, i + 2, AssignKind::Simple);
                }
                // `::` rules behave like plain rules for translation purposes.
                let sep_end = if bytes.get(i + 1) == Some(&b':') { i + 2 } else { i + 1 };
                return build_rule(line, i, sep_end);
            }
            b'=' if depth == 0 => {
                let (start, kind) = match i.checked_sub(1).map(|p| bytes[p]) {
                    Some(b'?') => (i - 1, AssignKind::Conditional),
                    Some(b'+') => (i - 1, AssignKind::Append),
                    _ => (i, AssignKind::Recursive),
                };
                return build_assign(line, start, i + 1, kind);
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn build_assign(line: &str, op_start: usize, op_end: usize, kind: AssignKind) -> Option<Statement> {
    let mut name = line[..op_start].trim();
    for modifier in ["override", "export"] {
        if let Some(rest) = name.strip_prefix(modifier) {
            if rest.starts_with(char::is_whitespace) {
                name = rest.trim();
            }
        }
    }
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some(Statement::Assign {
        name: name.to_owned(),
        value: line[op_end..].trim().to_owned(),
        kind,
    })
}

fn build_rule(line: &str, colon: usize, sep_end: usize) -> Option<Statement> {
    let targets: Vec<String> = line[..colon]
        .split_whitespace()
        .map(str::to_owned)
        .collect();
    if targets.is_empty() {
        return None;
    }
    let rest = &line[sep_end..];
    let (prereq_part, inline_recipe) = match split_top_level(rest, b';') {
        Some(idx) => (&rest[..idx], Some(rest[idx + 1..].trim().to_owned())),
        None => (rest, None),
    };
    Some(Statement::Rule {
        targets,
        prerequisites: prereq_part.split_whitespace().map(str::to_owned).collect(),
        inline_recipe: inline_recipe.filter(|r| !r.is_empty()),
    })
}

fn split_top_level(text: &str, needle: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'$' if matches!(bytes.get(i + 1), Some(b'(' | b'{')) => {
                depth += 1;
                i += 2;
                continue;
            }
            b')' | b'}' if depth > 0 => depth -= 1,
            b if b == needle && depth == 0 => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Join backslash continuations into logical lines, remembering the first
/// physical line number of each.
fn join_continuations(text: &str) -> Vec<LogicalLine> {
    let mut out = Vec::new();
    let mut lines = text.lines().enumerate().peekable();
    while let Some((idx, raw)) = lines.next() {
        let start_line = u32::try_from(idx + 1).unwrap_or(u32::MAX);
        let mut joined = raw.to_owned();
        while ends_with_continuation(&joined) {
            joined.pop();
            let Some((_, next)) = lines.next() else { break };
            joined = format!("{} {}", joined.trim_end(), next.trim_start());
        }
        out.push(LogicalLine {
            text: joined,
            line: start_line,
        });
    }
    out
}

fn ends_with_continuation(line: &str) -> bool {
    let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
    trailing % 2 == 1
}

/// Drop a trailing comment. `\#` stays as a literal `#`, and text inside
/// `$(...)` is preserved verbatim.
fn strip_comment(line: &str) -> String {
    let bytes = line.as_bytes();
    let mut out = String::with_capacity(line.len());
    let mut depth = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if bytes.get(i + 1) == Some(&b'#') => {
                out.push('#');
                i += 2;
                continue;
            }
            b'$' if matches!(bytes.get(i + 1), Some(b'(' | b'{')) => {
                depth += 1;
                out.push_str(&line[i..=i + 1]);
                i += 2;
                continue;
            }
            b')' | b'}' if depth > 0 => depth -= 1,
            b'#' if depth == 0 => break,
            _ => {}
        }
        out.push(line[i..].chars().next().expect("in bounds"));
        i += line[i..].chars().next().map_or(1, char::len_utf8);
    }
    out
}
