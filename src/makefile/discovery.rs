//! Makefile graph discovery.
//!
//! Resolves the entry file, walks `include`/`-include`/`sinclude` directives
//! and `$(MAKE) -C <dir>` recursions with a lightweight line scan (the full
//! parser is deliberately not involved), normalizes every node to an
//! absolute forward-slash path, detects cycles, and produces contents in
//! topological order so parents are always evaluated before children.

use crate::diagnostics::{DiagCode, Diagnostic, DiagnosticSink, Stage};
use crate::location::SourceLocation;
use crate::workspace::{normalize, to_posix, Workspace};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::{BTreeMap, BTreeSet, HashMap};

const ENTRY_CANDIDATES: &[&str] = &["Makefile", "makefile", "GNUmakefile"];

/// The resolved include graph. Nodes and edges use absolute posix paths.
#[derive(Debug, Default)]
pub struct IncludeGraph {
    pub roots: Vec<Utf8PathBuf>,
    pub nodes: BTreeSet<Utf8PathBuf>,
    pub edges: BTreeMap<Utf8PathBuf, BTreeSet<Utf8PathBuf>>,
    pub cycles: Vec<Vec<Utf8PathBuf>>,
}

/// One discovered file with its decoded contents.
#[derive(Debug)]
pub struct MakefileSource {
    pub path: Utf8PathBuf,
    pub text: String,
    pub included_from: Option<Utf8PathBuf>,
}

/// Resolve the entry Makefile: the explicit name when given, otherwise the
/// first of the conventional candidates present in `source_dir`.
pub fn resolve_entry(
    source_dir: &Utf8Path,
    entry: Option<&str>,
    workspace: &dyn Workspace,
    sink: &mut DiagnosticSink,
) -> Option<Utf8PathBuf> {
    let candidates: Vec<String> = match entry {
        Some(name) => vec![name.to_owned()],
        None => ENTRY_CANDIDATES.iter().map(|s| (*s).to_owned()).collect(),
    };
    for name in &candidates {
        let candidate = normalize(&source_dir.join(name));
        if workspace.is_file(&candidate) {
            return Some(candidate);
        }
    }
    sink.push(
        Diagnostic::error(
            DiagCode::DiscoveryEntryMissing,
            format!("no entry Makefile found in {source_dir}"),
        )
        .from_stage(Stage::Discovery),
    );
    None
}

/// Walk the include graph from `source_dir`, returning the graph plus file
/// contents in topological (parents-first) order. On any cycle the content
/// list is empty and a `DISCOVERY_CYCLE` error carries the full path.
pub fn discover(
    source_dir: &Utf8Path,
    entry: Option<&str>,
    workspace: &dyn Workspace,
    sink: &mut DiagnosticSink,
) -> (IncludeGraph, Vec<MakefileSource>) {
    let mut graph = IncludeGraph::default();
    let Some(entry_path) = resolve_entry(source_dir, entry, workspace, sink) else {
        return (graph, Vec::new());
    };
    graph.roots.push(entry_path.clone());

    let mut walker = Walker {
        workspace,
        sink,
        graph: &mut graph,
        contents: HashMap::new(),
        states: HashMap::new(),
        stack: Vec::new(),
    };
    walker.visit(&entry_path);
    let contents = walker.contents;

    if !graph.cycles.is_empty() {
        return (graph, Vec::new());
    }
    let ordered = topological_contents(&graph, contents);
    (graph, ordered)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    /// On the current DFS stack.
    Gray,
    /// Fully explored.
    Black,
}

struct Walker<'a> {
    workspace: &'a dyn Workspace,
    sink: &'a mut DiagnosticSink,
    graph: &'a mut IncludeGraph,
    contents: HashMap<Utf8PathBuf, String>,
    states: HashMap<Utf8PathBuf, VisitState>,
    stack: Vec<Utf8PathBuf>,
}

impl Walker<'_> {
    fn visit(&mut self, path: &Utf8Path) {
        match self.states.get(path) {
            Some(VisitState::Black) => return,
            Some(VisitState::Gray) => {
                self.record_cycle(path);
                return;
            }
            None => {}
        }
        self.states.insert(path.to_owned(), VisitState::Gray);
        self.stack.push(path.to_owned());
        self.graph.nodes.insert(path.to_owned());

        let text = match self.workspace.read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                self.sink.push(
                    Diagnostic::error(DiagCode::FsRead, format!("failed to read {path}: {err}"))
                        .at(SourceLocation::line_of(path, 1))
                        .from_stage(Stage::Discovery),
                );
                String::new()
            }
        };

        let references = scan_references(&text, path);
        self.contents.insert(path.to_owned(), text);

        for reference in references {
            match reference {
                Reference::Include {
                    target,
                    optional,
                    location,
                } => self.follow_include(path, &target, optional, location),
                Reference::Subdir { dir, location } => self.follow_subdir(path, &dir, location),
            }
        }

        self.stack.pop();
        self.states.insert(path.to_owned(), VisitState::Black);
    }

    fn follow_include(
        &mut self,
        parent: &Utf8Path,
        target: &Utf8Path,
        optional: bool,
        location: SourceLocation,
    ) {
        let resolved = resolve_relative(parent, target);
        self.record_edge(parent, &resolved);
        if self.workspace.is_file(&resolved) || self.states.contains_key(&resolved) {
            self.visit(&resolved);
        } else if optional {
            self.sink.push(
                Diagnostic::warn(
                    DiagCode::DiscoveryIncludeOptionalMissing,
                    format!("optional include missing: {resolved}"),
                )
                .at(location)
                .from_stage(Stage::Discovery),
            );
        } else {
            self.sink.push(
                Diagnostic::error(
                    DiagCode::DiscoveryIncludeMissing,
                    format!("missing include {resolved}"),
                )
                .at(location)
                .from_stage(Stage::Discovery),
            );
        }
    }

    fn follow_subdir(&mut self, parent: &Utf8Path, dir: &Utf8Path, location: SourceLocation) {
        let child = resolve_relative(parent, &dir.join("Makefile"));
        self.record_edge(parent, &child);
        if self.workspace.is_file(&child) || self.states.contains_key(&child) {
            self.visit(&child);
        } else {
            self.sink.push(
                Diagnostic::warn(
                    DiagCode::DiscoverySubdirMissing,
                    format!("subdirectory Makefile missing: {child}"),
                )
                .at(location)
                .from_stage(Stage::Discovery),
            );
        }
    }

    fn record_edge(&mut self, parent: &Utf8Path, child: &Utf8Path) {
        self.graph
            .edges
            .entry(parent.to_owned())
            .or_default()
            .insert(child.to_owned());
    }

    fn record_cycle(&mut self, node: &Utf8Path) {
        let start = self
            .stack
            .iter()
            .position(|p| p == node)
            .unwrap_or_default();
        let mut cycle: Vec<Utf8PathBuf> = self.stack[start..].to_vec();
        cycle.push(node.to_owned());
        let rendered = cycle
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(" -> ");
        self.sink.push(
            Diagnostic::error(
                DiagCode::DiscoveryCycle,
                format!("include cycle detected: {rendered}"),
            )
            .at(SourceLocation::line_of(node, 1))
            .from_stage(Stage::Discovery),
        );
        self.graph.cycles.push(cycle);
    }
}

enum Reference {
    Include {
        target: Utf8PathBuf,
        optional: bool,
        location: SourceLocation,
    },
    Subdir {
        dir: Utf8PathBuf,
        location: SourceLocation,
    },
}

/// Lightweight scan for include directives and `$(MAKE) -C` recursions.
/// Path expressions still containing variable references are skipped here;
/// the parser re-captures them as `IncludeStmt` nodes for provenance.
fn scan_references(text: &str, path: &Utf8Path) -> Vec<Reference> {
    let mut references = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line_no = u32::try_from(idx + 1).unwrap_or(u32::MAX);
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let location = SourceLocation::line_of(path, line_no);
        let mut words = line.split_whitespace();
        let keyword = words.next().unwrap_or_default();
        if matches!(keyword, "include" | "-include" | "sinclude") {
            let optional = keyword != "include";
            for word in words {
                if word.contains("$(") || word.contains("${") {
                    continue;
                }
                references.push(Reference::Include {
                    target: to_posix(Utf8Path::new(word)),
                    optional,
                    location: location.clone(),
                });
            }
            continue;
        }
        if line.contains("$(MAKE)") || line.contains("${MAKE}") {
            if let Some(dir) = extract_subdir(line) {
                references.push(Reference::Subdir {
                    dir: to_posix(Utf8Path::new(&dir)),
                    location,
                });
            }
        }
    }
    references
}

/// Pull the directory operand out of a `$(MAKE) -C <dir>` invocation,
/// unwrapping a simple variable decoration if present.
fn extract_subdir(line: &str) -> Option<String> {
    let after = line.split(" -C").nth(1)?;
    let token = after.split_whitespace().next()?;
    if token.contains("$(") || token.contains("${") {
        return None;
    }
    Some(token.to_owned())
}

fn resolve_relative(parent: &Utf8Path, target: &Utf8Path) -> Utf8PathBuf {
    if target.is_absolute() {
        return normalize(target);
    }
    let base = parent.parent().unwrap_or(Utf8Path::new("/"));
    normalize(&base.join(target))
}

/// Depth-first preorder over the (acyclic) graph from the roots, following
/// sorted edges, which yields a deterministic parents-first order.
fn topological_contents(
    graph: &IncludeGraph,
    mut contents: HashMap<Utf8PathBuf, String>,
) -> Vec<MakefileSource> {
    let mut ordered = Vec::new();
    let mut visited = BTreeSet::new();
    let mut stack: Vec<(Utf8PathBuf, Option<Utf8PathBuf>)> = graph
        .roots
        .iter()
        .rev()
        .map(|root| (root.clone(), None))
        .collect();
    while let Some((node, parent)) = stack.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }
        if let Some(text) = contents.remove(&node) {
            ordered.push(MakefileSource {
                path: node.clone(),
                text,
                included_from: parent,
            });
        }
        if let Some(children) = graph.edges.get(&node) {
            for child in children.iter().rev() {
                stack.push((child.clone(), Some(node.clone())));
            }
        }
    }
    ordered
}
