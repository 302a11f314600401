//! Cycle detection over the target dependency graph.
//!
//! Independent from the include-graph detection in discovery: this one runs
//! over physical target names after dependency attachment. A detected cycle
//! is reported in a canonical form (reading from its lexicographically
//! smallest node, with that node repeated at the end) so the diagnostic
//! text is stable no matter which node the walk entered from.

use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum VisitState {
    Visiting,
    Visited,
}

/// Find one dependency cycle, in canonical closed form.
#[must_use]
pub(crate) fn find_cycle(edges: &BTreeMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut detector = CycleDetector {
        edges,
        stack: Vec::new(),
        states: HashMap::new(),
    };
    for node in edges.keys() {
        if detector.states.get(node) == Some(&VisitState::Visited) {
            continue;
        }
        if let Some(found) = detector.visit(node) {
            return Some(close_cycle(&found));
        }
    }
    None
}

struct CycleDetector<'a> {
    edges: &'a BTreeMap<String, Vec<String>>,
    stack: Vec<String>,
    states: HashMap<String, VisitState>,
}

impl CycleDetector<'_> {
    /// Depth-first walk; on a back edge, returns the open cycle (each
    /// member listed once, in walk order).
    fn visit(&mut self, node: &str) -> Option<Vec<String>> {
        match self.states.get(node) {
            Some(VisitState::Visited) => return None,
            Some(VisitState::Visiting) => {
                let start = self.stack.iter().position(|n| n == node).unwrap_or_default();
                return Some(self.stack[start..].to_vec());
            }
            None => {
                self.states.insert(node.to_owned(), VisitState::Visiting);
            }
        }
        self.stack.push(node.to_owned());
        let deps = self.edges.get(node).cloned().unwrap_or_default();
        for dep in &deps {
            if !self.edges.contains_key(dep) {
                continue;
            }
            if let Some(cycle) = self.visit(dep) {
                return Some(cycle);
            }
        }
        self.stack.pop();
        self.states.insert(node.to_owned(), VisitState::Visited);
        None
    }
}

/// Rotate an open cycle so it starts at its smallest member, then append
/// that member again to close the loop.
fn close_cycle(open: &[String]) -> Vec<String> {
    let mut start = 0;
    for (idx, node) in open.iter().enumerate() {
        if node < &open[start] {
            start = idx;
        }
    }
    let mut closed = Vec::with_capacity(open.len() + 1);
    closed.extend(open[start..].iter().cloned());
    closed.extend(open[..start].iter().cloned());
    if let Some(first) = closed.first().cloned() {
        closed.push(first);
    }
    closed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(node, deps)| {
                (
                    (*node).to_owned(),
                    deps.iter().map(|d| (*d).to_owned()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let edges = graph(&[("app", &["foo"]), ("foo", &[])]);
        assert!(find_cycle(&edges).is_none());
    }

    #[test]
    fn two_node_cycle_is_canonicalized() {
        let edges = graph(&[("b", &["a"]), ("a", &["b"])]);
        let cycle = find_cycle(&edges).expect("cycle");
        assert_eq!(cycle, vec!["a", "b", "a"]);
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let edges = graph(&[("x", &["x"])]);
        let cycle = find_cycle(&edges).expect("cycle");
        assert_eq!(cycle, vec!["x", "x"]);
    }

    #[test]
    fn dangling_edges_are_ignored() {
        let edges = graph(&[("app", &["missing"])]);
        assert!(find_cycle(&edges).is_none());
    }

    #[test]
    fn rotation_starts_at_smallest_member() {
        let open = vec!["c".to_owned(), "a".to_owned(), "b".to_owned()];
        assert_eq!(close_cycle(&open), vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn entry_point_does_not_change_the_report() {
        // Walking in from either node must yield the same canonical path.
        let from_b = graph(&[("b", &["c"]), ("c", &["b"]), ("a", &["b"])]);
        let cycle = find_cycle(&from_b).expect("cycle");
        assert_eq!(cycle, vec!["b", "c", "b"]);
    }
}
