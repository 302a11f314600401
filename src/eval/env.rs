//! The Make variable environment.
//!
//! An ordered map of bindings with overlay frames. Entering a conditional
//! branch pushes a frame; leaving it commits the frame into its parent, so
//! assignments made in a taken branch persist while the bookkeeping stays
//! scoped.

use crate::makefile::ast::AssignKind;
use indexmap::IndexMap;

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: String,
    pub kind: AssignKind,
}

#[derive(Debug, Clone)]
pub struct VariableEnv {
    frames: Vec<IndexMap<String, Binding>>,
}

impl Default for VariableEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableEnv {
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: vec![IndexMap::new()],
        }
    }

    /// Innermost binding for `name`, if any.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    #[must_use]
    pub fn is_bound(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Bind `name` in the innermost frame, shadowing outer bindings.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>, kind: AssignKind) {
        let frame = self.frames.last_mut().expect("at least one frame");
        frame.insert(
            name.into(),
            Binding {
                value: value.into(),
                kind,
            },
        );
    }

    /// Open an overlay frame for a conditional branch.
    pub fn push_scope(&mut self) {
        self.frames.push(IndexMap::new());
    }

    /// Close the innermost overlay, committing its bindings into the parent.
    pub fn pop_scope(&mut self) {
        if self.frames.len() <= 1 {
            return;
        }
        let overlay = self.frames.pop().expect("overlay present");
        let parent = self.frames.last_mut().expect("parent present");
        for (name, binding) in overlay {
            parent.insert(name, binding);
        }
    }

    /// Every visible variable name, outermost first, for diagnostics context.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        for frame in &self.frames {
            for name in frame.keys() {
                if seen.insert(name.clone()) {
                    out.push(name.clone());
                }
            }
        }
        out
    }
}
