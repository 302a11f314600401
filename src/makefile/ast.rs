//! Syntax tree for parsed Makefiles.
//!
//! Nodes are immutable once built and carry the location of the logical line
//! they came from. Nothing here is expanded: variable references, function
//! calls, and include path expressions all stay verbatim until evaluation.

use crate::location::SourceLocation;

/// The four GNU Make assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignKind {
    /// `:=`, right-hand side expanded at assignment time.
    Simple,
    /// `=`, right-hand side stored verbatim and expanded on use.
    Recursive,
    /// `+=`, appended to the existing value.
    Append,
    /// `?=`, bound only if the name is currently unbound.
    Conditional,
}

#[derive(Debug, Clone)]
pub struct VariableAssign {
    pub name: String,
    pub value: String,
    pub kind: AssignKind,
    pub location: SourceLocation,
}

/// One raw recipe line, still carrying its own location so compile inference
/// can point at the exact command.
#[derive(Debug, Clone)]
pub struct RecipeLine {
    pub text: String,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub targets: Vec<String>,
    pub prerequisites: Vec<String>,
    pub recipe: Vec<RecipeLine>,
    pub location: SourceLocation,
}

/// A rule whose target contains a `%` stem.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub target_pattern: String,
    pub prereq_patterns: Vec<String>,
    pub recipe: Vec<RecipeLine>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct IncludeStmt {
    /// Path expressions as written; may contain variable references.
    pub paths: Vec<String>,
    /// True for `-include` and `sinclude`.
    pub optional: bool,
    pub location: SourceLocation,
}

/// A conditional frame. The test text is kept raw; the evaluator decides
/// whether it can interpret it.
#[derive(Debug, Clone)]
pub struct Conditional {
    pub test: String,
    pub true_branch: Vec<Node>,
    pub false_branch: Vec<Node>,
    pub location: SourceLocation,
}

/// A tab-indented shell line outside any rule body.
#[derive(Debug, Clone)]
pub struct RawCommand {
    pub command: String,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub enum Node {
    Assign(VariableAssign),
    Rule(Rule),
    Pattern(PatternRule),
    Include(IncludeStmt),
    Conditional(Conditional),
    Raw(RawCommand),
}

impl Node {
    #[must_use]
    pub fn location(&self) -> &SourceLocation {
        match self {
            Self::Assign(n) => &n.location,
            Self::Rule(n) => &n.location,
            Self::Pattern(n) => &n.location,
            Self::Include(n) => &n.location,
            Self::Conditional(n) => &n.location,
            Self::Raw(n) => &n.location,
        }
    }
}
