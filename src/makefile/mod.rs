//! Makefile front end: location-preserving syntax tree, line-oriented
//! parser, and include-graph discovery.

pub mod ast;
pub mod discovery;
pub mod parser;

pub use ast::{
    AssignKind, Conditional, IncludeStmt, Node, PatternRule, RawCommand, RecipeLine, Rule,
    VariableAssign,
};
pub use discovery::{discover, IncludeGraph, MakefileSource};
pub use parser::parse;
