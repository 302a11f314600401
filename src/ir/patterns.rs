//! Deferred pattern-rule instantiation.
//!
//! Pattern rules stay symbolic through evaluation; here they are matched
//! against the concrete prerequisites of ordinary rules. Each concrete name
//! that matches a pattern's target form produces at most one instantiated
//! rule, with the stem substituted into the prerequisite patterns and the
//! recipe. When several patterns could produce the same name, the one with
//! the longest literal part wins, ties broken by declaration order.

use crate::eval::facts::{EvaluatedCommand, EvaluatedRule};
use crate::eval::pattern::{stem_match, stem_substitute};
use std::collections::BTreeSet;

/// Instantiate pattern rules for every concrete prerequisite that matches
/// one and is not already produced by an ordinary rule.
#[must_use]
pub fn instantiate(rules: &[EvaluatedRule]) -> Vec<EvaluatedRule> {
    let patterns: Vec<&EvaluatedRule> = rules.iter().filter(|r| r.is_pattern).collect();
    if patterns.is_empty() {
        return Vec::new();
    }

    let produced: BTreeSet<&str> = rules
        .iter()
        .filter(|r| !r.is_pattern)
        .flat_map(|r| r.targets.iter().map(String::as_str))
        .collect();

    let mut needed: Vec<&str> = Vec::new();
    for rule in rules.iter().filter(|r| !r.is_pattern) {
        for prereq in &rule.prerequisites {
            if !produced.contains(prereq.as_str()) && !needed.contains(&prereq.as_str()) {
                needed.push(prereq);
            }
        }
    }

    let mut instantiated = Vec::new();
    for name in needed {
        let Some((pattern, stem)) = best_match(&patterns, name) else {
            continue;
        };
        let prerequisites: Vec<String> = pattern
            .prerequisites
            .iter()
            .map(|p| stem_substitute(p, stem))
            .collect();
        let recipe: Vec<EvaluatedCommand> = pattern
            .recipe
            .iter()
            .map(|cmd| EvaluatedCommand {
                text: cmd.text.replace('%', stem),
                location: cmd.location.clone(),
            })
            .collect();
        instantiated.push(EvaluatedRule {
            targets: vec![name.to_owned()],
            prerequisites,
            recipe,
            is_pattern: false,
            location: pattern.location.clone(),
        });
    }
    instantiated
}

/// The matching pattern with the most specific (longest literal) target
/// form, together with the extracted stem.
fn best_match<'a>(
    patterns: &[&'a EvaluatedRule],
    name: &'a str,
) -> Option<(&'a EvaluatedRule, &'a str)> {
    let mut best: Option<(&EvaluatedRule, &str, usize)> = None;
    for pattern in patterns {
        let Some(target_pattern) = pattern.targets.first() else {
            continue;
        };
        let Some(stem) = stem_match(name, target_pattern) else {
            continue;
        };
        let specificity = target_pattern.len() - target_pattern.matches('%').count();
        let better = best.map_or(true, |(_, _, s)| specificity > s);
        if better {
            best = Some((pattern, stem, specificity));
        }
    }
    best.map(|(pattern, stem, _)| (pattern, stem))
}
