//! `%`-stem pattern matching shared by `patsubst`, `filter`, substitution
//! references, and pattern-rule instantiation.

/// Match `word` against a pattern containing at most one `%`, returning the
/// stem. A pattern without `%` matches only itself (with an empty stem).
#[must_use]
pub fn stem_match<'a>(word: &'a str, pattern: &str) -> Option<&'a str> {
    match pattern.split_once('%') {
        Some((prefix, suffix)) => {
            let rest = word.strip_prefix(prefix)?;
            let stem = rest.strip_suffix(suffix)?;
            Some(stem)
        }
        None => (word == pattern).then_some(""),
    }
}

/// Substitute `stem` for the `%` in `pattern` (verbatim when there is none).
#[must_use]
pub fn stem_substitute(pattern: &str, stem: &str) -> String {
    match pattern.split_once('%') {
        Some((prefix, suffix)) => format!("{prefix}{stem}{suffix}"),
        None => pattern.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_match_extracts_middle() {
        assert_eq!(stem_match("main.o", "%.o"), Some("main"));
        assert_eq!(stem_match("src/main.o", "src/%.o"), Some("main"));
        assert_eq!(stem_match("main.c", "%.o"), None);
    }

    #[test]
    fn literal_pattern_matches_exactly() {
        assert_eq!(stem_match("main.o", "main.o"), Some(""));
        assert_eq!(stem_match("other.o", "main.o"), None);
    }

    #[test]
    fn substitute_replaces_stem() {
        assert_eq!(stem_substitute("%.c", "main"), "main.c");
        assert_eq!(stem_substitute("obj/%.o", "util"), "obj/util.o");
    }
}
