//! The supported subset of GNU Make functions.
//!
//! Everything else (`eval`, `call`, `shell`, user-defined names, …) is the
//! caller's problem: [`call`] returns `None` and the expander records an
//! unknown construct. `$(wildcard)` is the single function that touches the
//! filesystem, through the workspace boundary and the ignore filter.

use crate::eval::env::VariableEnv;
use crate::eval::expand::{expand_inner, ExpandCtx};
use crate::eval::pattern::{stem_match, stem_substitute};
use crate::makefile::ast::AssignKind;
use camino::Utf8Path;
use glob::Pattern;
use std::collections::HashSet;

/// Dispatch a recognized function call. `None` means the function is not in
/// the supported set.
pub(crate) fn call(
    name: &str,
    args: &str,
    env: &VariableEnv,
    cx: &mut ExpandCtx,
    in_progress: &mut HashSet<String>,
) -> Option<String> {
    let result = match name {
        "wildcard" => wildcard(&expand_args(args, env, cx, in_progress), cx),
        "patsubst" => {
            let [pat, repl, text] = expand_n::<3>(args, env, cx, in_progress);
            map_words(&text, |word| {
                stem_match(word, &pat)
                    .map_or_else(|| word.to_owned(), |stem| stem_substitute(&repl, stem))
            })
        }
        "addprefix" => {
            let [prefix, list] = expand_n::<2>(args, env, cx, in_progress);
            map_words(&list, |word| format!("{prefix}{word}"))
        }
        "addsuffix" => {
            let [suffix, list] = expand_n::<2>(args, env, cx, in_progress);
            map_words(&list, |word| format!("{word}{suffix}"))
        }
        "notdir" => map_words(&expand_args(args, env, cx, in_progress), |word| {
            Utf8Path::new(word).file_name().unwrap_or(word).to_owned()
        }),
        "dir" => map_words(&expand_args(args, env, cx, in_progress), |word| {
            match Utf8Path::new(word).parent() {
                Some(parent) if !parent.as_str().is_empty() => format!("{parent}/"),
                _ => "./".to_owned(),
            }
        }),
        "basename" => map_words(&expand_args(args, env, cx, in_progress), |word| {
            word.rfind('.')
                .filter(|dot| !word[dot + 1..].contains('/'))
                .map_or_else(|| word.to_owned(), |dot| word[..dot].to_owned())
        }),
        "strip" => expand_args(args, env, cx, in_progress)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
        "filter" => {
            let [patterns, text] = expand_n::<2>(args, env, cx, in_progress);
            filter_words(&patterns, &text, true)
        }
        "filter-out" => {
            let [patterns, text] = expand_n::<2>(args, env, cx, in_progress);
            filter_words(&patterns, &text, false)
        }
        "subst" => {
            let [from, to, text] = split_n::<3>(args);
            let text = expand_inner(text, env, cx, in_progress);
            if from.is_empty() {
                text
            } else {
                text.replace(from, to)
            }
        }
        "foreach" => foreach(args, env, cx, in_progress),
        "if" => {
            let parts = split_args(args, Some(3));
            let condition = expand_inner(parts.first().copied().unwrap_or(""), env, cx, in_progress);
            if condition.trim().is_empty() {
                parts
                    .get(2)
                    .map(|text| expand_inner(text.trim(), env, cx, in_progress))
                    .unwrap_or_default()
            } else {
                parts
                    .get(1)
                    .map(|text| expand_inner(text.trim(), env, cx, in_progress))
                    .unwrap_or_default()
            }
        }
        _ => return None,
    };
    Some(result)
}

fn expand_args(
    args: &str,
    env: &VariableEnv,
    cx: &mut ExpandCtx,
    in_progress: &mut HashSet<String>,
) -> String {
    expand_inner(args, env, cx, in_progress)
}

fn expand_n<const N: usize>(
    args: &str,
    env: &VariableEnv,
    cx: &mut ExpandCtx,
    in_progress: &mut HashSet<String>,
) -> [String; N] {
    split_n::<N>(args).map(|part| expand_inner(part.trim(), env, cx, in_progress))
}

fn split_n<const N: usize>(args: &str) -> [&str; N] {
    let parts = split_args(args, Some(N));
    std::array::from_fn(|i| parts.get(i).copied().unwrap_or(""))
}

/// Split on top-level commas, respecting `$(...)` nesting, into at most
/// `max` parts.
fn split_args(args: &str, max: Option<usize>) -> Vec<&str> {
    let mut parts = Vec::new();
    let bytes = args.as_bytes();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'{' => depth += 1,
            b')' | b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                if max.map_or(true, |m| parts.len() + 1 < m) {
                    parts.push(&args[start..i]);
                    start = i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&args[start..]);
    parts
}

fn map_words(text: &str, f: impl Fn(&str) -> String) -> String {
    text.split_whitespace()
        .map(|word| f(word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn filter_words(patterns: &str, text: &str, keep_matching: bool) -> String {
    let patterns: Vec<&str> = patterns.split_whitespace().collect();
    text.split_whitespace()
        .filter(|word| {
            patterns
                .iter()
                .any(|pattern| stem_match(word, pattern).is_some())
                == keep_matching
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn foreach(
    args: &str,
    env: &VariableEnv,
    cx: &mut ExpandCtx,
    in_progress: &mut HashSet<String>,
) -> String {
    let [var, list, body] = split_n::<3>(args);
    let var = expand_inner(var.trim(), env, cx, in_progress);
    let list = expand_inner(list.trim(), env, cx, in_progress);
    let mut results = Vec::new();
    for word in list.split_whitespace() {
        let mut scoped = env.clone();
        scoped.set(var.clone(), word, AssignKind::Simple);
        results.push(expand_inner(body.trim(), &scoped, cx, in_progress));
    }
    results.join(" ")
}

/// Expand glob patterns through the workspace, relative to the source root,
/// pruning anything matched by the ignore filter. Results keep the shape
/// they were written in (relative patterns give relative paths).
fn wildcard(patterns: &str, cx: &mut ExpandCtx) -> String {
    let mut matches = Vec::new();
    for pattern_word in patterns.split_whitespace() {
        let (dir_part, file_part) = match pattern_word.rsplit_once('/') {
            Some((dir, file)) => (dir, file),
            None => ("", pattern_word),
        };
        let Ok(pattern) = Pattern::new(file_part) else {
            continue;
        };
        let search_dir = if dir_part.is_empty() {
            cx.base_dir.to_owned()
        } else if Utf8Path::new(dir_part).is_absolute() {
            Utf8Path::new(dir_part).to_owned()
        } else {
            cx.base_dir.join(dir_part)
        };
        let Ok(entries) = cx.workspace.list_dir(&search_dir) else {
            continue;
        };
        for entry in entries {
            let Some(file_name) = entry.file_name() else {
                continue;
            };
            if !pattern.matches(file_name) {
                continue;
            }
            let rendered = if dir_part.is_empty() {
                file_name.to_owned()
            } else {
                format!("{dir_part}/{file_name}")
            };
            if cx.config.should_ignore(&rendered) {
                continue;
            }
            matches.push(rendered);
        }
    }
    matches.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::diagnostics::DiagnosticSink;
    use crate::location::SourceLocation;
    use crate::unknown::UnknownRegistry;
    use crate::workspace::MemWorkspace;
    use rstest::rstest;

    struct Fixture {
        workspace: MemWorkspace,
        config: ConversionConfig,
        location: SourceLocation,
        sink: DiagnosticSink,
        unknowns: UnknownRegistry,
        env: VariableEnv,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                workspace: MemWorkspace::new(),
                config: ConversionConfig::default(),
                location: SourceLocation::line_of("Makefile", 1),
                sink: DiagnosticSink::new(),
                unknowns: UnknownRegistry::new(),
                env: VariableEnv::new(),
            }
        }

        fn eval(&mut self, text: &str) -> String {
            let mut cx = ExpandCtx {
                workspace: &self.workspace,
                config: &self.config,
                base_dir: Utf8Path::new("/proj"),
                location: &self.location,
                auto: None,
                scope_targets: &[],
                sink: &mut self.sink,
                unknowns: &mut self.unknowns,
            };
            crate::eval::expand::expand(text, &self.env, &mut cx)
        }
    }

    #[rstest]
    #[case("$(patsubst %.c,%.o,main.c util.c)", "main.o util.o")]
    #[case("$(addprefix src/,a.c b.c)", "src/a.c src/b.c")]
    #[case("$(addsuffix .o,main util)", "main.o util.o")]
    #[case("$(notdir src/main.c lib/util.c)", "main.c util.c")]
    #[case("$(dir src/main.c main.c)", "src/ ./")]
    #[case("$(basename main.c lib/util.cpp)", "main lib/util")]
    #[case("$(strip   a   b  )", "a b")]
    #[case("$(filter %.c,main.c main.o util.c)", "main.c util.c")]
    #[case("$(filter-out %.o,main.c main.o)", "main.c")]
    #[case("$(subst ee,EE,feet street)", "fEEt strEEt")]
    #[case("$(if nonempty,yes,no)", "yes")]
    #[case("$(if ,yes,no)", "no")]
    fn builtin_functions(#[case] input: &str, #[case] expected: &str) {
        let mut fx = Fixture::new();
        assert_eq!(fx.eval(input), expected);
    }

    #[test]
    fn foreach_binds_loop_variable() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.eval("$(foreach n,a b c,$(n).o)"),
            "a.o b.o c.o"
        );
    }

    #[test]
    fn wildcard_lists_matching_files_sorted() {
        let mut fx = Fixture::new();
        fx.workspace.add_file("/proj/src/b.c", "");
        fx.workspace.add_file("/proj/src/a.c", "");
        fx.workspace.add_file("/proj/src/skip.h", "");
        assert_eq!(fx.eval("$(wildcard src/*.c)"), "src/a.c src/b.c");
    }

    #[test]
    fn wildcard_honors_ignore_paths() {
        let mut fx = Fixture::new();
        fx.workspace.add_file("/proj/gen/x.c", "");
        fx.workspace.add_file("/proj/gen/y.c", "");
        fx.config.ignore_paths = vec!["gen/y.c".to_owned()];
        assert_eq!(fx.eval("$(wildcard gen/*.c)"), "gen/x.c");
    }

    #[test]
    fn nested_function_arguments() {
        let mut fx = Fixture::new();
        fx.env.set("SRCS", "a.c b.c", AssignKind::Simple);
        assert_eq!(fx.eval("$(patsubst %.c,%.o,$(SRCS))"), "a.o b.o");
    }
}
