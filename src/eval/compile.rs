//! Compile, link, and archive inference over expanded recipe lines.
//!
//! A recipe line is recognized by its invoked tool: the first token after
//! stripping `@`/`-`/`+` prefixes and leading `VAR=VALUE` words, reduced to
//! its basename. Version-suffixed tools (`gcc-12`, `clang++-17`) count.
//! Recognized lines are decomposed into sources, output, includes, defines,
//! link tokens, and remaining flags; one [`InferredCompile`] is produced per
//! input file so artifact grouping stays uniform.

use crate::diagnostics::{DiagCode, Diagnostic, DiagnosticSink, Stage};
use crate::eval::facts::{EvaluatedRule, InferredCompile, Language, ToolKind};
use crate::workspace::to_posix;
use camino::{Utf8Path, Utf8PathBuf};

const COMPILERS: &[&str] = &[
    "clang++", "clang", "g++", "gcc", "c++", "cc", "cl", "nasm", "as",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "c", "cc", "cpp", "cxx", "c++", "m", "mm", "s", "asm",
];

const LINK_INPUT_EXTENSIONS: &[&str] = &["o", "obj", "a", "lib", "so", "dylib"];

/// Infer tool facts from every recipe line of an evaluated rule.
pub fn infer_from_rule(rule: &EvaluatedRule, sink: &mut DiagnosticSink) -> Vec<InferredCompile> {
    let mut compiles = Vec::new();
    for command in &rule.recipe {
        let Some(line) = ToolLine::recognize(&command.text) else {
            continue;
        };
        let output = match line.output {
            Some(out) => out,
            None => {
                sink.push(
                    Diagnostic::warn(
                        DiagCode::EvalNoSource,
                        "no -o output in recipe line; falling back to the rule target",
                    )
                    .at(command.location.clone())
                    .from_stage(Stage::Evaluate),
                );
                let Some(first_target) = rule.targets.first() else {
                    continue;
                };
                first_target.clone()
            }
        };
        let output = to_posix(Utf8Path::new(&output));
        if line.sources.is_empty() {
            compiles.push(InferredCompile {
                source: Utf8PathBuf::new(),
                output,
                language: line.language,
                kind: line.kind,
                flags: line.flags.clone(),
                include_dirs: line.includes.clone(),
                defines: line.defines.clone(),
                libs: line.libs.clone(),
                location: command.location.clone(),
            });
            continue;
        }
        for source in &line.sources {
            let source = to_posix(Utf8Path::new(source));
            let language = if line.language == Language::Other {
                source
                    .extension()
                    .map_or(Language::Other, Language::from_extension)
            } else {
                line.language
            };
            compiles.push(InferredCompile {
                source,
                output: output.clone(),
                language,
                kind: line.kind,
                flags: line.flags.clone(),
                include_dirs: line.includes.clone(),
                defines: line.defines.clone(),
                libs: line.libs.clone(),
                location: command.location.clone(),
            });
        }
    }
    compiles
}

/// True when any recipe line of the rule invokes a recognized tool.
#[must_use]
pub fn has_tool_line(rule: &EvaluatedRule) -> bool {
    rule.recipe
        .iter()
        .any(|command| ToolLine::recognize(&command.text).is_some())
}

#[derive(Debug)]
struct ToolLine {
    kind: ToolKind,
    language: Language,
    sources: Vec<String>,
    output: Option<String>,
    includes: Vec<String>,
    defines: Vec<String>,
    libs: Vec<String>,
    flags: Vec<String>,
}

impl ToolLine {
    fn recognize(text: &str) -> Option<Self> {
        let mut tokens = tokenize(text)?;
        let tool = tokens.remove(0);
        if tool == "ar" {
            return Some(Self::archive(&tokens));
        }
        let compiler = match_compiler(&tool)?;
        Some(Self::compile_or_link(compiler, &tokens))
    }

    fn archive(tokens: &[String]) -> Self {
        let mut sources = Vec::new();
        let mut output = None;
        for token in tokens {
            let ext = extension_of(token);
            if matches!(ext.as_deref(), Some("a" | "lib")) && output.is_none() {
                output = Some(token.clone());
            } else if ext.as_deref().is_some_and(|e| LINK_INPUT_EXTENSIONS.contains(&e)) {
                sources.push(token.clone());
            }
        }
        Self {
            kind: ToolKind::Archive,
            language: Language::Other,
            sources,
            output,
            includes: Vec::new(),
            defines: Vec::new(),
            libs: Vec::new(),
            flags: Vec::new(),
        }
    }

    fn compile_or_link(compiler: &str, tokens: &[String]) -> Self {
        let mut line = Self {
            kind: ToolKind::Link,
            language: language_of_compiler(compiler),
            sources: Vec::new(),
            output: None,
            includes: Vec::new(),
            defines: Vec::new(),
            libs: Vec::new(),
            flags: Vec::new(),
        };
        let mut iter = tokens.iter();
        while let Some(token) = iter.next() {
            match token.as_str() {
                "-c" => line.kind = ToolKind::Compile,
                "-o" => {
                    if let Some(out) = iter.next() {
                        line.output = Some(out.clone());
                    }
                }
                "-I" | "-D" => {
                    if let Some(value) = iter.next() {
                        if token == "-I" {
                            line.includes.push(value.clone());
                        } else {
                            line.defines.push(value.clone());
                        }
                    }
                }
                _ if token.starts_with("-I") => line.includes.push(token[2..].to_owned()),
                _ if token.starts_with("-D") => line.defines.push(token[2..].to_owned()),
                _ if token.starts_with("-l") && token.len() > 2 => {
                    line.libs.push(token[2..].to_owned());
                }
                _ if token.starts_with("-o") && token.len() > 2 => {
                    line.output = Some(token[2..].to_owned());
                }
                _ if token.starts_with('-') => line.flags.push(token.clone()),
                _ => {
                    let ext = extension_of(token);
                    let is_source = ext
                        .as_deref()
                        .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
                    let is_link_input = ext
                        .as_deref()
                        .is_some_and(|e| LINK_INPUT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
                    if is_source || is_link_input {
                        line.sources.push(token.clone());
                    }
                }
            }
        }
        line
    }
}

/// Split a shell line into words, dropping recipe prefixes and leading
/// environment assignments. Returns `None` for lines with no tokens left.
fn tokenize(text: &str) -> Option<Vec<String>> {
    let mut words: Vec<String> = text.split_whitespace().map(str::to_owned).collect();
    let first = words.first_mut()?;
    while first.len() > 1 && matches!(first.chars().next(), Some('@' | '-' | '+')) {
        first.remove(0);
    }
    while let Some(word) = words.first() {
        let looks_like_env = word.contains('=')
            && !word.starts_with('-')
            && !word.contains('/')
            && word
                .chars()
                .take_while(|c| *c != '=')
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if looks_like_env {
            words.remove(0);
        } else {
            break;
        }
    }
    if words.is_empty() {
        return None;
    }
    Some(words)
}

/// Match the invoked tool against the known compiler set, allowing path
/// prefixes and `-`/`.` version suffixes.
fn match_compiler(token: &str) -> Option<&'static str> {
    let base = token.rsplit('/').next().unwrap_or(token);
    COMPILERS.iter().copied().find(|name| {
        base == *name
            || base
                .strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('-') || rest.starts_with('.'))
    })
}

fn language_of_compiler(compiler: &str) -> Language {
    match compiler {
        "c++" | "g++" | "clang++" => Language::Cpp,
        "as" | "nasm" => Language::Asm,
        "cc" | "gcc" | "clang" | "cl" => Language::Other,
        _ => Language::Other,
    }
}

fn extension_of(token: &str) -> Option<String> {
    Utf8Path::new(token)
        .extension()
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::facts::EvaluatedCommand;
    use crate::location::SourceLocation;

    fn rule(targets: &[&str], prereqs: &[&str], lines: &[&str]) -> EvaluatedRule {
        EvaluatedRule {
            targets: targets.iter().map(|s| (*s).to_owned()).collect(),
            prerequisites: prereqs.iter().map(|s| (*s).to_owned()).collect(),
            recipe: lines
                .iter()
                .enumerate()
                .map(|(i, text)| EvaluatedCommand {
                    text: (*text).to_owned(),
                    location: SourceLocation::line_of("Makefile", u32::try_from(i).unwrap_or(0) + 2),
                })
                .collect(),
            is_pattern: false,
            location: SourceLocation::line_of("Makefile", 1),
        }
    }

    #[test]
    fn compile_line_extracts_everything() {
        let mut sink = DiagnosticSink::new();
        let compiles = infer_from_rule(
            &rule(
                &["main.o"],
                &["main.c"],
                &["gcc -c -Iinclude -I vendor -DDEBUG -D NDEBUG=0 -O2 main.c -o main.o"],
            ),
            &mut sink,
        );
        assert_eq!(compiles.len(), 1);
        let compile = &compiles[0];
        assert_eq!(compile.source.as_str(), "main.c");
        assert_eq!(compile.output.as_str(), "main.o");
        assert_eq!(compile.kind, ToolKind::Compile);
        assert_eq!(compile.language, Language::C);
        assert_eq!(compile.include_dirs, vec!["include", "vendor"]);
        assert_eq!(compile.defines, vec!["DEBUG", "NDEBUG=0"]);
        assert_eq!(compile.flags, vec!["-O2"]);
        assert!(sink.is_empty());
    }

    #[test]
    fn link_line_collects_objects_and_libs() {
        let mut sink = DiagnosticSink::new();
        let compiles = infer_from_rule(
            &rule(
                &["app"],
                &["main.o", "util.o"],
                &["gcc -o app main.o util.o -lfoo -lm"],
            ),
            &mut sink,
        );
        assert_eq!(compiles.len(), 2);
        assert_eq!(compiles[0].kind, ToolKind::Link);
        assert_eq!(compiles[0].output.as_str(), "app");
        assert_eq!(compiles[0].libs, vec!["foo", "m"]);
    }

    #[test]
    fn archive_line_recognized() {
        let mut sink = DiagnosticSink::new();
        let compiles = infer_from_rule(
            &rule(&["libfoo.a"], &["foo.o"], &["ar rcs libfoo.a foo.o"]),
            &mut sink,
        );
        assert_eq!(compiles.len(), 1);
        assert_eq!(compiles[0].kind, ToolKind::Archive);
        assert_eq!(compiles[0].output.as_str(), "libfoo.a");
        assert_eq!(compiles[0].source.as_str(), "foo.o");
    }

    #[test]
    fn cpp_compiler_sets_language() {
        let mut sink = DiagnosticSink::new();
        let compiles = infer_from_rule(
            &rule(&["a.o"], &["a.cc"], &["g++ -c a.cc -o a.o"]),
            &mut sink,
        );
        assert_eq!(compiles[0].language, Language::Cpp);
    }

    #[test]
    fn language_falls_back_to_extension() {
        let mut sink = DiagnosticSink::new();
        let compiles = infer_from_rule(
            &rule(&["a.o"], &["a.cpp"], &["cc -c a.cpp -o a.o"]),
            &mut sink,
        );
        assert_eq!(compiles[0].language, Language::Cpp);
    }

    #[test]
    fn versioned_and_prefixed_tools_match() {
        assert_eq!(match_compiler("gcc-12"), Some("gcc"));
        assert_eq!(match_compiler("/usr/bin/clang++"), Some("clang++"));
        assert_eq!(match_compiler("ccache"), None);
        assert_eq!(match_compiler("g++-13.2"), Some("g++"));
    }

    #[test]
    fn missing_output_warns_and_uses_rule_target() {
        let mut sink = DiagnosticSink::new();
        let compiles = infer_from_rule(
            &rule(&["main.o"], &["main.c"], &["gcc -c main.c"]),
            &mut sink,
        );
        assert_eq!(compiles[0].output.as_str(), "main.o");
        assert_eq!(
            sink.iter().next().expect("diag").code,
            DiagCode::EvalNoSource
        );
    }

    #[test]
    fn recipe_prefixes_and_env_assignments_are_stripped() {
        let mut sink = DiagnosticSink::new();
        let compiles = infer_from_rule(
            &rule(
                &["main.o"],
                &["main.c"],
                &["@CFLAGS_EXTRA=1 gcc -c main.c -o main.o"],
            ),
            &mut sink,
        );
        assert_eq!(compiles.len(), 1);
    }

    #[test]
    fn unrelated_lines_are_not_tools() {
        let mut sink = DiagnosticSink::new();
        let compiles = infer_from_rule(
            &rule(&["docs"], &[], &["doxygen Doxyfile", "echo done"]),
            &mut sink,
        );
        assert!(compiles.is_empty());
    }
}
