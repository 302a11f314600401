//! End-to-end pipeline scenarios over an in-memory workspace.
//!
//! Each test drives the full orchestrated run exactly the way the binary
//! does, asserting on exit status, emitted files, and rendered diagnostics.

use clap::Parser;
use mk2cmake::cli::Cli;
use mk2cmake::runner::{run_with, CancelFlag};
use mk2cmake::workspace::MemWorkspace;

struct Outcome {
    code: i32,
    workspace: MemWorkspace,
    output: String,
}

impl Outcome {
    fn file(&self, path: &str) -> String {
        self.workspace
            .file(path)
            .unwrap_or_else(|| panic!("expected generated file {path}"))
    }

    fn has_file(&self, path: &str) -> bool {
        self.workspace.file(path).is_some()
    }
}

fn convert(files: &[(&str, &str)], extra_args: &[&str]) -> Outcome {
    let workspace = MemWorkspace::new();
    for (path, text) in files {
        workspace.add_file(*path, *text);
    }
    let mut args = vec![
        "mk2cmake",
        "--source-dir",
        "/proj",
        "--output-dir",
        "/out",
    ];
    args.extend_from_slice(extra_args);
    let cli = Cli::parse_from(args);
    let mut rendered = Vec::new();
    let code = run_with(&cli, &workspace, &CancelFlag::new(), &mut rendered).expect("run");
    Outcome {
        code,
        workspace,
        output: String::from_utf8(rendered).expect("utf-8 output"),
    }
}

#[test]
fn single_executable_single_makefile() {
    let makefile = "app: main.o\n\tgcc -o app main.o\n\nmain.o: main.c\n\tgcc -c main.c -o main.o\n";
    let outcome = convert(&[("/proj/Makefile", makefile)], &[]);
    assert_eq!(outcome.code, 0, "diagnostics: {}", outcome.output);
    let root = outcome.file("/out/CMakeLists.txt");
    assert!(root.contains("cmake_minimum_required(VERSION 3.20)"));
    assert!(root.contains("project(proj LANGUAGES C)"));
    assert!(root.contains("add_executable(app main.c)"));
    assert!(!outcome.output.contains("[ERROR]"));
}

#[test]
fn internal_library_linked_by_executable() {
    let makefile = concat!(
        "app: main.o libfoo.a\n",
        "\tgcc -o app main.o -lfoo\n",
        "\n",
        "libfoo.a: foo.o\n",
        "\tar rcs libfoo.a foo.o\n",
        "\n",
        "foo.o: foo.c\n",
        "\tgcc -c foo.c -o foo.o\n",
        "\n",
        "main.o: main.c\n",
        "\tgcc -c main.c -o main.o\n",
    );
    let outcome = convert(&[("/proj/Makefile", makefile)], &[]);
    assert_eq!(outcome.code, 0, "diagnostics: {}", outcome.output);
    let root = outcome.file("/out/CMakeLists.txt");
    assert!(root.contains("add_library(foo STATIC foo.c)"));
    assert!(root.contains("add_library(proj::foo ALIAS foo)"));
    assert!(root.contains("add_executable(app main.c)"));
    assert!(root.contains("target_link_libraries(app PRIVATE proj::foo)"));
}

#[test]
fn global_config_file_centralizes_flags() {
    let files = [
        (
            "/proj/Makefile",
            "include config.mk\n\napp: main.c\n\tgcc $(CFLAGS) -o app main.c\n",
        ),
        ("/proj/config.mk", "CFLAGS := -O2\n"),
    ];
    let outcome = convert(&files, &[]);
    assert_eq!(outcome.code, 0, "diagnostics: {}", outcome.output);
    let module = outcome.file("/out/ProjectGlobalConfig.cmake");
    assert!(module.contains("set(CMAKE_C_FLAGS_INIT \"-O2\")"));
    assert!(module.contains("add_library(proj_global_options INTERFACE)"));
    assert!(module.contains("add_library(proj::GlobalOptions ALIAS proj_global_options)"));
    let root = outcome.file("/out/CMakeLists.txt");
    assert!(root.contains("include(\"${CMAKE_CURRENT_LIST_DIR}/ProjectGlobalConfig.cmake\")"));
    // The global flag must not be re-attached to the target.
    assert!(!root.contains("target_compile_options(app"));
    assert!(!root.contains("target_link_options(app"));
}

#[test]
fn include_cycle_blocks_emission() {
    let files = [
        ("/proj/Makefile", "include A.mk\n"),
        ("/proj/A.mk", "include B.mk\n"),
        ("/proj/B.mk", "include A.mk\n"),
    ];
    let outcome = convert(&files, &[]);
    assert_eq!(outcome.code, 1);
    assert!(outcome.output.contains("DISCOVERY_CYCLE"));
    assert!(outcome
        .output
        .contains("/proj/A.mk -> /proj/B.mk -> /proj/A.mk"));
    assert!(!outcome.has_file("/out/CMakeLists.txt"));
}

#[test]
fn unknown_function_is_reported_but_emission_proceeds() {
    let makefile = "app: main.c\n\tgcc -o app main.c\n\t$(eval $(call DEFINE_RULE,foo))\n";
    let outcome = convert(&[("/proj/Makefile", makefile)], &[]);
    assert_eq!(outcome.code, 0, "diagnostics: {}", outcome.output);
    assert!(outcome.output.contains("UNKNOWN_CONSTRUCT"));
    assert!(outcome.output.contains("eval(call(DEFINE_RULE, foo))"));
    assert!(outcome.output.contains("UC0001"));
    assert!(outcome.has_file("/out/CMakeLists.txt"));
    assert!(outcome.file("/out/CMakeLists.txt").contains("add_executable(app main.c)"));
}

#[test]
fn packaging_mode_exports_namespaced_targets() {
    let files = [
        (
            "/proj/Makefile",
            concat!(
                "app: main.o libfoo.a\n",
                "\tgcc -o app main.o -lfoo\n",
                "\n",
                "libfoo.a: foo.o\n",
                "\tar rcs libfoo.a foo.o\n",
                "\n",
                "foo.o: foo.c\n",
                "\tgcc -c foo.c -o foo.o\n",
                "\n",
                "main.o: main.c\n",
                "\tgcc -c main.c -o main.o\n",
            ),
        ),
        (
            "/proj/mk2cmake.yml",
            "project_name: MyProj\nnamespace: MyProj\npackaging_enabled: true\n",
        ),
    ];
    let outcome = convert(&files, &["--config", "/proj/mk2cmake.yml"]);
    assert_eq!(outcome.code, 0, "diagnostics: {}", outcome.output);
    let root = outcome.file("/out/CMakeLists.txt");
    assert!(root.contains("install(TARGETS"));
    assert!(root.contains("EXPORT MyProjTargets"));
    assert!(root.contains("install(EXPORT MyProjTargets"));
    assert!(root.contains("NAMESPACE MyProj::"));
    assert!(root.contains("target_link_libraries(app PRIVATE MyProj::foo)"));
    assert!(outcome.has_file("/out/MyProjConfig.cmake"));
    assert!(outcome.has_file("/out/MyProjConfigVersion.cmake"));
}

#[test]
fn emitted_files_are_byte_identical_across_runs() {
    let makefile = concat!(
        "SRCS := main.c util.c\n",
        "OBJS := $(SRCS:.c=.o)\n",
        "\n",
        "app: $(OBJS)\n",
        "\tgcc -o app $(OBJS)\n",
        "\n",
        "%.o: %.c\n",
        "\tgcc -c $< -o $@\n",
    );
    let first = convert(&[("/proj/Makefile", makefile)], &[]);
    let second = convert(&[("/proj/Makefile", makefile)], &[]);
    assert_eq!(first.code, 0, "diagnostics: {}", first.output);
    assert_eq!(first.workspace.paths(), second.workspace.paths());
    for path in first.workspace.paths() {
        assert_eq!(
            first.workspace.file(&path),
            second.workspace.file(&path),
            "mismatch in {path}"
        );
    }
}

#[test]
fn pattern_rules_instantiate_for_listed_objects() {
    let makefile = concat!(
        "app: main.o util.o\n",
        "\tgcc -o app main.o util.o\n",
        "\n",
        "%.o: %.c\n",
        "\tgcc -c $< -o $@\n",
    );
    let outcome = convert(&[("/proj/Makefile", makefile)], &[]);
    assert_eq!(outcome.code, 0, "diagnostics: {}", outcome.output);
    let root = outcome.file("/out/CMakeLists.txt");
    assert!(root.contains("add_executable(app main.c util.c)"));
}

#[test]
fn dry_run_lists_files_without_writing() {
    let makefile = "app: main.c\n\tgcc -o app main.c\n";
    let outcome = convert(&[("/proj/Makefile", makefile)], &["--dry-run"]);
    assert_eq!(outcome.code, 0);
    assert!(outcome.output.contains("would write /out/CMakeLists.txt"));
    assert!(!outcome.has_file("/out/CMakeLists.txt"));
}

#[test]
fn missing_entry_makefile_fails_with_discovery_error() {
    let outcome = convert(&[("/proj/README", "not a makefile")], &[]);
    assert_eq!(outcome.code, 1);
    assert!(outcome.output.contains("DISCOVERY_ENTRY_MISSING"));
}

#[test]
fn missing_config_file_is_config_missing() {
    let makefile = "app: main.c\n\tgcc -o app main.c\n";
    let outcome = convert(
        &[("/proj/Makefile", makefile)],
        &["--config", "/proj/absent.yml"],
    );
    assert_eq!(outcome.code, 1);
    assert!(outcome.output.contains("CONFIG_MISSING"));
    assert!(!outcome.has_file("/out/CMakeLists.txt"));
}

#[test]
fn strict_promotes_unknown_config_keys() {
    let makefile = "app: main.c\n\tgcc -o app main.c\n";
    let files = [
        ("/proj/Makefile", makefile),
        ("/proj/conf.yml", "mystery_option: 1\n"),
    ];
    let relaxed = convert(&files, &["--config", "/proj/conf.yml"]);
    assert_eq!(relaxed.code, 0, "diagnostics: {}", relaxed.output);
    let strict = convert(&files, &["--config", "/proj/conf.yml", "--strict"]);
    assert_eq!(strict.code, 1);
    assert!(strict.output.contains("CONFIG_SCHEMA"));
}

#[test]
fn write_failure_reports_emit_write_fail() {
    let makefile = "app: main.c\n\tgcc -o app main.c\n";
    let workspace = MemWorkspace::new();
    workspace.add_file("/proj/Makefile", makefile);
    workspace.set_read_only(true);
    let cli = Cli::parse_from([
        "mk2cmake",
        "--source-dir",
        "/proj",
        "--output-dir",
        "/out",
    ]);
    let mut rendered = Vec::new();
    let code = run_with(&cli, &workspace, &CancelFlag::new(), &mut rendered).expect("run");
    let output = String::from_utf8(rendered).expect("utf-8");
    assert_eq!(code, 1);
    assert!(output.contains("EMIT_WRITE_FAIL"));
}

#[test]
fn subdirectory_sources_get_their_own_build_file() {
    let makefile = concat!(
        "app: src/main.o src/util.o\n",
        "\tgcc -o app src/main.o src/util.o\n",
        "\n",
        "src/main.o: src/main.c\n",
        "\tgcc -c src/main.c -o src/main.o\n",
        "\n",
        "src/util.o: src/util.c\n",
        "\tgcc -c src/util.c -o src/util.o\n",
    );
    let outcome = convert(&[("/proj/Makefile", makefile)], &[]);
    assert_eq!(outcome.code, 0, "diagnostics: {}", outcome.output);
    let root = outcome.file("/out/CMakeLists.txt");
    assert!(root.contains("add_subdirectory(src)"));
    let sub = outcome.file("/out/src/CMakeLists.txt");
    assert!(sub.contains("add_executable(app main.c util.c)"));
}

#[test]
fn ignored_paths_are_pruned_from_the_project() {
    let files = [
        (
            "/proj/Makefile",
            concat!(
                "app: main.c\n",
                "\tgcc -o app main.c\n",
                "\n",
                "third_party/junk: third_party/junk.c\n",
                "\tgcc -o third_party/junk third_party/junk.c\n",
            ),
        ),
        ("/proj/conf.yml", "ignore_paths:\n  - \"third_party/*\"\n"),
    ];
    let outcome = convert(&files, &["--config", "/proj/conf.yml"]);
    assert_eq!(outcome.code, 0, "diagnostics: {}", outcome.output);
    let root = outcome.file("/out/CMakeLists.txt");
    assert!(root.contains("add_executable(app main.c)"));
    assert!(!root.contains("junk"));
}

#[test]
fn recursive_variable_loop_is_fatal_but_rendered() {
    let makefile = "LOOP = $(LOOP)\napp: main.c\n\tgcc $(LOOP) -o app main.c\n";
    let outcome = convert(&[("/proj/Makefile", makefile)], &[]);
    assert_eq!(outcome.code, 1);
    assert!(outcome.output.contains("EVAL_RECURSIVE_LOOP"));
    assert!(outcome.output.contains("LOOP"));
    assert!(
        !outcome.has_file("/out/CMakeLists.txt"),
        "errors block emission"
    );
}
