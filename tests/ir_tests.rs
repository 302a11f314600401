//! IR construction tests: the parse → evaluate → build pipeline up to (and
//! excluding) emission.

use camino::Utf8Path;
use mk2cmake::config::ConversionConfig;
use mk2cmake::diagnostics::{DiagCode, DiagnosticSink};
use mk2cmake::eval::{self, ParsedMakefile};
use mk2cmake::ir::{self, LinkItem, Project, TargetType};
use mk2cmake::makefile::parser;
use mk2cmake::unknown::UnknownRegistry;
use mk2cmake::workspace::MemWorkspace;

fn build(makefile: &str, config_yaml: Option<&str>) -> (Project, DiagnosticSink) {
    let mut sink = DiagnosticSink::new();
    let mut unknowns = UnknownRegistry::new();
    let workspace = MemWorkspace::new();
    let config = config_yaml.map_or_else(ConversionConfig::default, |yaml| {
        let value: serde_json::Value = serde_yml::from_str(yaml).expect("config yaml");
        ConversionConfig::from_value(&value, false, &mut sink)
    });
    let path = Utf8Path::new("/proj/Makefile");
    let parsed = vec![ParsedMakefile {
        path: path.to_owned(),
        nodes: parser::parse(makefile, path, &mut sink, &mut unknowns),
    }];
    let facts = eval::evaluate(
        &parsed,
        Utf8Path::new("/proj"),
        &config,
        &workspace,
        &mut sink,
        &mut unknowns,
    );
    let project = ir::build_project(
        &facts,
        &config,
        Utf8Path::new("/proj"),
        &mut sink,
        &mut unknowns,
    );
    (project, sink)
}

const LIB_AND_APP: &str = concat!(
    "app: main.o libfoo.a\n",
    "\tgcc -o app main.o -lfoo -lm\n",
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

#[test]
fn objects_fold_into_their_consumers() {
    let (project, sink) = build(LIB_AND_APP, None);
    assert!(!sink.any_error(), "{sink:?}");
    let names: Vec<&str> = project.targets.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["app", "foo"], "objects disappear, targets sort");
    let app = project.find_target("app").expect("app");
    assert_eq!(app.ty, TargetType::Executable);
    assert_eq!(app.sources.len(), 1);
    assert_eq!(app.sources[0].path.as_str(), "main.c");
}

#[test]
fn aliases_exist_exactly_for_internal_libraries() {
    let (project, _) = build(LIB_AND_APP, None);
    for target in &project.targets {
        let expects_alias = target.ty.is_library();
        assert_eq!(
            target.alias.is_some(),
            expects_alias,
            "alias mismatch on {}",
            target.name
        );
    }
    let foo = project.find_target("foo").expect("foo");
    assert_eq!(foo.alias.as_deref(), Some("proj::foo"));
}

#[test]
fn link_items_partition_internal_external_imported() {
    let config = r#"
link_overrides:
  z:
    classification: imported
    imported_target: ZLIB::ZLIB
"#;
    let makefile = concat!(
        "app: main.o libfoo.a\n",
        "\tgcc -o app main.o -lz -lfoo -lm\n",
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
    let (project, sink) = build(makefile, Some(config));
    assert!(!sink.any_error(), "{sink:?}");
    let app = project.find_target("app").expect("app");
    let labels: Vec<&str> = app.link_libraries.iter().map(LinkItem::label).collect();
    assert_eq!(labels, vec!["proj::foo", "m", "ZLIB::ZLIB"]);
}

#[test]
fn duplicate_physical_names_are_fatal() {
    let makefile = concat!(
        "foo: main.c\n",
        "\tgcc -o foo main.c\n",
        "\n",
        "libfoo.a: foo.o\n",
        "\tar rcs libfoo.a foo.o\n",
        "\n",
        "foo.o: foo.c\n",
        "\tgcc -c foo.c -o foo.o\n",
    );
    let (_, sink) = build(makefile, None);
    assert!(sink.any_error());
    assert!(sink.iter().any(|d| d.code == DiagCode::IrDupTarget));
}

#[test]
fn unresolved_prerequisites_warn_and_are_retained() {
    let makefile = "app: main.c version_stamp\n\tgcc -o app main.c\n";
    let (project, sink) = build(makefile, None);
    assert!(!sink.any_error());
    assert!(sink.iter().any(|d| d.code == DiagCode::IrUnknownDep));
    let app = project.find_target("app").expect("app");
    assert!(app.dependencies.contains(&"version_stamp".to_owned()));
}

#[test]
fn header_prerequisites_do_not_warn() {
    let makefile = "app: main.c defs.h\n\tgcc -o app main.c\n";
    let (_, sink) = build(makefile, None);
    assert!(!sink.iter().any(|d| d.code == DiagCode::IrUnknownDep));
}

#[test]
fn target_mapping_renames_and_overrides() {
    let config = r#"
target_mappings:
  app:
    dest_name: tool
    options: [-Wall]
    visibility: PUBLIC
"#;
    let makefile = "app: main.c\n\tgcc -o app main.c\n";
    let (project, sink) = build(makefile, Some(config));
    assert!(!sink.any_error(), "{sink:?}");
    let tool = project.find_target("tool").expect("renamed target");
    assert!(tool.compile_options.contains(&"-Wall".to_owned()));
    assert_eq!(tool.visibility.as_str(), "PUBLIC");
    assert!(project.find_target("app").is_none());
}

#[test]
fn flag_mappings_substitute_and_warn_on_passthrough() {
    let config = r#"
flag_mappings:
  "-fomit-frame-pointer": "-fno-omit-frame-pointer"
"#;
    let makefile = "main.o: main.c\n\tgcc -c -fomit-frame-pointer -funsigned-char main.c -o main.o\n";
    let (project, sink) = build(makefile, Some(config));
    let obj = project.find_target("main").expect("object target");
    assert!(obj
        .compile_options
        .contains(&"-fno-omit-frame-pointer".to_owned()));
    assert!(obj.compile_options.contains(&"-funsigned-char".to_owned()));
    let unmapped: Vec<_> = sink
        .iter()
        .filter(|d| d.code == DiagCode::IrUnmappedFlag)
        .collect();
    assert_eq!(unmapped.len(), 1, "one warning per distinct unmatched flag");
    assert!(unmapped[0].message.contains("-funsigned-char"));
}

#[test]
fn without_mappings_no_unmapped_flag_noise() {
    let makefile = "main.o: main.c\n\tgcc -c -O2 main.c -o main.o\n";
    let (_, sink) = build(makefile, None);
    assert!(!sink.iter().any(|d| d.code == DiagCode::IrUnmappedFlag));
}

#[test]
fn global_flags_are_not_reattached_to_targets() {
    let makefile = concat!(
        "CFLAGS := -O2\n",
        "\n",
        "main.o: main.c\n",
        "\tgcc -c -O2 -DLOCAL main.c -o main.o\n",
    );
    let (project, sink) = build(makefile, None);
    let obj = project.find_target("main").expect("object target");
    assert!(
        !obj.compile_options.contains(&"-O2".to_owned()),
        "global flag stays centralized"
    );
    assert!(obj.defines.contains(&"LOCAL".to_owned()));
    assert!(sink.iter().any(|d| d.code == DiagCode::IrGlobalFlagOverlap));
}

#[test]
fn languages_infer_from_sources_with_c_fallback() {
    let (project, _) = build("app: main.cc\n\tg++ -o app main.cc\n", None);
    let names: Vec<_> = project
        .languages
        .iter()
        .filter_map(|l| l.cmake_name())
        .collect();
    assert_eq!(names, vec!["CXX"]);

    let (custom_only, _) = build("docs:\n\tdoxygen\n", None);
    let names: Vec<_> = custom_only
        .languages
        .iter()
        .filter_map(|l| l.cmake_name())
        .collect();
    assert_eq!(names, vec!["C"], "fallback language set");
}

#[test]
fn phony_meta_targets_are_not_emitted_as_custom() {
    let makefile = concat!(
        "all: app\n",
        "\n",
        "app: main.c\n",
        "\tgcc -o app main.c\n",
        "\n",
        "clean:\n",
        "\trm -f app\n",
        "\n",
        "docs:\n",
        "\tdoxygen Doxyfile\n",
    );
    let (project, sink) = build(makefile, None);
    assert!(!sink.any_error(), "{sink:?}");
    let names: Vec<&str> = project.targets.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["app", "docs"]);
    let docs = project.find_target("docs").expect("docs");
    assert_eq!(docs.ty, TargetType::Custom);
    assert_eq!(docs.custom_commands[0].commands, vec!["doxygen Doxyfile"]);
}

#[test]
fn shared_library_suffix_maps_to_shared_type() {
    let makefile = concat!(
        "libbar.so: bar.o\n",
        "\tgcc -shared -o libbar.so bar.o\n",
        "\n",
        "bar.o: bar.c\n",
        "\tgcc -c -fPIC bar.c -o bar.o\n",
    );
    let (project, sink) = build(makefile, None);
    assert!(!sink.any_error(), "{sink:?}");
    let bar = project.find_target("bar").expect("bar");
    assert_eq!(bar.ty, TargetType::SharedLibrary);
    assert_eq!(bar.alias.as_deref(), Some("proj::bar"));
    assert!(bar.link_options.contains(&"-shared".to_owned()));
}
