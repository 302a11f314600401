//! CMake project generation.
//!
//! [`generate`] is a pure function from the project IR and emit options to
//! an ordered list of in-memory files; [`flush`] writes that list through
//! the workspace boundary. Targets are grouped by the longest common
//! directory prefix of their sources: the root group renders inline in the
//! root `CMakeLists.txt`, every other group owns one subdirectory file
//! referenced by a lexicographically ordered `add_subdirectory` block.

use crate::diagnostics::{DiagCode, Diagnostic, DiagnosticSink, Severity, Stage};
use crate::eval::facts::{FlagBucket, Toggle};
use crate::ir::{LinkItem, Project, Target, TargetType};
use crate::unknown::{
    CmakeStatus, Impact, Phase, SuggestedAction, UnknownCategory, UnknownDraft, UnknownRegistry,
};
use crate::workspace::{relative_from, Workspace};
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt::Write as _;

const CMAKE_MINIMUM_VERSION: &str = "3.20";
const GLOBAL_MODULE_FILE: &str = "ProjectGlobalConfig.cmake";

/// Options the orchestrator hands to the emitter.
#[derive(Debug, Clone)]
pub struct EmitOptions {
    pub output_dir: Utf8PathBuf,
    pub packaging: bool,
}

/// One generated file, absolute posix path plus UTF-8 content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: Utf8PathBuf,
    pub content: String,
}

/// Render the whole project. Byte-identical output for identical input.
pub fn generate(
    project: &Project,
    options: &EmitOptions,
    sink: &mut DiagnosticSink,
    unknowns: &mut UnknownRegistry,
) -> Vec<GeneratedFile> {
    let mut files = Vec::new();
    let has_global_module = !project.globals.is_empty();

    if has_global_module {
        files.push(GeneratedFile {
            path: options.output_dir.join(GLOBAL_MODULE_FILE),
            content: render_global_module(project),
        });
    }

    let layout = plan_layout(project);
    let subdirs: Vec<&Utf8PathBuf> = layout.keys().filter(|dir| dir.as_str() != ".").collect();

    let mut root = String::new();
    let _ = writeln!(root, "cmake_minimum_required(VERSION {CMAKE_MINIMUM_VERSION})");
    let _ = writeln!(root);
    let _ = writeln!(root, "{}", project_call(project));
    if has_global_module {
        let _ = writeln!(root);
        let _ = writeln!(
            root,
            "include(\"${{CMAKE_CURRENT_LIST_DIR}}/{GLOBAL_MODULE_FILE}\")"
        );
    }
    if !subdirs.is_empty() {
        let _ = writeln!(root);
        for dir in &subdirs {
            let _ = writeln!(root, "add_subdirectory({dir})");
        }
    }
    if let Some(root_targets) = layout.get(Utf8Path::new(".")) {
        for target in root_targets {
            let _ = writeln!(root);
            root.push_str(&render_target(
                target,
                Utf8Path::new("."),
                project,
                has_global_module,
                sink,
                unknowns,
            ));
        }
    }
    if options.packaging {
        let _ = writeln!(root);
        root.push_str(&render_packaging(project));
    }
    files.push(GeneratedFile {
        path: options.output_dir.join("CMakeLists.txt"),
        content: root,
    });

    for (dir, targets) in &layout {
        if dir.as_str() == "." {
            continue;
        }
        let mut content = String::new();
        for (idx, target) in targets.iter().enumerate() {
            if idx > 0 {
                let _ = writeln!(content);
            }
            content.push_str(&render_target(
                target,
                dir,
                project,
                has_global_module,
                sink,
                unknowns,
            ));
        }
        files.push(GeneratedFile {
            path: options.output_dir.join(dir).join("CMakeLists.txt"),
            content,
        });
    }

    if options.packaging {
        files.push(GeneratedFile {
            path: options
                .output_dir
                .join(format!("{}Config.cmake", project.name)),
            content: render_package_config(project),
        });
        files.push(GeneratedFile {
            path: options
                .output_dir
                .join(format!("{}ConfigVersion.cmake", project.name)),
            content: render_package_version(project),
        });
    }
    files
}

/// Write the generated files in order. The first failure records
/// `EMIT_WRITE_FAIL` and stops further writes; already-written files stay.
pub fn flush(files: &[GeneratedFile], workspace: &dyn Workspace, sink: &mut DiagnosticSink) {
    for file in files {
        if let Err(err) = workspace.write(&file.path, &file.content) {
            sink.push(
                Diagnostic::error(
                    DiagCode::EmitWriteFail,
                    format!("failed to write {}: {err}", file.path),
                )
                .from_stage(Stage::Emit),
            );
            return;
        }
    }
}

/// Group targets by the longest common directory prefix of their sources.
/// Sourceless targets (custom, interface) land in the root group.
fn plan_layout(project: &Project) -> BTreeMap<Utf8PathBuf, Vec<&Target>> {
    let mut layout: BTreeMap<Utf8PathBuf, Vec<&Target>> = BTreeMap::new();
    for target in &project.targets {
        layout.entry(group_dir(target)).or_default().push(target);
    }
    layout
}

fn group_dir(target: &Target) -> Utf8PathBuf {
    let mut common: Option<Vec<&str>> = None;
    for source in &target.sources {
        if source.path.is_absolute() {
            return Utf8PathBuf::from(".");
        }
        let dir: Vec<&str> = source
            .path
            .parent()
            .map(|p| p.components().map(|c| c.as_str()).collect())
            .unwrap_or_default();
        common = Some(match common {
            None => dir,
            Some(prev) => prev
                .iter()
                .zip(&dir)
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| *a)
                .collect(),
        });
    }
    match common {
        Some(parts) if !parts.is_empty() => parts.iter().collect(),
        _ => Utf8PathBuf::from("."),
    }
}

fn project_call(project: &Project) -> String {
    let languages = project
        .languages
        .iter()
        .filter_map(|lang| lang.cmake_name())
        .join(" ");
    match &project.version {
        Some(version) => format!(
            "project({} VERSION {version} LANGUAGES {languages})",
            project.name
        ),
        None => format!("project({} LANGUAGES {languages})", project.name),
    }
}

fn global_options_target(project: &Project) -> String {
    format!("{}_global_options", project.namespace.to_ascii_lowercase())
}

fn global_options_alias(project: &Project) -> String {
    format!("{}::GlobalOptions", project.namespace)
}

/// The centralized global-configuration module: per-language `*_FLAGS_INIT`
/// seeds, feature toggles, and one INTERFACE target carrying global defines,
/// includes, and link options. Per-target files link the interface instead
/// of repeating its contents.
fn render_global_module(project: &Project) -> String {
    let globals = &project.globals;
    let mut out = String::new();
    let _ = writeln!(out, "# Project-wide configuration captured from the Makefiles.");

    let init_pairs = [
        (FlagBucket::C, "CMAKE_C_FLAGS_INIT"),
        (FlagBucket::Cpp, "CMAKE_CXX_FLAGS_INIT"),
        (FlagBucket::Asm, "CMAKE_ASM_FLAGS_INIT"),
    ];
    let all_flags = globals.bucket(FlagBucket::All);
    let mut wrote_flags = false;
    for (bucket, variable) in init_pairs {
        let mut flags: Vec<&str> = globals.bucket(bucket).iter().map(String::as_str).collect();
        flags.extend(all_flags.iter().map(String::as_str));
        if flags.is_empty() {
            continue;
        }
        if !wrote_flags {
            let _ = writeln!(out);
            wrote_flags = true;
        }
        let _ = writeln!(out, "set({variable} \"{}\")", flags.join(" "));
    }

    if !globals.toggles.is_empty() {
        let _ = writeln!(out);
        for (name, toggle) in &globals.toggles {
            match toggle {
                Toggle::Bool(value) => {
                    let state = if *value { "ON" } else { "OFF" };
                    let _ = writeln!(out, "option({name} \"\" {state})");
                }
                Toggle::Text(text) => {
                    let _ = writeln!(out, "set({name} \"{text}\" CACHE STRING \"\")");
                }
            }
        }
    }

    let interface = global_options_target(project);
    let _ = writeln!(out);
    let _ = writeln!(out, "add_library({interface} INTERFACE)");
    let _ = writeln!(
        out,
        "add_library({} ALIAS {interface})",
        global_options_alias(project)
    );
    if !globals.defines.is_empty() {
        let _ = writeln!(
            out,
            "target_compile_definitions({interface} INTERFACE {})",
            globals.defines.join(" ")
        );
    }
    if !globals.includes.is_empty() {
        let rendered = globals
            .includes
            .iter()
            .map(|dir| render_include_dir(dir))
            .join(" ");
        let _ = writeln!(out, "target_include_directories({interface} INTERFACE {rendered})");
    }
    let link_flags = globals.bucket(FlagBucket::Link);
    if !link_flags.is_empty() {
        let _ = writeln!(
            out,
            "target_link_options({interface} INTERFACE {})",
            link_flags.join(" ")
        );
    }
    out
}

fn render_include_dir(dir: &str) -> String {
    if Utf8Path::new(dir).is_absolute() {
        dir.to_owned()
    } else {
        format!("\"${{CMAKE_CURRENT_LIST_DIR}}/{dir}\"")
    }
}

/// One target block, in the fixed property order.
fn render_target(
    target: &Target,
    dir: &Utf8Path,
    project: &Project,
    has_global_module: bool,
    sink: &mut DiagnosticSink,
    unknowns: &mut UnknownRegistry,
) -> String {
    let mut out = String::new();
    let name = &target.name;
    let sources = target
        .sources
        .iter()
        .map(|s| relative_from(&s.path, dir))
        .collect::<Vec<_>>();
    let source_list = sources.iter().map(|s| s.as_str()).join(" ");

    let with_sources = |head: &str| {
        if source_list.is_empty() {
            format!("{head})")
        } else {
            format!("{head} {source_list})")
        }
    };
    match target.ty {
        TargetType::Executable => {
            let _ = writeln!(out, "{}", with_sources(&format!("add_executable({name}")));
        }
        TargetType::StaticLibrary => {
            let _ = writeln!(out, "{}", with_sources(&format!("add_library({name} STATIC")));
        }
        TargetType::SharedLibrary => {
            let _ = writeln!(out, "{}", with_sources(&format!("add_library({name} SHARED")));
        }
        TargetType::ObjectLibrary => {
            let _ = writeln!(out, "{}", with_sources(&format!("add_library({name} OBJECT")));
        }
        TargetType::Interface => {
            let _ = writeln!(out, "add_library({name} INTERFACE)");
        }
        TargetType::Imported => {
            let _ = writeln!(out, "add_library({name} UNKNOWN IMPORTED)");
        }
        TargetType::Custom => {
            if target.custom_commands.is_empty() {
                return render_unmappable(target, sink, unknowns);
            }
            let _ = writeln!(out, "add_custom_target({name}");
            for command in &target.custom_commands {
                for line in &command.commands {
                    let _ = writeln!(out, "  COMMAND {line}");
                }
            }
            let _ = writeln!(out, ")");
        }
    }

    let visibility = if target.ty == TargetType::Interface {
        "INTERFACE"
    } else {
        target.visibility.as_str()
    };
    if !matches!(target.ty, TargetType::Custom | TargetType::Imported) {
        if !target.include_dirs.is_empty() {
            let _ = writeln!(
                out,
                "target_include_directories({name} {visibility} {})",
                target.include_dirs.join(" ")
            );
        }
        if !target.defines.is_empty() {
            let _ = writeln!(
                out,
                "target_compile_definitions({name} {visibility} {})",
                target.defines.join(" ")
            );
        }
        if !target.compile_options.is_empty() {
            let _ = writeln!(
                out,
                "target_compile_options({name} {visibility} {})",
                target.compile_options.join(" ")
            );
        }
        if !target.link_options.is_empty() {
            let _ = writeln!(
                out,
                "target_link_options({name} {visibility} {})",
                target.link_options.join(" ")
            );
        }
        let mut link_labels: Vec<&str> = target
            .link_libraries
            .iter()
            .map(LinkItem::label)
            .collect();
        let global_alias = global_options_alias(project);
        if has_global_module {
            link_labels.push(&global_alias);
        }
        if !link_labels.is_empty() {
            let _ = writeln!(
                out,
                "target_link_libraries({name} {visibility} {})",
                link_labels.join(" ")
            );
        }
    }

    let linked: Vec<&str> = target.link_libraries.iter().map(LinkItem::label).collect();
    let extra_deps: Vec<&str> = target
        .dependencies
        .iter()
        .map(String::as_str)
        .filter(|dep| !linked.contains(dep))
        .collect();
    if !extra_deps.is_empty() {
        let _ = writeln!(out, "add_dependencies({name} {})", extra_deps.join(" "));
    }

    if let Some(alias) = &target.alias {
        let _ = writeln!(out, "add_library({alias} ALIAS {name})");
    }
    out
}

/// A target whose type has no CMake rendering: emit a comment placeholder
/// and record the gap on both side channels.
fn render_unmappable(
    target: &Target,
    sink: &mut DiagnosticSink,
    unknowns: &mut UnknownRegistry,
) -> String {
    sink.push(
        Diagnostic::error(
            DiagCode::EmitUnknownType,
            format!(
                "no CMake rendering for target `{}` (artifact {})",
                target.name, target.artifact
            ),
        )
        .from_stage(Stage::Emit),
    );
    let location = target
        .custom_commands
        .first()
        .map_or_else(
            || crate::location::SourceLocation::line_of(target.artifact.clone(), 1),
            |command| command.location.clone(),
        );
    let draft = UnknownDraft::new(
        UnknownCategory::ToolchainSpecific,
        location,
        format!("{} <- {}", target.artifact, target.name),
        Impact::new(Phase::CmakeGeneration, Severity::Error),
    )
    .status(CmakeStatus::NotGenerated)
    .action(SuggestedAction::ManualCustomCommand);
    unknowns.record(sink, draft);
    format!(
        "# TODO(migration): artifact {} could not be translated; recreate it with add_custom_command.\n",
        target.artifact
    )
}

/// Install/export/package artifacts for `find_package` consumers.
fn render_packaging(project: &Project) -> String {
    let name = &project.name;
    let namespace = &project.namespace;
    let export_set = format!("{name}Targets");
    let mut out = String::new();

    let installable: Vec<&str> = project
        .targets
        .iter()
        .filter(|t| {
            matches!(
                t.ty,
                TargetType::Executable | TargetType::StaticLibrary | TargetType::SharedLibrary
            )
        })
        .map(|t| t.name.as_str())
        .collect();

    let _ = writeln!(out, "include(GNUInstallDirs)");
    if !installable.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "install(TARGETS {}", installable.join(" "));
        let _ = writeln!(out, "  EXPORT {export_set}");
        let _ = writeln!(out, "  RUNTIME DESTINATION \"${{CMAKE_INSTALL_BINDIR}}\"");
        let _ = writeln!(out, "  LIBRARY DESTINATION \"${{CMAKE_INSTALL_LIBDIR}}\"");
        let _ = writeln!(out, "  ARCHIVE DESTINATION \"${{CMAKE_INSTALL_LIBDIR}}\"");
        let _ = writeln!(out, ")");
    }

    let mut header_dirs: Vec<&str> = project
        .globals
        .includes
        .iter()
        .map(String::as_str)
        .filter(|dir| !Utf8Path::new(dir).is_absolute())
        .collect();
    for target in &project.targets {
        for dir in &target.include_dirs {
            if !Utf8Path::new(dir).is_absolute() && !header_dirs.contains(&dir.as_str()) {
                header_dirs.push(dir);
            }
        }
    }
    header_dirs.sort_unstable();
    header_dirs.dedup();
    for dir in header_dirs {
        let _ = writeln!(
            out,
            "install(DIRECTORY {dir}/ DESTINATION \"${{CMAKE_INSTALL_INCLUDEDIR}}\")"
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "install(EXPORT {export_set}");
    let _ = writeln!(out, "  NAMESPACE {namespace}::");
    let _ = writeln!(
        out,
        "  DESTINATION \"${{CMAKE_INSTALL_LIBDIR}}/cmake/{name}\""
    );
    let _ = writeln!(out, ")");
    let _ = writeln!(out, "export(EXPORT {export_set}");
    let _ = writeln!(out, "  NAMESPACE {namespace}::");
    let _ = writeln!(
        out,
        "  FILE \"${{CMAKE_CURRENT_BINARY_DIR}}/{export_set}.cmake\""
    );
    let _ = writeln!(out, ")");
    let _ = writeln!(out, "install(FILES");
    let _ = writeln!(out, "  \"${{CMAKE_CURRENT_LIST_DIR}}/{name}Config.cmake\"");
    let _ = writeln!(
        out,
        "  \"${{CMAKE_CURRENT_LIST_DIR}}/{name}ConfigVersion.cmake\""
    );
    let _ = writeln!(
        out,
        "  DESTINATION \"${{CMAKE_INSTALL_LIBDIR}}/cmake/{name}\""
    );
    let _ = writeln!(out, ")");
    out
}

fn render_package_config(project: &Project) -> String {
    format!(
        "include(\"${{CMAKE_CURRENT_LIST_DIR}}/{}Targets.cmake\")\n",
        project.name
    )
}

fn render_package_version(project: &Project) -> String {
    let version = project.version.as_deref().unwrap_or("0.1.0");
    let mut out = String::new();
    let _ = writeln!(out, "set(PACKAGE_VERSION \"{version}\")");
    let _ = writeln!(out, "if(PACKAGE_VERSION VERSION_LESS PACKAGE_FIND_VERSION)");
    let _ = writeln!(out, "  set(PACKAGE_VERSION_COMPATIBLE FALSE)");
    let _ = writeln!(out, "else()");
    let _ = writeln!(out, "  set(PACKAGE_VERSION_COMPATIBLE TRUE)");
    let _ = writeln!(out, "endif()");
    let _ = writeln!(out, "if(PACKAGE_FIND_VERSION STREQUAL PACKAGE_VERSION)");
    let _ = writeln!(out, "  set(PACKAGE_VERSION_EXACT TRUE)");
    let _ = writeln!(out, "endif()");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::facts::{Language, ProjectGlobals};
    use crate::ir::{SourceFile, Visibility};
    use std::collections::BTreeSet;

    fn simple_project() -> Project {
        let mut app = Target::new("app", TargetType::Executable, Utf8PathBuf::from("app"));
        app.sources.push(SourceFile {
            path: Utf8PathBuf::from("main.c"),
            language: Language::C,
            flags: Vec::new(),
        });
        app.visibility = Visibility::Private;
        Project {
            name: "Demo".to_owned(),
            version: None,
            namespace: "Demo".to_owned(),
            languages: BTreeSet::from([Language::C]),
            targets: vec![app],
            globals: ProjectGlobals::default(),
        }
    }

    fn generate_for(project: &Project, packaging: bool) -> Vec<GeneratedFile> {
        let mut sink = DiagnosticSink::new();
        let mut unknowns = UnknownRegistry::new();
        let options = EmitOptions {
            output_dir: Utf8PathBuf::from("/out"),
            packaging,
        };
        let files = generate(project, &options, &mut sink, &mut unknowns);
        assert!(!sink.any_error(), "unexpected emit errors: {sink:?}");
        files
    }

    #[test]
    fn single_executable_renders_in_root() {
        let files = generate_for(&simple_project(), false);
        assert_eq!(files.len(), 1);
        let root = &files[0];
        assert_eq!(root.path, Utf8PathBuf::from("/out/CMakeLists.txt"));
        assert!(root.content.contains("cmake_minimum_required(VERSION 3.20)"));
        assert!(root.content.contains("project(Demo LANGUAGES C)"));
        assert!(root.content.contains("add_executable(app main.c)"));
    }

    #[test]
    fn generation_is_deterministic() {
        let project = simple_project();
        let first = generate_for(&project, true);
        let second = generate_for(&project, true);
        assert_eq!(first, second);
    }

    #[test]
    fn subdir_targets_get_their_own_file() {
        let mut project = simple_project();
        let mut lib = Target::new(
            "util",
            TargetType::StaticLibrary,
            Utf8PathBuf::from("libutil.a"),
        );
        lib.alias = Some("Demo::util".to_owned());
        lib.sources.push(SourceFile {
            path: Utf8PathBuf::from("src/util.c"),
            language: Language::C,
            flags: Vec::new(),
        });
        project.targets.push(lib);
        let files = generate_for(&project, false);
        assert_eq!(files.len(), 2);
        let root = &files[0].content;
        assert!(root.contains("add_subdirectory(src)"));
        let sub = files
            .iter()
            .find(|f| f.path == Utf8PathBuf::from("/out/src/CMakeLists.txt"))
            .expect("subdir file");
        assert!(sub.content.contains("add_library(util STATIC util.c)"));
        assert!(sub.content.contains("add_library(Demo::util ALIAS util)"));
    }

    #[test]
    fn unmappable_target_reports_both_channels() {
        let mut project = simple_project();
        project.targets.push(Target::new(
            "gen",
            TargetType::Custom,
            Utf8PathBuf::from("gen.dat"),
        ));
        let mut sink = DiagnosticSink::new();
        let mut unknowns = UnknownRegistry::new();
        let options = EmitOptions {
            output_dir: Utf8PathBuf::from("/out"),
            packaging: false,
        };
        let files = generate(&project, &options, &mut sink, &mut unknowns);
        assert!(sink.iter().any(|d| d.code == DiagCode::EmitUnknownType));
        assert_eq!(unknowns.len(), 1);
        let uc = unknowns.iter().next().expect("unknown");
        assert_eq!(uc.category, UnknownCategory::ToolchainSpecific);
        assert_eq!(uc.suggested_action, SuggestedAction::ManualCustomCommand);
        assert!(files[0].content.contains("# TODO(migration)"));
    }

    #[test]
    fn packaging_emits_export_set_and_package_files() {
        let files = generate_for(&simple_project(), true);
        let root = &files[0].content;
        assert!(root.contains("install(TARGETS app"));
        assert!(root.contains("EXPORT DemoTargets"));
        assert!(root.contains("install(EXPORT DemoTargets"));
        assert!(root.contains("NAMESPACE Demo::"));
        assert!(files
            .iter()
            .any(|f| f.path == Utf8PathBuf::from("/out/DemoConfig.cmake")));
        assert!(files
            .iter()
            .any(|f| f.path == Utf8PathBuf::from("/out/DemoConfigVersion.cmake")));
    }
}
