//! Build facts + configuration → validated [`Project`] IR.
//!
//! Responsibilities, in order: instantiate pattern rules, group tool facts
//! by output artifact, fold intermediate objects into their consumers,
//! assign physical names and aliases, classify link references, apply the
//! user configuration, attach dependencies, dedup against project globals,
//! order everything deterministically, and validate the result.

use crate::config::{ConversionConfig, LinkClassification};
use crate::diagnostics::{DiagCode, Diagnostic, DiagnosticSink, Severity, Stage};
use crate::eval::compile;
use crate::eval::facts::{BuildFacts, EvaluatedRule, InferredCompile, Language, ToolKind};
use crate::ir::cycle;
use crate::ir::model::{
    CustomCommand, LinkItem, Project, SourceFile, Target, TargetType, Visibility,
};
use crate::ir::patterns;
use crate::location::SourceLocation;
use crate::unknown::{Impact, Phase, UnknownCategory, UnknownDraft, UnknownRegistry};
use crate::workspace::{normalize, relative_from, to_posix};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashMap};

const RESERVED_TARGET_NAMES: &[&str] = &["all", "clean", "install", "test", "check", "distclean"];

const SOURCEISH_EXTENSIONS: &[&str] = &[
    "c", "cc", "cpp", "cxx", "c++", "m", "mm", "s", "asm", "h", "hh", "hpp", "hxx", "inc", "inl",
    "o", "obj", "d",
];

/// Transform evaluated facts into the project IR.
pub fn build_project(
    facts: &BuildFacts,
    config: &ConversionConfig,
    source_dir: &Utf8Path,
    sink: &mut DiagnosticSink,
    unknowns: &mut UnknownRegistry,
) -> Project {
    let project_name = config.project_name.clone().unwrap_or_else(|| {
        source_dir
            .file_name()
            .map_or_else(|| "project".to_owned(), str::to_owned)
    });
    let namespace = config.resolved_namespace(&project_name);
    let builder = ProjectBuilder {
        facts,
        config,
        source_dir,
        sink,
        unknowns,
        namespace,
    };
    builder.build(project_name)
}

struct ProjectBuilder<'a> {
    facts: &'a BuildFacts,
    config: &'a ConversionConfig,
    source_dir: &'a Utf8Path,
    sink: &'a mut DiagnosticSink,
    unknowns: &'a mut UnknownRegistry,
    namespace: String,
}

/// Accumulated facts for one output artifact before it becomes a target.
#[derive(Debug)]
struct ArtifactAcc {
    artifact: Utf8PathBuf,
    ty: TargetType,
    location: SourceLocation,
    sources: Vec<SourceFile>,
    /// Object files consumed at link/archive time; folded away later.
    objects: Vec<Utf8PathBuf>,
    /// Library files referenced at link time (`libfoo.a`, `/usr/lib/libz.so`).
    lib_refs: Vec<String>,
    /// Bare `-l` names.
    lib_tokens: Vec<String>,
    include_dirs: Vec<String>,
    defines: Vec<String>,
    compile_options: Vec<String>,
    link_options: Vec<String>,
    languages: BTreeSet<Language>,
}

impl ArtifactAcc {
    fn new(artifact: Utf8PathBuf, location: SourceLocation) -> Self {
        let ty = type_of_artifact(&artifact);
        Self {
            artifact,
            ty,
            location,
            sources: Vec::new(),
            objects: Vec::new(),
            lib_refs: Vec::new(),
            lib_tokens: Vec::new(),
            include_dirs: Vec::new(),
            defines: Vec::new(),
            compile_options: Vec::new(),
            link_options: Vec::new(),
            languages: BTreeSet::new(),
        }
    }

    fn add_source(&mut self, path: Utf8PathBuf, language: Language) {
        if language != Language::Other {
            self.languages.insert(language);
        }
        if let Some(existing) = self.sources.iter_mut().find(|s| s.path == path) {
            // I5: duplicates collapse; per-file flags merge by set union.
            if existing.language == Language::Other {
                existing.language = language;
            }
            return;
        }
        self.sources.push(SourceFile {
            path,
            language,
            flags: Vec::new(),
        });
    }
}

impl ProjectBuilder<'_> {
    fn build(mut self, project_name: String) -> Project {
        let instantiated = patterns::instantiate(&self.facts.rules);
        self.report_unmappable_patterns();

        let mut compiles: Vec<InferredCompile> = self.facts.compiles.clone();
        for rule in &instantiated {
            compiles.extend(compile::infer_from_rule(rule, &mut *self.sink));
        }
        compiles.retain(|c| {
            !c.output.as_str().is_empty()
                && !self.config.should_ignore(c.source.as_str())
                && !self.config.should_ignore(c.output.as_str())
        });

        let mut groups = self.group_by_artifact(&compiles);
        let consumed = self.fold_objects(&mut groups);

        let mut all_rules: Vec<&EvaluatedRule> = self
            .facts
            .rules
            .iter()
            .filter(|r| !r.is_pattern)
            .collect();
        all_rules.extend(instantiated.iter());

        let mut targets = self.finish_targets(groups);
        self.add_custom_targets(&mut targets);
        self.apply_target_mappings(&mut targets);
        self.apply_flag_mappings(&mut targets);
        self.dedup_against_globals(&mut targets);
        self.attach_dependencies(&mut targets, &all_rules, &consumed);

        order_targets(&mut targets);
        let languages = self.resolve_languages(&targets);
        self.validate(&targets);

        Project {
            name: project_name,
            version: self.config.version.clone(),
            namespace: self.namespace,
            languages,
            targets,
            globals: self.facts.globals.clone(),
        }
    }

    /// Pattern rules whose target form has no single stem cannot be
    /// instantiated; record them for manual follow-up.
    fn report_unmappable_patterns(&mut self) {
        for rule in self.facts.rules.iter().filter(|r| r.is_pattern) {
            let Some(target) = rule.targets.first() else {
                continue;
            };
            if target.matches('%').count() != 1 {
                let draft = UnknownDraft::new(
                    UnknownCategory::Other,
                    rule.location.clone(),
                    format!("{}: {}", target, rule.prerequisites.join(" ")),
                    Impact::new(Phase::BuildGraph, Severity::Warn),
                );
                self.unknowns.record(self.sink, draft);
            }
        }
    }

    fn group_by_artifact(&mut self, compiles: &[InferredCompile]) -> IndexMap<Utf8PathBuf, ArtifactAcc> {
        let mut groups: IndexMap<Utf8PathBuf, ArtifactAcc> = IndexMap::new();
        for record in compiles {
            let artifact = self.rel_to_root(&record.output);
            let acc = groups
                .entry(artifact.clone())
                .or_insert_with(|| ArtifactAcc::new(artifact, record.location.clone()));
            let source = self.rel_to_root(&record.source);
            match record.kind {
                ToolKind::Compile => {
                    if !source.as_str().is_empty() {
                        acc.add_source(source, record.language);
                    }
                    for dir in &record.include_dirs {
                        push_unique(&mut acc.include_dirs, dir);
                    }
                    for def in &record.defines {
                        push_unique(&mut acc.defines, def);
                    }
                    for flag in &record.flags {
                        push_unique(&mut acc.compile_options, flag);
                    }
                }
                ToolKind::Link | ToolKind::Archive => {
                    if !source.as_str().is_empty() {
                        let ext = source.extension().map(str::to_owned);
                        match ext.as_deref() {
                            Some("o" | "obj") => acc.objects.push(source),
                            Some("a" | "lib" | "so" | "dylib") => {
                                push_unique(&mut acc.lib_refs, source.as_str());
                            }
                            _ => acc.add_source(source, record.language),
                        }
                    }
                    for lib in &record.libs {
                        push_unique(&mut acc.lib_tokens, lib);
                    }
                    for flag in &record.flags {
                        push_unique(&mut acc.link_options, flag);
                    }
                    for dir in &record.include_dirs {
                        push_unique(&mut acc.include_dirs, dir);
                    }
                    for def in &record.defines {
                        push_unique(&mut acc.defines, def);
                    }
                }
            }
        }
        groups
    }

    /// Replace consumed object artifacts with their true sources. An object
    /// produced by the project and referenced by exactly this consumer
    /// disappears from the target list; unconsumed objects survive as
    /// object libraries. Returns the set of folded-away artifact paths.
    fn fold_objects(&mut self, groups: &mut IndexMap<Utf8PathBuf, ArtifactAcc>) -> BTreeSet<Utf8PathBuf> {
        #[derive(Default)]
        struct Merged {
            sources: Vec<(Utf8PathBuf, Language)>,
            include_dirs: Vec<String>,
            defines: Vec<String>,
            compile_options: Vec<String>,
        }

        fn collect(
            groups: &IndexMap<Utf8PathBuf, ArtifactAcc>,
            object: &Utf8Path,
            merged: &mut Merged,
            visited: &mut BTreeSet<Utf8PathBuf>,
        ) {
            if !visited.insert(object.to_owned()) {
                return;
            }
            let Some(acc) = groups.get(object) else {
                // No producing rule; keep the object itself as an input.
                merged.sources.push((object.to_owned(), Language::Other));
                return;
            };
            for source in &acc.sources {
                merged.sources.push((source.path.clone(), source.language));
            }
            merged.include_dirs.extend(acc.include_dirs.iter().cloned());
            merged.defines.extend(acc.defines.iter().cloned());
            merged
                .compile_options
                .extend(acc.compile_options.iter().cloned());
            for nested in &acc.objects {
                collect(groups, nested, merged, visited);
            }
        }

        let mut consumed: BTreeSet<Utf8PathBuf> = BTreeSet::new();
        let consumers: Vec<Utf8PathBuf> = groups.keys().cloned().collect();
        for key in consumers {
            let objects = match groups.get(&key) {
                Some(acc) if !acc.objects.is_empty() => acc.objects.clone(),
                _ => continue,
            };
            let mut merged = Merged::default();
            let mut visited = BTreeSet::from([key.clone()]);
            for object in &objects {
                if groups.get(object).is_some_and(|acc| acc.ty == TargetType::ObjectLibrary) {
                    consumed.insert(object.clone());
                }
                collect(groups, object, &mut merged, &mut visited);
            }
            let acc = groups.get_mut(&key).expect("consumer present");
            acc.objects.clear();
            for (path, language) in merged.sources {
                acc.add_source(path, language);
            }
            for dir in merged.include_dirs {
                push_unique(&mut acc.include_dirs, &dir);
            }
            for def in merged.defines {
                push_unique(&mut acc.defines, &def);
            }
            for flag in merged.compile_options {
                push_unique(&mut acc.compile_options, &flag);
            }
        }
        for object in &consumed {
            groups.shift_remove(object);
        }
        consumed
    }

    fn finish_targets(&mut self, groups: IndexMap<Utf8PathBuf, ArtifactAcc>) -> Vec<Target> {
        // First pass so internal references can resolve across targets.
        let produced: BTreeMap<String, String> = groups
            .values()
            .map(|acc| {
                let logical = logical_name(&acc.artifact, acc.ty);
                let reference = if acc.ty.is_library() && self.is_internal(&logical) {
                    format!("{}::{}", self.namespace, logical)
                } else {
                    logical.clone()
                };
                (logical, reference)
            })
            .collect();

        let mut targets = Vec::with_capacity(groups.len());
        for (_, acc) in groups {
            let logical = logical_name(&acc.artifact, acc.ty);
            let internal = self.is_internal(&logical);
            let mut target = Target::new(logical.clone(), acc.ty, acc.artifact);
            target.sources = acc.sources;
            target.include_dirs = acc.include_dirs;
            target.defines = acc.defines;
            target.compile_options = acc.compile_options;
            target.link_options = acc.link_options;
            if acc.ty.is_library() && internal {
                target.alias = Some(format!("{}::{logical}", self.namespace));
            }
            for reference in acc.lib_tokens.iter().chain(acc.lib_refs.iter()) {
                let item = self.classify_link(reference, &produced);
                if !target.link_libraries.contains(&item) {
                    target.link_libraries.push(item);
                }
            }
            targets.push(target);
        }
        targets
    }

    fn is_internal(&self, logical: &str) -> bool {
        match self.config.link_override(logical) {
            Some(over) => over.classification == LinkClassification::Internal,
            None => true,
        }
    }

    /// Library-role classification, in configured-override → internal →
    /// bare-token → path order.
    fn classify_link(&self, reference: &str, produced: &BTreeMap<String, String>) -> LinkItem {
        let logical = link_reference_logical_name(reference);
        if let Some(over) = self
            .config
            .link_override(reference)
            .or_else(|| self.config.link_override(&logical))
        {
            return match over.classification {
                LinkClassification::Internal => LinkItem::Internal {
                    alias: over
                        .alias
                        .clone()
                        .unwrap_or_else(|| format!("{}::{logical}", self.namespace)),
                },
                LinkClassification::External => LinkItem::External {
                    token: reference.to_owned(),
                },
                LinkClassification::Imported => LinkItem::Imported {
                    target: over
                        .imported_target
                        .clone()
                        .unwrap_or_else(|| reference.to_owned()),
                },
            };
        }
        if let Some(internal_ref) = produced.get(&logical) {
            if internal_ref.contains("::") {
                return LinkItem::Internal {
                    alias: internal_ref.clone(),
                };
            }
        }
        if reference.contains("::") {
            return LinkItem::Imported {
                target: reference.to_owned(),
            };
        }
        LinkItem::External {
            token: reference.to_owned(),
        }
    }

    fn add_custom_targets(&mut self, targets: &mut Vec<Target>) {
        for rule in &self.facts.custom_commands {
            let Some(first_target) = rule.targets.first() else {
                continue;
            };
            if first_target.starts_with('.')
                || RESERVED_TARGET_NAMES.contains(&first_target.as_str())
            {
                continue;
            }
            let name = sanitize_target_name(first_target);
            if targets.iter().any(|t| t.name == name) {
                continue;
            }
            let mut target = Target::new(
                name,
                TargetType::Custom,
                Utf8PathBuf::from(first_target.as_str()),
            );
            target.custom_commands.push(CustomCommand {
                commands: rule.recipe.iter().map(|c| c.text.clone()).collect(),
                location: rule.location.clone(),
            });
            targets.push(target);
        }
    }

    fn apply_target_mappings(&mut self, targets: &mut [Target]) {
        let produced: BTreeMap<String, String> = targets
            .iter()
            .filter_map(|t| t.alias.clone().map(|alias| (t.name.clone(), alias)))
            .collect();
        for target in targets.iter_mut() {
            let keys = [
                target.name.clone(),
                target
                    .artifact
                    .file_stem()
                    .unwrap_or_default()
                    .to_owned(),
                target
                    .artifact
                    .file_name()
                    .unwrap_or_default()
                    .to_owned(),
            ];
            let Some(mapping) = keys
                .iter()
                .find_map(|key| self.config.target_mappings.get(key.as_str()))
            else {
                continue;
            };
            target.name = mapping.dest_name.clone();
            if let Some(ty) = mapping
                .type_override
                .as_deref()
                .and_then(TargetType::from_config_name)
            {
                target.ty = ty;
                if matches!(ty, TargetType::Interface | TargetType::Imported)
                    && !target.sources.is_empty()
                {
                    self.sink.push(
                        Diagnostic::warn(
                            DiagCode::ConfigSchema,
                            format!(
                                "target `{}` was overridden to a sourceless type; dropping {} source file(s)",
                                target.name,
                                target.sources.len()
                            ),
                        )
                        .from_stage(Stage::BuildGraph),
                    );
                    target.sources.clear();
                }
            }
            // Alias follows the (possibly renamed) logical identity.
            if target.ty.is_library() && self.is_internal(&target.name) {
                target.alias = Some(format!("{}::{}", self.namespace, target.name));
            } else {
                target.alias = None;
            }
            for lib in &mapping.link_libs {
                let item = self.classify_link(lib, &produced);
                if !target.link_libraries.contains(&item) {
                    target.link_libraries.push(item);
                }
            }
            for dir in &mapping.include_dirs {
                push_unique(&mut target.include_dirs, dir);
            }
            for def in &mapping.defines {
                push_unique(&mut target.defines, def);
            }
            for option in &mapping.options {
                push_unique(&mut target.compile_options, option);
            }
            if let Some(vis) = mapping
                .visibility
                .as_deref()
                .and_then(Visibility::from_config_name)
            {
                target.visibility = vis;
            }
        }
    }

    /// Textual flag substitution with first-occurrence-order dedup. Flags
    /// with no mapping pass through and are reported once each, but only
    /// when a mapping table was configured at all.
    fn apply_flag_mappings(&mut self, targets: &mut [Target]) {
        if self.config.flag_mappings.is_empty() {
            return;
        }
        let mut unmatched: BTreeSet<String> = BTreeSet::new();
        for target in targets.iter_mut() {
            for options in [&mut target.compile_options, &mut target.link_options] {
                let mut mapped: Vec<String> = Vec::with_capacity(options.len());
                for flag in options.drain(..) {
                    let replacement = match self.config.flag_mappings.get(&flag) {
                        Some(replacement) => replacement.clone(),
                        None => {
                            unmatched.insert(flag.clone());
                            flag
                        }
                    };
                    if !replacement.is_empty() && !mapped.contains(&replacement) {
                        mapped.push(replacement);
                    }
                }
                *options = mapped;
            }
        }
        for flag in unmatched {
            self.sink.push(
                Diagnostic::warn(
                    DiagCode::IrUnmappedFlag,
                    format!("no flag mapping for `{flag}`; passed through verbatim"),
                )
                .from_stage(Stage::BuildGraph),
            );
        }
    }

    /// I6: a flag already provided by the project-global configuration is
    /// removed from the target, reported once per (target, flag) pair.
    fn dedup_against_globals(&mut self, targets: &mut [Target]) {
        use crate::eval::facts::FlagBucket;
        let globals = &self.facts.globals;
        for target in targets.iter_mut() {
            let mut buckets = vec![FlagBucket::All];
            for source in &target.sources {
                match source.language {
                    Language::C => buckets.push(FlagBucket::C),
                    Language::Cpp => buckets.push(FlagBucket::Cpp),
                    Language::Asm => buckets.push(FlagBucket::Asm),
                    Language::Other => {}
                }
            }
            let global_flags: BTreeSet<&str> = buckets
                .iter()
                .flat_map(|b| globals.bucket(*b).iter().map(String::as_str))
                .collect();
            let name = target.name.clone();
            retain_reporting(&mut target.compile_options, &global_flags, |flag, sink| {
                report_global_overlap(sink, &name, flag);
            }, self.sink);

            // A compiler flag handed to the driver at link time is still the
            // same global flag; dedup it from the link options too.
            let mut link_flags: BTreeSet<&str> = globals
                .bucket(FlagBucket::Link)
                .iter()
                .map(String::as_str)
                .collect();
            link_flags.extend(global_flags.iter());
            retain_reporting(&mut target.link_options, &link_flags, |flag, sink| {
                report_global_overlap(sink, &name, flag);
            }, self.sink);

            let global_includes: BTreeSet<&str> =
                globals.includes.iter().map(String::as_str).collect();
            retain_reporting(&mut target.include_dirs, &global_includes, |dir, sink| {
                report_global_overlap(sink, &name, dir);
            }, self.sink);

            let global_defines: BTreeSet<&str> =
                globals.defines.iter().map(String::as_str).collect();
            retain_reporting(&mut target.defines, &global_defines, |def, sink| {
                report_global_overlap(sink, &name, def);
            }, self.sink);
        }
    }

    fn attach_dependencies(
        &mut self,
        targets: &mut [Target],
        rules: &[&EvaluatedRule],
        consumed: &BTreeSet<Utf8PathBuf>,
    ) {
        let mut lookup: HashMap<String, usize> = HashMap::new();
        for (idx, target) in targets.iter().enumerate() {
            lookup.entry(target.name.clone()).or_insert(idx);
            if let Some(alias) = &target.alias {
                lookup.entry(alias.clone()).or_insert(idx);
            }
            lookup.entry(target.artifact.as_str().to_owned()).or_insert(idx);
            if let Some(file_name) = target.artifact.file_name() {
                lookup.entry(file_name.to_owned()).or_insert(idx);
            }
        }

        for rule in rules {
            let Some(primary) = rule.targets.first() else {
                continue;
            };
            let primary = self.rel_to_root(Utf8Path::new(primary));
            let Some(&idx) = lookup
                .get(primary.as_str())
                .or_else(|| primary.file_name().and_then(|n| lookup.get(n)))
            else {
                continue;
            };
            let mut new_deps = Vec::new();
            {
                let target = &targets[idx];
                for prereq in &rule.prerequisites {
                    let normalized = self.rel_to_root(Utf8Path::new(prereq));
                    if consumed.contains(&normalized)
                        || target.sources.iter().any(|s| s.path == normalized)
                    {
                        continue;
                    }
                    match lookup
                        .get(normalized.as_str())
                        .or_else(|| normalized.file_name().and_then(|n| lookup.get(n)))
                    {
                        Some(&dep_idx) if dep_idx != idx => {
                            let dep = &targets[dep_idx];
                            let dep_name = dep.alias.clone().unwrap_or_else(|| dep.name.clone());
                            if !new_deps.contains(&dep_name) {
                                new_deps.push(dep_name);
                            }
                        }
                        Some(_) => {}
                        None => {
                            if is_sourceish(&normalized) {
                                continue;
                            }
                            self.sink.push(
                                Diagnostic::warn(
                                    DiagCode::IrUnknownDep,
                                    format!(
                                        "prerequisite `{prereq}` of `{}` does not resolve to a project target",
                                        targets[idx].name
                                    ),
                                )
                                .at(rule.location.clone())
                                .from_stage(Stage::BuildGraph),
                            );
                            if !new_deps.contains(prereq) {
                                new_deps.push(prereq.clone());
                            }
                        }
                    }
                }
            }
            let target = &mut targets[idx];
            for dep in new_deps {
                if !target.dependencies.contains(&dep) {
                    target.dependencies.push(dep);
                }
            }
        }
    }

    fn resolve_languages(&mut self, targets: &[Target]) -> BTreeSet<Language> {
        if let Some(configured) = &self.config.languages {
            let mut set = BTreeSet::new();
            for name in configured {
                match parse_language(name) {
                    Some(lang) => {
                        set.insert(lang);
                    }
                    None => self.sink.push(
                        Diagnostic::warn(
                            DiagCode::ConfigSchema,
                            format!("unrecognized language `{name}` in configuration"),
                        )
                        .from_stage(Stage::BuildGraph),
                    ),
                }
            }
            if !set.is_empty() {
                return set;
            }
        }
        let mut set: BTreeSet<Language> = targets
            .iter()
            .flat_map(|t| t.sources.iter().map(|s| s.language))
            .filter(|lang| *lang != Language::Other)
            .collect();
        if set.is_empty() {
            set.insert(Language::C);
        }
        set
    }

    fn validate(&mut self, targets: &[Target]) {
        let mut seen = BTreeSet::new();
        for target in targets {
            if !seen.insert(target.name.as_str()) {
                self.sink.push(
                    Diagnostic::error(
                        DiagCode::IrDupTarget,
                        format!("duplicate target name `{}`", target.name),
                    )
                    .from_stage(Stage::BuildGraph),
                );
            }
            debug_assert_eq!(
                target.alias.is_some(),
                target.ty.is_library() && self.is_internal(&target.name),
                "aliases exist exactly on internal libraries",
            );
        }

        let alias_to_name: HashMap<&str, &str> = targets
            .iter()
            .filter_map(|t| t.alias.as_deref().map(|a| (a, t.name.as_str())))
            .collect();
        let edges: BTreeMap<String, Vec<String>> = targets
            .iter()
            .map(|t| {
                let deps = t
                    .dependencies
                    .iter()
                    .map(|d| {
                        alias_to_name
                            .get(d.as_str())
                            .map_or_else(|| d.clone(), |n| (*n).to_owned())
                    })
                    .collect();
                (t.name.clone(), deps)
            })
            .collect();
        if let Some(cycle_path) = cycle::find_cycle(&edges) {
            self.sink.push(
                Diagnostic::error(
                    DiagCode::IrCycle,
                    format!("target dependency cycle: {}", cycle_path.join(" -> ")),
                )
                .from_stage(Stage::BuildGraph),
            );
        }
    }

    /// Posix-normalize and make relative to the source root when within it.
    fn rel_to_root(&self, path: &Utf8Path) -> Utf8PathBuf {
        let posix = normalize(&to_posix(path));
        if posix.is_absolute() {
            let relative = relative_from(&posix, self.source_dir);
            if relative.as_str().starts_with("..") {
                return posix;
            }
            return relative;
        }
        posix
    }
}

fn report_global_overlap(sink: &mut DiagnosticSink, target: &str, value: &str) {
    sink.push(
        Diagnostic::info(
            DiagCode::IrGlobalFlagOverlap,
            format!("`{value}` on target `{target}` already comes from the global configuration"),
        )
        .from_stage(Stage::BuildGraph),
    );
}

fn retain_reporting(
    values: &mut Vec<String>,
    provided: &BTreeSet<&str>,
    report: impl Fn(&str, &mut DiagnosticSink),
    sink: &mut DiagnosticSink,
) {
    if provided.is_empty() {
        return;
    }
    values.retain(|value| {
        if provided.contains(value.as_str()) {
            report(value, sink);
            false
        } else {
            true
        }
    });
}

fn order_targets(targets: &mut [Target]) {
    targets.sort_by(|a, b| a.name.cmp(&b.name));
    for target in targets.iter_mut() {
        target.sources.sort_by(|a, b| a.path.cmp(&b.path));
        target
            .link_libraries
            .sort_by(|a, b| (a.partition(), a.label()).cmp(&(b.partition(), b.label())));
        target.dependencies.sort();
    }
}

fn type_of_artifact(artifact: &Utf8Path) -> TargetType {
    match artifact.extension() {
        Some("a" | "lib") => TargetType::StaticLibrary,
        Some("so" | "dylib" | "dll") => TargetType::SharedLibrary,
        Some("o" | "obj") => TargetType::ObjectLibrary,
        Some("exe") | None => TargetType::Executable,
        Some(_) => TargetType::Custom,
    }
}

/// Sanitized artifact stem; libraries drop their `lib` prefix.
fn logical_name(artifact: &Utf8Path, ty: TargetType) -> String {
    let stem = artifact.file_stem().unwrap_or("target");
    let stem = if ty.is_library() {
        stem.strip_prefix("lib").filter(|s| !s.is_empty()).unwrap_or(stem)
    } else {
        stem
    };
    sanitize_target_name(stem)
}

/// The logical library name behind a link reference: `-l` tokens arrive
/// already stripped, file references lose directory, extension, and the
/// `lib` prefix.
fn link_reference_logical_name(reference: &str) -> String {
    let base = reference.rsplit('/').next().unwrap_or(reference);
    let stem = Utf8Path::new(base).file_stem().unwrap_or(base);
    let stem = stem.strip_prefix("lib").filter(|s| !s.is_empty()).unwrap_or(stem);
    sanitize_target_name(stem)
}

fn sanitize_target_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "target".to_owned()
    } else {
        cleaned
    }
}

fn parse_language(name: &str) -> Option<Language> {
    match name.to_ascii_lowercase().as_str() {
        "c" => Some(Language::C),
        "cpp" | "cxx" | "c++" => Some(Language::Cpp),
        "asm" | "s" => Some(Language::Asm),
        _ => None,
    }
}

fn is_sourceish(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| SOURCEISH_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !list.iter().any(|existing| existing == value) {
        list.push(value.to_owned());
    }
}
