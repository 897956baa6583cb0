// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bundle serialization.
//!
//! Container bundles (`run_module = true`) are prefixed with the `__EARLY_SHARED__` and
//! `__EARLY_REMOTES__` lists read by the host bootstrap and the container `init`. Split
//! bundles of project source record their synchronous shared/remote dependencies under
//! the federation namespace, keyed by bundle path, so the bundle loader can preload them.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::classifier::{DependencyClassifier, SyncDependencies};
use crate::codegen::{Expr, Stmt};
use crate::config::NormalizedConfig;
use crate::error::{FederationError, Result};
use crate::graph::{Dependency, DependencyGraph, Module};
use crate::paths::to_posix;

/// Assigns stable numeric ids to module paths
#[derive(Debug, Default)]
pub struct ModuleIdFactory {
    ids: Mutex<HashMap<PathBuf, u32>>,
}

impl ModuleIdFactory {
    /// Create an empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `path`, allocated on first request
    pub fn id(&self, path: &Path) -> u32 {
        let mut ids = self.ids.lock();
        let next = ids.len() as u32;
        *ids.entry(path.to_path_buf()).or_insert(next)
    }
}

/// Options of a single serialization request
#[derive(Debug, Clone, Default)]
pub struct SerializerOptions {
    /// Project root
    pub project_root: PathBuf,
    /// Prefix of the module system globals (`<prefix>__d`, `<prefix>__r`)
    pub global_prefix: String,
    /// Append the statement running the entry module
    pub run_module: bool,
    /// Skip pre-modules (polyfills, module system)
    pub modules_only: bool,
    /// Modules required before the entry
    pub run_before_main_module: Vec<PathBuf>,
    /// Development build: verbose module names
    pub dev: bool,
    /// `//# sourceMappingURL=` target
    pub source_map_url: Option<String>,
    /// `//# sourceURL=` target
    pub source_url: Option<String>,
}

/// Serialized parts of a bundle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    /// Scripts run before the module table
    pub pre: String,
    /// Module definitions ordered by id
    pub modules: Vec<(u32, String)>,
    /// Run statements and trailing comments
    pub post: String,
}

impl Bundle {
    /// Concatenate into the final bundle text
    pub fn to_code(&self) -> String {
        let mut parts = Vec::with_capacity(self.modules.len() + 2);
        if !self.pre.is_empty() {
            parts.push(self.pre.as_str());
        }
        parts.extend(self.modules.iter().map(|(_, code)| code.as_str()));
        if !self.post.is_empty() {
            parts.push(self.post.as_str());
        }
        parts.join("\n")
    }
}

/// A lazily loaded bundle produced by [`BundleSerializer::serialize_split`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitBundle {
    /// Bundle path relative to the project root, without extension
    pub id: String,
    /// Root module of the bundle
    pub entry: PathBuf,
    /// Bundle text
    pub code: String,
}

/// Main bundle plus one bundle per dynamically imported module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutput {
    /// Bundle of the entry point
    pub main: String,
    /// Lazily loaded bundles
    pub lazy: Vec<SplitBundle>,
}

/// Federation-aware bundle serializer
pub struct BundleSerializer {
    config: Arc<NormalizedConfig>,
    classifier: DependencyClassifier,
    ids: ModuleIdFactory,
}

impl BundleSerializer {
    /// Create a serializer; `init_host` is excluded from shared classification.
    pub fn new(config: Arc<NormalizedConfig>, init_host: impl Into<PathBuf>) -> Self {
        let classifier = DependencyClassifier::from_config(&config, init_host);
        Self {
            config,
            classifier,
            ids: ModuleIdFactory::new(),
        }
    }

    /// Module id allocator shared by every bundle of this build
    pub fn ids(&self) -> &ModuleIdFactory {
        &self.ids
    }

    /// Serialize one bundle.
    pub fn serialize(
        &self,
        entry: &Path,
        pre_modules: &[Module],
        graph: &DependencyGraph,
        options: &SerializerOptions,
    ) -> Result<String> {
        let deps = self.classifier.classify(graph, entry);

        if options.run_module {
            let mut pre = Vec::with_capacity(pre_modules.len() + 2);
            pre.push(early_list("__early_shared__", "__EARLY_SHARED__", &deps.shared));
            pre.push(early_list("__early_remotes__", "__EARLY_REMOTES__", &deps.remotes));
            pre.extend_from_slice(pre_modules);
            return Ok(self.base_bundle(entry, &pre, graph, options)?.to_code());
        }

        if !is_project_source(entry, &options.project_root) {
            return Ok(self.base_bundle(entry, pre_modules, graph, options)?.to_code());
        }

        let bundle_path = bundle_path(entry, &options.project_root);
        debug!("Recording federation deps for split bundle {}", bundle_path);

        let mut pre = vec![self.sync_dependencies(&bundle_path, &deps)];
        if !options.modules_only {
            pre.extend_from_slice(pre_modules);
        }

        // the base builder drops every pre-module in modules-only mode
        let options = SerializerOptions {
            modules_only: false,
            ..options.clone()
        };
        Ok(self.base_bundle(entry, &pre, graph, &options)?.to_code())
    }

    /// Serialize the entry bundle plus one lazy bundle per dynamically imported module.
    pub fn serialize_split(
        &self,
        entry: &Path,
        pre_modules: &[Module],
        graph: &DependencyGraph,
        options: &SerializerOptions,
    ) -> Result<SplitOutput> {
        let mut main_paths: HashSet<PathBuf> = HashSet::new();
        let roots = std::iter::once(entry).chain(options.run_before_main_module.iter().map(PathBuf::as_path));
        for root in roots {
            for module in graph.reachable(root, Dependency::is_sync) {
                main_paths.insert(module.path.clone());
            }
        }

        let main_graph = filter_graph(graph, |module| main_paths.contains(&module.path));
        let main = self.serialize(entry, pre_modules, &main_graph, options)?;

        let lazy_options = SerializerOptions {
            run_module: false,
            modules_only: true,
            run_before_main_module: Vec::new(),
            ..options.clone()
        };

        let mut lazy = Vec::new();
        for root in graph.lazy_roots() {
            if main_paths.contains(root) {
                continue;
            }
            let lazy_paths: HashSet<&Path> = graph
                .reachable(root, Dependency::is_sync)
                .into_iter()
                .map(|module| module.path.as_path())
                .filter(|path| !main_paths.contains(*path))
                .collect();
            let lazy_graph = filter_graph(graph, |module| lazy_paths.contains(module.path.as_path()));
            let code = self.serialize(root, &[], &lazy_graph, &lazy_options)?;
            lazy.push(SplitBundle {
                id: bundle_path(root, &options.project_root),
                entry: root.to_path_buf(),
                code,
            });
        }

        Ok(SplitOutput { main, lazy })
    }

    /// `...deps.shared[<path>]=[..],...deps.remotes[<path>]=[..];`
    fn sync_dependencies(&self, bundle_path: &str, deps: &SyncDependencies) -> Module {
        let deps_of = |kind: &str| {
            Expr::index(
                Expr::member(
                    Expr::member(
                        Expr::index(
                            Expr::ident("globalThis.__FEDERATION__.__NATIVE__"),
                            Expr::str(self.config.name.clone()),
                        ),
                        "deps",
                    ),
                    kind,
                ),
                Expr::str(bundle_path),
            )
        };
        let stmt = Stmt::Expr(Expr::Sequence(vec![
            Expr::assign(deps_of("shared"), Expr::str_array(deps.shared.iter().cloned())),
            Expr::assign(deps_of("remotes"), Expr::str_array(deps.remotes.iter().cloned())),
        ]));
        Module::script("__required_deps__", stmt.to_string())
    }

    /// Module table with run statements, the way the bundler lays bundles out.
    pub fn base_bundle(
        &self,
        entry: &Path,
        pre_modules: &[Module],
        graph: &DependencyGraph,
        options: &SerializerOptions,
    ) -> Result<Bundle> {
        for module in graph.modules() {
            self.ids.id(&module.path);
        }

        let pre = if options.modules_only {
            String::new()
        } else {
            pre_modules
                .iter()
                .map(|module| self.wrap(module, options))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let mut modules: Vec<(u32, String)> = graph
            .modules()
            .map(|module| (self.ids.id(&module.path), self.wrap(module, options)))
            .collect();
        modules.sort_by_key(|(id, _)| *id);

        let prefix = &options.global_prefix;
        let mut post = Vec::new();
        for path in &options.run_before_main_module {
            if graph.contains(path) {
                post.push(format!("{}__r({});", prefix, self.ids.id(path)));
            }
        }
        if options.run_module {
            if !graph.contains(entry) {
                return Err(FederationError::Bundle(format!(
                    "Entry point {} is not part of the graph",
                    entry.display()
                )));
            }
            post.push(format!("{}__r({});", prefix, self.ids.id(entry)));
        }
        if let Some(url) = &options.source_map_url {
            post.push(format!("//# sourceMappingURL={}", url));
        }
        if let Some(url) = &options.source_url {
            post.push(format!("//# sourceURL={}", url));
        }

        Ok(Bundle {
            pre,
            modules,
            post: post.join("\n"),
        })
    }

    fn wrap(&self, module: &Module, options: &SerializerOptions) -> String {
        if module.is_script {
            return module.code.clone();
        }

        let deps = module
            .dependencies
            .iter()
            .map(|dependency| self.ids.id(&dependency.absolute_path).to_string())
            .collect::<Vec<_>>()
            .join(",");
        let id = self.ids.id(&module.path);

        let mut code = format!(
            "{}__d(function (global, _$$_REQUIRE, _$$_IMPORT_DEFAULT, _$$_IMPORT_ALL, module, exports, _dependencyMap) {{\n{}\n}},{},[{}]",
            options.global_prefix, module.code, id, deps
        );
        if options.dev {
            let name = pathdiff::diff_paths(&module.path, &options.project_root)
                .map(|relative| to_posix(&relative))
                .unwrap_or_else(|| to_posix(&module.path));
            code.push(',');
            code.push_str(&Expr::str(name).to_string());
        }
        code.push_str(");");
        code
    }
}

fn early_list(name: &str, variable: &str, items: &[String]) -> Module {
    let stmt = Stmt::Var(variable.to_string(), Expr::str_array(items.iter().cloned()));
    Module::script(name, stmt.to_string())
}

fn filter_graph<F>(graph: &DependencyGraph, keep: F) -> DependencyGraph
where
    F: Fn(&Module) -> bool,
{
    let mut filtered = DependencyGraph::new();
    for module in graph.modules().filter(|module| keep(*module)) {
        filtered.insert(module.clone());
    }
    filtered
}

/// Whether `entry` belongs to the project (not outside the root, not a dependency)
pub fn is_project_source(entry: &Path, project_root: &Path) -> bool {
    match pathdiff::diff_paths(entry, project_root) {
        Some(relative) => !relative.starts_with("..") && !relative.starts_with("node_modules"),
        None => false,
    }
}

/// Path of `entry` relative to the project root, without extension, `/`-separated
pub fn bundle_path(entry: &Path, project_root: &Path) -> String {
    let relative = pathdiff::diff_paths(entry, project_root).unwrap_or_else(|| entry.to_path_buf());
    to_posix(&relative.with_extension(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{normalize, ModuleFederationConfig, ProjectManifest};
    use serde_json::json;

    fn serializer(value: serde_json::Value) -> BundleSerializer {
        let options: ModuleFederationConfig = serde_json::from_value(value).unwrap();
        let config = normalize(options, &ProjectManifest::default()).unwrap();
        BundleSerializer::new(Arc::new(config), "/app/node_modules/.mf-metro/init-host.js")
    }

    fn remote() -> BundleSerializer {
        serializer(json!({
            "name": "mini",
            "exposes": { "./info": "./src/info.tsx" },
            "remotes": { "nested": "nested@http://localhost:8083/mf-manifest.json" },
            "shared": {
                "react": { "version": "19.0.0" },
                "react-native": { "version": "0.80.0" },
                "lodash": { "version": "4.17.21" }
            }
        }))
    }

    fn graph() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.insert(
            Module::new("/app/node_modules/.mf-metro/mini.js", "entry();")
                .with_dependency(Dependency::lazy("../../src/info.tsx", "/app/src/info.tsx")),
        );
        graph.insert(
            Module::new("/app/src/info.tsx", "info();")
                .with_dependency(Dependency::sync("lodash", "/app/node_modules/.mf-metro/shared/lodash.js"))
                .with_dependency(Dependency::sync(
                    "nested/info",
                    "/app/node_modules/.mf-metro/remote/nested_info.js",
                )),
        );
        graph.insert(Module::new("/app/node_modules/.mf-metro/shared/lodash.js", ""));
        graph.insert(Module::new("/app/node_modules/.mf-metro/remote/nested_info.js", ""));
        graph
    }

    fn options(run_module: bool, modules_only: bool) -> SerializerOptions {
        SerializerOptions {
            project_root: PathBuf::from("/app"),
            global_prefix: "mini".into(),
            run_module,
            modules_only,
            ..Default::default()
        }
    }

    #[test]
    fn test_container_preamble_comes_first() {
        let serializer = remote();
        let polyfill = Module::script("/app/polyfill.js", "polyfill();");
        let code = serializer
            .serialize(
                Path::new("/app/node_modules/.mf-metro/mini.js"),
                &[polyfill],
                &graph(),
                &options(true, false),
            )
            .unwrap();

        let lines: Vec<_> = code.lines().collect();
        assert_eq!(lines[0], r#"var __EARLY_SHARED__=["react", "react-native"];"#);
        assert_eq!(lines[1], "var __EARLY_REMOTES__=[];");
        assert_eq!(lines[2], "polyfill();");
        assert_eq!(code.matches("__EARLY_SHARED__").count(), 1);
        assert_eq!(code.matches("__EARLY_REMOTES__").count(), 1);
        assert!(code.ends_with("mini__r(0);"));
    }

    #[test]
    fn test_split_bundle_records_deps() {
        let serializer = remote();
        let polyfill = Module::script("/app/polyfill.js", "polyfill();");
        let code = serializer
            .serialize(Path::new("/app/src/info.tsx"), &[polyfill], &graph(), &options(false, true))
            .unwrap();

        let first = code.lines().next().unwrap();
        assert_eq!(
            first,
            r#"globalThis.__FEDERATION__.__NATIVE__["mini"].deps.shared["src/info"]=["react", "react-native", "lodash"],globalThis.__FEDERATION__.__NATIVE__["mini"].deps.remotes["src/info"]=["nested/info"];"#
        );
        // pre-modules are skipped in modules-only mode, the preamble is kept
        assert!(!code.contains("polyfill();"));
        assert_eq!(code.matches("__NATIVE__").count(), 2);
    }

    #[test]
    fn test_split_bundle_keeps_pre_modules() {
        let serializer = remote();
        let polyfill = Module::script("/app/polyfill.js", "polyfill();");
        let code = serializer
            .serialize(Path::new("/app/src/info.tsx"), &[polyfill], &graph(), &options(false, false))
            .unwrap();
        let lines: Vec<_> = code.lines().collect();
        assert!(lines[0].contains(".deps.shared[\"src/info\"]"));
        assert_eq!(lines[1], "polyfill();");
    }

    #[test]
    fn test_non_project_source_is_unmodified() {
        let serializer = remote();
        let code = serializer
            .serialize(
                Path::new("/app/node_modules/.mf-metro/shared/lodash.js"),
                &[],
                &graph(),
                &options(false, true),
            )
            .unwrap();
        assert!(!code.contains("__FEDERATION__"));
    }

    #[test]
    fn test_module_wrapping() {
        let serializer = remote();
        let mut graph = DependencyGraph::new();
        graph.insert(
            Module::new("/app/index.js", "body();")
                .with_dependency(Dependency::sync("./a", "/app/a.js")),
        );
        graph.insert(Module::new("/app/a.js", "a();"));

        let opts = SerializerOptions {
            dev: true,
            run_before_main_module: vec![PathBuf::from("/app/a.js")],
            source_url: Some("http://localhost:8081/index.bundle".into()),
            ..options(true, false)
        };
        let bundle = serializer
            .base_bundle(Path::new("/app/index.js"), &[], &graph, &opts)
            .unwrap();

        assert_eq!(bundle.modules.len(), 2);
        assert!(bundle.modules[0].1.starts_with("mini__d(function (global"));
        assert!(bundle.modules[0].1.ends_with("},0,[1],\"index.js\");"));
        assert_eq!(
            bundle.post,
            "mini__r(1);\nmini__r(0);\n//# sourceURL=http://localhost:8081/index.bundle"
        );
    }

    #[test]
    fn test_missing_entry() {
        let err = remote()
            .base_bundle(Path::new("/app/missing.js"), &[], &DependencyGraph::new(), &options(true, false))
            .unwrap_err();
        assert!(matches!(err, FederationError::Bundle(_)));
    }

    #[test]
    fn test_serialize_split() {
        let serializer = remote();
        let output = serializer
            .serialize_split(
                Path::new("/app/node_modules/.mf-metro/mini.js"),
                &[],
                &graph(),
                &options(true, false),
            )
            .unwrap();

        assert!(!output.main.contains("info();"));
        assert_eq!(output.lazy.len(), 1);
        let lazy = &output.lazy[0];
        assert_eq!(lazy.id, "src/info");
        assert!(lazy.code.contains("info();"));
        assert!(lazy.code.contains(r#".deps.remotes["src/info"]=["nested/info"]"#));
    }

    #[test]
    fn test_lazy_bundles_hold_only_their_own_modules() {
        let serializer = remote();
        let mut graph = DependencyGraph::new();
        graph.insert(
            Module::new("/app/index.js", "main();")
                .with_dependency(Dependency::sync("./common", "/app/src/common.js"))
                .with_dependency(Dependency::lazy("./b", "/app/src/b.js"))
                .with_dependency(Dependency::lazy("./d", "/app/src/d.js")),
        );
        graph.insert(Module::new("/app/src/common.js", "common();"));
        graph.insert(
            Module::new("/app/src/b.js", "bee();")
                .with_dependency(Dependency::sync("./common", "/app/src/common.js"))
                .with_dependency(Dependency::sync("./b-helper", "/app/src/b-helper.js")),
        );
        graph.insert(Module::new("/app/src/b-helper.js", "beeHelper();"));
        graph.insert(Module::new("/app/src/d.js", "dee();"));

        let output = serializer
            .serialize_split(Path::new("/app/index.js"), &[], &graph, &options(true, false))
            .unwrap();

        assert!(output.main.contains("common();"));
        assert!(!output.main.contains("bee();"));
        assert_eq!(output.lazy.len(), 2);

        let b = output.lazy.iter().find(|bundle| bundle.id == "src/b").unwrap();
        let d = output.lazy.iter().find(|bundle| bundle.id == "src/d").unwrap();
        assert!(b.code.contains("bee();"));
        assert!(b.code.contains("beeHelper();"));
        assert!(!b.code.contains("dee();"));
        assert!(!b.code.contains("common();"));
        assert!(d.code.contains("dee();"));
        assert!(!d.code.contains("bee();"));
        assert!(!d.code.contains("beeHelper();"));
    }

    #[test]
    fn test_run_module_uses_global_prefix() {
        let serializer = remote();
        let options = SerializerOptions {
            global_prefix: "mf".into(),
            ..options(true, false)
        };
        let code = serializer
            .serialize(Path::new("/app/node_modules/.mf-metro/mini.js"), &[], &graph(), &options)
            .unwrap();

        assert!(code.contains("mf__d(function"));
        assert!(code.ends_with("mf__r(0);"));
        assert!(!code.contains("mini__r("));
    }

    #[test]
    fn test_paths() {
        let root = Path::new("/app");
        assert!(is_project_source(Path::new("/app/src/info.tsx"), root));
        assert!(!is_project_source(Path::new("/app/node_modules/lodash/index.js"), root));
        assert!(!is_project_source(Path::new("/other/index.js"), root));
        assert_eq!(bundle_path(Path::new("/app/src/info.tsx"), root), "src/info");
    }
}
