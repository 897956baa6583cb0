// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Read-only view of the bundler's dependency graph

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// How a dependency edge is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AsyncType {
    /// Static `import` / `require`
    #[default]
    None,
    /// Dynamic `import()`
    Async,
}

/// An outgoing edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    /// Specifier as written in the source
    pub name: String,
    /// Resolved path of the target module
    pub absolute_path: PathBuf,
    /// Edge kind
    #[serde(default)]
    pub async_type: AsyncType,
}

impl Dependency {
    /// Static edge
    pub fn sync(name: impl Into<String>, absolute_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            absolute_path: absolute_path.into(),
            async_type: AsyncType::None,
        }
    }

    /// Dynamic edge
    pub fn lazy(name: impl Into<String>, absolute_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            absolute_path: absolute_path.into(),
            async_type: AsyncType::Async,
        }
    }

    /// Whether the edge is statically reached
    pub fn is_sync(&self) -> bool {
        self.async_type == AsyncType::None
    }
}

/// A transformed module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    /// Absolute path
    pub path: PathBuf,
    /// Outgoing edges in source order
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Transformed code: a module factory body, or a plain script
    pub code: String,
    /// Scripts run as-is instead of being wrapped in a module factory
    #[serde(default)]
    pub is_script: bool,
}

impl Module {
    /// Module with factory code
    pub fn new(path: impl Into<PathBuf>, code: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            dependencies: Vec::new(),
            code: code.into(),
            is_script: false,
        }
    }

    /// Plain script, such as a polyfill or generated preamble
    pub fn script(path: impl Into<PathBuf>, code: impl Into<String>) -> Self {
        Self {
            is_script: true,
            ..Self::new(path, code)
        }
    }

    /// Add an outgoing edge
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }
}

/// Modules keyed by absolute path, in insertion order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    modules: IndexMap<PathBuf, Module>,
}

impl DependencyGraph {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a module
    pub fn insert(&mut self, module: Module) {
        self.modules.insert(module.path.clone(), module);
    }

    /// Look up a module
    pub fn get(&self, path: &Path) -> Option<&Module> {
        self.modules.get(path)
    }

    /// Whether the graph contains `path`
    pub fn contains(&self, path: &Path) -> bool {
        self.modules.contains_key(path)
    }

    /// Modules in insertion order
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Number of modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the graph is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules reachable from `entry` via edges accepted by `follow`, depth-first in
    /// source order.
    pub fn reachable<F>(&self, entry: &Path, follow: F) -> Vec<&Module>
    where
        F: Fn(&Dependency) -> bool,
    {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![entry];

        while let Some(path) = stack.pop() {
            if !visited.insert(path) {
                continue;
            }
            let Some(module) = self.modules.get(path) else {
                continue;
            };
            order.push(module);
            // reversed so that the first dependency is visited first
            for dependency in module.dependencies.iter().rev() {
                if follow(dependency) {
                    stack.push(dependency.absolute_path.as_path());
                }
            }
        }

        order
    }

    /// Targets of every dynamic edge, in first-seen order
    pub fn lazy_roots(&self) -> Vec<&Path> {
        let mut seen = HashSet::new();
        self.modules
            .values()
            .flat_map(|module| module.dependencies.iter())
            .filter(|dependency| !dependency.is_sync())
            .map(|dependency| dependency.absolute_path.as_path())
            .filter(|path| seen.insert(*path))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.insert(
            Module::new("/app/index.js", "")
                .with_dependency(Dependency::sync("./a", "/app/a.js"))
                .with_dependency(Dependency::lazy("./b", "/app/b.js")),
        );
        graph.insert(Module::new("/app/a.js", "").with_dependency(Dependency::sync("./c", "/app/c.js")));
        graph.insert(Module::new("/app/b.js", "").with_dependency(Dependency::sync("./c", "/app/c.js")));
        graph.insert(Module::new("/app/c.js", ""));
        graph
    }

    #[test]
    fn test_sync_reachability() {
        let graph = graph();
        let paths: Vec<_> = graph
            .reachable(Path::new("/app/index.js"), Dependency::is_sync)
            .into_iter()
            .map(|m| m.path.clone())
            .collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/app/index.js"),
                PathBuf::from("/app/a.js"),
                PathBuf::from("/app/c.js"),
            ]
        );
    }

    #[test]
    fn test_lazy_roots() {
        assert_eq!(graph().lazy_roots(), vec![Path::new("/app/b.js")]);
    }
}
