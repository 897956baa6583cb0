// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Synchronous dependency classification.
//!
//! Shared and remote modules reached synchronously from an entry point must be present in
//! the registry before that bundle's code runs. Anything reached only through a dynamic
//! import is loaded on demand instead.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::NormalizedConfig;
use crate::graph::{Dependency, DependencyGraph};

/// Modules that must be preloaded for one entry point
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncDependencies {
    /// Shared module specifiers, baseline modules first
    pub shared: Vec<String>,
    /// Remote module specifiers (`<alias>/<path>`)
    pub remotes: Vec<String>,
}

/// Classifies edges reachable from an entry point
#[derive(Debug, Clone)]
pub struct DependencyClassifier {
    remote_aliases: HashSet<String>,
    shared_imports: HashSet<String>,
    baseline: Vec<String>,
    init_host: PathBuf,
}

impl DependencyClassifier {
    /// Build a classifier from explicit inputs
    pub fn new(
        remote_aliases: impl IntoIterator<Item = String>,
        shared_imports: impl IntoIterator<Item = String>,
        baseline: Vec<String>,
        init_host: impl Into<PathBuf>,
    ) -> Self {
        Self {
            remote_aliases: remote_aliases.into_iter().collect(),
            shared_imports: shared_imports.into_iter().collect(),
            baseline,
            init_host: init_host.into(),
        }
    }

    /// Build a classifier for a normalized configuration
    pub fn from_config(config: &NormalizedConfig, init_host: impl Into<PathBuf>) -> Self {
        Self::new(
            config.remotes.keys().cloned(),
            config.shared_import_names().map(str::to_string),
            config.baseline_shared.clone(),
            init_host,
        )
    }

    /// `<declaredAlias>/<path>`
    fn is_remote_module(&self, name: &str) -> bool {
        name.split_once('/')
            .is_some_and(|(alias, rest)| !rest.is_empty() && self.remote_aliases.contains(alias))
    }

    /// Collect the shared and remote modules reached synchronously from `entry`.
    pub fn classify(&self, graph: &DependencyGraph, entry: &Path) -> SyncDependencies {
        let mut shared: Vec<String> = self.baseline.clone();
        let mut seen_shared: HashSet<String> = shared.iter().cloned().collect();
        let mut remotes = Vec::new();
        let mut seen_remotes = HashSet::new();

        for module in graph.reachable(entry, Dependency::is_sync) {
            let from_init_host = module.path == self.init_host;

            for dependency in module.dependencies.iter().filter(|d| d.is_sync()) {
                let name = dependency.name.as_str();

                if self.is_remote_module(name) {
                    if seen_remotes.insert(name.to_string()) {
                        remotes.push(name.to_string());
                    }
                    continue;
                }

                if !from_init_host
                    && self.shared_imports.contains(name)
                    && seen_shared.insert(name.to_string())
                {
                    shared.push(name.to_string());
                }
            }
        }

        SyncDependencies { shared, remotes }
    }
}
