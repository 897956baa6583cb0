// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module path resolution for React Native projects (Node.js algorithm)

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::{Resolution, ResolutionContext, Resolve};
use crate::error::{FederationError, Result};

/// Resolver implementing relative, absolute and `node_modules` lookup
pub struct NodeModulesResolver {
    /// File extensions to try, in order
    extensions: Vec<String>,
}

impl NodeModulesResolver {
    /// Create a resolver with the default extensions
    pub fn new() -> Self {
        Self {
            extensions: vec![
                ".ts".to_string(),
                ".tsx".to_string(),
                ".js".to_string(),
                ".jsx".to_string(),
                ".json".to_string(),
            ],
        }
    }

    /// Resolve a module specifier from `parent_path`
    pub fn resolve_path(
        &self,
        specifier: &str,
        parent_path: &Path,
        platform: Option<&str>,
    ) -> Result<PathBuf> {
        if specifier.starts_with("./")
            || specifier.starts_with("../")
            || specifier == "."
            || specifier == ".."
            || Path::new(specifier).is_absolute()
        {
            let parent_dir = parent_path.parent().unwrap_or(Path::new("."));
            let path = parent_dir.join(specifier);
            return self
                .resolve_file_or_directory(&path, platform)
                .ok_or_else(|| FederationError::module_not_found(specifier));
        }

        self.resolve_node_modules(specifier, parent_path, platform)
    }

    fn resolve_file_or_directory(&self, path: &Path, platform: Option<&str>) -> Option<PathBuf> {
        self.resolve_file(path, platform)
            .or_else(|| self.resolve_directory(path, platform))
    }

    /// Exact file, then `<path>.<platform><ext>`, then `<path><ext>`
    fn resolve_file(&self, path: &Path, platform: Option<&str>) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }

        let file_name = path.file_name()?.to_string_lossy().into_owned();
        let mut candidates = Vec::new();
        if let Some(platform) = platform {
            for ext in &self.extensions {
                candidates.push(format!("{}.{}{}", file_name, platform, ext));
            }
        }
        for ext in &self.extensions {
            candidates.push(format!("{}{}", file_name, ext));
        }

        candidates
            .into_iter()
            .map(|candidate| path.with_file_name(candidate))
            .find(|candidate| candidate.is_file())
    }

    /// Package `react-native` / `main` field, then index files
    fn resolve_directory(&self, dir: &Path, platform: Option<&str>) -> Option<PathBuf> {
        if !dir.is_dir() {
            return None;
        }

        if let Some(pkg) = read_package_json(dir) {
            for main in [pkg.react_native, pkg.main].into_iter().flatten() {
                let main_path = dir.join(&main);
                if let Some(found) = self.resolve_file(&main_path, platform) {
                    return Some(found);
                }
                if main_path.is_dir() {
                    if let Some(found) = self.resolve_file(&main_path.join("index"), platform) {
                        return Some(found);
                    }
                }
            }
        }

        self.resolve_file(&dir.join("index"), platform)
    }

    /// Walk up the directory tree looking for `node_modules/<package>`
    fn resolve_node_modules(
        &self,
        specifier: &str,
        parent_path: &Path,
        platform: Option<&str>,
    ) -> Result<PathBuf> {
        let (package_name, subpath) = parse_package_specifier(specifier);

        let mut current = parent_path.parent();
        while let Some(dir) = current {
            let package_dir = dir.join("node_modules").join(package_name);

            if package_dir.exists() {
                let found = match subpath {
                    Some(sub) => self.resolve_file_or_directory(&package_dir.join(sub), platform),
                    None => self.resolve_directory(&package_dir, platform),
                };
                if let Some(found) = found {
                    return Ok(found);
                }
            }

            current = dir.parent();
        }

        Err(FederationError::module_not_found(specifier))
    }
}

impl Default for NodeModulesResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolve for NodeModulesResolver {
    fn resolve(
        &self,
        context: &ResolutionContext<'_>,
        module_name: &str,
        platform: Option<&str>,
    ) -> Result<Resolution> {
        self.resolve_path(module_name, context.origin_module_path, platform)
            .map(Resolution::SourceFile)
    }
}

/// Split a package specifier into name and optional subpath
fn parse_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    let name_end = if specifier.starts_with('@') {
        // @scope/name or @scope/name/subpath
        specifier
            .find('/')
            .and_then(|scope_end| {
                specifier[scope_end + 1..]
                    .find('/')
                    .map(|pos| scope_end + 1 + pos)
            })
    } else {
        specifier.find('/')
    };

    match name_end {
        Some(end) => (&specifier[..end], Some(&specifier[end + 1..])),
        None => (specifier, None),
    }
}

/// Fields of package.json used for resolution
#[derive(Debug, Deserialize)]
struct PackageJson {
    main: Option<String>,
    #[serde(rename = "react-native")]
    react_native: Option<String>,
}

fn read_package_json(dir: &Path) -> Option<PackageJson> {
    let content = std::fs::read_to_string(dir.join("package.json")).ok()?;
    serde_json::from_str(&content).ok()
}
