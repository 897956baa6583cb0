// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Federation-aware module resolution.
//!
//! [`ModuleResolver`] decorates the bundler's own resolver. Internal `mf:` names, the
//! container entry, remote module references and shared module specifiers are redirected
//! to generated modules owned by the [`VirtualModuleManager`]; everything else is handed
//! to the fallback unchanged.

mod node;

pub use node::NodeModulesResolver;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

use crate::config::{FederationCommand, NormalizedConfig};
use crate::error::Result;
use crate::modules::{
    self, ASYNC_REQUIRE, INIT_HOST, REMOTE_HMR_SETUP, REMOTE_MODULE_REGISTRY,
};
use crate::paths::{to_posix, FederationPaths};
use crate::vm::VirtualModuleManager;

/// React Native's dev-server discovery module
const DEV_SERVER_MODULE: &str = "react-native/Libraries/Core/Devtools/getDevServer.js";

/// React Native's hot-reload client
const HMR_CLIENT_MODULE: &str = "react-native/Libraries/Utilities/HMRClient.js";

/// Outcome of resolving a module name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A source file (on disk or virtual)
    SourceFile(PathBuf),
    /// An intentionally empty module
    Empty,
}

impl Resolution {
    /// Resolved path, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            Resolution::SourceFile(path) => Some(path),
            Resolution::Empty => None,
        }
    }
}

/// Where a module name is being resolved from
#[derive(Debug, Clone, Copy)]
pub struct ResolutionContext<'a> {
    /// Module containing the import
    pub origin_module_path: &'a Path,
}

impl<'a> ResolutionContext<'a> {
    /// Context for an import made by `origin_module_path`
    pub fn new(origin_module_path: &'a Path) -> Self {
        Self { origin_module_path }
    }
}

/// A module resolver
pub trait Resolve: Send + Sync {
    /// Resolve `module_name` imported from `context.origin_module_path`
    fn resolve(
        &self,
        context: &ResolutionContext<'_>,
        module_name: &str,
        platform: Option<&str>,
    ) -> Result<Resolution>;
}

/// Resolver redirecting federation names to generated modules
pub struct ModuleResolver {
    config: Arc<NormalizedConfig>,
    paths: Arc<FederationPaths>,
    manager: Arc<VirtualModuleManager>,
    command: FederationCommand,
    fallback: Arc<dyn Resolve>,
    remote_entry_request: String,
}

impl ModuleResolver {
    /// Create a resolver decorating `fallback`
    pub fn new(
        config: Arc<NormalizedConfig>,
        paths: Arc<FederationPaths>,
        manager: Arc<VirtualModuleManager>,
        command: FederationCommand,
        fallback: Arc<dyn Resolve>,
    ) -> Self {
        let remote_entry_request = paths.remote_entry_request();
        Self {
            config,
            paths,
            manager,
            command,
            fallback,
            remote_entry_request,
        }
    }

    fn virtual_module<F>(&self, path: &Path, generator: F) -> Result<Resolution>
    where
        F: FnOnce() -> Result<String>,
    {
        self.manager.register_virtual_module(path, generator)?;
        Ok(Resolution::SourceFile(path.to_path_buf()))
    }

    fn proxy(&self, path: PathBuf, id: &str) -> Result<Resolution> {
        self.virtual_module(&path, || Ok(modules::proxy_module(id)))
    }

    /// Resolve through the fallback, then swap `target` for a generated module.
    fn substitute<F>(
        &self,
        context: &ResolutionContext<'_>,
        module_name: &str,
        platform: Option<&str>,
        target: &str,
        replacement: &Path,
        generator: F,
    ) -> Result<Resolution>
    where
        F: FnOnce() -> Result<String>,
    {
        let resolution = self.fallback.resolve(context, module_name, platform)?;
        match resolution.path() {
            Some(path) if to_posix(path).ends_with(target) => {
                trace!("Substituting {} with {}", path.display(), replacement.display());
                self.virtual_module(replacement, generator)
            }
            _ => Ok(resolution),
        }
    }
}

impl Resolve for ModuleResolver {
    fn resolve(
        &self,
        context: &ResolutionContext<'_>,
        module_name: &str,
        platform: Option<&str>,
    ) -> Result<Resolution> {
        let config = &self.config;
        let paths = &self.paths;

        match module_name {
            INIT_HOST => {
                return self.virtual_module(&paths.init_host, || {
                    Ok(modules::init_host_module(config))
                });
            }
            ASYNC_REQUIRE => {
                return self.virtual_module(&paths.async_require, || {
                    Ok(modules::async_require_module(&config.name))
                });
            }
            REMOTE_MODULE_REGISTRY => {
                return self.virtual_module(&paths.registry, || {
                    Ok(modules::registry_module(config))
                });
            }
            REMOTE_HMR_SETUP => {
                return self.virtual_module(&paths.remote_hmr_setup, || {
                    Ok(modules::remote_hmr_module(&config.name))
                });
            }
            _ => {}
        }

        // the container entry is requested relative to the project root
        if module_name == self.remote_entry_request {
            return self.virtual_module(&paths.remote_entry, || {
                Ok(modules::remote_entry_module(config, paths))
            });
        }

        // init-host defines the shared modules, so its imports must reach the real packages
        if context.origin_module_path == paths.init_host {
            return self.fallback.resolve(context, module_name, platform);
        }

        if context.origin_module_path == paths.remote_entry {
            let externalized = config
                .shared
                .get(module_name)
                .is_some_and(|shared| shared.import.is_disabled());
            if externalized {
                return self.proxy(paths.shared_module_path(module_name), module_name);
            }
            return self.fallback.resolve(context, module_name, platform);
        }

        let is_remote_module = config.remotes.keys().any(|alias| {
            module_name
                .strip_prefix(alias.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
        });
        if is_remote_module {
            return self.proxy(paths.remote_module_path(module_name), module_name);
        }

        if config.shared_import_names().any(|name| name == module_name) {
            return self.proxy(paths.shared_module_path(module_name), module_name);
        }

        if config.is_remote()
            && self.command.is_federation()
            && module_name.ends_with("getDevServer")
        {
            return self.substitute(
                context,
                module_name,
                platform,
                DEV_SERVER_MODULE,
                &paths.dev_server,
                || Ok(modules::dev_server_module(&config.name)),
            );
        }

        if self.command.is_bundle() && module_name.ends_with("HMRClient") {
            return self.substitute(
                context,
                module_name,
                platform,
                HMR_CLIENT_MODULE,
                &paths.hmr_client_shim,
                || Ok(modules::hmr_client_shim_module()),
            );
        }

        self.fallback.resolve(context, module_name, platform)
    }
}
