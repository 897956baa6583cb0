// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Wiring of the federation components into one build

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::config::{
    normalize, BuildOptions, ModuleFederationConfig, NormalizedConfig, ProjectManifest,
};
use crate::error::Result;
use crate::graph::{DependencyGraph, Module};
use crate::manifest::Manifest;
use crate::modules;
use crate::paths::{replace_extension, to_posix, FederationPaths};
use crate::resolver::{ModuleResolver, Resolve};
use crate::serializer::{BundleSerializer, SerializerOptions, SplitOutput};
use crate::server::RequestRewriter;
use crate::vm::{FileHasher, FileTransformer, VirtualModuleManager};

/// One artifact the bundler is asked to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRequest {
    /// Entry module
    pub entry_file: PathBuf,
    /// Target platform
    pub platform: String,
    /// Development build
    pub dev: bool,
    /// Split dynamic imports into lazy bundles
    pub lazy: bool,
    /// Omit pre-modules
    pub modules_only: bool,
    /// Run the entry module once loaded
    pub run_module: bool,
}

impl BundleRequest {
    /// Dev-server URL of the request (`/src/button.bundle?platform=ios&...`)
    pub fn to_url(&self, project_root: &Path) -> String {
        let relative =
            pathdiff::diff_paths(&self.entry_file, project_root).unwrap_or_else(|| self.entry_file.clone());
        let path = replace_extension(&to_posix(&relative), "bundle");
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("platform", &self.platform)
            .append_pair("dev", &self.dev.to_string())
            .append_pair("lazy", &self.lazy.to_string())
            .append_pair("modulesOnly", &self.modules_only.to_string())
            .append_pair("runModule", &self.run_module.to_string())
            .finish();
        format!("/{}?{}", path.trim_start_matches('/'), query)
    }
}

/// Module Federation for one build
pub struct ModuleFederation {
    config: Arc<NormalizedConfig>,
    paths: Arc<FederationPaths>,
    build: BuildOptions,
    manager: Arc<VirtualModuleManager>,
    manifest: Manifest,
    serializer: BundleSerializer,
}

impl ModuleFederation {
    /// Set up federation, or return `None` when the command does not use it.
    pub fn new(options: ModuleFederationConfig, build: BuildOptions) -> Result<Option<Self>> {
        if !build.command.is_federation() {
            warn!(
                "Module Federation is disabled for command {:?}, use start, bundle-mf-host or bundle-mf-remote",
                build.command
            );
            return Ok(None);
        }

        let project = match ProjectManifest::load(&build.project_root) {
            Ok(project) => project,
            Err(e) => {
                debug!("No usable package.json in {}: {}", build.project_root.display(), e);
                ProjectManifest::default()
            }
        };
        let config = normalize(options, &project)?;
        Ok(Some(Self::from_config(config, build)))
    }

    /// Wire an already normalized configuration
    pub fn from_config(config: NormalizedConfig, build: BuildOptions) -> Self {
        let paths = Arc::new(FederationPaths::new(&build.project_root, &config.filename));
        let manager = Arc::new(VirtualModuleManager::new(build.force_write_file_system));
        let manifest = Manifest::from_config(&config);
        let config = Arc::new(config);
        let serializer = BundleSerializer::new(config.clone(), paths.init_host.clone());

        Self {
            config,
            paths,
            build,
            manager,
            manifest,
            serializer,
        }
    }

    /// Normalized configuration
    pub fn config(&self) -> &Arc<NormalizedConfig> {
        &self.config
    }

    /// Generated module locations
    pub fn paths(&self) -> &Arc<FederationPaths> {
        &self.paths
    }

    /// Manifest of this container
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Virtual module store
    pub fn manager(&self) -> &Arc<VirtualModuleManager> {
        &self.manager
    }

    /// Recreate the generated directory, write the manifest and stub the container entry
    /// so the bundler's file map knows about it.
    pub fn prepare(&self) -> Result<PathBuf> {
        if self.paths.mf_metro.exists() {
            std::fs::remove_dir_all(&self.paths.mf_metro)?;
        }
        std::fs::create_dir_all(&self.paths.mf_metro)?;

        let manifest = self.manifest.write(&self.paths.mf_metro)?;
        std::fs::write(&self.paths.remote_entry, "")?;
        info!("Prepared {}", self.paths.mf_metro.display());
        Ok(manifest)
    }

    /// Generated runtime modules this build needs, with their content
    pub fn runtime_modules(&self) -> Vec<(PathBuf, String)> {
        let config = &self.config;
        let paths = &self.paths;
        let mut modules = vec![
            (paths.registry.clone(), modules::registry_module(config)),
            (paths.async_require.clone(), modules::async_require_module(&config.name)),
            (paths.remote_hmr_setup.clone(), modules::remote_hmr_module(&config.name)),
        ];
        if config.is_host {
            modules.push((paths.init_host.clone(), modules::init_host_module(config)));
        } else {
            modules.push((
                paths.remote_entry.clone(),
                modules::remote_entry_module(config, paths),
            ));
        }
        modules
    }

    /// Register every runtime module and write it to disk.
    pub fn materialize(&self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (path, content) in self.runtime_modules() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, &content)?;
            self.manager.register_virtual_module(path.clone(), || Ok(content))?;
            written.push(path);
        }
        Ok(written)
    }

    /// Federation-aware resolver decorating `fallback`
    pub fn resolver(&self, fallback: Arc<dyn Resolve>) -> ModuleResolver {
        ModuleResolver::new(
            self.config.clone(),
            self.paths.clone(),
            self.manager.clone(),
            self.build.command.clone(),
            fallback,
        )
    }

    /// Decorate the bundler's file hasher
    pub fn hasher(&self, inner: Arc<dyn FileHasher>) -> Arc<dyn FileHasher> {
        self.manager.wrap_hasher(inner)
    }

    /// Decorate the bundler's transformer
    pub fn transformer(&self, inner: Arc<dyn FileTransformer>) -> Arc<dyn FileTransformer> {
        self.manager.wrap_transformer(inner)
    }

    /// Request URL rewriter for the dev server
    pub fn rewriter(&self) -> RequestRewriter {
        RequestRewriter::new(self.config.filename.clone(), &self.paths)
    }

    /// Prefix of the module system globals
    pub fn global_prefix(&self) -> &str {
        &self.config.name
    }

    /// Only hosts ship polyfills; remotes run inside them
    pub fn include_polyfills(&self) -> bool {
        self.config.is_host
    }

    /// Modules required before the entry module
    pub fn run_before_main(&self) -> Vec<PathBuf> {
        if self.config.is_host {
            vec![self.paths.init_host.clone()]
        } else {
            Vec::new()
        }
    }

    /// Statement running module `id`
    pub fn run_module_statement(&self, id: u32) -> String {
        format!("{}__r({});", self.config.name, id)
    }

    /// Serializer options for a request
    pub fn serializer_options(&self, request: &BundleRequest) -> SerializerOptions {
        SerializerOptions {
            project_root: self.paths.project_root.clone(),
            global_prefix: self.config.name.clone(),
            run_module: request.run_module,
            modules_only: request.modules_only,
            run_before_main_module: if request.run_module {
                self.run_before_main()
            } else {
                Vec::new()
            },
            dev: request.dev,
            source_map_url: None,
            source_url: Some(request.to_url(&self.paths.project_root)),
        }
    }

    /// Serialize the bundle for a request
    pub fn serialize(
        &self,
        request: &BundleRequest,
        pre_modules: &[Module],
        graph: &DependencyGraph,
    ) -> Result<String> {
        self.serializer.serialize(
            &request.entry_file,
            pre_modules,
            graph,
            &self.serializer_options(request),
        )
    }

    /// Serialize a request and split its dynamic imports into lazy bundles
    pub fn serialize_split(
        &self,
        request: &BundleRequest,
        pre_modules: &[Module],
        graph: &DependencyGraph,
    ) -> Result<SplitOutput> {
        self.serializer.serialize_split(
            &request.entry_file,
            pre_modules,
            graph,
            &self.serializer_options(request),
        )
    }

    /// Every artifact of this build.
    ///
    /// A host produces its entry bundle. A remote produces the container bundle plus
    /// one split bundle per exposed module.
    pub fn bundle_requests(&self, host_entry: &Path, platform: &str, dev: bool) -> Vec<BundleRequest> {
        let request = |entry_file: PathBuf, run_module: bool| BundleRequest {
            entry_file,
            platform: platform.to_string(),
            dev,
            lazy: true,
            modules_only: !run_module,
            run_module,
        };

        if self.config.is_host {
            return vec![request(self.paths.project_root.join(host_entry), true)];
        }

        let mut requests = vec![request(self.paths.remote_entry.clone(), true)];
        for source in self.config.exposes.values() {
            let entry = self.paths.project_root.join(source.trim_start_matches("./"));
            requests.push(request(entry, false));
        }
        requests
    }
}
