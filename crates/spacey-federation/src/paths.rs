// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Locations of generated modules

use std::path::{Path, PathBuf};

/// Directory (under `node_modules`) holding generated federation modules
pub const TMP_DIR_NAME: &str = ".mf-metro";

/// Manifest file name, also the request path it is served at
pub const MANIFEST_FILENAME: &str = "mf-manifest.json";

/// Paths of every generated module for one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederationPaths {
    /// Project root
    pub project_root: PathBuf,
    /// `<root>/node_modules/.mf-metro`
    pub mf_metro: PathBuf,
    /// Host bootstrap module
    pub init_host: PathBuf,
    /// Bundle loader wrapper
    pub async_require: PathBuf,
    /// Shared/remote module registry
    pub registry: PathBuf,
    /// Remote hot-reload client setup
    pub remote_hmr_setup: PathBuf,
    /// Container entry module
    pub remote_entry: PathBuf,
    /// Manifest document
    pub manifest: PathBuf,
    /// Dev-server URL discovery replacement
    pub dev_server: PathBuf,
    /// Hot-reload client shim
    pub hmr_client_shim: PathBuf,
}

impl FederationPaths {
    /// Compute paths for a project and container filename
    pub fn new(project_root: impl Into<PathBuf>, filename: &str) -> Self {
        let project_root = project_root.into();
        let mf_metro = project_root.join("node_modules").join(TMP_DIR_NAME);
        Self {
            init_host: mf_metro.join("init-host.js"),
            async_require: mf_metro.join("async-require.js"),
            registry: mf_metro.join("remote-module-registry.js"),
            remote_hmr_setup: mf_metro.join("remote-hmr.js"),
            remote_entry: mf_metro.join(replace_extension(filename, "js")),
            manifest: mf_metro.join(MANIFEST_FILENAME),
            dev_server: mf_metro.join("modules").join("getDevServer.js"),
            hmr_client_shim: mf_metro.join("modules").join("HMRClientShim.js"),
            mf_metro,
            project_root,
        }
    }

    /// Request name under which the container entry is resolved (`./mini.js`)
    pub fn remote_entry_request(&self) -> String {
        let file_name = self
            .remote_entry
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("./{}", file_name)
    }

    /// Proxy module path for `<alias>/<path>`
    pub fn remote_module_path(&self, name: &str) -> PathBuf {
        self.mf_metro
            .join("remote")
            .join(format!("{}.js", flatten_name(name)))
    }

    /// Proxy module path for a shared module
    pub fn shared_module_path(&self, name: &str) -> PathBuf {
        self.mf_metro
            .join("shared")
            .join(format!("{}.js", flatten_name(name)))
    }

    /// Import specifier reaching a project file from the generated directory
    pub fn project_import(&self, source: &str) -> String {
        let target = self.project_root.join(source.trim_start_matches("./"));
        let relative = pathdiff::diff_paths(&target, &self.mf_metro).unwrap_or(target);
        to_posix(&relative)
    }
}

/// `mini/button` -> `mini_button`
pub fn flatten_name(name: &str) -> String {
    name.replace('/', "_")
}

/// Replace the extension of a file name (`mini.bundle` -> `mini.js`)
pub fn replace_extension(filename: &str, extension: &str) -> String {
    Path::new(filename)
        .with_extension(extension)
        .to_string_lossy()
        .into_owned()
}

/// Render a path with forward slashes
pub fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
        .replace("//", "/")
}
