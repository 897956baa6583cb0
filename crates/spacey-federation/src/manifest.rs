// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! `mf-manifest.json` generation

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::NormalizedConfig;
use crate::error::Result;

/// Federation manifest describing one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Container name
    pub id: String,
    /// Container name
    pub name: String,
    /// Build metadata
    pub meta_data: MetaData,
    /// Consumed remotes
    pub remotes: Vec<ManifestRemote>,
    /// Provided shared modules
    pub shared: Vec<ManifestShared>,
    /// Exposed modules
    pub exposes: Vec<ManifestExpose>,
}

/// `metaData` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    /// Container name
    pub name: String,
    /// Always `app`
    #[serde(rename = "type")]
    pub kind: String,
    /// Build identification
    pub build_info: BuildInfo,
    /// Container entry file
    pub remote_entry: RemoteEntryInfo,
    /// Type declaration bundle (unused)
    pub types: TypesInfo,
    /// Global the container registers under
    pub global_name: String,
    /// Version of the producing plugin
    pub plugin_version: String,
    /// Public path of the container assets
    pub public_path: String,
}

/// `metaData.buildInfo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    /// Build version
    pub build_version: String,
    /// Build name
    pub build_name: String,
}

/// `metaData.remoteEntry`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntryInfo {
    /// Container filename
    pub name: String,
    /// Directory of the container file
    pub path: String,
    /// Entry kind, `global`
    #[serde(rename = "type")]
    pub kind: String,
}

/// `metaData.types`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypesInfo {
    /// Archive path
    pub path: String,
    /// Archive name
    pub name: String,
    /// API declaration file
    pub api: String,
    /// Zip file
    pub zip: String,
}

/// A consumed remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRemote {
    /// Container name of the remote
    pub federation_container_name: String,
    /// Alias used in import specifiers
    pub module_name: String,
    /// Alias used in import specifiers
    pub alias: String,
    /// Entry URL
    pub entry: String,
}

/// A shared module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestShared {
    /// Shared name
    pub id: String,
    /// Shared name
    pub name: String,
    /// Provided version
    pub version: String,
    /// Accepted range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_version: Option<String>,
    /// Single instance across the federation
    pub singleton: bool,
    /// Content hash (unused)
    pub hash: String,
    /// Asset lists
    pub assets: Assets,
}

/// An exposed module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestExpose {
    /// `<container>:<name>`
    pub id: String,
    /// Public name without `./`
    pub name: String,
    /// Public path (`./button`)
    pub path: String,
    /// Asset lists
    pub assets: Assets,
}

/// JS and CSS assets of a module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assets {
    /// Script assets
    pub js: AssetList,
    /// Style assets
    pub css: AssetList,
}

/// Sync and async asset paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetList {
    /// Loaded with the module
    pub sync: Vec<String>,
    /// Loaded on demand
    #[serde(rename = "async")]
    pub lazy: Vec<String>,
}

impl Manifest {
    /// Build the manifest for a configuration
    pub fn from_config(config: &NormalizedConfig) -> Self {
        let remotes = config
            .remote_entries()
            .into_iter()
            .map(|remote| ManifestRemote {
                federation_container_name: remote.name,
                module_name: remote.alias.clone(),
                alias: remote.alias,
                entry: remote.entry,
            })
            .collect();

        let shared = config
            .shared
            .iter()
            .map(|(name, shared)| ManifestShared {
                id: name.clone(),
                name: name.clone(),
                version: shared.version.clone(),
                required_version: shared.required_version.clone(),
                singleton: shared.singleton,
                hash: String::new(),
                assets: Assets::default(),
            })
            .collect();

        let exposes = config
            .exposes
            .iter()
            .map(|(key, source)| {
                let name = key.strip_prefix("./").unwrap_or(key).to_string();
                ManifestExpose {
                    id: format!("{}:{}", config.name, name),
                    name,
                    path: key.clone(),
                    assets: Assets {
                        js: AssetList {
                            sync: vec![source.clone()],
                            lazy: Vec::new(),
                        },
                        css: AssetList::default(),
                    },
                }
            })
            .collect();

        Manifest {
            id: config.name.clone(),
            name: config.name.clone(),
            meta_data: MetaData {
                name: config.name.clone(),
                kind: "app".into(),
                build_info: BuildInfo {
                    build_version: "1.0.0".into(),
                    build_name: config.name.clone(),
                },
                remote_entry: RemoteEntryInfo {
                    name: config.filename.clone(),
                    path: String::new(),
                    kind: "global".into(),
                },
                types: TypesInfo::default(),
                global_name: config.name.clone(),
                plugin_version: env!("CARGO_PKG_VERSION").into(),
                public_path: "auto".into(),
            },
            remotes,
            shared,
            exposes,
        }
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write `mf-manifest.json` into `dir`, returning its path.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(crate::paths::MANIFEST_FILENAME);
        std::fs::write(&path, self.to_json()?)?;
        debug!("Wrote manifest to {}", path.display());
        Ok(path)
    }
}
