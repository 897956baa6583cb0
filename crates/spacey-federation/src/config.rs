// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Federation configuration: loading, normalization and validation.
//!
//! A raw [`ModuleFederationConfig`] is read from JSON, then turned into an immutable
//! [`NormalizedConfig`] once per build invocation. Every validation error is raised here,
//! before any resolution or serialization work starts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{FederationError, Result};

/// Default container filename
pub const DEFAULT_ENTRY_FILENAME: &str = "remoteEntry.bundle";

/// Shared modules that are always present before configuration-driven loading starts
pub const DEFAULT_BASELINE_SHARED: &[&str] = &["react", "react-native"];

/// Environment variable set by IDE integrations that cannot see virtual modules
pub const IDE_LIB_PATH_ENV: &str = "REACT_NATIVE_IDE_LIB_PATH";

/// Strategy used by the sharing runtime to pick a provider for a shared module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShareStrategy {
    /// Prefer whichever version is already loaded
    #[default]
    LoadedFirst,
    /// Prefer the highest available version
    VersionFirst,
}

impl ShareStrategy {
    /// Wire name used in generated code
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareStrategy::LoadedFirst => "loaded-first",
            ShareStrategy::VersionFirst => "version-first",
        }
    }
}

impl fmt::Display for ShareStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `import` field of a shared declaration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SharedImport {
    /// Import the package under its shared name
    #[default]
    Default,
    /// Import under a different specifier
    Specifier(String),
    /// `import: false`: provided by the host only, never bundled
    Disabled,
}

impl SharedImport {
    /// Whether the module is externalized (`import: false`)
    pub fn is_disabled(&self) -> bool {
        matches!(self, SharedImport::Disabled)
    }
}

/// Shared module declaration as written by the user
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedConfigInput {
    /// Provided version
    pub version: String,
    /// Accepted version range
    pub required_version: Option<String>,
    /// Only a single instance may exist across the federation
    #[serde(default)]
    pub singleton: bool,
    /// Bundle and load synchronously
    #[serde(default)]
    pub eager: bool,
    /// `string | false`
    #[serde(default)]
    pub import: Option<serde_json::Value>,
}

/// Normalized shared module declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedConfig {
    /// Provided version
    pub version: String,
    /// Accepted version range
    pub required_version: Option<String>,
    /// Only a single instance may exist across the federation
    pub singleton: bool,
    /// Bundle and load synchronously
    pub eager: bool,
    /// Import behaviour
    pub import: SharedImport,
}

/// Raw federation configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleFederationConfig {
    /// Federation instance name (also the bundle global prefix)
    pub name: String,
    /// Container filename, must end with `.bundle`
    pub filename: Option<String>,
    /// Remote alias -> `<containerName>@<entryUrl>`
    pub remotes: Option<BTreeMap<String, String>>,
    /// Public path -> source path
    pub exposes: Option<BTreeMap<String, String>>,
    /// Shared module declarations
    pub shared: Option<BTreeMap<String, serde_json::Value>>,
    /// Share strategy
    pub share_strategy: Option<ShareStrategy>,
    /// Runtime plugin module paths
    pub plugins: Option<Vec<String>>,
    /// Shared modules treated as always synchronously available
    pub baseline_shared: Option<Vec<String>>,
}

impl ModuleFederationConfig {
    /// Load a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        debug!("Loaded federation config '{}' from {}", config.name, path.display());
        Ok(config)
    }

    /// Parse a configuration from JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| FederationError::config(format!("Invalid federation config: {}", e)))
    }

    /// A configuration without exposes is a host
    pub fn is_host(&self) -> bool {
        self.exposes.is_none()
    }
}

/// Dependencies declared by the project's package.json
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    /// Production dependencies
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Development dependencies
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
}

impl ProjectManifest {
    /// Read `package.json` from the project root.
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = project_root.join("package.json");
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Declared range for a dependency, production first
    pub fn declared_range(&self, name: &str) -> Option<&String> {
        self.dependencies
            .get(name)
            .or_else(|| self.dev_dependencies.get(name))
    }
}

/// A parsed `remotes` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Local alias used in import specifiers
    pub alias: String,
    /// Container (global) name
    pub name: String,
    /// Entry URL
    pub entry: String,
}

/// Normalized, immutable federation configuration
#[derive(Debug, Clone)]
pub struct NormalizedConfig {
    /// Federation instance name
    pub name: String,
    /// Container filename
    pub filename: String,
    /// Remote alias -> `<containerName>@<entryUrl>`
    pub remotes: BTreeMap<String, String>,
    /// Public path -> source path
    pub exposes: BTreeMap<String, String>,
    /// Shared module declarations
    pub shared: BTreeMap<String, SharedConfig>,
    /// Share strategy
    pub share_strategy: ShareStrategy,
    /// Runtime plugin module paths
    pub plugins: Vec<String>,
    /// Baseline shared modules
    pub baseline_shared: Vec<String>,
    /// Whether this build is a host (no exposes)
    pub is_host: bool,
}

impl NormalizedConfig {
    /// Whether this build is a remote
    pub fn is_remote(&self) -> bool {
        !self.is_host
    }

    /// Specifier under which a shared module is imported
    pub fn shared_import_name<'a>(&'a self, name: &'a str) -> &'a str {
        match self.shared.get(name).map(|s| &s.import) {
            Some(SharedImport::Specifier(specifier)) => specifier,
            _ => name,
        }
    }

    /// All shared import specifiers
    pub fn shared_import_names(&self) -> impl Iterator<Item = &str> {
        self.shared.keys().map(|name| self.shared_import_name(name))
    }

    /// Parsed remotes, in alias order
    pub fn remote_entries(&self) -> Vec<RemoteEntry> {
        self.remotes
            .iter()
            .filter_map(|(alias, spec)| parse_remote_spec(alias, spec).ok())
            .collect()
    }

    /// Whether a shared name belongs to the baseline set
    pub fn is_baseline(&self, id: &str) -> bool {
        is_baseline_id(&self.baseline_shared, id)
    }

    /// Declared shared modules that belong to the baseline set
    pub fn early_shared(&self) -> Vec<String> {
        self.shared
            .keys()
            .filter(|name| self.is_baseline(name))
            .cloned()
            .collect()
    }
}

/// Baseline membership: exact name or a subpath of a baseline package
pub fn is_baseline_id(baseline: &[String], id: &str) -> bool {
    baseline.iter().any(|name| {
        id == name
            || id
                .strip_prefix(name.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Normalize and validate a raw configuration.
pub fn normalize(
    options: ModuleFederationConfig,
    project: &ProjectManifest,
) -> Result<NormalizedConfig> {
    let is_host = options.is_host();
    let filename = options
        .filename
        .clone()
        .unwrap_or_else(|| DEFAULT_ENTRY_FILENAME.to_string());

    let mut shared = BTreeMap::new();
    for (name, raw) in options.shared.unwrap_or_default() {
        let mut config = parse_shared(&name, raw)?;
        // hosts always provide their shared modules eagerly
        if is_host {
            config.eager = true;
        }
        if config.required_version.is_none() {
            config.required_version = project.declared_range(&name).cloned();
        }
        shared.insert(name, config);
    }

    let baseline_shared = options.baseline_shared.unwrap_or_else(|| {
        DEFAULT_BASELINE_SHARED
            .iter()
            .map(|s| s.to_string())
            .collect()
    });

    let normalized = NormalizedConfig {
        name: options.name,
        filename,
        remotes: options.remotes.unwrap_or_default(),
        exposes: options.exposes.unwrap_or_default(),
        shared,
        share_strategy: options.share_strategy.unwrap_or_default(),
        plugins: options.plugins.unwrap_or_default(),
        baseline_shared,
        is_host,
    };

    validate(&normalized)?;
    Ok(normalized)
}

fn parse_shared(name: &str, raw: serde_json::Value) -> Result<SharedConfig> {
    let input: SharedConfigInput = serde_json::from_value(raw).map_err(|e| {
        FederationError::config(format!("Malformed shared module declaration '{}': {}", name, e))
    })?;

    let import = match input.import {
        None => SharedImport::Default,
        Some(serde_json::Value::Bool(false)) => SharedImport::Disabled,
        Some(serde_json::Value::String(specifier)) if !specifier.is_empty() => {
            SharedImport::Specifier(specifier)
        }
        Some(other) => {
            return Err(FederationError::config(format!(
                "Malformed shared module declaration '{}': import must be a string or false, got {}",
                name, other
            )));
        }
    };

    Ok(SharedConfig {
        version: input.version,
        required_version: input.required_version,
        singleton: input.singleton,
        eager: input.eager,
        import,
    })
}

/// Validate a normalized configuration.
pub fn validate(options: &NormalizedConfig) -> Result<()> {
    if options.name.is_empty() || !options.name.chars().all(is_identifier_char) {
        return Err(FederationError::config(format!(
            "Invalid name: '{}'. Name must be a non-empty JavaScript identifier.",
            options.name
        )));
    }

    if !options.filename.ends_with(".bundle") {
        return Err(FederationError::config(format!(
            "Invalid filename: {}. Filename must end with .bundle extension.",
            options.filename
        )));
    }

    for name in options.shared.keys() {
        validate_shared_name(name)?;
    }

    for (alias, spec) in &options.remotes {
        parse_remote_spec(alias, spec)?;
    }

    Ok(())
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn validate_shared_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.starts_with("./") || name.starts_with("../") || name == "." {
        Some("relative paths are not supported")
    } else if name.starts_with('/') || Path::new(name).is_absolute() {
        Some("absolute paths are not supported")
    } else if name.contains('*') {
        Some("wildcards are not supported")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(FederationError::config(format!(
            "Invalid shared module '{}': {}",
            name, reason
        ))),
        None => Ok(()),
    }
}

/// Parse `<containerName>@<entryUrl>`; the URL may itself contain `@`.
pub fn parse_remote_spec(alias: &str, spec: &str) -> Result<RemoteEntry> {
    match spec.split_once('@') {
        Some((name, entry)) if !name.is_empty() && !entry.is_empty() => Ok(RemoteEntry {
            alias: alias.to_string(),
            name: name.to_string(),
            entry: entry.to_string(),
        }),
        _ => Err(FederationError::config(format!(
            "Invalid remote '{}': expected '<name>@<url>', got '{}'",
            alias, spec
        ))),
    }
}

/// The command the bundler was started with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FederationCommand {
    /// Interactive dev server
    Start,
    /// Bundle a host application
    BundleHost,
    /// Bundle a remote application
    BundleRemote,
    /// Anything else; federation stays disabled
    Other(String),
}

impl FederationCommand {
    /// Parse a command name
    pub fn from_arg(command: &str) -> Self {
        match command {
            "start" => FederationCommand::Start,
            "bundle-mf-host" => FederationCommand::BundleHost,
            "bundle-mf-remote" => FederationCommand::BundleRemote,
            other => FederationCommand::Other(other.to_string()),
        }
    }

    /// Federation is enabled for this command
    pub fn is_federation(&self) -> bool {
        !matches!(self, FederationCommand::Other(_))
    }

    /// One of the dedicated bundle commands
    pub fn is_bundle(&self) -> bool {
        matches!(
            self,
            FederationCommand::BundleHost | FederationCommand::BundleRemote
        )
    }
}

/// Build-level options surrounding a federation config
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Project root
    pub project_root: PathBuf,
    /// Command the bundler runs under
    pub command: FederationCommand,
    /// Mirror virtual modules to disk
    pub force_write_file_system: bool,
}

impl BuildOptions {
    /// Create build options
    pub fn new(project_root: impl Into<PathBuf>, command: FederationCommand) -> Self {
        Self {
            project_root: project_root.into(),
            command,
            force_write_file_system: false,
        }
    }

    /// Apply environment overrides.
    pub fn from_env(mut self) -> Self {
        if std::env::var_os(IDE_LIB_PATH_ENV).is_some() {
            debug!("{} is set, mirroring virtual modules to disk", IDE_LIB_PATH_ENV);
            self.force_write_file_system = true;
        }
        self
    }
}
