// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Share scopes and provider selection

use parking_lot::RwLock;
use semver::{Version, VersionReq};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::ModuleObject;
use crate::config::ShareStrategy;
use crate::error::Result;

/// Produces the exports of a provided shared module
pub type SharedFactory = Arc<dyn Fn() -> Result<ModuleObject> + Send + Sync>;

/// One provided version of a shared module
#[derive(Clone)]
pub struct ShareScopeEntry {
    /// Provided version
    pub version: String,
    /// Instance providing it
    pub from: String,
    /// Single instance across the federation
    pub singleton: bool,
    /// Bundled into the provider's entry
    pub eager: bool,
    /// Range the provider itself accepts
    pub required_version: Option<String>,
    /// Module factory
    pub get: SharedFactory,
    /// Whether some consumer already instantiated it
    pub loaded: bool,
}

impl fmt::Debug for ShareScopeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareScopeEntry")
            .field("version", &self.version)
            .field("from", &self.from)
            .field("singleton", &self.singleton)
            .field("eager", &self.eager)
            .field("required_version", &self.required_version)
            .field("loaded", &self.loaded)
            .finish()
    }
}

/// Shared name -> version -> provider
pub type ShareScopeSnapshot = BTreeMap<String, BTreeMap<String, ShareScopeEntry>>;

/// A named share scope
#[derive(Debug)]
pub struct ShareScope {
    name: String,
    packages: RwLock<ShareScopeSnapshot>,
}

impl ShareScope {
    /// Create an empty scope
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            packages: RwLock::new(BTreeMap::new()),
        }
    }

    /// Scope name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a provider. An existing provider of the same version wins.
    pub fn register(&self, name: &str, entry: ShareScopeEntry) -> bool {
        let mut packages = self.packages.write();
        let versions = packages.entry(name.to_string()).or_default();
        if versions.contains_key(&entry.version) {
            return false;
        }
        debug!(
            "Registered {}@{} from '{}' in share scope '{}'",
            name, entry.version, entry.from, self.name
        );
        versions.insert(entry.version.clone(), entry);
        true
    }

    /// Merge every provider of `snapshot` into this scope
    pub fn merge(&self, snapshot: &ShareScopeSnapshot) {
        for (name, versions) in snapshot {
            for entry in versions.values() {
                self.register(name, entry.clone());
            }
        }
    }

    /// Copy of the current providers
    pub fn snapshot(&self) -> ShareScopeSnapshot {
        self.packages.read().clone()
    }

    /// Provided versions of a shared module
    pub fn versions(&self, name: &str) -> Vec<String> {
        self.packages
            .read()
            .get(name)
            .map(|versions| versions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Record that a provider has been instantiated
    pub fn mark_loaded(&self, name: &str, version: &str) {
        if let Some(entry) = self
            .packages
            .write()
            .get_mut(name)
            .and_then(|versions| versions.get_mut(version))
        {
            entry.loaded = true;
        }
    }

    /// Pick the provider for `name`.
    ///
    /// Candidates must satisfy `required_version` unless the module is a singleton, in
    /// which case the best provider is used regardless and a mismatch is only reported.
    /// `loaded-first` prefers instantiated providers, `version-first` the highest version.
    pub fn select(
        &self,
        name: &str,
        required_version: Option<&str>,
        singleton: bool,
        strategy: ShareStrategy,
    ) -> Option<ShareScopeEntry> {
        let packages = self.packages.read();
        let versions = packages.get(name)?;
        let requirement = required_version.and_then(parse_requirement);
        let satisfies = |entry: &ShareScopeEntry| match (&requirement, Version::parse(&entry.version)) {
            (None, _) => true,
            (Some(req), Ok(version)) => req.matches(&version),
            (Some(_), Err(_)) => false,
        };

        let rank = |entry: &ShareScopeEntry| {
            let version = Version::parse(&entry.version).ok();
            match strategy {
                ShareStrategy::LoadedFirst => (entry.loaded, version),
                ShareStrategy::VersionFirst => (false, version),
            }
        };

        let selected = versions
            .values()
            .filter(|entry| singleton || satisfies(entry))
            .max_by(|a, b| rank(a).cmp(&rank(b)))?
            .clone();

        if singleton && !satisfies(&selected) {
            warn!(
                "Version {} of shared singleton '{}' does not satisfy {}",
                selected.version,
                name,
                required_version.unwrap_or("*")
            );
        }

        Some(selected)
    }
}

/// npm-style range; a bare version means exactly that version
fn parse_requirement(range: &str) -> Option<VersionReq> {
    let range = range.trim();
    let parsed = if Version::parse(range).is_ok() {
        VersionReq::parse(&format!("={}", range))
    } else {
        VersionReq::parse(range)
    };

    match parsed {
        Ok(requirement) => Some(requirement),
        Err(err) => {
            warn!("Ignoring unsupported version range '{}': {}", range, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(version: &str, from: &str) -> ShareScopeEntry {
        let label = format!("{}@{}", from, version);
        ShareScopeEntry {
            version: version.to_string(),
            from: from.to_string(),
            singleton: false,
            eager: false,
            required_version: None,
            get: Arc::new(move || Ok(ModuleObject::new().with_value("from", label.clone()))),
            loaded: false,
        }
    }

    fn scope() -> ShareScope {
        let scope = ShareScope::new("default");
        scope.register("lodash", entry("4.17.21", "host"));
        scope.register("lodash", entry("4.18.0", "mini"));
        scope.register("lodash", entry("3.10.1", "legacy"));
        scope
    }

    #[test]
    fn test_first_registration_wins() {
        let scope = scope();
        assert!(!scope.register("lodash", entry("4.17.21", "other")));
        let selected = scope
            .select("lodash", Some("=4.17.21"), false, ShareStrategy::VersionFirst)
            .unwrap();
        assert_eq!(selected.from, "host");
    }

    #[test]
    fn test_version_first_picks_highest_satisfying() {
        let scope = scope();
        let selected = scope
            .select("lodash", Some("^4.17.0"), false, ShareStrategy::VersionFirst)
            .unwrap();
        assert_eq!(selected.version, "4.18.0");

        let selected = scope
            .select("lodash", Some("^3.0.0"), false, ShareStrategy::VersionFirst)
            .unwrap();
        assert_eq!(selected.version, "3.10.1");
    }

    #[test]
    fn test_loaded_first_prefers_instantiated() {
        let scope = scope();
        scope.mark_loaded("lodash", "4.17.21");
        let selected = scope
            .select("lodash", Some("^4.17.0"), false, ShareStrategy::LoadedFirst)
            .unwrap();
        assert_eq!(selected.version, "4.17.21");

        let selected = scope
            .select("lodash", Some("^4.17.0"), false, ShareStrategy::VersionFirst)
            .unwrap();
        assert_eq!(selected.version, "4.18.0");
    }

    #[test]
    fn test_bare_version_is_exact() {
        let scope = scope();
        assert!(scope
            .select("lodash", Some("4.17.0"), false, ShareStrategy::VersionFirst)
            .is_none());
    }

    #[test]
    fn test_singleton_ignores_range() {
        let scope = scope();
        let selected = scope
            .select("lodash", Some("^5.0.0"), true, ShareStrategy::VersionFirst)
            .unwrap();
        assert_eq!(selected.version, "4.18.0");
    }

    #[test]
    fn test_merge_and_missing() {
        let other = ShareScope::new("default");
        other.merge(&scope().snapshot());
        assert_eq!(other.versions("lodash"), vec!["3.10.1", "4.17.21", "4.18.0"]);
        assert!(other
            .select("react", None, false, ShareStrategy::LoadedFirst)
            .is_none());
    }
}
