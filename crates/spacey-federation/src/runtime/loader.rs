// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loading container entries and split bundles

use futures::future::{try_join, try_join_all};
use std::sync::Arc;
use tracing::{debug, error};
use url::Url;

use super::{BundleFetcher, FederationContainer, FederationNamespace, SharedModuleRegistry};
use crate::config::RemoteEntry;
use crate::error::{FederationError, Result};
use crate::manifest::Manifest;
use crate::paths::MANIFEST_FILENAME;

/// Join two URL path pieces with exactly one slash (`/a/b/` + `/c` -> `/a/b/c`)
pub fn join_components(prefix: &str, suffix: &str) -> String {
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        suffix.trim_start_matches('/')
    )
}

/// Directory part of a URL (`http://host:8081/a/b.bundle` -> `http://host:8081/a`)
pub fn get_public_path(url: &str) -> String {
    match url.rsplit_once('/') {
        Some((public, _)) => public.to_string(),
        None => String::new(),
    }
}

/// Bundle id of a request path (`/a/b.bundle?platform=ios` -> `a/b`)
pub fn get_bundle_id(url_path: &str) -> String {
    let bundle_path = url_path.split('?').next().unwrap_or_default();
    bundle_path
        .strip_prefix('/')
        .unwrap_or(bundle_path)
        .replacen(".bundle", "", 1)
}

fn is_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

/// Loads remote container bundles
#[derive(Clone)]
pub struct RemoteEntryLoader {
    fetcher: Arc<dyn BundleFetcher>,
    namespace: Arc<FederationNamespace>,
    platform: String,
    dev: bool,
}

impl RemoteEntryLoader {
    /// Create a loader
    pub fn new(
        fetcher: Arc<dyn BundleFetcher>,
        namespace: Arc<FederationNamespace>,
        platform: impl Into<String>,
        dev: bool,
    ) -> Self {
        Self {
            fetcher,
            namespace,
            platform: platform.into(),
            dev,
        }
    }

    /// URL the container bundle is requested from. Dev builds ask for a lazy bundle.
    pub fn entry_url(&self, entry: &str) -> Result<String> {
        if !self.dev {
            return Ok(entry.to_string());
        }
        let mut url = Url::parse(entry)?;
        url.query_pairs_mut()
            .append_pair("platform", &self.platform)
            .append_pair("dev", "true")
            .append_pair("lazy", "true");
        Ok(url.to_string())
    }

    /// Container bundle location, following a manifest entry if needed
    async fn container_entry(&self, entry: &str) -> Result<String> {
        if !entry.ends_with(MANIFEST_FILENAME) {
            return Ok(entry.to_string());
        }
        let manifest: Manifest = self.fetcher.fetch_manifest(entry).await?;
        let public_path = match manifest.meta_data.public_path.as_str() {
            "auto" => get_public_path(entry),
            public_path => public_path.to_string(),
        };
        let base = join_components(&public_path, &manifest.meta_data.remote_entry.path);
        Ok(join_components(&base, &manifest.meta_data.remote_entry.name))
    }

    /// Load a remote container, or return it if its bundle already ran.
    pub async fn load(&self, remote: &RemoteEntry) -> Result<Arc<FederationContainer>> {
        if let Some(container) = self.namespace.get(&remote.name).and_then(|scope| scope.exports()) {
            return Ok(container);
        }

        self.fetch(remote).await.map_err(|err| {
            error!("Failed to load remote entry: {}. Reason: {}", remote.name, err);
            FederationError::remote_load(&remote.name, err)
        })
    }

    async fn fetch(&self, remote: &RemoteEntry) -> Result<Arc<FederationContainer>> {
        let entry = self.container_entry(&remote.entry).await?;
        let url = self.entry_url(&entry)?;
        debug!("Loading container '{}' from {}", remote.name, url);
        self.fetcher.load_bundle(&url).await?;

        let scope = self.namespace.get(&remote.name).ok_or_else(|| {
            FederationError::Container(format!("Container {} did not register itself", remote.name))
        })?;
        let container = scope.exports().ok_or_else(|| {
            FederationError::Container(format!("Container {} has no exports", remote.name))
        })?;
        scope.set_location(entry);
        Ok(container)
    }
}

/// Loads split bundles and preloads what they use synchronously
pub struct SplitBundleLoader {
    fetcher: Arc<dyn BundleFetcher>,
    namespace: Arc<FederationNamespace>,
    registry: Arc<SharedModuleRegistry>,
    scope_name: String,
    production: bool,
}

impl SplitBundleLoader {
    /// Create a loader for the bundles of instance `scope_name`
    pub fn new(
        fetcher: Arc<dyn BundleFetcher>,
        namespace: Arc<FederationNamespace>,
        registry: Arc<SharedModuleRegistry>,
        scope_name: impl Into<String>,
        production: bool,
    ) -> Self {
        Self {
            fetcher,
            namespace,
            registry,
            scope_name: scope_name.into(),
            production,
        }
    }

    /// Where a bundle is fetched from. Production bundles resolve against the container.
    pub fn bundle_path(&self, bundle_path: &str, origin: Option<&str>) -> String {
        match origin {
            Some(origin) if self.production && !is_url(bundle_path) => {
                join_components(&get_public_path(origin), bundle_path)
            }
            _ => bundle_path.to_string(),
        }
    }

    /// Load a bundle, then the shared and remote modules recorded for it.
    pub async fn load(&self, original_path: &str) -> Result<()> {
        let scope = self.namespace.scope(&self.scope_name);
        let location = scope.location();
        let bundle_path = self.bundle_path(original_path, location.as_deref());

        // keep relative segments out of the dev server's path normalization
        self.fetcher
            .load_bundle(&bundle_path.replace("../", "..%2F"))
            .await?;

        let deps = scope.deps_for(&get_bundle_id(original_path));
        try_join(
            try_join_all(
                deps.shared
                    .iter()
                    .map(|id| self.registry.load_shared_to_registry(id)),
            ),
            try_join_all(
                deps.remotes
                    .iter()
                    .map(|id| self.registry.load_remote_to_registry(id)),
            ),
        )
        .await?;

        debug!(
            "Loaded bundle {} with {} shared and {} remote dependencies",
            bundle_path,
            deps.shared.len(),
            deps.remotes.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_helpers() {
        assert_eq!(join_components("/a/b/", "/c/d"), "/a/b/c/d");
        assert_eq!(join_components("http://host", "mini.bundle"), "http://host/mini.bundle");
        assert_eq!(get_public_path("http://host:8081/a/b.bundle"), "http://host:8081/a");
        assert_eq!(get_bundle_id("/a/b.bundle?platform=ios"), "a/b");
        assert_eq!(get_bundle_id("/src/screen.bundle"), "src/screen");
    }
}
