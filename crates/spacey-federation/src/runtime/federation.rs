// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Concrete sharing runtime

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::{
    FederationContainer, FederationNamespace, InitScope, ModuleObject, RemoteEntryLoader,
    ShareScope, ShareScopeEntry, ShareScopeSnapshot, SharedFactory, SharingRuntime,
};
use crate::config::{NormalizedConfig, RemoteEntry, ShareStrategy, SharedConfig};
use crate::error::{FederationError, Result};
use crate::modules::SHARE_SCOPE;

/// Sharing runtime of one federation instance
pub struct FederationRuntime {
    name: String,
    remotes: Vec<RemoteEntry>,
    shared: BTreeMap<String, SharedConfig>,
    share_strategy: ShareStrategy,
    namespace: Arc<FederationNamespace>,
    loader: RemoteEntryLoader,
    containers: DashMap<String, Arc<OnceCell<Arc<FederationContainer>>>>,
}

impl FederationRuntime {
    /// Create the runtime for a normalized configuration
    pub fn new(
        config: &NormalizedConfig,
        namespace: Arc<FederationNamespace>,
        loader: RemoteEntryLoader,
    ) -> Self {
        Self {
            name: config.name.clone(),
            remotes: config.remote_entries(),
            shared: config.shared.clone(),
            share_strategy: config.share_strategy,
            namespace,
            loader,
            containers: DashMap::new(),
        }
    }

    /// Instance name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn share_scope(&self) -> Arc<ShareScope> {
        self.namespace.share_scope(SHARE_SCOPE)
    }

    /// Register this instance's copy of a declared shared module.
    ///
    /// Modules declared `import: false` are never provided locally.
    pub fn provide(&self, name: &str, get: SharedFactory) -> Result<()> {
        let shared = self.shared.get(name).ok_or_else(|| {
            FederationError::config(format!("Shared module '{}' is not declared", name))
        })?;
        if shared.import.is_disabled() {
            warn!("Shared module '{}' is declared import: false, not providing it", name);
            return Ok(());
        }

        self.share_scope().register(
            name,
            ShareScopeEntry {
                version: shared.version.clone(),
                from: self.name.clone(),
                singleton: shared.singleton,
                eager: shared.eager,
                required_version: shared.required_version.clone(),
                get,
                loaded: false,
            },
        );
        Ok(())
    }

    fn instantiate(&self, id: &str) -> Result<ModuleObject> {
        let shared = self.shared.get(id);
        let scope = self.share_scope();
        let entry = scope
            .select(
                id,
                shared.and_then(|s| s.required_version.as_deref()),
                shared.is_some_and(|s| s.singleton),
                self.share_strategy,
            )
            .ok_or_else(|| FederationError::SharedUnavailable(id.to_string()))?;

        let module = (entry.get)()?;
        scope.mark_loaded(id, &entry.version);
        debug!("'{}' uses {}@{} from '{}'", self.name, id, entry.version, entry.from);
        Ok(module)
    }

    fn remote_for<'a>(&self, id: &'a str) -> Result<(RemoteEntry, &'a str)> {
        let (alias, path) = id
            .split_once('/')
            .ok_or_else(|| FederationError::module_not_found(id))?;
        let remote = self
            .remotes
            .iter()
            .find(|remote| remote.alias == alias)
            .cloned()
            .ok_or_else(|| FederationError::module_not_found(id))?;
        Ok((remote, path))
    }

    /// The loaded container of a remote, fetched once.
    pub async fn container(&self, remote: &RemoteEntry) -> Result<Arc<FederationContainer>> {
        let cell = self
            .containers
            .entry(remote.name.clone())
            .or_default()
            .clone();
        let container = cell.get_or_try_init(|| self.loader.load(remote)).await?;
        Ok(container.clone())
    }
}

#[async_trait]
impl SharingRuntime for FederationRuntime {
    async fn load_share(&self, id: &str) -> Result<ModuleObject> {
        self.instantiate(id)
    }

    fn load_share_sync(&self, id: &str) -> Result<ModuleObject> {
        self.instantiate(id)
    }

    async fn load_remote(&self, id: &str) -> Result<ModuleObject> {
        let (remote, path) = self.remote_for(id)?;
        let container = self.container(&remote).await?;
        container
            .init(self.share_scope().snapshot(), InitScope::new())
            .await?;
        container.get(&format!("./{}", path)).await
    }

    fn init_share_scope_map(&self, scope: &str, snapshot: &ShareScopeSnapshot) {
        self.namespace.share_scope(scope).merge(snapshot);
    }

    async fn initialize_sharing(
        &self,
        scope: &str,
        strategy: ShareStrategy,
        init_scope: InitScope,
    ) -> Result<()> {
        if strategy != ShareStrategy::VersionFirst {
            return Ok(());
        }

        // every remote must contribute its providers before versions are compared
        let snapshot = self.namespace.share_scope(scope).snapshot();
        try_join_all(self.remotes.iter().map(|remote| {
            let snapshot = snapshot.clone();
            let init_scope = init_scope.clone();
            async move {
                let container = self.container(remote).await?;
                container.init(snapshot, init_scope).await
            }
        }))
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{normalize, ModuleFederationConfig, ProjectManifest};
    use crate::manifest::Manifest;
    use crate::runtime::BundleFetcher;
    use serde_json::json;

    struct NoFetch;

    #[async_trait]
    impl BundleFetcher for NoFetch {
        async fn load_bundle(&self, url: &str) -> Result<()> {
            Err(FederationError::Bundle(format!("offline: {}", url)))
        }

        async fn fetch_manifest(&self, url: &str) -> Result<Manifest> {
            Err(FederationError::Bundle(format!("offline: {}", url)))
        }
    }

    fn runtime(namespace: Arc<FederationNamespace>, value: serde_json::Value) -> FederationRuntime {
        let options: ModuleFederationConfig = serde_json::from_value(value).unwrap();
        let config = normalize(options, &ProjectManifest::default()).unwrap();
        let loader = RemoteEntryLoader::new(Arc::new(NoFetch), namespace.clone(), "ios", false);
        FederationRuntime::new(&config, namespace, loader)
    }

    fn factory(label: &'static str) -> SharedFactory {
        Arc::new(move || Ok(ModuleObject::new().with_value("from", label)))
    }

    #[tokio::test]
    async fn test_highest_compatible_provider_wins() {
        let namespace = Arc::new(FederationNamespace::new());
        let host = runtime(
            namespace.clone(),
            json!({ "name": "host", "shared": { "lodash": { "version": "4.17.21", "requiredVersion": "^4.17.0" } } }),
        );
        let mini = runtime(
            namespace.clone(),
            json!({
                "name": "mini",
                "exposes": {},
                "shared": { "lodash": { "version": "4.18.0", "requiredVersion": "^4.17.0" } }
            }),
        );
        host.provide("lodash", factory("host")).unwrap();
        mini.provide("lodash", factory("mini")).unwrap();

        let module = host.load_share("lodash").await.unwrap();
        assert_eq!(module.get("from"), Some(json!("mini")));
    }

    #[tokio::test]
    async fn test_loaded_first_reuses_instantiated() {
        let namespace = Arc::new(FederationNamespace::new());
        let host = runtime(
            namespace.clone(),
            json!({ "name": "host", "shared": { "lodash": { "version": "4.17.21", "requiredVersion": "^4.17.0" } } }),
        );
        host.provide("lodash", factory("host")).unwrap();
        namespace.share_scope("default").mark_loaded("lodash", "4.17.21");
        namespace.share_scope("default").register(
            "lodash",
            ShareScopeEntry {
                version: "4.18.0".into(),
                from: "mini".into(),
                singleton: false,
                eager: false,
                required_version: None,
                get: factory("mini"),
                loaded: false,
            },
        );

        let module = host.load_share_sync("lodash").unwrap();
        assert_eq!(module.get("from"), Some(json!("host")));
    }

    #[tokio::test]
    async fn test_disabled_import_is_not_provided() {
        let namespace = Arc::new(FederationNamespace::new());
        let mini = runtime(
            namespace.clone(),
            json!({
                "name": "mini",
                "exposes": {},
                "shared": { "react": { "version": "19.0.0", "import": false } }
            }),
        );
        mini.provide("react", factory("mini")).unwrap();
        assert!(matches!(
            mini.load_share_sync("react"),
            Err(FederationError::SharedUnavailable(id)) if id == "react"
        ));
        assert!(mini.provide("zustand", factory("mini")).is_err());
    }

    #[tokio::test]
    async fn test_unknown_remote_and_failed_fetch() {
        let namespace = Arc::new(FederationNamespace::new());
        let host = runtime(
            namespace,
            json!({ "name": "host", "remotes": { "mini": "mini@http://host/mini.bundle" } }),
        );

        assert!(matches!(
            host.load_remote("other/button").await,
            Err(FederationError::ModuleNotFound(_))
        ));
        let err = host.load_remote("mini/button").await.unwrap_err();
        assert!(matches!(err, FederationError::RemoteLoad { ref name, .. } if name == "mini"));
    }
}
