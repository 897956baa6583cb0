// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Registry of shared and remote modules backing the generated proxies

use dashmap::DashMap;
use futures::future::{ready, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{LoadPath, ModuleObject, ModuleSlot, SharingRuntime};
use crate::config::is_baseline_id;
use crate::error::{FederationError, Result};

type LoadFuture = Shared<BoxFuture<'static, std::result::Result<(), Arc<FederationError>>>>;

/// Lifecycle of a registry id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    /// Never requested
    Unregistered,
    /// Slot exists, exports not assigned yet
    Loading,
    /// Exports assigned
    Loaded,
}

#[derive(Default)]
struct RegistryEntry {
    slot: Arc<ModuleSlot>,
    loaded: AtomicBool,
    flight: Mutex<Option<LoadFuture>>,
}

impl RegistryEntry {
    fn fill(&self, module: &ModuleObject) {
        self.slot.assign(module);
        self.loaded.store(true, Ordering::Release);
    }
}

/// Deduplicates module loads behind stable slots
pub struct SharedModuleRegistry {
    runtime: Arc<dyn SharingRuntime>,
    baseline: Vec<String>,
    entries: DashMap<String, Arc<RegistryEntry>>,
}

impl SharedModuleRegistry {
    /// Create a registry over a sharing runtime
    pub fn new(runtime: Arc<dyn SharingRuntime>, baseline: Vec<String>) -> Self {
        Self {
            runtime,
            baseline,
            entries: DashMap::new(),
        }
    }

    /// The runtime modules are loaded through
    pub fn runtime(&self) -> &Arc<dyn SharingRuntime> {
        &self.runtime
    }

    fn entry(&self, id: &str) -> Arc<RegistryEntry> {
        self.entries.entry(id.to_string()).or_default().clone()
    }

    /// Load a shared module into its slot. Baseline modules take the sync path.
    pub async fn load_shared_to_registry(&self, id: &str) -> Result<Arc<ModuleSlot>> {
        let path = if is_baseline_id(&self.baseline, id) {
            LoadPath::Sync
        } else {
            LoadPath::Async
        };
        self.load_shared_with(id, path).await
    }

    /// Load a shared module through an explicit path.
    ///
    /// Every caller for the same id shares one load; the first caller's path wins.
    pub async fn load_shared_with(&self, id: &str, path: LoadPath) -> Result<Arc<ModuleSlot>> {
        let runtime = self.runtime.clone();
        let owned = id.to_string();
        self.single_flight(id, move || {
            async move {
                match path {
                    LoadPath::Sync => runtime.load_share_sync(&owned),
                    LoadPath::Async => runtime.load_share(&owned).await,
                }
            }
            .boxed()
        })
        .await
    }

    /// Load a shared module synchronously during bootstrap.
    ///
    /// The sync path always evaluates, then records a completed flight so later async
    /// loads of `id` reuse the slot instead of loading again.
    pub fn load_shared_to_registry_sync(&self, id: &str) -> Result<Arc<ModuleSlot>> {
        let module = self.runtime.load_share_sync(id)?;
        let entry = self.entry(id);
        entry.fill(&module);
        *entry.flight.lock() = Some(ready(Ok(())).boxed().shared());
        debug!("Registered shared module '{}' synchronously", id);
        Ok(entry.slot.clone())
    }

    /// Load `<alias>/<path>` from a remote into its slot
    pub async fn load_remote_to_registry(&self, id: &str) -> Result<Arc<ModuleSlot>> {
        let runtime = self.runtime.clone();
        let owned = id.to_string();
        self.single_flight(id, move || {
            async move { runtime.load_remote(&owned).await }.boxed()
        })
        .await
    }

    async fn single_flight<F>(&self, id: &str, start: F) -> Result<Arc<ModuleSlot>>
    where
        F: FnOnce() -> BoxFuture<'static, Result<ModuleObject>>,
    {
        let entry = self.entry(id);
        if entry.loaded.load(Ordering::Acquire) {
            return Ok(entry.slot.clone());
        }
        let flight = {
            let mut flight = entry.flight.lock();
            match flight.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let load = start();
                    let target = entry.clone();
                    let owned = id.to_string();
                    let shared = async move {
                        let module = load.await.map_err(|err| {
                            warn!("Failed to load '{}' into registry: {}", owned, err);
                            Arc::new(err)
                        })?;
                        target.fill(&module);
                        debug!("Registered module '{}'", owned);
                        Ok(())
                    }
                    .boxed()
                    .shared();
                    *flight = Some(shared.clone());
                    shared
                }
            }
        };

        flight.await?;
        Ok(entry.slot.clone())
    }

    /// The slot registered for `id`
    pub fn get_module_from_registry(&self, id: &str) -> Result<Arc<ModuleSlot>> {
        self.entries
            .get(id)
            .map(|entry| entry.slot.clone())
            .ok_or_else(|| FederationError::lookup(id))
    }

    /// Lifecycle state of `id`
    pub fn state(&self, id: &str) -> RegistryState {
        match self.entries.get(id) {
            None => RegistryState::Unregistered,
            Some(entry) if entry.loaded.load(Ordering::Acquire) => RegistryState::Loaded,
            Some(_) => RegistryState::Loading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShareStrategy;
    use crate::runtime::{InitScope, ShareScopeSnapshot};
    use async_trait::async_trait;
    use futures::future::join_all;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingRuntime {
        async_loads: AtomicUsize,
        sync_loads: AtomicUsize,
        remote_loads: AtomicUsize,
    }

    #[async_trait]
    impl SharingRuntime for CountingRuntime {
        async fn load_share(&self, id: &str) -> Result<ModuleObject> {
            self.async_loads.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if id == "broken" {
                return Err(FederationError::SharedUnavailable(id.to_string()));
            }
            Ok(ModuleObject::new().with_value("name", id))
        }

        fn load_share_sync(&self, id: &str) -> Result<ModuleObject> {
            self.sync_loads.fetch_add(1, Ordering::SeqCst);
            Ok(ModuleObject::new().with_value("name", id))
        }

        async fn load_remote(&self, id: &str) -> Result<ModuleObject> {
            self.remote_loads.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(ModuleObject::new().with_value("remote", id))
        }

        fn init_share_scope_map(&self, _scope: &str, _snapshot: &ShareScopeSnapshot) {}

        async fn initialize_sharing(
            &self,
            _scope: &str,
            _strategy: ShareStrategy,
            _init_scope: InitScope,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> (Arc<CountingRuntime>, SharedModuleRegistry) {
        let runtime = Arc::new(CountingRuntime::default());
        let registry =
            SharedModuleRegistry::new(runtime.clone(), vec!["react".into(), "react-native".into()]);
        (runtime, registry)
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_flight() {
        let (runtime, registry) = registry();

        let slots = join_all((0..8).map(|_| registry.load_shared_to_registry("lodash"))).await;

        assert_eq!(runtime.async_loads.load(Ordering::SeqCst), 1);
        let first = slots[0].as_ref().unwrap();
        for slot in &slots {
            assert!(Arc::ptr_eq(first, slot.as_ref().unwrap()));
        }
        assert_eq!(first.get("name"), Some(json!("lodash")));
        assert_eq!(registry.state("lodash"), RegistryState::Loaded);
    }

    #[tokio::test]
    async fn test_baseline_takes_sync_path() {
        let (runtime, registry) = registry();
        registry.load_shared_to_registry("react").await.unwrap();
        registry
            .load_shared_to_registry("react-native/Libraries/Utilities/Platform")
            .await
            .unwrap();
        assert_eq!(runtime.sync_loads.load(Ordering::SeqCst), 2);
        assert_eq!(runtime.async_loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slot_is_stable_before_load() {
        let (_runtime, registry) = registry();
        assert!(matches!(
            registry.get_module_from_registry("lodash"),
            Err(FederationError::Lookup(id)) if id == "lodash"
        ));
        assert_eq!(registry.state("lodash"), RegistryState::Unregistered);

        let loaded = registry.load_shared_to_registry("lodash").await.unwrap();
        let looked_up = registry.get_module_from_registry("lodash").unwrap();
        assert!(Arc::ptr_eq(&loaded, &looked_up));
    }

    #[tokio::test]
    async fn test_failed_load_is_not_retried() {
        let (runtime, registry) = registry();
        assert!(registry.load_shared_to_registry("broken").await.is_err());
        assert!(registry.load_shared_to_registry("broken").await.is_err());
        assert_eq!(runtime.async_loads.load(Ordering::SeqCst), 1);
        assert_eq!(registry.state("broken"), RegistryState::Loading);
    }

    #[tokio::test]
    async fn test_remote_loads_are_deduplicated() {
        let (runtime, registry) = registry();
        let (a, b) = tokio::join!(
            registry.load_remote_to_registry("mini/button"),
            registry.load_remote_to_registry("mini/button")
        );
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(runtime.remote_loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sync_bootstrap_path() {
        let (runtime, registry) = registry();
        registry.load_shared_to_registry_sync("react").unwrap();
        registry.load_shared_to_registry_sync("react").unwrap();
        assert_eq!(runtime.sync_loads.load(Ordering::SeqCst), 2);
        assert_eq!(registry.state("react"), RegistryState::Loaded);
    }

    #[tokio::test]
    async fn test_bootstrapped_module_is_not_loaded_again() {
        let (runtime, registry) = registry();
        let bootstrapped = registry.load_shared_to_registry_sync("react").unwrap();
        let later = registry.load_shared_to_registry("react").await.unwrap();
        let async_path = registry.load_shared_with("react", LoadPath::Async).await.unwrap();

        assert_eq!(runtime.sync_loads.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.async_loads.load(Ordering::SeqCst), 0);
        assert!(Arc::ptr_eq(&bootstrapped, &later));
        assert!(Arc::ptr_eq(&bootstrapped, &async_path));
    }
}
