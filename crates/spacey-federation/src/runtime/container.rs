// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Federation containers: the `get`/`init` pair a remote exposes

use futures::future::{try_join_all, BoxFuture};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::{InitScope, InitToken, LoadPath, ModuleObject, ShareScopeSnapshot, SharedModuleRegistry, SharingRuntime};
use crate::config::{NormalizedConfig, ShareStrategy};
use crate::error::{FederationError, Result};
use crate::modules::SHARE_SCOPE;

/// Lazily evaluates an exposed module
pub type ExposeFactory = Arc<dyn Fn() -> BoxFuture<'static, Result<ModuleObject>> + Send + Sync>;

/// Hot-reload client setup hook
pub type HmrSetup = Arc<dyn Fn() + Send + Sync>;

/// Static container settings
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    /// Instance name
    pub name: String,
    /// Share strategy used when initializing sharing
    pub share_strategy: ShareStrategy,
    /// Declared shared modules in the baseline set, loaded first
    pub early_shared: Vec<String>,
    /// Remaining declared shared modules and whether each is eager
    pub shared: Vec<(String, bool)>,
    /// Development build
    pub dev: bool,
}

impl ContainerOptions {
    /// Settings for a normalized configuration
    pub fn from_config(config: &NormalizedConfig, dev: bool) -> Self {
        let early_shared = config.early_shared();
        let shared = config
            .shared
            .iter()
            .filter(|(name, _)| !early_shared.contains(name))
            .map(|(name, shared)| (name.clone(), shared.eager))
            .collect();

        Self {
            name: config.name.clone(),
            share_strategy: config.share_strategy,
            early_shared,
            shared,
            dev,
        }
    }
}

/// A container: exposes modules and joins a share scope on `init`
pub struct FederationContainer {
    options: ContainerOptions,
    exposes: BTreeMap<String, ExposeFactory>,
    runtime: Arc<dyn SharingRuntime>,
    registry: Arc<SharedModuleRegistry>,
    hmr_setup: Option<HmrSetup>,
    hmr_initialized: AtomicBool,
    initializing: AtomicBool,
    ready: AtomicBool,
}

impl FederationContainer {
    /// Create a container with no exposes
    pub fn new(
        options: ContainerOptions,
        runtime: Arc<dyn SharingRuntime>,
        registry: Arc<SharedModuleRegistry>,
    ) -> Self {
        Self {
            options,
            exposes: BTreeMap::new(),
            runtime,
            registry,
            hmr_setup: None,
            hmr_initialized: AtomicBool::new(false),
            initializing: AtomicBool::new(false),
            ready: AtomicBool::new(false),
        }
    }

    /// Expose a module under a public path (`./button`)
    pub fn expose(mut self, key: impl Into<String>, factory: ExposeFactory) -> Self {
        self.exposes.insert(key.into(), factory);
        self
    }

    /// Install the dev hot-reload client hook
    pub fn with_hmr_setup(mut self, setup: HmrSetup) -> Self {
        self.hmr_setup = Some(setup);
        self
    }

    /// Instance name
    pub fn name(&self) -> &str {
        &self.options.name
    }

    /// Whether `init` has completed
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Public paths of exposed modules
    pub fn exposed(&self) -> impl Iterator<Item = &str> {
        self.exposes.keys().map(String::as_str)
    }

    /// Join the share scope.
    ///
    /// A call whose `init_scope` already carries this container's token comes from a
    /// cycle and returns immediately. So does a call made while another chain is
    /// initializing: waiting on it could wait on ourselves through a peer container.
    /// A failed initialization may be retried.
    pub async fn init(&self, snapshot: ShareScopeSnapshot, init_scope: InitScope) -> Result<()> {
        let token = InitToken::new(SHARE_SCOPE, &self.options.name);
        if init_scope.contains(&token) || self.is_ready() {
            debug!("Container '{}' is already initialized", self.options.name);
            return Ok(());
        }
        if self.initializing.swap(true, Ordering::AcqRel) {
            debug!("Container '{}' is initializing in another chain", self.options.name);
            return Ok(());
        }

        let result = self.initialize(token, snapshot, init_scope).await;
        if result.is_ok() {
            self.ready.store(true, Ordering::Release);
        }
        self.initializing.store(false, Ordering::Release);
        result
    }

    async fn initialize(
        &self,
        token: InitToken,
        snapshot: ShareScopeSnapshot,
        mut init_scope: InitScope,
    ) -> Result<()> {
        init_scope.insert(token);
        self.runtime.init_share_scope_map(SHARE_SCOPE, &snapshot);
        self.runtime
            .initialize_sharing(SHARE_SCOPE, self.options.share_strategy, init_scope)
            .await?;

        try_join_all(
            self.options
                .early_shared
                .iter()
                .map(|id| self.registry.load_shared_to_registry(id)),
        )
        .await?;

        if self.options.dev && !self.hmr_initialized.swap(true, Ordering::AcqRel) {
            if let Some(setup) = &self.hmr_setup {
                setup();
            }
        }

        try_join_all(self.options.shared.iter().map(|(id, eager)| {
            let path = if *eager { LoadPath::Sync } else { LoadPath::Async };
            self.registry.load_shared_with(id, path)
        }))
        .await?;

        info!("Initialized container '{}'", self.options.name);
        Ok(())
    }

    /// Evaluate an exposed module
    pub async fn get(&self, expose: &str) -> Result<ModuleObject> {
        let factory = self.exposes.get(expose).ok_or_else(|| {
            FederationError::Container(format!("Module {} does not exist in container.", expose))
        })?;
        factory().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::FutureExt;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Weak;

    /// Runtime whose sharing initialization calls back into a container, like two
    /// remotes consuming each other.
    #[derive(Default)]
    struct CyclicRuntime {
        container: Mutex<Weak<FederationContainer>>,
        initializations: AtomicUsize,
        loads: Mutex<Vec<(String, bool)>>,
    }

    #[async_trait]
    impl SharingRuntime for CyclicRuntime {
        async fn load_share(&self, id: &str) -> Result<ModuleObject> {
            self.loads.lock().push((id.to_string(), false));
            Ok(ModuleObject::new().with_value("id", id))
        }

        fn load_share_sync(&self, id: &str) -> Result<ModuleObject> {
            self.loads.lock().push((id.to_string(), true));
            Ok(ModuleObject::new().with_value("id", id))
        }

        async fn load_remote(&self, id: &str) -> Result<ModuleObject> {
            Err(FederationError::remote_load(id, "unused"))
        }

        fn init_share_scope_map(&self, _scope: &str, _snapshot: &ShareScopeSnapshot) {}

        async fn initialize_sharing(
            &self,
            _scope: &str,
            _strategy: ShareStrategy,
            init_scope: InitScope,
        ) -> Result<()> {
            self.initializations.fetch_add(1, Ordering::SeqCst);
            let container = self.container.lock().upgrade();
            if let Some(container) = container {
                container.init(ShareScopeSnapshot::new(), init_scope).await?;
            }
            Ok(())
        }
    }

    fn options(dev: bool) -> ContainerOptions {
        ContainerOptions {
            name: "mini".into(),
            share_strategy: ShareStrategy::VersionFirst,
            early_shared: vec!["react".into()],
            shared: vec![("lodash".into(), false), ("zustand".into(), true)],
            dev,
        }
    }

    fn container(dev: bool) -> (Arc<CyclicRuntime>, Arc<FederationContainer>, Arc<AtomicUsize>) {
        let runtime = Arc::new(CyclicRuntime::default());
        let registry = Arc::new(SharedModuleRegistry::new(runtime.clone(), vec!["react".into()]));
        let hmr_calls = Arc::new(AtomicUsize::new(0));
        let counter = hmr_calls.clone();
        let container = Arc::new(
            FederationContainer::new(options(dev), runtime.clone(), registry)
                .expose(
                    "./button",
                    Arc::new(|| {
                        async { Ok::<_, FederationError>(ModuleObject::new().with_value("default", "Button")) }
                            .boxed()
                    }),
                )
                .with_hmr_setup(Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
        );
        *runtime.container.lock() = Arc::downgrade(&container);
        (runtime, container, hmr_calls)
    }

    #[tokio::test]
    async fn test_reentrant_init_short_circuits() {
        let (runtime, container, _) = container(false);

        container
            .init(ShareScopeSnapshot::new(), InitScope::new())
            .await
            .unwrap();

        assert_eq!(runtime.initializations.load(Ordering::SeqCst), 1);
        assert!(container.is_ready());
    }

    /// Runtime whose sharing initialization inits a peer container, like two remotes
    /// that consume each other.
    #[derive(Default)]
    struct PeerRuntime {
        peer: Mutex<Weak<FederationContainer>>,
    }

    #[async_trait]
    impl SharingRuntime for PeerRuntime {
        async fn load_share(&self, id: &str) -> Result<ModuleObject> {
            Ok(ModuleObject::new().with_value("id", id))
        }

        fn load_share_sync(&self, id: &str) -> Result<ModuleObject> {
            Ok(ModuleObject::new().with_value("id", id))
        }

        async fn load_remote(&self, id: &str) -> Result<ModuleObject> {
            Err(FederationError::remote_load(id, "unused"))
        }

        fn init_share_scope_map(&self, _scope: &str, _snapshot: &ShareScopeSnapshot) {}

        async fn initialize_sharing(
            &self,
            _scope: &str,
            _strategy: ShareStrategy,
            init_scope: InitScope,
        ) -> Result<()> {
            tokio::task::yield_now().await;
            let peer = self.peer.lock().upgrade();
            if let Some(peer) = peer {
                peer.init(ShareScopeSnapshot::new(), init_scope).await?;
            }
            Ok(())
        }
    }

    fn peer(name: &str) -> (Arc<PeerRuntime>, Arc<FederationContainer>) {
        let runtime = Arc::new(PeerRuntime::default());
        let registry = Arc::new(SharedModuleRegistry::new(runtime.clone(), Vec::new()));
        let options = ContainerOptions {
            name: name.into(),
            share_strategy: ShareStrategy::VersionFirst,
            early_shared: Vec::new(),
            shared: vec![("lodash".into(), false)],
            dev: false,
        };
        let container = Arc::new(FederationContainer::new(options, runtime.clone(), registry));
        (runtime, container)
    }

    #[tokio::test]
    async fn test_mutual_init_from_two_chains_completes() {
        let (runtime_a, a) = peer("a");
        let (runtime_b, b) = peer("b");
        *runtime_a.peer.lock() = Arc::downgrade(&b);
        *runtime_b.peer.lock() = Arc::downgrade(&a);

        let (ra, rb) = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            async {
                tokio::join!(
                    a.init(ShareScopeSnapshot::new(), InitScope::new()),
                    b.init(ShareScopeSnapshot::new(), InitScope::new())
                )
            },
        )
        .await
        .expect("mutual init must not deadlock");

        ra.unwrap();
        rb.unwrap();
        assert!(a.is_ready());
        assert!(b.is_ready());
    }

    #[tokio::test]
    async fn test_init_with_own_token_does_nothing() {
        let (runtime, container, _) = container(false);
        let mut scope = InitScope::new();
        scope.insert(InitToken::new("default", "mini"));

        container.init(ShareScopeSnapshot::new(), scope).await.unwrap();

        assert_eq!(runtime.initializations.load(Ordering::SeqCst), 0);
        assert!(!container.is_ready());
    }

    #[tokio::test]
    async fn test_shared_load_order_and_paths() {
        let (runtime, container, hmr_calls) = container(true);
        container
            .init(ShareScopeSnapshot::new(), InitScope::new())
            .await
            .unwrap();
        container
            .init(ShareScopeSnapshot::new(), InitScope::new())
            .await
            .unwrap();

        let loads = runtime.loads.lock().clone();
        assert_eq!(loads[0], ("react".to_string(), true));
        assert!(loads.contains(&("lodash".to_string(), false)));
        assert!(loads.contains(&("zustand".to_string(), true)));
        assert_eq!(loads.len(), 3);
        assert_eq!(hmr_calls.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.initializations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get() {
        let (_, container, _) = container(false);
        let button = container.get("./button").await.unwrap();
        assert_eq!(button.get("default"), Some(json!("Button")));

        let err = container.get("./missing").await.unwrap_err();
        assert_eq!(err.to_string(), "Module ./missing does not exist in container.");
        assert_eq!(container.exposed().collect::<Vec<_>>(), vec!["./button"]);
    }
}
