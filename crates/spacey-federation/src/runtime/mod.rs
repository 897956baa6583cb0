// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runtime model of the code that executes inside federated bundles.
//!
//! The generated modules in [`crate::modules`] drive a sharing runtime from JavaScript.
//! This module expresses the same protocol in Rust so it can be exercised and reasoned
//! about: a [`SharedModuleRegistry`] deduplicating loads behind stable module slots,
//! [`FederationContainer`] implementing `init`/`get` with a circular-call guard, and
//! [`FederationRuntime`], a concrete [`SharingRuntime`] doing share-scope selection and
//! remote loading.

mod container;
mod federation;
mod host;
mod loader;
mod namespace;
mod registry;
mod share_scope;

pub use container::{ContainerOptions, ExposeFactory, FederationContainer, HmrSetup};
pub use federation::FederationRuntime;
pub use host::HostBootstrap;
pub use loader::{get_bundle_id, get_public_path, join_components, RemoteEntryLoader, SplitBundleLoader};
pub use namespace::{FederationNamespace, InstanceScope};
pub use registry::{RegistryState, SharedModuleRegistry};
pub use share_scope::{ShareScope, ShareScopeEntry, ShareScopeSnapshot, SharedFactory};

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::config::ShareStrategy;
use crate::error::Result;
use crate::manifest::Manifest;

/// Getter backing a module property
pub type Getter = Arc<dyn Fn() -> Value + Send + Sync>;

/// One own property of a module object
#[derive(Clone)]
pub enum Property {
    /// Plain data property
    Value(Value),
    /// Accessor, evaluated on every read
    Getter(Getter),
}

impl Property {
    /// Current value of the property
    pub fn read(&self) -> Value {
        match self {
            Property::Value(value) => value.clone(),
            Property::Getter(getter) => getter(),
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Property::Getter(_) => f.write_str("Getter"),
        }
    }
}

/// The exports of an evaluated module
#[derive(Debug, Clone, Default)]
pub struct ModuleObject {
    properties: IndexMap<String, Property>,
}

impl ModuleObject {
    /// Empty module
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a data property
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), Property::Value(value.into()));
        self
    }

    /// Add an accessor property
    pub fn with_getter(
        mut self,
        name: impl Into<String>,
        getter: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Self {
        self.properties
            .insert(name.into(), Property::Getter(Arc::new(getter)));
        self
    }

    /// Read a property
    pub fn get(&self, name: &str) -> Option<Value> {
        self.properties.get(name).map(Property::read)
    }

    /// Own properties in definition order
    pub fn properties(&self) -> impl Iterator<Item = (&String, &Property)> {
        self.properties.iter()
    }

    /// Number of own properties
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the module has no properties
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Stable registry object that importers hold on to.
///
/// The slot is created empty on first request and filled in place once the module
/// loads, so references taken before the load completes observe the final exports.
#[derive(Debug, Default)]
pub struct ModuleSlot {
    properties: RwLock<IndexMap<String, Property>>,
}

impl ModuleSlot {
    /// Empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy every own property of `module` onto the slot, getters included.
    pub fn assign(&self, module: &ModuleObject) {
        let mut properties = self.properties.write();
        for (name, property) in module.properties() {
            properties.insert(name.clone(), property.clone());
        }
    }

    /// Read a property
    pub fn get(&self, name: &str) -> Option<Value> {
        self.properties.read().get(name).map(Property::read)
    }

    /// Whether nothing has been assigned yet
    pub fn is_empty(&self) -> bool {
        self.properties.read().is_empty()
    }

    /// Copy of the current exports
    pub fn snapshot(&self) -> ModuleObject {
        ModuleObject {
            properties: self.properties.read().clone(),
        }
    }
}

/// Marks that a container is initializing a share scope
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InitToken {
    /// Share scope name
    pub scope: String,
    /// Container instance name
    pub from: String,
}

impl InitToken {
    /// Create a token
    pub fn new(scope: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            from: from.into(),
        }
    }
}

/// Tokens of every container already initializing along the current call chain
pub type InitScope = BTreeSet<InitToken>;

/// How a shared module is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPath {
    /// Module is bundled and available immediately
    Sync,
    /// Module may need a remote container to load first
    Async,
}

/// The sharing runtime that generated bundles call into
#[async_trait]
pub trait SharingRuntime: Send + Sync {
    /// Provide a shared module, loading its provider if needed
    async fn load_share(&self, id: &str) -> Result<ModuleObject>;

    /// Provide a shared module that must already be available
    fn load_share_sync(&self, id: &str) -> Result<ModuleObject>;

    /// Load `<alias>/<path>` from a remote container
    async fn load_remote(&self, id: &str) -> Result<ModuleObject>;

    /// Merge provided share scope entries
    fn init_share_scope_map(&self, scope: &str, snapshot: &ShareScopeSnapshot);

    /// Prepare a share scope, initializing remotes where the strategy requires it
    async fn initialize_sharing(
        &self,
        scope: &str,
        strategy: ShareStrategy,
        init_scope: InitScope,
    ) -> Result<()>;
}

/// Fetches and evaluates a bundle by URL
#[async_trait]
pub trait BundleFetcher: Send + Sync {
    /// Load and evaluate the bundle at `url`
    async fn load_bundle(&self, url: &str) -> Result<()>;

    /// Fetch a remote's `mf-manifest.json`
    async fn fetch_manifest(&self, url: &str) -> Result<Manifest>;
}
