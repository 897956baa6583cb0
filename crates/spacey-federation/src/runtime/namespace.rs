// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Process-wide federation state, keyed by instance name

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::{FederationContainer, ShareScope};
use crate::classifier::SyncDependencies;

/// State of one federation instance (`__FEDERATION__.__NATIVE__[name]`)
#[derive(Default)]
pub struct InstanceScope {
    location: RwLock<Option<String>>,
    shared_deps: RwLock<HashMap<String, Vec<String>>>,
    remote_deps: RwLock<HashMap<String, Vec<String>>>,
    exports: RwLock<Option<Arc<FederationContainer>>>,
}

impl InstanceScope {
    /// URL the instance's container was loaded from
    pub fn location(&self) -> Option<String> {
        self.location.read().clone()
    }

    /// Record the container URL
    pub fn set_location(&self, location: impl Into<String>) {
        *self.location.write() = Some(location.into());
    }

    /// Record the preload lists of a split bundle
    pub fn record_deps(&self, bundle_id: &str, deps: SyncDependencies) {
        self.shared_deps
            .write()
            .insert(bundle_id.to_string(), deps.shared);
        self.remote_deps
            .write()
            .insert(bundle_id.to_string(), deps.remotes);
    }

    /// Preload lists recorded for a bundle, empty when unknown
    pub fn deps_for(&self, bundle_id: &str) -> SyncDependencies {
        SyncDependencies {
            shared: self
                .shared_deps
                .read()
                .get(bundle_id)
                .cloned()
                .unwrap_or_default(),
            remotes: self
                .remote_deps
                .read()
                .get(bundle_id)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Publish the container's `get`/`init`
    pub fn set_exports(&self, container: Arc<FederationContainer>) {
        *self.exports.write() = Some(container);
    }

    /// The published container, if its bundle has run
    pub fn exports(&self) -> Option<Arc<FederationContainer>> {
        self.exports.read().clone()
    }
}

/// Thread-safe federation namespace
#[derive(Default)]
pub struct FederationNamespace {
    /// Instance name -> scope
    instances: DashMap<String, Arc<InstanceScope>>,
    /// Share scope name -> providers
    share_scopes: DashMap<String, Arc<ShareScope>>,
}

impl FederationNamespace {
    /// Create an empty namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope of an instance, created on first access
    pub fn scope(&self, name: &str) -> Arc<InstanceScope> {
        self.instances.entry(name.to_string()).or_default().clone()
    }

    /// Scope of an instance, if it exists
    pub fn get(&self, name: &str) -> Option<Arc<InstanceScope>> {
        self.instances.get(name).map(|entry| entry.clone())
    }

    /// Check if an instance has a scope
    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    /// Drop an instance scope
    pub fn remove(&self, name: &str) -> Option<Arc<InstanceScope>> {
        self.instances.remove(name).map(|(_, scope)| scope)
    }

    /// Names of every known instance
    pub fn names(&self) -> Vec<String> {
        self.instances.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Share scope by name, created on first access
    pub fn share_scope(&self, name: &str) -> Arc<ShareScope> {
        self.share_scopes
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ShareScope::new(name)))
            .clone()
    }

    /// Get the number of instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Check if the namespace is empty
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
