// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host bootstrap sequence

use futures::future::{try_join, try_join_all};
use std::sync::Arc;
use tracing::info;

use super::{InitScope, SharedModuleRegistry, SharingRuntime};
use crate::classifier::SyncDependencies;
use crate::config::{NormalizedConfig, ShareStrategy};
use crate::error::Result;
use crate::modules::SHARE_SCOPE;

/// Runs before the host's main module
pub struct HostBootstrap {
    name: String,
    share_strategy: ShareStrategy,
    shared: Vec<String>,
    preload: SyncDependencies,
    runtime: Arc<dyn SharingRuntime>,
    registry: Arc<SharedModuleRegistry>,
}

impl HostBootstrap {
    /// Create the bootstrap for a host configuration.
    ///
    /// `preload` carries the container preamble: `__EARLY_SHARED__` and
    /// `__EARLY_REMOTES__` of the main bundle.
    pub fn new(
        config: &NormalizedConfig,
        preload: SyncDependencies,
        runtime: Arc<dyn SharingRuntime>,
        registry: Arc<SharedModuleRegistry>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            share_strategy: config.share_strategy,
            shared: config.shared.keys().cloned().collect(),
            preload,
            runtime,
            registry,
        }
    }

    /// Sync-load early shared modules, initialize sharing, then load every declared
    /// shared module and the remotes the main bundle needs synchronously.
    pub async fn run(&self) -> Result<()> {
        for id in &self.preload.shared {
            self.registry.load_shared_to_registry_sync(id)?;
        }

        self.runtime
            .initialize_sharing(SHARE_SCOPE, self.share_strategy, InitScope::new())
            .await?;

        try_join(
            try_join_all(
                self.shared
                    .iter()
                    .map(|id| self.registry.load_shared_to_registry(id)),
            ),
            try_join_all(
                self.preload
                    .remotes
                    .iter()
                    .map(|id| self.registry.load_remote_to_registry(id)),
            ),
        )
        .await?;

        info!(
            "Host '{}' ready: {} shared, {} remote modules preloaded",
            self.name,
            self.shared.len(),
            self.preload.remotes.len()
        );
        Ok(())
    }
}
