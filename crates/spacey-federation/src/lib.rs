// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-federation
//!
//! Module Federation for React Native bundles.
//!
//! A *host* application and one or more *remotes* are built independently and share
//! code at runtime. This crate provides the build-time half of that arrangement and a
//! model of the runtime half:
//!
//! - Federation-aware module resolution with generated (virtual) modules
//! - Classification of statically reached shared and remote modules per entry point
//! - Bundle serialization with preload preambles, plus lazy bundle splitting
//! - `mf-manifest.json` generation and dev-server request rewriting
//! - A runtime registry, share scope and container protocol with cycle-safe `init`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spacey_federation::{BuildOptions, FederationCommand, ModuleFederation, ModuleFederationConfig};
//!
//! let options = ModuleFederationConfig::load(Path::new("federation.config.json"))?;
//! let build = BuildOptions::new(".", FederationCommand::from_arg("start")).from_env();
//! if let Some(federation) = ModuleFederation::new(options, build)? {
//!     federation.prepare()?;
//!     let resolver = federation.resolver(Arc::new(NodeModulesResolver::new()));
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classifier;
pub mod codegen;
pub mod config;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod modules;
pub mod paths;
pub mod plugin;
pub mod resolver;
pub mod runtime;
pub mod serializer;
pub mod server;
pub mod vm;

// Re-exports
pub use classifier::{DependencyClassifier, SyncDependencies};
pub use config::{
    BuildOptions, FederationCommand, ModuleFederationConfig, NormalizedConfig, ShareStrategy,
};
pub use error::{FederationError, Result};
pub use graph::{AsyncType, Dependency, DependencyGraph, Module};
pub use manifest::Manifest;
pub use plugin::{BundleRequest, ModuleFederation};
pub use resolver::{ModuleResolver, NodeModulesResolver, Resolution, ResolutionContext, Resolve};
pub use serializer::{BundleSerializer, SerializerOptions, SplitOutput};
pub use server::RequestRewriter;
pub use vm::{FileHasher, FileTransformer, VirtualModuleManager};

/// Version of spacey-federation
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
