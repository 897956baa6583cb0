// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the federation layer

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type for federation operations
pub type Result<T> = std::result::Result<T, FederationError>;

/// Errors that can occur while resolving, serializing or running federated bundles
#[derive(Debug, Error)]
pub enum FederationError {
    /// Invalid federation configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Registry lookup of a module that was never registered
    #[error("Module {0} not found in registry")]
    Lookup(String),

    /// Virtual module generator failed
    #[error("Failed to generate virtual module '{}'", path.display())]
    Generator {
        /// Virtual module path
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: Box<FederationError>,
    },

    /// Module not found
    #[error("Cannot find module '{0}'")]
    ModuleNotFound(String),

    /// Module resolution error
    #[error("Error resolving module '{module}': {reason}")]
    ModuleResolution {
        /// Module specifier
        module: String,
        /// Reason for failure
        reason: String,
    },

    /// Remote container could not be loaded
    #[error("Failed to load remote entry: {name}. Reason: {reason}")]
    RemoteLoad {
        /// Remote container name
        name: String,
        /// Reason for failure
        reason: String,
    },

    /// Container protocol error
    #[error("{0}")]
    Container(String),

    /// Shared module could not be provided by the share scope
    #[error("Shared module '{0}' is not available in the share scope")]
    SharedUnavailable(String),

    /// Bundle loading error
    #[error("Bundle error: {0}")]
    Bundle(String),

    /// File system error
    #[error("File system error: {0}")]
    Fs(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Error observed by a single-flight load shared between callers
    #[error(transparent)]
    Shared(Arc<FederationError>),
}

impl FederationError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a registry lookup error
    pub fn lookup(id: impl Into<String>) -> Self {
        Self::Lookup(id.into())
    }

    /// Create a module not found error
    pub fn module_not_found(module: impl Into<String>) -> Self {
        Self::ModuleNotFound(module.into())
    }

    /// Attach a virtual module path to a generator failure
    pub fn generator(path: impl Into<PathBuf>, source: FederationError) -> Self {
        Self::Generator {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Create a remote load error
    pub fn remote_load(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::RemoteLoad {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<Arc<FederationError>> for FederationError {
    fn from(err: Arc<FederationError>) -> Self {
        Self::Shared(err)
    }
}
