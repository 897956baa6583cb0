// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Dev-server request rewriting and manifest serving

use std::sync::Arc;
use tracing::trace;
use url::Url;

use crate::error::Result;
use crate::paths::{replace_extension, to_posix, FederationPaths, MANIFEST_FILENAME};

/// Project root placeholder understood by the dev server
pub const PROJECT_ROOT_PLACEHOLDER: &str = "[metro-project]";

/// Base used to parse relative request URLs
const URL_BASE: &str = "protocol://host";

/// A request URL rewriter installed ahead of ours
pub type UpstreamRewriter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Maps federation request paths onto files the dev server knows how to build
#[derive(Clone)]
pub struct RequestRewriter {
    filename: String,
    manifest_target: String,
    upstream: Option<UpstreamRewriter>,
}

impl RequestRewriter {
    /// Create a rewriter for a container filename
    pub fn new(filename: impl Into<String>, paths: &FederationPaths) -> Self {
        let root = to_posix(&paths.project_root);
        let manifest = to_posix(&paths.manifest);
        let manifest_target = match manifest.strip_prefix(&root) {
            Some(rest) => format!("{}{}", PROJECT_ROOT_PLACEHOLDER, rest),
            None => manifest,
        };

        Self {
            filename: filename.into(),
            manifest_target,
            upstream: None,
        }
    }

    /// Chain a previously configured rewriter for URLs we do not own
    pub fn with_upstream(mut self, upstream: UpstreamRewriter) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Rewrite one request URL.
    ///
    /// `/mini.bundle` becomes `/mini.js.bundle`, and `/mf-manifest.json` is pointed at
    /// the generated manifest under the project root.
    pub fn rewrite(&self, url: &str) -> Result<String> {
        let base = Url::parse(URL_BASE)?;
        let parsed = base.join(url)?;
        let pathname = parsed.path();

        let rewritten = if pathname.starts_with(&format!("/{}", self.filename)) {
            let target = replace_extension(&self.filename, "js.bundle");
            url.replacen(&self.filename, &target, 1)
        } else if pathname.starts_with(&format!("/{}", MANIFEST_FILENAME)) {
            url.replacen(MANIFEST_FILENAME, &self.manifest_target, 1)
        } else if let Some(upstream) = &self.upstream {
            upstream(url)
        } else {
            url.to_string()
        };

        trace!("Rewrote request {} -> {}", url, rewritten);
        Ok(rewritten)
    }
}

impl std::fmt::Debug for RequestRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRewriter")
            .field("filename", &self.filename)
            .field("manifest_target", &self.manifest_target)
            .field("upstream", &self.upstream.is_some())
            .finish()
    }
}

/// Body of a `/mf-manifest.json` response
pub fn serve_manifest(paths: &FederationPaths) -> Result<String> {
    Ok(std::fs::read_to_string(&paths.manifest)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rewriter() -> RequestRewriter {
        RequestRewriter::new("mini.bundle", &FederationPaths::new("/app", "mini.bundle"))
    }

    #[test]
    fn test_container_request() {
        assert_eq!(
            rewriter().rewrite("/mini.bundle?platform=ios&dev=true").unwrap(),
            "/mini.js.bundle?platform=ios&dev=true"
        );
        assert_eq!(
            rewriter().rewrite("http://localhost:8081/mini.bundle").unwrap(),
            "http://localhost:8081/mini.js.bundle"
        );
    }

    #[test]
    fn test_manifest_request() {
        assert_eq!(
            rewriter().rewrite("/mf-manifest.json").unwrap(),
            "/[metro-project]/node_modules/.mf-metro/mf-manifest.json"
        );
    }

    #[test]
    fn test_passthrough() {
        assert_eq!(
            rewriter().rewrite("/index.bundle?platform=ios").unwrap(),
            "/index.bundle?platform=ios"
        );

        let chained = rewriter().with_upstream(Arc::new(|url: &str| format!("{}&x=1", url)));
        assert_eq!(
            chained.rewrite("/index.bundle?platform=ios").unwrap(),
            "/index.bundle?platform=ios&x=1"
        );
        assert_eq!(chained.rewrite("/mini.bundle").unwrap(), "/mini.js.bundle");
    }

    #[test]
    fn test_serve_manifest() {
        let dir = TempDir::new().unwrap();
        let paths = FederationPaths::new(dir.path(), "mini.bundle");
        assert!(serve_manifest(&paths).is_err());

        std::fs::create_dir_all(&paths.mf_metro).unwrap();
        std::fs::write(&paths.manifest, "{}").unwrap();
        assert_eq!(serve_manifest(&paths).unwrap(), "{}");
    }
}
