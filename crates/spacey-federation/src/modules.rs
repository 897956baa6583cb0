// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Generators for the virtual modules served to the bundler.
//!
//! Each generator is a pure function of the normalized configuration, so running it
//! twice yields identical text and the virtual module manager sees no change.

use crate::codegen::{Expr, ModuleBuilder, Stmt};
use crate::config::{NormalizedConfig, SharedConfig, SharedImport};
use crate::paths::FederationPaths;

/// Internal name of the host bootstrap module
pub const INIT_HOST: &str = "mf:init-host";
/// Internal name of the bundle loader wrapper
pub const ASYNC_REQUIRE: &str = "mf:async-require";
/// Internal name of the registry module
pub const REMOTE_MODULE_REGISTRY: &str = "mf:remote-module-registry";
/// Internal name of the remote hot-reload setup module
pub const REMOTE_HMR_SETUP: &str = "mf:remote-hmr";

/// Runtime package providing `init`, `loadShare` and `loadRemote`
pub const RUNTIME_PACKAGE: &str = "@module-federation/runtime";

/// Share scope used by every generated module
pub const SHARE_SCOPE: &str = "default";

const NAMESPACE: &str = "globalThis.__FEDERATION__.__NATIVE__";

fn scope_of(name: &str) -> Expr {
    Expr::index(Expr::ident(NAMESPACE), Expr::str(name))
}

/// `import pluginN from "<path>";` followed by `const plugins = [plugin0(), ...];`
fn runtime_plugins(plugins: &[String]) -> Vec<Stmt> {
    let mut stmts = Vec::with_capacity(plugins.len() + 1);
    let mut calls = Vec::with_capacity(plugins.len());
    for (index, plugin) in plugins.iter().enumerate() {
        let local = format!("plugin{}", index);
        calls.push(Expr::call(Expr::ident(local.clone()), vec![]));
        stmts.push(Stmt::ImportDefault {
            local,
            source: plugin.clone(),
        });
    }
    stmts.push(Stmt::Const("plugins".into(), Expr::Array(calls)));
    stmts
}

/// Remote descriptors handed to the runtime `init`
fn remotes_expr(config: &NormalizedConfig) -> Expr {
    Expr::Array(
        config
            .remote_entries()
            .into_iter()
            .map(|remote| {
                Expr::Object(vec![
                    ("alias".into(), Expr::str(remote.alias)),
                    ("name".into(), Expr::str(remote.name.clone())),
                    ("entry".into(), Expr::str(remote.entry)),
                    ("entryGlobalName".into(), Expr::str(remote.name)),
                    ("type".into(), Expr::str("var")),
                ])
            })
            .collect(),
    )
}

/// Share getter: eager modules are required synchronously, others imported lazily.
pub fn share_getter(specifier: &str, eager: bool) -> Expr {
    if eager {
        Expr::arrow(&[], Expr::arrow(&[], Expr::Require(specifier.to_string())))
    } else {
        Expr::async_arrow(
            &[],
            Expr::call(
                Expr::member(Expr::DynamicImport(specifier.to_string()), "then"),
                vec![Expr::arrow(&["m"], Expr::arrow(&[], Expr::ident("m")))],
            ),
        )
    }
}

fn shared_entry(name: &str, shared: &SharedConfig) -> Expr {
    let specifier = match &shared.import {
        SharedImport::Specifier(specifier) => specifier.as_str(),
        _ => name,
    };
    Expr::Object(vec![
        ("version".into(), Expr::str(shared.version.clone())),
        ("scope".into(), Expr::str(SHARE_SCOPE)),
        (
            "shareConfig".into(),
            Expr::Object(vec![
                ("singleton".into(), Expr::Bool(shared.singleton)),
                ("eager".into(), Expr::Bool(shared.eager)),
                (
                    "requiredVersion".into(),
                    Expr::opt_str(shared.required_version.as_deref()),
                ),
            ]),
        ),
        ("get".into(), share_getter(specifier, shared.eager)),
    ])
}

/// The `shared` object handed to the runtime `init`
pub fn shared_expr(config: &NormalizedConfig) -> Expr {
    Expr::Object(
        config
            .shared
            .iter()
            .map(|(name, shared)| (name.clone(), shared_entry(name, shared)))
            .collect(),
    )
}

fn namespace_setup(name: &str) -> Vec<Stmt> {
    vec![
        Stmt::AssignDefault(Expr::ident("globalThis.__FEDERATION__"), Expr::Object(vec![])),
        Stmt::AssignDefault(Expr::ident(NAMESPACE), Expr::Object(vec![])),
        Stmt::AssignDefault(scope_of(name), Expr::Object(vec![])),
        Stmt::AssignDefault(
            Expr::member(scope_of(name), "deps"),
            Expr::Object(vec![
                ("shared".into(), Expr::Object(vec![])),
                ("remotes".into(), Expr::Object(vec![])),
            ]),
        ),
    ]
}

fn runtime_common(config: &NormalizedConfig) -> Vec<Stmt> {
    let mut stmts = runtime_plugins(&config.plugins);
    stmts.push(Stmt::Const("usedRemotes".into(), remotes_expr(config)));
    stmts.push(Stmt::Const("usedShared".into(), shared_expr(config)));
    stmts.push(Stmt::Const("name".into(), Expr::str(config.name.clone())));
    stmts.push(Stmt::Const("shareScopeName".into(), Expr::str(SHARE_SCOPE)));
    stmts.push(Stmt::Const(
        "shareStrategy".into(),
        Expr::str(config.share_strategy.as_str()),
    ));
    stmts
}

/// Host bootstrap: initializes the runtime, then loads baseline shared modules
/// synchronously and everything else asynchronously.
pub fn init_host_module(config: &NormalizedConfig) -> String {
    let mut module = ModuleBuilder::new();
    module
        .push(Stmt::ImportNamed {
            names: vec![
                "loadRemoteToRegistry".into(),
                "loadSharedToRegistry".into(),
                "loadSharedToRegistrySync".into(),
            ],
            source: REMOTE_MODULE_REGISTRY.into(),
        })
        .push(Stmt::ImportNamed {
            names: vec!["init".into()],
            source: RUNTIME_PACKAGE.into(),
        })
        .extend(runtime_common(config))
        .raw(
            "const instance = init({\n  name,\n  remotes: usedRemotes,\n  plugins,\n  shared: usedShared,\n  shareStrategy,\n});",
        )
        .extend(namespace_setup(&config.name))
        .raw("__EARLY_SHARED__.forEach(loadSharedToRegistrySync);")
        .raw(INIT_HOST_SHARE_INIT);
    module.build()
}

const INIT_HOST_SHARE_INIT: &str = r#"globalThis.__FEDERATION__.__NATIVE__[name].__shareInit = Promise.all(
  instance.initializeSharing(shareScopeName, {
    strategy: shareStrategy,
    from: "build",
    initScope: [],
  })
).then(() =>
  Promise.all([
    ...Object.keys(usedShared).map(loadSharedToRegistry),
    ...__EARLY_REMOTES__.map(loadRemoteToRegistry),
  ])
);"#;

/// Container entry exposing `get` and `init`.
pub fn remote_entry_module(config: &NormalizedConfig, paths: &FederationPaths) -> String {
    let exposes = Expr::Object(
        config
            .exposes
            .iter()
            .map(|(key, source)| {
                let loader =
                    Expr::arrow(&[], Expr::DynamicImport(paths.project_import(source)));
                (key.clone(), loader)
            })
            .collect(),
    );

    let mut module = ModuleBuilder::new();
    module
        .push(Stmt::ImportSideEffect(ASYNC_REQUIRE.into()))
        .push(Stmt::ImportNamed {
            names: vec!["loadSharedToRegistry".into()],
            source: REMOTE_MODULE_REGISTRY.into(),
        })
        .push(Stmt::ImportNamed {
            names: vec!["init as runtimeInit".into()],
            source: RUNTIME_PACKAGE.into(),
        })
        .extend(runtime_common(config))
        .push(Stmt::Const("exposesMap".into(), exposes))
        .push(Stmt::Const(
            "earlyShared".into(),
            Expr::str_array(config.early_shared()),
        ))
        .push(Stmt::Const(
            "eagerShared".into(),
            Expr::str_array(
                config
                    .shared
                    .iter()
                    .filter(|(_, shared)| shared.eager)
                    .map(|(name, _)| name.clone()),
            ),
        ))
        .raw(REMOTE_ENTRY_BODY)
        .extend(namespace_setup(&config.name))
        .push(Stmt::Assign(
            Expr::member(scope_of(&config.name), "exports"),
            Expr::Object(vec![
                ("get".into(), Expr::ident("get")),
                ("init".into(), Expr::ident("init")),
            ]),
        ));
    module.build()
}

const REMOTE_ENTRY_BODY: &str = r#"function get(moduleName) {
  if (!(moduleName in exposesMap)) {
    throw new Error(`Module ${moduleName} does not exist in container.`);
  }
  return exposesMap[moduleName]().then((m) => () => m);
}

const initTokens = {};
let hmrInitialized = false;

async function init(shared = {}, initScope = []) {
  const instance = runtimeInit({
    name,
    remotes: usedRemotes,
    shared: usedShared,
    plugins,
    shareStrategy,
  });
  let initToken = initTokens[shareScopeName];
  if (!initToken) {
    initToken = initTokens[shareScopeName] = { from: name };
  }
  if (initScope.indexOf(initToken) >= 0) {
    return;
  }
  initScope.push(initToken);
  instance.initShareScopeMap(shareScopeName, shared);

  await Promise.all(
    instance.initializeSharing(shareScopeName, {
      strategy: shareStrategy,
      from: "build",
      initScope,
    })
  );

  await Promise.all(earlyShared.map((id) => loadSharedToRegistry(id)));

  if (__DEV__ && !hmrInitialized) {
    require("mf:remote-hmr").setup();
    hmrInitialized = true;
  }

  await Promise.all(
    Object.keys(usedShared)
      .filter((id) => !earlyShared.includes(id))
      .map((id) => loadSharedToRegistry(id, eagerShared.includes(id)))
  );

  return instance;
}"#;

/// Registry backing every remote and shared proxy module.
pub fn registry_module(config: &NormalizedConfig) -> String {
    let mut module = ModuleBuilder::new();
    module
        .push(Stmt::ImportNamed {
            names: vec![
                "loadRemote".into(),
                "loadShare".into(),
                "loadShareSync".into(),
            ],
            source: RUNTIME_PACKAGE.into(),
        })
        .push(Stmt::Const(
            "baselineShared".into(),
            Expr::str_array(config.baseline_shared.iter().cloned()),
        ))
        .raw(REGISTRY_BODY);
    module.build()
}

const REGISTRY_BODY: &str = r#"const registry = (globalThis.__FEDERATION_REGISTRY__ ??= {});
const loading = (globalThis.__FEDERATION_LOADING__ ??= {});

function isBaseline(id) {
  return baselineShared.some((name) => id === name || id.startsWith(name + "/"));
}

function assign(id, exports) {
  const slot = (registry[id] ??= {});
  Object.getOwnPropertyNames(exports).forEach((key) => {
    Object.defineProperty(slot, key, Object.getOwnPropertyDescriptor(exports, key));
  });
}

export function loadSharedToRegistry(id, sync = false) {
  if (loading[id]) {
    return loading[id];
  }
  registry[id] ??= {};
  loading[id] = (async () => {
    const factory = sync || isBaseline(id) ? loadShareSync(id) : await loadShare(id);
    assign(id, factory());
  })();
  return loading[id];
}

export function loadSharedToRegistrySync(id) {
  registry[id] ??= {};
  assign(id, loadShareSync(id)());
  loading[id] = Promise.resolve();
}

export function loadRemoteToRegistry(id) {
  if (loading[id]) {
    return loading[id];
  }
  registry[id] ??= {};
  loading[id] = loadRemote(id).then((exports) => assign(id, exports));
  return loading[id];
}

export function getModuleFromRegistry(id) {
  const module = registry[id];
  if (!module) {
    throw new Error(`Module ${id} not found in registry`);
  }
  return module;
}"#;

/// Remote and shared proxy: forwards to the registry slot for `id`.
pub fn proxy_module(id: &str) -> String {
    let mut module = ModuleBuilder::new();
    module
        .push(Stmt::Const(
            "registry".into(),
            Expr::Require(REMOTE_MODULE_REGISTRY.into()),
        ))
        .push(Stmt::ModuleExports(Expr::call(
            Expr::member(Expr::ident("registry"), "getModuleFromRegistry"),
            vec![Expr::str(id)],
        )));
    module.build()
}

/// Remote hot-reload client setup, driven by the container location.
pub fn remote_hmr_module(name: &str) -> String {
    let mut module = ModuleBuilder::new();
    module
        .push(Stmt::Const("scope".into(), scope_of(name)))
        .raw(REMOTE_HMR_BODY);
    module.build()
}

const REMOTE_HMR_BODY: &str = r#"export function setup() {
  const HMRClient = require("react-native/Libraries/Utilities/HMRClient");
  const platform = require("react-native").Platform.OS;
  const url = new URL(scope.location);
  const path = url.pathname.slice(1) + url.search;
  const scheme = url.protocol.replace(":", "");
  HMRClient.default.setup(platform, path, url.hostname, url.port, true, scheme);
}"#;

/// Bundle loader wrapper: resolves split bundles against the container location and
/// preloads the shared/remote modules recorded for each bundle.
pub fn async_require_module(name: &str) -> String {
    let mut module = ModuleBuilder::new();
    module
        .push(Stmt::Const("scopeName".into(), Expr::str(name)))
        .raw(ASYNC_REQUIRE_BODY);
    module.build()
}

const ASYNC_REQUIRE_BODY: &str = r#"function joinComponents(prefix, suffix) {
  return prefix.replace(/\/+$/, "") + "/" + suffix.replace(/^\/+/, "");
}

function getPublicPath(url) {
  return url.split("/").slice(0, -1).join("/");
}

function getBundleId(urlPath) {
  const [bundlePath] = urlPath.split("?");
  return bundlePath.slice(1).replace(".bundle", "");
}

function getBundlePath(bundlePath, origin) {
  if (process.env.NODE_ENV !== "production") return bundlePath;
  if (/^https?:\/\//.test(bundlePath)) return bundlePath;
  if (!origin) return bundlePath;
  return joinComponents(getPublicPath(origin), bundlePath);
}

const loadBundleAsync = globalThis[`${scopeName}__loadBundleAsync`];

globalThis[`${scopeName}__loadBundleAsync`] = async (originalBundlePath) => {
  const registry = require("mf:remote-module-registry");
  const scope = globalThis.__FEDERATION__.__NATIVE__[scopeName];
  const bundlePath = getBundlePath(originalBundlePath, scope.location);
  const result = await loadBundleAsync(bundlePath);

  const bundleId = getBundleId(originalBundlePath);
  const shared = scope.deps.shared[bundleId] ?? [];
  const remotes = scope.deps.remotes[bundleId] ?? [];
  await Promise.all([
    ...shared.map(registry.loadSharedToRegistry),
    ...remotes.map(registry.loadRemoteToRegistry),
  ]);

  return result;
};"#;

/// Dev-server discovery for remotes: reads the container location.
pub fn dev_server_module(name: &str) -> String {
    let mut module = ModuleBuilder::new();
    module
        .push(Stmt::Const("scopeName".into(), Expr::str(name)))
        .raw(DEV_SERVER_BODY);
    module.build()
}

const DEV_SERVER_BODY: &str = r#"export default function getDevServer() {
  const scriptUrl = globalThis.__FEDERATION__.__NATIVE__[scopeName].location;
  if (!scriptUrl) {
    throw new Error(`Cannot determine dev server URL for ${scopeName} remote`);
  }
  return {
    url: scriptUrl.match(/^https?:\/\/.*?\//)[0],
    fullBundleUrl: scriptUrl,
  };
}"#;

/// No-op hot-reload client used by the dedicated bundle commands.
pub fn hmr_client_shim_module() -> String {
    let mut module = ModuleBuilder::new();
    module.raw(HMR_CLIENT_SHIM_BODY);
    module.build()
}

const HMR_CLIENT_SHIM_BODY: &str = r#"const HMRClientShim = {
  setup() {},
  enable() {},
  disable() {},
  registerBundle() {},
  log() {},
};

export default HMRClientShim;"#;
