//! Runtime context handed to kit commands.
//!
//! The context is a cheap clonable handle: the shared components sit behind
//! one `Arc`, and the active kit is referenced weakly so a context that
//! outlives its invocation never keeps a kit alive.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use serde_json::{json, Value};

use super::KitContext;
use crate::core::{EnvProbe, Home, KitConfig, Settings};
use crate::module::{ModuleDescriptor, ModuleNaming, ModuleResolver, ResolutionResult};
use crate::registry::PackageRegistry;

/// Environment variable carrying the invocation to subprocess kits.
pub const CONTEXT_ENV: &str = "KITHOST_CONTEXT";

/// Process-wide components shared by every runtime context.
pub struct Services {
    /// Home layout.
    pub home: Home,
    /// Host settings.
    pub settings: Arc<Settings>,
    /// Kit configuration.
    pub config: KitConfig,
    /// Project directory consulted for `kithost.toml`.
    pub project_root: Option<PathBuf>,
    /// Package registry client.
    pub registry: Arc<dyn PackageRegistry>,
    /// Network environment probe.
    pub env: Arc<EnvProbe>,
    /// Module resolver.
    pub resolver: Arc<ModuleResolver>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("home", &self.home)
            .field("project_root", &self.project_root)
            .finish_non_exhaustive()
    }
}

/// What a kit command sees of the host.
#[derive(Clone)]
pub struct RuntimeContext {
    namespace: String,
    services: Arc<Services>,
    kit: Weak<KitContext>,
    current_command: Option<String>,
    client_args: Vec<String>,
    client_options: BTreeMap<String, String>,
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("namespace", &self.namespace)
            .field("current_command", &self.current_command)
            .field("client_args", &self.client_args)
            .field("client_options", &self.client_options)
            .finish_non_exhaustive()
    }
}

impl RuntimeContext {
    /// Context with no kit bound and no invocation.
    pub fn new(namespace: impl Into<String>, services: Arc<Services>) -> Self {
        Self {
            namespace: namespace.into(),
            services,
            kit: Weak::new(),
            current_command: None,
            client_args: Vec::new(),
            client_options: BTreeMap::new(),
        }
    }

    /// Attach the invocation being dispatched.
    #[must_use]
    pub fn with_invocation(
        mut self,
        command: impl Into<String>,
        args: Vec<String>,
        options: BTreeMap<String, String>,
    ) -> Self {
        self.current_command = Some(command.into());
        self.client_args = args;
        self.client_options = options;
        self
    }

    pub(crate) fn bind_kit(&mut self, kit: &Arc<KitContext>) {
        self.kit = Arc::downgrade(kit);
    }

    /// Tool namespace, used as the log prefix.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Kit configuration.
    pub fn config(&self) -> &KitConfig {
        &self.services.config
    }

    /// Project directory, when running inside one.
    pub fn project_root(&self) -> Option<&Path> {
        self.services.project_root.as_deref()
    }

    /// Configured value, project shadowing home.
    pub fn get_config(&self, key: &str) -> Option<toml::Value> {
        self.services.config.get(key, self.project_root())
    }

    /// Every configured value, project shadowing home.
    pub fn get_all_config(&self) -> toml::Table {
        self.services.config.get_all(self.project_root())
    }

    /// Configured kit name.
    pub fn get_kit_name(&self) -> Option<String> {
        self.services.config.get_kit_name(self.project_root())
    }

    /// Home layout.
    pub fn home(&self) -> &Home {
        &self.services.home
    }

    /// Host settings.
    pub fn settings(&self) -> &Settings {
        &self.services.settings
    }

    /// Package registry client.
    pub fn registry(&self) -> &Arc<dyn PackageRegistry> {
        &self.services.registry
    }

    /// Network environment probe.
    pub fn env(&self) -> &EnvProbe {
        &self.services.env
    }

    /// Naming helpers.
    pub fn naming(&self) -> &ModuleNaming {
        self.services.resolver.naming()
    }

    /// Logger tagged with a module name.
    pub fn log(&self, module: impl Into<String>) -> KitLog {
        KitLog { namespace: self.namespace.clone(), module: module.into() }
    }

    /// Resolve another module, installing it when needed.
    pub async fn require(&self, name: &str) -> ResolutionResult<ModuleDescriptor> {
        self.services.resolver.get_module(name).await
    }

    /// Module configuration exposed by the bound kit.
    pub fn get_module_config(&self, key: &str) -> Option<Value> {
        self.kit()?.modules.get(key).cloned()
    }

    /// Positional arguments after the command name.
    pub fn client_args(&self) -> &[String] {
        &self.client_args
    }

    /// `--set key=value` options.
    pub fn client_options(&self) -> &BTreeMap<String, String> {
        &self.client_options
    }

    /// Command being dispatched.
    pub fn current_command(&self) -> Option<&str> {
        self.current_command.as_deref()
    }

    /// The bound kit, if it is still loaded.
    pub fn kit(&self) -> Option<Arc<KitContext>> {
        self.kit.upgrade()
    }

    /// Invocation document passed to subprocess kits.
    pub fn invocation(&self) -> Value {
        json!({
            "namespace": self.namespace,
            "kit": self.kit().map(|k| k.name.clone()),
            "command": self.current_command,
            "args": self.client_args,
            "options": self.client_options,
            "home": self.services.home.get_home_path(),
        })
    }
}

/// Logger handed to kits.
#[derive(Debug, Clone)]
pub struct KitLog {
    namespace: String,
    module: String,
}

impl KitLog {
    /// Module this logger is tagged with.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Informational message.
    pub fn info(&self, message: impl fmt::Display) {
        tracing::info!(ns = %self.namespace, module = %self.module, "{message}");
    }

    /// Completion message.
    pub fn success(&self, message: impl fmt::Display) {
        tracing::info!(ns = %self.namespace, module = %self.module, success = true, "{message}");
    }

    /// Warning.
    pub fn warn(&self, message: impl fmt::Display) {
        tracing::warn!(ns = %self.namespace, module = %self.module, "{message}");
    }

    /// Error.
    pub fn error(&self, message: impl fmt::Display) {
        tracing::error!(ns = %self.namespace, module = %self.module, "{message}");
    }

    /// Debug detail.
    pub fn debug(&self, message: impl fmt::Display) {
        tracing::debug!(ns = %self.namespace, module = %self.module, "{message}");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::core::{CacheStore, ManualClock};
    use crate::module::{ErrorRecoveryRegistry, UpdateChecker};
    use crate::registry::NpmRegistry;

    /// Services over a temp home with a registry that is never reachable.
    pub(crate) fn services(root: &Path) -> Arc<Services> {
        let home = Home::new(root);
        home.init().unwrap();
        let settings = Arc::new(Settings::default());
        let cache = Arc::new(CacheStore::in_memory(Arc::new(ManualClock::new(0))));
        let registry: Arc<dyn PackageRegistry> =
            Arc::new(NpmRegistry::new("http://127.0.0.1:9", "npm").unwrap());
        let checker =
            Arc::new(UpdateChecker::new(
                cache.clone(),
                registry.clone(),
                home.clone(),
                settings.clone(),
            ));
        let resolver = Arc::new(ModuleResolver::new(
            home.clone(),
            settings.clone(),
            cache.clone(),
            registry.clone(),
            checker,
            Arc::new(ErrorRecoveryRegistry::new()),
        ));

        Arc::new(Services {
            config: KitConfig::new(home.get_config_file_path()),
            env: Arc::new(EnvProbe::new(&settings, cache)),
            home,
            settings,
            project_root: None,
            registry,
            resolver,
        })
    }
}
