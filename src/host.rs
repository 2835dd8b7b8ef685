//! Host orchestration.
//!
//! [`Host`] constructs every shared component once per process and runs
//! top-level operations against them:
//!
//! ```text
//! run ──► clear errors ──► pick kit ──► resolve + load kit ──► bind ──► dispatch
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::core::{CacheStore, Clock, EnvProbe, Home, KitConfig, Settings, SystemClock};
use crate::module::{
    CheckResult, CheckTarget, DefaultPolicy, ErrorCode, ErrorRecord, ErrorRecoveryRegistry,
    ModuleDescriptor, ModuleNaming, ModuleResolver, RecoveryPolicy, ResolutionError,
    UpdateChecker,
};
use crate::plugin::{KitCatalog, KitContext, LoadError, PluginContainer, RuntimeContext, Services};
use crate::registry::{NpmRegistry, PackageInfo, PackageRegistry, RegistryError};
use crate::APP_NAME;

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;

/// Top-level errors.
#[derive(Debug, Error)]
pub enum HostError {
    /// Module resolution failed.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Kit loading or dispatch failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// A direct registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Settings or config files are unusable.
    #[error("{0:#}")]
    Config(anyhow::Error),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<anyhow::Error> for HostError {
    fn from(err: anyhow::Error) -> Self {
        Self::Config(err)
    }
}

impl HostError {
    /// Classified code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Resolution(e) => e.code(),
            Self::Load(e) => e.code(),
            Self::Registry(e) => e.reason.into(),
            Self::Config(_) => ErrorCode::Config,
            Self::Io(_) => ErrorCode::CorruptLocal,
        }
    }

    /// Module the error belongs to.
    pub fn module_name(&self) -> Option<&str> {
        match self {
            Self::Resolution(e) => e.module_name(),
            Self::Load(e) => e.module_name(),
            Self::Registry(_) | Self::Config(_) | Self::Io(_) => None,
        }
    }

    /// Whether the no-found policy asked for the available modules to be offered.
    pub fn offers_install(&self) -> bool {
        matches!(
            self,
            Self::Resolution(ResolutionError::NotFound { offer_install: true, .. })
                | Self::Load(LoadError::Resolution(ResolutionError::NotFound {
                    offer_install: true,
                    ..
                }))
        )
    }

    /// One-line diagnostic: `error[<code>] <module>: <message>`.
    pub fn report(&self) -> String {
        let record = ErrorRecord::new(self.code(), self.to_string());
        match self.module_name() {
            Some(name) => record.for_module(name).to_string(),
            None => record.to_string(),
        }
    }
}

/// Builds a [`Host`].
pub struct HostBuilder {
    settings: Settings,
    registry: Option<Arc<dyn PackageRegistry>>,
    clock: Arc<dyn Clock>,
    policy: Arc<dyn RecoveryPolicy>,
    catalog: KitCatalog,
    project_root: Option<PathBuf>,
}

impl HostBuilder {
    /// Builder over `settings` with the npm registry, the system clock and
    /// the non-interactive recovery policy.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            registry: None,
            clock: Arc::new(SystemClock),
            policy: Arc::new(DefaultPolicy),
            catalog: KitCatalog::new(),
            project_root: None,
        }
    }

    /// Use a different registry client.
    pub fn registry(mut self, registry: Arc<dyn PackageRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use a different clock for cache expiry.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a different recovery policy.
    pub fn policy(mut self, policy: Arc<dyn RecoveryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Register a compiled kit under any of its names.
    pub fn kit<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&ModuleDescriptor) -> anyhow::Result<KitContext> + Send + Sync + 'static,
    {
        let full_name = ModuleNaming::from_settings(&self.settings.registry).get_kit_name(name);
        self.catalog.register(full_name, factory);
        self
    }

    /// Directory searched for `kithost.toml`.
    pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    /// Create the home layout and wire the components.
    pub async fn build(self) -> HostResult<Host> {
        self.settings.validate()?;
        let settings = Arc::new(self.settings);

        let home = Home::new(settings.home_path()?);
        home.init()?;
        tracing::debug!(home = %home.get_home_path().display(), "home ready");

        let cache = Arc::new(CacheStore::open_with_clock(home.get_cache_file_path(), self.clock));
        let env = Arc::new(EnvProbe::new(&settings, cache.clone()));

        let registry = match self.registry {
            Some(registry) => registry,
            None => {
                let url = env.get_registry().await;
                tracing::debug!(registry = %url, "using npm registry");
                let npm = NpmRegistry::new(url, &settings.registry.installer)?
                    .with_tag(&settings.registry.tag);
                Arc::new(npm)
            }
        };

        let errors = Arc::new(ErrorRecoveryRegistry::with_policy(self.policy));
        let checker = Arc::new(UpdateChecker::new(
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
            checker.clone(),
            errors.clone(),
        ));
        let container = PluginContainer::new(resolver.clone(), self.catalog, errors.clone());

        let services = Arc::new(Services {
            config: KitConfig::new(home.get_config_file_path()),
            home,
            settings,
            project_root: self.project_root,
            registry,
            env,
            resolver,
        });

        Ok(Host { services, cache, errors, checker, container })
    }
}

/// The running host.
#[derive(Debug)]
pub struct Host {
    services: Arc<Services>,
    cache: Arc<CacheStore>,
    errors: Arc<ErrorRecoveryRegistry>,
    checker: Arc<UpdateChecker>,
    container: PluginContainer,
}

impl Host {
    /// Start building a host.
    pub fn builder(settings: Settings) -> HostBuilder {
        HostBuilder::new(settings)
    }

    /// Host settings.
    pub fn settings(&self) -> &Settings {
        &self.services.settings
    }

    /// Home layout.
    pub fn home(&self) -> &Home {
        &self.services.home
    }

    /// Kit configuration.
    pub fn config(&self) -> &KitConfig {
        &self.services.config
    }

    /// Project directory, if any.
    pub fn project_root(&self) -> Option<&Path> {
        self.services.project_root.as_deref()
    }

    /// Shared cache.
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Shared error registry.
    pub fn errors(&self) -> &Arc<ErrorRecoveryRegistry> {
        &self.errors
    }

    /// Update checker.
    pub fn checker(&self) -> &Arc<UpdateChecker> {
        &self.checker
    }

    /// Module resolver.
    pub fn resolver(&self) -> &Arc<ModuleResolver> {
        &self.services.resolver
    }

    /// Plugin container.
    pub fn container(&self) -> &PluginContainer {
        &self.container
    }

    /// Environment probe.
    pub fn env(&self) -> &EnvProbe {
        &self.services.env
    }

    /// A fresh runtime context with no kit bound.
    pub fn runtime(&self) -> RuntimeContext {
        RuntimeContext::new(APP_NAME, self.services.clone())
    }

    /// Kit to use: `explicit`, then project config, then home config.
    pub fn kit_name(&self, explicit: Option<&str>) -> HostResult<String> {
        explicit
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| self.config().get_kit_name(self.project_root()))
            .ok_or(HostError::Load(LoadError::NoKit))
    }

    /// Run a kit command.
    pub async fn run(
        &self,
        command: &str,
        args: Vec<String>,
        options: BTreeMap<String, String>,
        kit: Option<&str>,
    ) -> HostResult<()> {
        self.errors.clear_error();

        let kit_name = self.kit_name(kit)?;
        tracing::debug!(kit = %kit_name, command, "dispatching");
        self.container.require_kit(&kit_name).await?;

        let runtime = self.runtime().with_invocation(command, args, options);
        self.container.run(command, runtime).await?;
        Ok(())
    }

    /// Commands of a kit with their descriptions.
    pub async fn kit_commands(&self, kit: Option<&str>) -> HostResult<Vec<(String, String)>> {
        self.errors.clear_error();
        let kit = self.container.require_kit(&self.kit_name(kit)?).await?;
        Ok(kit.commands.iter().map(|(name, cmd)| (name.clone(), cmd.description.clone())).collect())
    }

    /// Install a kit, check that it loads, and make it the active kit.
    pub async fn use_kit(&self, name: &str) -> HostResult<ModuleDescriptor> {
        self.errors.clear_error();
        let desc = self.resolver().get_kit(name).await?;
        self.container.load(&desc)?;
        self.config().set_kit_name(&desc.full_name)?;
        Ok(desc)
    }

    /// Install (or update) any module.
    pub async fn install_module(&self, name: &str) -> HostResult<ModuleDescriptor> {
        self.errors.clear_error();
        Ok(self.resolver().get_module(name).await?)
    }

    /// Remove an installed module.
    pub async fn remove_module(&self, name: &str) -> HostResult<()> {
        self.errors.clear_error();
        Ok(self.resolver().remove_module(name).await?)
    }

    /// Check the cli for a newer release.
    pub async fn check_updates(&self, force: bool) -> CheckResult {
        self.checker.check(&CheckTarget::Cli, force).await
    }

    /// Check the cli, the core packages and the active kit.
    pub async fn check_all(&self, force: bool) -> Vec<(String, CheckResult)> {
        let mut results = Vec::new();
        for target in [CheckTarget::Cli, CheckTarget::Core, CheckTarget::Base] {
            let name = self.checker.package_name(&target).to_string();
            results.push((name, self.checker.check(&target, force).await));
        }

        if let Some(kit) = self.config().get_kit_name(self.project_root()) {
            let desc = self.resolver().descriptor(&self.resolver().naming().get_kit_name(&kit));
            let result = self.checker.check(&CheckTarget::Module(desc.clone()), force).await;
            results.push((desc.full_name, result));
        }
        results
    }

    /// Install the core and base packages at their tagged versions.
    pub async fn install_core(&self) -> HostResult<Vec<PackageInfo>> {
        self.errors.clear_error();
        let mut installed = Vec::new();
        for target in [CheckTarget::Core, CheckTarget::Base] {
            installed.push(self.checker.install_core(&target).await?);
        }
        Ok(installed)
    }

    /// Drop every cached result. With `all`, also remove installed modules
    /// and core packages.
    pub fn clean(&self, all: bool) -> HostResult<()> {
        if !self.cache.clear() {
            tracing::warn!("cache file could not be rewritten, removing it");
            self.home().clean_cache_file()?;
        }
        if all {
            self.home().clean_modules_dir()?;
            self.home().clean_core_dir()?;
            self.home().init()?;
        }
        Ok(())
    }

    /// Failures recorded during the last operation.
    pub fn error_report(&self) -> Vec<ErrorRecord> {
        self.errors.get_error_list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(temp: &TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.home_dir = Some(temp.path().to_string_lossy().into_owned());
        settings.registry.url = "http://127.0.0.1:9".to_string();
        settings
    }

    #[test]
    fn test_report_format() {
        let err = HostError::from(ResolutionError::Registry {
            name: "@kithost/kit-react".into(),
            attempts: 1,
            source: RegistryError::permission("EACCES"),
        });
        assert_eq!(err.code(), ErrorCode::RegistryPermission);
        assert!(err.report().starts_with("error[permission] @kithost/kit-react: "));

        let err = HostError::from(anyhow::anyhow!("bad settings"));
        assert_eq!(err.report(), "error[config] bad settings");
    }

    #[tokio::test]
    async fn test_build_creates_home() {
        let temp = TempDir::new().unwrap();
        let host = Host::builder(settings(&temp)).build().await.unwrap();

        assert!(temp.path().join("modules").join("package.json").exists());
        assert_eq!(host.home().get_home_path(), temp.path());
        assert!(host.cache().is_empty());
    }

    #[tokio::test]
    async fn test_kit_name_precedence() {
        let temp = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let host =
            Host::builder(settings(&temp)).project_root(project.path()).build().await.unwrap();

        assert!(matches!(host.kit_name(None), Err(HostError::Load(LoadError::NoKit))));

        host.config().set_kit_name("home-kit").unwrap();
        assert_eq!(host.kit_name(None).unwrap(), "home-kit");

        std::fs::write(project.path().join("kithost.toml"), "kit = \"project-kit\"\n").unwrap();
        assert_eq!(host.kit_name(None).unwrap(), "project-kit");
        assert_eq!(host.kit_name(Some("cli-kit")).unwrap(), "cli-kit");
        assert_eq!(host.kit_name(Some("  ")).unwrap(), "project-kit");
    }

    #[tokio::test]
    async fn test_run_without_kit_fails_with_code() {
        let temp = TempDir::new().unwrap();
        let host = Host::builder(settings(&temp)).build().await.unwrap();

        let err = host.run("dev", Vec::new(), BTreeMap::new(), None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoKit);
    }

    #[tokio::test]
    async fn test_clean_all_resets_layout() {
        let temp = TempDir::new().unwrap();
        let host = Host::builder(settings(&temp)).build().await.unwrap();
        host.cache().set("k", serde_json::json!(1), None);
        let stray = host.home().get_modules_path().join("node_modules").join("stray");
        std::fs::create_dir_all(&stray).unwrap();

        host.clean(true).unwrap();
        assert!(host.cache().get("k").is_none());
        assert!(!stray.exists());
        assert!(host.home().get_modules_path().join("package.json").exists());
    }
}
