//! Module resolver.
//!
//! Maps a logical module name to a usable local installation, installing on
//! first use and reinstalling when the local copy is stale or broken.
//!
//! ```text
//! Unresolved ──► LocalPresent ──(current)──────────────────────► Loaded
//!      │              │ (stale / corrupt)
//!      ▼              ▼
//! NotInstalled ──► install ──► re-validate ──► LocalPresent ──► Loaded
//!                     │
//!                     └── retries exhausted / permanent error ──► Failed
//! ```

use std::collections::BTreeMap;
use std::path::Component;
use std::sync::Arc;

use super::{
    AllModules, CheckResult, CheckTarget, ErrorCode, ErrorRecord, ErrorRecoveryRegistry, ListItem,
    ModuleDescriptor, ModuleKind, ModuleNaming, ResolutionError, ResolutionResult, UpdateChecker,
};
use crate::core::{CacheStore, Home, Settings, ONLINE_MODULE_CACHE_KEY};
use crate::registry::{InstallOptions, PackageInfo, PackageRegistry, RegistryErrorReason};

/// What the filesystem says about a module.
#[derive(Debug, Clone)]
pub enum LocalState {
    /// Installed with a readable manifest and a semantic version.
    Present(PackageInfo),
    /// The directory exists but cannot be used.
    Corrupt(ResolutionError),
    /// Nothing installed.
    Missing,
}

/// Resolves module names to local installations.
pub struct ModuleResolver {
    home: Home,
    naming: ModuleNaming,
    settings: Arc<Settings>,
    cache: Arc<CacheStore>,
    registry: Arc<dyn PackageRegistry>,
    checker: Arc<UpdateChecker>,
    errors: Arc<ErrorRecoveryRegistry>,
}

impl std::fmt::Debug for ModuleResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleResolver")
            .field("home", &self.home)
            .field("naming", &self.naming)
            .finish()
    }
}

impl ModuleResolver {
    /// Create a resolver over the shared components.
    pub fn new(
        home: Home,
        settings: Arc<Settings>,
        cache: Arc<CacheStore>,
        registry: Arc<dyn PackageRegistry>,
        checker: Arc<UpdateChecker>,
        errors: Arc<ErrorRecoveryRegistry>,
    ) -> Self {
        let naming = ModuleNaming::from_settings(&settings.registry);
        Self { home, naming, settings, cache, registry, checker, errors }
    }

    /// Naming rules in use.
    pub fn naming(&self) -> &ModuleNaming {
        &self.naming
    }

    /// Descriptor of `name`. Kit and plugin names must carry their prefix;
    /// see [`ModuleNaming::get_kit_name`] for short kit names.
    pub fn descriptor(&self, name: &str) -> ModuleDescriptor {
        ModuleDescriptor::resolve(&self.naming, &self.home, name)
    }

    /// Inspect the local installation of a module. No network.
    pub fn probe_local(&self, desc: &ModuleDescriptor) -> LocalState {
        if !desc.local_path.exists() {
            return LocalState::Missing;
        }

        let info = match PackageInfo::from_file(&desc.manifest_path()) {
            Ok(info) => info,
            Err(e) => {
                return LocalState::Corrupt(ResolutionError::CorruptLocal {
                    name: desc.full_name.clone(),
                    reason: format!("unreadable package.json: {e}"),
                })
            }
        };

        if info.semver().is_none() {
            return LocalState::Corrupt(ResolutionError::VersionUnparsable {
                name: desc.full_name.clone(),
                version: info.version,
            });
        }
        LocalState::Present(info)
    }

    /// Whether `name` is installed and usable. No network.
    pub fn mod_local_exist(&self, name: &str) -> bool {
        let desc = self.descriptor(name);
        ModuleNaming::validate_full_name(&desc.full_name).is_ok()
            && matches!(self.probe_local(&desc), LocalState::Present(_))
    }

    /// Freshness of a kit.
    pub async fn check_module(&self, kit_name: &str) -> CheckResult {
        let desc = ModuleDescriptor::kit(&self.naming, &self.home, kit_name);
        self.checker.check(&CheckTarget::Module(desc), false).await
    }

    /// Resolve a kit by any of its names.
    pub async fn get_kit(&self, kit_name: &str) -> ResolutionResult<ModuleDescriptor> {
        let desc = ModuleDescriptor::kit(&self.naming, &self.home, kit_name);
        self.resolve(desc).await
    }

    /// Resolve `name` to a usable installation, installing or updating it
    /// when needed.
    pub async fn get_module(&self, name: &str) -> ResolutionResult<ModuleDescriptor> {
        self.resolve(self.descriptor(name)).await
    }

    /// Installed metadata of `name`, resolving it first.
    pub async fn require_pkg_info(&self, name: &str) -> ResolutionResult<PackageInfo> {
        let desc = self.get_module(name).await?;
        desc.pkg_info.ok_or_else(|| ResolutionError::NotInstalled { name: desc.full_name })
    }

    /// Reject names that do not map to a single directory under the
    /// modules tree.
    fn validated(&self, desc: ModuleDescriptor) -> ResolutionResult<ModuleDescriptor> {
        match ModuleNaming::validate_full_name(&desc.full_name) {
            Ok(()) => Ok(desc),
            Err(reason) => {
                let err = ResolutionError::InvalidName { name: desc.full_name, reason };
                self.errors.register(err.to_record());
                Err(err)
            }
        }
    }

    async fn resolve(&self, desc: ModuleDescriptor) -> ResolutionResult<ModuleDescriptor> {
        let mut desc = self.validated(desc)?;
        match self.probe_local(&desc) {
            LocalState::Present(info) => {
                let target = CheckTarget::Module(desc.clone());
                let check = self.checker.check(&target, false).await;
                if check.status {
                    desc.pkg_info = Some(info);
                    return Ok(desc);
                }

                tracing::info!(
                    module = %desc.full_name,
                    from = %info.version,
                    to = check.pkg_info.as_ref().map_or("?", |p| p.version.as_str()),
                    "updating module"
                );
                match self.install(&mut desc).await {
                    Ok(()) => Ok(desc),
                    Err(e) => {
                        // A stale copy still works; keep it.
                        tracing::warn!(
                            module = %desc.full_name,
                            error = %e,
                            "update failed, using installed version"
                        );
                        desc.pkg_info = Some(info);
                        Ok(desc)
                    }
                }
            }
            LocalState::Corrupt(err) => {
                tracing::warn!(
                    module = %desc.full_name,
                    error = %err,
                    "local module is unusable, reinstalling"
                );
                self.errors.register(err.to_record());
                self.remove_local(&desc);
                self.install(&mut desc).await?;
                Ok(desc)
            }
            LocalState::Missing => {
                tracing::info!(module = %desc.full_name, "installing module");
                self.install(&mut desc).await?;
                Ok(desc)
            }
        }
    }

    /// Install `desc`, retrying while every recorded failure is retryable.
    async fn install(&self, desc: &mut ModuleDescriptor) -> ResolutionResult<()> {
        let opts =
            InstallOptions::new(self.home.get_modules_path()).with_tag(&self.settings.registry.tag);
        let packages = [desc.full_name.clone()];
        let max_attempts = self.settings.registry.max_install_attempts;
        let mut attempts = 0;

        loop {
            attempts += 1;

            let failure = match self.registry.install(&packages, &opts).await {
                Ok(_) => match self.probe_local(desc) {
                    LocalState::Present(info) => {
                        let target = CheckTarget::Module(desc.clone());
                        self.checker.record_installed(&target, info.clone());
                        desc.pkg_info = Some(info);
                        return Ok(());
                    }
                    LocalState::Corrupt(err) => err,
                    LocalState::Missing => ResolutionError::CorruptLocal {
                        name: desc.full_name.clone(),
                        reason: "installer reported success but the module is missing".to_string(),
                    },
                },
                Err(e) if e.reason == RegistryErrorReason::NotFound => {
                    let record = ErrorRecord::new(ErrorCode::RegistryNotFound, e.message)
                        .for_module(&desc.full_name);
                    let offer_install = self.errors.no_found_handle(record).await;
                    return Err(ResolutionError::NotFound {
                        name: desc.full_name.clone(),
                        offer_install,
                    });
                }
                Err(source) => {
                    ResolutionError::Registry { name: desc.full_name.clone(), attempts, source }
                }
            };

            let retry = self.errors.default_handle(failure.to_record()).await;
            if !retry || attempts >= max_attempts {
                tracing::error!(
                    module = %desc.full_name,
                    attempts,
                    error = %failure,
                    "install failed"
                );
                return Err(failure);
            }

            tracing::warn!(
                module = %desc.full_name,
                attempt = attempts,
                error = %failure,
                "install failed, retrying"
            );
        }
    }

    /// Delete a module directory. Only paths strictly below the modules
    /// `node_modules` are touched.
    fn remove_local(&self, desc: &ModuleDescriptor) {
        let root = self.home.get_module_root();
        let path = &desc.local_path;
        let escapes =
            path.components().any(|c| matches!(c, Component::ParentDir | Component::CurDir));
        if escapes || path == &root || !path.starts_with(&root) {
            tracing::error!(
                path = %path.display(),
                "refusing to remove a path outside the modules tree"
            );
            return;
        }

        if let Err(e) = std::fs::remove_dir_all(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to remove module directory"
                );
            }
        }
    }

    /// Uninstall a module and forget its cached check.
    pub async fn remove_module(&self, name: &str) -> ResolutionResult<()> {
        let desc = self.validated(self.descriptor(name))?;
        let opts = InstallOptions::new(self.home.get_modules_path());

        if let Err(source) = self.registry.uninstall(&[desc.full_name.clone()], &opts).await {
            tracing::warn!(
                module = %desc.full_name,
                error = %source,
                "installer could not uninstall, removing directory"
            );
        }
        self.remove_local(&desc);
        self.checker.invalidate(&CheckTarget::Module(desc));
        Ok(())
    }

    /// Installed modules with a readable manifest.
    pub fn get_local_module_list(&self) -> Vec<ListItem> {
        let root = self.home.get_module_root();
        let Ok(entries) = std::fs::read_dir(&root) else {
            return Vec::new();
        };

        let mut dirs = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            // Scope directories hold the actual packages one level down.
            if entry.file_name().to_string_lossy().starts_with('@') {
                if let Ok(scoped) = std::fs::read_dir(&path) {
                    dirs.extend(scoped.flatten().map(|e| e.path()).filter(|p| p.is_dir()));
                }
            } else if !entry.file_name().to_string_lossy().starts_with('.') {
                dirs.push(path);
            }
        }

        let keyword = self.naming.get_framework_keyword();
        let mut items: Vec<ListItem> = dirs
            .iter()
            .filter_map(|dir| PackageInfo::from_file(&dir.join("package.json")).ok())
            .filter(|info| info.has_keyword(keyword) || info.name.starts_with(self.naming.scope()))
            .map(|info| ListItem::from_package(&self.naming, &info))
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items
    }

    /// Published modules. Without a keyword the framework keyword is used and
    /// the result is cached.
    pub async fn get_online_module_list(
        &self,
        keyword: Option<&str>,
    ) -> ResolutionResult<Vec<ListItem>> {
        let framework = self.naming.get_framework_keyword();

        if keyword.is_none() {
            if let Some(cached) = self.cache.get_as::<Vec<ListItem>>(ONLINE_MODULE_CACHE_KEY) {
                return Ok(cached);
            }
        }

        let packages = self
            .registry
            .search(keyword.unwrap_or(framework))
            .await
            .map_err(ResolutionError::Search)?;

        let mut items: Vec<ListItem> = packages
            .iter()
            .filter(|p| p.has_keyword(framework))
            .map(|p| ListItem::from_package(&self.naming, p))
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items.dedup_by(|a, b| a.name == b.name);

        if keyword.is_none() {
            let ttl = Some(self.settings.check.default_expires());
            self.cache.set_as(ONLINE_MODULE_CACHE_KEY, &items, ttl);
        }
        Ok(items)
    }

    /// Kits, online and local. Falls back to local kits when the registry
    /// cannot be searched.
    pub async fn get_kit_list(&self) -> ResolutionResult<Vec<ListItem>> {
        let online = match self.get_online_module_list(None).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(error = %e, "listing local kits only");
                Vec::new()
            }
        };

        let mut kits: BTreeMap<String, ListItem> = BTreeMap::new();
        for item in self.get_local_module_list().into_iter().chain(online) {
            if item.kind == ModuleKind::Kit {
                kits.entry(item.name.clone()).or_insert(item);
            }
        }
        Ok(kits.into_values().collect())
    }

    /// Local and online modules split into kits and everything else.
    pub async fn get_all_modules(&self) -> ResolutionResult<AllModules> {
        let online = self.get_online_module_list(None).await?;
        let mut merged: BTreeMap<String, ListItem> = BTreeMap::new();
        for item in self.get_local_module_list().into_iter().chain(online) {
            merged.entry(item.name.clone()).or_insert(item);
        }

        let (kit, module) = merged.into_values().partition(|item| item.kind == ModuleKind::Kit);
        Ok(AllModules { kit, module })
    }

    /// Last registry error recorded for `name`, if any.
    pub fn last_error(&self, name: &str) -> Option<ErrorRecord> {
        let full = self.naming.get_full_name(name);
        self.errors
            .get_error_list()
            .into_iter()
            .rev()
            .find(|r| r.module_name.as_deref() == Some(full.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::registry::{InfoOptions, RegistryCommand, RegistryError, RegistryResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Registry that "installs" by writing a manifest.
    #[derive(Default)]
    struct FakeRegistry {
        latest: Mutex<Option<String>>,
        install_error: Mutex<Option<RegistryError>>,
        installs: Mutex<u32>,
        lookups: Mutex<u32>,
    }

    #[async_trait]
    impl PackageRegistry for FakeRegistry {
        async fn install(
            &self,
            packages: &[String],
            opts: &InstallOptions,
        ) -> RegistryResult<Vec<PackageInfo>> {
            *self.installs.lock() += 1;
            if let Some(e) = self.install_error.lock().clone() {
                return Err(e);
            }
            let version = self.latest.lock().clone().unwrap_or_else(|| "1.0.0".to_string());
            let mut out = Vec::new();
            for name in packages {
                let dir = opts.prefix.join("node_modules").join(name);
                std::fs::create_dir_all(&dir).unwrap();
                let info = PackageInfo::new(name, &version);
                let manifest = serde_json::to_string(&info).unwrap();
                std::fs::write(dir.join("package.json"), manifest).unwrap();
                out.push(info);
            }
            Ok(out)
        }

        async fn uninstall(&self, _: &[String], _: &InstallOptions) -> RegistryResult<()> {
            Ok(())
        }

        async fn update(
            &self,
            p: &[String],
            o: &InstallOptions,
        ) -> RegistryResult<Vec<PackageInfo>> {
            self.install(p, o).await
        }

        fn get(&self, _: Option<RegistryCommand>) -> String {
            "fake".to_string()
        }

        async fn get_info(
            &self,
            name: &str,
            _: &InfoOptions,
        ) -> RegistryResult<Option<PackageInfo>> {
            *self.lookups.lock() += 1;
            Ok(self.latest.lock().clone().map(|v| PackageInfo::new(name, v)))
        }

        async fn search(&self, _: &str) -> RegistryResult<Vec<PackageInfo>> {
            Ok(Vec::new())
        }
    }

    fn resolver(temp: &TempDir, registry: Arc<FakeRegistry>) -> ModuleResolver {
        let home = Home::new(temp.path());
        home.init().unwrap();
        let settings = Arc::new(Settings::default());
        let cache = Arc::new(CacheStore::in_memory(Arc::new(ManualClock::new(0))));
        let checker = Arc::new(UpdateChecker::new(
            cache.clone(),
            registry.clone(),
            home.clone(),
            settings.clone(),
        ));
        let errors = Arc::new(ErrorRecoveryRegistry::new());
        ModuleResolver::new(home, settings, cache, registry, checker, errors)
    }

    #[test]
    fn test_probe_local_states() {
        let temp = TempDir::new().unwrap();
        let resolver = resolver(&temp, Arc::new(FakeRegistry::default()));
        let desc = resolver.descriptor("kit-react");

        assert!(matches!(resolver.probe_local(&desc), LocalState::Missing));

        std::fs::create_dir_all(&desc.local_path).unwrap();
        assert!(matches!(
            resolver.probe_local(&desc),
            LocalState::Corrupt(ResolutionError::CorruptLocal { .. })
        ));

        let manifest = r#"{"name":"@kithost/kit-react","version":"1.x"}"#;
        std::fs::write(desc.manifest_path(), manifest).unwrap();
        assert!(matches!(
            resolver.probe_local(&desc),
            LocalState::Corrupt(ResolutionError::VersionUnparsable { .. })
        ));

        let manifest = r#"{"name":"@kithost/kit-react","version":"1.0.0"}"#;
        std::fs::write(desc.manifest_path(), manifest).unwrap();
        assert!(resolver.mod_local_exist("kit-react"));
    }

    #[tokio::test]
    async fn test_corrupt_module_is_reinstalled() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(FakeRegistry::default());
        *registry.latest.lock() = Some("2.0.0".to_string());
        let resolver = resolver(&temp, registry.clone());

        let desc = resolver.descriptor("kit-react");
        std::fs::create_dir_all(&desc.local_path).unwrap();
        std::fs::write(desc.local_path.join("stray.js"), "").unwrap();

        let resolved = resolver.get_module("kit-react").await.unwrap();
        assert_eq!(resolved.version(), Some("2.0.0"));
        assert_eq!(*registry.installs.lock(), 1);
        assert!(!resolved.local_path.join("stray.js").exists());
        assert_eq!(resolver.last_error("kit-react").unwrap().code, ErrorCode::CorruptLocal);
    }

    #[tokio::test]
    async fn test_unparsable_version_after_install() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(FakeRegistry::default());
        *registry.latest.lock() = Some("next".to_string());
        let resolver = resolver(&temp, registry.clone());

        let err = resolver.get_module("kit-react").await.unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::VersionUnparsable { ref version, .. } if version == "next"
        ));
        assert_eq!(err.code(), ErrorCode::VersionUnparsable);
        assert_eq!(*registry.installs.lock(), 3);
    }

    #[tokio::test]
    async fn test_path_like_names_are_rejected() {
        let temp = TempDir::new().unwrap();
        let outside = temp.path().join("victim");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("precious.txt"), "keep").unwrap();

        let registry = Arc::new(FakeRegistry::default());
        let resolver = resolver(&temp, registry.clone());
        resolver.get_module("kit-react").await.unwrap();

        let err = resolver.get_module("../../../victim").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidName);
        let err = resolver.remove_module("../../../victim").await.unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidName { .. }));
        assert!(!resolver.mod_local_exist("../../../victim"));

        assert!(outside.join("precious.txt").exists());
        assert_eq!(*registry.installs.lock(), 1);
        assert_eq!(resolver.last_error("../../../victim").unwrap().code, ErrorCode::InvalidName);
    }

    #[test]
    fn test_remove_local_stays_in_modules_tree() {
        let temp = TempDir::new().unwrap();
        let resolver = resolver(&temp, Arc::new(FakeRegistry::default()));
        let outside = temp.path().join("victim");
        std::fs::create_dir_all(&outside).unwrap();

        let mut desc = resolver.descriptor("kit-react");
        desc.local_path = resolver.home.get_module_root().join("@kithost/../../../victim");
        resolver.remove_local(&desc);
        desc.local_path = outside.clone();
        resolver.remove_local(&desc);
        desc.local_path = resolver.home.get_module_root();
        resolver.remove_local(&desc);

        assert!(outside.exists());
        assert!(resolver.home.get_module_root().exists());
    }

    #[tokio::test]
    async fn test_stale_update_failure_keeps_local_copy() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(FakeRegistry::default());
        *registry.latest.lock() = Some("1.0.0".to_string());
        let resolver = resolver(&temp, registry.clone());
        resolver.get_module("kit-react").await.unwrap();

        // Publish a newer version, then make installs fail.
        *registry.latest.lock() = Some("1.1.0".to_string());
        resolver.checker.invalidate(&CheckTarget::Module(resolver.descriptor("kit-react")));
        *registry.install_error.lock() = Some(RegistryError::permission("EACCES"));

        let desc = resolver.get_module("kit-react").await.unwrap();
        assert_eq!(desc.version(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn test_not_found_short_circuits() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(FakeRegistry::default());
        *registry.install_error.lock() = Some(RegistryError::not_found("E404"));
        let resolver = resolver(&temp, registry.clone());

        let err = resolver.get_module("kit-ghost").await.unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound { offer_install: false, .. }));
        assert_eq!(*registry.installs.lock(), 1);
    }

    #[tokio::test]
    async fn test_network_errors_retry_until_limit() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(FakeRegistry::default());
        *registry.install_error.lock() = Some(RegistryError::network("ETIMEDOUT"));
        let resolver = resolver(&temp, registry.clone());

        let err = resolver.get_module("kit-react").await.unwrap_err();
        assert!(matches!(err, ResolutionError::Registry { attempts: 3, .. }));
        assert_eq!(*registry.installs.lock(), 3);
        assert_eq!(resolver.errors.get_error_list().len(), 1);
    }
}
