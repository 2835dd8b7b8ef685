//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use kithost::core::{CacheStore, Home, ManualClock, Settings};
use kithost::module::{ErrorRecoveryRegistry, ModuleResolver, UpdateChecker};
use kithost::registry::{
    InfoOptions, InstallOptions, PackageInfo, PackageRegistry, RegistryCommand, RegistryError,
    RegistryResult,
};

/// In-memory registry that counts every call.
///
/// `install` writes a `package.json` for the published version under
/// `<prefix>/node_modules/<name>`, the way the real installer would.
#[derive(Default)]
pub struct MockRegistry {
    published: Mutex<HashMap<String, PackageInfo>>,
    info_error: Mutex<Option<RegistryError>>,
    install_error: Mutex<Option<RegistryError>>,
    pub installs: Mutex<u32>,
    pub lookups: Mutex<u32>,
    pub searches: Mutex<u32>,
}

impl MockRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, name: &str, version: &str) {
        let mut info = PackageInfo::new(name, version);
        info.keywords = vec!["kithost-module".to_string()];
        self.publish_info(info);
    }

    pub fn publish_info(&self, info: PackageInfo) {
        self.published.lock().insert(info.name.clone(), info);
    }

    pub fn fail_lookups(&self, err: Option<RegistryError>) {
        *self.info_error.lock() = err;
    }

    pub fn fail_installs(&self, err: Option<RegistryError>) {
        *self.install_error.lock() = err;
    }

    pub fn installs(&self) -> u32 {
        *self.installs.lock()
    }

    pub fn lookups(&self) -> u32 {
        *self.lookups.lock()
    }
}

#[async_trait]
impl PackageRegistry for MockRegistry {
    async fn install(
        &self,
        packages: &[String],
        opts: &InstallOptions,
    ) -> RegistryResult<Vec<PackageInfo>> {
        *self.installs.lock() += 1;
        if let Some(err) = self.install_error.lock().clone() {
            return Err(err);
        }

        let mut installed = Vec::new();
        for name in packages {
            let info = self
                .published
                .lock()
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::not_found(format!("E404 {name}")))?;
            let dir = opts.prefix.join("node_modules").join(name);
            std::fs::create_dir_all(&dir).map_err(RegistryError::from)?;
            let json =
                serde_json::to_string(&info).map_err(|e| RegistryError::unknown(e.to_string()))?;
            std::fs::write(dir.join("package.json"), json).map_err(RegistryError::from)?;
            installed.push(info);
        }
        Ok(installed)
    }

    async fn uninstall(&self, packages: &[String], opts: &InstallOptions) -> RegistryResult<()> {
        for name in packages {
            let _ = std::fs::remove_dir_all(opts.prefix.join("node_modules").join(name));
        }
        Ok(())
    }

    async fn update(
        &self,
        packages: &[String],
        opts: &InstallOptions,
    ) -> RegistryResult<Vec<PackageInfo>> {
        self.install(packages, opts).await
    }

    fn get(&self, _command: Option<RegistryCommand>) -> String {
        "mock".to_string()
    }

    async fn get_info(
        &self,
        name: &str,
        _opts: &InfoOptions,
    ) -> RegistryResult<Option<PackageInfo>> {
        *self.lookups.lock() += 1;
        if let Some(err) = self.info_error.lock().clone() {
            return Err(err);
        }
        Ok(self.published.lock().get(name).cloned())
    }

    async fn search(&self, keyword: &str) -> RegistryResult<Vec<PackageInfo>> {
        *self.searches.lock() += 1;
        Ok(self
            .published
            .lock()
            .values()
            .filter(|p| p.has_keyword(keyword) || p.name.contains(keyword))
            .cloned()
            .collect())
    }
}

/// Resolver stack over a temp home, a manual clock and a mock registry.
pub struct Fixture {
    pub home: Home,
    pub settings: Arc<Settings>,
    pub clock: Arc<ManualClock>,
    pub cache: Arc<CacheStore>,
    pub registry: Arc<MockRegistry>,
    pub errors: Arc<ErrorRecoveryRegistry>,
    pub checker: Arc<UpdateChecker>,
    pub resolver: ModuleResolver,
}

impl Fixture {
    pub fn new(root: &std::path::Path) -> Self {
        let home = Home::new(root);
        home.init().unwrap();
        let settings = Arc::new(Settings::default());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache =
            Arc::new(CacheStore::open_with_clock(home.get_cache_file_path(), clock.clone()));
        let registry = MockRegistry::new();
        let errors = Arc::new(ErrorRecoveryRegistry::new());
        let checker = Arc::new(UpdateChecker::new(
            cache.clone(),
            registry.clone(),
            home.clone(),
            settings.clone(),
        ));
        let resolver = ModuleResolver::new(
            home.clone(),
            settings.clone(),
            cache.clone(),
            registry.clone(),
            checker.clone(),
            errors.clone(),
        );

        Self { home, settings, clock, cache, registry, errors, checker, resolver }
    }
}
