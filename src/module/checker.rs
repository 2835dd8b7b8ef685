//! Update checker.
//!
//! Compares the locally installed version of a target against the registry's
//! tagged version. Results are memoized in the cache so routine runs do not
//! hit the registry; a failed lookup is reported optimistically as current
//! and never cached, so the next run asks again.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ModuleDescriptor, ModuleKind};
use crate::core::{
    CacheStore, Home, Settings, BASE_CACHE_KEY, CLI_CACHE_KEY, CORE_CACHE_KEY, MODULE_UPDATE_PRE,
};
use crate::registry::{InfoOptions, InstallOptions, PackageInfo, PackageRegistry, RegistryResult};

/// Kind of target a check result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    /// The core runtime package.
    Core,
    /// The base module package.
    Base,
    /// The front-line cli.
    Cli,
    /// A kit.
    Kit,
    /// A plugin.
    Plugin,
    /// Any other module.
    Module,
}

impl From<ModuleKind> for CheckType {
    fn from(kind: ModuleKind) -> Self {
        match kind {
            ModuleKind::Kit => Self::Kit,
            ModuleKind::Plugin => Self::Plugin,
            ModuleKind::Normal => Self::Module,
        }
    }
}

/// What to check.
#[derive(Debug, Clone)]
pub enum CheckTarget {
    /// The core runtime package.
    Core,
    /// The base module package.
    Base,
    /// The front-line cli (this binary).
    Cli,
    /// An installable module.
    Module(ModuleDescriptor),
}

impl CheckTarget {
    /// Kind reported in the check result.
    pub fn check_type(&self) -> CheckType {
        match self {
            Self::Core => CheckType::Core,
            Self::Base => CheckType::Base,
            Self::Cli => CheckType::Cli,
            Self::Module(desc) => desc.kind.into(),
        }
    }

    /// Cache key of this target.
    pub fn cache_key(&self) -> String {
        match self {
            Self::Core => CORE_CACHE_KEY.to_string(),
            Self::Base => BASE_CACHE_KEY.to_string(),
            Self::Cli => CLI_CACHE_KEY.to_string(),
            Self::Module(desc) => format!("{MODULE_UPDATE_PRE}{}", desc.full_name),
        }
    }
}

/// Outcome of a freshness check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// `true` when up to date or no check was needed.
    pub status: bool,
    /// Target kind, `None` for the optimistic fallback.
    #[serde(rename = "type")]
    pub check_type: Option<CheckType>,
    /// Registry metadata of the tagged version.
    pub pkg_info: Option<PackageInfo>,
    /// Local metadata.
    pub old_pkg_info: Option<PackageInfo>,
}

impl CheckResult {
    /// Up to date, nothing else known.
    pub fn current() -> Self {
        Self { status: true, check_type: None, pkg_info: None, old_pkg_info: None }
    }

    /// Whether the target is missing locally.
    pub fn is_missing(&self) -> bool {
        self.old_pkg_info.is_none() && self.check_type.is_some()
    }

    /// Whether a newer version is published.
    pub fn has_update(&self) -> bool {
        !self.status && self.pkg_info.is_some()
    }
}

/// Checks local versions against the registry.
pub struct UpdateChecker {
    cache: Arc<CacheStore>,
    registry: Arc<dyn PackageRegistry>,
    home: Home,
    settings: Arc<Settings>,
}

impl std::fmt::Debug for UpdateChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateChecker").field("home", &self.home).finish()
    }
}

impl UpdateChecker {
    /// Create a checker.
    pub fn new(
        cache: Arc<CacheStore>,
        registry: Arc<dyn PackageRegistry>,
        home: Home,
        settings: Arc<Settings>,
    ) -> Self {
        Self { cache, registry, home, settings }
    }

    /// Registry package name of a target.
    pub fn package_name<'a>(&'a self, target: &'a CheckTarget) -> &'a str {
        match target {
            CheckTarget::Core => &self.settings.packages.core,
            CheckTarget::Base => &self.settings.packages.base,
            CheckTarget::Cli => &self.settings.packages.cli,
            CheckTarget::Module(desc) => &desc.full_name,
        }
    }

    /// Locally installed metadata of a target. A missing, unreadable or
    /// non-semver manifest counts as not installed.
    pub fn local_info(&self, target: &CheckTarget) -> Option<PackageInfo> {
        let info = match target {
            CheckTarget::Cli => {
                Some(PackageInfo::new(&self.settings.packages.cli, env!("CARGO_PKG_VERSION")))
            }
            CheckTarget::Core => {
                let path = self.home.get_core_pkg_path(&self.settings.packages.core);
                PackageInfo::from_file(&path).ok()
            }
            CheckTarget::Base => {
                let path = self.home.get_core_pkg_path(&self.settings.packages.base);
                PackageInfo::from_file(&path).ok()
            }
            CheckTarget::Module(desc) => PackageInfo::from_file(&desc.manifest_path()).ok(),
        }?;

        if info.semver().is_none() {
            tracing::debug!(
                package = %info.name,
                version = %info.version,
                "unparsable local version, treating as not installed"
            );
            return None;
        }
        Some(info)
    }

    /// Check a target. `force_net` bypasses the cache and stores the result
    /// for the longer network-check window.
    pub async fn check(&self, target: &CheckTarget, force_net: bool) -> CheckResult {
        let key = target.cache_key();

        if !force_net {
            if let Some(cached) = self.cache.get_as::<CheckResult>(&key) {
                tracing::debug!(key, status = cached.status, "update check served from cache");
                return cached;
            }
        }

        let local = self.local_info(target);
        let name = self.package_name(target);
        let opts = InfoOptions { registry: None, tag: Some(self.settings.registry.tag.clone()) };

        let remote = match self.registry.get_info(name, &opts).await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::debug!(
                    package = name,
                    error = %e,
                    "update check skipped, registry unavailable"
                );
                return CheckResult::current();
            }
        };

        let result = compare(target.check_type(), local, remote);
        let ttl = self.expiry(force_net);
        self.cache.set_as(&key, &result, Some(ttl));
        result
    }

    /// Store an up-to-date result after `info` was installed for `target`.
    pub fn record_installed(&self, target: &CheckTarget, info: PackageInfo) {
        let result = CheckResult {
            status: true,
            check_type: Some(target.check_type()),
            pkg_info: Some(info.clone()),
            old_pkg_info: Some(info),
        };
        self.cache.set_as(&target.cache_key(), &result, Some(self.expiry(false)));
    }

    /// Forget the cached result of `target`.
    pub fn invalidate(&self, target: &CheckTarget) {
        self.cache.remove(&target.cache_key());
    }

    /// Check the core runtime package.
    pub async fn core(&self, force_update: bool) -> CheckResult {
        self.check(&CheckTarget::Core, force_update).await
    }

    /// Check the base module package.
    pub async fn base(&self) -> CheckResult {
        self.check(&CheckTarget::Base, false).await
    }

    /// Check the cli.
    pub async fn cli(&self) -> CheckResult {
        self.check(&CheckTarget::Cli, false).await
    }

    /// Check `base` or `cli` by type; any other type is reported current.
    pub async fn get_update_status(&self, check_type: CheckType) -> CheckResult {
        match check_type {
            CheckType::Base => self.base().await,
            CheckType::Cli => self.cli().await,
            CheckType::Core => self.core(false).await,
            CheckType::Kit | CheckType::Plugin | CheckType::Module => CheckResult::current(),
        }
    }

    /// Installed core package metadata.
    pub fn get_core_info(&self) -> Option<PackageInfo> {
        self.local_info(&CheckTarget::Core)
    }

    /// Install (or move to the tagged version of) a core package.
    pub async fn install_core(&self, target: &CheckTarget) -> RegistryResult<PackageInfo> {
        let name = self.package_name(target).to_string();
        let opts =
            InstallOptions::new(self.home.get_core_path()).with_tag(&self.settings.registry.tag);
        let mut installed = self.registry.install(&[name], &opts).await?;
        let info = installed.pop().ok_or_else(|| {
            crate::registry::RegistryError::unknown("installer returned no package metadata")
        })?;
        self.record_installed(target, info.clone());
        Ok(info)
    }

    fn expiry(&self, force_net: bool) -> Duration {
        if force_net {
            self.settings.check.net_expires()
        } else {
            self.settings.check.default_expires()
        }
    }
}

/// Compare local and remote metadata by semantic-version precedence.
fn compare(
    check_type: CheckType,
    local: Option<PackageInfo>,
    remote: Option<PackageInfo>,
) -> CheckResult {
    let status = match (&local, &remote) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(local), Some(remote)) => match (local.semver(), remote.semver()) {
            (Some(l), Some(r)) => r <= l,
            // An unreadable registry version is no reason to reinstall.
            _ => true,
        },
    };

    CheckResult { status, check_type: Some(check_type), pkg_info: remote, old_pkg_info: local }
}
