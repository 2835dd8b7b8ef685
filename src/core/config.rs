//! Configuration management for Kithost.
//!
//! Two files are involved:
//!
//! - `settings.toml`: host settings (registry, expiry windows, package names).
//!   Looked up in `$KITHOST_SETTINGS`, then `~/.config/kithost/settings.toml`,
//!   falling back to defaults.
//! - `config.toml` under the kithost home, plus an optional `kithost.toml` in
//!   a project root. Holds the active kit name and free-form key/values handed to
//!   kits.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cache key of the core runtime update check.
pub const CORE_CACHE_KEY: &str = "core-check";
/// Cache key of the base module update check.
pub const BASE_CACHE_KEY: &str = "base-check";
/// Cache key of the cli update check.
pub const CLI_CACHE_KEY: &str = "cli-check";
/// Cache key of the intranet reachability probe.
pub const NET_ENV_CACHE_KEY: &str = "net-env-check";
/// Cache key of the online module list.
pub const ONLINE_MODULE_CACHE_KEY: &str = "online-modules";
/// Prefix of per-module update check keys.
pub const MODULE_UPDATE_PRE: &str = "module-update:";

/// Name of the project-level config file.
pub const PROJECT_CONFIG_FILE: &str = "kithost.toml";
/// Name of the home-level config file.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Host settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Kithost home directory (`~` is expanded).
    pub home_dir: Option<String>,

    /// Registry and naming settings
    pub registry: RegistrySettings,

    /// Update check settings
    pub check: CheckSettings,

    /// Names of the host's own packages
    pub packages: PackageSettings,
}

/// Registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Public registry URL
    pub url: String,

    /// Registry used when the intranet is reachable
    pub intranet_url: Option<String>,

    /// Dist-tag used when looking up the latest version
    pub tag: String,

    /// Installer binary (npm, pnpm, ...)
    pub installer: String,

    /// Package scope of kits and plugins
    pub scope: String,

    /// Keyword every kithost module carries in its package metadata
    pub framework_keyword: String,

    /// Maximum install attempts per module resolution
    pub max_install_attempts: u32,
}

/// Update check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckSettings {
    /// Expiry of routine checks, in seconds
    pub default_check_expires: u64,

    /// Expiry of checks forced over the network, in seconds
    pub net_check_expires: u64,

    /// Timeout of the network reachability probe, in milliseconds
    pub net_timeout_ms: u64,
}

/// Package names of the host itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageSettings {
    /// The front-line cli package
    pub cli: String,
    /// The core runtime package
    pub core: String,
    /// The base module package
    pub base: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            home_dir: None,
            registry: RegistrySettings::default(),
            check: CheckSettings::default(),
            packages: PackageSettings::default(),
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            url: "https://registry.npmjs.org".to_string(),
            intranet_url: None,
            tag: "latest".to_string(),
            installer: "npm".to_string(),
            scope: "@kithost".to_string(),
            framework_keyword: "kithost-module".to_string(),
            max_install_attempts: 3,
        }
    }
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            default_check_expires: 60 * 60,
            net_check_expires: 24 * 60 * 60,
            net_timeout_ms: 1500,
        }
    }
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            cli: "kithost".to_string(),
            core: "@kithost/core".to_string(),
            base: "@kithost/base".to_string(),
        }
    }
}

impl CheckSettings {
    /// Expiry of routine checks.
    pub fn default_expires(&self) -> Duration {
        Duration::from_secs(self.default_check_expires)
    }

    /// Expiry of forced network checks.
    pub fn net_expires(&self) -> Duration {
        Duration::from_secs(self.net_check_expires)
    }

    /// Reachability probe timeout.
    pub fn net_timeout(&self) -> Duration {
        Duration::from_millis(self.net_timeout_ms)
    }
}

impl Settings {
    /// Load settings from the default location.
    ///
    /// Looks for settings in:
    /// 1. `$KITHOST_SETTINGS`
    /// 2. `~/.config/kithost/settings.toml`
    /// 3. Falls back to defaults
    ///
    /// `KITHOST_HOME` and `KITHOST_REGISTRY` override the file.
    pub fn load() -> anyhow::Result<Self> {
        let mut settings = if let Ok(path) = std::env::var("KITHOST_SETTINGS") {
            Self::load_from_file(Path::new(&path))?
        } else {
            match Self::settings_path() {
                Some(path) if path.exists() => Self::load_from_file(&path)?,
                _ => Self::default(),
            }
        };

        if let Ok(home) = std::env::var("KITHOST_HOME") {
            settings.home_dir = Some(home);
        }
        if let Ok(url) = std::env::var("KITHOST_REGISTRY") {
            settings.registry.url = url;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Default settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("kithost").join("settings.toml"))
    }

    /// Reject settings the update checker cannot honor.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.check.default_check_expires >= self.check.net_check_expires {
            anyhow::bail!(
                "check.default_check_expires ({}) must be shorter than \
                 check.net_check_expires ({})",
                self.check.default_check_expires,
                self.check.net_check_expires
            );
        }
        if self.registry.max_install_attempts == 0 {
            anyhow::bail!("registry.max_install_attempts must be at least 1");
        }
        Ok(())
    }

    /// Resolved kithost home directory.
    pub fn home_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(ref dir) = self.home_dir {
            let expanded = shellexpand::full(dir)?;
            return Ok(PathBuf::from(expanded.as_ref()));
        }

        dirs::home_dir()
            .map(|d| d.join(".kithost"))
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
    }
}

/// Kit configuration: active kit and free-form key/values.
///
/// Project values (`kithost.toml` in the given root) shadow home values.
#[derive(Debug, Clone)]
pub struct KitConfig {
    home_file: PathBuf,
}

impl KitConfig {
    /// Key holding the active kit name.
    pub const KIT_KEY: &'static str = "kit";

    /// Config stored at `home_file`.
    pub fn new(home_file: impl Into<PathBuf>) -> Self {
        Self { home_file: home_file.into() }
    }

    /// Path of the home config file.
    pub fn path(&self) -> &Path {
        &self.home_file
    }

    /// Whether a config file exists for `root` (or at home when `None`).
    pub fn exist(&self, root: Option<&Path>) -> bool {
        match root {
            Some(root) => root.join(PROJECT_CONFIG_FILE).is_file(),
            None => self.home_file.is_file(),
        }
    }

    /// Look up a single key.
    pub fn get(&self, key: &str, root: Option<&Path>) -> Option<toml::Value> {
        self.get_all(root).remove(key)
    }

    /// All keys, project values overriding home values.
    pub fn get_all(&self, root: Option<&Path>) -> toml::Table {
        let mut table = read_table(&self.home_file);
        if let Some(root) = root {
            table.extend(read_table(&root.join(PROJECT_CONFIG_FILE)));
        }
        table
    }

    /// Active kit name, if one is configured.
    pub fn get_kit_name(&self, root: Option<&Path>) -> Option<String> {
        match self.get(Self::KIT_KEY, root) {
            Some(toml::Value::String(name)) if !name.trim().is_empty() => Some(name),
            _ => None,
        }
    }

    /// Persist the active kit name in the home config.
    pub fn set_kit_name(&self, name: &str) -> anyhow::Result<()> {
        self.set(Self::KIT_KEY, toml::Value::String(name.to_string()))
    }

    /// Persist a key in the home config.
    pub fn set(&self, key: &str, value: toml::Value) -> anyhow::Result<()> {
        let mut table = read_table(&self.home_file);
        table.insert(key.to_string(), value);

        if let Some(parent) = self.home_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.home_file, toml::to_string_pretty(&table)?)?;
        Ok(())
    }
}

fn read_table(path: &Path) -> toml::Table {
    let Ok(content) = std::fs::read_to_string(path) else {
        return toml::Table::new();
    };

    content.parse::<toml::Table>().unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config");
        toml::Table::new()
    })
}
