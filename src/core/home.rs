//! Layout of the kithost home directory.
//!
//! ```text
//! ~/.kithost/
//! ├── cache.json
//! ├── config.toml
//! ├── core/node_modules/...     core and base runtime packages
//! └── modules/
//!     ├── package.json
//!     └── node_modules/...      installed kits and plugins
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;

use super::config::CONFIG_FILE_NAME;

const CACHE_FILE_NAME: &str = "cache.json";
const CORE_DIR_NAME: &str = "core";
const MODULES_DIR_NAME: &str = "modules";
const NODE_MODULES: &str = "node_modules";
const PACKAGE_FILE: &str = "package.json";

/// Path accessors for the kithost home.
#[derive(Debug, Clone)]
pub struct Home {
    root: PathBuf,
}

impl Home {
    /// Home rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory layout and the installer manifests.
    pub fn init(&self) -> std::io::Result<()> {
        self.init_home()?;
        self.init_home_pkg()?;
        self.init_core()
    }

    /// Create the home directory.
    pub fn init_home(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    /// Create the modules directory and its installer manifest.
    pub fn init_home_pkg(&self) -> std::io::Result<()> {
        let modules = self.get_modules_path();
        fs::create_dir_all(self.get_module_root())?;
        write_stub_manifest(&modules.join(PACKAGE_FILE), "kithost-modules")
    }

    /// Create the core directory and its installer manifest.
    pub fn init_core(&self) -> std::io::Result<()> {
        let core = self.get_core_path();
        fs::create_dir_all(core.join(NODE_MODULES))?;
        write_stub_manifest(&core.join(PACKAGE_FILE), "kithost-core")
    }

    /// Remove the core directory.
    pub fn clean_core_dir(&self) -> std::io::Result<()> {
        remove_dir_if_exists(&self.get_core_path())
    }

    /// Remove the installed modules.
    pub fn clean_modules_dir(&self) -> std::io::Result<()> {
        remove_dir_if_exists(&self.get_modules_path())
    }

    /// Remove the cache file.
    pub fn clean_cache_file(&self) -> std::io::Result<()> {
        match fs::remove_file(self.get_cache_file_path()) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// The home directory.
    pub fn get_home_path(&self) -> &Path {
        &self.root
    }

    /// Install prefix of the core packages.
    pub fn get_core_path(&self) -> PathBuf {
        self.root.join(CORE_DIR_NAME)
    }

    /// `node_modules` of the core packages.
    pub fn get_core_module_path(&self) -> PathBuf {
        self.get_core_path().join(NODE_MODULES)
    }

    /// Install prefix of kits and plugins.
    pub fn get_modules_path(&self) -> PathBuf {
        self.root.join(MODULES_DIR_NAME)
    }

    /// `node_modules` of kits and plugins.
    pub fn get_module_root(&self) -> PathBuf {
        self.get_modules_path().join(NODE_MODULES)
    }

    /// Directory of an installed module.
    pub fn get_module_dir(&self, full_name: &str) -> PathBuf {
        self.get_module_root().join(full_name)
    }

    /// Manifest path of an installed module.
    pub fn get_module_pkg_path(&self, full_name: &str) -> PathBuf {
        self.get_module_dir(full_name).join(PACKAGE_FILE)
    }

    /// Manifest path of a core package.
    pub fn get_core_pkg_path(&self, full_name: &str) -> PathBuf {
        self.get_core_module_path().join(full_name).join(PACKAGE_FILE)
    }

    /// The cache file.
    pub fn get_cache_file_path(&self) -> PathBuf {
        self.root.join(CACHE_FILE_NAME)
    }

    /// The home config file.
    pub fn get_config_file_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }
}

fn write_stub_manifest(path: &Path, name: &str) -> std::io::Result<()> {
    if path.exists() {
        return Ok(());
    }
    let manifest = json!({ "name": name, "private": true, "dependencies": {} });
    fs::write(path, serde_json::to_string_pretty(&manifest)?)
}

fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
