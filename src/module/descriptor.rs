//! Module naming conventions and descriptors.
//!
//! Every installable unit has a short name (`react`), a package name
//! (`kit-react`) and a full name (`@kithost/kit-react`). The full name is a
//! pure function of the short name and the kind, so two descriptors with the
//! same full name always point at the same directory.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::{Home, RegistrySettings};
use crate::registry::PackageInfo;

const KIT_PREFIX: &str = "kit-";
const PLUGIN_PREFIX: &str = "plugin-";

/// What an installable module is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModuleKind {
    /// A selectable command bundle for a project type.
    Kit,
    /// A finer-grained extension used alongside a kit.
    Plugin,
    /// Any other package.
    Normal,
}

impl ModuleKind {
    /// Package-name prefix of this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Kit => KIT_PREFIX,
            Self::Plugin => PLUGIN_PREFIX,
            Self::Normal => "",
        }
    }

    /// Display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Kit => "kit",
            Self::Plugin => "plugin",
            Self::Normal => "module",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Naming rules derived from the registry settings.
#[derive(Debug, Clone)]
pub struct ModuleNaming {
    scope: String,
    framework_keyword: String,
}

impl ModuleNaming {
    /// Naming for a scope such as `@kithost`.
    pub fn new(scope: impl Into<String>, framework_keyword: impl Into<String>) -> Self {
        let scope = scope.into();
        let scope = if scope.starts_with('@') { scope } else { format!("@{scope}") };
        Self {
            scope: scope.trim_end_matches('/').to_string(),
            framework_keyword: framework_keyword.into(),
        }
    }

    /// Naming from the registry settings.
    pub fn from_settings(settings: &RegistrySettings) -> Self {
        Self::new(&settings.scope, &settings.framework_keyword)
    }

    /// The package scope.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Keyword every kithost module carries.
    pub fn get_framework_keyword(&self) -> &str {
        &self.framework_keyword
    }

    /// Package name without any scope.
    pub fn get_pkg_name<'a>(&self, name: &'a str) -> &'a str {
        match name.strip_prefix('@') {
            Some(scoped) => scoped.split_once('/').map_or(scoped, |(_, pkg)| pkg),
            None => name,
        }
    }

    /// Full name of `name` as given, adding the scope when it has none.
    pub fn get_full_name(&self, name: &str) -> String {
        let name = name.trim();
        if name.starts_with('@') {
            name.to_string()
        } else {
            format!("{}/{}", self.scope, name)
        }
    }

    /// Full name of a kit: `react`, `kit-react` and `@kithost/kit-react`
    /// all map to `@kithost/kit-react`.
    pub fn get_kit_name(&self, name: &str) -> String {
        self.prefixed(name, ModuleKind::Kit)
    }

    /// Full name of a plugin.
    pub fn get_plugin_name(&self, name: &str) -> String {
        self.prefixed(name, ModuleKind::Plugin)
    }

    /// Short name with scope and kind prefix removed.
    pub fn get_short_name<'a>(&self, name: &'a str) -> &'a str {
        let pkg = self.get_pkg_name(name);
        pkg.strip_prefix(KIT_PREFIX).or_else(|| pkg.strip_prefix(PLUGIN_PREFIX)).unwrap_or(pkg)
    }

    /// Classify a name by its package prefix.
    pub fn check_module_type(&self, name: &str) -> ModuleKind {
        let pkg = self.get_pkg_name(name);
        if pkg.starts_with(KIT_PREFIX) {
            ModuleKind::Kit
        } else if pkg.starts_with(PLUGIN_PREFIX) {
            ModuleKind::Plugin
        } else {
            ModuleKind::Normal
        }
    }

    /// Check that a full name is `@scope/pkg` or `pkg`, so it maps to exactly
    /// one directory below `node_modules`.
    pub fn validate_full_name(full_name: &str) -> Result<(), String> {
        match full_name.strip_prefix('@') {
            Some(scoped) => {
                let (scope, pkg) = scoped
                    .split_once('/')
                    .ok_or_else(|| "scoped name has no package part".to_string())?;
                check_segment(scope, "scope")?;
                check_segment(pkg, "package name")
            }
            None => check_segment(full_name, "package name"),
        }
    }

    fn prefixed(&self, name: &str, kind: ModuleKind) -> String {
        let name = name.trim();
        if name.starts_with('@') {
            return name.to_string();
        }
        if name.starts_with(kind.prefix()) {
            return self.get_full_name(name);
        }
        self.get_full_name(&format!("{}{}", kind.prefix(), name))
    }
}

fn check_segment(segment: &str, what: &str) -> Result<(), String> {
    if segment.is_empty() {
        return Err(format!("empty {what}"));
    }
    if segment.starts_with('.') {
        return Err(format!("{what} cannot start with '.'"));
    }
    if segment.contains(['/', '\\']) {
        return Err(format!("{what} cannot contain path separators"));
    }
    if segment.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(format!("{what} cannot contain whitespace"));
    }
    Ok(())
}

/// A module resolved to its local installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Scoped package name.
    pub full_name: String,
    /// Module kind.
    pub kind: ModuleKind,
    /// Installation directory.
    pub local_path: PathBuf,
    /// Installed metadata, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg_info: Option<PackageInfo>,
}

impl ModuleDescriptor {
    /// Describe the module `name` refers to. Names without a kind prefix
    /// are taken as-is (scoped if needed) and classified as normal modules.
    pub fn resolve(naming: &ModuleNaming, home: &Home, name: &str) -> Self {
        let full_name = naming.get_full_name(name);
        Self::for_full_name(naming, home, full_name)
    }

    /// Describe a kit by any of its names.
    pub fn kit(naming: &ModuleNaming, home: &Home, name: &str) -> Self {
        Self::for_full_name(naming, home, naming.get_kit_name(name))
    }

    fn for_full_name(naming: &ModuleNaming, home: &Home, full_name: String) -> Self {
        Self {
            kind: naming.check_module_type(&full_name),
            local_path: home.get_module_dir(&full_name),
            full_name,
            pkg_info: None,
        }
    }

    /// Path of the module manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.local_path.join("package.json")
    }

    /// Installed version, if known.
    pub fn version(&self) -> Option<&str> {
        self.pkg_info.as_ref().map(|p| p.version.as_str())
    }
}

/// A module entry in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    /// Full package name.
    pub name: String,
    /// Description, empty when the package has none.
    pub description: String,
    /// Module kind.
    pub kind: ModuleKind,
    /// Version, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ListItem {
    /// Listing entry for a package.
    pub fn from_package(naming: &ModuleNaming, info: &PackageInfo) -> Self {
        Self {
            name: info.name.clone(),
            description: info.description.clone().unwrap_or_default(),
            kind: naming.check_module_type(&info.name),
            version: (!info.version.is_empty()).then(|| info.version.clone()),
        }
    }
}

/// Local and online modules split by kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllModules {
    /// Kits.
    pub kit: Vec<ListItem>,
    /// Plugins and other modules.
    pub module: Vec<ListItem>,
}
