//! Package metadata and operation options.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Metadata of a package, either from the registry or from a local
/// `package.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Package name, scope included.
    pub name: String,

    /// Package version.
    #[serde(default)]
    pub version: String,

    /// Package description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Search keywords.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    /// Distribution info (registry only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<DistInfo>,

    /// Kit declaration consumed by the plugin container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kithost: Option<serde_json::Value>,
}

impl PackageInfo {
    /// Package with only a name and version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            keywords: Vec::new(),
            dist: None,
            kithost: None,
        }
    }

    /// Read a `package.json`.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Parsed semantic version, if the version string is valid.
    pub fn semver(&self) -> Option<semver::Version> {
        semver::Version::parse(self.version.trim().trim_start_matches('v')).ok()
    }

    /// Whether the package carries `keyword`.
    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k == keyword)
    }
}

/// Tarball location and integrity of a published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistInfo {
    /// Tarball URL.
    #[serde(default)]
    pub tarball: String,
    /// SHA-1 of the tarball.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,
    /// Subresource integrity string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

/// Installer subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryCommand {
    /// Install packages.
    Install,
    /// Remove packages.
    Uninstall,
    /// Update packages.
    Update,
    /// Link a local package.
    Link,
}

impl RegistryCommand {
    /// Installer argument for this command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Update => "update",
            Self::Link => "link",
        }
    }
}

impl fmt::Display for RegistryCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for install, uninstall and update.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Install prefix (the directory holding `node_modules`).
    pub prefix: PathBuf,
    /// Registry override.
    pub registry: Option<String>,
    /// Dist-tag appended to bare package names.
    pub tag: Option<String>,
}

impl InstallOptions {
    /// Install into `prefix` from the default registry.
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self { prefix: prefix.into(), registry: None, tag: None }
    }

    /// Use a specific registry.
    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Use a specific dist-tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Options for metadata lookups.
#[derive(Debug, Clone, Default)]
pub struct InfoOptions {
    /// Registry override.
    pub registry: Option<String>,
    /// Dist-tag to resolve (defaults to `latest`).
    pub tag: Option<String>,
}

/// Split `name@range` into its name and optional range, scope-aware.
pub fn split_package_spec(spec: &str) -> (&str, Option<&str>) {
    let search_from = usize::from(spec.starts_with('@'));
    match spec[search_from..].find('@') {
        Some(idx) => {
            let at = idx + search_from;
            (&spec[..at], Some(&spec[at + 1..]))
        }
        None => (spec, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_package_spec() {
        assert_eq!(split_package_spec("lodash"), ("lodash", None));
        assert_eq!(split_package_spec("lodash@4.17.0"), ("lodash", Some("4.17.0")));
        assert_eq!(split_package_spec("@kithost/kit-react"), ("@kithost/kit-react", None));
        assert_eq!(
            split_package_spec("@kithost/kit-react@beta"),
            ("@kithost/kit-react", Some("beta"))
        );
    }

    #[test]
    fn test_package_info_from_manifest() {
        let json = r#"{
            "name": "@kithost/kit-react",
            "version": "1.2.0",
            "keywords": ["kithost-module"],
            "scripts": {"build": "tsc"}
        }"#;
        let info: PackageInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.name, "@kithost/kit-react");
        assert_eq!(info.semver(), Some(semver::Version::new(1, 2, 0)));
        assert!(info.has_keyword("kithost-module"));
        assert!(info.kithost.is_none());
    }

    #[test]
    fn test_unparsable_version() {
        let info = PackageInfo::new("x", "1.2");
        assert_eq!(info.semver(), None);
        assert_eq!(PackageInfo::new("x", "v2.0.1").semver(), Some(semver::Version::new(2, 0, 1)));
    }

    #[test]
    fn test_registry_command_display() {
        assert_eq!(RegistryCommand::Install.to_string(), "install");
        assert_eq!(RegistryCommand::Link.as_str(), "link");
    }
}
