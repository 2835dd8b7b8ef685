//! npm-compatible registry client.
//!
//! Metadata and search go straight to the registry over HTTP. Installs are
//! delegated to the configured installer binary so lifecycle scripts and
//! dependency trees behave exactly as they do for the package authors.

use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

use super::{
    split_package_spec, InfoOptions, InstallOptions, PackageInfo, PackageRegistry, RegistryCommand,
    RegistryError, RegistryErrorReason, RegistryResult,
};

/// Maximum number of search results requested from the registry.
const SEARCH_PAGE_SIZE: usize = 250;

/// Registry client backed by an npm registry and installer.
#[derive(Debug, Clone)]
pub struct NpmRegistry {
    client: reqwest::Client,
    registry_url: String,
    installer: String,
    default_tag: String,
}

impl NpmRegistry {
    /// Create a client for `registry_url` that installs with `installer`.
    pub fn new(
        registry_url: impl Into<String>,
        installer: impl Into<String>,
    ) -> RegistryResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("kithost/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::unknown(e.to_string()))?;

        Ok(Self {
            client,
            registry_url: registry_url.into(),
            installer: installer.into(),
            default_tag: "latest".to_string(),
        })
    }

    /// Resolve a different dist-tag by default.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.default_tag = tag.into();
        self
    }

    /// Registry base URL.
    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    fn registry<'a>(&'a self, over: Option<&'a str>) -> &'a str {
        over.unwrap_or(self.registry_url.as_str()).trim_end_matches('/')
    }

    /// Metadata URL of a package. Scoped names keep their `@` and encode the
    /// slash, as the registry expects.
    fn package_url(registry: &str, name: &str) -> String {
        match name.strip_prefix('@') {
            Some(rest) => format!("{registry}/@{}", urlencoding::encode(rest)),
            None => format!("{registry}/{}", urlencoding::encode(name)),
        }
    }

    async fn run(
        &self,
        command: RegistryCommand,
        packages: &[String],
        opts: &InstallOptions,
    ) -> RegistryResult<()> {
        let registry = self.registry(opts.registry.as_deref()).to_string();
        let specs: Vec<String> = packages
            .iter()
            .map(|p| match (&opts.tag, split_package_spec(p)) {
                (Some(tag), (name, None)) if command != RegistryCommand::Uninstall => {
                    format!("{name}@{tag}")
                }
                _ => p.clone(),
            })
            .collect();

        tracing::debug!(
            installer = %self.installer,
            %command,
            ?specs,
            prefix = %opts.prefix.display(),
            "running installer"
        );

        let output = Command::new(&self.installer)
            .arg(command.as_str())
            .args(&specs)
            .arg("--prefix")
            .arg(&opts.prefix)
            .arg("--registry")
            .arg(&registry)
            .arg("--no-audit")
            .arg("--no-fund")
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = classify_installer_error(&stderr);
        let detail = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
        Err(RegistryError::new(
            reason,
            format!("{} {} {} failed: {}", self.installer, command, specs.join(" "), detail),
        ))
    }

    fn read_installed(prefix: &Path, packages: &[String]) -> RegistryResult<Vec<PackageInfo>> {
        packages
            .iter()
            .map(|spec| {
                let (name, _) = split_package_spec(spec);
                let manifest = prefix.join("node_modules").join(name).join("package.json");
                PackageInfo::from_file(&manifest).map_err(|e| {
                    RegistryError::unknown(format!("installed package {name} is unreadable: {e}"))
                })
            })
            .collect()
    }
}

#[async_trait]
impl PackageRegistry for NpmRegistry {
    async fn install(
        &self,
        packages: &[String],
        opts: &InstallOptions,
    ) -> RegistryResult<Vec<PackageInfo>> {
        self.run(RegistryCommand::Install, packages, opts).await?;
        Self::read_installed(&opts.prefix, packages)
    }

    async fn uninstall(&self, packages: &[String], opts: &InstallOptions) -> RegistryResult<()> {
        self.run(RegistryCommand::Uninstall, packages, opts).await
    }

    async fn update(
        &self,
        packages: &[String],
        opts: &InstallOptions,
    ) -> RegistryResult<Vec<PackageInfo>> {
        // `npm update` respects the saved range; installing the tag moves past it.
        let opts = InstallOptions {
            tag: opts.tag.clone().or_else(|| Some(self.default_tag.clone())),
            ..opts.clone()
        };
        self.run(RegistryCommand::Install, packages, &opts).await?;
        Self::read_installed(&opts.prefix, packages)
    }

    fn get(&self, command: Option<RegistryCommand>) -> String {
        match command {
            Some(cmd) => format!("{} {}", self.installer, cmd),
            None => self.installer.clone(),
        }
    }

    async fn get_info(
        &self,
        name: &str,
        opts: &InfoOptions,
    ) -> RegistryResult<Option<PackageInfo>> {
        let url = Self::package_url(self.registry(opts.registry.as_deref()), name);
        let response = self.client.get(&url).header("Accept", "application/json").send().await?;

        match response.status().as_u16() {
            404 => return Ok(None),
            401 | 403 => {
                return Err(RegistryError::permission(format!(
                    "registry refused {name}: HTTP {}",
                    response.status()
                )))
            }
            s if !(200..300).contains(&s) => {
                return Err(RegistryError::unknown(format!(
                    "registry lookup of {name} failed: HTTP {}",
                    response.status()
                )))
            }
            _ => {}
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| RegistryError::unknown(format!("invalid metadata for {name}: {e}")))?;

        let tag = opts.tag.as_deref().unwrap_or(&self.default_tag);
        Ok(select_tagged_version(&document, tag))
    }

    async fn search(&self, keyword: &str) -> RegistryResult<Vec<PackageInfo>> {
        let url = format!(
            "{}/-/v1/search?text=keywords:{}&size={SEARCH_PAGE_SIZE}",
            self.registry(None),
            urlencoding::encode(keyword)
        );
        let response = self.client.get(&url).send().await?.error_for_status()?;

        let result: SearchResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::unknown(format!("invalid search response: {e}")))?;

        Ok(result.objects.into_iter().map(|o| o.package).collect())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    objects: Vec<SearchObject>,
}

#[derive(Debug, Deserialize)]
struct SearchObject {
    package: PackageInfo,
}

/// Pick the version a dist-tag points at out of a packument.
fn select_tagged_version(document: &Value, tag: &str) -> Option<PackageInfo> {
    let version = document.get("dist-tags")?.get(tag)?.as_str()?;
    let manifest = document.get("versions")?.get(version)?;

    match serde_json::from_value(manifest.clone()) {
        Ok(info) => Some(info),
        Err(e) => {
            tracing::debug!(version, error = %e, "unreadable version manifest");
            None
        }
    }
}

/// Classify installer stderr into a registry error reason.
pub fn classify_installer_error(stderr: &str) -> RegistryErrorReason {
    static CODE: OnceLock<Regex> = OnceLock::new();
    let code_re = CODE.get_or_init(|| {
        Regex::new(r"(?m)npm (?:ERR!|error) code (E[A-Z0-9_]+)")
            .expect("valid installer error pattern")
    });

    let code = code_re.captures(stderr).and_then(|c| c.get(1)).map(|m| m.as_str());
    let classify = |token: &str| match token {
        "E404" | "ETARGET" => Some(RegistryErrorReason::NotFound),
        "EACCES" | "EPERM" | "E401" | "E403" => Some(RegistryErrorReason::Permission),
        "ENOTFOUND" | "ETIMEDOUT" | "ECONNREFUSED" | "ECONNRESET" | "EAI_AGAIN" => {
            Some(RegistryErrorReason::Network)
        }
        _ => None,
    };

    if let Some(reason) = code.and_then(classify) {
        return reason;
    }

    // Older installers and forks only print the errno somewhere in the text.
    let tokens = [
        "E404", "ETARGET", "EACCES", "EPERM", "ENOTFOUND", "ETIMEDOUT", "ECONNREFUSED",
        "ECONNRESET", "EAI_AGAIN",
    ];
    if let Some(reason) = tokens.iter().find(|t| stderr.contains(*t)).and_then(|t| classify(t)) {
        return reason;
    }
    if stderr.contains("404 Not Found") {
        return RegistryErrorReason::NotFound;
    }
    RegistryErrorReason::Unknown
}
