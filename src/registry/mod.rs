//! Package registry client.
//!
//! Kits, plugins and the host's own packages are published to an npm-style
//! registry. Everything the resolver and update checker need from it goes
//! through the [`PackageRegistry`] trait, so tests can substitute an
//! in-memory registry.
//!
//! Absence is not an error: [`PackageRegistry::get_info`] returns
//! `Ok(None)` for a package the registry does not know, and reserves `Err`
//! for failures to ask.

mod error;
mod npm;
mod types;

use async_trait::async_trait;

pub use error::{RegistryError, RegistryErrorReason, RegistryResult};
pub use npm::{classify_installer_error, NpmRegistry};
pub use types::{
    split_package_spec, DistInfo, InfoOptions, InstallOptions, PackageInfo, RegistryCommand,
};

/// Operations against a remote package source.
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// Install packages (`name` or `name@range`) into `opts.prefix`, returning
    /// the installed metadata in the same order.
    async fn install(
        &self,
        packages: &[String],
        opts: &InstallOptions,
    ) -> RegistryResult<Vec<PackageInfo>>;

    /// Remove packages from `opts.prefix`.
    async fn uninstall(&self, packages: &[String], opts: &InstallOptions) -> RegistryResult<()>;

    /// Move packages in `opts.prefix` to the latest tagged version.
    async fn update(
        &self,
        packages: &[String],
        opts: &InstallOptions,
    ) -> RegistryResult<Vec<PackageInfo>>;

    /// Installer binary, optionally with the subcommand appended.
    fn get(&self, command: Option<RegistryCommand>) -> String;

    /// Metadata of the tagged version of `name`, `None` when unpublished.
    async fn get_info(&self, name: &str, opts: &InfoOptions) -> RegistryResult<Option<PackageInfo>>;

    /// Packages carrying `keyword`.
    async fn search(&self, keyword: &str) -> RegistryResult<Vec<PackageInfo>>;
}
