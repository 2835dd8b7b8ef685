#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::ref_option)]

//! # Kithost
//!
//! A command-line toolkit host that installs, caches and runs versioned
//! extension modules ("kits" and "plugins") published to an npm-style
//! registry.
//!
//! ## Features
//!
//! - **On-demand install**: kits are installed on first use and reinstalled
//!   when the local copy is stale or broken
//! - **Cheap update checks**: version checks are memoized with expiry windows
//! - **Error recovery**: failures are classified and retried only while every
//!   recorded failure is transient
//! - **Two kit flavors**: compiled factories and subprocess commands
//!
//! ## Quick Start
//!
//! ```bash
//! # Pick a kit for this machine
//! kithost kit use react
//!
//! # Run one of its commands
//! kithost run dev -- --open
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::redundant_clone)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::future_not_send)]

pub mod core;
pub mod host;
pub mod module;
pub mod plugin;
pub mod registry;

// Re-export commonly used types
pub use core::{CacheStore, Home, KitConfig, Settings};
pub use host::{Host, HostBuilder, HostError, HostResult};
pub use module::{
    CheckResult, ErrorCode, ErrorRecord, ErrorRecoveryRegistry, ModuleDescriptor, ModuleKind,
    ModuleResolver, RecoveryPolicy, ResolutionError, UpdateChecker,
};
pub use plugin::{KitCatalog, KitCommand, KitContext, LoadError, PluginContainer, RuntimeContext};
pub use registry::{NpmRegistry, PackageInfo, PackageRegistry, RegistryError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "kithost";
