//! Kit loading and dispatch.
//!
//! A kit is an installed module that provides commands. Two kinds of entry
//! are supported:
//!
//! - **Compiled kits**: factories registered in a [`KitCatalog`] under the
//!   kit's full package name.
//! - **Subprocess kits**: packages whose `package.json` carries a `kithost`
//!   section mapping command names to executables.
//!
//! The [`PluginContainer`] owns the loaded [`KitContext`]; a
//! [`RuntimeContext`] only holds a weak reference to it for one invocation.

mod catalog;
mod container;
mod error;
mod external;
mod runtime;
mod types;

pub use catalog::{KitCatalog, KitFactory};
pub use container::PluginContainer;
pub use error::{LoadError, LoadResult};
pub use external::{ExitError, ExternalCommand, KitManifest};
pub use runtime::{KitLog, RuntimeContext, Services, CONTEXT_ENV};
pub use types::{CommandFn, KitCommand, KitContext, KitModules};
