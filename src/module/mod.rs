//! Module resolution.
//!
//! Turns module names into usable local installations:
//!
//! - [`descriptor`]: naming rules and module descriptors
//! - [`checker`]: version freshness against the registry
//! - [`recovery`]: failure records and retry decisions
//! - [`resolver`]: install, update and reinstall on demand

pub mod checker;
pub mod descriptor;
pub mod error;
pub mod recovery;
pub mod resolver;

pub use checker::{CheckResult, CheckTarget, CheckType, UpdateChecker};
pub use descriptor::{AllModules, ListItem, ModuleDescriptor, ModuleKind, ModuleNaming};
pub use error::{ErrorCode, ErrorRecord, ResolutionError, ResolutionResult};
pub use recovery::{DefaultPolicy, ErrorRecoveryRegistry, RecoveryPolicy, RetryDecision};
pub use resolver::{LocalState, ModuleResolver};
