//! Kit context types.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::RuntimeContext;

/// A kit command body. Receives its own clone of the runtime context.
pub type CommandFn =
    Arc<dyn Fn(RuntimeContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Module configuration a kit exposes, keyed by module name.
pub type KitModules = HashMap<String, Value>;

/// A command provided by a kit.
#[derive(Clone)]
pub struct KitCommand {
    /// One-line description shown in listings.
    pub description: String,
    /// Command body.
    pub run: CommandFn,
}

impl KitCommand {
    /// Wrap an async function as a command.
    pub fn new<F, Fut>(description: impl Into<String>, f: F) -> Self
    where
        F: Fn(RuntimeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self { description: description.into(), run: Arc::new(move |ctx| Box::pin(f(ctx))) }
    }
}

impl fmt::Debug for KitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KitCommand").field("description", &self.description).finish_non_exhaustive()
    }
}

/// What a loaded kit provides.
#[derive(Debug, Clone, Default)]
pub struct KitContext {
    /// Full package name of the kit.
    pub name: String,
    /// Installed version.
    pub version: Option<String>,
    /// Commands by name.
    pub commands: BTreeMap<String, KitCommand>,
    /// Module configuration by module name.
    pub modules: KitModules,
}

impl KitContext {
    /// Empty context for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Add a command.
    #[must_use]
    pub fn with_command(mut self, name: impl Into<String>, command: KitCommand) -> Self {
        self.commands.insert(name.into(), command);
        self
    }

    /// Add module configuration.
    #[must_use]
    pub fn with_module(mut self, name: impl Into<String>, config: Value) -> Self {
        self.modules.insert(name.into(), config);
        self
    }

    /// Look up a command.
    pub fn command(&self, name: &str) -> Option<&KitCommand> {
        self.commands.get(name)
    }

    /// Command names in order.
    pub fn command_names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_lookup() {
        let kit = KitContext::new("@kithost/kit-react")
            .with_command("dev", KitCommand::new("Start dev server", |_ctx| async { Ok(()) }))
            .with_command("build", KitCommand::new("Build", |_ctx| async { Ok(()) }))
            .with_module("lint", serde_json::json!({ "strict": true }));

        assert_eq!(kit.command_names(), vec!["build", "dev"]);
        assert_eq!(kit.command("dev").unwrap().description, "Start dev server");
        assert!(kit.command("test").is_none());
        assert_eq!(kit.modules["lint"]["strict"], true);
    }
}
