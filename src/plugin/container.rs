//! Plugin container.
//!
//! Loads a resolved kit module into a [`KitContext`], keeps the active kit
//! alive, and binds it into runtime contexts for dispatch.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{
    KitCatalog, KitContext, KitFactory, KitManifest, KitModules, LoadError, LoadResult,
    RuntimeContext,
};
use crate::module::{ErrorRecoveryRegistry, ModuleDescriptor, ModuleResolver};
use crate::registry::PackageInfo;

/// Owns the loaded kit.
pub struct PluginContainer {
    resolver: Arc<ModuleResolver>,
    catalog: KitCatalog,
    errors: Arc<ErrorRecoveryRegistry>,
    current: RwLock<Option<Arc<KitContext>>>,
}

impl std::fmt::Debug for PluginContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContainer")
            .field("catalog", &self.catalog)
            .field("current", &self.current.read().as_ref().map(|k| k.name.clone()))
            .finish_non_exhaustive()
    }
}

impl PluginContainer {
    /// Create a container.
    pub fn new(
        resolver: Arc<ModuleResolver>,
        catalog: KitCatalog,
        errors: Arc<ErrorRecoveryRegistry>,
    ) -> Self {
        Self { resolver, catalog, errors, current: RwLock::new(None) }
    }

    /// Compiled kits known to this container.
    pub fn catalog(&self) -> &KitCatalog {
        &self.catalog
    }

    /// Entry point of the kit installed at `path`.
    pub fn require_kit_module(&self, path: &Path) -> LoadResult<KitFactory> {
        let manifest = path.join("package.json");
        let info = PackageInfo::from_file(&manifest).map_err(|e| LoadError::Manifest {
            name: path.display().to_string(),
            reason: e.to_string(),
        })?;

        if let Some(factory) = self.catalog.get(&info.name) {
            tracing::debug!(kit = %info.name, "using compiled kit");
            return Ok(factory);
        }

        match KitManifest::from_package(&info) {
            Some(Ok(manifest)) => {
                tracing::debug!(
                    kit = %info.name,
                    commands = manifest.commands.len(),
                    "using subprocess kit"
                );
                Ok(manifest.into_factory())
            }
            Some(Err(reason)) => Err(LoadError::Manifest { name: info.name, reason }),
            None => Err(LoadError::MissingEntry { name: info.name }),
        }
    }

    /// Resolve, load and activate a kit.
    pub async fn require_kit(&self, kit_name: &str) -> LoadResult<Arc<KitContext>> {
        let desc = self.resolver.get_kit(kit_name).await?;
        let kit = Arc::new(self.load(&desc)?);

        tracing::debug!(
            kit = %kit.name,
            version = ?kit.version,
            commands = ?kit.command_names(),
            "kit loaded"
        );
        *self.current.write() = Some(kit.clone());
        Ok(kit)
    }

    /// Installed metadata of a kit, resolving it first.
    pub async fn require_kit_pkg_info(&self, kit_name: &str) -> LoadResult<PackageInfo> {
        let desc = self.resolver.get_kit(kit_name).await?;
        desc.pkg_info.ok_or(LoadError::MissingEntry { name: desc.full_name })
    }

    /// Run the kit entry for `desc`. Errors and panics from the factory are
    /// recorded as `init-threw`.
    pub fn load(&self, desc: &ModuleDescriptor) -> LoadResult<KitContext> {
        let factory = self.require_kit_module(&desc.local_path).inspect_err(|e| {
            self.errors.register(e.to_record());
        })?;

        let outcome = catch_unwind(AssertUnwindSafe(|| factory(desc)));
        let message = match outcome {
            Ok(Ok(mut kit)) => {
                if kit.name.is_empty() {
                    kit.name.clone_from(&desc.full_name);
                }
                if kit.version.is_none() {
                    kit.version = desc.version().map(str::to_string);
                }
                return Ok(kit);
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(panic) => panic_message(panic.as_ref()),
        };

        let err = LoadError::InitThrew { name: desc.full_name.clone(), message };
        tracing::error!(kit = %desc.full_name, error = %err, "kit initialization failed");
        self.errors.register(err.to_record());
        Err(err)
    }

    /// Bind the active kit into `runtime`, replacing any earlier binding.
    /// Returns the kit's module table.
    pub fn set_kit_context(&self, runtime: &mut RuntimeContext) -> LoadResult<KitModules> {
        let kit = self.context().ok_or(LoadError::NoKit)?;
        runtime.bind_kit(&kit);
        Ok(kit.modules.clone())
    }

    /// The active kit.
    pub fn context(&self) -> Option<Arc<KitContext>> {
        self.current.read().clone()
    }

    /// Dispatch `command` to the active kit.
    pub async fn run(&self, command: &str, mut runtime: RuntimeContext) -> LoadResult<()> {
        self.set_kit_context(&mut runtime)?;
        let kit = self.context().ok_or(LoadError::NoKit)?;

        let Some(entry) = kit.command(command) else {
            return Err(LoadError::UnknownCommand {
                kit: kit.name.clone(),
                command: command.to_string(),
                available: kit.command_names().join(", "),
            });
        };

        tracing::info!(kit = %kit.name, command, "running kit command");
        let run = entry.run.clone();
        run(runtime)
            .await
            .map_err(|cause| LoadError::Command { command: command.to_string(), cause })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "kit panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ErrorCode;
    use crate::plugin::KitCommand;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn install(desc: &ModuleDescriptor, extra: serde_json::Value) {
        std::fs::create_dir_all(&desc.local_path).unwrap();
        let mut manifest = json!({ "name": desc.full_name, "version": "1.0.0" });
        if let (Some(obj), Some(extra)) = (manifest.as_object_mut(), extra.as_object()) {
            obj.extend(extra.clone());
        }
        std::fs::write(desc.manifest_path(), manifest.to_string()).unwrap();
    }

    fn container(
        temp: &TempDir,
        catalog: KitCatalog,
    ) -> (PluginContainer, Arc<ErrorRecoveryRegistry>) {
        let services = crate::plugin::runtime::test_support::services(temp.path());
        let errors = Arc::new(ErrorRecoveryRegistry::new());
        (PluginContainer::new(services.resolver.clone(), catalog, errors.clone()), errors)
    }

    #[test]
    fn test_missing_entry() {
        let temp = TempDir::new().unwrap();
        let (container, errors) = container(&temp, KitCatalog::new());
        let desc = container.resolver.descriptor("kit-empty");
        install(&desc, json!({}));

        let err = container.load(&desc).unwrap_err();
        assert!(matches!(err, LoadError::MissingEntry { .. }));
        assert_eq!(errors.get_error_list()[0].code, ErrorCode::MissingEntry);
    }

    #[test]
    fn test_factory_error_and_panic_become_init_threw() {
        let temp = TempDir::new().unwrap();
        let mut catalog = KitCatalog::new();
        catalog.register("@kithost/kit-err", |_| anyhow::bail!("bad config"));
        catalog.register("@kithost/kit-panic", |_| panic!("boom"));
        let (container, errors) = container(&temp, catalog);

        let desc = container.resolver.descriptor("kit-err");
        install(&desc, json!({}));
        let err = container.load(&desc).unwrap_err();
        assert!(matches!(err, LoadError::InitThrew { ref message, .. } if message == "bad config"));

        let desc = container.resolver.descriptor("kit-panic");
        install(&desc, json!({}));
        let err = container.load(&desc).unwrap_err();
        assert!(matches!(err, LoadError::InitThrew { ref message, .. } if message == "boom"));

        let list = errors.get_error_list();
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|r| r.code == ErrorCode::InitThrew && !r.retryable));
    }

    #[tokio::test]
    async fn test_require_bind_and_run() {
        let temp = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut catalog = KitCatalog::new();
        catalog.register("@kithost/kit-demo", move |_| {
            let counter = counter.clone();
            Ok(KitContext::default()
                .with_module("lint", json!({ "strict": true }))
                .with_command(
                    "dev",
                    KitCommand::new("dev", move |ctx| {
                        let counter = counter.clone();
                        async move {
                            assert_eq!(ctx.client_args(), ["x"]);
                            assert!(ctx.kit().is_some());
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    }),
                ))
        });
        let (container, _) = container(&temp, catalog);
        let services = crate::plugin::runtime::test_support::services(temp.path());
        install(&container.resolver.descriptor("kit-demo"), json!({}));

        let kit = container.require_kit("demo").await.unwrap();
        assert_eq!(kit.name, "@kithost/kit-demo");
        assert_eq!(kit.version.as_deref(), Some("1.0.0"));

        let mut runtime = RuntimeContext::new("kithost", services.clone());
        let modules = container.set_kit_context(&mut runtime).unwrap();
        assert_eq!(modules["lint"]["strict"], true);

        let runtime = runtime.with_invocation("dev", vec!["x".to_string()], Default::default());
        container.run("dev", runtime.clone()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = container.run("test", runtime).await.unwrap_err();
        assert!(matches!(
            err,
            LoadError::UnknownCommand { ref available, .. } if available == "dev"
        ));
    }

    #[tokio::test]
    async fn test_run_without_kit() {
        let temp = TempDir::new().unwrap();
        let (container, _) = container(&temp, KitCatalog::new());
        let services = crate::plugin::runtime::test_support::services(temp.path());

        let err = container.run("dev", RuntimeContext::new("kithost", services)).await.unwrap_err();
        assert!(matches!(err, LoadError::NoKit));
    }
}
