//! Subprocess kits.
//!
//! A kit published as a plain package declares its commands in the
//! `kithost` section of its `package.json`:
//!
//! ```json
//! "kithost": {
//!   "type": "kit",
//!   "commands": { "dev": { "bin": "bin/dev", "args": ["--watch"], "description": "Start" } },
//!   "modules": { "lint": { "strict": true } }
//! }
//! ```
//!
//! Each command runs `<module dir>/<bin> <args> <client args>` in the current
//! directory with inherited stdio and the invocation in `KITHOST_CONTEXT`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

use super::{KitCommand, KitContext, KitFactory, KitModules, RuntimeContext, CONTEXT_ENV};
use crate::registry::PackageInfo;

/// The `kithost` section of a package manifest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KitManifest {
    /// Declared module type; only `kit` (or nothing) is loadable as a kit.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Commands by name.
    #[serde(default)]
    pub commands: BTreeMap<String, ExternalCommand>,

    /// Module configuration exposed to other modules.
    #[serde(default)]
    pub modules: KitModules,
}

/// One subprocess command.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalCommand {
    /// Executable, relative to the module directory.
    pub bin: String,

    /// Fixed arguments placed before the client's.
    #[serde(default)]
    pub args: Vec<String>,

    /// One-line description.
    #[serde(default)]
    pub description: Option<String>,
}

/// A subprocess kit command exited unsuccessfully.
#[derive(Debug, Error)]
#[error("'{program}' exited with {}", describe_exit(.code))]
pub struct ExitError {
    /// Program that was run.
    pub program: String,
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
}

impl KitManifest {
    /// Parse the `kithost` section of a package, if it has one.
    pub fn from_package(info: &PackageInfo) -> Option<Result<Self, String>> {
        let section = info.kithost.clone()?;
        let manifest = match serde_json::from_value::<Self>(section) {
            Ok(manifest) => manifest,
            Err(e) => return Some(Err(e.to_string())),
        };

        match manifest.kind.as_deref() {
            None | Some("kit") => Some(Ok(manifest)),
            Some(other) => Some(Err(format!("declared type '{other}' is not a kit"))),
        }
    }

    /// Factory building a kit whose commands run as subprocesses.
    pub fn into_factory(self) -> KitFactory {
        Arc::new(move |desc| {
            let mut kit = KitContext::new(&desc.full_name);
            kit.version = desc.version().map(str::to_string);
            kit.modules = self.modules.clone();

            for (name, command) in &self.commands {
                let root = desc.local_path.clone();
                let spec = command.clone();
                let description = spec.description.clone().unwrap_or_default();
                kit.commands.insert(
                    name.clone(),
                    KitCommand::new(description, move |ctx| {
                        run_external(root.clone(), spec.clone(), ctx)
                    }),
                );
            }
            Ok(kit)
        })
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

fn program_path(root: &Path, bin: &str) -> PathBuf {
    let bin = Path::new(bin);
    if bin.is_absolute() {
        bin.to_path_buf()
    } else {
        root.join(bin)
    }
}

async fn run_external(
    root: PathBuf,
    spec: ExternalCommand,
    ctx: RuntimeContext,
) -> anyhow::Result<()> {
    let program = program_path(&root, &spec.bin);
    tracing::debug!(program = %program.display(), args = ?spec.args, "spawning kit command");

    let status = tokio::process::Command::new(&program)
        .args(&spec.args)
        .args(ctx.client_args())
        .env(CONTEXT_ENV, ctx.invocation().to_string())
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("failed to start '{}'", program.display()))?;

    if status.success() {
        Ok(())
    } else {
        Err(ExitError { program: spec.bin, code: status.code() }.into())
    }
}
