//! Kithost - run project commands from versioned toolkit modules.
//!
//! Kithost installs the kit selected for a project on first use, keeps it up
//! to date, and dispatches commands to it.

use std::collections::BTreeMap;
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kithost::module::{ListItem, ModuleKind, RecoveryPolicy};
use kithost::{ErrorRecord, Host, HostResult, Settings};

/// Run project commands from versioned toolkit modules
#[derive(Parser)]
#[command(name = "kithost")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command of the active kit
    Run {
        /// Kit to use instead of the configured one
        #[arg(short, long)]
        kit: Option<String>,

        /// Options passed to the command (key=value)
        #[arg(short, long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        set: Vec<(String, String)>,

        /// Command name
        command: String,

        /// Arguments passed to the command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Manage kits
    Kit {
        #[command(subcommand)]
        operation: KitOperation,
    },

    /// Manage installed modules
    Module {
        #[command(subcommand)]
        operation: ModuleOperation,
    },

    /// Check for updates
    Check {
        /// Ignore cached results
        #[arg(short, long)]
        force: bool,

        /// Install the core packages at their latest versions
        #[arg(long)]
        install: bool,
    },

    /// Manage the cache
    Cache {
        #[command(subcommand)]
        operation: CacheOperation,
    },

    /// Show or edit configuration
    Config {
        #[command(subcommand)]
        operation: ConfigOperation,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum KitOperation {
    /// Install a kit and make it the active one
    Use {
        /// Kit name (react, kit-react or @kithost/kit-react)
        name: String,
    },

    /// List kits
    List {
        /// Include kits published to the registry
        #[arg(long)]
        online: bool,
    },

    /// List the commands of a kit
    Commands {
        /// Kit to inspect instead of the configured one
        #[arg(short, long)]
        kit: Option<String>,
    },
}

#[derive(Subcommand)]
enum ModuleOperation {
    /// List modules
    List {
        /// Include modules published to the registry
        #[arg(long)]
        online: bool,

        /// Search the registry by keyword
        #[arg(short, long)]
        keyword: Option<String>,
    },

    /// Install or update a module
    Install {
        /// Module name
        name: String,
    },

    /// Remove an installed module
    Remove {
        /// Module name
        name: String,
    },
}

#[derive(Subcommand)]
enum CacheOperation {
    /// Drop cached update checks and listings
    Clean {
        /// Also remove installed modules and core packages
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum ConfigOperation {
    /// Print a configured value
    Get {
        /// Key to look up
        key: String,
    },

    /// Store a value in the home config
    Set {
        /// Key to set
        key: String,
        /// Value to store
        value: String,
    },

    /// Print every configured value
    List,

    /// Print the home config file path
    Path,
}

/// Asks before offering alternatives for a module that does not exist.
struct InteractivePolicy;

#[async_trait]
impl RecoveryPolicy for InteractivePolicy {
    async fn on_not_found(&self, record: &ErrorRecord) -> bool {
        if !io::stdin().is_terminal() {
            return false;
        }

        let name = record.module_name.as_deref().unwrap_or("module");
        let question = format!("'{name}' does not exist in the registry. Show available kits?");
        confirm(question, io::BufReader::new(io::stdin())).await
    }
}

/// Ask a yes/no question on stderr, reading the answer off the runtime
/// threads. Anything but `y` is a no.
async fn confirm<R>(question: String, mut input: R) -> bool
where
    R: BufRead + Send + 'static,
{
    let answer = tokio::task::spawn_blocking(move || {
        eprint!("{question} [y/N] ");
        io::stderr().flush().ok()?;

        let mut line = String::new();
        input.read_line(&mut line).ok()?;
        Some(line.trim().eq_ignore_ascii_case("y"))
    })
    .await;

    matches!(answer, Ok(Some(true)))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };

    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).init();

    if let Commands::Completions { shell } = cli.command {
        cmd_completions(shell);
        return Ok(());
    }

    let rt = tokio::runtime::Runtime::new()?;
    let code = rt.block_on(async {
        let host = match build_host().await {
            Ok(host) => host,
            Err(e) => {
                eprintln!("{}", e.report());
                return 1;
            }
        };

        match dispatch(&host, cli.command).await {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{}", e.report());
                for record in host.error_report() {
                    tracing::debug!(%record, "recorded failure");
                }
                if e.offers_install() {
                    print_available_kits(&host).await;
                }
                1
            }
        }
    });

    std::process::exit(code);
}

async fn build_host() -> HostResult<Host> {
    let settings = Settings::load()?;
    let mut builder = Host::builder(settings).policy(Arc::new(InteractivePolicy));
    if let Ok(cwd) = std::env::current_dir() {
        builder = builder.project_root(cwd);
    }
    builder.build().await
}

async fn dispatch(host: &Host, command: Commands) -> HostResult<()> {
    match command {
        Commands::Run { kit, set, command, args } => {
            let options: BTreeMap<String, String> = set.into_iter().collect();
            host.run(&command, args, options, kit.as_deref()).await?;
            print_update_tip(host).await;
            Ok(())
        }
        Commands::Kit { operation } => cmd_kit(host, operation).await,
        Commands::Module { operation } => cmd_module(host, operation).await,
        Commands::Check { force, install } => cmd_check(host, force, install).await,
        Commands::Cache { operation: CacheOperation::Clean { all } } => {
            host.clean(all)?;
            println!("Cache cleaned");
            Ok(())
        }
        Commands::Config { operation } => cmd_config(host, operation),
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    }
}

/// Handle kit commands.
async fn cmd_kit(host: &Host, operation: KitOperation) -> HostResult<()> {
    match operation {
        KitOperation::Use { name } => {
            let desc = host.use_kit(&name).await?;
            println!("Using {} v{}", desc.full_name, desc.version().unwrap_or("?"));
        }
        KitOperation::List { online } => {
            let kits: Vec<ListItem> = if online {
                host.resolver().get_kit_list().await?
            } else {
                host.resolver()
                    .get_local_module_list()
                    .into_iter()
                    .filter(|item| item.kind == ModuleKind::Kit)
                    .collect()
            };

            let active = host
                .config()
                .get_kit_name(host.project_root())
                .map(|name| host.resolver().naming().get_kit_name(&name));

            if kits.is_empty() {
                println!("No kits installed.");
                println!("\nInstall one with:");
                println!("  kithost kit use <name>");
            } else {
                for kit in &kits {
                    let is_active = active.as_deref() == Some(kit.name.as_str());
                    let marker = if is_active { "*" } else { " " };
                    print_item(marker, kit);
                }
            }
        }
        KitOperation::Commands { kit } => {
            let commands = host.kit_commands(kit.as_deref()).await?;
            let width = commands.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
            for (name, description) in commands {
                println!("  {name:width$}  {description}");
            }
        }
    }
    Ok(())
}

/// Handle module commands.
async fn cmd_module(host: &Host, operation: ModuleOperation) -> HostResult<()> {
    match operation {
        ModuleOperation::List { online, keyword } => {
            if let Some(keyword) = keyword {
                for item in host.resolver().get_online_module_list(Some(&keyword)).await? {
                    print_item(" ", &item);
                }
            } else if online {
                let all = host.resolver().get_all_modules().await?;
                println!("Kits:");
                all.kit.iter().for_each(|item| print_item(" ", item));
                println!("\nModules:");
                all.module.iter().for_each(|item| print_item(" ", item));
            } else {
                let local = host.resolver().get_local_module_list();
                if local.is_empty() {
                    println!("No modules installed.");
                }
                local.iter().for_each(|item| print_item(" ", item));
            }
        }
        ModuleOperation::Install { name } => {
            let desc = host.install_module(&name).await?;
            println!("Installed {} v{}", desc.full_name, desc.version().unwrap_or("?"));
        }
        ModuleOperation::Remove { name } => {
            host.remove_module(&name).await?;
            println!("Removed {}", host.resolver().naming().get_full_name(&name));
        }
    }
    Ok(())
}

/// Handle update checks.
async fn cmd_check(host: &Host, force: bool, install: bool) -> HostResult<()> {
    for (name, result) in host.check_all(force).await {
        let local = result.old_pkg_info.as_ref().map_or("not installed", |p| p.version.as_str());
        match (&result.pkg_info, result.status) {
            (Some(remote), false) => println!("  {name}: {local} -> {}", remote.version),
            (_, true) if result.check_type.is_none() => {
                println!("  {name}: {local} (registry unavailable)");
            }
            _ => println!("  {name}: {local} (up to date)"),
        }
    }

    if install {
        for info in host.install_core().await? {
            println!("Installed {} v{}", info.name, info.version);
        }
    }
    Ok(())
}

/// Handle config commands.
fn cmd_config(host: &Host, operation: ConfigOperation) -> HostResult<()> {
    match operation {
        ConfigOperation::Get { key } => match host.config().get(&key, host.project_root()) {
            Some(toml::Value::String(s)) => println!("{s}"),
            Some(value) => println!("{value}"),
            None => return Err(anyhow::anyhow!("'{key}' is not set").into()),
        },
        ConfigOperation::Set { key, value } => {
            host.config().set(&key, toml::Value::String(value))?;
        }
        ConfigOperation::List => {
            let table = host.config().get_all(host.project_root());
            let toml = toml::to_string_pretty(&table).map_err(anyhow::Error::from)?;
            print!("{toml}");
        }
        ConfigOperation::Path => println!("{}", host.config().path().display()),
    }
    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "kithost", &mut io::stdout());
}

fn print_item(marker: &str, item: &ListItem) {
    let version = item.version.as_deref().map(|v| format!(" v{v}")).unwrap_or_default();
    println!("{marker} {}{version}", item.name);
    if !item.description.is_empty() {
        println!("      {}", item.description);
    }
}

async fn print_available_kits(host: &Host) {
    match host.resolver().get_kit_list().await {
        Ok(kits) if !kits.is_empty() => {
            eprintln!("\nAvailable kits:");
            for kit in &kits {
                eprintln!("  {}", host.resolver().naming().get_short_name(&kit.name));
            }
        }
        Ok(_) => eprintln!("No kits are published yet."),
        Err(e) => eprintln!("{}", e.to_record()),
    }
}

async fn print_update_tip(host: &Host) {
    let result = host.check_updates(false).await;
    if let (Some(local), Some(remote)) = (&result.old_pkg_info, &result.pkg_info) {
        if result.has_update() {
            eprintln!(
                "\nA new version of kithost is available: {} -> {}",
                local.version, remote.version
            );
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s.split_once('=').ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
