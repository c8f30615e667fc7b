//! projectfs - project resource tree, undoable file operations and change monitoring.
//!
//! Usage:
//!   pfs tree [PATH]              Print the resource tree
//!   pfs files [PATH]             List every file with its key
//!   pfs normalize KEY            Print a key with its on-disk casing
//!   pfs watch [PATH]             Follow external changes until Ctrl-C
//!   pfs session [PATH]           Line-driven shell over undoable operations
//!   pfs --help                   Show help

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result, bail, eyre};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

use projectfs_core::{NotificationHub, ProjectConfig, ResourceKey};
use projectfs_monitor::{RescanRequest, ResourceMonitor};
use projectfs_ops::{OperationEngine, SidecarCompanion, TransferMode};
use projectfs_registry::{Registry, ResourceKind};

#[derive(Parser)]
#[command(
    name = "pfs",
    version,
    about = "Project resource tree, undoable file operations and change monitoring",
    long_about = "pfs mirrors a project folder as a tree of resources addressed by \
                  project-relative keys.\n\n\
                  Use `pfs session` for undoable file operations and `pfs watch` \
                  to follow changes made by other programs."
)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON project configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the project and print its resource tree
    Tree {
        /// Project folder (defaults to the configured root or the current directory)
        path: Option<PathBuf>,
    },

    /// Print every file as `key<TAB>path`
    Files {
        /// Project folder
        path: Option<PathBuf>,
    },

    /// Print a key with the casing found on disk
    Normalize {
        /// Project-relative key, segments separated by '/'
        key: String,

        /// Project folder
        #[arg(short, long)]
        root: Option<PathBuf>,
    },

    /// Watch the project and print notifications until Ctrl-C
    Watch {
        /// Project folder
        path: Option<PathBuf>,
    },

    /// Run file operations read line by line from stdin
    Session {
        /// Project folder
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Tree { path } => {
            let config = load_config(cli.config.as_deref(), path.as_deref())?;
            run_tree(config)?;
        }
        Command::Files { path } => {
            let config = load_config(cli.config.as_deref(), path.as_deref())?;
            run_files(config)?;
        }
        Command::Normalize { key, root } => {
            let config = load_config(cli.config.as_deref(), root.as_deref())?;
            run_normalize(config, &key)?;
        }
        Command::Watch { path } => {
            let config = load_config(cli.config.as_deref(), path.as_deref())?;
            run_watch(config).await?;
        }
        Command::Session { path } => {
            let config = load_config(cli.config.as_deref(), path.as_deref())?;
            run_session(config).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the project config from an optional JSON file and an optional root.
///
/// An explicit root always wins over the file's `root`.
fn load_config(file: Option<&Path>, root: Option<&Path>) -> Result<Arc<ProjectConfig>> {
    let mut config = match file {
        Some(file) => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            serde_json::from_str::<ProjectConfig>(&text)
                .with_context(|| format!("Invalid config {}", file.display()))?
        }
        None => ProjectConfig::new(root.unwrap_or(Path::new("."))),
    };

    if let Some(root) = root {
        config.root = root.to_path_buf();
    }
    config.root = config.root.canonicalize().context("Invalid path")?;
    if !config.root.is_dir() {
        bail!("{} is not a folder", config.root.display());
    }

    Ok(Arc::new(config))
}

/// Open a registry and populate it from disk.
fn scan(config: Arc<ProjectConfig>, hub: NotificationHub) -> Result<Registry> {
    let mut registry = Registry::new(config, hub)?;
    registry.rescan().context("Scan failed")?;
    Ok(registry)
}

/// Print the tree with one indented line per resource.
fn run_tree(config: Arc<ProjectConfig>) -> Result<()> {
    let registry = scan(config, NotificationHub::new())?;
    let tree = registry.tree();

    println!("{}", registry.config().root.display());
    tree.walk(|key, resource| {
        if key.is_root() {
            return;
        }
        let indent = "  ".repeat(key.depth());
        match resource.kind {
            ResourceKind::Folder { .. } => println!("{indent}{}/", resource.name),
            ResourceKind::File => println!("{indent}{}", resource.name),
        }
    });

    println!();
    println!(
        "{} files, {} folders",
        registry.file_count(),
        registry.folder_count()
    );
    Ok(())
}

fn run_files(config: Arc<ProjectConfig>) -> Result<()> {
    let registry = scan(config, NotificationHub::new())?;
    for (key, path) in registry.all_files() {
        println!("{key}\t{}", path.display());
    }
    Ok(())
}

fn run_normalize(config: Arc<ProjectConfig>, key: &str) -> Result<()> {
    let key: ResourceKey = key.parse().context("Invalid key")?;
    let registry = Registry::new(config, NotificationHub::new())?;
    let normalized = registry.normalize(&key)?;
    println!("{normalized}");
    Ok(())
}

/// Follow external changes, rescanning whenever the monitor asks for it.
async fn run_watch(config: Arc<ProjectConfig>) -> Result<()> {
    let hub = NotificationHub::new();
    let mut notifications = hub.subscribe();
    let mut registry = scan(Arc::clone(&config), hub.clone())?;

    let (tx, mut rescans) = mpsc::unbounded_channel::<RescanRequest>();
    let mut monitor = ResourceMonitor::new(Arc::clone(&config), hub, Arc::new(tx));
    monitor.initialize().context("Failed to start watching")?;

    eprintln!(
        "Watching {} ({} files). Press Ctrl-C to stop.",
        config.root.display(),
        registry.file_count()
    );

    loop {
        tokio::select! {
            Some(RescanRequest) = rescans.recv() => {
                if let Err(e) = registry.rescan() {
                    tracing::error!("rescan failed: {e}");
                }
            }

            received = notifications.recv() => match received {
                Ok(notification) => match notification.key() {
                    Some(key) => println!("{notification}\t{key}"),
                    None => println!("{notification}"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("dropped {skipped} notifications");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    monitor.shutdown();
    Ok(())
}

const SESSION_HELP: &str = "\
commands:
  touch KEY [TEXT...]   create a file
  mkdir KEY             create a folder
  cp FROM TO            copy into TO, or into the folder TO
  mv FROM TO            move into TO, or into the folder TO
  rm KEY                soft-delete a file or folder
  begin | commit        group operations into one undo step
  undo | redo           step through history
  ls                    show the undo history
  quit                  leave the session";

/// Read commands from stdin and run them against an operation engine.
async fn run_session(config: Arc<ProjectConfig>) -> Result<()> {
    let companion = Arc::new(SidecarCompanion::from_config(&config));
    let mut engine = OperationEngine::new(Arc::clone(&config), NotificationHub::new())
        .context("Failed to open project")?
        .with_companion(companion);

    eprintln!("Session on {}. Type `help` for commands.", config.root.display());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = words.split_first() else {
            continue;
        };

        match command {
            "quit" | "exit" => break,
            "help" => println!("{SESSION_HELP}"),
            _ => {
                if let Err(e) = run_session_command(&mut engine, command, args).await {
                    eprintln!("error: {e}");
                }
            }
        }
    }

    if engine.is_batch_open() {
        engine.commit_batch().await;
    }
    Ok(())
}

async fn run_session_command(
    engine: &mut OperationEngine,
    command: &str,
    args: &[&str],
) -> Result<()> {
    match (command, args) {
        ("touch", [key, text @ ..]) => {
            engine.create_file(&parse_key(key)?, text.join(" ")).await?;
        }
        ("mkdir", [key]) => {
            engine.create_folder(&parse_key(key)?).await?;
        }
        ("cp" | "mv", [from, to]) => {
            let mode = if command == "cp" {
                TransferMode::Copy
            } else {
                TransferMode::Move
            };
            let root = engine.config().root.clone();
            let source = root.join(parse_key(from)?.as_str());
            let destination = root.join(parse_key(to)?.as_str());
            let landed = engine.transfer(&source, &destination, mode).await?;
            println!("{mode} -> {landed}");
        }
        ("rm", [key]) => {
            let key = parse_key(key)?;
            if engine.config().resolve_path(&key).is_dir() {
                engine.delete_folder(&key).await?;
            } else {
                engine.delete_file(&key).await?;
            }
        }
        ("begin", []) => engine.begin_batch(),
        ("commit", []) => engine.commit_batch().await,
        ("undo", []) => {
            let description = engine.undo_description().map(str::to_owned);
            engine.undo().await?;
            if let Some(description) = description {
                println!("undid: {description}");
            }
        }
        ("redo", []) => {
            let description = engine.redo_description().map(str::to_owned);
            engine.redo().await?;
            if let Some(description) = description {
                println!("redid: {description}");
            }
        }
        ("ls", []) => {
            for entry in engine.undo_log().iter() {
                println!("{:>4}  {}", entry.id, entry.description);
            }
            if let Some(next) = engine.redo_description() {
                println!("      (redo: {next})");
            }
        }
        _ => return Err(eyre!("unknown command `{command}`; try `help`")),
    }
    Ok(())
}

fn parse_key(raw: &str) -> Result<ResourceKey> {
    raw.parse()
        .with_context(|| format!("Invalid key '{raw}'"))
}
