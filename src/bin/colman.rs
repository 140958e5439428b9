//! # Colman CLI - Edit collection manifests as file trees
//!
//! A command-line interface over a local colman store.
//!
//! ## Features
//! - Create collections from manifest text
//! - Browse any version as a tree; old versions are read-only
//! - Rename, move, remove and create directories, one commit per command
//! - List, restore, diff and verify versions
//!
//! ## Usage
//! ```bash
//! # Create a store in .colman
//! colman init
//!
//! # Create a collection from a manifest file
//! colman create "My collection" --file manifest.txt
//!
//! # Rename a file into a new directory
//! colman rename <uuid> bar subdir/foo
//!
//! # Restore version 1 as the new head
//! colman restore <version-1-uuid>
//! ```

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colman::{
    format_bytes, Colman, ColmanBuilder, CollectionVersion, EditOp, EditSession, LocalStore,
    TreeDiff,
};
use colored::*;
use humantime::format_duration;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Colman CLI - Versioned collection manifests
#[derive(Parser)]
#[command(name = "colman")]
#[command(version, about = "Browse and edit collection manifests as versioned file trees")]
#[command(long_about = None)]
struct Cli {
    /// Store directory (defaults to .colman)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Reject names with leading/trailing whitespace when loading manifests
    #[arg(long, global = true)]
    strict_names: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a store
    Init,

    /// Create a collection from manifest text
    Create {
        /// Collection name
        name: String,

        /// Read the manifest from a file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List collections
    #[command(alias = "ls")]
    List,

    /// Show version details
    Show {
        /// Version uuid
        uuid: String,
    },

    /// Print the file tree of a version
    Tree {
        /// Version uuid
        uuid: String,
    },

    /// Print the manifest text of a version
    Manifest {
        /// Version uuid
        uuid: String,
    },

    /// Rename a file or directory
    Rename {
        /// Head version uuid
        uuid: String,

        /// Existing path
        path: String,

        /// New path from the collection root
        new_name: String,

        /// Treat the new name as a sibling name in the same directory
        #[arg(long)]
        in_place: bool,
    },

    /// Move a file or directory
    Mv {
        /// Head version uuid
        uuid: String,

        /// Existing path
        from: String,

        /// Destination path
        to: String,
    },

    /// Remove files or directories
    Rm {
        /// Head version uuid
        uuid: String,

        /// Paths to remove
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Create an empty directory
    Mkdir {
        /// Head version uuid
        uuid: String,

        /// Directory path
        path: String,
    },

    /// Change the collection name
    SetName {
        /// Head version uuid
        uuid: String,

        /// New name
        name: String,
    },

    /// List every version of a collection
    #[command(alias = "log")]
    Versions {
        /// Any version uuid of the collection
        uuid: String,
    },

    /// Make an old version the new head
    Restore {
        /// Version uuid
        uuid: String,
    },

    /// Compare two versions
    Diff {
        /// Older version
        from: String,

        /// Newer version
        to: String,

        /// Show only statistics
        #[arg(long)]
        stat: bool,
    },

    /// Verify a collection's history
    Verify {
        /// Any version uuid of the collection
        uuid: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color || std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        let message = match e.downcast_ref::<colman::ColmanError>() {
            Some(err) => err.user_message(),
            None => format!("{:#}", e),
        };
        eprintln!("{}: {}", "Error".red().bold(), message);
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> anyhow::Result<()> {
    let store_path = cli.store.unwrap_or_else(|| PathBuf::from(".colman"));
    let strict = cli.strict_names;

    if let Commands::Init = cli.command {
        return cmd_init(store_path);
    }

    let (store, colman) = open_store(store_path, strict)?;
    match cli.command {
        Commands::Init => Ok(()),
        Commands::Create { name, file } => cmd_create(&colman, name, file),
        Commands::List => cmd_list(&store),
        Commands::Show { uuid } => cmd_show(&colman, &uuid),
        Commands::Tree { uuid } => cmd_tree(&colman, &uuid),
        Commands::Manifest { uuid } => {
            print!("{}", colman.fetch(&uuid)?.manifest_text);
            Ok(())
        }
        Commands::Rename { uuid, path, new_name, in_place } => {
            let op = if in_place {
                EditOp::RenameInPlace { path, new_name }
            } else {
                EditOp::Rename { path, new_name }
            };
            cmd_edit(&colman, &uuid, |session| session.apply(op))
        }
        Commands::Mv { uuid, from, to } => {
            cmd_edit(&colman, &uuid, |session| session.move_path(&from, &to))
        }
        Commands::Rm { uuid, paths } => cmd_edit(&colman, &uuid, |session| {
            for path in &paths {
                if !session.tree().contains(path) {
                    return Err(colman::EditError::NotFound(path.clone()).into());
                }
                session.selection_mut().select(path);
            }
            session.remove_selected()
        }),
        Commands::Mkdir { uuid, path } => {
            cmd_edit(&colman, &uuid, |session| session.add_directory(&path))
        }
        Commands::SetName { uuid, name } => {
            cmd_edit(&colman, &uuid, |session| session.set_name(&name))
        }
        Commands::Versions { uuid } => cmd_versions(&colman, &uuid),
        Commands::Restore { uuid } => cmd_restore(&colman, &uuid),
        Commands::Diff { from, to, stat } => cmd_diff(&colman, &from, &to, stat),
        Commands::Verify { uuid } => cmd_verify(&colman, &uuid),
    }
}

/// Initialize a store
fn cmd_init(store_path: PathBuf) -> anyhow::Result<()> {
    let store = LocalStore::init(store_path)?;

    println!("{} Initialized colman store", "✓".green().bold());
    println!("  Store: {}", store.root().display().to_string().cyan());
    println!("\nNext steps:");
    println!(
        "  - Create a collection: {}",
        "colman create \"My collection\" --file manifest.txt".yellow()
    );
    Ok(())
}

/// Create a collection from a file or stdin
fn cmd_create(colman: &Colman, name: String, file: Option<PathBuf>) -> anyhow::Result<()> {
    let manifest_text = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read manifest from stdin")?;
            text
        }
    };

    let version = colman.create(&manifest_text, &name)?;
    println!("{} Created collection {}", "✓".green().bold(), version.uuid.yellow().bold());
    print_stats(&version);
    Ok(())
}

/// List collection heads
fn cmd_list(store: &LocalStore) -> anyhow::Result<()> {
    let heads = store.list_collections()?;
    if heads.is_empty() {
        println!("{}", "No collections found.".yellow());
        return Ok(());
    }

    println!("{}", "Collections:".blue().bold());
    println!();
    for head in &heads {
        println!(
            "  {} {} {}",
            head.uuid.yellow().bold(),
            format!("v{}", head.version).dimmed(),
            head.name.cyan()
        );
        println!(
            "      Files: {} | Size: {} | Modified: {}",
            head.file_count.to_string().dimmed(),
            format_bytes(head.total_size_bytes).dimmed(),
            age(&head.modified_at).dimmed()
        );
    }

    let stats = store.stats()?;
    println!(
        "\n{}",
        format!(
            "{} collections, {} versions, {} of manifests",
            stats.collection_count,
            stats.version_count,
            format_bytes(stats.manifest_bytes)
        )
        .dimmed()
    );
    Ok(())
}

/// Show version details
fn cmd_show(colman: &Colman, uuid: &str) -> anyhow::Result<()> {
    let version = colman.fetch(uuid)?;

    println!("{}", "Version Details".blue().bold());
    println!("{}", "═".repeat(50).blue());
    println!("  Name: {}", version.name.cyan());
    println!("  UUID: {}", version.uuid.yellow());
    println!("  Collection: {}", version.collection_id.dimmed());
    println!("  Version: {}", version.version.to_string().cyan());
    println!(
        "  Created: {}",
        version.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string().cyan()
    );
    print_stats(&version);
    if !version.properties.is_empty() {
        println!("\n{}", "Properties:".bold());
        for (key, value) in &version.properties {
            println!("  {}: {}", key, value.to_string().cyan());
        }
    }

    if !version.is_head() {
        println!(
            "\n{} This is an old version (head is {}). It is read-only.",
            "!".yellow().bold(),
            version.current_version_uuid.yellow()
        );
    }
    Ok(())
}

/// Print the file tree of a version
fn cmd_tree(colman: &Colman, uuid: &str) -> anyhow::Result<()> {
    let session = colman.open(uuid)?;
    let version = session.base();
    println!(
        "{} {}",
        version.display_format().blue().bold(),
        format!("({} files, {})", session.tree().file_count(), format_bytes(session.tree().total_size()))
            .dimmed()
    );
    print!("{}", session.tree().format_tree());
    Ok(())
}

/// Open the head, apply one edit and commit it
fn cmd_edit<F>(colman: &Colman, uuid: &str, edit: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut EditSession) -> colman::Result<()>,
{
    let mut session = colman.open(uuid)?;
    if session.is_read_only() {
        bail!(
            "{} is an old version; edit the head {} instead",
            uuid,
            session.base().current_version_uuid
        );
    }

    edit(&mut session)?;
    if !session.is_dirty() {
        println!("{}", "Nothing changed.".yellow());
        return Ok(());
    }

    let start = Instant::now();
    let version = session.commit()?;
    println!(
        "{} Committed version {} as {}",
        "✓".green().bold(),
        version.version.to_string().cyan(),
        version.uuid.yellow().bold()
    );
    print_stats(&version);
    println!("  Time: {}", format_duration(start.elapsed()).to_string().dimmed());
    Ok(())
}

/// List every version of a collection
fn cmd_versions(colman: &Colman, uuid: &str) -> anyhow::Result<()> {
    let rows = colman.versions(uuid)?;

    println!("{}", "Versions:".blue().bold());
    println!();
    for row in rows.iter().rev() {
        let marker = if row.is_head { "*".green().bold() } else { " ".normal() };
        println!(
            "{} {} {} {} {} {}",
            marker,
            format!("v{:<4}", row.version).cyan(),
            row.uuid.yellow(),
            format!("{:>10}", format_bytes(row.total_size_bytes)),
            format!("{} files", row.file_count).dimmed(),
            age(&row.modified_at).dimmed()
        );
    }
    Ok(())
}

/// Restore an old version as the new head
fn cmd_restore(colman: &Colman, uuid: &str) -> anyhow::Result<()> {
    let target = colman.fetch(uuid)?;
    let restored = colman.restore(uuid)?;
    println!(
        "{} Restored version {} as version {}: {}",
        "✓".green().bold(),
        target.version.to_string().cyan(),
        restored.version.to_string().cyan(),
        restored.uuid.yellow().bold()
    );
    print_stats(&restored);
    Ok(())
}

/// Compare two versions
fn cmd_diff(colman: &Colman, from: &str, to: &str, stat: bool) -> anyhow::Result<()> {
    let diff = colman.diff(from, to)?;
    if diff.is_empty() {
        println!("{}", "No differences.".green());
        return Ok(());
    }
    if !stat {
        show_diff(&diff);
        println!();
    }

    println!("{}", "Summary:".bold());
    println!(
        "  {} added ({}), {} removed ({}), {} modified ({})",
        diff.stats.files_added.to_string().green(),
        format_bytes(diff.stats.bytes_added),
        diff.stats.files_removed.to_string().red(),
        format_bytes(diff.stats.bytes_removed),
        diff.stats.files_modified.to_string().yellow(),
        format_bytes(diff.stats.bytes_modified)
    );
    Ok(())
}

fn show_diff(diff: &TreeDiff) {
    for dir in &diff.dirs_added {
        println!("{} {}/", "+".green().bold(), dir.green());
    }
    for entry in &diff.added {
        println!("{} {} ({})", "+".green().bold(), entry.path.green(), format_bytes(entry.size));
    }
    for (old, new) in &diff.modified {
        println!(
            "{} {} ({} -> {})",
            "~".yellow().bold(),
            new.path.yellow(),
            format_bytes(old.size),
            format_bytes(new.size)
        );
    }
    for entry in &diff.removed {
        println!("{} {} ({})", "-".red().bold(), entry.path.red(), format_bytes(entry.size));
    }
    for dir in &diff.dirs_removed {
        println!("{} {}/", "-".red().bold(), dir.red());
    }
}

/// Verify a collection's history
fn cmd_verify(colman: &Colman, uuid: &str) -> anyhow::Result<()> {
    let report = colman.verify(uuid)?;

    println!("{}", "Verification Report:".blue().bold());
    println!("  Versions: {}/{} valid", report.valid_versions, report.total_versions);
    println!("  Numbering: {}", check_mark(report.numbering_contiguous));
    println!("  Single head: {}", check_mark(report.single_head));
    println!("  Pointers: {}", check_mark(report.pointers_consistent));
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(report.verification_time_ms)).to_string().dimmed()
    );

    if report.is_valid() {
        println!("\n{} {}", "✓".green().bold(), report.summary());
        return Ok(());
    }

    println!("\n{}", "Errors:".red().bold());
    for error in report.all_errors() {
        println!("  - {}", error.red());
    }
    bail!(report.summary())
}

// Helper functions

/// Open an existing store and an engine over it
fn open_store(store_path: PathBuf, strict_names: bool) -> anyhow::Result<(Arc<LocalStore>, Colman)> {
    let store = Arc::new(LocalStore::open(store_path)?);
    let colman = ColmanBuilder::new()
        .strict_names_on_load(strict_names)
        .build(store.clone());
    Ok((store, colman))
}

fn print_stats(version: &CollectionVersion) {
    println!("  Files: {}", version.file_count.to_string().cyan());
    println!("  Size: {}", format_bytes(version.total_size_bytes).cyan());
}

fn check_mark(ok: bool) -> ColoredString {
    if ok {
        "✓".green()
    } else {
        "✗".red()
    }
}

/// Time since `at`, to the second
fn age(at: &chrono::DateTime<Utc>) -> String {
    let elapsed = (Utc::now() - *at).to_std().unwrap_or_default();
    format!("{} ago", format_duration(Duration::from_secs(elapsed.as_secs())))
}
