//! # apprun CLI
//!
//! Diagnostic commands over the runner's building blocks.

use crate::archive::ArchiveHandle;
use crate::archive::metadata::DescriptorField;
use crate::host_dir::HostDirHasher;
use crate::utils::logging::init_logging;
use crate::vfs::{VirtualFileSystem, VirtualPath};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;

/// apprun: inspect packaged applications and their install layout.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log to a rolling file in the user cache directory instead of stderr
    #[arg(long, global = true)]
    pub log_to_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the install directory derived from a package host URL
    HostDir {
        /// Root of the local runtime install
        #[arg(long)]
        root_dir: String,

        /// Package host URL
        url: String,
    },

    /// Show the package descriptor and configuration files of an archive
    Inspect {
        /// Archive on the host filesystem
        archive: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_to_file)?;
    tracing::debug!(command = ?cli.command, "apprun starting");

    match cli.command {
        Command::HostDir { root_dir, url } => {
            println!("{}", HostDirHasher::new(root_dir).hash(&url));
            Ok(())
        }
        Command::Inspect { archive, json } => inspect(&archive, json),
    }
}

fn inspect(archive: &std::path::Path, as_json: bool) -> Result<()> {
    let absolute = std::path::absolute(archive)
        .with_context(|| format!("Cannot resolve {}", archive.display()))?;
    let vfs = VirtualFileSystem::with_host_root();
    let virtual_path = VirtualPath::from_os_path(&absolute);
    let handle = ArchiveHandle::load(&vfs, virtual_path.as_str())
        .with_context(|| format!("Failed to open {}", archive.display()))?;

    let package = handle.package();
    let full_disk_access = package.map(|p| match &p.full_disk_access {
        DescriptorField::Absent => "absent".to_string(),
        DescriptorField::Valid(value) => value.to_string(),
        DescriptorField::Malformed { raw, .. } => format!("malformed ({raw:?})"),
    });

    if as_json {
        let report = json!({
            "archive": handle.path().as_str(),
            "entries": handle.subfile_names().len(),
            "has_metadata": handle.metadata().is_some(),
            "package": package.map(|p| json!({
                "attributes": p.attributes,
                "main_module": p.main_module,
                "full_disk_access": full_disk_access,
            })),
            "config_files": handle.config_files(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Archive:      {}", handle.path());
    println!("Entries:      {}", handle.subfile_names().len());
    match package {
        Some(package) => {
            println!("Package:      {}", package.name().unwrap_or("(unnamed)"));
            if let Some(version) = package.version() {
                println!("Version:      {version}");
            }
            println!(
                "Main module:  {}",
                package.main_module.as_deref().unwrap_or("(default)")
            );
            println!(
                "Disk access:  {}",
                full_disk_access.as_deref().unwrap_or("absent")
            );
        }
        None if handle.metadata().is_some() => println!("Package:      (no package element)"),
        None => println!("Package:      (no metadata)"),
    }
    let config_files = handle.config_files();
    if config_files.is_empty() {
        println!("Config files: none");
    } else {
        println!("Config files:");
        for name in config_files {
            println!("  {name}");
        }
    }
    Ok(())
}
