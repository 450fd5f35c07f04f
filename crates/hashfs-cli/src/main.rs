//! # hashfs CLI
//!
//! Command-line access to a HashFS tree: directory and file operations,
//! garbage collection, and configuration.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hashfs::{FileRecord, HashFs};
use hashfs_cas::hash_to_hex;
use hashfs_config::logging::{init_logging, LogLevel};
use hashfs_config::{log_cli_debug, log_cli_info, Config};

mod config;
mod gc;

/// HashFS - hash-addressed virtual filesystem
#[derive(Parser)]
#[command(name = "hashfs")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Metadata index directory (overrides config)
    #[arg(long, global = true, value_name = "DIR")]
    index_dir: Option<PathBuf>,

    /// Blob store root (overrides config)
    #[arg(long, global = true, value_name = "DIR")]
    blob_root: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a directory
    Mkdir {
        path: String,

        /// Create missing parents; succeed if the directory exists
        #[arg(short, long)]
        parents: bool,

        /// Permission bits in octal
        #[arg(short, long, value_parser = parse_mode)]
        mode: Option<u32>,
    },

    /// Copy a local file (or `-` for stdin) into the tree
    Put {
        #[arg(value_name = "LOCAL")]
        source: PathBuf,

        #[arg(value_name = "PATH")]
        dest: String,

        #[arg(short, long, value_parser = parse_mode)]
        mode: Option<u32>,
    },

    /// Write a file's content to stdout
    Cat { path: String },

    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,

        /// Show mode, size and modification time
        #[arg(short, long)]
        long: bool,
    },

    /// Show a record
    Stat { path: String },

    /// Remove a file or empty directory
    Rm {
        path: String,

        /// Remove directories and their contents
        #[arg(short, long)]
        recursive: bool,
    },

    /// Move or rename
    Mv { from: String, to: String },

    /// Change permission bits
    Chmod {
        #[arg(value_parser = parse_mode)]
        mode: u32,
        path: String,
    },

    /// Remove blobs no file references
    Gc(gc::GcArgs),

    /// Show file, directory and blob counts
    Stats,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: config::ConfigCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    });

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(dir) = cli.index_dir {
        config.storage.index_dir = dir;
    }
    if let Some(dir) = cli.blob_root {
        config.storage.blob_root = dir;
    }

    if let Commands::Config { command } = cli.command {
        return config::run(&config, command);
    }

    let fs = HashFs::open_with_config(&config).with_context(|| {
        format!(
            "Failed to open filesystem at {}",
            config.storage.resolved_index_dir().display()
        )
    })?;
    log_cli_debug!(
        "Opened filesystem",
        index = tracing::field::debug(config.storage.resolved_index_dir()),
        blobs = tracing::field::debug(config.storage.resolved_blob_root())
    );

    run(&fs, &config, cli.command)
}

fn run(fs: &HashFs, config: &Config, command: Commands) -> Result<()> {
    let dir_mode = fs.options().dir_mode;
    let file_mode = fs.options().file_mode;

    match command {
        Commands::Mkdir {
            path,
            parents,
            mode,
        } => {
            let mode = mode.unwrap_or(dir_mode);
            if parents {
                fs.mkdir_all(&path, mode)?;
            } else {
                fs.mkdir(&path, mode)?;
            }
        }
        Commands::Put { source, dest, mode } => {
            let data = read_source(&source)?;
            let record = fs.write_file(&dest, &data, mode.unwrap_or(file_mode))?;
            log_cli_info!("Stored file", path = dest.as_str(), size = record.size());
        }
        Commands::Cat { path } => {
            let data = fs.read_file(&path)?;
            io::stdout().lock().write_all(&data)?;
        }
        Commands::Ls { path, long } => {
            let entries = fs.read_dir(&path)?;
            let mut out = io::stdout().lock();
            for record in &entries {
                if long {
                    writeln!(out, "{}", long_listing(record))?;
                } else if record.is_dir() {
                    writeln!(out, "{}/", record.name)?;
                } else {
                    writeln!(out, "{}", record.name)?;
                }
            }
        }
        Commands::Stat { path } => {
            let record = fs.stat(&path)?;
            print_stat(&path, &record);
        }
        Commands::Rm { path, recursive } => {
            if recursive {
                fs.remove_all(&path)?;
            } else {
                fs.remove(&path)?;
            }
        }
        Commands::Mv { from, to } => fs.rename(&from, &to)?,
        Commands::Chmod { mode, path } => fs.chmod(&path, mode)?,
        Commands::Gc(args) => gc::run(fs, args)?,
        Commands::Stats => {
            let stats = fs.stats()?;
            let cas = fs.blobs().stats()?;
            println!("Files:        {}", stats.file_count);
            println!("Directories:  {}", stats.dir_count);
            println!("Logical size: {} bytes", stats.logical_bytes);
            println!("Referenced:   {} unique blobs", stats.unique_blobs);
            println!(
                "Stored:       {} blobs, {} bytes",
                cas.blob_count, cas.total_bytes
            );
            println!("Dedup ratio:  {:.2}x", stats.dedup_ratio(cas.total_bytes));
        }
        Commands::Config { command } => config::run(config, command)?,
    }
    Ok(())
}

fn read_source(source: &Path) -> Result<Vec<u8>> {
    if source.as_os_str() == "-" {
        let mut data = Vec::new();
        io::stdin().lock().read_to_end(&mut data)?;
        return Ok(data);
    }
    std::fs::read(source).with_context(|| format!("Failed to read {}", source.display()))
}

fn parse_mode(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
        .ok_or_else(|| format!("invalid octal mode: {s}"))
}

fn format_mtime(record: &FileRecord) -> String {
    chrono::DateTime::<chrono::Utc>::from(record.modified())
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn long_listing(record: &FileRecord) -> String {
    let kind = if record.is_dir() { 'd' } else { '-' };
    format!(
        "{}{:04o} {:>10} {} {}",
        kind,
        record.mode,
        record.size(),
        format_mtime(record),
        record.name
    )
}

fn print_stat(path: &str, record: &FileRecord) {
    println!("  Path:     {}", path);
    println!(
        "  Type:     {}",
        if record.is_dir() { "directory" } else { "file" }
    );
    println!("  Mode:     {:04o}", record.mode);
    println!("  Owner:    {}:{}", record.uid, record.gid);
    println!("  Size:     {}", record.size());
    println!("  Modified: {}", format_mtime(record));
    if let Some(hash) = record.hash() {
        println!("  Hash:     {}", hash_to_hex(hash));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("755").unwrap(), 0o755);
        assert_eq!(parse_mode("0o644").unwrap(), 0o644);
        assert_eq!(parse_mode("0600").unwrap(), 0o600);
        assert!(parse_mode("888").is_err());
        assert!(parse_mode("17777").is_err());
    }

    #[test]
    fn test_long_listing() {
        let dir = FileRecord::new_directory("docs", 0o755, 0);
        assert_eq!(
            long_listing(&dir),
            "d0755          0 1970-01-01 00:00:00 docs"
        );
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["hashfs", "mkdir", "-p", "/a/b", "--mode", "700"]).unwrap();
        match cli.command {
            Commands::Mkdir {
                path,
                parents,
                mode,
            } => {
                assert_eq!(path, "/a/b");
                assert!(parents);
                assert_eq!(mode, Some(0o700));
            }
            _ => panic!("expected mkdir"),
        }

        let cli = Cli::try_parse_from(["hashfs", "ls"]).unwrap();
        assert!(matches!(cli.command, Commands::Ls { ref path, long: false } if path == "/"));
    }
}
