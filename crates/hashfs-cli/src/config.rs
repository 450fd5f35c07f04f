//! `hashfs config` subcommands.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use hashfs_config::Config;

const PROJECT_CONFIG: &str = ".hashfs/config.toml";

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Print the config file locations
    Path,

    /// Write a default config file
    Init {
        /// Write `.hashfs/config.toml` in the current directory instead of
        /// the global file
        #[arg(long)]
        project: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(config: &Config, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            print!("{}", toml_of(config)?);
        }
        ConfigCommand::Path => {
            match Config::global_config_path() {
                Some(path) => println!("Global:  {}", path.display()),
                None => println!("Global:  (no home directory)"),
            }
            println!("Project: {}", PROJECT_CONFIG);
        }
        ConfigCommand::Init { project, force } => {
            let path = if project {
                PathBuf::from(PROJECT_CONFIG)
            } else {
                Config::global_config_path().context("Cannot determine home directory")?
            };
            init(&path, force)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn toml_of(config: &Config) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to render configuration")
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, Config::default_toml()?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/config.toml");

        init(&path, false).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[storage]"));

        assert!(init(&path, false).is_err());
        init(&path, true).unwrap();
    }
}
