use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "msp-plugins", version)]
#[command(about = "Install and manage plugins for the MSP monitoring stack", long_about = None)]
pub struct Cli {
    /// Monitoring stack directory (defaults to install.default_dir from the config)
    #[arg(short = 'd', long, global = true)]
    pub install_dir: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Catalog file to use instead of the built-in one
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List catalog plugins
    List {
        /// Only show one category (display name or slug)
        #[arg(short, long)]
        category: Option<String>,

        /// Only show installed plugins
        #[arg(short, long)]
        installed: bool,
    },
    /// Show details for a plugin
    Info { id: String },
    /// Install plugins and their dependencies
    Install {
        #[arg(required = true)]
        ids: Vec<String>,

        /// Re-render plugins that are already installed and skip the base stack check
        #[arg(short, long)]
        force: bool,
    },
    /// Remove an installed plugin
    Uninstall {
        id: String,

        /// Also remove installed plugins that depend on it
        #[arg(short, long)]
        force: bool,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show installed plugins and port assignments
    Status,
    /// List categories with plugin counts
    Categories,
    /// List curated plugin packs
    Packs,
    /// Install every plugin in a pack
    InstallPack {
        pack: String,

        #[arg(short, long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_install_multiple() {
        let cli = Cli::try_parse_from(["msp-plugins", "install", "redis", "okta", "--force"]).unwrap();
        match cli.command {
            Commands::Install { ids, force } => {
                assert_eq!(ids, vec!["redis", "okta"]);
                assert!(force);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_install_requires_id() {
        assert!(Cli::try_parse_from(["msp-plugins", "install"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "msp-plugins",
            "uninstall",
            "anomaly-detection",
            "--force",
            "--yes",
            "--install-dir",
            "/srv/stack",
        ])
        .unwrap();
        assert_eq!(cli.install_dir, Some(PathBuf::from("/srv/stack")));
        assert!(matches!(
            cli.command,
            Commands::Uninstall { force: true, yes: true, .. }
        ));
    }

    #[test]
    fn test_list_filters() {
        let cli = Cli::try_parse_from(["msp-plugins", "list", "--category", "ai-ml", "--installed"]).unwrap();
        match cli.command {
            Commands::List { category, installed } => {
                assert_eq!(category.as_deref(), Some("ai-ml"));
                assert!(installed);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_install_pack_subcommand_name() {
        let cli = Cli::try_parse_from(["msp-plugins", "install-pack", "devops"]).unwrap();
        assert!(matches!(cli.command, Commands::InstallPack { ref pack, force: false } if pack == "devops"));
    }
}
