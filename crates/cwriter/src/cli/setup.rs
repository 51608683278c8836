use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "cwriter",
    bin_name = "cwriter",
    version,
    disable_help_subcommand = true
)]
#[command(about = "Inspect and maintain Cwriter data directories", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Root of the document tree
    #[arg(long, global = true, env = "CWRITER_DATA_DIR", help_heading = "Options")]
    pub data_dir: Option<PathBuf>,

    /// User whose documents to operate on
    #[arg(short, long, global = true, help_heading = "Options")]
    pub user: Option<String>,

    /// Storage platform: native-fs, mp-fs or kv-fallback
    #[arg(long, global = true, help_heading = "Options")]
    pub platform: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true, help_heading = "Options")]
    pub json: bool,

    /// Verbose output
    #[arg(short, long, global = true, help_heading = "Options")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the directory layout, global config and user
    Init,

    /// Manage works
    Works {
        #[command(subcommand)]
        action: WorksCommands,
    },

    /// Word, file and storage totals for the user
    Stats,

    /// Snapshot and restore the user config
    Backup {
        #[command(subcommand)]
        action: BackupCommands,
    },

    /// Trim operation logs and old backups for every user
    Cleanup(CleanupArgs),

    /// Reconcile the work index against storage and report repairs
    Doctor,

    /// Show the user's operation log, newest last
    Log {
        /// Only the most recent N entries
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
pub enum WorksCommands {
    /// List works, most recently updated first
    #[command(alias = "ls")]
    List,

    /// Show a work's config and content
    Show {
        /// Work id
        id: String,
    },

    /// Create an empty work
    Create {
        /// Work title
        #[arg(short, long)]
        title: Option<String>,

        /// Work description
        #[arg(short, long)]
        description: Option<String>,

        /// Initial manuscript text
        #[arg(long)]
        content: Option<String>,
    },

    /// Delete a work and all of its files
    #[command(alias = "rm")]
    Delete {
        /// Work id
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Snapshot the user config
    Create,

    /// List backups, oldest first
    #[command(alias = "ls")]
    List,

    /// Write a backup back as the user config
    Restore {
        /// Backup id
        id: String,
    },
}

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Log entries to keep per user (defaults to `max_logs`)
    #[arg(long)]
    pub max_logs: Option<usize>,

    /// Backups to keep per user (defaults to `max_backups`)
    #[arg(long)]
    pub max_backups: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("cwriter").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["works", "list", "--user", "alice", "--json"]);
        assert_eq!(cli.user.as_deref(), Some("alice"));
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Works {
                action: WorksCommands::List
            }
        ));
    }

    #[test]
    fn test_works_create_args() {
        let cli = parse(&["works", "create", "--title", "Draft One"]);
        match cli.command {
            Commands::Works {
                action: WorksCommands::Create { title, content, .. },
            } => {
                assert_eq!(title.as_deref(), Some("Draft One"));
                assert_eq!(content, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cleanup_limits_are_optional() {
        let cli = parse(&["cleanup", "--max-backups", "3"]);
        match cli.command {
            Commands::Cleanup(args) => {
                assert_eq!(args.max_logs, None);
                assert_eq!(args.max_backups, Some(3));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["cwriter"]).is_err());
    }
}
