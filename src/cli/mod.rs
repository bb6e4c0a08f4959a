//! Command-line interface for `si-refresh`.

mod commands;
mod icons;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::config::{load_settings, LoadOptions};

#[derive(Parser)]
#[command(name = "si-refresh")]
#[command(about = "Mirror and refresh Skolinspektionen open data")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config file and SI_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh data from the remote sources
    Refresh {
        /// Sources to refresh (default: all)
        #[arg(short, long, num_args = 1.., value_delimiter = ',')]
        sources: Vec<String>,
        /// Bypass the cache for listing pages, re-download existing files and ignore delta history
        #[arg(short, long)]
        force: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the state of previous refreshes (no network access)
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or clear the content cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Show how much of a source would be fetched for a given remote count
    Delta {
        /// Source name, e.g. publications
        source: String,
        /// Number of items currently available online
        online_count: u64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cache statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove every cached entry
    Clear,
    /// Remove expired entries from the disk cache
    Purge,
}

impl Commands {
    fn wants_json(&self) -> bool {
        match self {
            Commands::Refresh { json, .. }
            | Commands::Status { json }
            | Commands::Delta { json, .. } => *json,
            Commands::Cache { command } => matches!(command, CacheCommands::Stats { json: true }),
        }
    }
}

/// Check if verbose mode is enabled (for early logging setup).
///
/// Scans raw arguments before clap runs, so a flag value that happens to
/// equal `-v` or `--log-file` is also matched.
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// The `--log-file` argument, read before clap runs so logging can start
/// first. Same raw-argument caveat as [`is_verbose`].
pub fn log_file() -> Option<PathBuf> {
    find_log_file(std::env::args())
}

fn find_log_file(args: impl IntoIterator<Item = String>) -> Option<PathBuf> {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--log-file" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--log-file=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

/// Parse arguments, run the command and map the outcome to an exit code.
pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.command.wants_json();

    match execute(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "success": false, "error": format!("{:#}", e) })
                );
            } else {
                eprintln!("{} ERROR: {:#}", icons::error(), e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<bool> {
    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
    };
    let (settings, _config) = load_settings(&options).await?;

    match cli.command {
        Commands::Refresh {
            sources,
            force,
            json,
        } => commands::cmd_refresh(&settings, &sources, force, json).await,
        Commands::Status { json } => commands::cmd_status(&settings, json),
        Commands::Cache { command } => match command {
            CacheCommands::Stats { json } => commands::cmd_cache_stats(&settings, json).await,
            CacheCommands::Clear => commands::cmd_cache_clear(&settings).await,
            CacheCommands::Purge => commands::cmd_cache_purge(&settings).await,
        },
        Commands::Delta {
            source,
            online_count,
            json,
        } => commands::cmd_delta(&settings, &source, online_count, json).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_refresh_sources_accept_commas_and_repeats() {
        let cli = Cli::try_parse_from([
            "si-refresh",
            "refresh",
            "--sources",
            "publications,kolada",
            "--sources",
            "tillsyn",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Refresh { sources, force, json } => {
                assert_eq!(sources, vec!["publications", "kolada", "tillsyn"]);
                assert!(!force);
                assert!(json);
            }
            _ => panic!("expected refresh"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["si-refresh", "status", "--data-dir", "/tmp/si", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/si")));
        assert!(!cli.command.wants_json());
    }

    #[test]
    fn test_find_log_file_forms() {
        let args = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(
            find_log_file(args(&["si-refresh", "--log-file", "/tmp/si.log", "status"])),
            Some(PathBuf::from("/tmp/si.log"))
        );
        assert_eq!(
            find_log_file(args(&["si-refresh", "status", "--log-file=/tmp/a.log"])),
            Some(PathBuf::from("/tmp/a.log"))
        );
        assert_eq!(find_log_file(args(&["si-refresh", "status"])), None);
        assert_eq!(find_log_file(args(&["si-refresh", "--log-file"])), None);
    }

    #[test]
    fn test_delta_arguments() {
        let cli = Cli::try_parse_from(["si-refresh", "delta", "publications", "350", "--json"]).unwrap();
        assert!(cli.command.wants_json());
        match cli.command {
            Commands::Delta { source, online_count, .. } => {
                assert_eq!(source, "publications");
                assert_eq!(online_count, 350);
            }
            _ => panic!("expected delta"),
        }
    }
}
