pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::cli::commands::CrawlOverrides;
use crate::cli::config::DedupPolicy;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs to this file instead of the dated default
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.log_file.clone()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl articles until every URL has been processed
    Crawl {
        /// Configuration file to use instead of the default one
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// File with one URL per line
        #[arg(long)]
        urls_file: Option<PathBuf>,

        /// URL to crawl; may be repeated
        #[arg(short, long = "url")]
        urls: Vec<String>,

        /// Queue partition to crawl into
        #[arg(short, long)]
        task_type: Option<String>,

        /// Number of consumers
        #[arg(long)]
        consumers: Option<usize>,

        /// When URLs are marked as visited
        #[arg(long, value_enum)]
        dedup: Option<DedupPolicy>,
    },

    /// Show the active configuration
    Config {
        /// Overwrite the default configuration file with built-in defaults
        #[arg(short, long)]
        reset: bool,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Crawl { config, urls_file, urls, task_type, consumers, dedup } => {
            info!("Starting crawl");
            let overrides = CrawlOverrides {
                urls_file,
                urls,
                task_type,
                consumers,
                dedup,
            };
            commands::crawl(config, overrides).await
        },
        Commands::Config { reset } => {
            if reset {
                info!("Resetting default configuration");
                commands::reset_config().await
            } else {
                commands::show_config().await
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }

    #[test]
    fn test_crawl_arguments() {
        let cli = Cli::try_parse_from([
            "crawler", "--verbose", "crawl",
            "--url", "https://a.test/1", "--url", "https://a.test/2",
            "--dedup", "on-dequeue", "--consumers", "4",
        ]).unwrap();

        assert!(cli.verbose());
        match cli.command {
            Commands::Crawl { urls, dedup, consumers, config, .. } => {
                assert_eq!(urls, vec!["https://a.test/1", "https://a.test/2"]);
                assert_eq!(dedup, Some(DedupPolicy::OnDequeue));
                assert_eq!(consumers, Some(4));
                assert!(config.is_none());
            }
            _ => panic!("expected crawl"),
        }
    }
}
