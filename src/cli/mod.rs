pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use commands::ScrapeArgs;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Configuration file to use instead of the default one
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape tracks, playlists, albums, users or search results
    Scrape {
        /// SoundCloud URLs to scrape
        urls: Vec<String>,

        /// JSON input file with `urls` and per-run options
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Dataset output path
        #[arg(short, long, default_value = "sample_output.json")]
        output: PathBuf,

        /// Maximum pages fetched per resource
        #[arg(long, allow_negative_numbers = true)]
        end_page: Option<i64>,

        /// Maximum records emitted by the whole run
        #[arg(long, allow_negative_numbers = true)]
        max_items: Option<i64>,

        /// Maximum comments fetched per track
        #[arg(long, allow_negative_numbers = true)]
        max_comments: Option<i64>,

        /// Fetch comment threads of tracks
        #[arg(long, conflicts_with = "no_comments")]
        comments: bool,

        /// Skip comment threads
        #[arg(long)]
        no_comments: bool,

        /// Input URLs processed at the same time
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Show how a URL is classified without fetching it
    Classify {
        #[arg(required = true)]
        url: String,
    },

    /// Show the effective configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Scrape {
            urls,
            input,
            output,
            end_page,
            max_items,
            max_comments,
            comments,
            no_comments,
            concurrency,
        } => {
            let include_comments = match (comments, no_comments) {
                (_, true) => Some(false),
                (true, _) => Some(true),
                _ => None,
            };
            info!("Starting scrape into {}", output.display());
            commands::scrape(
                config_path,
                ScrapeArgs {
                    urls,
                    input,
                    output,
                    end_page,
                    max_items,
                    max_comments,
                    include_comments,
                    concurrency,
                },
            )
            .await
        }
        Commands::Classify { url } => commands::classify(&url),
        Commands::Config { init } => {
            if init {
                info!("Writing default configuration");
                commands::init_config()
            } else {
                commands::show_config(config_path)
            }
        }
    }
}
