//! Command-line interface definitions for finfeed.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Flags override the YAML configuration file; several can also be set through
//! environment variables.

use crate::config::Config;
use clap::Parser;

/// Command-line arguments for the finfeed service.
///
/// # Examples
///
/// ```sh
/// # Defaults: sqlite://finfeed.db, listen on 0.0.0.0:8000
/// finfeed
///
/// # With a config file and a different database
/// finfeed -c ./finfeed.yaml --database-url sqlite://data/finfeed.db
///
/// # Serve stored data without scraping
/// finfeed --no-scheduler
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Database connection string (overrides the config file)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Listen address for the read API (overrides the config file)
    #[arg(short, long, env = "BIND_ADDR")]
    pub bind: Option<String>,

    /// Serve the read API without starting the collection loops
    #[arg(long)]
    pub no_scheduler: bool,
}

impl Cli {
    /// Apply flag overrides on top of a loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.database_url {
            config.database_url = url.clone();
        }
        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
    }
}
