//! Command line arguments parsing.

// SPDX-License-Identifier: AGPL-3.0-or-later

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rirmap", version, about = "Fast offline IP-to-country lookup using RIR data")]
pub struct Cli {
    /// Verbose mode
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download and process RIR data
    Update {
        /// Force re-download even if data exists
        #[arg(long)]
        force: bool,
        /// Custom data directory
        #[arg(long, value_name = "PATH")]
        data_dir: Option<PathBuf>,
    },
    /// Look up country information for IP addresses
    Lookup {
        /// Addresses to resolve
        #[arg(required = true, value_name = "IP")]
        ips: Vec<String>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
        /// Include country names
        #[arg(long)]
        country_name: bool,
        /// Include currency codes
        #[arg(long)]
        currency: bool,
        /// Custom data directory
        #[arg(long, value_name = "PATH")]
        data_dir: Option<PathBuf>,
    },
    /// Show status of local data
    Status {
        /// Custom data directory
        #[arg(long, value_name = "PATH")]
        data_dir: Option<PathBuf>,
    },
    /// Print the country name for an IP address
    Country {
        ip: String,
    },
    /// Print the country code for an IP address
    #[command(name = "country_code")]
    CountryCode {
        ip: String,
    },
    /// Print the currency for an IP address
    Currency {
        ip: String,
    },
}

#[derive(ValueEnum, Copy, Clone, Debug)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}
