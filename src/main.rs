//! rirmap command-line interface

// SPDX-License-Identifier: AGPL-3.0-or-later

mod args;

use args::{Cli, Command, OutputFormat};
use clap::Parser;
use rirmap::fetch::{self, Fetcher};
use rirmap::lookup::{self, LookupEngine, LookupRecord};
use rirmap::snapshot::{SnapshotStore, Statistics, IPV4_FILE, IPV6_FILE, METADATA_FILE};
use rirmap::{aggregate, reconcile, rirstat, Cidr};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

fn setup_logger(verbose: bool) {
    let config = simplelog::ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();
    let level = if verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    simplelog::TermLogger::init(
        level,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .expect("Failed to initialize logger");
}

fn main() -> ExitCode {
    let args = Cli::parse();
    setup_logger(args.verbose);
    match args.command {
        Command::Update { force, data_dir } => run_update(force, data_dir),
        Command::Lookup {
            ips,
            format,
            country_name,
            currency,
            data_dir,
        } => run_lookup(&ips, format, country_name, currency, data_dir),
        Command::Status { data_dir } => run_status(data_dir),
        Command::Country { ip } => run_field(&ip, Field::Name),
        Command::CountryCode { ip } => run_field(&ip, Field::Code),
        Command::Currency { ip } => run_field(&ip, Field::Currency),
    }
}

/// Run the whole pipeline: fetch, parse, reconcile, aggregate, serialize
fn run_update(force: bool, data_dir: Option<PathBuf>) -> ExitCode {
    let start = std::time::Instant::now();
    let fetcher = match Fetcher::new(data_dir) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            log::error!("Failed to prepare data directory: {e}");
            return ExitCode::FAILURE;
        }
    };

    let files = fetcher.fetch_all(force);
    if files.is_empty() {
        log::error!("No delegated files available; aborting update");
        return ExitCode::FAILURE;
    }
    let sources = match fetcher.metadata() {
        Ok(sources) => sources,
        Err(e) => {
            log::error!("Failed to record source identities: {e}");
            return ExitCode::FAILURE;
        }
    };

    let entries = rirstat::parse_all(&files);
    let mut entries_per_registry: BTreeMap<String, usize> = BTreeMap::new();
    for entry in &entries {
        *entries_per_registry
            .entry(entry.registry.as_str().to_string())
            .or_default() += 1;
    }
    let statistics = Statistics {
        total_entries: entries.len(),
        entries_per_registry,
        ..Statistics::default()
    };

    let (unique, conflicts) = reconcile::reconcile(entries);
    let pairs = unique.into_iter().map(|e| (e.prefix, e.cc)).collect();
    let mut ipv4 = Vec::new();
    let mut ipv6 = Vec::new();
    for (prefix, cc) in aggregate::aggregate(pairs) {
        match prefix {
            Cidr::V4(cidr) => ipv4.push((cidr, cc)),
            Cidr::V6(cidr) => ipv6.push((cidr, cc)),
        }
    }

    let store = SnapshotStore::new(fetcher.processed_dir());
    if let Err(e) = store.write(&ipv4, &ipv6, sources, conflicts, statistics) {
        log::error!("Failed to write snapshot: {e}");
        return ExitCode::FAILURE;
    }
    fetcher.cleanup_raw();
    log::info!(
        "Update completed in {:.1?}; data directory {}",
        start.elapsed(),
        fetcher.data_dir().display()
    );
    ExitCode::SUCCESS
}

fn processed_dir(data_dir: Option<PathBuf>) -> PathBuf {
    data_dir.map_or_else(fetch::default_processed_dir, |dir| dir.join("processed"))
}

fn run_lookup(
    ips: &[String],
    format: OutputFormat,
    want_name: bool,
    want_currency: bool,
    data_dir: Option<PathBuf>,
) -> ExitCode {
    let engine = match LookupEngine::load(&processed_dir(data_dir)) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut records = Vec::new();
    for ip in ips {
        match engine.lookup_full_str(ip) {
            Ok(mut record) => {
                if !want_name {
                    record.country_name = None;
                }
                if !want_currency {
                    record.currency = None;
                }
                records.push(record);
            }
            Err(e) => log::error!("{e}"),
        }
    }

    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&records) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                log::error!("Failed to encode results: {e}");
                return ExitCode::FAILURE;
            }
        },
        OutputFormat::Csv => print_csv(&records, want_name, want_currency),
        OutputFormat::Table => print_table(&records, want_name, want_currency),
    }
    ExitCode::SUCCESS
}

fn result_columns(want_name: bool, want_currency: bool) -> Vec<&'static str> {
    let mut headers = vec!["ip", "country_code"];
    if want_name {
        headers.push("country_name");
    }
    if want_currency {
        headers.push("currency");
    }
    headers
}

fn result_row(record: &LookupRecord, want_name: bool, want_currency: bool) -> Vec<String> {
    let mut row = vec![
        record.ip.to_string(),
        record.country_code.map(|cc| cc.to_string()).unwrap_or_default(),
    ];
    if want_name {
        row.push(record.country_name.unwrap_or_default().to_string());
    }
    if want_currency {
        row.push(record.currency.unwrap_or_default().to_string());
    }
    row
}

fn print_csv(records: &[LookupRecord], want_name: bool, want_currency: bool) {
    println!("{}", result_columns(want_name, want_currency).join(","));
    for record in records {
        println!("{}", result_row(record, want_name, want_currency).join(","));
    }
}

fn print_table(records: &[LookupRecord], want_name: bool, want_currency: bool) {
    if records.is_empty() {
        println!("No results found.");
        return;
    }
    let headers = result_columns(want_name, want_currency);
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| result_row(r, want_name, want_currency))
        .collect();
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .map(|row| row[i].len())
                .max()
                .unwrap_or(0)
                .max(header.len())
        })
        .collect();

    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(header, &width)| format!("{header:<width$}"))
        .collect();
    println!("{}", header_line.join(" | "));
    let separator: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    println!("{}", separator.join("-+-"));
    for row in &rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect();
        println!("{}", line.join(" | "));
    }
}

fn run_status(data_dir: Option<PathBuf>) -> ExitCode {
    let data_dir = data_dir.unwrap_or_else(fetch::default_data_dir);
    println!("rirmap status");
    println!("Data directory: {}", data_dir.display());
    println!(
        "Directory exists: {}",
        if data_dir.exists() { "yes" } else { "no" }
    );

    let processed = data_dir.join("processed");
    println!("\nProcessed files:");
    for name in [IPV4_FILE, IPV6_FILE, METADATA_FILE] {
        match std::fs::metadata(processed.join(name)) {
            Ok(meta) => println!("  [ok]      {name}: {} bytes", meta.len()),
            Err(_) => println!("  [missing] {name}"),
        }
    }

    match SnapshotStore::new(&processed).metadata() {
        Ok(metadata) => {
            println!("\nLast update: {}", metadata.generated_timestamp.to_rfc3339());
            println!("IPv4 prefixes: {}", metadata.statistics.ipv4_aggregated);
            println!("IPv6 prefixes: {}", metadata.statistics.ipv6_aggregated);
            println!("Conflicts resolved: {}", metadata.statistics.conflict_count);
        }
        Err(_) => println!("\nNo metadata found; run `rirmap update`"),
    }
    ExitCode::SUCCESS
}

enum Field {
    Name,
    Code,
    Currency,
}

/// Single-field shortcuts over the process-wide engine
///
/// Prints `Unknown` for anything unresolved; only invalid input exits
/// non-zero.
fn run_field(ip: &str, field: Field) -> ExitCode {
    let engine = match lookup::shared() {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("{e}");
            println!("Unknown");
            return ExitCode::SUCCESS;
        }
    };
    let record = match engine.lookup_full_str(ip) {
        Ok(record) => record,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let value: String = match field {
        Field::Name => record.country_name.unwrap_or_default().to_string(),
        Field::Code => record.country_code.map(|cc| cc.to_string()).unwrap_or_default(),
        Field::Currency => record.currency.unwrap_or_default().to_string(),
    };
    if value.is_empty() {
        println!("Unknown");
    } else {
        println!("{value}");
    }
    ExitCode::SUCCESS
}
