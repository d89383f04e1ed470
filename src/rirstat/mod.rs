//! Parser for RIR delegated-extended statistics files

// SPDX-License-Identifier: AGPL-3.0-or-later
// https://www.apnic.net/about-apnic/corporate-documents/documents/resource-guidelines/rir-statistics-exchange-format/

pub mod rirbase;

use crate::cidr::{Cidr, Cidr4, Cidr6};
use chrono::NaiveDate;
use rirbase::{CountryCode, RirName};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

/// Error type for delegated-file parsing
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Allocation status of a delegated record
///
/// Only these two statuses describe address space actually handed out;
/// `reserved`, `available`, and summary rows are filtered before an
/// [`Entry`] is created.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Status {
    Allocated,
    Assigned,
}

impl Status {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "allocated" => Some(Self::Allocated),
            "assigned" => Some(Self::Assigned),
            _ => None,
        }
    }
}

/// A validated delegated-file record with its prefix resolved
///
/// An IPv4 row decomposes into one entry per CIDR block, all sharing the
/// registry, country, date, and status of the source line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    pub registry: RirName,
    pub cc: CountryCode,
    pub prefix: Cidr,
    pub date: NaiveDate,
    pub status: Status,
}

/// Date used when the `date` field is absent or unparseable
#[must_use]
pub fn sentinel_date() -> NaiveDate {
    // This unwrap never fails: 1900-01-01 is a valid date
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap()
}

fn parse_date(field: &str) -> NaiveDate {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return sentinel_date();
    }
    NaiveDate::parse_from_str(field, "%Y%m%d").unwrap_or_else(|_| sentinel_date())
}

/// Parse a single line from a delegated file
///
/// Returns the entries the line expands to, or `None` for comment,
/// header, summary, and non-address lines. Lines with a malformed prefix
/// are logged and dropped.
fn parse_line(line: &str) -> Option<Vec<Entry>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 7 {
        return None;
    }
    // Version headers fail the registry parse, summary lines the status
    // check; both fall out silently.
    let registry: RirName = parts[0].parse().ok()?;
    let af = parts[2];
    if af != "ipv4" && af != "ipv6" {
        return None;
    }
    let status = Status::from_token(parts[6])?;
    let cc = match CountryCode::new(parts[1]) {
        Ok(cc) => cc,
        Err(e) => {
            log::warn!("{registry}: dropping line with bad country code: {e}");
            return None;
        }
    };
    let date = parse_date(parts[5]);

    let prefixes: Vec<Cidr> = if af == "ipv4" {
        let start: Ipv4Addr = match parts[3].parse() {
            Ok(addr) => addr,
            Err(_) => {
                log::warn!("{registry}: bad IPv4 start address {:?}", parts[3]);
                return None;
            }
        };
        let count: u64 = match parts[4].parse() {
            Ok(count) => count,
            Err(_) => {
                log::warn!("{registry}: bad IPv4 host count {:?}", parts[4]);
                return None;
            }
        };
        match Cidr4::from_host_range(start, count) {
            Ok(cidrs) => cidrs.into_iter().map(Cidr::V4).collect(),
            Err(e) => {
                log::warn!("{registry}: failed to convert IPv4 {start}+{count}: {e}");
                return None;
            }
        }
    } else {
        let start: Ipv6Addr = match parts[3].parse() {
            Ok(addr) => addr,
            Err(_) => {
                log::warn!("{registry}: bad IPv6 address {:?}", parts[3]);
                return None;
            }
        };
        let prefix_len: u8 = match parts[4].parse() {
            Ok(len) if len <= 128 => len,
            _ => {
                log::warn!("{registry}: bad IPv6 prefix length {:?}", parts[4]);
                return None;
            }
        };
        let cidr = Cidr6::new(start, prefix_len);
        if !cidr.is_canonical() {
            log::warn!("{registry}: host bits set in IPv6 prefix {cidr}");
            return None;
        }
        vec![Cidr::V6(cidr)]
    };

    Some(
        prefixes
            .into_iter()
            .map(|prefix| Entry {
                registry,
                cc,
                prefix,
                date,
                status,
            })
            .collect(),
    )
}

/// Parse one registry's delegated file
///
/// I/O errors are fatal for the file; the caller decides whether the
/// overall update continues.
pub fn parse_file(path: &Path, registry: RirName) -> Result<Vec<Entry>, Error> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        if let Some(parsed) = parse_line(&line?) {
            entries.extend(parsed);
        }
        if n > 0 && n % 100_000 == 0 {
            log::debug!("Processed {n} lines from {registry}");
        }
    }
    log::info!("Parsed {} entries from {registry}", entries.len());
    Ok(entries)
}

/// Parse every downloaded delegated file
///
/// A file that fails to read is reported and skipped; the remaining
/// registries still contribute.
#[must_use]
pub fn parse_all(files: &BTreeMap<RirName, PathBuf>) -> Vec<Entry> {
    let mut all_entries = Vec::new();
    for (&registry, path) in files {
        match parse_file(path, registry) {
            Ok(entries) => all_entries.extend(entries),
            Err(e) => log::error!("Skipping {registry}: failed to parse {}: {e}", path.display()),
        }
    }
    log::info!("Total parsed entries: {}", all_entries.len());
    all_entries
}
