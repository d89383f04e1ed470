//! Snapshot persistence: aggregated prefix streams plus metadata

// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::cidr::{Cidr4, Cidr6};
use crate::reconcile::Conflict;
use crate::rirstat::rirbase::CountryCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const IPV4_FILE: &str = "prefixes_ipv4_agg.csv";
pub const IPV6_FILE: &str = "prefixes_ipv6_agg.csv";
pub const METADATA_FILE: &str = "metadata.json";

/// Error type for snapshot I/O
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("snapshot file {} is missing", .0.display())]
    Missing(PathBuf),
    #[error("{file}:{line}: bad snapshot row: {reason}")]
    BadRow {
        file: String,
        line: u64,
        reason: String,
    },
}

impl Error {
    /// Whether this means "no snapshot yet" rather than a damaged one
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing(_))
    }
}

/// Identity of one downloaded source file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceInfo {
    pub url: String,
    pub size: u64,
    pub sha256: String,
}

/// Identity of one generated output file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileInfo {
    pub size: u64,
    pub sha256: String,
    pub count: usize,
}

/// Pipeline counters recorded for the status report
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_entries: usize,
    pub entries_per_registry: BTreeMap<String, usize>,
    pub conflict_count: usize,
    pub ipv4_aggregated: usize,
    pub ipv6_aggregated: usize,
}

/// The informational document written next to the prefix streams
///
/// Only the two CSV streams are required to start the lookup engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Metadata {
    pub generated_timestamp: DateTime<Utc>,
    pub sources: BTreeMap<String, SourceInfo>,
    pub files: BTreeMap<String, FileInfo>,
    pub statistics: Statistics,
    pub conflicts: Vec<Conflict>,
}

/// The aggregated pairs read back from a snapshot
#[derive(Clone, Debug, Default)]
pub struct SnapshotData {
    pub ipv4: Vec<(Cidr4, CountryCode)>,
    pub ipv6: Vec<(Cidr6, CountryCode)>,
}

/// Size and lowercase-hex SHA-256 of a file, streamed
pub fn file_digest(path: &Path) -> Result<(u64, String), std::io::Error> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];
    let mut size = 0_u64;
    loop {
        let amount = file.read(&mut buf)?;
        if amount == 0 {
            break;
        }
        hasher.update(&buf[..amount]);
        size += amount as u64;
    }
    let sha256 = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    Ok((size, sha256))
}

/// Reads and writes the on-disk snapshot in one directory
///
/// Every output is first written to a `.tmp` scratch path in the same
/// directory and renamed into place, so an aborted update never damages a
/// previously committed snapshot.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a complete snapshot: both prefix streams, then metadata
    ///
    /// The input slices must already be in snapshot order (numeric
    /// network address, then ascending prefix length), which is how the
    /// aggregator returns them.
    pub fn write(
        &self,
        ipv4: &[(Cidr4, CountryCode)],
        ipv6: &[(Cidr6, CountryCode)],
        sources: BTreeMap<String, SourceInfo>,
        conflicts: Vec<Conflict>,
        mut statistics: Statistics,
    ) -> Result<Metadata, Error> {
        fs::create_dir_all(&self.dir)?;
        statistics.ipv4_aggregated = ipv4.len();
        statistics.ipv6_aggregated = ipv6.len();
        statistics.conflict_count = conflicts.len();

        let mut files = BTreeMap::new();
        files.insert(
            IPV4_FILE.to_string(),
            self.write_prefix_file(IPV4_FILE, ipv4.iter().map(|(p, cc)| (p, *cc)))?,
        );
        files.insert(
            IPV6_FILE.to_string(),
            self.write_prefix_file(IPV6_FILE, ipv6.iter().map(|(p, cc)| (p, *cc)))?,
        );

        let metadata = Metadata {
            generated_timestamp: Utc::now(),
            sources,
            files,
            statistics,
            conflicts,
        };
        let scratch = self.dir.join(format!("{METADATA_FILE}.tmp"));
        let mut writer = BufWriter::new(File::create(&scratch)?);
        serde_json::to_writer_pretty(&mut writer, &metadata)?;
        writer.flush()?;
        fs::rename(&scratch, self.dir.join(METADATA_FILE))?;

        log::info!(
            "Snapshot committed to {}: {} IPv4 and {} IPv6 prefixes",
            self.dir.display(),
            ipv4.len(),
            ipv6.len()
        );
        Ok(metadata)
    }

    fn write_prefix_file<'a, P: fmt::Display + 'a>(
        &self,
        name: &str,
        rows: impl ExactSizeIterator<Item = (&'a P, CountryCode)>,
    ) -> Result<FileInfo, Error> {
        let scratch = self.dir.join(format!("{name}.tmp"));
        let count = rows.len();
        let mut writer = csv::Writer::from_path(&scratch)?;
        for (prefix, cc) in rows {
            writer.write_record([prefix.to_string().as_str(), cc.as_str()])?;
        }
        writer.flush()?;
        drop(writer);
        let (size, sha256) = file_digest(&scratch)?;
        fs::rename(&scratch, self.dir.join(name))?;
        Ok(FileInfo {
            size,
            sha256,
            count,
        })
    }

    /// Load both prefix streams
    pub fn load(&self) -> Result<SnapshotData, Error> {
        Ok(SnapshotData {
            ipv4: self.load_prefix_file(IPV4_FILE)?,
            ipv6: self.load_prefix_file(IPV6_FILE)?,
        })
    }

    fn load_prefix_file<T>(&self, name: &str) -> Result<Vec<(T, CountryCode)>, Error>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let path = self.dir.join(name);
        if !path.exists() {
            return Err(Error::Missing(path));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(&path)?;
        let mut rows = Vec::new();
        for (n, record) in reader.records().enumerate() {
            let record = record?;
            let bad = |reason: String| Error::BadRow {
                file: name.to_string(),
                line: n as u64 + 1,
                reason,
            };
            if record.len() < 2 {
                return Err(bad("expected two columns".to_string()));
            }
            let prefix: T = record[0].parse().map_err(|e: T::Err| bad(e.to_string()))?;
            let cc: CountryCode = record[1]
                .parse::<CountryCode>()
                .map_err(|e| bad(e.to_string()))?;
            rows.push((prefix, cc));
        }
        Ok(rows)
    }

    /// Load the metadata document
    pub fn metadata(&self) -> Result<Metadata, Error> {
        let path = self.dir.join(METADATA_FILE);
        if !path.exists() {
            return Err(Error::Missing(path));
        }
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cc(code: &str) -> CountryCode {
        CountryCode::new(code).unwrap()
    }

    fn sample() -> (Vec<(Cidr4, CountryCode)>, Vec<(Cidr6, CountryCode)>) {
        let ipv4 = vec![
            ("1.0.16.0/21".parse().unwrap(), cc("JP")),
            ("10.0.0.0/8".parse().unwrap(), cc("US")),
        ];
        let ipv6 = vec![("2a00::/12".parse().unwrap(), cc("DE"))];
        (ipv4, ipv6)
    }

    #[test]
    fn test_write_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let (ipv4, ipv6) = sample();
        let metadata = store
            .write(&ipv4, &ipv6, BTreeMap::new(), Vec::new(), Statistics::default())
            .unwrap();
        assert_eq!(metadata.files[IPV4_FILE].count, 2);
        assert_eq!(metadata.statistics.ipv4_aggregated, 2);

        let data = store.load().unwrap();
        assert_eq!(data.ipv4, ipv4);
        assert_eq!(data.ipv6, ipv6);
    }

    #[test]
    fn test_csv_format_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let (ipv4, ipv6) = sample();
        store
            .write(&ipv4, &ipv6, BTreeMap::new(), Vec::new(), Statistics::default())
            .unwrap();
        let content = fs::read_to_string(dir.path().join(IPV4_FILE)).unwrap();
        assert_eq!(content, "1.0.16.0/21,JP\n10.0.0.0/8,US\n");
        let content6 = fs::read_to_string(dir.path().join(IPV6_FILE)).unwrap();
        assert_eq!(content6, "2a00::/12,DE\n");
    }

    #[test]
    fn test_writes_are_byte_identical() {
        let (ipv4, ipv6) = sample();
        let dirs = [tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap()];
        let bytes: Vec<(Vec<u8>, Vec<u8>)> = dirs
            .iter()
            .map(|dir| {
                let store = SnapshotStore::new(dir.path());
                store
                    .write(&ipv4, &ipv6, BTreeMap::new(), Vec::new(), Statistics::default())
                    .unwrap();
                (
                    fs::read(dir.path().join(IPV4_FILE)).unwrap(),
                    fs::read(dir.path().join(IPV6_FILE)).unwrap(),
                )
            })
            .collect();
        assert_eq!(bytes[0], bytes[1]);
    }

    #[test]
    fn test_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("processed"));
        let err = store.load().unwrap_err();
        assert!(err.is_missing());
        assert!(store.metadata().unwrap_err().is_missing());
    }

    #[test]
    fn test_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(IPV4_FILE), "10.0.0.0/8,US\nnot-a-prefix,ZZ\n").unwrap();
        fs::write(dir.path().join(IPV6_FILE), "").unwrap();
        let store = SnapshotStore::new(dir.path());
        let err = store.load().unwrap_err();
        assert!(matches!(err, Error::BadRow { line: 2, .. }));
        assert!(!err.is_missing());
    }

    #[test]
    fn test_metadata_roundtrip_with_conflicts() {
        use crate::reconcile::Claim;
        use crate::rirstat::rirbase::RirName;
        use chrono::NaiveDate;

        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let chosen = Claim(
            RirName::Ripe,
            cc("GB"),
            NaiveDate::from_ymd_opt(2020, 6, 1).unwrap(),
        );
        let conflict = Conflict {
            prefix: "192.0.2.0/24".parse().unwrap(),
            entries: vec![
                Claim(
                    RirName::Arin,
                    cc("US"),
                    NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
                ),
                chosen.clone(),
            ],
            chosen,
        };
        let (ipv4, ipv6) = sample();
        store
            .write(&ipv4, &ipv6, BTreeMap::new(), vec![conflict], Statistics::default())
            .unwrap();

        let metadata = store.metadata().unwrap();
        assert_eq!(metadata.conflicts.len(), 1);
        assert_eq!(metadata.conflicts[0].prefix.to_string(), "192.0.2.0/24");
        assert_eq!(metadata.conflicts[0].chosen.0, RirName::Ripe);
        assert_eq!(metadata.statistics.conflict_count, 1);

        // Dates serialize as ISO strings
        let raw = fs::read_to_string(dir.path().join(METADATA_FILE)).unwrap();
        assert!(raw.contains("\"2020-06-01\""));
        assert!(raw.contains("\"ripe\""));
    }
}
