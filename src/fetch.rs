//! Fetcher for the five RIR delegated-extended statistics files

// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::rirstat::rirbase::RirName;
use crate::snapshot::{file_digest, SourceInfo};
use lazy_static::lazy_static;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

const AFRINIC_URLS: &[&str] = &[
    "https://ftp.afrinic.net/stats/afrinic/delegated-afrinic-extended-latest",
    "https://ftp.ripe.net/pub/stats/afrinic/delegated-afrinic-extended-latest",
    "https://ftp.apnic.net/stats/afrinic/delegated-afrinic-extended-latest",
];
const APNIC_URLS: &[&str] = &[
    "https://ftp.apnic.net/stats/apnic/delegated-apnic-extended-latest",
    "https://ftp.ripe.net/pub/stats/apnic/delegated-apnic-extended-latest",
];
const ARIN_URLS: &[&str] = &[
    "https://ftp.arin.net/pub/stats/arin/delegated-arin-extended-latest",
    "https://ftp.ripe.net/pub/stats/arin/delegated-arin-extended-latest",
    "https://ftp.apnic.net/stats/arin/delegated-arin-extended-latest",
];
const LACNIC_URLS: &[&str] = &[
    "https://ftp.lacnic.net/pub/stats/lacnic/delegated-lacnic-extended-latest",
    "https://ftp.ripe.net/pub/stats/lacnic/delegated-lacnic-extended-latest",
];
const RIPE_URLS: &[&str] = &[
    "https://ftp.ripe.net/pub/stats/ripencc/delegated-ripencc-extended-latest",
    "https://ftp.apnic.net/stats/ripe-ncc/delegated-ripencc-extended-latest",
    "https://ftp.lacnic.net/pub/stats/ripencc/delegated-ripencc-extended-latest",
];

lazy_static! {
    static ref RIR_SOURCES: BTreeMap<RirName, &'static [&'static str]> = [
        (RirName::Afrinic, AFRINIC_URLS),
        (RirName::Apnic, APNIC_URLS),
        (RirName::Arin, ARIN_URLS),
        (RirName::Lacnic, LACNIC_URLS),
        (RirName::Ripe, RIPE_URLS),
    ]
    .iter()
    .copied()
    .collect();
}

/// Error type for downloading delegated files
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request returned status {0}")]
    HttpStatus(u16),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Ureq(#[from] Box<ureq::Error>),
    #[error("no mirror configured for {0}")]
    NoMirrors(RirName),
}

/// OS-appropriate per-user data directory
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rirmap")
}

/// Where the snapshot of the default data directory lives
#[must_use]
pub fn default_processed_dir() -> PathBuf {
    default_data_dir().join("processed")
}

fn download_file(url: &str, path: &Path) -> Result<(), Error> {
    let response = ureq::get(url).call().map_err(Box::new)?;
    match response.status() {
        200 => {
            let mut reader = response.into_reader();
            let mut file = File::create(path)?;
            let written = io::copy(&mut reader, &mut file)?;
            log::info!("Fetched {written} bytes from {url}");
            Ok(())
        }
        status => Err(Error::HttpStatus(status)),
    }
}

/// Downloads raw delegated files into `<data_dir>/raw` and hands their
/// paths and identities to the pipeline
pub struct Fetcher {
    data_dir: PathBuf,
    raw_dir: PathBuf,
    processed_dir: PathBuf,
}

impl Fetcher {
    /// Create the data directory layout, defaulting to the per-user one
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self, Error> {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let raw_dir = data_dir.join("raw");
        let processed_dir = data_dir.join("processed");
        fs::create_dir_all(&raw_dir)?;
        fs::create_dir_all(&processed_dir)?;
        Ok(Self {
            data_dir,
            raw_dir,
            processed_dir,
        })
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    fn raw_path(&self, registry: RirName) -> PathBuf {
        self.raw_dir
            .join(format!("delegated-{}-extended-latest", registry.as_str()))
    }

    /// Download every registry's delegated file
    ///
    /// Without `force` an already-present file is reused. Mirrors are
    /// tried in order; a partial file is removed after a failed attempt.
    /// A registry whose mirrors all fail is reported and left out of the
    /// returned map, and the pipeline continues without it.
    pub fn fetch_all(&self, force: bool) -> BTreeMap<RirName, PathBuf> {
        let mut files = BTreeMap::new();
        for (&registry, &urls) in RIR_SOURCES.iter() {
            let path = self.raw_path(registry);
            if !force && path.exists() {
                log::info!("{registry} data already present, skipping download");
                files.insert(registry, path);
                continue;
            }
            match self.download_with_fallback(registry, urls, &path) {
                Ok(()) => {
                    files.insert(registry, path);
                }
                Err(e) => log::error!("Skipping {registry}: all mirrors failed: {e}"),
            }
        }
        files
    }

    fn download_with_fallback(
        &self,
        registry: RirName,
        urls: &[&str],
        path: &Path,
    ) -> Result<(), Error> {
        let mut last_error = None;
        for &url in urls {
            log::info!("Downloading {registry} from {url}");
            match download_file(url, path) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::warn!("Mirror {url} failed: {e}");
                    // Never leave a partial file behind for the next attempt
                    let _ = fs::remove_file(path);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(Error::NoMirrors(registry)))
    }

    /// Identity (primary URL, size, sha256) of each raw file on disk,
    /// keyed by canonical registry name
    pub fn metadata(&self) -> Result<BTreeMap<String, SourceInfo>, Error> {
        let mut sources = BTreeMap::new();
        for (&registry, &urls) in RIR_SOURCES.iter() {
            let path = self.raw_path(registry);
            if !path.exists() {
                continue;
            }
            let (size, sha256) = file_digest(&path)?;
            sources.insert(
                registry.as_str().to_string(),
                SourceInfo {
                    url: urls[0].to_string(),
                    size,
                    sha256,
                },
            );
        }
        Ok(sources)
    }

    /// Raw files currently present, whether cached or just downloaded
    #[must_use]
    pub fn data_files(&self) -> BTreeMap<RirName, PathBuf> {
        RirName::ALL
            .iter()
            .map(|&registry| (registry, self.raw_path(registry)))
            .filter(|(_, path)| path.exists())
            .collect()
    }

    /// Remove the raw downloads once the snapshot is committed
    pub fn cleanup_raw(&self) {
        if !self.raw_dir.exists() {
            return;
        }
        match fs::remove_dir_all(&self.raw_dir) {
            Ok(()) => log::info!("Cleaned up raw data directory {}", self.raw_dir.display()),
            Err(e) => log::warn!("Failed to clean up raw data: {e}"),
        }
    }
}
