//! Longest-prefix-match lookup engine over a loaded snapshot

// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::cidr::{Cidr4, Cidr6};
use crate::countries;
use crate::rirstat::rirbase::CountryCode;
use crate::snapshot::{self, SnapshotStore};
use crate::trie::RadixTrie;
use lazy_static::lazy_static;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Error type for lookups
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid IP address: {0:?}")]
    InvalidAddress(String),
    #[error("no snapshot in {}; run `rirmap update` first", .0.display())]
    DataUnavailable(PathBuf),
    #[error("snapshot is corrupt, re-run `rirmap update`: {0}")]
    DataCorrupt(#[source] snapshot::Error),
}

/// Everything known about one address
#[derive(Clone, Debug, Serialize)]
pub struct LookupRecord {
    pub ip: IpAddr,
    pub country_code: Option<CountryCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_name: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<&'static str>,
}

/// Immutable resolver built from an aggregated snapshot
///
/// One trie per family; once constructed the engine never changes, so
/// shared references can be handed to any number of reader threads. A
/// data refresh means loading a new engine, not mutating this one.
pub struct LookupEngine {
    ipv4: RadixTrie,
    ipv6: RadixTrie,
}

impl LookupEngine {
    /// Load the snapshot in `dir` and build both tries
    pub fn load(dir: &Path) -> Result<Self, Error> {
        let data = SnapshotStore::new(dir).load().map_err(|e| {
            if e.is_missing() {
                Error::DataUnavailable(dir.to_path_buf())
            } else {
                Error::DataCorrupt(e)
            }
        })?;
        let engine = Self::from_pairs(&data.ipv4, &data.ipv6);
        log::debug!(
            "Loaded {} IPv4 and {} IPv6 prefixes from {}",
            engine.ipv4.prefix_count(),
            engine.ipv6.prefix_count(),
            dir.display()
        );
        Ok(engine)
    }

    /// Build an engine directly from aggregated pairs
    #[must_use]
    pub fn from_pairs(ipv4: &[(Cidr4, CountryCode)], ipv6: &[(Cidr6, CountryCode)]) -> Self {
        Self {
            ipv4: RadixTrie::build_v4(ipv4),
            ipv6: RadixTrie::build_v6(ipv6),
        }
    }

    /// Country of the longest stored prefix covering `ip`, if any
    ///
    /// Pure and sub-microsecond; an uncovered address is a normal `None`,
    /// not an error.
    #[must_use]
    pub fn resolve(&self, ip: IpAddr) -> Option<CountryCode> {
        match ip {
            IpAddr::V4(ip) => self.resolve_v4(ip),
            IpAddr::V6(ip) => self.resolve_v6(ip),
        }
    }

    /// As [`resolve`](Self::resolve) with the family already known
    #[must_use]
    pub fn resolve_v4(&self, ip: Ipv4Addr) -> Option<CountryCode> {
        self.ipv4.lookup(u128::from(u32::from(ip)))
    }

    /// As [`resolve`](Self::resolve) with the family already known
    #[must_use]
    pub fn resolve_v6(&self, ip: Ipv6Addr) -> Option<CountryCode> {
        self.ipv6.lookup(u128::from(ip))
    }

    /// Resolve an address given in text form
    pub fn resolve_str(&self, text: &str) -> Result<Option<CountryCode>, Error> {
        let ip: IpAddr = text
            .trim()
            .parse()
            .map_err(|_| Error::InvalidAddress(text.to_string()))?;
        Ok(self.resolve(ip))
    }

    /// Resolve an address and attach the static country attributes
    #[must_use]
    pub fn lookup_full(&self, ip: IpAddr) -> LookupRecord {
        let country_code = self.resolve(ip);
        let info = country_code.and_then(|cc| countries::info(cc.as_str()));
        LookupRecord {
            ip,
            country_code,
            country_name: info.map(|i| i.name),
            currency: info.map(|i| i.currency),
        }
    }

    /// As [`lookup_full`](Self::lookup_full) for text input
    pub fn lookup_full_str(&self, text: &str) -> Result<LookupRecord, Error> {
        let ip: IpAddr = text
            .trim()
            .parse()
            .map_err(|_| Error::InvalidAddress(text.to_string()))?;
        Ok(self.lookup_full(ip))
    }
}

lazy_static! {
    static ref SHARED: Mutex<Option<Arc<LookupEngine>>> = Mutex::new(None);
}

/// Process-wide engine over the default data directory, loaded on first use
///
/// Convenience for callers that do not want to manage an engine value;
/// constructing [`LookupEngine`] explicitly remains the primary API. A
/// failed load is not cached, so a later call retries.
pub fn shared() -> Result<Arc<LookupEngine>, Error> {
    // The engine is infallible after construction, so the lock can only
    // be poisoned by a panic inside this function itself
    let mut guard = SHARED.lock().expect("shared engine lock poisoned");
    if let Some(engine) = guard.as_ref() {
        return Ok(Arc::clone(engine));
    }
    let dir = crate::fetch::default_processed_dir();
    let engine = Arc::new(LookupEngine::load(&dir)?);
    *guard = Some(Arc::clone(&engine));
    Ok(engine)
}
