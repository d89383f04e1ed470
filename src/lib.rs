//! rirmap -- offline IP-to-country lookup built from RIR delegated statistics
//!
//! The update pipeline turns the five RIR delegated-extended files into an
//! aggregated `(prefix, country)` snapshot on disk; the lookup engine
//! serves longest-prefix-match queries over a loaded snapshot.

// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod aggregate;
pub mod cidr;
pub mod countries;
pub mod fetch;
pub mod lookup;
pub mod reconcile;
pub mod rirstat;
pub mod snapshot;
pub mod trie;

pub use cidr::{Cidr, Cidr4, Cidr6, Family};
pub use lookup::{LookupEngine, LookupRecord};
pub use rirstat::rirbase::{CountryCode, RirName};
pub use rirstat::Entry;
