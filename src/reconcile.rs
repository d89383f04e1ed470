//! Exact-prefix deduplication across registries

// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::cidr::Cidr;
use crate::rirstat::rirbase::{CountryCode, RirName};
use crate::rirstat::Entry;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One record's assertion about a prefix, as kept in the conflict report
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Claim(pub RirName, pub CountryCode, pub NaiveDate);

impl Claim {
    fn of(entry: &Entry) -> Self {
        Self(entry.registry, entry.cc, entry.date)
    }
}

/// A prefix asserted with two or more distinct country codes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conflict {
    pub prefix: Cidr,
    pub entries: Vec<Claim>,
    pub chosen: Claim,
}

/// Deduplicate entries that share an exact prefix
///
/// Within a group the winner has the greatest `(date, registry)` key: the
/// most recent registration wins, ties broken by descending-lexicographic
/// registry name. Groups asserting at least two distinct country codes are
/// recorded in the conflict report, ordered by prefix.
///
/// Overlap between prefixes of *different* lengths is left alone; the
/// lookup engine resolves it with longest-prefix match.
#[must_use]
pub fn reconcile(entries: Vec<Entry>) -> (Vec<Entry>, Vec<Conflict>) {
    let mut groups: BTreeMap<Cidr, Vec<Entry>> = BTreeMap::new();
    for entry in entries {
        groups.entry(entry.prefix).or_default().push(entry);
    }

    let mut deduplicated = Vec::with_capacity(groups.len());
    let mut conflicts = Vec::new();
    for (prefix, mut group) in groups {
        if group.len() > 1 {
            group.sort_by(|a, b| (b.date, b.registry).cmp(&(a.date, a.registry)));
            let distinct: BTreeSet<CountryCode> = group.iter().map(|e| e.cc).collect();
            if distinct.len() > 1 {
                conflicts.push(Conflict {
                    prefix,
                    entries: group.iter().map(Claim::of).collect(),
                    chosen: Claim::of(&group[0]),
                });
            }
            group.truncate(1);
        }
        deduplicated.extend(group);
    }

    if !conflicts.is_empty() {
        log::info!("Resolved {} conflicting prefixes", conflicts.len());
    }
    log::info!("Deduplicated to {} unique prefixes", deduplicated.len());
    (deduplicated, conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rirstat::Status;

    fn entry(registry: RirName, cc: &str, prefix: &str, date: (i32, u32, u32)) -> Entry {
        Entry {
            registry,
            cc: CountryCode::new(cc).unwrap(),
            prefix: prefix.parse().unwrap(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            status: Status::Allocated,
        }
    }

    #[test]
    fn test_later_date_wins() {
        let entries = vec![
            entry(RirName::Arin, "US", "192.0.2.0/24", (2019, 1, 1)),
            entry(RirName::Ripe, "GB", "192.0.2.0/24", (2020, 6, 1)),
        ];
        let (kept, conflicts) = reconcile(entries);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].cc.as_str(), "GB");
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].entries.len(), 2);
        assert_eq!(
            conflicts[0].chosen,
            Claim(
                RirName::Ripe,
                CountryCode::new("GB").unwrap(),
                NaiveDate::from_ymd_opt(2020, 6, 1).unwrap()
            )
        );
    }

    #[test]
    fn test_registry_breaks_date_tie() {
        // Same date: descending-lexicographic registry name, ripe > lacnic
        let entries = vec![
            entry(RirName::Lacnic, "BR", "198.51.100.0/24", (2020, 1, 1)),
            entry(RirName::Ripe, "NL", "198.51.100.0/24", (2020, 1, 1)),
        ];
        let (kept, conflicts) = reconcile(entries);
        assert_eq!(kept[0].cc.as_str(), "NL");
        assert_eq!(conflicts[0].chosen.0, RirName::Ripe);
    }

    #[test]
    fn test_same_country_duplicates_are_not_conflicts() {
        let entries = vec![
            entry(RirName::Apnic, "JP", "1.0.16.0/21", (2012, 1, 1)),
            entry(RirName::Apnic, "JP", "1.0.16.0/21", (2015, 3, 2)),
        ];
        let (kept, conflicts) = reconcile(entries);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].date, NaiveDate::from_ymd_opt(2015, 3, 2).unwrap());
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_different_lengths_pass_through() {
        // Nested prefixes are not the reconciler's business
        let entries = vec![
            entry(RirName::Arin, "US", "10.0.0.0/8", (2019, 1, 1)),
            entry(RirName::Ripe, "GB", "10.1.0.0/16", (2020, 6, 1)),
        ];
        let (kept, conflicts) = reconcile(entries);
        assert_eq!(kept.len(), 2);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_conflict_report_is_prefix_ordered() {
        let entries = vec![
            entry(RirName::Arin, "US", "203.0.113.0/24", (2019, 1, 1)),
            entry(RirName::Apnic, "AU", "203.0.113.0/24", (2019, 1, 2)),
            entry(RirName::Arin, "US", "192.0.2.0/24", (2019, 1, 1)),
            entry(RirName::Ripe, "GB", "192.0.2.0/24", (2020, 6, 1)),
        ];
        let (_, conflicts) = reconcile(entries);
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].prefix.to_string(), "192.0.2.0/24");
        assert_eq!(conflicts[1].prefix.to_string(), "203.0.113.0/24");
    }
}
