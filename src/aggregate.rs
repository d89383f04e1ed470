//! Prefix aggregation into the minimal per-country set

// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::cidr::{Cidr, Cidr4, Cidr6, Family};
use crate::rirstat::rirbase::CountryCode;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Netmask with the `len` high bits of a `bits`-wide address set
///
/// Addresses live in the low `bits` bits of a `u128`, so the surplus high
/// mask bits never meet a set address bit.
fn mask(len: u8, bits: u8) -> u128 {
    if len == 0 {
        0
    } else {
        !0u128 << (bits - len)
    }
}

/// Collapse one (country, family) bucket into its minimal equivalent set
fn collapse(mut prefixes: Vec<(u128, u8)>, bits: u8) -> Vec<(u128, u8)> {
    prefixes.sort_unstable();
    prefixes.dedup();

    // Drop prefixes contained in an earlier one. Sorted by (address,
    // length) a container precedes everything it contains, and CIDR
    // blocks either nest or are disjoint, so comparing against the last
    // kept block suffices.
    let mut kept: Vec<(u128, u8)> = Vec::with_capacity(prefixes.len());
    for (addr, len) in prefixes {
        if let Some(&(last_addr, last_len)) = kept.last() {
            if last_len <= len && addr & mask(last_len, bits) == last_addr {
                continue;
            }
        }
        kept.push((addr, len));
    }

    // Merge sibling halves bottom-up: two blocks of equal length L that
    // form an aligned L-1 block collapse into their parent, and the
    // parent may cascade with the block before it.
    let mut merged: Vec<(u128, u8)> = Vec::with_capacity(kept.len());
    for mut current in kept {
        while let Some(&(prev_addr, prev_len)) = merged.last() {
            let sibling = prev_len == current.1
                && prev_len > 0
                && prev_addr & mask(prev_len - 1, bits) == prev_addr
                && current.0 == prev_addr + (1u128 << (bits - prev_len));
            if !sibling {
                break;
            }
            merged.pop();
            current = (prev_addr, prev_len - 1);
        }
        merged.push(current);
    }
    merged
}

/// Aggregate `(prefix, country)` pairs per (country, family) bucket
///
/// Coverage per country code is preserved exactly; within a bucket the
/// output contains no overlapping pair and no two sibling blocks that a
/// shorter prefix could replace. The result is sorted by family, numeric
/// network address, then ascending prefix length.
#[must_use]
pub fn aggregate(pairs: Vec<(Cidr, CountryCode)>) -> Vec<(Cidr, CountryCode)> {
    let original_count = pairs.len();
    let mut buckets: BTreeMap<(CountryCode, Family), Vec<(u128, u8)>> = BTreeMap::new();
    for (prefix, cc) in pairs {
        let value = match prefix {
            Cidr::V4(c) => (u128::from(u32::from(c.addr)), c.prefix_len),
            Cidr::V6(c) => (u128::from(c.addr), c.prefix_len),
        };
        buckets.entry((cc, prefix.family())).or_default().push(value);
    }

    let mut result = Vec::new();
    for ((cc, family), prefixes) in buckets {
        for (addr, len) in collapse(prefixes, family.bits()) {
            let prefix = match family {
                Family::V4 => Cidr::V4(Cidr4::new(Ipv4Addr::from(addr as u32), len)),
                Family::V6 => Cidr::V6(Cidr6::new(Ipv6Addr::from(addr), len)),
            };
            result.push((prefix, cc));
        }
    }
    result.sort_unstable();

    log::info!("Aggregated {original_count} -> {} prefixes", result.len());
    result
}
