//! Flat binary radix trie for longest-prefix match

// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::cidr::{Cidr4, Cidr6};
use crate::rirstat::rirbase::CountryCode;

/// One trie node; a child index of 0 means "no child"
#[derive(Copy, Clone, Debug, Default)]
struct Node {
    left: u32,
    right: u32,
    code: Option<CountryCode>,
}

/// Binary radix trie over one address family
///
/// Nodes live in a flat arena indexed by `u32`; the root sits at index 0,
/// which doubles as the "no child" sentinel since the root can never be a
/// child. Prefix bits are consumed MSB-first and a node carrying a
/// country code marks the end of a stored prefix. Built once per update,
/// then read-only.
pub struct RadixTrie {
    nodes: Vec<Node>,
    bits: u8,
    prefix_count: usize,
}

impl RadixTrie {
    /// Create an empty trie for `bits`-wide addresses (32 or 128)
    #[must_use]
    pub fn new(bits: u8) -> Self {
        Self {
            nodes: vec![Node::default()],
            bits,
            prefix_count: 0,
        }
    }

    /// Build the IPv4 trie from aggregated pairs
    #[must_use]
    pub fn build_v4(pairs: &[(Cidr4, CountryCode)]) -> Self {
        let mut trie = Self::new(32);
        for &(cidr, cc) in pairs {
            trie.insert(u128::from(u32::from(cidr.addr)), cidr.prefix_len, cc);
        }
        trie
    }

    /// Build the IPv6 trie from aggregated pairs
    #[must_use]
    pub fn build_v6(pairs: &[(Cidr6, CountryCode)]) -> Self {
        let mut trie = Self::new(128);
        for &(cidr, cc) in pairs {
            trie.insert(u128::from(cidr.addr), cidr.prefix_len, cc);
        }
        trie
    }

    /// Insert a prefix, walking or creating one child per prefix bit
    ///
    /// Inserting a prefix whose final node already carries a code
    /// overwrites it silently; aggregated input never does, because its
    /// prefixes are disjoint.
    pub fn insert(&mut self, addr: u128, prefix_len: u8, code: CountryCode) {
        debug_assert!(prefix_len <= self.bits);
        let mut node = 0usize;
        for i in 0..prefix_len {
            let bit = addr >> (self.bits - 1 - i) & 1;
            let child = if bit == 0 {
                self.nodes[node].left
            } else {
                self.nodes[node].right
            };
            node = if child == 0 {
                let next = self.nodes.len() as u32;
                self.nodes.push(Node::default());
                if bit == 0 {
                    self.nodes[node].left = next;
                } else {
                    self.nodes[node].right = next;
                }
                next as usize
            } else {
                child as usize
            };
        }
        if self.nodes[node].code.is_none() {
            self.prefix_count += 1;
        }
        self.nodes[node].code = Some(code);
    }

    /// Longest-prefix match for an address in this trie's family
    ///
    /// Descends bit-by-bit, remembering the code of every terminal node
    /// passed; the deepest one wins. Returns `None` when no stored prefix
    /// covers the address.
    #[must_use]
    pub fn lookup(&self, addr: u128) -> Option<CountryCode> {
        let mut node = 0usize;
        let mut best = self.nodes[0].code;
        for i in 0..self.bits {
            let bit = addr >> (self.bits - 1 - i) & 1;
            let child = if bit == 0 {
                self.nodes[node].left
            } else {
                self.nodes[node].right
            };
            if child == 0 {
                break;
            }
            node = child as usize;
            if let Some(code) = self.nodes[node].code {
                best = Some(code);
            }
        }
        best
    }

    /// Number of stored prefixes
    #[must_use]
    pub fn prefix_count(&self) -> usize {
        self.prefix_count
    }

    /// Number of arena nodes, including the root
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn cc(code: &str) -> CountryCode {
        CountryCode::new(code).unwrap()
    }

    fn v4(trie: &RadixTrie, addr: &str) -> Option<CountryCode> {
        let addr: Ipv4Addr = addr.parse().unwrap();
        trie.lookup(u128::from(u32::from(addr)))
    }

    #[test]
    fn test_longest_prefix_override() {
        let pairs = [
            ("10.0.0.0/8".parse().unwrap(), cc("AA")),
            ("10.1.0.0/16".parse().unwrap(), cc("BB")),
        ];
        let trie = RadixTrie::build_v4(&pairs);
        assert_eq!(v4(&trie, "10.0.0.1"), Some(cc("AA")));
        assert_eq!(v4(&trie, "10.1.2.3"), Some(cc("BB")));
        assert_eq!(v4(&trie, "10.2.0.1"), Some(cc("AA")));
        assert_eq!(v4(&trie, "11.0.0.1"), None);
    }

    #[test]
    fn test_empty_trie() {
        let trie = RadixTrie::new(32);
        assert_eq!(v4(&trie, "8.8.8.8"), None);
        assert_eq!(trie.prefix_count(), 0);
        assert_eq!(trie.node_count(), 1);
    }

    #[test]
    fn test_zero_length_prefix_matches_everything() {
        let mut trie = RadixTrie::new(32);
        trie.insert(0, 0, cc("ZZ"));
        assert_eq!(v4(&trie, "8.8.8.8"), Some(cc("ZZ")));
        assert_eq!(v4(&trie, "255.255.255.255"), Some(cc("ZZ")));
    }

    #[test]
    fn test_host_prefix() {
        let pairs = [("192.0.2.1/32".parse().unwrap(), cc("US"))];
        let trie = RadixTrie::build_v4(&pairs);
        assert_eq!(v4(&trie, "192.0.2.1"), Some(cc("US")));
        assert_eq!(v4(&trie, "192.0.2.0"), None);
        assert_eq!(v4(&trie, "192.0.2.2"), None);
    }

    #[test]
    fn test_v6_lookup() {
        let pairs = [("2a00::/12".parse().unwrap(), cc("DE"))];
        let trie = RadixTrie::build_v6(&pairs);
        let probe = |s: &str| {
            let addr: std::net::Ipv6Addr = s.parse().unwrap();
            trie.lookup(u128::from(addr))
        };
        assert_eq!(probe("2a00::1"), Some(cc("DE")));
        assert_eq!(probe("2a0f:ffff::1"), Some(cc("DE")));
        assert_eq!(probe("2b00::1"), None);
    }

    #[test]
    fn test_reinsert_overwrites_silently() {
        let mut trie = RadixTrie::new(32);
        trie.insert(u128::from(u32::from(Ipv4Addr::new(10, 0, 0, 0))), 8, cc("AA"));
        trie.insert(u128::from(u32::from(Ipv4Addr::new(10, 0, 0, 0))), 8, cc("BB"));
        assert_eq!(v4(&trie, "10.0.0.1"), Some(cc("BB")));
        assert_eq!(trie.prefix_count(), 1);
    }

    #[test]
    fn test_node_sharing_along_common_path() {
        let pairs = [
            ("128.0.0.0/2".parse().unwrap(), cc("AA")),
            ("128.0.0.0/3".parse().unwrap(), cc("BB")),
        ];
        let trie = RadixTrie::build_v4(&pairs);
        // Root plus one node per distinct path bit
        assert_eq!(trie.node_count(), 4);
        assert_eq!(trie.prefix_count(), 2);
        assert_eq!(v4(&trie, "128.1.0.0"), Some(cc("BB")));
        assert_eq!(v4(&trie, "176.0.0.0"), Some(cc("AA")));
    }
}
