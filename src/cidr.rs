//! CIDR prefix representation for both address families

// SPDX-License-Identifier: AGPL-3.0-or-later

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Error type for prefix construction and parsing
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
pub enum Error {
    #[error("invalid prefix syntax: {0:?}")]
    Syntax(String),
    #[error("prefix length {0} out of range for {1}")]
    Length(u8, Family),
    #[error("host bits set below /{1} in {0}")]
    HostBits(IpAddr, u8),
    #[error("range of {1} hosts from {0} exceeds the IPv4 space")]
    RangeOverflow(Ipv4Addr, u64),
}

/// IP address family tag
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// Address width in bits
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::V4 => 32,
            Self::V6 => 128,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => write!(f, "IPv4"),
            Self::V6 => write!(f, "IPv6"),
        }
    }
}

/// Netmask with the `prefix_len` high bits set
const fn netmask4(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len)
    }
}

const fn netmask6(prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - prefix_len)
    }
}

/// A IPv4 CIDR block
///
/// The address is expected to be the network address: host bits below
/// `prefix_len` must be zero. All parsing entry points enforce this.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Cidr4 {
    pub addr: Ipv4Addr,
    pub prefix_len: u8,
}

impl fmt::Display for Cidr4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl Cidr4 {
    #[must_use]
    pub const fn new(addr: Ipv4Addr, prefix_len: u8) -> Self {
        Self { addr, prefix_len }
    }

    /// Whether the host bits below the prefix length are all zero
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.prefix_len <= 32 && u32::from(self.addr) & !netmask4(self.prefix_len) == 0
    }

    /// Whether `ip` falls inside this block
    #[must_use]
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & netmask4(self.prefix_len) == u32::from(self.addr)
    }

    /// Decompose the address range `[start, start + count - 1]` into the
    /// unique minimal set of CIDR blocks covering exactly that range.
    ///
    /// Each step takes the largest power-of-two block that both starts
    /// aligned at the current address and fits in the remaining range, so
    /// non-power-of-two and misaligned delegations split into several
    /// blocks.
    pub fn from_host_range(start: Ipv4Addr, count: u64) -> Result<Vec<Self>, Error> {
        if count == 0 {
            return Err(Error::RangeOverflow(start, count));
        }
        let start_int = u64::from(u32::from(start));
        let end_int = start_int + count - 1;
        if end_int > u64::from(u32::MAX) {
            return Err(Error::RangeOverflow(start, count));
        }
        let mut cidrs = Vec::with_capacity(count.count_ones() as usize);
        let mut current = start_int;
        while current <= end_int {
            let align = if current == 0 {
                32
            } else {
                current.trailing_zeros().min(32)
            };
            // floor(log2(remaining)); remaining >= 1
            let fit = 63 - (end_int - current + 1).leading_zeros();
            let block_bits = align.min(fit);
            // This cast never truncates because block_bits is at most 32
            let prefix_len = 32 - block_bits as u8;
            cidrs.push(Self::new(Ipv4Addr::from(current as u32), prefix_len));
            current += 1u64 << block_bits;
        }
        Ok(cidrs)
    }
}

impl FromStr for Cidr4 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Cidr>()? {
            Cidr::V4(cidr) => Ok(cidr),
            Cidr::V6(_) => Err(Error::Syntax(s.to_string())),
        }
    }
}

/// A IPv6 CIDR block
///
/// Same canonical-form expectation as [`Cidr4`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Cidr6 {
    pub addr: Ipv6Addr,
    pub prefix_len: u8,
}

impl fmt::Display for Cidr6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl Cidr6 {
    #[must_use]
    pub const fn new(addr: Ipv6Addr, prefix_len: u8) -> Self {
        Self { addr, prefix_len }
    }

    /// Whether the host bits below the prefix length are all zero
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.prefix_len <= 128 && u128::from(self.addr) & !netmask6(self.prefix_len) == 0
    }

    /// Whether `ip` falls inside this block
    #[must_use]
    pub fn contains(&self, ip: Ipv6Addr) -> bool {
        u128::from(ip) & netmask6(self.prefix_len) == u128::from(self.addr)
    }
}

impl FromStr for Cidr6 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Cidr>()? {
            Cidr::V6(cidr) => Ok(cidr),
            Cidr::V4(_) => Err(Error::Syntax(s.to_string())),
        }
    }
}

/// A CIDR block of either family
///
/// The derived ordering sorts all IPv4 blocks before IPv6, then by numeric
/// network address, then by ascending prefix length, which is the order the
/// snapshot files use.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Cidr {
    V4(Cidr4),
    V6(Cidr6),
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4(cidr) => write!(f, "{cidr}"),
            Self::V6(cidr) => write!(f, "{cidr}"),
        }
    }
}

impl Cidr {
    #[must_use]
    pub const fn family(&self) -> Family {
        match self {
            Self::V4(_) => Family::V4,
            Self::V6(_) => Family::V6,
        }
    }

    #[must_use]
    pub const fn prefix_len(&self) -> u8 {
        match self {
            Self::V4(cidr) => cidr.prefix_len,
            Self::V6(cidr) => cidr.prefix_len,
        }
    }

    #[must_use]
    pub const fn into_parts(self) -> (IpAddr, u8) {
        match self {
            Self::V4(cidr) => (IpAddr::V4(cidr.addr), cidr.prefix_len),
            Self::V6(cidr) => (IpAddr::V6(cidr.addr), cidr.prefix_len),
        }
    }

    /// Whether `ip` falls inside this block (always false across families)
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self, ip) {
            (Self::V4(cidr), IpAddr::V4(ip)) => cidr.contains(ip),
            (Self::V6(cidr), IpAddr::V6(ip)) => cidr.contains(ip),
            _ => false,
        }
    }
}

impl From<Cidr4> for Cidr {
    fn from(cidr: Cidr4) -> Self {
        Self::V4(cidr)
    }
}

impl From<Cidr6> for Cidr {
    fn from(cidr: Cidr6) -> Self {
        Self::V6(cidr)
    }
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s.split_once('/').ok_or_else(|| Error::Syntax(s.to_string()))?;
        let prefix_len: u8 = len.parse().map_err(|_| Error::Syntax(s.to_string()))?;
        let addr: IpAddr = addr.parse().map_err(|_| Error::Syntax(s.to_string()))?;
        match addr {
            IpAddr::V4(a) => {
                if prefix_len > 32 {
                    return Err(Error::Length(prefix_len, Family::V4));
                }
                let cidr = Cidr4::new(a, prefix_len);
                if !cidr.is_canonical() {
                    return Err(Error::HostBits(addr, prefix_len));
                }
                Ok(Self::V4(cidr))
            }
            IpAddr::V6(a) => {
                if prefix_len > 128 {
                    return Err(Error::Length(prefix_len, Family::V6));
                }
                let cidr = Cidr6::new(a, prefix_len);
                if !cidr.is_canonical() {
                    return Err(Error::HostBits(addr, prefix_len));
                }
                Ok(Self::V6(cidr))
            }
        }
    }
}

impl Serialize for Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_host_range_power_of_two() {
        let cidrs = Cidr4::from_host_range(v4("103.37.72.0"), 1024).unwrap();
        assert_eq!(cidrs, vec![Cidr4::new(v4("103.37.72.0"), 22)]);
    }

    #[test]
    fn test_host_range_two_blocks() {
        // 4096 addresses starting on a /21 boundary split into two /21s
        let cidrs = Cidr4::from_host_range(v4("1.0.16.0"), 4096).unwrap();
        assert_eq!(
            cidrs,
            vec![Cidr4::new(v4("1.0.16.0"), 21), Cidr4::new(v4("1.0.24.0"), 21)]
        );
    }

    #[test]
    fn test_host_range_non_power_of_two() {
        let cidrs = Cidr4::from_host_range(v4("10.0.0.0"), 768).unwrap();
        assert_eq!(
            cidrs,
            vec![Cidr4::new(v4("10.0.0.0"), 23), Cidr4::new(v4("10.0.2.0"), 24)]
        );
    }

    #[test]
    fn test_host_range_misaligned_start() {
        // Alignment caps the block size even when more hosts would fit
        let cidrs = Cidr4::from_host_range(v4("1.0.0.8"), 16).unwrap();
        assert_eq!(
            cidrs,
            vec![Cidr4::new(v4("1.0.0.8"), 29), Cidr4::new(v4("1.0.0.16"), 29)]
        );
    }

    #[test]
    fn test_host_range_exact_coverage() {
        let start = v4("192.0.2.7");
        let count = 99;
        let cidrs = Cidr4::from_host_range(start, count).unwrap();
        // The union covers exactly [start, start + count - 1]
        let mut covered = 0u64;
        for cidr in &cidrs {
            assert!(cidr.is_canonical());
            covered += 1 << (32 - cidr.prefix_len);
        }
        assert_eq!(covered, count);
        let first = u32::from(start);
        assert!(cidrs[0].contains(start));
        assert!(cidrs.last().unwrap().contains(Ipv4Addr::from(first + 98)));
        assert!(!cidrs.iter().any(|c| c.contains(Ipv4Addr::from(first + 99))));
    }

    #[test]
    fn test_host_range_overflow() {
        assert!(Cidr4::from_host_range(v4("255.255.255.0"), 512).is_err());
        assert!(Cidr4::from_host_range(v4("0.0.0.0"), 0).is_err());
    }

    #[test]
    fn test_contains() {
        let cidr = Cidr4::new(v4("10.1.0.0"), 16);
        assert!(cidr.contains(v4("10.1.2.3")));
        assert!(!cidr.contains(v4("10.2.0.1")));
        let cidr6 = Cidr6::new("2a00::".parse().unwrap(), 12);
        assert!(cidr6.contains("2a00::1".parse().unwrap()));
        assert!(!cidr6.contains("2b00::1".parse().unwrap()));
    }

    #[test]
    fn test_parse_roundtrip() {
        for s in ["1.0.16.0/21", "0.0.0.0/0", "2a00::/12", "2001:db8::1/128"] {
            assert_eq!(s.parse::<Cidr>().unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_parse_rejects_host_bits() {
        assert_eq!(
            "10.0.0.1/24".parse::<Cidr>(),
            Err(Error::HostBits("10.0.0.1".parse().unwrap(), 24))
        );
        assert!("2a00::1/12".parse::<Cidr>().is_err());
    }

    #[test]
    fn test_parse_rejects_bad_length() {
        assert_eq!(
            "10.0.0.0/33".parse::<Cidr>(),
            Err(Error::Length(33, Family::V4))
        );
        assert!("2a00::/129".parse::<Cidr>().is_err());
        assert!("10.0.0.0".parse::<Cidr>().is_err());
        assert!("bogus/24".parse::<Cidr>().is_err());
    }

    #[test]
    fn test_ordering() {
        let mut cidrs: Vec<Cidr> = ["10.0.0.0/16", "2a00::/12", "10.0.0.0/8", "9.0.0.0/8"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        cidrs.sort();
        let sorted: Vec<String> = cidrs.iter().map(ToString::to_string).collect();
        assert_eq!(sorted, ["9.0.0.0/8", "10.0.0.0/8", "10.0.0.0/16", "2a00::/12"]);
    }
}
