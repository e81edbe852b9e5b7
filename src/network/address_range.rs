//! # Address-Range Codec
//!
//! Converts IPv4/IPv6 addresses and CIDR blocks into inclusive integer intervals so that
//! decisions can be matched against point (`ip=`) and range (`range=`) filters with plain
//! integer comparisons.
//!
//! IPv4 and IPv6 live in two disjoint numeric spaces: every [`AddressRange`] is tagged with
//! its [`IpFamily`] and no comparison ever crosses families.
//!
//! ## Storage columns
//!
//! SQLite integers are signed 64-bit, so each bound is stored as a `(high, low)` pair:
//!
//! ```text
//! IPv4:  high = address as integer          low = 0
//! IPv6:  high = upper 64 bits ^ sign bit    low = lower 64 bits ^ sign bit
//! ```
//!
//! Flipping the sign bit keeps the unsigned order under signed comparison, so a
//! lexicographic `(high, low)` comparison in SQL orders addresses correctly.

use std::net::IpAddr;

use crate::error_handling::types::CodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Address size in bytes, as persisted in the `ip_size` column.
    pub fn size(self) -> i32 {
        match self {
            IpFamily::V4 => 4,
            IpFamily::V6 => 16,
        }
    }

    pub fn from_size(size: i32) -> Option<Self> {
        match size {
            4 => Some(IpFamily::V4),
            16 => Some(IpFamily::V6),
            _ => None,
        }
    }

    fn bits(self) -> u32 {
        match self {
            IpFamily::V4 => 32,
            IpFamily::V6 => 128,
        }
    }
}

/// An inclusive interval `[start, end]` of addresses of a single family.
///
/// IPv4 values occupy the low 32 bits of `start`/`end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    pub family: IpFamily,
    pub start: u128,
    pub end: u128,
}

impl AddressRange {
    /// Encodes either a bare address or a CIDR block.
    ///
    /// A literal containing `/` is treated as a CIDR and fails with
    /// [`CodecError::InvalidRangeFormat`]; anything else must be an address and fails with
    /// [`CodecError::InvalidAddressFormat`].
    pub fn encode(value: &str) -> Result<Self, CodecError> {
        if value.contains('/') {
            Self::from_cidr(value)
        } else {
            Self::from_address(value)
        }
    }

    /// Encodes a single address into a point interval.
    pub fn from_address(value: &str) -> Result<Self, CodecError> {
        value
            .trim()
            .parse::<IpAddr>()
            .map(Self::from_ip)
            .map_err(|_| CodecError::InvalidAddressFormat(value.to_string()))
    }

    /// Encodes a CIDR block into the interval it spans. Host bits are masked off.
    pub fn from_cidr(value: &str) -> Result<Self, CodecError> {
        let invalid = || CodecError::InvalidRangeFormat(value.to_string());

        let (addr, prefix) = value.trim().split_once('/').ok_or_else(invalid)?;
        let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
        let prefix: u32 = prefix.parse().map_err(|_| invalid())?;

        let point = Self::from_ip(addr);
        let bits = point.family.bits();
        if prefix > bits {
            return Err(invalid());
        }

        // Mask over the family width only; IPv4 values never touch the upper 96 bits.
        let width_mask = if bits == 128 {
            u128::MAX
        } else {
            (1u128 << bits) - 1
        };
        let host_mask = match bits - prefix {
            0 => 0,
            128 => u128::MAX,
            host_bits => (1u128 << host_bits) - 1,
        };
        let start = point.start & !host_mask & width_mask;
        let end = start | host_mask;

        Ok(Self {
            family: point.family,
            start,
            end,
        })
    }

    pub fn from_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => {
                let value = u32::from(v4) as u128;
                Self {
                    family: IpFamily::V4,
                    start: value,
                    end: value,
                }
            }
            IpAddr::V6(v6) => {
                let value = u128::from(v6);
                Self {
                    family: IpFamily::V6,
                    start: value,
                    end: value,
                }
            }
        }
    }

    #[cfg(test)]
    pub fn is_point(&self) -> bool {
        self.start == self.end
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &AddressRange) -> bool {
        self.family == other.family && self.start <= other.start && other.end <= self.end
    }

    pub fn contains_ip(&self, ip: IpAddr) -> bool {
        self.contains(&Self::from_ip(ip))
    }

    /// True when the two intervals share at least one address.
    pub fn overlaps(&self, other: &AddressRange) -> bool {
        self.family == other.family && self.start <= other.end && other.start <= self.end
    }

    #[cfg(test)]
    pub fn start_ip(&self) -> IpAddr {
        self.family.to_ip(self.start)
    }

    #[cfg(test)]
    pub fn end_ip(&self) -> IpAddr {
        self.family.to_ip(self.end)
    }

    /// `(high, low)` storage columns for the start bound.
    pub fn start_columns(&self) -> (i64, i64) {
        self.family.encode_columns(self.start)
    }

    /// `(high, low)` storage columns for the end bound.
    pub fn end_columns(&self) -> (i64, i64) {
        self.family.encode_columns(self.end)
    }

    /// Rebuilds a range from its persisted columns.
    pub fn from_columns(size: i32, start: (i64, i64), end: (i64, i64)) -> Option<Self> {
        let family = IpFamily::from_size(size)?;
        let start = family.decode_columns(start)?;
        let end = family.decode_columns(end)?;
        if start > end {
            return None;
        }
        Some(Self { family, start, end })
    }
}

impl IpFamily {
    #[cfg(test)]
    fn to_ip(self, value: u128) -> IpAddr {
        match self {
            IpFamily::V4 => IpAddr::V4(std::net::Ipv4Addr::from(value as u32)),
            IpFamily::V6 => IpAddr::V6(std::net::Ipv6Addr::from(value)),
        }
    }

    fn encode_columns(self, value: u128) -> (i64, i64) {
        match self {
            IpFamily::V4 => (value as i64, 0),
            IpFamily::V6 => {
                let high = ((value >> 64) as u64 as i64) ^ i64::MIN;
                let low = (value as u64 as i64) ^ i64::MIN;
                (high, low)
            }
        }
    }

    fn decode_columns(self, (high, low): (i64, i64)) -> Option<u128> {
        match self {
            IpFamily::V4 => {
                if !(0..=u32::MAX as i64).contains(&high) || low != 0 {
                    return None;
                }
                Some(high as u128)
            }
            IpFamily::V6 => {
                let high = (high ^ i64::MIN) as u64 as u128;
                let low = (low ^ i64::MIN) as u64 as u128;
                Some((high << 64) | low)
            }
        }
    }
}
