//! Network helpers.
//!
//! - `address_range`: IPv4/IPv6 address and CIDR to integer interval codec.

pub mod address_range;

pub use address_range::{AddressRange, IpFamily};
