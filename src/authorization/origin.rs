use std::net::{IpAddr, SocketAddr};

use log::warn;

use crate::error_handling::types::{AuthError, CodecError};
use crate::network::address_range::AddressRange;

/// Network origins allowed to perform destructive operations.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    trusted: Vec<AddressRange>,
}

impl OriginPolicy {
    /// Builds the policy from address or CIDR literals.
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Result<Self, CodecError> {
        let trusted = entries
            .iter()
            .map(|e| AddressRange::encode(e.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { trusted })
    }

    pub fn is_trusted(&self, ip: IpAddr) -> bool {
        // IPv4 clients seen through a dual-stack socket arrive as ::ffff:a.b.c.d
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
            IpAddr::V4(_) => ip,
        };
        self.trusted.iter().any(|range| range.contains_ip(ip))
    }

    /// Rejects a request whose remote address is unknown or outside every trusted range.
    pub fn authorize(&self, remote: Option<SocketAddr>) -> Result<(), AuthError> {
        match remote {
            Some(addr) if self.is_trusted(addr.ip()) => Ok(()),
            Some(addr) => {
                warn!("refused destructive request from {}", addr.ip());
                Err(AuthError::ForbiddenOrigin(addr.ip().to_string()))
            }
            None => Err(AuthError::ForbiddenOrigin("unknown".into())),
        }
    }
}
