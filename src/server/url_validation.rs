use crate::error::RelayError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Check that a `destination` is something the relay may fetch.
///
/// Only absolute `http://` / `https://` URLs with a host pass. Unless
/// `allow_private` is set, IP literals in loopback, private, link-local or
/// unspecified ranges are refused. Hostnames are not resolved, so a public
/// name pointing at a private address still gets through.
///
/// # Errors
/// [`RelayError::InvalidDestination`] describing the first failed check.
pub fn validate_destination(destination: &str, allow_private: bool) -> Result<(), RelayError> {
    let parsed = Url::parse(destination)
        .map_err(|e| RelayError::InvalidDestination(format!("{destination}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(RelayError::InvalidDestination(format!(
            "scheme '{}' not allowed, only http/https",
            parsed.scheme()
        )));
    }

    let ip = match parsed.host() {
        None => {
            return Err(RelayError::InvalidDestination(format!(
                "no host in {destination}"
            )));
        }
        Some(Host::Domain(_)) => return Ok(()),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip),
    };

    if !allow_private && is_internal(ip) {
        return Err(RelayError::InvalidDestination(format!(
            "internal address {ip} not allowed"
        )));
    }

    Ok(())
}

fn is_internal(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_internal_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_internal_v4(v4),
            None => is_internal_v6(v6),
        },
    }
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.octets()[0] == 0
}

fn is_internal_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xffc0) == 0xfe80 // link-local
        || (first & 0xfe00) == 0xfc00 // unique-local
}
