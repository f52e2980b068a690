//! Trusted-subnet admission.
//!
//! An empty configuration admits every sender. When a CIDR is configured,
//! the claimed source address must parse and fall inside it; anything
//! malformed is treated as untrusted.

use crate::error::{Result, VigilError};
use ipnet::IpNet;
use std::net::IpAddr;
use std::str::FromStr;

#[derive(Debug, Clone, Default)]
pub struct TrustedSubnet {
    net: Option<IpNet>,
}

impl TrustedSubnet {
    /// Parse a CIDR spec. An empty (or whitespace) spec disables admission
    /// checks; a malformed one is a configuration error.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Ok(Self { net: None });
        }
        let net = IpNet::from_str(spec).map_err(|e| VigilError::Config {
            reason: format!("invalid trusted subnet {spec:?}: {e}"),
        })?;
        Ok(Self { net: Some(net) })
    }

    /// True when no subnet is configured.
    pub fn is_open(&self) -> bool {
        self.net.is_none()
    }

    /// Whether a claimed source address is admitted.
    pub fn allows(&self, ip: &str) -> bool {
        let Some(net) = &self.net else { return true };
        match IpAddr::from_str(ip.trim()) {
            Ok(addr) => net.contains(&addr),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_spec_admits_everything() {
        let subnet = TrustedSubnet::parse("").unwrap();
        assert!(subnet.is_open());
        assert!(subnet.allows("203.0.113.9"));
        assert!(subnet.allows(""));
    }

    #[test]
    fn cidr_admits_inside_and_rejects_outside() {
        let subnet = TrustedSubnet::parse("127.0.0.0/8").unwrap();
        assert!(subnet.allows("127.0.0.1"));
        assert!(subnet.allows("127.255.255.254"));
        assert!(!subnet.allows("192.168.1.1"));
    }

    #[test]
    fn malformed_claimed_ip_is_rejected() {
        let subnet = TrustedSubnet::parse("10.0.0.0/24").unwrap();
        assert!(!subnet.allows(""));
        assert!(!subnet.allows("not-an-ip"));
    }

    #[test]
    fn malformed_cidr_is_a_config_error() {
        assert!(TrustedSubnet::parse("10.0.0.0/99").is_err());
    }
}
