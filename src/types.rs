use std::fmt;
use std::net::IpAddr;
use std::num::NonZeroU16;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PortFwError;

/// Transport protocol of a forwarding rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    TCP,
    UDP,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::TCP => "tcp",
            Protocol::UDP => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = PortFwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tcp" => Ok(Protocol::TCP),
            "udp" => Ok(Protocol::UDP),
            other => Err(PortFwError::InvalidInput(format!(
                "Unknown protocol: {}",
                other
            ))),
        }
    }
}

/// A stored port forwarding rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForwarding {
    pub id: Uuid,
    pub floating_ip_id: Uuid,
    pub internal_port_id: Uuid,
    pub internal_ip_address: IpAddr,
    pub internal_port: NonZeroU16,
    pub external_port: NonZeroU16,
    pub protocol: Protocol,
    #[serde(default)]
    pub description: String,
    pub revision_number: u64,
}

impl PortForwarding {
    /// Key that must be unique among the rules of one floating IP.
    pub fn external_key(&self) -> ExternalKey {
        ExternalKey {
            floating_ip_id: self.floating_ip_id,
            external_port: self.external_port,
            protocol: self.protocol,
        }
    }

    /// Key that must be unique across all rules.
    pub fn internal_key(&self) -> InternalKey {
        InternalKey {
            internal_port_id: self.internal_port_id,
            internal_ip_address: self.internal_ip_address,
            internal_port: self.internal_port,
            protocol: self.protocol,
        }
    }

    /// Compare every user-visible attribute except the revision.
    pub(crate) fn same_attributes(&self, other: &PortForwarding) -> bool {
        self.internal_port_id == other.internal_port_id
            && self.internal_ip_address == other.internal_ip_address
            && self.internal_port == other.internal_port
            && self.external_port == other.external_port
            && self.protocol == other.protocol
            && self.description == other.description
    }
}

impl fmt::Display for PortForwarding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fip {}:{}/{} -> port {} {}:{}",
            self.id,
            self.floating_ip_id,
            self.external_port,
            self.protocol,
            self.internal_port_id,
            self.internal_ip_address,
            self.internal_port
        )
    }
}

/// `(floating_ip_id, external_port, protocol)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalKey {
    pub floating_ip_id: Uuid,
    pub external_port: NonZeroU16,
    pub protocol: Protocol,
}

/// `(internal_port_id, internal_ip_address, internal_port, protocol)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InternalKey {
    pub internal_port_id: Uuid,
    pub internal_ip_address: IpAddr,
    pub internal_port: NonZeroU16,
    pub protocol: Protocol,
}

/// Fields accepted when creating a rule.
///
/// Ports are kept wide so out-of-range values are reported by validation
/// rather than by deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortForwardingCreate {
    pub internal_port_id: Option<Uuid>,
    pub internal_ip_address: Option<IpAddr>,
    pub internal_port: Option<u32>,
    pub external_port: Option<u32>,
    pub protocol: Option<Protocol>,
    pub description: Option<String>,
}

impl PortForwardingCreate {
    /// Create input with all required fields set.
    pub fn new(internal_port_id: Uuid, internal_port: u32, external_port: u32, protocol: Protocol) -> Self {
        Self {
            internal_port_id: Some(internal_port_id),
            internal_port: Some(internal_port),
            external_port: Some(external_port),
            protocol: Some(protocol),
            ..Self::default()
        }
    }

    pub fn with_internal_ip_address(mut self, address: IpAddr) -> Self {
        self.internal_ip_address = Some(address);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial fields accepted when updating a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortForwardingUpdate {
    pub internal_port_id: Option<Uuid>,
    pub internal_ip_address: Option<IpAddr>,
    pub internal_port: Option<u32>,
    pub external_port: Option<u32>,
    pub protocol: Option<Protocol>,
    pub description: Option<String>,
}

impl PortForwardingUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn internal_port_id(mut self, id: Uuid) -> Self {
        self.internal_port_id = Some(id);
        self
    }

    pub fn internal_ip_address(mut self, address: IpAddr) -> Self {
        self.internal_ip_address = Some(address);
        self
    }

    pub fn internal_port(mut self, port: u32) -> Self {
        self.internal_port = Some(port);
        self
    }

    pub fn external_port(mut self, port: u32) -> Self {
        self.external_port = Some(port);
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_from_str() {
        assert_eq!("tcp".parse::<Protocol>().unwrap(), Protocol::TCP);
        assert_eq!(" UDP ".parse::<Protocol>().unwrap(), Protocol::UDP);
        assert!("icmp".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_protocol_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Protocol::TCP).unwrap(), "\"tcp\"");
        let p: Protocol = serde_json::from_str("\"udp\"").unwrap();
        assert_eq!(p, Protocol::UDP);
    }

    #[test]
    fn test_create_rejects_unknown_attribute() {
        let body = r#"{"internal_port": 80, "floating_ip_id": "00000000-0000-0000-0000-000000000000"}"#;
        assert!(serde_json::from_str::<PortForwardingCreate>(body).is_err());
    }

    #[test]
    fn test_create_accepts_out_of_range_port_for_validation() {
        let body = r#"{"internal_port": 70000, "protocol": "tcp"}"#;
        let input: PortForwardingCreate = serde_json::from_str(body).unwrap();
        assert_eq!(input.internal_port, Some(70000));
        assert_eq!(input.protocol, Some(Protocol::TCP));
    }
}
