//! Network catalog module.
//!
//! Read access to the floating IPs and internal ports that forwarding rules
//! reference. Both are owned by other services; the registry only looks
//! them up.

use std::collections::HashMap;
use std::net::IpAddr;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// A floating IP as seen by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingIp {
    pub id: Uuid,
    /// The externally reachable address
    pub address: IpAddr,
    /// Port bound to this floating IP through 1:1 NAT, if any
    pub port_id: Option<Uuid>,
}

impl FloatingIp {
    pub fn new(id: Uuid, address: IpAddr) -> Self {
        Self {
            id,
            address,
            port_id: None,
        }
    }

    pub fn with_port(mut self, port_id: Uuid) -> Self {
        self.port_id = Some(port_id);
        self
    }
}

/// An internal port and the fixed addresses currently bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalPort {
    pub id: Uuid,
    pub fixed_ips: Vec<IpAddr>,
}

impl InternalPort {
    pub fn new(id: Uuid, fixed_ips: Vec<IpAddr>) -> Self {
        Self { id, fixed_ips }
    }

    pub fn has_address(&self, address: &IpAddr) -> bool {
        self.fixed_ips.contains(address)
    }
}

/// Lookup interface for floating IPs and internal ports.
pub trait NetworkCatalog: Send + Sync {
    /// Look up a floating IP. `Ok(None)` if it does not exist.
    fn floating_ip(&self, id: &Uuid) -> Result<Option<FloatingIp>>;

    /// Look up an internal port. `Ok(None)` if it does not exist.
    fn port(&self, id: &Uuid) -> Result<Option<InternalPort>>;
}

/// In-memory catalog.
pub struct MemoryCatalog {
    floating_ips: RwLock<HashMap<Uuid, FloatingIp>>,
    ports: RwLock<HashMap<Uuid, InternalPort>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            floating_ips: RwLock::new(HashMap::new()),
            ports: RwLock::new(HashMap::new()),
        }
    }

    /// Add or replace a floating IP.
    pub fn add_floating_ip(&self, fip: FloatingIp) {
        self.floating_ips.write().insert(fip.id, fip);
    }

    /// Add or replace a port.
    pub fn add_port(&self, port: InternalPort) {
        self.ports.write().insert(port.id, port);
    }

    pub fn remove_floating_ip(&self, id: &Uuid) -> Option<FloatingIp> {
        self.floating_ips.write().remove(id)
    }

    pub fn remove_port(&self, id: &Uuid) -> Option<InternalPort> {
        self.ports.write().remove(id)
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkCatalog for MemoryCatalog {
    fn floating_ip(&self, id: &Uuid) -> Result<Option<FloatingIp>> {
        Ok(self.floating_ips.read().get(id).cloned())
    }

    fn port(&self, id: &Uuid) -> Result<Option<InternalPort>> {
        Ok(self.ports.read().get(id).cloned())
    }
}
