//! Port forwarding registry - floating IP port forwarding rules with conflict resolution
//!
//! This library keeps the rules that map an external `(floating IP, port,
//! protocol)` onto an internal `(port, address, port number, protocol)`:
//! - Validation of ports, protocols and internal addresses
//! - Exclusive external ports per floating IP
//! - Exclusive internal endpoints across all floating IPs
//! - Optimistic concurrency with bounded retries
//! - Filtering, sorting, pagination and field projection for listings
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use portfw_registry::{
//!     FloatingIp, InternalPort, ListQuery, MemoryCatalog, MemoryRuleStore, PortForwardingCreate,
//!     Protocol, Registry, SortDir, Field,
//! };
//! use uuid::Uuid;
//!
//! let catalog = Arc::new(MemoryCatalog::new());
//! let fip_id = Uuid::new_v4();
//! let port_id = Uuid::new_v4();
//! catalog.add_floating_ip(FloatingIp::new(fip_id, "203.0.113.10".parse().unwrap()));
//! catalog.add_port(InternalPort::new(port_id, vec!["10.0.0.5".parse().unwrap()]));
//!
//! let registry = Registry::new(Arc::new(MemoryRuleStore::new()), catalog);
//!
//! // Forward 203.0.113.10:2222/tcp to 10.0.0.5:22
//! let rule = registry
//!     .create(fip_id, PortForwardingCreate::new(port_id, 22, 2222, Protocol::TCP))
//!     .unwrap();
//! assert_eq!(rule.internal_ip_address.to_string(), "10.0.0.5");
//!
//! // The same external port and protocol cannot be forwarded twice
//! let dup = registry.create(fip_id, PortForwardingCreate::new(port_id, 23, 2222, Protocol::TCP));
//! assert!(dup.is_err());
//!
//! let query = ListQuery::new().with_sort(Field::ExternalPort, SortDir::Asc);
//! assert_eq!(registry.list(fip_id, &query).unwrap().count(), 1);
//! ```
//!
//! # API
//!
//! | Method | Path | Success |
//! |--------|------|---------|
//! | GET | `/floatingips/{fip_id}/port_forwardings` | 200 |
//! | POST | `/floatingips/{fip_id}/port_forwardings` | 201 |
//! | GET | `/floatingips/{fip_id}/port_forwardings/{id}` | 200 |
//! | PUT | `/floatingips/{fip_id}/port_forwardings/{id}` | 200 |
//! | DELETE | `/floatingips/{fip_id}/port_forwardings/{id}` | 204 |
//!
//! Invalid input and conflicts are reported as 400, missing resources as 404.

pub mod api;
pub mod catalog;
pub mod conflict;
pub mod error;
pub mod options;
pub mod parser;
pub mod query;
pub mod registry;
pub mod store;
pub mod types;

// Re-export commonly used items
pub use api::{Api, ApiResponse, PortForwardingBody};
pub use catalog::{FloatingIp, InternalPort, MemoryCatalog, NetworkCatalog};
pub use conflict::check_conflicts;
pub use error::{ConflictKind, PortFwError, ResourceKind, Result, StoreError};
pub use options::{
    RegistryOptions, DEFAULT_MAX_RETRIES, DEFAULT_MAX_RETRY_INTERVAL, DEFAULT_RETRY_INTERVAL,
};
pub use parser::{parse_fields, parse_list_query};
pub use query::{Field, Fields, Filters, ListQuery, Listing, Record, SortDir, SortKey};
pub use registry::{Registry, MAX_DESCRIPTION_LEN};
pub use store::{MemoryRuleStore, RuleScope, RuleStore, StoreResult};
pub use types::{
    ExternalKey, InternalKey, PortForwarding, PortForwardingCreate, PortForwardingUpdate, Protocol,
};
