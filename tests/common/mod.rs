//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use portfw_registry::{
    FloatingIp, InternalPort, MemoryCatalog, MemoryRuleStore, Registry, RegistryOptions, RuleStore,
};
use uuid::Uuid;

pub struct Fixture {
    pub catalog: Arc<MemoryCatalog>,
    pub store: Arc<MemoryRuleStore>,
    pub registry: Registry,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryRuleStore::new());
        Self::with_store(store.clone(), store)
    }

    /// Fixture whose registry writes through `store`; `memory` is the
    /// backing store for direct inspection.
    pub fn with_store(store: Arc<dyn RuleStore>, memory: Arc<MemoryRuleStore>) -> Self {
        let catalog = Arc::new(MemoryCatalog::new());
        let registry = Registry::new(store, catalog.clone()).with_options(fast_retries());
        Self {
            catalog,
            store: memory,
            registry,
        }
    }

    pub fn floating_ip(&self, address: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog
            .add_floating_ip(FloatingIp::new(id, address.parse().unwrap()));
        id
    }

    pub fn port(&self, addresses: &[&str]) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog.add_port(InternalPort::new(
            id,
            addresses.iter().map(|a| a.parse::<IpAddr>().unwrap()).collect(),
        ));
        id
    }
}

pub fn fast_retries() -> RegistryOptions {
    RegistryOptions::new().with_retry_interval(Duration::ZERO)
}
