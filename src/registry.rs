//! Registry module.
//!
//! The only component with business-rule authority over forwarding rules.
//! Each operation validates its input, reads a fresh snapshot from the store,
//! runs the conflict checker and writes atomically. The registry keeps no
//! rule state between calls and takes no lock of its own: the store's unique
//! indexes and compare-and-swap close the window between check and write,
//! and transient store failures re-run the whole sequence.

use std::net::IpAddr;
use std::num::NonZeroU16;
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{FloatingIp, InternalPort, NetworkCatalog};
use crate::conflict::check_conflicts;
use crate::error::{ConflictKind, PortFwError, ResourceKind, Result};
use crate::options::RegistryOptions;
use crate::query::{Fields, ListQuery, Listing, Record};
use crate::store::{RuleScope, RuleStore};
use crate::types::{PortForwarding, PortForwardingCreate, PortForwardingUpdate};

/// Maximum length of a rule description, in characters
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// Port forwarding rule registry.
///
/// Cheap to clone; clones share the injected store and catalog.
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn RuleStore>,
    catalog: Arc<dyn NetworkCatalog>,
    options: RegistryOptions,
}

impl Registry {
    /// Create a registry over a store and a catalog with default options.
    pub fn new(store: Arc<dyn RuleStore>, catalog: Arc<dyn NetworkCatalog>) -> Self {
        Self {
            store,
            catalog,
            options: RegistryOptions::default(),
        }
    }

    /// Replace the options.
    pub fn with_options(mut self, options: RegistryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Create a rule on `floating_ip_id`.
    pub fn create(
        &self,
        floating_ip_id: Uuid,
        input: PortForwardingCreate,
    ) -> Result<PortForwarding> {
        let fip = self.usable_floating_ip(&floating_ip_id)?;

        let internal_port_id = required(input.internal_port_id, "internal_port_id")?;
        let internal_port =
            validate_port("internal_port", required(input.internal_port, "internal_port")?)?;
        let external_port =
            validate_port("external_port", required(input.external_port, "external_port")?)?;
        let protocol = required(input.protocol, "protocol")?;
        let description = validate_description(input.description.unwrap_or_default())?;

        let port = self.internal_port(&internal_port_id)?;
        let internal_ip_address = resolve_internal_address(&port, input.internal_ip_address)?;
        check_address_family(&fip, &internal_ip_address)?;

        let candidate = PortForwarding {
            id: Uuid::new_v4(),
            floating_ip_id,
            internal_port_id,
            internal_ip_address,
            internal_port,
            external_port,
            protocol,
            description,
            revision_number: 1,
        };
        debug!(rule = %candidate, "creating port forwarding");

        self.with_retries("create", || {
            let existing = self.snapshot_for(&candidate)?;
            check_conflicts(&candidate, &existing)?;
            self.store.insert(candidate.clone())?;
            Ok(())
        })?;

        info!(rule = %candidate, "created port forwarding");
        Ok(candidate)
    }

    /// Apply `input` to rule `rule_id` of `floating_ip_id`.
    ///
    /// Fields left unset keep their stored values. An update that changes
    /// nothing returns the stored rule without writing.
    pub fn update(
        &self,
        floating_ip_id: Uuid,
        rule_id: Uuid,
        input: PortForwardingUpdate,
    ) -> Result<PortForwarding> {
        let fip = self.usable_floating_ip(&floating_ip_id)?;

        let internal_port = input
            .internal_port
            .map(|p| validate_port("internal_port", p))
            .transpose()?;
        let external_port = input
            .external_port
            .map(|p| validate_port("external_port", p))
            .transpose()?;
        let description = input.description.clone().map(validate_description).transpose()?;

        let updated = self.with_retries("update", || {
            let current = self.owned_rule(&floating_ip_id, &rule_id)?;

            let internal_port_id = input.internal_port_id.unwrap_or(current.internal_port_id);
            let port = self.internal_port(&internal_port_id)?;
            // a new port gets its address re-resolved unless one is given
            let requested = match input.internal_ip_address {
                Some(address) => Some(address),
                None if internal_port_id == current.internal_port_id => {
                    Some(current.internal_ip_address)
                }
                None => None,
            };
            let internal_ip_address = resolve_internal_address(&port, requested)?;
            check_address_family(&fip, &internal_ip_address)?;

            let merged = PortForwarding {
                internal_port_id,
                internal_ip_address,
                internal_port: internal_port.unwrap_or(current.internal_port),
                external_port: external_port.unwrap_or(current.external_port),
                protocol: input.protocol.unwrap_or(current.protocol),
                description: description
                    .clone()
                    .unwrap_or_else(|| current.description.clone()),
                revision_number: current.revision_number + 1,
                ..current.clone()
            };
            if merged.same_attributes(&current) {
                debug!(rule = %current, "update changes nothing");
                return Ok(current);
            }

            let existing = self.snapshot_for(&merged)?;
            check_conflicts(&merged, &existing)?;
            self.store
                .compare_and_swap(merged.clone(), current.revision_number)?;
            info!(rule = %merged, revision = merged.revision_number, "updated port forwarding");
            Ok(merged)
        })?;

        Ok(updated)
    }

    /// Delete rule `rule_id` of `floating_ip_id`.
    pub fn delete(&self, floating_ip_id: Uuid, rule_id: Uuid) -> Result<()> {
        self.floating_ip(&floating_ip_id)?;
        self.owned_rule(&floating_ip_id, &rule_id)?;

        match self.store.delete(&rule_id)? {
            Some(rule) => {
                info!(rule = %rule, "deleted port forwarding");
                Ok(())
            }
            None => Err(PortFwError::not_found(ResourceKind::PortForwarding, rule_id)),
        }
    }

    /// Fetch rule `rule_id` of `floating_ip_id`.
    pub fn get(&self, floating_ip_id: Uuid, rule_id: Uuid) -> Result<PortForwarding> {
        self.floating_ip(&floating_ip_id)?;
        self.owned_rule(&floating_ip_id, &rule_id)
    }

    /// Fetch rule `rule_id` of `floating_ip_id`, projected to `fields`.
    pub fn show(&self, floating_ip_id: Uuid, rule_id: Uuid, fields: &Fields) -> Result<Record> {
        let rule = self.get(floating_ip_id, rule_id)?;
        Ok(fields.project(&rule))
    }

    /// List the rules of `floating_ip_id`.
    ///
    /// Each call reads a new snapshot; the returned iterator projects
    /// records as it goes.
    pub fn list(&self, floating_ip_id: Uuid, query: &ListQuery) -> Result<Listing> {
        self.floating_ip(&floating_ip_id)?;
        let rules = self.store.list(RuleScope::FloatingIp(floating_ip_id))?;
        let selected = query.select(rules)?;
        Ok(Listing::new(selected, query.fields.clone()))
    }

    /// Remove every rule forwarding to `port_id`. Call when the port is deleted.
    pub fn purge_internal_port(&self, port_id: Uuid) -> Result<usize> {
        self.purge(RuleScope::InternalPort(port_id))
    }

    /// Remove every rule of `floating_ip_id`. Call when the floating IP is released.
    pub fn purge_floating_ip(&self, floating_ip_id: Uuid) -> Result<usize> {
        self.purge(RuleScope::FloatingIp(floating_ip_id))
    }

    fn purge(&self, scope: RuleScope) -> Result<usize> {
        let mut removed = 0;
        for rule in self.store.list(scope)? {
            if self.store.delete(&rule.id)?.is_some() {
                removed += 1;
            }
        }
        info!(?scope, removed, "purged port forwardings");
        Ok(removed)
    }

    /// Run `attempt` until it succeeds, fails for a non-transient reason, or
    /// the retry budget is spent.
    fn with_retries<T>(&self, op: &'static str, mut attempt: impl FnMut() -> Result<T>) -> Result<T> {
        let mut interval = self.options.retry_interval;
        let mut retries = 0u32;
        loop {
            match attempt() {
                Err(PortFwError::Store(e)) if e.is_retriable() => {
                    if retries >= self.options.max_retries {
                        warn!(op, retries, error = %e, "giving up after transient store failures");
                        return Err(PortFwError::conflict(
                            ConflictKind::ConcurrentModification,
                            format!("{} did not complete after {} retries: {}", op, retries, e),
                        ));
                    }
                    retries += 1;
                    debug!(op, retry = retries, error = %e, "retrying after transient store failure");
                    if !interval.is_zero() {
                        thread::sleep(interval);
                    }
                    interval = self.options.next_interval(interval);
                }
                result => return result,
            }
        }
    }

    /// Rules that `candidate` could collide with: those on its floating IP
    /// and those forwarding to its internal port.
    fn snapshot_for(&self, candidate: &PortForwarding) -> Result<Vec<PortForwarding>> {
        let mut rules = self
            .store
            .list(RuleScope::FloatingIp(candidate.floating_ip_id))?;
        for rule in self
            .store
            .list(RuleScope::InternalPort(candidate.internal_port_id))?
        {
            if rule.floating_ip_id != candidate.floating_ip_id {
                rules.push(rule);
            }
        }
        Ok(rules)
    }

    fn floating_ip(&self, id: &Uuid) -> Result<FloatingIp> {
        self.catalog
            .floating_ip(id)?
            .ok_or_else(|| PortFwError::not_found(ResourceKind::FloatingIp, id))
    }

    /// A floating IP that exists and is free of 1:1 NAT.
    fn usable_floating_ip(&self, id: &Uuid) -> Result<FloatingIp> {
        let fip = self.floating_ip(id)?;
        if let Some(port_id) = fip.port_id {
            return Err(PortFwError::conflict(
                ConflictKind::FloatingIpAssociated,
                format!(
                    "floating IP {} is associated with port {} and cannot carry port forwardings",
                    fip.id, port_id
                ),
            ));
        }
        Ok(fip)
    }

    fn internal_port(&self, id: &Uuid) -> Result<InternalPort> {
        self.catalog
            .port(id)?
            .ok_or_else(|| PortFwError::not_found(ResourceKind::InternalPort, id))
    }

    /// The rule `rule_id`, provided it belongs to `floating_ip_id`.
    fn owned_rule(&self, floating_ip_id: &Uuid, rule_id: &Uuid) -> Result<PortForwarding> {
        match self.store.get(rule_id)? {
            Some(rule) if rule.floating_ip_id == *floating_ip_id => Ok(rule),
            _ => Err(PortFwError::not_found(ResourceKind::PortForwarding, rule_id)),
        }
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| PortFwError::InvalidInput(format!("Missing required attribute: {}", name)))
}

fn validate_port(name: &str, value: u32) -> Result<NonZeroU16> {
    u16::try_from(value)
        .ok()
        .and_then(NonZeroU16::new)
        .ok_or_else(|| {
            PortFwError::InvalidInput(format!(
                "Invalid {} {}: must be in range 1-65535",
                name, value
            ))
        })
}

fn validate_description(description: String) -> Result<String> {
    let len = description.chars().count();
    if len > MAX_DESCRIPTION_LEN {
        return Err(PortFwError::InvalidInput(format!(
            "Description is {} characters long, the maximum is {}",
            len, MAX_DESCRIPTION_LEN
        )));
    }
    Ok(description)
}

/// Pick the internal address: the requested one if bound to `port`, else the
/// port's only fixed address.
fn resolve_internal_address(port: &InternalPort, requested: Option<IpAddr>) -> Result<IpAddr> {
    match requested {
        Some(address) if port.has_address(&address) => Ok(address),
        Some(address) => Err(PortFwError::InvalidInput(format!(
            "Address {} is not bound to port {}",
            address, port.id
        ))),
        None => match port.fixed_ips.as_slice() {
            [only] => Ok(*only),
            [] => Err(PortFwError::InvalidInput(format!(
                "Port {} has no fixed address to forward to",
                port.id
            ))),
            _ => Err(PortFwError::InvalidInput(format!(
                "Port {} has several fixed addresses; internal_ip_address is required",
                port.id
            ))),
        },
    }
}

fn check_address_family(fip: &FloatingIp, internal: &IpAddr) -> Result<()> {
    if fip.address.is_ipv4() != internal.is_ipv4() {
        return Err(PortFwError::InvalidInput(format!(
            "Cannot forward from {} to {}: address families differ",
            fip.address, internal
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(addrs: &[&str]) -> InternalPort {
        InternalPort::new(
            Uuid::new_v4(),
            addrs.iter().map(|a| a.parse().unwrap()).collect(),
        )
    }

    #[test]
    fn test_validate_port_range() {
        assert_eq!(validate_port("internal_port", 1).unwrap().get(), 1);
        assert_eq!(validate_port("internal_port", 65535).unwrap().get(), 65535);
        assert!(validate_port("internal_port", 0).is_err());
        assert!(validate_port("internal_port", 65536).is_err());
    }

    #[test]
    fn test_validate_description_length() {
        assert!(validate_description("a".repeat(MAX_DESCRIPTION_LEN)).is_ok());
        assert!(validate_description("a".repeat(MAX_DESCRIPTION_LEN + 1)).is_err());
        // characters, not bytes
        assert!(validate_description("é".repeat(MAX_DESCRIPTION_LEN)).is_ok());
    }

    #[test]
    fn test_resolve_default_address() {
        let p = port(&["10.0.0.5"]);
        assert_eq!(
            resolve_internal_address(&p, None).unwrap(),
            "10.0.0.5".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_resolve_ambiguous_address() {
        let p = port(&["10.0.0.5", "10.0.0.6"]);
        assert!(matches!(
            resolve_internal_address(&p, None),
            Err(PortFwError::InvalidInput(_))
        ));
        assert_eq!(
            resolve_internal_address(&p, Some("10.0.0.6".parse().unwrap())).unwrap(),
            "10.0.0.6".parse::<IpAddr>().unwrap()
        );

        let empty = port(&[]);
        assert!(resolve_internal_address(&empty, None).is_err());
    }

    #[test]
    fn test_resolve_rejects_foreign_address() {
        let p = port(&["10.0.0.5"]);
        assert!(matches!(
            resolve_internal_address(&p, Some("10.0.0.99".parse().unwrap())),
            Err(PortFwError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_address_family() {
        let fip = FloatingIp::new(Uuid::new_v4(), "203.0.113.10".parse().unwrap());
        assert!(check_address_family(&fip, &"10.0.0.5".parse().unwrap()).is_ok());
        assert!(check_address_family(&fip, &"fd00::5".parse().unwrap()).is_err());
    }
}
