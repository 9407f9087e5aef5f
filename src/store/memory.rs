use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use super::{RuleScope, RuleStore, StoreResult};
use crate::error::StoreError;
use crate::types::{ExternalKey, InternalKey, PortForwarding};

const PRIMARY_INDEX: &str = "primary";
const EXTERNAL_INDEX: &str = "floating_ip_id_external_port_protocol";
const INTERNAL_INDEX: &str = "internal_port_id_address_port_protocol";

#[derive(Default)]
struct Tables {
    // insertion order is the iteration order
    rules: Vec<PortForwarding>,
    external: HashMap<ExternalKey, Uuid>,
    internal: HashMap<InternalKey, Uuid>,
}

impl Tables {
    fn position(&self, id: &Uuid) -> Option<usize> {
        self.rules.iter().position(|r| r.id == *id)
    }

    /// Check both unique indexes for `rule`, ignoring entries owned by `rule.id`.
    fn check_indexes(&self, rule: &PortForwarding) -> StoreResult<()> {
        if let Some(owner) = self.external.get(&rule.external_key()) {
            if *owner != rule.id {
                return Err(StoreError::DuplicateEntry {
                    index: EXTERNAL_INDEX,
                });
            }
        }
        if let Some(owner) = self.internal.get(&rule.internal_key()) {
            if *owner != rule.id {
                return Err(StoreError::DuplicateEntry {
                    index: INTERNAL_INDEX,
                });
            }
        }
        Ok(())
    }

    fn index(&mut self, rule: &PortForwarding) {
        self.external.insert(rule.external_key(), rule.id);
        self.internal.insert(rule.internal_key(), rule.id);
    }

    fn unindex(&mut self, rule: &PortForwarding) {
        self.external.remove(&rule.external_key());
        self.internal.remove(&rule.internal_key());
    }
}

/// In-memory rule store.
///
/// Each operation runs under a single lock acquisition, which makes every
/// write serializable with respect to the unique indexes.
pub struct MemoryRuleStore {
    tables: RwLock<Tables>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Number of stored rules
    pub fn len(&self) -> usize {
        self.tables.read().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleStore for MemoryRuleStore {
    fn get(&self, id: &Uuid) -> StoreResult<Option<PortForwarding>> {
        let tables = self.tables.read();
        Ok(tables.rules.iter().find(|r| r.id == *id).cloned())
    }

    fn list(&self, scope: RuleScope) -> StoreResult<Vec<PortForwarding>> {
        let tables = self.tables.read();
        Ok(tables
            .rules
            .iter()
            .filter(|r| scope.contains(r))
            .cloned()
            .collect())
    }

    fn insert(&self, rule: PortForwarding) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables.position(&rule.id).is_some() {
            return Err(StoreError::DuplicateEntry {
                index: PRIMARY_INDEX,
            });
        }
        tables.check_indexes(&rule)?;
        tables.index(&rule);
        tables.rules.push(rule);
        Ok(())
    }

    fn compare_and_swap(&self, rule: PortForwarding, expected_revision: u64) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let Some(pos) = tables.position(&rule.id) else {
            return Err(StoreError::StaleData {
                id: rule.id,
                expected: expected_revision,
                actual: None,
            });
        };

        let current = tables.rules[pos].revision_number;
        if current != expected_revision {
            return Err(StoreError::StaleData {
                id: rule.id,
                expected: expected_revision,
                actual: Some(current),
            });
        }

        tables.check_indexes(&rule)?;

        let old = std::mem::replace(&mut tables.rules[pos], rule.clone());
        tables.unindex(&old);
        tables.index(&rule);
        Ok(())
    }

    fn delete(&self, id: &Uuid) -> StoreResult<Option<PortForwarding>> {
        let mut tables = self.tables.write();
        let Some(pos) = tables.position(id) else {
            return Ok(None);
        };
        let rule = tables.rules.remove(pos);
        tables.unindex(&rule);
        Ok(Some(rule))
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU16;

    use super::*;
    use crate::types::Protocol;

    fn rule(fip: Uuid, port: Uuid, internal: u16, external: u16, proto: Protocol) -> PortForwarding {
        PortForwarding {
            id: Uuid::new_v4(),
            floating_ip_id: fip,
            internal_port_id: port,
            internal_ip_address: "10.0.0.5".parse().unwrap(),
            internal_port: NonZeroU16::new(internal).unwrap(),
            external_port: NonZeroU16::new(external).unwrap(),
            protocol: proto,
            description: String::new(),
            revision_number: 1,
        }
    }

    #[test]
    fn test_insert_and_list_scopes() {
        let store = MemoryRuleStore::new();
        let (f1, f2, p1, p2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let a = rule(f1, p1, 22, 2222, Protocol::TCP);
        let b = rule(f2, p1, 80, 8080, Protocol::TCP);
        let c = rule(f1, p2, 53, 5353, Protocol::UDP);
        store.insert(a.clone()).unwrap();
        store.insert(b.clone()).unwrap();
        store.insert(c.clone()).unwrap();

        let all = store.list(RuleScope::All).unwrap();
        assert_eq!(all, vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(store.list(RuleScope::FloatingIp(f1)).unwrap(), vec![a.clone(), c]);
        assert_eq!(store.list(RuleScope::InternalPort(p1)).unwrap(), vec![a, b]);
    }

    #[test]
    fn test_insert_rejects_external_duplicate() {
        let store = MemoryRuleStore::new();
        let fip = Uuid::new_v4();
        store
            .insert(rule(fip, Uuid::new_v4(), 22, 2222, Protocol::TCP))
            .unwrap();

        let err = store
            .insert(rule(fip, Uuid::new_v4(), 23, 2222, Protocol::TCP))
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::DuplicateEntry {
                index: EXTERNAL_INDEX
            }
        );

        // same port, other protocol is fine
        store
            .insert(rule(fip, Uuid::new_v4(), 23, 2222, Protocol::UDP))
            .unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_insert_rejects_internal_duplicate() {
        let store = MemoryRuleStore::new();
        let port = Uuid::new_v4();
        store
            .insert(rule(Uuid::new_v4(), port, 22, 2222, Protocol::TCP))
            .unwrap();

        let err = store
            .insert(rule(Uuid::new_v4(), port, 22, 3333, Protocol::TCP))
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::DuplicateEntry {
                index: INTERNAL_INDEX
            }
        );
    }

    #[test]
    fn test_compare_and_swap_checks_revision() {
        let store = MemoryRuleStore::new();
        let original = rule(Uuid::new_v4(), Uuid::new_v4(), 22, 2222, Protocol::TCP);
        store.insert(original.clone()).unwrap();

        let mut updated = original.clone();
        updated.external_port = NonZeroU16::new(2223).unwrap();
        updated.revision_number = 2;
        store.compare_and_swap(updated.clone(), 1).unwrap();
        assert_eq!(store.get(&original.id).unwrap(), Some(updated.clone()));

        // stale writer still holding revision 1
        let mut stale = original.clone();
        stale.external_port = NonZeroU16::new(2224).unwrap();
        stale.revision_number = 2;
        let err = store.compare_and_swap(stale, 1).unwrap_err();
        assert!(matches!(
            err,
            StoreError::StaleData {
                actual: Some(2),
                ..
            }
        ));
    }

    #[test]
    fn test_compare_and_swap_reindexes() {
        let store = MemoryRuleStore::new();
        let fip = Uuid::new_v4();
        let original = rule(fip, Uuid::new_v4(), 22, 2222, Protocol::TCP);
        store.insert(original.clone()).unwrap();

        let mut moved = original.clone();
        moved.external_port = NonZeroU16::new(3333).unwrap();
        moved.revision_number = 2;
        store.compare_and_swap(moved, 1).unwrap();

        // the old external port is free again
        store
            .insert(rule(fip, Uuid::new_v4(), 80, 2222, Protocol::TCP))
            .unwrap();
        // the new one is taken
        let err = store
            .insert(rule(fip, Uuid::new_v4(), 81, 3333, Protocol::TCP))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEntry { .. }));
    }

    #[test]
    fn test_compare_and_swap_missing_rule_is_stale() {
        let store = MemoryRuleStore::new();
        let ghost = rule(Uuid::new_v4(), Uuid::new_v4(), 22, 2222, Protocol::TCP);
        let err = store.compare_and_swap(ghost, 1).unwrap_err();
        assert!(matches!(err, StoreError::StaleData { actual: None, .. }));
    }

    #[test]
    fn test_delete_frees_indexes() {
        let store = MemoryRuleStore::new();
        let fip = Uuid::new_v4();
        let port = Uuid::new_v4();
        let a = rule(fip, port, 22, 2222, Protocol::TCP);
        store.insert(a.clone()).unwrap();

        assert_eq!(store.delete(&a.id).unwrap(), Some(a.clone()));
        assert_eq!(store.delete(&a.id).unwrap(), None);
        assert!(store.is_empty());

        store.insert(rule(fip, port, 22, 2222, Protocol::TCP)).unwrap();
    }
}
