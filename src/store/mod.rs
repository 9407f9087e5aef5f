//! Rule store module.
//!
//! The persistence contract the registry relies on. Every write is atomic
//! and re-verifies both uniqueness invariants, so concurrent writers that
//! raced past the conflict checker cannot both commit.

use uuid::Uuid;

use crate::error::StoreError;
use crate::types::PortForwarding;

mod memory;

pub use memory::MemoryRuleStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Subset of rules returned by [`RuleStore::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    All,
    FloatingIp(Uuid),
    InternalPort(Uuid),
}

impl RuleScope {
    pub fn contains(&self, rule: &PortForwarding) -> bool {
        match self {
            RuleScope::All => true,
            RuleScope::FloatingIp(id) => rule.floating_ip_id == *id,
            RuleScope::InternalPort(id) => rule.internal_port_id == *id,
        }
    }
}

/// Persistence interface for forwarding rules.
pub trait RuleStore: Send + Sync {
    /// Fetch a rule by id.
    fn get(&self, id: &Uuid) -> StoreResult<Option<PortForwarding>>;

    /// Rules within `scope`, in store iteration order.
    fn list(&self, scope: RuleScope) -> StoreResult<Vec<PortForwarding>>;

    /// Insert a new rule.
    ///
    /// Fails with [`StoreError::DuplicateEntry`] if the id, the external key
    /// or the internal key is already taken.
    fn insert(&self, rule: PortForwarding) -> StoreResult<()>;

    /// Replace a rule if its stored revision is still `expected_revision`.
    ///
    /// Fails with [`StoreError::StaleData`] if the rule changed or vanished,
    /// and with [`StoreError::DuplicateEntry`] if the new keys collide with
    /// another rule.
    fn compare_and_swap(&self, rule: PortForwarding, expected_revision: u64) -> StoreResult<()>;

    /// Remove a rule, returning it if it existed.
    fn delete(&self, id: &Uuid) -> StoreResult<Option<PortForwarding>>;
}
