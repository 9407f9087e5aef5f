//! Conflict checking for forwarding rules.

use crate::error::{ConflictKind, PortFwError, Result};
use crate::types::PortForwarding;

/// Check `candidate` against `existing` rules.
///
/// Rules sharing the candidate's id are skipped, so an update can pass the
/// stored version of itself. Both checks must pass:
///
/// 1. no other rule on the same floating IP uses the same external port and
///    protocol;
/// 2. no other rule anywhere uses the same internal port, address, port
///    number and protocol.
pub fn check_conflicts(candidate: &PortForwarding, existing: &[PortForwarding]) -> Result<()> {
    let external = candidate.external_key();
    let internal = candidate.internal_key();

    for rule in existing.iter().filter(|r| r.id != candidate.id) {
        if rule.external_key() == external {
            return Err(PortFwError::conflict(
                ConflictKind::ExternalPort,
                format!(
                    "floating IP {} already forwards {}/{} (rule {})",
                    candidate.floating_ip_id, candidate.external_port, candidate.protocol, rule.id
                ),
            ));
        }
        if rule.internal_key() == internal {
            return Err(PortFwError::conflict(
                ConflictKind::InternalEndpoint,
                format!(
                    "{}:{}/{} on port {} is already forwarded (rule {})",
                    candidate.internal_ip_address,
                    candidate.internal_port,
                    candidate.protocol,
                    candidate.internal_port_id,
                    rule.id
                ),
            ));
        }
    }
    Ok(())
}
