//! Capability names and the handshake check.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::PROTOCOL_VERSION;

/// Operation-log sync (fetch and push of operations with their views).
pub const OPERATIONS: &str = "operations";
/// Pack stream format version 1.
pub const PACK_V1: &str = "pack-v1";

/// A peer missing any of these cannot sync with us.
pub const REQUIRED_CAPABILITIES: &[&str] = &[OPERATIONS, PACK_V1];

/// Everything this build supports.
pub fn local_capabilities() -> Vec<String> {
    REQUIRED_CAPABILITIES.iter().map(|c| c.to_string()).collect()
}

/// Validate a peer's `Hello` and return the negotiated capability set
/// (ours intersected with theirs, sorted).
pub fn check_hello(version: u32, capabilities: &[String]) -> ProtocolResult<Vec<String>> {
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch {
            local: PROTOCOL_VERSION,
            remote: version,
        });
    }
    let mut negotiated: Vec<String> = local_capabilities()
        .into_iter()
        .filter(|c| capabilities.contains(c))
        .collect();
    negotiated.sort();
    for required in REQUIRED_CAPABILITIES {
        if !negotiated.iter().any(|c| c == required) {
            return Err(ProtocolError::MissingCapability((*required).to_string()));
        }
    }
    Ok(negotiated)
}
