//! Normalized write-response envelope

use serde::{Deserialize, Serialize};

/// Envelope returned by every backend write endpoint.
///
/// Carries the affected-resource identifier the orchestrator uses to scope
/// cache invalidation after the write completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteEnvelope<T> {
    /// Payload of the write response
    pub data: T,
    /// Identifier of the resource the write affected
    pub resource_id: String,
}

impl<T> WriteEnvelope<T> {
    /// New envelope
    pub fn new<S>(data: T, resource_id: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            data,
            resource_id: resource_id.into(),
        }
    }
}
