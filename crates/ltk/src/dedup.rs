//! Operation deduplication registry
//!
//! Prevents two concurrent invocations of the same logical operation from
//! racing. Keys are caller-chosen strings identifying one logical action plus
//! its parameters; acquisition is scoped so every successful acquire is
//! released exactly once, on every exit path.

use std::collections::HashSet;

use parking_lot::Mutex;

/// Registry of in-flight operation keys.
///
/// At most one in-flight operation exists per key at any time; a second
/// caller with the same key is rejected immediately rather than queued.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    in_flight: Mutex<HashSet<String>>,
}

impl OperationRegistry {
    /// New empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to mark `key` as in flight.
    ///
    /// Returns a guard on success; the key is released when the guard drops.
    /// Returns `None` if an operation with the same key is already in flight.
    pub fn try_acquire(&self, key: &str) -> Option<OperationGuard<'_>> {
        let mut in_flight = self.in_flight.lock();
        if in_flight.insert(key.to_string()) {
            Some(OperationGuard {
                registry: self,
                key: key.to_string(),
            })
        } else {
            tracing::debug!("Operation `{}` already in flight", key);
            None
        }
    }

    /// Number of operations currently in flight.
    pub fn len(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Whether no operation is in flight.
    pub fn is_empty(&self) -> bool {
        self.in_flight.lock().is_empty()
    }

    fn release(&self, key: &str) {
        self.in_flight.lock().remove(key);
    }
}

/// Scoped hold on an operation key. Releases the key on drop.
#[derive(Debug)]
pub struct OperationGuard<'a> {
    registry: &'a OperationRegistry,
    key: String,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use ltk_common::Error;

    use super::*;

    #[test]
    fn test_second_acquire_rejected_until_release() {
        let registry = OperationRegistry::new();

        let first = registry.try_acquire("create-parcel-1");
        assert!(first.is_some());
        assert!(registry.try_acquire("create-parcel-1").is_none());

        // Independent keys are not affected
        assert!(registry.try_acquire("create-parcel-2").is_some());

        drop(first);
        assert!(registry.try_acquire("create-parcel-1").is_some());
    }

    #[test]
    fn test_guard_releases_on_error_path() {
        let registry = OperationRegistry::new();

        fn failing_op(registry: &OperationRegistry) -> Result<(), Error> {
            let _guard = registry
                .try_acquire("delist-parcel-7")
                .ok_or_else(|| Error::DuplicateOperation("delist-parcel-7".to_string()))?;
            Err(Error::Timeout)
        }

        assert!(failing_op(&registry).is_err());
        // The early return dropped the guard, so the key is free again
        let reacquired = registry.try_acquire("delist-parcel-7");
        assert!(reacquired.is_some());
        assert_eq!(registry.len(), 1);
    }
}
