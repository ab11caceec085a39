//! Shared parking state: the token store and slot pool behind one lock.
//!
//! Admission reads both structures and mutates one of them, so they share a
//! single mutex. Critical sections are synchronous; the guard never crosses an
//! `.await`.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{GateError, Result};
use crate::slots::SlotPool;
use crate::store::TokenStore;

#[derive(Debug)]
pub struct ParkingState {
    pub tokens: TokenStore,
    pub slots: SlotPool,
}

impl ParkingState {
    pub fn new(tokens: TokenStore, capacity: usize) -> Self {
        Self {
            tokens,
            slots: SlotPool::new(capacity),
        }
    }
}

/// Cloneable handle to [`ParkingState`], injected into every loop and handler.
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<Mutex<ParkingState>>,
}

impl SharedState {
    pub fn new(state: ParkingState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Lock the state, recovering from poison.
    ///
    /// Mutations commit only after their last fallible step, so a panicking
    /// holder cannot leave a half-applied change behind.
    pub fn lock(&self) -> MutexGuard<'_, ParkingState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Parking state mutex poisoned - recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Run `f` as one critical section.
    pub fn with<R>(&self, f: impl FnOnce(&mut ParkingState) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Run `f` as one critical section on the blocking pool.
    ///
    /// For sections that persist the token store: the save (and its fsync)
    /// happens off the async workers, and the call resolves only after it.
    pub async fn with_blocking<R>(
        &self,
        f: impl FnOnce(&mut ParkingState) -> R + Send + 'static,
    ) -> Result<R>
    where
        R: Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || state.with(f))
            .await
            .map_err(|e| GateError::StorageTask(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TokenStore;
    use crate::token::TokenId;

    #[tokio::test]
    async fn blocking_section_sees_and_commits_state() {
        let state = SharedState::new(ParkingState::new(TokenStore::in_memory(), 2));

        let registered = state
            .with_blocking(|s| s.tokens.register(TokenId::new("A")))
            .await
            .unwrap();

        assert!(registered.is_ok());
        assert!(state.lock().tokens.is_registered(&TokenId::new("A")));
    }

    #[tokio::test]
    async fn panicking_section_is_a_storage_fault() {
        let state = SharedState::new(ParkingState::new(TokenStore::in_memory(), 2));

        let err = state
            .with_blocking(|_| -> usize { panic!("disk driver crashed") })
            .await
            .unwrap_err();

        assert!(matches!(err, GateError::StorageTask(_)));
        assert!(err.is_fault());
        // The lock is usable again after the poisoning panic.
        assert_eq!(state.lock().slots.available_count(), 2);
    }
}
