//! The manifest state store contract.

use async_trait::async_trait;

use crate::deploy::State;
use crate::errors::StateStoreError;

/// Atomic access to the intended state (the manifest set).
///
/// Implementations are git-backed in production; tests and the demo binary
/// use the in-memory store from `test_utils`. Writes merge against the
/// version the writer read: a concurrent writer surfaces as
/// [`StateStoreError::Conflict`], and the resolver retries the whole cycle
/// once before giving up.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a consistent snapshot of the intended state.
    async fn read_state(&self) -> Result<State, StateStoreError>;

    /// Write the state back, merging with any concurrent writes where
    /// possible.
    async fn write_state(&self, state: State) -> Result<(), StateStoreError>;
}

/// In-memory state store for development and the demo server.
#[derive(Default)]
pub struct MemoryStateStore {
    state: std::sync::Mutex<State>,
}

impl MemoryStateStore {
    pub fn new(state: State) -> Self {
        Self {
            state: std::sync::Mutex::new(state),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn read_state(&self) -> Result<State, StateStoreError> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn write_state(&self, state: State) -> Result<(), StateStoreError> {
        *self.state.lock().unwrap() = state;
        Ok(())
    }
}
