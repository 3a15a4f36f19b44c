//! The sync target abstraction.
//!
//! Both two-way integrations (remote backend, external calendar) are
//! instances of this one trait, so coordinator and resolver logic is
//! written once and parameterized by target.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::sync::types::{Origin, PendingChange, PulledBatch, PushOutcome, SyncError};

/// Authorization state for a sync target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    NotRequested,
    Denied,
    ReadWrite,
    WriteOnly,
}

impl AuthState {
    pub fn can_pull(&self) -> bool {
        matches!(self, AuthState::ReadWrite)
    }

    pub fn can_push(&self) -> bool {
        matches!(self, AuthState::ReadWrite | AuthState::WriteOnly)
    }
}

/// One two-way sync integration.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    /// Which origin this target represents.
    fn origin(&self) -> Origin;

    /// Current authorization state.
    fn auth_state(&self) -> AuthState;

    /// Fetch changes since `cursor` plus the cursor to store once the
    /// whole batch has been reconciled.
    async fn pull(&self, cursor: Option<&str>) -> Result<PulledBatch, SyncError>;

    /// Send a batch of pending changes, returning a per-entry outcome.
    async fn push(&self, batch: &[PendingChange]) -> Result<Vec<PushOutcome>, SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_state_capabilities() {
        assert!(AuthState::ReadWrite.can_pull());
        assert!(AuthState::ReadWrite.can_push());
        assert!(!AuthState::WriteOnly.can_pull());
        assert!(AuthState::WriteOnly.can_push());
        assert!(!AuthState::Denied.can_pull());
        assert!(!AuthState::Denied.can_push());
        assert!(!AuthState::NotRequested.can_push());
    }
}
