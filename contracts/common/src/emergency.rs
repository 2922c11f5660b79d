//! Emergency Module
//!
//! Global pause state. Mutating operations refuse to run while paused;
//! views keep working so positions can still be inspected.

use crate::events::PauseReason;
use crate::{BtcUsdError, BtcUsdResult};

// ============================================================================
// Types
// ============================================================================

/// Pause flag plus why and when it was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmergencyState {
    pub paused: bool,
    pub reason: Option<PauseReason>,
    pub paused_at: Option<u64>,
}

impl EmergencyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `ProtocolPaused` while paused
    pub fn ensure_active(&self) -> BtcUsdResult<()> {
        if self.paused {
            return Err(BtcUsdError::ProtocolPaused);
        }
        Ok(())
    }

    /// Raise the pause. A breach reason overrides an admin pause.
    ///
    /// Returns false if the state was already paused for the same reason.
    pub fn pause(&mut self, reason: PauseReason, now: u64) -> bool {
        if self.paused && self.reason == Some(reason) {
            return false;
        }
        self.paused = true;
        self.reason = Some(reason);
        self.paused_at = Some(now);
        true
    }

    /// Clear the pause
    pub fn unpause(&mut self) {
        *self = Self::default();
    }

    pub fn is_breach(&self) -> bool {
        self.paused && self.reason == Some(PauseReason::GlobalInvariantBreach)
    }
}

// ============================================================================
// Tests
// ============================================================================
