//! Protocol Events for btcUSD
//!
//! Events are emitted after a mutating operation commits and can be
//! indexed off-chain for UIs, keepers and accounting.

use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use crate::types::{Address, ProtocolParameters};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Position Events (0x01 - 0x1F)
    CollateralDeposited = 0x01,
    CollateralWithdrawn = 0x02,
    StablecoinMinted = 0x03,
    StablecoinBurned = 0x04,
    PositionLiquidated = 0x05,

    // Yield Events (0x20 - 0x3F)
    YieldHarvested = 0x20,

    // Protocol Events (0x80 - 0x9F)
    ParametersUpdated = 0x80,
    ProtocolPaused = 0x81,
    ProtocolUnpaused = 0x82,
    GlobalInvariantBreached = 0x83,
}

/// Reason attached to a pause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PauseReason {
    /// Admin paused through the capability
    AdminAction,
    /// Supply or backing check failed at the start of an operation
    GlobalInvariantBreach,
}

/// Main event enum containing all possible protocol events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum BtcUsdEvent {
    // ============ Position Events ============

    /// Collateral added to a position
    CollateralDeposited {
        user: Address,
        amount: u128,
        new_collateral: u128,
        timestamp: u64,
    },

    /// Collateral returned to the owner
    CollateralWithdrawn {
        user: Address,
        amount: u128,
        new_collateral: u128,
        new_ratio_bps: u128,
        timestamp: u64,
    },

    /// Debt taken against a position
    StablecoinMinted {
        user: Address,
        amount: u128,
        new_debt: u128,
        new_ratio_bps: u128,
        timestamp: u64,
    },

    /// Debt repaid
    StablecoinBurned {
        user: Address,
        amount: u128,
        new_debt: u128,
        timestamp: u64,
    },

    /// Partial or full liquidation
    PositionLiquidated {
        user: Address,
        liquidator: Address,
        debt_repaid: u128,
        collateral_seized: u128,
        liquidator_bonus: u128,
        protocol_fee: u128,
        price: u128,
        timestamp: u64,
    },

    // ============ Yield Events ============

    /// Realized yield split between user and treasury
    YieldHarvested {
        user: Address,
        user_amount: u128,
        protocol_amount: u128,
        timestamp: u64,
    },

    // ============ Protocol Events ============

    /// Admin replaced protocol parameters
    ParametersUpdated {
        params: ProtocolParameters,
        timestamp: u64,
    },

    /// Mutations halted
    ProtocolPaused {
        reason: PauseReason,
        timestamp: u64,
    },

    /// Mutations resumed
    ProtocolUnpaused { timestamp: u64 },

    /// Ledger and store disagree
    GlobalInvariantBreached {
        ledger_value: u128,
        accounted_value: u128,
        timestamp: u64,
    },
}

impl BtcUsdEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::CollateralDeposited { .. } => EventType::CollateralDeposited,
            Self::CollateralWithdrawn { .. } => EventType::CollateralWithdrawn,
            Self::StablecoinMinted { .. } => EventType::StablecoinMinted,
            Self::StablecoinBurned { .. } => EventType::StablecoinBurned,
            Self::PositionLiquidated { .. } => EventType::PositionLiquidated,
            Self::YieldHarvested { .. } => EventType::YieldHarvested,
            Self::ParametersUpdated { .. } => EventType::ParametersUpdated,
            Self::ProtocolPaused { .. } => EventType::ProtocolPaused,
            Self::ProtocolUnpaused { .. } => EventType::ProtocolUnpaused,
            Self::GlobalInvariantBreached { .. } => EventType::GlobalInvariantBreached,
        }
    }

    /// Get the time the event occurred
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::CollateralDeposited { timestamp, .. }
            | Self::CollateralWithdrawn { timestamp, .. }
            | Self::StablecoinMinted { timestamp, .. }
            | Self::StablecoinBurned { timestamp, .. }
            | Self::PositionLiquidated { timestamp, .. }
            | Self::YieldHarvested { timestamp, .. }
            | Self::ParametersUpdated { timestamp, .. }
            | Self::ProtocolPaused { timestamp, .. }
            | Self::ProtocolUnpaused { timestamp }
            | Self::GlobalInvariantBreached { timestamp, .. } => *timestamp,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting events across operations
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<BtcUsdEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: BtcUsdEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[BtcUsdEvent] {
        &self.events
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&BtcUsdEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Most recent event, if any
    pub fn last(&self) -> Option<&BtcUsdEvent> {
        self.events.last()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Drop events emitted after the log had `len` entries
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }
}
