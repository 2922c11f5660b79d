//! btcUSD Common Library
//!
//! Shared types, constants, and utilities for all btcUSD contracts.
//! This module provides the foundation for the entire protocol:
//!
//! - **Fixed-point math**: scale-tagged decimals, floor/ceil helpers, ratios
//! - **Position store**: per-user ledger with the minimum-ratio check
//! - **Liquidation sizing**: close factor, penalty and reward split
//! - **Events**: borsh/serde serializable protocol events
//! - **Emergency**: global pause with reason
//! - **Interfaces**: price feed, token ledger and yield source traits
//!
//! This crate is `no_std` compatible when built without the `std` feature.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

// Re-export collections for submodules based on feature
#[cfg(not(feature = "std"))]
pub use alloc::{collections::BTreeMap, vec::Vec};
#[cfg(feature = "std")]
pub use std::{collections::BTreeMap, vec::Vec};

pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod events;
pub mod validation;
pub mod position_store;
pub mod liquidation;
pub mod emergency;
pub mod interfaces;

// Re-exports for convenience
pub use constants::*;
pub use errors::*;
pub use types::*;
pub use math::*;
pub use events::*;
pub use position_store::*;
pub use liquidation::*;
pub use emergency::*;
pub use interfaces::*;
