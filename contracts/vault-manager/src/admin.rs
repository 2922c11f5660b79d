//! Admin Capability
//!
//! Parameter changes and pause control require an [`AdminCapability`].
//! The capability is minted once by [`VaultEngine::new`] and is bound to
//! that engine through its id, so a capability from any other engine is
//! rejected, even one built from the same config and nonce.

use core::sync::atomic::{AtomicU64, Ordering};

use btcusd_common::{
    errors::{BtcUsdError, BtcUsdResult},
    events::{BtcUsdEvent, PauseReason},
    interfaces::{MintableLedger, PriceFeed, TokenLedger, YieldSource},
    types::{Address, ProtocolParameters},
};

use crate::VaultEngine;

/// Proof of admin rights over one engine. Cannot be constructed or cloned
/// outside this crate.
#[derive(Debug, PartialEq, Eq)]
pub struct AdminCapability {
    engine_id: [u8; 32],
}

impl AdminCapability {
    pub(crate) fn new(engine_id: [u8; 32]) -> Self {
        Self { engine_id }
    }

    /// Id of the engine this capability controls
    pub fn engine_id(&self) -> &[u8; 32] {
        &self.engine_id
    }
}

/// Engines created by this process
static INSTANCES: AtomicU64 = AtomicU64::new(0);

/// Sequence number for a new engine, unique within the process
pub(crate) fn next_instance() -> u64 {
    INSTANCES.fetch_add(1, Ordering::Relaxed)
}

/// Engine id from its custody and treasury addresses, a creation nonce and
/// the engine's instance number
pub fn derive_engine_id(
    custody: &Address,
    treasury: &Address,
    nonce: u64,
    instance: u64,
) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(custody);
    hasher.update(treasury);
    hasher.update(nonce.to_le_bytes());
    hasher.update(instance.to_le_bytes());
    let result = hasher.finalize();
    let mut id = [0u8; 32];
    id.copy_from_slice(&result);
    id
}

// ============ Admin Operations ============

impl<F, C, S, Y> VaultEngine<F, C, S, Y>
where
    F: PriceFeed,
    C: TokenLedger,
    S: MintableLedger,
    Y: YieldSource,
{
    fn authorize(&self, cap: &AdminCapability) -> BtcUsdResult<()> {
        if cap.engine_id != self.engine_id {
            return Err(BtcUsdError::Unauthorized {
                actual: cap.engine_id,
            });
        }
        Ok(())
    }

    fn parameters_updated(&mut self, now: u64) {
        log::debug!("parameters updated: {:?}", self.params);
        self.events.emit(BtcUsdEvent::ParametersUpdated {
            params: self.params,
            timestamp: now,
        });
    }

    /// Replace penalty, reward and close factor
    pub fn set_liquidation_params(
        &mut self,
        cap: &AdminCapability,
        penalty_bps: u64,
        reward_bps: u64,
        close_factor_bps: u64,
        now: u64,
    ) -> BtcUsdResult<()> {
        self.authorize(cap)?;
        self.params
            .set_liquidation_params(penalty_bps, reward_bps, close_factor_bps)?;
        self.parameters_updated(now);
        Ok(())
    }

    /// Replace minimum ratio, liquidation threshold and max LTV
    pub fn set_ratio_params(
        &mut self,
        cap: &AdminCapability,
        min_collateral_ratio_bps: u64,
        liquidation_threshold_bps: u64,
        max_ltv_bps: u64,
        now: u64,
    ) -> BtcUsdResult<()> {
        self.authorize(cap)?;
        self.params.set_ratio_params(
            min_collateral_ratio_bps,
            liquidation_threshold_bps,
            max_ltv_bps,
        )?;
        self.parameters_updated(now);
        Ok(())
    }

    /// Replace the user / protocol yield split
    pub fn set_yield_shares(
        &mut self,
        cap: &AdminCapability,
        user_bps: u64,
        protocol_bps: u64,
        now: u64,
    ) -> BtcUsdResult<()> {
        self.authorize(cap)?;
        self.params.set_yield_shares(user_bps, protocol_bps)?;
        self.parameters_updated(now);
        Ok(())
    }

    /// Replace every parameter at once
    pub fn set_parameters(
        &mut self,
        cap: &AdminCapability,
        params: ProtocolParameters,
        now: u64,
    ) -> BtcUsdResult<()> {
        self.authorize(cap)?;
        params.validate()?;
        self.params = params;
        self.parameters_updated(now);
        Ok(())
    }

    /// Change the oldest acceptable price age
    pub fn set_max_price_age(&mut self, cap: &AdminCapability, max_age: u64) -> BtcUsdResult<()> {
        self.authorize(cap)?;
        self.gateway.set_max_age(max_age)?;
        self.config.max_price_age = max_age;
        Ok(())
    }

    /// Halt mutating operations
    pub fn pause(&mut self, cap: &AdminCapability, now: u64) -> BtcUsdResult<()> {
        self.authorize(cap)?;
        if self.emergency.paused {
            return Ok(());
        }
        self.emergency.pause(PauseReason::AdminAction, now);
        log::warn!("engine paused by admin at {}", now);
        self.events.emit(BtcUsdEvent::ProtocolPaused {
            reason: PauseReason::AdminAction,
            timestamp: now,
        });
        Ok(())
    }

    /// Resume mutating operations. Refuses while supply or backing is broken.
    pub fn unpause(&mut self, cap: &AdminCapability, now: u64) -> BtcUsdResult<()> {
        self.authorize(cap)?;
        if !self.emergency.paused {
            return Ok(());
        }
        if let Err(err) = self.verify_global_invariants() {
            log::error!("unpause refused: {}", err);
            return Err(err);
        }
        self.emergency.unpause();
        log::info!("engine unpaused at {}", now);
        self.events
            .emit(BtcUsdEvent::ProtocolUnpaused { timestamp: now });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_id_deterministic() {
        let a = derive_engine_id(&[1u8; 32], &[2u8; 32], 7, 0);
        assert_eq!(a, derive_engine_id(&[1u8; 32], &[2u8; 32], 7, 0));
        assert_ne!(a, derive_engine_id(&[1u8; 32], &[2u8; 32], 8, 0));
        assert_ne!(a, derive_engine_id(&[2u8; 32], &[1u8; 32], 7, 0));
        assert_ne!(a, derive_engine_id(&[1u8; 32], &[2u8; 32], 7, 1));
    }

    #[test]
    fn test_instances_never_repeat() {
        let first = next_instance();
        let second = next_instance();
        assert!(second > first);
    }

    #[test]
    fn test_capability_carries_id() {
        let id = derive_engine_id(&[1u8; 32], &[2u8; 32], 0, 0);
        let cap = AdminCapability::new(id);
        assert_eq!(cap.engine_id(), &id);
    }
}
