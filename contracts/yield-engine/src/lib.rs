//! Yield Engine
//!
//! Pass-through yield on wBTC collateral. Deposits are supplied to an
//! external [`YieldSource`]; the engine tracks each user's principal and
//! shares, and on harvest splits the realized yield between the user and
//! the protocol treasury.
//!
//! ## Accounting
//!
//! ```text
//! redeemable = source.convert_to_assets(record.shares)
//! yield      = max(0, redeemable - principal)
//! protocol   = yield * protocolShare / 10000
//! user       = yield - protocol
//! ```
//!
//! Harvest withdraws exactly `yield` from the source, so the shares left
//! behind are worth the principal again and nothing is counted twice.
//!
//! ## Rollback
//!
//! Every supply and redemption is journaled until [`YieldEngine::commit`].
//! [`YieldEngine::restore`] replays the inverse calls against the source
//! and carries any share rounding drift into the restored record.

pub mod pool;

pub use pool::{MemoryLendingPool, PoolState};

use btcusd_common::{
    errors::{BtcUsdError, BtcUsdResult},
    interfaces::YieldSource,
    math::{bps_of, mul_div_floor},
    types::{Address, YieldRecord},
    validation::require_positive,
    BTreeMap, Vec,
};

// ============ Yield Split ============

/// Split `total` into (user, protocol); the two always sum to `total`
pub fn split_yield(total: u128, protocol_share_bps: u64) -> BtcUsdResult<(u128, u128)> {
    let protocol = bps_of(total, protocol_share_bps)?;
    Ok((total - protocol, protocol))
}

// ============ Checkpoint ============

/// Saved state for rolling back a single user's yield changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YieldCheckpoint {
    user: Address,
    record: Option<YieldRecord>,
    total_shares: u128,
    total_principal: u128,
    calls: usize,
}

/// Source call made since the last commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceCall {
    Supplied { assets: u128, shares: u128 },
    Redeemed { assets: u128, shares: u128 },
}

// ============ Engine ============

/// Per-user principal and share tracking over a yield source
#[derive(Debug, Clone)]
pub struct YieldEngine<Y> {
    source: Y,
    records: BTreeMap<Address, YieldRecord>,
    total_shares: u128,
    total_principal: u128,
    journal: Vec<SourceCall>,
}

impl<Y: YieldSource> YieldEngine<Y> {
    pub fn new(source: Y) -> Self {
        Self {
            source,
            records: BTreeMap::new(),
            total_shares: 0,
            total_principal: 0,
            journal: Vec::new(),
        }
    }

    /// Supply `amount` for `user`; returns shares received
    pub fn deposit(&mut self, user: &Address, amount: u128) -> BtcUsdResult<u128> {
        require_positive(amount)?;
        let shares = self.source.supply(amount)?;
        self.journal.push(SourceCall::Supplied {
            assets: amount,
            shares,
        });

        let mut record = self.record(user);
        record.deposited_principal = record
            .deposited_principal
            .checked_add(amount)
            .ok_or(BtcUsdError::Overflow)?;
        record.shares = record.shares.checked_add(shares).ok_or(BtcUsdError::Overflow)?;
        self.total_principal = self
            .total_principal
            .checked_add(amount)
            .ok_or(BtcUsdError::Overflow)?;
        self.total_shares = self
            .total_shares
            .checked_add(shares)
            .ok_or(BtcUsdError::Overflow)?;
        self.records.insert(*user, record);

        Ok(shares)
    }

    /// Withdraw `amount` of principal; returns assets redeemed from the source.
    ///
    /// Redeemed assets are `amount`'s proportional share of the current
    /// redeemable value, floored.
    pub fn withdraw(&mut self, user: &Address, amount: u128) -> BtcUsdResult<u128> {
        require_positive(amount)?;
        let mut record = self.record(user);

        // 1. Principal must cover the request
        if amount > record.deposited_principal {
            return Err(BtcUsdError::InsufficientCollateral {
                available: record.deposited_principal,
                requested: amount,
            });
        }

        // 2. Proportional share of the redeemable value
        let assets = mul_div_floor(amount, self.redeemable(user), record.deposited_principal)?;

        // 3. Redeem from the source
        let burned = if assets > 0 {
            self.redeem(assets)?
        } else {
            0
        };
        record.shares = record
            .shares
            .checked_sub(burned)
            .ok_or(BtcUsdError::YieldSourceFailure {
                reason: "burned more shares than held",
            })?;
        record.deposited_principal -= amount;

        self.total_shares = self.total_shares.saturating_sub(burned);
        self.total_principal = self.total_principal.saturating_sub(amount);
        self.records.insert(*user, record);

        Ok(assets)
    }

    /// Current redeemable value of `user`'s shares
    pub fn redeemable(&self, user: &Address) -> u128 {
        self.source.convert_to_assets(self.record(user).shares)
    }

    /// Unrealized yield; never negative
    pub fn current_yield(&self, user: &Address) -> u128 {
        self.redeemable(user)
            .saturating_sub(self.record(user).deposited_principal)
    }

    /// Realize `user`'s yield; returns (user_amount, protocol_amount)
    pub fn harvest(
        &mut self,
        user: &Address,
        protocol_share_bps: u64,
    ) -> BtcUsdResult<(u128, u128)> {
        let total = self.current_yield(user);
        if total == 0 {
            return Ok((0, 0));
        }

        // 1. Pull exactly the yield out of the source
        let burned = self.redeem(total)?;

        // 2. Shrink the user's shares back to their principal
        let mut record = self.record(user);
        record.shares = record
            .shares
            .checked_sub(burned)
            .ok_or(BtcUsdError::YieldSourceFailure {
                reason: "burned more shares than held",
            })?;
        record.cumulative_harvested = record
            .cumulative_harvested
            .checked_add(total)
            .ok_or(BtcUsdError::Overflow)?;
        self.total_shares = self.total_shares.saturating_sub(burned);
        self.records.insert(*user, record);

        // 3. Split
        let split = split_yield(total, protocol_share_bps)?;
        log::debug!(
            "harvested {} for {:02x?}: user {} protocol {}",
            total,
            &user[..4],
            split.0,
            split.1
        );
        Ok(split)
    }

    fn redeem(&mut self, assets: u128) -> BtcUsdResult<u128> {
        let shares = self.source.withdraw(assets)?;
        self.journal.push(SourceCall::Redeemed { assets, shares });
        Ok(shares)
    }

    /// Record of `user`, zero-valued if absent
    pub fn record(&self, user: &Address) -> YieldRecord {
        self.records.get(user).copied().unwrap_or_default()
    }

    /// All records, including zeroed ones
    pub fn records(&self) -> impl Iterator<Item = (&Address, &YieldRecord)> {
        self.records.iter()
    }

    pub fn total_shares(&self) -> u128 {
        self.total_shares
    }

    pub fn total_principal(&self) -> u128 {
        self.total_principal
    }

    /// Redeemable value of every share the engine holds
    pub fn total_value(&self) -> u128 {
        self.source.convert_to_assets(self.total_shares)
    }

    pub fn reserve(&self) -> Address {
        self.source.reserve()
    }

    pub fn source(&self) -> &Y {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut Y {
        &mut self.source
    }

    /// Capture `user`'s record and the totals
    pub fn checkpoint(&self, user: &Address) -> YieldCheckpoint {
        YieldCheckpoint {
            user: *user,
            record: self.records.get(user).copied(),
            total_shares: self.total_shares,
            total_principal: self.total_principal,
            calls: self.journal.len(),
        }
    }

    /// Forget journaled source calls once an operation has settled
    pub fn commit(&mut self) {
        self.journal.clear();
    }

    /// Reverse the source calls made since `checkpoint`, newest first, and
    /// restore the bookkeeping.
    ///
    /// Inverse calls can round differently from the originals; the share
    /// difference stays with the checkpointed user so the records keep
    /// matching the source. Stops at the first inverse call that fails.
    pub fn restore(&mut self, checkpoint: YieldCheckpoint) -> BtcUsdResult<()> {
        // 1. Rewind the source
        let mut gained: u128 = 0;
        let mut lost: u128 = 0;
        let mut rewound = Ok(());
        while self.journal.len() > checkpoint.calls {
            let Some(call) = self.journal.pop() else {
                break;
            };
            let step = match call {
                SourceCall::Supplied { assets, shares } => {
                    self.source.withdraw(assets).map(|burned| (shares, burned))
                }
                SourceCall::Redeemed { assets, shares } => {
                    self.source.supply(assets).map(|minted| (minted, shares))
                }
            };
            match step {
                Ok((plus, minus)) => {
                    gained = gained.saturating_add(plus);
                    lost = lost.saturating_add(minus);
                }
                Err(err) => {
                    rewound = Err(err);
                    break;
                }
            }
        }
        self.journal.truncate(checkpoint.calls);

        // 2. Restore bookkeeping, net of drift
        let mut record = checkpoint.record.unwrap_or_default();
        let mut total_shares = checkpoint.total_shares;
        if rewound.is_ok() {
            if gained >= lost {
                let drift = gained - lost;
                record.shares = record.shares.saturating_add(drift);
                total_shares = total_shares.saturating_add(drift);
            } else {
                let drift = lost - gained;
                record.shares = record.shares.saturating_sub(drift);
                total_shares = total_shares.saturating_sub(drift);
            }
        }
        match checkpoint.record {
            None if record == YieldRecord::default() => {
                self.records.remove(&checkpoint.user);
            }
            _ => {
                self.records.insert(checkpoint.user, record);
            }
        }
        self.total_shares = total_shares;
        self.total_principal = checkpoint.total_principal;
        rewound
    }
}

// ============ Tests ============
