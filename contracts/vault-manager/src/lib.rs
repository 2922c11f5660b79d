//! Vault Manager - CDP Engine for btcUSD
//!
//! Orchestrates wBTC-collateralized btcUSD positions: deposits, mints,
//! repayments, withdrawals, liquidations and yield harvests. The engine is
//! generic over its collaborators (price feed, wBTC ledger, btcUSD ledger,
//! yield source) and never moves value itself; it commits its own state
//! first and then instructs the collaborators.
//!
//! ## Core Operations
//!
//! - **deposit_collateral**: Add wBTC to a position
//! - **withdraw_collateral**: Remove wBTC (if the ratio permits)
//! - **mint_stablecoin**: Borrow btcUSD against collateral
//! - **burn_stablecoin**: Repay btcUSD debt
//! - **deposit_and_mint**: Deposit, then borrow up to the minimum ratio
//! - **repay_and_withdraw**: Repay, then withdraw collateral pro rata
//! - **liquidate**: Partially close an undercollateralized position
//! - **harvest_yield**: Realize yield on routed collateral
//!
//! ## Operation Pipeline
//!
//! ```text
//! guard (paused? re-entered? supply/backing intact?)
//!   → validate amounts, resolve fresh price
//!   → commit position + totals (ratio checked)
//!   → collaborator calls (transfer, mint, burn, supply), each journaled
//!   → on failure: reverse journaled calls, restore checkpoint
//!   → emit events
//! ```
//!
//! A failed operation leaves the ledgers as it found them. If a reversal
//! is itself refused the engine pauses, since its records and the ledgers
//! may no longer agree.

use btcusd_common::{
    errors::{BtcUsdError, BtcUsdResult, GlobalInvariant, UnsafeOperation},
    events::{BtcUsdEvent, EventLog, PauseReason},
    emergency::EmergencyState,
    interfaces::{MintableLedger, PriceFeed, TokenLedger, YieldSource},
    math::{collateral_ratio_bps, max_debt_at_ratio, mul_div_floor},
    position_store::{InvariantCheck, PositionDelta, PositionStore, StoreCheckpoint},
    types::{Address, EngineConfig, Position, ProtocolParameters},
    validation::{require_min_deposit, require_positive},
    Vec,
};
use btcusd_price_oracle::PriceGateway;
use btcusd_yield::{YieldCheckpoint, YieldEngine};

pub mod admin;
pub mod liquidation;
pub mod views;

#[cfg(test)]
mod testing;

pub use admin::{derive_engine_id, AdminCapability};
pub use views::{PositionHealth, ProtocolSnapshot, ProtocolStats};

// ============ Engine State ============

/// External services the engine orchestrates
#[derive(Debug, Clone)]
pub struct Collaborators<F, C, S, Y> {
    /// BTC/USD price source
    pub price_feed: F,
    /// wBTC ledger
    pub collateral_token: C,
    /// btcUSD ledger; custody must be its authorized minter
    pub stablecoin: S,
    /// Venue for routed collateral
    pub yield_source: Y,
}

/// The CDP engine
#[derive(Debug)]
pub struct VaultEngine<F, C, S, Y> {
    engine_id: [u8; 32],
    config: EngineConfig,
    params: ProtocolParameters,
    store: PositionStore,
    gateway: PriceGateway<F>,
    collateral: C,
    stable: S,
    yields: YieldEngine<Y>,
    emergency: EmergencyState,
    events: EventLog,
    legs: Vec<Leg>,
    entered: bool,
}

/// Rollback point for a single-user operation
struct Checkpoint {
    store: StoreCheckpoint,
    yields: YieldCheckpoint,
    events: usize,
    legs: usize,
    now: u64,
}

/// Ledger call that went through and must be reversed if the operation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    /// wBTC moved between accounts
    Collateral { from: Address, to: Address, amount: u128 },
    /// btcUSD moved between accounts
    Stable { from: Address, to: Address, amount: u128 },
    Minted { to: Address, amount: u128 },
    Burned { from: Address, amount: u128 },
}

impl<F, C, S, Y> VaultEngine<F, C, S, Y>
where
    F: PriceFeed,
    C: TokenLedger,
    S: MintableLedger,
    Y: YieldSource,
{
    /// Create an engine and the only capability that can administer it.
    ///
    /// # Errors
    /// - `InvalidParameter` if `config` or `params` fail validation
    pub fn new(
        config: EngineConfig,
        params: ProtocolParameters,
        collaborators: Collaborators<F, C, S, Y>,
        nonce: u64,
    ) -> BtcUsdResult<(Self, AdminCapability)> {
        config.validate()?;
        params.validate()?;

        let engine_id = derive_engine_id(
            &config.custody,
            &config.treasury,
            nonce,
            admin::next_instance(),
        );
        let engine = Self {
            engine_id,
            config,
            params,
            store: PositionStore::new(),
            gateway: PriceGateway::new(collaborators.price_feed, config.max_price_age),
            collateral: collaborators.collateral_token,
            stable: collaborators.stablecoin,
            yields: YieldEngine::new(collaborators.yield_source),
            emergency: EmergencyState::new(),
            events: EventLog::new(),
            legs: Vec::new(),
            entered: false,
        };

        log::info!(
            "vault engine {:02x?} created (yield routing {})",
            &engine_id[..4],
            config.route_collateral_to_yield
        );
        Ok((engine, AdminCapability::new(engine_id)))
    }

    // ============ Position Operations ============

    /// Add `amount` wBTC to `user`'s position. The user must have approved
    /// the custody address on the wBTC ledger.
    pub fn deposit_collateral(
        &mut self,
        user: &Address,
        amount: u128,
        now: u64,
    ) -> BtcUsdResult<Position> {
        self.guarded(now, |engine| engine.do_deposit_collateral(user, amount, now))
    }

    /// Return `amount` wBTC to `user`
    pub fn withdraw_collateral(
        &mut self,
        user: &Address,
        amount: u128,
        now: u64,
    ) -> BtcUsdResult<Position> {
        self.guarded(now, |engine| engine.do_withdraw_collateral(user, amount, now))
    }

    /// Mint `amount` btcUSD to `user` against their collateral
    pub fn mint_stablecoin(
        &mut self,
        user: &Address,
        amount: u128,
        now: u64,
    ) -> BtcUsdResult<Position> {
        self.guarded(now, |engine| engine.do_mint_stablecoin(user, amount, now))
    }

    /// Burn `amount` btcUSD from `user` and reduce their debt
    pub fn burn_stablecoin(
        &mut self,
        user: &Address,
        amount: u128,
        now: u64,
    ) -> BtcUsdResult<Position> {
        self.guarded(now, |engine| engine.do_burn_stablecoin(user, amount, now))
    }

    /// Deposit `collateral_amount`, then mint up to the minimum ratio.
    /// Returns the amount minted, which may be zero.
    pub fn deposit_and_mint(
        &mut self,
        user: &Address,
        collateral_amount: u128,
        now: u64,
    ) -> BtcUsdResult<u128> {
        self.guarded(now, |engine| {
            engine.do_deposit_and_mint(user, collateral_amount, now)
        })
    }

    /// Repay `stable_amount`, then withdraw the same share of collateral.
    /// Returns the wBTC paid out.
    pub fn repay_and_withdraw(
        &mut self,
        user: &Address,
        stable_amount: u128,
        now: u64,
    ) -> BtcUsdResult<u128> {
        self.guarded(now, |engine| {
            engine.do_repay_and_withdraw(user, stable_amount, now)
        })
    }

    /// Realize `user`'s yield; returns (user_amount, protocol_amount)
    pub fn harvest_yield(&mut self, user: &Address, now: u64) -> BtcUsdResult<(u128, u128)> {
        self.guarded(now, |engine| {
            let cp = engine.checkpoint(user, now);
            let harvested = engine.harvest_and_pay(user, now);
            engine.settle(cp, harvested)
        })
    }

    fn do_deposit_collateral(
        &mut self,
        user: &Address,
        amount: u128,
        now: u64,
    ) -> BtcUsdResult<Position> {
        // 1. Validate amount and price
        require_min_deposit(amount, self.config.min_deposit)?;
        let price = self.gateway.fresh_price(now)?.price;

        // 2. Commit
        let check = self.min_ratio(price, UnsafeOperation::Adjust);
        let cp = self.checkpoint(user, now);
        let position = self.store.apply(
            user,
            PositionDelta::collateral(signed(amount)?),
            check,
            now,
        )?;

        // 3. Pull the wBTC
        let pulled = self.pull_collateral(user, amount);
        self.settle(cp, pulled)?;

        self.events.emit(BtcUsdEvent::CollateralDeposited {
            user: *user,
            amount,
            new_collateral: position.collateral,
            timestamp: now,
        });
        log::debug!(
            "deposit {} by {:02x?}: collateral {}",
            amount,
            &user[..4],
            position.collateral
        );
        Ok(position)
    }

    fn do_withdraw_collateral(
        &mut self,
        user: &Address,
        amount: u128,
        now: u64,
    ) -> BtcUsdResult<Position> {
        // 1. Validate amount and price
        require_positive(amount)?;
        let price = self.gateway.fresh_price(now)?.price;

        // 2. Commit; fails if the remaining collateral cannot carry the debt
        let check = self.min_ratio(price, UnsafeOperation::Withdrawal);
        let cp = self.checkpoint(user, now);
        let position = self.store.apply(
            user,
            PositionDelta::collateral(-signed(amount)?),
            check,
            now,
        )?;

        // 3. Pay out
        let released = self.release_collateral(user, user, amount, now);
        self.settle(cp, released)?;

        let new_ratio_bps = collateral_ratio_bps(position.collateral, position.debt, price)?;
        self.events.emit(BtcUsdEvent::CollateralWithdrawn {
            user: *user,
            amount,
            new_collateral: position.collateral,
            new_ratio_bps,
            timestamp: now,
        });
        log::debug!(
            "withdraw {} by {:02x?}: collateral {} ratio {}bps",
            amount,
            &user[..4],
            position.collateral,
            new_ratio_bps
        );
        Ok(position)
    }

    fn do_mint_stablecoin(
        &mut self,
        user: &Address,
        amount: u128,
        now: u64,
    ) -> BtcUsdResult<Position> {
        // 1. Validate amount and price
        require_positive(amount)?;
        let price = self.gateway.fresh_price(now)?.price;

        // 2. Commit; fails below the minimum ratio
        let check = self.min_ratio(price, UnsafeOperation::Mint);
        let cp = self.checkpoint(user, now);
        let position = self.store.apply(
            user,
            PositionDelta::debt(signed(amount)?),
            check,
            now,
        )?;

        // 3. Mint
        let minted = self.mint_to(user, amount);
        self.settle(cp, minted)?;

        let new_ratio_bps = collateral_ratio_bps(position.collateral, position.debt, price)?;
        self.events.emit(BtcUsdEvent::StablecoinMinted {
            user: *user,
            amount,
            new_debt: position.debt,
            new_ratio_bps,
            timestamp: now,
        });
        log::debug!(
            "mint {} by {:02x?}: debt {} ratio {}bps",
            amount,
            &user[..4],
            position.debt,
            new_ratio_bps
        );
        Ok(position)
    }

    fn do_burn_stablecoin(
        &mut self,
        user: &Address,
        amount: u128,
        now: u64,
    ) -> BtcUsdResult<Position> {
        // 1. Validate amount and price
        require_positive(amount)?;
        let price = self.gateway.fresh_price(now)?.price;

        // 2. Commit; fails with ExceedsDebt above the current debt
        let check = self.min_ratio(price, UnsafeOperation::Adjust);
        let cp = self.checkpoint(user, now);
        let position = self.store.apply(
            user,
            PositionDelta::debt(-signed(amount)?),
            check,
            now,
        )?;

        // 3. Burn from the user's balance
        let burned = self.burn_from(user, amount);
        self.settle(cp, burned)?;

        self.events.emit(BtcUsdEvent::StablecoinBurned {
            user: *user,
            amount,
            new_debt: position.debt,
            timestamp: now,
        });
        log::debug!("burn {} by {:02x?}: debt {}", amount, &user[..4], position.debt);
        Ok(position)
    }

    fn do_deposit_and_mint(
        &mut self,
        user: &Address,
        collateral_amount: u128,
        now: u64,
    ) -> BtcUsdResult<u128> {
        // 1. Validate amount and price
        require_min_deposit(collateral_amount, self.config.min_deposit)?;
        let price = self.gateway.fresh_price(now)?.price;

        // 2. Size the mint so the ratio lands on the minimum
        let current = self.store.get(user);
        let collateral = current
            .collateral
            .checked_add(collateral_amount)
            .ok_or(BtcUsdError::Overflow)?;
        let minted = max_debt_at_ratio(collateral, price, self.params.min_collateral_ratio_bps)?
            .saturating_sub(current.debt);

        // 3. Commit both legs
        let check = self.min_ratio(price, UnsafeOperation::Mint);
        let cp = self.checkpoint(user, now);
        let position = self.store.apply(
            user,
            PositionDelta::new(signed(collateral_amount)?, signed(minted)?),
            check,
            now,
        )?;

        // 4. Pull collateral, then mint
        let result = self
            .pull_collateral(user, collateral_amount)
            .and_then(|_| self.mint_to(user, minted));
        self.settle(cp, result)?;

        self.events.emit(BtcUsdEvent::CollateralDeposited {
            user: *user,
            amount: collateral_amount,
            new_collateral: position.collateral,
            timestamp: now,
        });
        let new_ratio_bps = collateral_ratio_bps(position.collateral, position.debt, price)?;
        if minted > 0 {
            self.events.emit(BtcUsdEvent::StablecoinMinted {
                user: *user,
                amount: minted,
                new_debt: position.debt,
                new_ratio_bps,
                timestamp: now,
            });
        }
        log::debug!(
            "deposit {} and mint {} by {:02x?}: ratio {}bps",
            collateral_amount,
            minted,
            &user[..4],
            new_ratio_bps
        );
        Ok(minted)
    }

    fn do_repay_and_withdraw(
        &mut self,
        user: &Address,
        stable_amount: u128,
        now: u64,
    ) -> BtcUsdResult<u128> {
        // 1. Validate amount and price
        require_positive(stable_amount)?;
        let price = self.gateway.fresh_price(now)?.price;

        // 2. Pro-rata share of collateral; a full repay releases everything
        let current = self.store.get(user);
        if stable_amount > current.debt {
            return Err(BtcUsdError::ExceedsDebt {
                debt: current.debt,
                requested: stable_amount,
            });
        }
        let withdrawn = if stable_amount == current.debt {
            current.collateral
        } else {
            mul_div_floor(stable_amount, current.collateral, current.debt)?
        };

        // 3. Commit both legs
        let check = self.min_ratio(price, UnsafeOperation::Withdrawal);
        let cp = self.checkpoint(user, now);
        let position = self.store.apply(
            user,
            PositionDelta::new(-signed(withdrawn)?, -signed(stable_amount)?),
            check,
            now,
        )?;

        // 4. Burn, then pay out
        let result = self.burn_from(user, stable_amount).and_then(|_| {
            if withdrawn > 0 {
                self.release_collateral(user, user, withdrawn, now)
            } else {
                Ok(0)
            }
        });
        let paid = self.settle(cp, result)?;

        self.events.emit(BtcUsdEvent::StablecoinBurned {
            user: *user,
            amount: stable_amount,
            new_debt: position.debt,
            timestamp: now,
        });
        if withdrawn > 0 {
            let new_ratio_bps =
                collateral_ratio_bps(position.collateral, position.debt, price)?;
            self.events.emit(BtcUsdEvent::CollateralWithdrawn {
                user: *user,
                amount: withdrawn,
                new_collateral: position.collateral,
                new_ratio_bps,
                timestamp: now,
            });
        }
        log::debug!(
            "repay {} and withdraw {} by {:02x?}: debt {}",
            stable_amount,
            paid,
            &user[..4],
            position.debt
        );
        Ok(paid)
    }

    // ============ Guard ============

    /// Run a mutating operation behind the pause, reentrancy and global
    /// invariant checks
    fn guarded<T>(
        &mut self,
        now: u64,
        op: impl FnOnce(&mut Self) -> BtcUsdResult<T>,
    ) -> BtcUsdResult<T> {
        if self.entered {
            return Err(BtcUsdError::Reentrancy);
        }
        self.emergency.ensure_active()?;
        self.check_global_invariants(now)?;

        self.entered = true;
        let result = op(self);
        self.entered = false;
        result
    }

    /// Supply conservation and collateral backing against the ledgers
    pub fn verify_global_invariants(&self) -> BtcUsdResult<()> {
        // 1. Every btcUSD in existence is owed by some position
        let supply = self.stable.total_supply();
        let debt = self.store.total_debt();
        if supply != debt {
            return Err(BtcUsdError::GlobalInvariantBroken {
                invariant: GlobalInvariant::SupplyConservation,
                ledger_value: supply,
                accounted_value: debt,
            });
        }

        // 2. Held plus supplied wBTC covers every position
        let held = self
            .collateral
            .balance_of(&self.config.custody)
            .checked_add(self.yields.total_value())
            .ok_or(BtcUsdError::Overflow)?;
        let owed = self.store.total_collateral();
        if held < owed {
            return Err(BtcUsdError::GlobalInvariantBroken {
                invariant: GlobalInvariant::CollateralBacking,
                ledger_value: held,
                accounted_value: owed,
            });
        }

        Ok(())
    }

    /// Verify the global invariants; pause on a breach
    fn check_global_invariants(&mut self, now: u64) -> BtcUsdResult<()> {
        let err = match self.verify_global_invariants() {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        if let BtcUsdError::GlobalInvariantBroken {
            ledger_value,
            accounted_value,
            ..
        } = err
        {
            log::error!("{}; pausing engine", err);
            if self.emergency.pause(PauseReason::GlobalInvariantBreach, now) {
                self.events.emit(BtcUsdEvent::GlobalInvariantBreached {
                    ledger_value,
                    accounted_value,
                    timestamp: now,
                });
                self.events.emit(BtcUsdEvent::ProtocolPaused {
                    reason: PauseReason::GlobalInvariantBreach,
                    timestamp: now,
                });
            }
        }
        Err(err)
    }

    // ============ Commit Helpers ============

    fn min_ratio(&self, price: u128, operation: UnsafeOperation) -> InvariantCheck {
        InvariantCheck::MinRatio {
            price,
            min_ratio_bps: self.params.min_collateral_ratio_bps,
            operation,
        }
    }

    fn checkpoint(&self, user: &Address, now: u64) -> Checkpoint {
        Checkpoint {
            store: self.store.checkpoint(user),
            yields: self.yields.checkpoint(user),
            events: self.events.len(),
            legs: self.legs.len(),
            now,
        }
    }

    /// Keep the operation's effects, or reverse its ledger calls and
    /// restore local state if one of them failed
    fn settle<T>(&mut self, cp: Checkpoint, result: BtcUsdResult<T>) -> BtcUsdResult<T> {
        let err = match result {
            Ok(value) => {
                self.legs.clear();
                self.yields.commit();
                return Ok(value);
            }
            Err(err) => err,
        };
        log::debug!("rolling back: {}", err);

        // 1. Reverse ledger calls, newest first
        let mut unwound = Ok(());
        while self.legs.len() > cp.legs {
            let Some(leg) = self.legs.pop() else {
                break;
            };
            if let Err(undo_err) = self.reverse(leg) {
                log::error!("cannot reverse {:?}: {}", leg, undo_err);
                unwound = Err(undo_err);
                break;
            }
        }
        self.legs.truncate(cp.legs);

        // 2. Rewind the yield source and local bookkeeping
        let rewound = self.yields.restore(cp.yields);
        if let Err(undo_err) = &rewound {
            log::error!("cannot rewind yield source: {}", undo_err);
        }
        self.store.restore(cp.store);
        self.events.truncate(cp.events);

        // 3. Ledgers may now disagree with the store
        if unwound.is_err() || rewound.is_err() {
            self.halt(cp.now);
        }
        Err(err)
    }

    /// Pause after a rollback that could not be completed
    fn halt(&mut self, now: u64) {
        log::error!("rollback incomplete; pausing engine");
        if self.emergency.pause(PauseReason::GlobalInvariantBreach, now) {
            self.events.emit(BtcUsdEvent::ProtocolPaused {
                reason: PauseReason::GlobalInvariantBreach,
                timestamp: now,
            });
        }
    }

    fn reverse(&mut self, leg: Leg) -> BtcUsdResult<()> {
        let custody = self.config.custody;
        match leg {
            Leg::Collateral { from, to, amount } => self.move_collateral(&to, &from, amount),
            Leg::Stable { from, to, amount } => {
                if to == custody {
                    self.stable.transfer(&custody, &from, amount)
                } else {
                    self.stable.transfer_from(&custody, &to, &from, amount)
                }
            }
            Leg::Minted { to, amount } => self.stable.burn(&custody, &to, amount),
            Leg::Burned { from, amount } => self.stable.mint(&custody, &from, amount),
        }
    }

    // ============ Collaborator Calls ============

    /// Move `amount` wBTC from `user` into custody, or into the yield
    /// source when routing is on
    fn pull_collateral(&mut self, user: &Address, amount: u128) -> BtcUsdResult<()> {
        let custody = self.config.custody;
        let holder = if self.config.route_collateral_to_yield {
            self.yields.reserve()
        } else {
            custody
        };
        self.collateral.transfer_from(&custody, user, &holder, amount)?;
        self.legs.push(Leg::Collateral {
            from: *user,
            to: holder,
            amount,
        });
        if self.config.route_collateral_to_yield {
            self.yields.deposit(user, amount)?;
        }
        Ok(())
    }

    /// Redeem `amount` of `owner`'s collateral and pay it to `recipient`.
    /// Returns the wBTC actually paid.
    fn release_collateral(
        &mut self,
        owner: &Address,
        recipient: &Address,
        amount: u128,
        now: u64,
    ) -> BtcUsdResult<u128> {
        let (source, assets) = self.redeem_collateral(owner, amount, now)?;
        self.pay_collateral(&source, recipient, assets)?;
        Ok(assets)
    }

    /// Make `amount` of `owner`'s collateral spendable.
    ///
    /// Returns the account holding it and the assets redeemed. Routed
    /// collateral is harvested first so the owner keeps their yield.
    fn redeem_collateral(
        &mut self,
        owner: &Address,
        amount: u128,
        now: u64,
    ) -> BtcUsdResult<(Address, u128)> {
        if !self.config.route_collateral_to_yield {
            return Ok((self.config.custody, amount));
        }
        self.harvest_and_pay(owner, now)?;
        let assets = self.yields.withdraw(owner, amount)?;
        Ok((self.yields.reserve(), assets))
    }

    /// Pay wBTC held by `from` (custody or the yield reserve)
    fn pay_collateral(&mut self, from: &Address, to: &Address, amount: u128) -> BtcUsdResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.move_collateral(from, to, amount)?;
        self.legs.push(Leg::Collateral {
            from: *from,
            to: *to,
            amount,
        });
        Ok(())
    }

    /// Custody spends its own wBTC directly and anyone else's through
    /// their allowance
    fn move_collateral(&mut self, from: &Address, to: &Address, amount: u128) -> BtcUsdResult<()> {
        let custody = self.config.custody;
        if *from == custody {
            self.collateral.transfer(&custody, to, amount)
        } else {
            self.collateral.transfer_from(&custody, from, to, amount)
        }
    }

    fn harvest_and_pay(&mut self, user: &Address, now: u64) -> BtcUsdResult<(u128, u128)> {
        let (user_amount, protocol_amount) = self
            .yields
            .harvest(user, self.params.protocol_yield_share_bps)?;
        if user_amount == 0 && protocol_amount == 0 {
            return Ok((0, 0));
        }

        let reserve = self.yields.reserve();
        let treasury = self.config.treasury;
        self.pay_collateral(&reserve, user, user_amount)?;
        self.pay_collateral(&reserve, &treasury, protocol_amount)?;

        self.events.emit(BtcUsdEvent::YieldHarvested {
            user: *user,
            user_amount,
            protocol_amount,
            timestamp: now,
        });
        Ok((user_amount, protocol_amount))
    }

    fn mint_to(&mut self, user: &Address, amount: u128) -> BtcUsdResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.stable.mint(&self.config.custody, user, amount)?;
        self.legs.push(Leg::Minted { to: *user, amount });
        Ok(())
    }

    fn burn_from(&mut self, user: &Address, amount: u128) -> BtcUsdResult<()> {
        self.stable.burn(&self.config.custody, user, amount)?;
        self.legs.push(Leg::Burned {
            from: *user,
            amount,
        });
        Ok(())
    }

    /// Take `amount` btcUSD from `payer` into custody
    fn collect_stable(&mut self, payer: &Address, amount: u128) -> BtcUsdResult<()> {
        let custody = self.config.custody;
        self.stable.transfer_from(&custody, payer, &custody, amount)?;
        self.legs.push(Leg::Stable {
            from: *payer,
            to: custody,
            amount,
        });
        Ok(())
    }

    // ============ Accessors ============

    pub fn engine_id(&self) -> &[u8; 32] {
        &self.engine_id
    }

    pub fn params(&self) -> &ProtocolParameters {
        &self.params
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn emergency_state(&self) -> &EmergencyState {
        &self.emergency
    }

    pub fn is_paused(&self) -> bool {
        self.emergency.paused
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Drain the event log
    pub fn take_events(&mut self) -> EventLog {
        core::mem::take(&mut self.events)
    }

    pub fn store(&self) -> &PositionStore {
        &self.store
    }

    pub fn yield_engine(&self) -> &YieldEngine<Y> {
        &self.yields
    }

    pub fn price_feed(&self) -> &F {
        self.gateway.feed()
    }

    /// Host access to the feed, e.g. for an operator pushing prices
    pub fn price_feed_mut(&mut self) -> &mut F {
        self.gateway.feed_mut()
    }

    pub fn collateral_token(&self) -> &C {
        &self.collateral
    }

    /// Host access to the wBTC ledger
    pub fn collateral_token_mut(&mut self) -> &mut C {
        &mut self.collateral
    }

    pub fn stablecoin(&self) -> &S {
        &self.stable
    }

    /// Host access to the btcUSD ledger
    pub fn stablecoin_mut(&mut self) -> &mut S {
        &mut self.stable
    }

    /// Host access to the yield source
    pub fn yield_source_mut(&mut self) -> &mut Y {
        self.yields.source_mut()
    }
}

/// Amount as a signed delta
fn signed(amount: u128) -> BtcUsdResult<i128> {
    i128::try_from(amount).map_err(|_| BtcUsdError::Overflow)
}

// ============ Tests ============

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = EngineConfig::new(CUSTODY, CUSTODY);
        let result = VaultEngine::new(
            config,
            ProtocolParameters::default(),
            collaborators(),
            0,
        );
        assert!(matches!(
            result,
            Err(BtcUsdError::InvalidParameter { param: "treasury", .. })
        ));
    }

    #[test]
    fn test_new_rejects_invalid_params() {
        let params = ProtocolParameters {
            close_factor_bps: 0,
            ..ProtocolParameters::default()
        };
        let result = VaultEngine::new(
            EngineConfig::new(CUSTODY, TREASURY),
            params,
            collaborators(),
            0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_engine_id_unique_per_instance() {
        let (engine, cap) = setup(false);
        let (twin, twin_cap) = setup(false);
        assert_eq!(cap.engine_id(), engine.engine_id());
        assert_eq!(twin_cap.engine_id(), twin.engine_id());
        assert_ne!(engine.engine_id(), twin.engine_id());

        assert_eq!(
            derive_engine_id(&CUSTODY, &TREASURY, NONCE, 7),
            derive_engine_id(&CUSTODY, &TREASURY, NONCE, 7)
        );
        assert_ne!(
            derive_engine_id(&CUSTODY, &TREASURY, NONCE, 7),
            derive_engine_id(&CUSTODY, &TREASURY, NONCE, 8)
        );
    }

    #[test]
    fn test_deposit_updates_store_and_custody() {
        let (mut engine, _) = setup(false);
        let position = engine.deposit_collateral(&ALICE, HALF_BTC, T0).unwrap();

        assert_eq!(position.collateral, HALF_BTC);
        assert_eq!(position.last_update, T0);
        assert_eq!(engine.collateral_token().balance_of(&CUSTODY), HALF_BTC);
        assert_eq!(engine.store().total_collateral(), HALF_BTC);
        assert!(matches!(
            engine.events().last(),
            Some(BtcUsdEvent::CollateralDeposited { amount: HALF_BTC, .. })
        ));
    }

    #[test]
    fn test_deposit_below_minimum() {
        let (mut engine, _) = setup(false);
        let min = engine.config().min_deposit;
        assert_eq!(
            engine.deposit_collateral(&ALICE, 0, T0),
            Err(BtcUsdError::ZeroAmount)
        );
        assert!(matches!(
            engine.deposit_collateral(&ALICE, min - 1, T0),
            Err(BtcUsdError::BelowMinimumDeposit { .. })
        ));
        assert!(engine.store().is_empty());
    }

    #[test]
    fn test_deposit_without_allowance_rolls_back() {
        let (mut engine, _) = setup(false);
        engine.collateral_token_mut().approve(&ALICE, &CUSTODY, 0);

        let err = engine.deposit_collateral(&ALICE, HALF_BTC, T0).unwrap_err();
        assert!(matches!(err, BtcUsdError::InsufficientAllowance { .. }));

        assert!(engine.store().is_empty());
        assert_eq!(engine.store().total_collateral(), 0);
        assert!(engine.events().is_empty());
    }

    #[test]
    fn test_mint_failure_rolls_back() {
        let (mut engine, _) = setup(false);
        engine.deposit_collateral(&ALICE, HALF_BTC, T0).unwrap();
        engine.stablecoin_mut().set_frozen(&ALICE, true);

        assert!(engine.mint_stablecoin(&ALICE, ONE_STABLE, T0).is_err());
        assert_eq!(engine.get_position(&ALICE).debt, 0);
        assert_eq!(engine.store().total_debt(), 0);
        assert!(engine.verify_global_invariants().is_ok());
    }

    #[test]
    fn test_journal_cleared_after_settle() {
        let (mut engine, _) = setup(true);
        engine.deposit_and_mint(&ALICE, HALF_BTC, T0).unwrap();
        assert!(engine.legs.is_empty());

        engine.stablecoin_mut().set_frozen(&BOB, true);
        assert!(engine.deposit_and_mint(&BOB, HALF_BTC, T0).is_err());
        assert!(engine.legs.is_empty());
        assert_eq!(engine.collateral_token().balance_of(&BOB), 10 * ONE_BTC);
        assert_eq!(engine.yield_record(&BOB).deposited_principal, 0);
    }

    #[test]
    fn test_burn_more_than_debt() {
        let (mut engine, _) = setup(false);
        engine.deposit_and_mint(&ALICE, HALF_BTC, T0).unwrap();
        let debt = engine.get_position(&ALICE).debt;

        assert!(matches!(
            engine.burn_stablecoin(&ALICE, debt + 1, T0),
            Err(BtcUsdError::ExceedsDebt { .. })
        ));
    }

    #[test]
    fn test_burn_requires_balance() {
        let (mut engine, _) = setup(false);
        engine.deposit_and_mint(&ALICE, HALF_BTC, T0).unwrap();
        let debt = engine.get_position(&ALICE).debt;

        // Alice gives away half of her btcUSD and can no longer repay in full
        engine
            .stablecoin_mut()
            .transfer(&ALICE, &BOB, debt / 2)
            .unwrap();
        assert!(matches!(
            engine.burn_stablecoin(&ALICE, debt, T0),
            Err(BtcUsdError::InsufficientBalance { .. })
        ));
        assert_eq!(engine.get_position(&ALICE).debt, debt);
    }

    #[test]
    fn test_reentrant_call_rejected() {
        let (mut engine, _) = setup(false);
        engine.entered = true;
        assert_eq!(
            engine.deposit_collateral(&ALICE, HALF_BTC, T0),
            Err(BtcUsdError::Reentrancy)
        );
        engine.entered = false;
        assert!(engine.deposit_collateral(&ALICE, HALF_BTC, T0).is_ok());
    }

    #[test]
    fn test_guard_cleared_after_failure() {
        let (mut engine, _) = setup(false);
        assert!(engine.withdraw_collateral(&ALICE, 1, T0).is_err());
        assert!(!engine.entered);
    }

    #[test]
    fn test_repay_and_withdraw_zero_debt() {
        let (mut engine, _) = setup(false);
        engine.deposit_collateral(&ALICE, HALF_BTC, T0).unwrap();
        assert!(matches!(
            engine.repay_and_withdraw(&ALICE, 1, T0),
            Err(BtcUsdError::ExceedsDebt { debt: 0, requested: 1 })
        ));
    }

    #[test]
    fn test_take_events_drains_log() {
        let (mut engine, _) = setup(false);
        engine.deposit_collateral(&ALICE, HALF_BTC, T0).unwrap();
        let log = engine.take_events();
        assert_eq!(log.len(), 1);
        assert!(engine.events().is_empty());
    }
}
