//! The node-global token wallet (§3, §4.6): balance, staked amount,
//! lifetime totals, and the signed ledger backing every mutation.
//!
//! All mutating operations take `&self` rather than `&mut self` and
//! serialize through an internal mutex (§5: "the wallet is node-global and
//! serialized... single writer"), so a `Wallet` is shared via `Arc` across
//! the auction, executor, and settlement tasks without an outer lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use mesh_core::NodeId;
use mesh_crypto::SigningIdentity;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, WalletError};
use crate::ledger::{Ledger, LedgerEntry, TxType};

struct WalletState {
    balance: f64,
    staked: f64,
    lifetime_earned: f64,
    lifetime_spent: f64,
    staked_by_job: HashMap<String, f64>,
    /// Funded by slashed stakes (§4.6); drawn down to pay on-time success
    /// bonuses during settlement.
    reward_pool: f64,
    ledger: Ledger,
}

pub struct Wallet {
    node_id: NodeId,
    identity: SigningIdentity,
    inner: Mutex<WalletState>,
    snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletStats {
    pub balance: f64,
    pub staked: f64,
    pub lifetime_earned: f64,
    pub lifetime_spent: f64,
    pub reward_pool: f64,
    pub transaction_count: usize,
}

/// The persisted snapshot written alongside the ledger (§6:
/// `wallet_<node_id>.json` — "a cached summary", the ledger remains
/// authoritative).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WalletSnapshot {
    balance: f64,
    staked: f64,
    lifetime_earned: f64,
    lifetime_spent: f64,
    reward_pool: f64,
}

impl Wallet {
    pub fn open(
        node_id: NodeId,
        identity: SigningIdentity,
        starting_balance: f64,
        ledger_path: impl AsRef<Path>,
        snapshot_path: Option<PathBuf>,
    ) -> Result<Self> {
        let ledger = Ledger::open(ledger_path)?;

        let (balance, staked, lifetime_earned, lifetime_spent, reward_pool) =
            if let Some(path) = snapshot_path.as_ref().filter(|p| p.exists()) {
                match std::fs::read_to_string(path)
                    .map_err(WalletError::from)
                    .and_then(|s| serde_json::from_str::<WalletSnapshot>(&s).map_err(WalletError::from))
                {
                    Ok(snap) => (
                        snap.balance,
                        snap.staked,
                        snap.lifetime_earned,
                        snap.lifetime_spent,
                        snap.reward_pool,
                    ),
                    Err(e) => {
                        warn!(error = %e, "failed to load wallet snapshot, reconstructing from ledger");
                        replay_from_ledger(&ledger, starting_balance)
                    }
                }
            } else if ledger.entries().is_empty() {
                (starting_balance, 0.0, 0.0, 0.0, 0.0)
            } else {
                replay_from_ledger(&ledger, starting_balance)
            };

        Ok(Self {
            node_id,
            identity,
            inner: Mutex::new(WalletState {
                balance,
                staked,
                lifetime_earned,
                lifetime_spent,
                staked_by_job: HashMap::new(),
                reward_pool,
                ledger,
            }),
            snapshot_path,
        })
    }

    fn persist_snapshot(&self, state: &WalletState) {
        let Some(path) = &self.snapshot_path else { return };
        let snapshot = WalletSnapshot {
            balance: state.balance,
            staked: state.staked,
            lifetime_earned: state.lifetime_earned,
            lifetime_spent: state.lifetime_spent,
            reward_pool: state.reward_pool,
        };
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!(error = %e, "failed to persist wallet snapshot");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize wallet snapshot"),
        }
    }

    /// §4.6: amounts must be strictly positive.
    pub fn deposit(
        &self,
        amount: f64,
        reason: impl Into<String>,
        job_id: Option<String>,
        from_node: Option<NodeId>,
    ) -> Result<LedgerEntry> {
        if amount <= 0.0 {
            return Err(WalletError::invalid_amount(amount));
        }
        let mut state = self.inner.lock();
        state.balance += amount;
        state.lifetime_earned += amount;
        let balance_after = state.balance;
        let entry = state.ledger.append(
            &self.identity,
            from_node,
            Some(self.node_id.clone()),
            amount,
            TxType::Deposit,
            reason.into(),
            job_id,
            balance_after,
        )?;
        self.persist_snapshot(&state);
        debug!(amount, balance_after, "wallet deposit");
        Ok(entry)
    }

    /// §4.6: "withdraw fails silently (returns no transaction) if amount >
    /// balance" — an insufficient-funds withdraw is not an `InvalidAmount`
    /// error, it simply produces no ledger entry.
    pub fn withdraw(&self, amount: f64, reason: impl Into<String>) -> Result<Option<LedgerEntry>> {
        if amount <= 0.0 {
            return Err(WalletError::invalid_amount(amount));
        }
        let mut state = self.inner.lock();
        if amount > state.balance {
            debug!(amount, balance = state.balance, "withdraw declined: insufficient balance");
            return Ok(None);
        }
        state.balance -= amount;
        state.lifetime_spent += amount;
        let balance_after = state.balance;
        let entry = state.ledger.append(
            &self.identity,
            Some(self.node_id.clone()),
            None,
            amount,
            TxType::Withdraw,
            reason.into(),
            None,
            balance_after,
        )?;
        self.persist_snapshot(&state);
        Ok(Some(entry))
    }

    /// §4.4.4, §4.6: reserves `amount` from balance into the job's stake.
    pub fn stake(&self, amount: f64, job_id: impl Into<String>) -> Result<LedgerEntry> {
        if amount <= 0.0 {
            return Err(WalletError::invalid_amount(amount));
        }
        let job_id = job_id.into();
        let mut state = self.inner.lock();
        if state.balance < amount {
            return Err(WalletError::insufficient_stake(job_id, state.balance, amount));
        }
        state.balance -= amount;
        state.staked += amount;
        *state.staked_by_job.entry(job_id.clone()).or_insert(0.0) += amount;
        let balance_after = state.balance;
        let entry = state.ledger.append(
            &self.identity,
            Some(self.node_id.clone()),
            None,
            amount,
            TxType::Stake,
            "auction stake reservation".to_string(),
            Some(job_id),
            balance_after,
        )?;
        self.persist_snapshot(&state);
        Ok(entry)
    }

    /// §4.4.4, §4.6: releases a stake. `success=true` returns it to balance
    /// (a claim that completed, or a reservation returned after a partition
    /// aborted execution before it started); `success=false` is a slash —
    /// staked decreases, balance is *not* credited, and the amount funds the
    /// reward pool.
    pub fn unstake(&self, amount: f64, job_id: &str, success: bool) -> Result<LedgerEntry> {
        if amount <= 0.0 {
            return Err(WalletError::invalid_amount(amount));
        }
        let mut state = self.inner.lock();
        let currently_staked = state.staked_by_job.get(job_id).copied().unwrap_or(0.0);
        if amount > currently_staked {
            // §4.6: unstaking more than is staked for the job is an invalid
            // amount, not an insufficient-stake condition (that variant is
            // reserved for `stake` failing to reserve from the balance).
            return Err(WalletError::invalid_amount(amount));
        }

        state.staked -= amount;
        *state.staked_by_job.entry(job_id.to_string()).or_insert(0.0) -= amount;

        let tx_type = if success {
            state.balance += amount;
            TxType::Unstake
        } else {
            state.reward_pool += amount;
            TxType::Slash
        };
        let balance_after = state.balance;
        let entry = state.ledger.append(
            &self.identity,
            None,
            Some(self.node_id.clone()),
            amount,
            tx_type,
            if success { "stake released" } else { "stake slashed" }.to_string(),
            Some(job_id.to_string()),
            balance_after,
        )?;
        self.persist_snapshot(&state);
        if !success {
            warn!(job_id, amount, "stake slashed");
        }
        Ok(entry)
    }

    pub fn can_afford(&self, amount: f64) -> bool {
        self.inner.lock().balance >= amount
    }

    pub fn balance(&self) -> f64 {
        self.inner.lock().balance
    }

    pub fn staked(&self) -> f64 {
        self.inner.lock().staked
    }

    pub fn reward_pool(&self) -> f64 {
        self.inner.lock().reward_pool
    }

    /// Draws up to `desired` from the reward pool (never more than what's
    /// available), crediting it to the wallet balance. Used by settlement
    /// to pay on-time success bonuses (§4.6). Returns the amount actually
    /// drawn.
    pub fn draw_reward_pool(&self, desired: f64, reason: impl Into<String>, job_id: Option<String>) -> f64 {
        if desired <= 0.0 {
            return 0.0;
        }
        let mut state = self.inner.lock();
        let drawn = desired.min(state.reward_pool);
        if drawn <= 0.0 {
            return 0.0;
        }
        state.reward_pool -= drawn;
        state.balance += drawn;
        state.lifetime_earned += drawn;
        let balance_after = state.balance;
        if let Err(e) = state.ledger.append(
            &self.identity,
            None,
            Some(self.node_id.clone()),
            drawn,
            TxType::Deposit,
            reason.into(),
            job_id,
            balance_after,
        ) {
            warn!(error = %e, "failed to record reward-pool draw in ledger");
        }
        self.persist_snapshot(&state);
        drawn
    }

    pub fn get_stats(&self) -> WalletStats {
        let state = self.inner.lock();
        WalletStats {
            balance: state.balance,
            staked: state.staked,
            lifetime_earned: state.lifetime_earned,
            lifetime_spent: state.lifetime_spent,
            reward_pool: state.reward_pool,
            transaction_count: state.ledger.entries().len(),
        }
    }

    /// §8 wallet-conservation property check: `balance + staked >= 0` and
    /// both are individually non-negative, as every operation above
    /// enforces by construction.
    pub fn invariants_hold(&self) -> bool {
        let state = self.inner.lock();
        state.balance >= 0.0 && state.staked >= 0.0
    }
}

fn replay_from_ledger(ledger: &Ledger, starting_balance: f64) -> (f64, f64, f64, f64, f64) {
    let mut balance = starting_balance;
    let mut staked = 0.0;
    let mut lifetime_earned = 0.0;
    let mut lifetime_spent = 0.0;
    let reward_pool = 0.0;
    for entry in ledger.entries() {
        match entry.tx_type {
            TxType::Deposit => {
                balance += entry.amount;
                lifetime_earned += entry.amount;
            }
            TxType::Withdraw => {
                balance -= entry.amount;
                lifetime_spent += entry.amount;
            }
            TxType::Stake => {
                balance -= entry.amount;
                staked += entry.amount;
            }
            TxType::Unstake => {
                staked -= entry.amount;
                balance += entry.amount;
            }
            TxType::Slash => {
                staked -= entry.amount;
            }
            TxType::Transfer => {}
        }
    }
    (balance, staked, lifetime_earned, lifetime_spent, reward_pool)
}
