//! The wallet's signed, append-only ledger (§3, §4.6, §6): one JSON-lines
//! file per node, one `LedgerEntry` per line, mirroring the other
//! persisted-JSON state this codebase already uses (keys, reputation).

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use mesh_core::{now_unix, NodeId, Timestamp};
use mesh_crypto::{content_id_hex, SigningIdentity};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxType {
    Deposit,
    Withdraw,
    Stake,
    Unstake,
    Slash,
    Transfer,
}

/// A single signed, content-addressable ledger entry (§3). `entry_id` is
/// derived from the entry's own canonical fields, so re-appending an
/// export never collides with a prior entry by chance, and `signature` is
/// an Ed25519 signature over those same fields under this node's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub ts: Timestamp,
    pub from: Option<NodeId>,
    pub to: Option<NodeId>,
    pub amount: f64,
    pub tx_type: TxType,
    pub reason: String,
    pub job_id: Option<String>,
    pub balance_after: f64,
    pub signature: String,
}

impl LedgerEntry {
    #[allow(clippy::too_many_arguments)]
    fn new(
        identity: &SigningIdentity,
        from: Option<NodeId>,
        to: Option<NodeId>,
        amount: f64,
        tx_type: TxType,
        reason: String,
        job_id: Option<String>,
        balance_after: f64,
    ) -> Self {
        let ts = now_unix();
        let tx_type_str = format!("{tx_type:?}");
        let entry_id = content_id_hex(&[
            &ts.to_string(),
            from.as_deref().unwrap_or(""),
            to.as_deref().unwrap_or(""),
            &amount.to_string(),
            &tx_type_str,
            job_id.as_deref().unwrap_or(""),
            &balance_after.to_string(),
        ]);
        let signable = serde_json::json!({
            "entry_id": entry_id,
            "ts": ts,
            "from": from,
            "to": to,
            "amount": amount,
            "tx_type": tx_type,
            "reason": reason,
            "job_id": job_id,
            "balance_after": balance_after,
        });
        let signature = identity
            .sign_canonical(&signable)
            .expect("canonicalizing a ledger entry's own fields cannot fail");
        Self {
            entry_id,
            ts,
            from,
            to,
            amount,
            tx_type,
            reason,
            job_id,
            balance_after,
            signature,
        }
    }
}

/// An append-only JSON-lines ledger file plus the in-memory transaction list
/// mirroring it (§4.6: "appends a signed `LedgerEntry` to the on-disk log
/// and to an in-memory transaction list").
pub struct Ledger {
    path: PathBuf,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// Opens (or creates) the ledger file at `path` and replays any
    /// existing entries into memory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut entries = Vec::new();
        if path.exists() {
            let file = OpenOptions::new().read(true).open(&path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                entries.push(serde_json::from_str(&line)?);
            }
        }
        Ok(Self { path, entries })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &mut self,
        identity: &SigningIdentity,
        from: Option<NodeId>,
        to: Option<NodeId>,
        amount: f64,
        tx_type: TxType,
        reason: String,
        job_id: Option<String>,
        balance_after: f64,
    ) -> Result<LedgerEntry> {
        let entry = LedgerEntry::new(identity, from, to, amount, tx_type, reason, job_id, balance_after);
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(&entry)?)?;
        self.entries.push(entry.clone());
        Ok(entry)
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// §8 wallet-conservation property: the sum of signed ledger amounts
    /// (deposits/unstake-success positive, withdraw/stake/slash negative
    /// from the node's own perspective) reconciled against current state.
    pub fn net_signed_amount(&self) -> f64 {
        self.entries
            .iter()
            .map(|e| match e.tx_type {
                TxType::Deposit | TxType::Unstake => e.amount,
                TxType::Withdraw | TxType::Stake | TxType::Slash => -e.amount,
                TxType::Transfer => 0.0,
            })
            .sum()
    }
}
