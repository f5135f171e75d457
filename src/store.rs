// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Ledger store: transactional tables with exclusive wallet row locks.
//!
//! The store models a relational store's read-modify-write contract:
//!
//! - [`LedgerStore::wallet_tx`] locks one wallet row exclusively, runs the
//!   caller's closure against a staged copy, and commits the staged wallet
//!   and entry writes atomically while the lock is still held. A closure
//!   error rolls the transaction back; no partial writes become visible.
//! - The unique user index resolves concurrent first-touch wallet creation:
//!   the loser of the race re-reads the winner's row instead of erroring.
//! - The wallet `version` counter is checked again at commit. The row lock
//!   makes a mismatch unreachable for writers that go through `wallet_tx`;
//!   a differently-scoped writer (stale [`LedgerStore::save_wallet`]) trips
//!   it and gets [`StoreError::VersionConflict`].
//!
//! Non-mutating reads (balance, history, purchase queries) take no
//! transaction and hold no lock beyond the momentary row snapshot.

use crate::base::{EntryId, PurchaseId, UserId, WalletId};
use crate::entry::LedgerEntry;
use crate::error::{LedgerError, StoreError};
use crate::purchase::PurchaseRecord;
use crate::wallet::Wallet;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::Arc;

/// One wallet row; the mutex is the exclusive row lock.
#[derive(Debug)]
struct WalletRow {
    inner: Mutex<Wallet>,
}

impl WalletRow {
    fn new(wallet: Wallet) -> Self {
        Self {
            inner: Mutex::new(wallet),
        }
    }
}

/// In-memory transactional store for wallets, entries, and purchases.
#[derive(Debug, Default)]
pub struct LedgerStore {
    /// Wallet rows indexed by wallet ID.
    wallets: DashMap<WalletId, Arc<WalletRow>>,
    /// Unique constraint: one wallet per user.
    user_index: DashMap<UserId, WalletId>,
    /// Committed ledger entries indexed by entry ID.
    entries: DashMap<EntryId, LedgerEntry>,
    /// Per-wallet entry log in commit order.
    wallet_entries: DashMap<WalletId, Vec<EntryId>>,
    /// Purchase records indexed by purchase ID.
    purchases: DashMap<PurchaseId, PurchaseRecord>,
    /// Per-user purchase log in creation order.
    user_purchases: DashMap<UserId, Vec<PurchaseId>>,
}

/// Scope handed to [`LedgerStore::wallet_tx`] closures.
///
/// Wallet mutation happens on a staged copy; entry writes are staged in
/// order. Nothing is visible outside the transaction until commit.
pub struct WalletTx<'a> {
    store: &'a LedgerStore,
    wallet: Wallet,
    dirty: bool,
    inserts: Vec<LedgerEntry>,
    updates: Vec<LedgerEntry>,
}

impl WalletTx<'_> {
    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Staged wallet for mutation; marks the row dirty so commit bumps the
    /// version counter.
    pub fn wallet_mut(&mut self) -> &mut Wallet {
        self.dirty = true;
        &mut self.wallet
    }

    /// Reads an entry as of this transaction: staged writes shadow the
    /// committed row.
    pub fn find_entry(&self, entry_id: EntryId) -> Option<LedgerEntry> {
        self.updates
            .iter()
            .chain(self.inserts.iter())
            .rev()
            .find(|e| e.id == entry_id)
            .cloned()
            .or_else(|| self.store.find_entry(entry_id))
    }

    /// Stages a new entry for insertion at commit.
    pub fn save_entry(&mut self, entry: LedgerEntry) {
        self.inserts.push(entry);
    }

    /// Stages a replacement of an existing entry (status transitions).
    pub fn update_entry(&mut self, entry: LedgerEntry) {
        self.updates.push(entry);
    }
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a wallet with balance 0, failing if the user already has one.
    pub fn create_wallet(&self, user_id: UserId) -> Result<Wallet, StoreError> {
        match self.user_index.entry(user_id) {
            Entry::Occupied(_) => Err(StoreError::DuplicateUser { user_id }),
            Entry::Vacant(vacant) => {
                let wallet = Wallet::new(user_id);
                self.wallets
                    .insert(wallet.id, Arc::new(WalletRow::new(wallet.clone())));
                vacant.insert(wallet.id);
                Ok(wallet)
            }
        }
    }

    /// Returns the user's wallet, lazily creating it with balance 0.
    ///
    /// The unique user index serializes concurrent first-touch calls; the
    /// loser of the race reads the winner's row.
    pub fn get_or_create_wallet(&self, user_id: UserId) -> Wallet {
        let wallet_id = match self.user_index.entry(user_id) {
            Entry::Occupied(occupied) => *occupied.get(),
            Entry::Vacant(vacant) => {
                let wallet = Wallet::new(user_id);
                let wallet_id = wallet.id;
                self.wallets
                    .insert(wallet_id, Arc::new(WalletRow::new(wallet)));
                vacant.insert(wallet_id);
                wallet_id
            }
        };
        // The row is inserted before the index entry and rows are never
        // deleted, so this lookup cannot miss.
        self.find_wallet(wallet_id).unwrap()
    }

    /// Snapshot read of a wallet row.
    pub fn find_wallet(&self, wallet_id: WalletId) -> Option<Wallet> {
        let row = self
            .wallets
            .get(&wallet_id)
            .map(|r| Arc::clone(r.value()))?;
        let wallet = row.inner.lock().clone();
        Some(wallet)
    }

    pub fn find_wallet_by_user(&self, user_id: UserId) -> Option<Wallet> {
        let wallet_id = *self.user_index.get(&user_id)?;
        self.find_wallet(wallet_id)
    }

    /// Writes a wallet read outside a transaction back to its row.
    ///
    /// The caller's copy must still carry the current version; a stale copy
    /// is a lost update and is rejected with
    /// [`StoreError::VersionConflict`].
    pub fn save_wallet(&self, wallet: Wallet) -> Result<Wallet, StoreError> {
        let row = self
            .wallets
            .get(&wallet.id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(StoreError::WalletNotFound)?;
        let mut guard = row.inner.lock();
        Self::apply(&mut guard, wallet)
    }

    /// Runs `f` with the wallet row exclusively locked.
    ///
    /// On `Ok` the staged wallet and entry writes commit atomically under
    /// the same lock; on `Err` the transaction rolls back and nothing is
    /// applied.
    pub fn wallet_tx<T>(
        &self,
        wallet_id: WalletId,
        f: impl FnOnce(&mut WalletTx<'_>) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let row = self
            .wallets
            .get(&wallet_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(StoreError::WalletNotFound)?;
        let mut guard = row.inner.lock();

        let mut tx = WalletTx {
            store: self,
            wallet: guard.clone(),
            dirty: false,
            inserts: Vec::new(),
            updates: Vec::new(),
        };
        let out = f(&mut tx)?;

        let WalletTx {
            wallet,
            dirty,
            inserts,
            updates,
            ..
        } = tx;

        for entry in &inserts {
            if self.entries.contains_key(&entry.id) {
                return Err(LedgerError::Persistence(format!(
                    "duplicate ledger entry id {}",
                    entry.id
                )));
            }
        }
        if dirty {
            Self::apply(&mut guard, wallet)?;
        }
        for entry in updates {
            self.entries.insert(entry.id, entry);
        }
        for entry in inserts {
            self.wallet_entries
                .entry(entry.wallet_id)
                .or_default()
                .push(entry.id);
            self.entries.insert(entry.id, entry);
        }
        Ok(out)
    }

    /// Version-checked row write; the single point every wallet save goes
    /// through.
    fn apply(current: &mut Wallet, mut staged: Wallet) -> Result<Wallet, StoreError> {
        if current.version != staged.version {
            return Err(StoreError::VersionConflict {
                wallet_id: staged.id,
                expected: staged.version,
                actual: current.version,
            });
        }
        staged.version += 1;
        staged.updated_at = Utc::now();
        *current = staged;
        Ok(current.clone())
    }

    pub fn find_entry(&self, entry_id: EntryId) -> Option<LedgerEntry> {
        self.entries.get(&entry_id).map(|e| e.clone())
    }

    /// Committed entries for one wallet, newest first.
    pub fn entries_by_wallet(
        &self,
        wallet_id: WalletId,
        limit: usize,
        offset: usize,
    ) -> Vec<LedgerEntry> {
        // Snapshot the id page first so no two table locks are ever nested.
        let page: Vec<EntryId> = match self.wallet_entries.get(&wallet_id) {
            Some(log) => log.iter().rev().skip(offset).take(limit).copied().collect(),
            None => return Vec::new(),
        };
        page.into_iter()
            .filter_map(|id| self.find_entry(id))
            .collect()
    }

    /// Inserts or replaces a purchase record.
    pub fn save_purchase(&self, record: &PurchaseRecord) {
        // The entry guard is released before the per-user log is touched;
        // holding both at once could cross-lock with a concurrent listing.
        let is_new = match self.purchases.entry(record.id) {
            Entry::Vacant(vacant) => {
                vacant.insert(record.clone());
                true
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(record.clone());
                false
            }
        };
        if is_new {
            self.user_purchases
                .entry(record.user_id)
                .or_default()
                .push(record.id);
        }
    }

    pub fn find_purchase(&self, purchase_id: PurchaseId) -> Option<PurchaseRecord> {
        self.purchases.get(&purchase_id).map(|p| p.clone())
    }

    /// Purchase records for one user, newest first.
    pub fn purchases_by_user(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Vec<PurchaseRecord> {
        let page: Vec<PurchaseId> = match self.user_purchases.get(&user_id) {
            Some(log) => log.iter().rev().skip(offset).take(limit).copied().collect(),
            None => return Vec::new(),
        };
        page.into_iter()
            .filter_map(|id| self.find_purchase(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryMetadata, EntryType};
    use rust_decimal_macros::dec;

    fn funded_wallet(store: &LedgerStore, user_id: UserId) -> Wallet {
        let wallet = store.get_or_create_wallet(user_id);
        store
            .wallet_tx(wallet.id, |tx| {
                tx.wallet_mut().credit(dec!(100.00))?;
                Ok(())
            })
            .unwrap();
        store.find_wallet(wallet.id).unwrap()
    }

    #[test]
    fn create_wallet_rejects_duplicate_user() {
        let store = LedgerStore::new();
        let user_id = UserId::new();
        store.create_wallet(user_id).unwrap();

        let result = store.create_wallet(user_id);
        assert_eq!(result, Err(StoreError::DuplicateUser { user_id }));
    }

    #[test]
    fn get_or_create_is_stable() {
        let store = LedgerStore::new();
        let user_id = UserId::new();

        let first = store.get_or_create_wallet(user_id);
        let second = store.get_or_create_wallet(user_id);

        assert_eq!(first.id, second.id);
        assert_eq!(second.balance(), dec!(0));
    }

    #[test]
    fn commit_bumps_version_once() {
        let store = LedgerStore::new();
        let wallet = funded_wallet(&store, UserId::new());
        assert_eq!(wallet.version, 1);
        assert_eq!(wallet.balance(), dec!(100.00));
    }

    #[test]
    fn failed_tx_leaves_no_partial_writes() {
        let store = LedgerStore::new();
        let wallet = funded_wallet(&store, UserId::new());

        let result: Result<(), LedgerError> = store.wallet_tx(wallet.id, |tx| {
            tx.wallet_mut().credit(dec!(50.00))?;
            tx.save_entry(LedgerEntry::completed(
                EntryType::Credit,
                tx.wallet().id,
                tx.wallet().user_id,
                dec!(50.00),
                "REF_1".into(),
                EntryMetadata::default(),
            ));
            Err(LedgerError::Persistence("forced abort".into()))
        });
        assert!(result.is_err());

        let after = store.find_wallet(wallet.id).unwrap();
        assert_eq!(after.balance(), dec!(100.00));
        assert_eq!(after.version, wallet.version);
        assert!(store.entries_by_wallet(wallet.id, 10, 0).is_empty());
    }

    #[test]
    fn stale_save_wallet_hits_version_conflict() {
        let store = LedgerStore::new();
        let stale = funded_wallet(&store, UserId::new());

        // A second writer commits through the locked path.
        store
            .wallet_tx(stale.id, |tx| {
                tx.wallet_mut().credit(dec!(1.00))?;
                Ok(())
            })
            .unwrap();

        let result = store.save_wallet(stale.clone());
        assert_eq!(
            result,
            Err(StoreError::VersionConflict {
                wallet_id: stale.id,
                expected: stale.version,
                actual: stale.version + 1,
            })
        );
    }

    #[test]
    fn duplicate_entry_id_aborts_commit() {
        let store = LedgerStore::new();
        let wallet = funded_wallet(&store, UserId::new());

        let entry = LedgerEntry::completed(
            EntryType::Credit,
            wallet.id,
            wallet.user_id,
            dec!(10.00),
            "REF_DUP".into(),
            EntryMetadata::default(),
        );
        store
            .wallet_tx(wallet.id, |tx| {
                tx.save_entry(entry.clone());
                Ok(())
            })
            .unwrap();

        let result = store.wallet_tx(wallet.id, |tx| {
            tx.wallet_mut().credit(dec!(10.00))?;
            tx.save_entry(entry.clone());
            Ok(())
        });
        assert!(matches!(result, Err(LedgerError::Persistence(_))));

        // The wallet mutation staged alongside the duplicate did not land.
        let after = store.find_wallet(wallet.id).unwrap();
        assert_eq!(after.balance(), dec!(100.00));
    }

    #[test]
    fn entry_log_is_newest_first() {
        let store = LedgerStore::new();
        let wallet = funded_wallet(&store, UserId::new());

        for i in 1..=3 {
            store
                .wallet_tx(wallet.id, |tx| {
                    tx.save_entry(LedgerEntry::completed(
                        EntryType::Credit,
                        wallet.id,
                        wallet.user_id,
                        dec!(1.00),
                        format!("REF_{i}"),
                        EntryMetadata::default(),
                    ));
                    Ok(())
                })
                .unwrap();
        }

        let entries = store.entries_by_wallet(wallet.id, 10, 0);
        let refs: Vec<_> = entries.iter().map(|e| e.reference.as_str()).collect();
        assert_eq!(refs, vec!["REF_3", "REF_2", "REF_1"]);

        let page = store.entries_by_wallet(wallet.id, 1, 1);
        assert_eq!(page[0].reference, "REF_2");
    }

    #[test]
    fn tx_reads_see_staged_entries() {
        let store = LedgerStore::new();
        let wallet = funded_wallet(&store, UserId::new());

        store
            .wallet_tx(wallet.id, |tx| {
                let entry = LedgerEntry::completed(
                    EntryType::Debit,
                    wallet.id,
                    wallet.user_id,
                    dec!(5.00),
                    "REF_STAGED".into(),
                    EntryMetadata::default(),
                );
                let id = entry.id;
                tx.save_entry(entry);
                assert!(tx.find_entry(id).is_some());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn unknown_wallet_tx_fails() {
        let store = LedgerStore::new();
        let result: Result<(), LedgerError> = store.wallet_tx(WalletId::new(), |_| Ok(()));
        assert_eq!(result, Err(LedgerError::WalletNotFound));
    }

    #[test]
    fn purchase_log_is_newest_first() {
        let store = LedgerStore::new();
        let user_id = UserId::new();

        let mut ids = Vec::new();
        for _ in 0..3 {
            let record = PurchaseRecord::pending(
                user_id,
                crate::purchase::BillKind::Water,
                dec!(10.00),
                "m-1".into(),
                None,
            );
            ids.push(record.id);
            store.save_purchase(&record);
        }

        let history = store.purchases_by_user(user_id, 10, 0);
        let got: Vec<_> = history.iter().map(|p| p.id).collect();
        ids.reverse();
        assert_eq!(got, ids);
    }
}
