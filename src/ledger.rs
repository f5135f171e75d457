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

//! Wallet ledger service.
//!
//! Owns every balance mutation. Each mutating operation runs inside one
//! store transaction that holds the wallet's exclusive row lock from the
//! balance read to the commit; this serializes concurrent debits, credits,
//! and reversals against the same wallet and is the mechanism that prevents
//! lost updates and overdrafts. Balance and history reads take no lock.

use crate::base::{EntryId, UserId, WalletId};
use crate::entry::{EntryMetadata, EntryStatus, EntryType, LedgerEntry};
use crate::error::LedgerError;
use crate::store::LedgerStore;
use crate::wallet::Wallet;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Balance mutation service over the ledger store.
pub struct WalletLedger {
    store: Arc<LedgerStore>,
}

impl WalletLedger {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO || amount.normalize().scale() > Wallet::DECIMAL_PRECISION {
            return Err(LedgerError::InvalidAmount);
        }
        Ok(())
    }

    /// Creates a wallet with balance 0 for the user.
    ///
    /// # Errors
    ///
    /// [`LedgerError::WalletAlreadyExists`] if the user already has one.
    pub fn create_wallet(&self, user_id: UserId) -> Result<Wallet, LedgerError> {
        let wallet = self.store.create_wallet(user_id)?;
        info!(action = "wallet_created", user_id = %user_id, wallet_id = %wallet.id);
        Ok(wallet)
    }

    /// Returns the user's wallet, provisioning it lazily with balance 0.
    pub fn get_or_create_balance(&self, user_id: UserId) -> Wallet {
        self.store.get_or_create_wallet(user_id)
    }

    /// Adds `amount` to the user's wallet and records a COMPLETED CREDIT
    /// entry, creating the wallet if this is the user's first touch.
    ///
    /// `reference` defaults to a generated `FUND_` value.
    pub fn fund(
        &self,
        user_id: UserId,
        amount: Decimal,
        reference: Option<String>,
    ) -> Result<Wallet, LedgerError> {
        Self::validate_amount(amount)?;
        let wallet = self.store.get_or_create_wallet(user_id);

        let entry_id = self.store.wallet_tx(wallet.id, |tx| {
            tx.wallet_mut().credit(amount)?;
            let entry = LedgerEntry::completed(
                EntryType::Credit,
                wallet.id,
                user_id,
                amount,
                reference.unwrap_or_else(|| format!("FUND_{}", Uuid::new_v4().simple())),
                EntryMetadata::funding(),
            );
            let entry_id = entry.id;
            tx.save_entry(entry);
            Ok(entry_id)
        })?;

        let updated = self
            .store
            .find_wallet(wallet.id)
            .ok_or(LedgerError::WalletNotFound)?;
        info!(
            action = "wallet_funded",
            user_id = %user_id,
            amount = %amount,
            new_balance = %updated.balance(),
            entry_id = %entry_id,
        );
        Ok(updated)
    }

    /// Subtracts `amount` from the user's wallet and records a COMPLETED
    /// DEBIT entry.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientFunds`] if the balance (or a missing
    ///   wallet, available = 0) cannot cover the amount.
    /// - [`LedgerError::ConcurrentConflict`] on a lost-update version check
    ///   at commit.
    pub fn debit(
        &self,
        user_id: UserId,
        amount: Decimal,
        reference: &str,
        metadata: EntryMetadata,
    ) -> Result<LedgerEntry, LedgerError> {
        Self::validate_amount(amount)?;
        let Some(wallet) = self.store.find_wallet_by_user(user_id) else {
            return Err(LedgerError::InsufficientFunds {
                available: Decimal::ZERO,
                required: amount,
            });
        };

        let (entry, new_balance) = self.store.wallet_tx(wallet.id, |tx| {
            tx.wallet_mut().debit(amount)?;
            let entry = LedgerEntry::completed(
                EntryType::Debit,
                wallet.id,
                user_id,
                amount,
                reference.to_string(),
                metadata,
            );
            tx.save_entry(entry.clone());
            Ok((entry, tx.wallet().balance()))
        })?;

        info!(
            action = "wallet_debited",
            user_id = %user_id,
            amount = %amount,
            new_balance = %new_balance,
            entry_id = %entry.id,
        );
        Ok(entry)
    }

    /// Adds `amount` back onto a wallet addressed by id. Writes no entry;
    /// callers that need an audit trail use [`WalletLedger::reverse`].
    ///
    /// # Errors
    ///
    /// [`LedgerError::WalletNotFound`] if the wallet id does not exist.
    pub fn credit_back(&self, wallet_id: WalletId, amount: Decimal) -> Result<Wallet, LedgerError> {
        Self::validate_amount(amount)?;
        self.store.wallet_tx(wallet_id, |tx| {
            tx.wallet_mut().credit(amount)?;
            Ok(())
        })?;
        self.store
            .find_wallet(wallet_id)
            .ok_or(LedgerError::WalletNotFound)
    }

    /// Idempotent compensation of one completed entry.
    ///
    /// Within a single wallet transaction: applies the inverse amount,
    /// marks the original entry REVERSED, and records a compensating entry
    /// of the opposite type referencing it. A missing entry and an
    /// already-reversed entry are both no-ops; the reversal pipeline
    /// delivers at least once, so the guard must live under the same lock
    /// as the balance change.
    pub fn reverse(&self, entry_id: EntryId) -> Result<(), LedgerError> {
        let Some(original) = self.store.find_entry(entry_id) else {
            warn!(action = "reversal_skipped", entry_id = %entry_id, "entry not found for reversal");
            return Ok(());
        };
        let wallet_id = original.wallet_id;

        let result = self.store.wallet_tx(wallet_id, |tx| {
            // Re-read under the row lock: the transition to Reversed commits
            // under this lock, so a duplicate delivery settles here.
            let Some(mut original) = tx.find_entry(entry_id) else {
                return Ok(None);
            };
            if original.status == EntryStatus::Reversed {
                return Ok(None);
            }

            match original.entry_type {
                EntryType::Debit => tx.wallet_mut().credit(original.amount)?,
                EntryType::Credit => tx.wallet_mut().debit(original.amount)?,
            }

            let compensation = LedgerEntry::compensation_for(&original);
            let compensation_id = compensation.id;
            original.set_status(EntryStatus::Reversed);
            tx.update_entry(original);
            tx.save_entry(compensation);
            Ok(Some(compensation_id))
        });

        match result {
            Ok(Some(compensation_id)) => {
                info!(
                    action = "transaction_reversed",
                    entry_id = %entry_id,
                    compensation_entry_id = %compensation_id,
                    wallet_id = %wallet_id,
                );
                Ok(())
            }
            Ok(None) => {
                warn!(
                    action = "reversal_noop",
                    entry_id = %entry_id,
                    "entry already reversed or gone"
                );
                Ok(())
            }
            Err(LedgerError::WalletNotFound) => {
                // The money cannot be restored anywhere. Alertable, not a
                // routine log line.
                error!(
                    action = "reversal_failed",
                    alert = "reversal_wallet_missing",
                    entry_id = %entry_id,
                    wallet_id = %wallet_id,
                    "wallet missing for reversal"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Moves a COMPLETED entry to REVERSAL_PENDING once compensation has
    /// been scheduled. Any other status is left untouched.
    pub fn mark_reversal_pending(&self, entry_id: EntryId) -> Result<(), LedgerError> {
        let Some(original) = self.store.find_entry(entry_id) else {
            return Err(LedgerError::EntryNotFound);
        };
        self.store.wallet_tx(original.wallet_id, |tx| {
            let Some(mut entry) = tx.find_entry(entry_id) else {
                return Ok(());
            };
            if entry.status == EntryStatus::Completed {
                entry.set_status(EntryStatus::ReversalPending);
                tx.update_entry(entry);
            }
            Ok(())
        })
    }

    /// Entries for the user's wallet, newest first. An unknown user has an
    /// empty history, not an error.
    pub fn transaction_history(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Vec<LedgerEntry> {
        let Some(wallet) = self.store.find_wallet_by_user(user_id) else {
            return Vec::new();
        };
        self.store.entries_by_wallet(wallet.id, limit, offset)
    }
}
