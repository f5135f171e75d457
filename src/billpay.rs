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

//! Bill purchase saga.
//!
//! The debit commits before the gateway is called, so money is reserved
//! before it is promised to the external party. A gateway failure after the
//! debit is corrected by scheduling compensation, never by blocking the
//! caller on a synchronous refund: the purchase call returns the FAILED
//! record immediately and the balance is restored asynchronously.

use crate::base::{PurchaseId, UserId};
use crate::entry::EntryMetadata;
use crate::error::LedgerError;
use crate::gateway::{BillPurchaseRequest, PaymentGateway};
use crate::ledger::WalletLedger;
use crate::purchase::{BillKind, PurchaseRecord};
use crate::queue::ReversalQueue;
use crate::store::LedgerStore;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Orchestrates debit → external payment → compensate-on-failure.
pub struct BillPaymentService {
    store: Arc<LedgerStore>,
    ledger: Arc<WalletLedger>,
    gateway: Arc<dyn PaymentGateway>,
    reversals: Arc<ReversalQueue>,
}

impl BillPaymentService {
    pub fn new(
        store: Arc<LedgerStore>,
        ledger: Arc<WalletLedger>,
        gateway: Arc<dyn PaymentGateway>,
        reversals: Arc<ReversalQueue>,
    ) -> Self {
        Self {
            store,
            ledger,
            gateway,
            reversals,
        }
    }

    /// Runs one bill purchase.
    ///
    /// - Debit failure: the record is FAILED, the error propagates, and no
    ///   money moved, so nothing is compensated.
    /// - Gateway failure: the record is FAILED but returned with `Ok`; the
    ///   debited entry is marked REVERSAL_PENDING and a reversal job is
    ///   enqueued. The caller is never blocked on compensation completing.
    pub fn purchase(
        &self,
        user_id: UserId,
        kind: BillKind,
        amount: Decimal,
        target: &str,
        label: Option<&str>,
    ) -> Result<PurchaseRecord, LedgerError> {
        info!(
            action = "bill_purchase_initiated",
            user_id = %user_id,
            kind = %kind,
            amount = %amount,
            target = %target,
        );

        let mut record = PurchaseRecord::pending(
            user_id,
            kind,
            amount,
            target.to_string(),
            label.map(str::to_string),
        );
        self.store.save_purchase(&record);

        let reference = format!("PURCHASE_{}", record.id);
        let entry = match self.ledger.debit(
            user_id,
            amount,
            &reference,
            EntryMetadata::bill(kind, target, label),
        ) {
            Ok(entry) => entry,
            Err(err) => {
                record.fail(err.to_string());
                self.store.save_purchase(&record);
                error!(
                    action = "bill_purchase_failed",
                    purchase_id = %record.id,
                    user_id = %user_id,
                    error = %err,
                );
                return Err(err);
            }
        };

        record.link_entry(entry.id);
        self.store.save_purchase(&record);

        let request = BillPurchaseRequest {
            kind,
            amount,
            target: target.to_string(),
            label: label.map(str::to_string),
        };
        match self.gateway.purchase(&request) {
            Ok(receipt) => {
                record.complete(&receipt);
                self.store.save_purchase(&record);
                info!(
                    action = "bill_payment_completed",
                    purchase_id = %record.id,
                    external_reference = %receipt.reference,
                );
            }
            Err(gateway_err) => {
                let err = LedgerError::ExternalService {
                    service: "BillPaymentAPI".into(),
                    message: gateway_err.to_string(),
                };
                record.fail(err.to_string());
                self.store.save_purchase(&record);
                error!(
                    action = "bill_payment_failed",
                    purchase_id = %record.id,
                    error = %err,
                );

                // Money already left the wallet; compensation is queued,
                // never awaited here.
                if let Err(mark_err) = self.ledger.mark_reversal_pending(entry.id) {
                    warn!(
                        action = "reversal_mark_failed",
                        entry_id = %entry.id,
                        error = %mark_err,
                    );
                }
                self.reversals
                    .schedule(entry.id, record.id, "external payment failure");
            }
        }

        Ok(record)
    }

    /// Looks up one purchase record.
    ///
    /// # Errors
    ///
    /// [`LedgerError::PurchaseNotFound`] if the id is unknown.
    pub fn find_purchase(&self, purchase_id: PurchaseId) -> Result<PurchaseRecord, LedgerError> {
        self.store
            .find_purchase(purchase_id)
            .ok_or(LedgerError::PurchaseNotFound)
    }

    /// Purchase records for one user, newest first.
    pub fn purchase_history(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Vec<PurchaseRecord> {
        self.store.purchases_by_user(user_id, limit, offset)
    }
}
