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

//! # Wallet Ledger
//!
//! This library provides user-scoped monetary wallets: funding, debiting to
//! pay for bill purchases, and compensating committed debits when the
//! downstream purchase fails after money has already moved.
//!
//! ## Core Components
//!
//! - [`LedgerStore`]: transactional tables with exclusive wallet row locks
//! - [`WalletLedger`]: balance mutation service (fund, debit, reverse)
//! - [`BillPaymentService`]: debit → external payment → compensate saga
//! - [`ReversalQueue`] / [`ReversalWorker`]: delayed, retried compensation
//!   pipeline with at-least-once delivery
//! - [`LedgerError`]: error taxonomy for ledger and saga failures
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use rust_decimal_macros::dec;
//! use wallet_ledger_rs::{LedgerStore, UserId, WalletLedger};
//!
//! let store = Arc::new(LedgerStore::new());
//! let ledger = WalletLedger::new(store);
//! let user = UserId::new();
//!
//! // Fund the wallet (created lazily on first touch)
//! let wallet = ledger.fund(user, dec!(100.00), None).unwrap();
//! assert_eq!(wallet.balance(), dec!(100.00));
//!
//! // Debit, then compensate the debit
//! let entry = ledger
//!     .debit(user, dec!(40.00), "PURCHASE_demo", Default::default())
//!     .unwrap();
//! ledger.reverse(entry.id).unwrap();
//! assert_eq!(ledger.get_or_create_balance(user).balance(), dec!(100.00));
//! ```
//!
//! ## Thread Safety
//!
//! Every balance-changing path locks the wallet row exclusively for the
//! whole transaction, so operations against one wallet are serialized while
//! different wallets proceed in parallel. The reversal worker runs as an
//! independent consumer against the same store and relies on
//! [`WalletLedger::reverse`] being idempotent per entry.

mod base;
mod billpay;
mod entry;
pub mod error;
pub mod gateway;
mod ledger;
mod purchase;
mod queue;
mod store;
mod wallet;
mod worker;

pub use base::{EntryId, PurchaseId, UserId, WalletId};
pub use billpay::BillPaymentService;
pub use entry::{EntryMetadata, EntryStatus, EntryType, LedgerEntry};
pub use error::{LedgerError, StoreError};
pub use gateway::{
    BillPurchaseRequest, GatewayError, GatewayReceipt, MockPaymentGateway, PaymentGateway,
};
pub use ledger::WalletLedger;
pub use purchase::{BillKind, PurchaseRecord, PurchaseStatus};
pub use queue::{ReversalConfig, ReversalJob, ReversalQueue};
pub use store::{LedgerStore, WalletTx};
pub use wallet::Wallet;
pub use worker::ReversalWorker;
