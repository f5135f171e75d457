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

//! Error types for wallet ledger operations.

use crate::base::{UserId, WalletId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Persistence-layer signals from the ledger store.
///
/// These are translated into [`LedgerError`] at the service boundary; the
/// version conflict in particular surfaces as
/// [`LedgerError::ConcurrentConflict`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Referenced wallet row does not exist
    #[error("wallet not found")]
    WalletNotFound,

    /// Unique user index already maps to a wallet
    #[error("wallet already exists for user {user_id}")]
    DuplicateUser { user_id: UserId },

    /// Optimistic version counter moved underneath the writer
    #[error("version conflict on wallet {wallet_id}: expected {expected}, actual {actual}")]
    VersionConflict {
        wallet_id: WalletId,
        expected: u64,
        actual: u64,
    },
}

/// Wallet ledger and saga errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount is zero, negative, or carries more than 2 decimal places
    #[error("invalid amount (must be positive with at most 2 decimal places)")]
    InvalidAmount,

    /// Debit would exceed the available balance
    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds {
        available: Decimal,
        required: Decimal,
    },

    /// Transient lost-update signal; the caller may retry the whole operation
    #[error("transaction conflict detected, please try again")]
    ConcurrentConflict,

    /// Referenced wallet does not exist
    #[error("wallet not found")]
    WalletNotFound,

    /// Referenced ledger entry does not exist
    #[error("ledger entry not found")]
    EntryNotFound,

    /// Referenced purchase record does not exist
    #[error("purchase not found")]
    PurchaseNotFound,

    /// Duplicate wallet creation for a user
    #[error("wallet already exists for this user")]
    WalletAlreadyExists,

    /// Gateway decline or transport failure during a bill purchase
    #[error("external service error: {service}: {message}")]
    ExternalService { service: String, message: String },

    /// Store-level failure not otherwise classified; the enclosing
    /// transaction has been rolled back
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::WalletNotFound => LedgerError::WalletNotFound,
            StoreError::DuplicateUser { .. } => LedgerError::WalletAlreadyExists,
            StoreError::VersionConflict { .. } => LedgerError::ConcurrentConflict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LedgerError, StoreError};
    use crate::base::WalletId;
    use rust_decimal_macros::dec;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            LedgerError::InvalidAmount.to_string(),
            "invalid amount (must be positive with at most 2 decimal places)"
        );
        assert_eq!(
            LedgerError::InsufficientFunds {
                available: dec!(10.00),
                required: dec!(25.00),
            }
            .to_string(),
            "insufficient funds: available 10.00, required 25.00"
        );
        assert_eq!(
            LedgerError::ConcurrentConflict.to_string(),
            "transaction conflict detected, please try again"
        );
        assert_eq!(LedgerError::WalletNotFound.to_string(), "wallet not found");
        assert_eq!(LedgerError::EntryNotFound.to_string(), "ledger entry not found");
        assert_eq!(
            LedgerError::WalletAlreadyExists.to_string(),
            "wallet already exists for this user"
        );
        assert_eq!(
            LedgerError::ExternalService {
                service: "BillPaymentAPI".into(),
                message: "declined".into(),
            }
            .to_string(),
            "external service error: BillPaymentAPI: declined"
        );
    }

    #[test]
    fn version_conflict_maps_to_concurrent_conflict() {
        let err = StoreError::VersionConflict {
            wallet_id: WalletId::new(),
            expected: 3,
            actual: 4,
        };
        assert_eq!(LedgerError::from(err), LedgerError::ConcurrentConflict);
    }

    #[test]
    fn store_not_found_maps_to_wallet_not_found() {
        assert_eq!(
            LedgerError::from(StoreError::WalletNotFound),
            LedgerError::WalletNotFound
        );
    }

    #[test]
    fn errors_are_cloneable() {
        let error = LedgerError::ConcurrentConflict;
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
