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

//! Ledger entries.
//!
//! An entry records one balance-changing event and is immutable once
//! completed, except for the reversal status transitions:
//! - `Completed` → `ReversalPending` (compensation scheduled)
//! - `Completed` / `ReversalPending` → `Reversed` (compensation applied)
//!
//! A reversed entry is terminal; reversing it again is a no-op.

use crate::base::{EntryId, UserId, WalletId};
use crate::purchase::BillKind;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a balance change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    Credit,
    Debit,
}

impl EntryType {
    /// The compensating direction.
    pub fn opposite(self) -> Self {
        match self {
            Self::Credit => Self::Debit,
            Self::Debit => Self::Credit,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
    Reversed,
    ReversalPending,
}

/// Free-form context attached to an entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_kind: Option<BillKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_entry_id: Option<EntryId>,
}

impl EntryMetadata {
    /// Context for a wallet funding credit.
    pub fn funding() -> Self {
        Self {
            description: Some("wallet funding".into()),
            source: Some("internal".into()),
            ..Self::default()
        }
    }

    /// Context for a bill purchase debit.
    pub fn bill(kind: BillKind, target: &str, customer: Option<&str>) -> Self {
        Self {
            description: Some("bill purchase".into()),
            bill_kind: Some(kind),
            target: Some(target.to_string()),
            customer: customer.map(str::to_string),
            ..Self::default()
        }
    }
}

/// One balance-changing event on a wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub entry_type: EntryType,
    pub amount: Decimal,
    pub reference: String,
    pub status: EntryStatus,
    pub metadata: EntryMetadata,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Builds a COMPLETED entry ready to be committed alongside the wallet
    /// mutation it records.
    pub fn completed(
        entry_type: EntryType,
        wallet_id: WalletId,
        user_id: UserId,
        amount: Decimal,
        reference: String,
        metadata: EntryMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EntryId::new(),
            wallet_id,
            user_id,
            entry_type,
            amount,
            reference,
            status: EntryStatus::Completed,
            metadata,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builds the compensating entry for `original`: opposite direction,
    /// same amount, reference `REVERSAL_<original reference>`, metadata
    /// pointing back at the original entry.
    pub(crate) fn compensation_for(original: &LedgerEntry) -> Self {
        let mut metadata = original.metadata.clone();
        metadata.original_entry_id = Some(original.id);
        metadata.description = Some("transaction reversal".into());
        Self::completed(
            original.entry_type.opposite(),
            original.wallet_id,
            original.user_id,
            original.amount,
            format!("REVERSAL_{}", original.reference),
            metadata,
        )
    }

    pub(crate) fn set_status(&mut self, status: EntryStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
