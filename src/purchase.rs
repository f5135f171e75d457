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

//! Bill purchase records.
//!
//! A purchase record tracks one bill purchase attempt through the saga:
//!
//! - `Pending` → (debit ok, external ok) → `Completed`
//! - `Pending` → (debit failed) → `Failed` (no money moved)
//! - `Pending` → (external failed after debit) → `Failed` + reversal scheduled

use crate::base::{EntryId, PurchaseId, UserId};
use crate::gateway::GatewayReceipt;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of bill being purchased.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillKind {
    Electricity,
    Water,
    Internet,
    CableTv,
}

impl fmt::Display for BillKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Electricity => "ELECTRICITY",
            Self::Water => "WATER",
            Self::Internet => "INTERNET",
            Self::CableTv => "CABLE_TV",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Failed,
}

/// One bill purchase attempt and its linked debit entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseRecord {
    pub id: PurchaseId,
    pub user_id: UserId,
    /// Debit entry funding this purchase, linked once the debit commits.
    pub entry_id: Option<EntryId>,
    pub kind: BillKind,
    pub amount: Decimal,
    /// Provider-side identifier being paid for (meter number, account number).
    pub target: String,
    pub label: Option<String>,
    pub status: PurchaseStatus,
    pub external_reference: Option<String>,
    pub external_token: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseRecord {
    pub(crate) fn pending(
        user_id: UserId,
        kind: BillKind,
        amount: Decimal,
        target: String,
        label: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PurchaseId::new(),
            user_id,
            entry_id: None,
            kind,
            amount,
            target,
            label,
            status: PurchaseStatus::Pending,
            external_reference: None,
            external_token: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn link_entry(&mut self, entry_id: EntryId) {
        self.entry_id = Some(entry_id);
        self.updated_at = Utc::now();
    }

    pub(crate) fn complete(&mut self, receipt: &GatewayReceipt) {
        self.status = PurchaseStatus::Completed;
        self.external_reference = Some(receipt.reference.clone());
        self.external_token = receipt.token.clone();
        self.updated_at = Utc::now();
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.status = PurchaseStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.updated_at = Utc::now();
    }
}
