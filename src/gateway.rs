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

//! External bill-payment gateway seam.
//!
//! The saga only depends on the [`PaymentGateway`] trait; a decline and a
//! transport failure are equally "purchase failed, compensate". Latency
//! bounds are the gateway client's concern, not this crate's.

use crate::purchase::BillKind;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Purchase request forwarded to the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillPurchaseRequest {
    pub kind: BillKind,
    pub amount: Decimal,
    pub target: String,
    pub label: Option<String>,
}

/// Successful provider response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayReceipt {
    pub reference: String,
    pub token: Option<String>,
    pub message: Option<String>,
}

/// Gateway failure modes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Provider answered and refused the purchase
    #[error("payment declined: {0}")]
    Declined(String),

    /// Provider could not be reached or answered garbage
    #[error("gateway transport failure: {0}")]
    Transport(String),
}

/// Black-box bill-payment provider.
pub trait PaymentGateway: Send + Sync {
    fn purchase(&self, request: &BillPurchaseRequest) -> Result<GatewayReceipt, GatewayError>;
}

/// Deterministic stand-in for the real provider.
///
/// Mirrors the provider's test hooks: the magic target
/// [`MockPaymentGateway::INVALID_TARGET`] is declined, and electricity
/// purchases come back with a prepaid token.
#[derive(Debug, Default)]
pub struct MockPaymentGateway;

impl MockPaymentGateway {
    /// Meter number the provider always rejects.
    pub const INVALID_TARGET: &'static str = "9999999999";

    pub fn new() -> Self {
        Self
    }

    /// `dddd-dddd-dddd-dddd` prepaid electricity token.
    fn electricity_token() -> String {
        let digits = format!("{:016}", Uuid::new_v4().as_u128() % 10_000_000_000_000_000);
        format!(
            "{}-{}-{}-{}",
            &digits[0..4],
            &digits[4..8],
            &digits[8..12],
            &digits[12..16]
        )
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn purchase(&self, request: &BillPurchaseRequest) -> Result<GatewayReceipt, GatewayError> {
        if request.target == Self::INVALID_TARGET {
            return Err(GatewayError::Declined("invalid meter number".into()));
        }

        let token = matches!(request.kind, BillKind::Electricity)
            .then(Self::electricity_token);

        Ok(GatewayReceipt {
            reference: format!("EXT_{}", Uuid::new_v4().simple()),
            token,
            message: Some("transaction processed successfully".into()),
        })
    }
}
