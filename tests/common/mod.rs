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

// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};
use wallet_ledger_rs::{
    BillPaymentService, BillPurchaseRequest, GatewayError, GatewayReceipt, LedgerStore,
    MockPaymentGateway, PaymentGateway, ReversalConfig, ReversalQueue, ReversalWorker,
    WalletLedger,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fully wired service stack over one in-memory store.
pub struct Harness {
    pub store: Arc<LedgerStore>,
    pub ledger: Arc<WalletLedger>,
    pub queue: Arc<ReversalQueue>,
    pub billpay: BillPaymentService,
}

impl Harness {
    pub fn spawn_worker(&self) -> ReversalWorker {
        ReversalWorker::spawn(Arc::clone(&self.queue), Arc::clone(&self.ledger))
    }
}

/// Harness with the deterministic mock gateway and a zero-delay pipeline.
pub fn harness() -> Harness {
    harness_with(
        Arc::new(MockPaymentGateway::new()),
        ReversalConfig::immediate(),
    )
}

pub fn harness_with(gateway: Arc<dyn PaymentGateway>, config: ReversalConfig) -> Harness {
    init_tracing();
    let store = Arc::new(LedgerStore::new());
    let ledger = Arc::new(WalletLedger::new(Arc::clone(&store)));
    let queue = Arc::new(ReversalQueue::new(config));
    let billpay = BillPaymentService::new(
        Arc::clone(&store),
        Arc::clone(&ledger),
        gateway,
        Arc::clone(&queue),
    );
    Harness {
        store,
        ledger,
        queue,
        billpay,
    }
}

/// Gateway stub that always fails at the transport level.
pub struct FailingGateway;

impl PaymentGateway for FailingGateway {
    fn purchase(&self, _request: &BillPurchaseRequest) -> Result<GatewayReceipt, GatewayError> {
        Err(GatewayError::Transport("connection reset".into()))
    }
}

/// Polls `condition` until it holds or `timeout` expires.
pub fn wait_for(condition: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
