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

//! Reversal worker.
//!
//! A dedicated consumer thread that drains the reversal queue and invokes
//! the wallet ledger's idempotent `reverse`. A failed attempt is redelivered
//! per the retry policy; once the attempt bound is exhausted the job is
//! dropped and the failure is only observable through logs. There is no
//! caller left to re-throw to.

use crate::ledger::WalletLedger;
use crate::queue::{ReversalJob, ReversalQueue};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// Background consumer of the reversal queue.
pub struct ReversalWorker {
    queue: Arc<ReversalQueue>,
    handle: Option<JoinHandle<()>>,
}

impl ReversalWorker {
    /// Starts the consumer thread.
    pub fn spawn(queue: Arc<ReversalQueue>, ledger: Arc<WalletLedger>) -> Self {
        let consumer_queue = Arc::clone(&queue);
        let handle = thread::spawn(move || Self::run(consumer_queue, ledger));
        Self {
            queue,
            handle: Some(handle),
        }
    }

    fn run(queue: Arc<ReversalQueue>, ledger: Arc<WalletLedger>) {
        while let Some(job) = queue.next_job() {
            Self::process(&queue, &ledger, job);
        }
    }

    fn process(queue: &ReversalQueue, ledger: &WalletLedger, job: ReversalJob) {
        info!(
            action = "processing_reversal",
            entry_id = %job.entry_id,
            purchase_id = %job.purchase_id,
            reason = %job.reason,
            attempt = job.attempt,
        );

        match ledger.reverse(job.entry_id) {
            Ok(()) => {
                info!(
                    action = "reversal_completed",
                    entry_id = %job.entry_id,
                    purchase_id = %job.purchase_id,
                );
            }
            Err(err) if job.attempt < queue.config().max_attempts => {
                warn!(
                    action = "reversal_retry",
                    entry_id = %job.entry_id,
                    attempt = job.attempt,
                    error = %err,
                );
                queue.schedule_retry(job);
            }
            Err(err) => {
                // Terminal operational failure: the entry stays
                // uncompensated and only operators see it.
                error!(
                    action = "reversal_exhausted",
                    entry_id = %job.entry_id,
                    purchase_id = %job.purchase_id,
                    attempts = job.attempt,
                    error = %err,
                );
            }
        }
    }

    /// Closes the queue and joins the consumer thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.queue.close();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReversalWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
