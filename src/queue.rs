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

//! Delayed reversal job queue.
//!
//! Jobs become visible after a configured delay (letting external side
//! effects settle before compensating) and are redelivered with exponential
//! backoff on failure, up to a bounded attempt count. Delivery is
//! at-least-once; consumers must tolerate duplicates, which is exactly why
//! [`crate::WalletLedger::reverse`] is idempotent per entry.
//!
//! Jobs still queued when the queue closes are dropped, the in-memory
//! analog of losing a non-durable transport on shutdown.

use crate::base::{EntryId, PurchaseId};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const DEFAULT_REVERSAL_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);
pub const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

/// Retry and delay policy for the reversal pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReversalConfig {
    /// Delay before the first delivery of a job.
    pub delay: Duration,
    /// Total delivery attempts before a job is dropped.
    pub max_attempts: u32,
    /// Backoff after the first failed attempt.
    pub backoff_base: Duration,
    /// Backoff growth factor per subsequent failure.
    pub backoff_multiplier: u32,
}

impl Default for ReversalConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_REVERSAL_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl ReversalConfig {
    /// Zero-delay policy for tests and demos.
    pub fn immediate() -> Self {
        Self {
            delay: Duration::ZERO,
            backoff_base: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Backoff before redelivering a job whose `failed_attempt`-th delivery
    /// failed: `base × multiplier^(failed_attempt − 1)`.
    pub fn retry_backoff(&self, failed_attempt: u32) -> Duration {
        self.backoff_base
            * self
                .backoff_multiplier
                .saturating_pow(failed_attempt.saturating_sub(1))
    }
}

/// Self-describing reversal job payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReversalJob {
    pub entry_id: EntryId,
    pub purchase_id: PurchaseId,
    pub reason: String,
    /// Delivery attempt this payload represents, starting at 1.
    pub attempt: u32,
}

/// Heap item ordered by due time (earliest first), then schedule order.
struct Scheduled {
    due_at: Instant,
    seq: u64,
    job: ReversalJob,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due_at == other.due_at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed so the max-heap pops the earliest due job.
        other
            .due_at
            .cmp(&self.due_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Scheduled>,
    seq: u64,
    closed: bool,
}

/// Delayed at-least-once job queue feeding the reversal worker.
pub struct ReversalQueue {
    config: ReversalConfig,
    inner: Mutex<QueueState>,
    available: Condvar,
}

impl ReversalQueue {
    pub fn new(config: ReversalConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(QueueState::default()),
            available: Condvar::new(),
        }
    }

    pub fn config(&self) -> &ReversalConfig {
        &self.config
    }

    /// Schedules compensation for `entry_id`, delivered after the
    /// configured delay.
    pub fn schedule(
        &self,
        entry_id: EntryId,
        purchase_id: PurchaseId,
        reason: impl Into<String>,
    ) {
        let job = ReversalJob {
            entry_id,
            purchase_id,
            reason: reason.into(),
            attempt: 1,
        };
        info!(
            action = "reversal_scheduled",
            entry_id = %job.entry_id,
            purchase_id = %job.purchase_id,
            reason = %job.reason,
        );
        self.push(job, self.config.delay);
    }

    /// Requeues a failed job with exponential backoff. The caller checks the
    /// attempt bound.
    pub(crate) fn schedule_retry(&self, mut job: ReversalJob) {
        let backoff = self.config.retry_backoff(job.attempt);
        job.attempt += 1;
        self.push(job, backoff);
    }

    fn push(&self, job: ReversalJob, delay: Duration) {
        let mut state = self.inner.lock();
        if state.closed {
            warn!(
                action = "reversal_dropped",
                entry_id = %job.entry_id,
                "queue closed, dropping job"
            );
            return;
        }
        state.seq += 1;
        let seq = state.seq;
        state.heap.push(Scheduled {
            due_at: Instant::now() + delay,
            seq,
            job,
        });
        drop(state);
        self.available.notify_one();
    }

    /// Blocks until a job becomes due, returning `None` once the queue is
    /// closed.
    pub fn next_job(&self) -> Option<ReversalJob> {
        let mut state = self.inner.lock();
        loop {
            if state.closed {
                return None;
            }
            let now = Instant::now();
            match state.heap.peek().map(|s| s.due_at) {
                Some(due) if due <= now => {
                    if let Some(scheduled) = state.heap.pop() {
                        return Some(scheduled.job);
                    }
                }
                Some(due) => {
                    self.available.wait_for(&mut state, due - now);
                }
                None => {
                    self.available.wait(&mut state);
                }
            }
        }
    }

    /// Closes the queue and wakes any blocked consumer. Pending jobs are
    /// abandoned.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
