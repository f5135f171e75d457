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

//! Benchmarks for the wallet ledger.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single-threaded fund/debit processing
//! - Fund-then-reverse round trips
//! - Concurrent debits across independent wallets

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use wallet_ledger_rs::{EntryMetadata, LedgerStore, UserId, WalletLedger};

fn funded_ledger(users: &[UserId], amount: Decimal) -> Arc<WalletLedger> {
    let ledger = Arc::new(WalletLedger::new(Arc::new(LedgerStore::new())));
    for user in users {
        ledger.fund(*user, amount, None).unwrap();
    }
    ledger
}

fn bench_fund(c: &mut Criterion) {
    let mut group = c.benchmark_group("fund");
    group.throughput(Throughput::Elements(1));
    group.bench_function("single_wallet", |b| {
        let ledger = Arc::new(WalletLedger::new(Arc::new(LedgerStore::new())));
        let user = UserId::new();
        b.iter(|| {
            ledger
                .fund(black_box(user), Decimal::new(100, 2), None)
                .unwrap()
        });
    });
    group.finish();
}

fn bench_debit(c: &mut Criterion) {
    let mut group = c.benchmark_group("debit");
    group.throughput(Throughput::Elements(1));
    group.bench_function("single_wallet", |b| {
        let user = UserId::new();
        // Deep balance so the bench never runs dry.
        let ledger = funded_ledger(&[user], Decimal::new(1_000_000_000, 2));
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            ledger
                .debit(
                    black_box(user),
                    Decimal::new(1, 2),
                    &format!("B{i}"),
                    EntryMetadata::default(),
                )
                .unwrap()
        });
    });
    group.finish();
}

fn bench_fund_reverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("reverse");
    group.throughput(Throughput::Elements(1));
    group.bench_function("fund_then_reverse", |b| {
        let ledger = Arc::new(WalletLedger::new(Arc::new(LedgerStore::new())));
        let user = UserId::new();
        ledger.fund(user, Decimal::new(10_000, 2), None).unwrap();
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            let entry = ledger
                .debit(
                    user,
                    Decimal::new(5, 2),
                    &format!("R{i}"),
                    EntryMetadata::default(),
                )
                .unwrap();
            ledger.reverse(black_box(entry.id)).unwrap();
        });
    });
    group.finish();
}

fn bench_concurrent_debits(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_debits");
    for wallets in [4usize, 16, 64] {
        group.throughput(Throughput::Elements(wallets as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(wallets),
            &wallets,
            |b, &wallets| {
                let users: Vec<UserId> = (0..wallets).map(|_| UserId::new()).collect();
                let ledger = funded_ledger(&users, Decimal::new(1_000_000_000, 2));
                let mut round = 0u64;
                b.iter(|| {
                    round += 1;
                    users.par_iter().for_each(|user| {
                        ledger
                            .debit(
                                *user,
                                Decimal::new(1, 2),
                                &format!("C{round}_{user}"),
                                EntryMetadata::default(),
                            )
                            .unwrap();
                    });
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_fund,
    bench_debit,
    bench_fund_reverse,
    bench_concurrent_debits
);
criterion_main!(benches);
