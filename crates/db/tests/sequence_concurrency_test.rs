//! Concurrent allocation on shared and disjoint sequence scopes.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tally_core::ledger::VoucherType;
use tally_db::{MemoryStore, SequenceAllocator};
use tally_shared::config::LedgerConfig;
use tokio::sync::Barrier;

use common::seed_books;

fn counter(number: &str) -> u64 {
    number.rsplit('-').next().unwrap().parse().unwrap()
}

// ============================================================================
// Test: N concurrent callers on one scope get N distinct numbers
// ============================================================================
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_scope_allocations_are_unique() {
    const CALLERS: usize = 32;

    let store = Arc::new(MemoryStore::new());
    let books = seed_books(&store, "Acme");
    let allocator = SequenceAllocator::new(Arc::clone(&store), &LedgerConfig::default());
    let barrier = Arc::new(Barrier::new(CALLERS));

    let tasks = (0..CALLERS).map(|_| {
        let allocator = allocator.clone();
        let barrier = Arc::clone(&barrier);
        let tenant = books.tenant_id();
        let period = books.period.id;
        tokio::spawn(async move {
            barrier.wait().await;
            allocator
                .next_number(tenant, VoucherType::General, period)
                .await
                .unwrap()
        })
    });

    let numbers: Vec<String> = join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let unique: HashSet<&String> = numbers.iter().collect();
    assert_eq!(unique.len(), CALLERS);

    let mut counters: Vec<u64> = numbers.iter().map(|n| counter(n)).collect();
    counters.sort_unstable();
    assert_eq!(counters, (1..=CALLERS as u64).collect::<Vec<_>>());
}

// ============================================================================
// Test: Disjoint scopes count independently
// ============================================================================
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_scopes_do_not_share_counters() {
    let store = Arc::new(MemoryStore::new());
    let acme = seed_books(&store, "Acme");
    let beta = seed_books(&store, "Beta");
    let allocator = SequenceAllocator::new(Arc::clone(&store), &LedgerConfig::default());

    let calls = [
        (acme.tenant_id(), VoucherType::General, acme.period.id),
        (acme.tenant_id(), VoucherType::Sales, acme.period.id),
        (beta.tenant_id(), VoucherType::General, beta.period.id),
    ];
    let tasks = calls.iter().flat_map(|&(tenant, vt, period)| {
        let allocator = allocator.clone();
        (0..5).map(move |_| {
            let allocator = allocator.clone();
            tokio::spawn(async move { allocator.next_number(tenant, vt, period).await.unwrap() })
        })
    });
    let numbers: Vec<String> = join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    for prefix in ["ACME-GEN-2024Q1-", "ACME-SAL-2024Q1-", "BETA-GEN-2024Q1-"] {
        let mut scoped: Vec<u64> = numbers
            .iter()
            .filter(|n| n.starts_with(prefix))
            .map(|n| counter(n))
            .collect();
        scoped.sort_unstable();
        assert_eq!(scoped, vec![1, 2, 3, 4, 5], "{prefix}");
    }
}
