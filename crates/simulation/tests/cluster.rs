//! End-to-end runs of threaded committees on the in-memory network.

use ledgerbft_bft::ByzantineBehavior;
use ledgerbft_node::NetworkSettings;
use ledgerbft_simulation::{Cluster, ClusterError, NetworkConfig, WalletPool};
use ledgerbft_types::{BlockHeight, ValidatorId, WalletId};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing_test::traced_test;

const TIMEOUT: Duration = Duration::from_secs(10);
const FAULT_DELAY: Duration = Duration::from_millis(20);

fn start(settings: NetworkSettings) -> Cluster {
    Cluster::start(settings, NetworkConfig::default()).unwrap()
}

#[traced_test]
#[test]
fn test_three_honest_validators_agree() {
    let mut cluster = start(NetworkSettings::new(3));

    let outcome = cluster.run_next(TIMEOUT).unwrap();
    let id = outcome.block.id();

    assert_eq!(outcome.block.height(), BlockHeight(1));
    assert_eq!(outcome.agreeing(), 3);
    assert!(outcome.votes.iter().all(|(_, vote)| *vote == Some(id)));

    // SEND, an echo quorum and the READYs that made the leader deliver.
    let (n, f) = (3, 0);
    let signatures = outcome.block.validator_signatures();
    assert!(
        signatures.len() >= 1 + (n + f + 1) / 2 + 2 * f + 1,
        "only {} signatures",
        signatures.len()
    );
    assert!(signatures.len() <= 7);
    let signers: BTreeSet<ValidatorId> = signatures.iter().map(|s| s.validator_id).collect();
    assert!(signers.iter().all(|v| v.0 < 3));

    assert_eq!(cluster.height(), BlockHeight(2));
    assert_eq!(cluster.prev_digest(), id);
    cluster.shutdown().unwrap();
}

#[traced_test]
#[test]
fn test_consecutive_heights_chain() {
    let mut cluster = start(NetworkSettings::new(4));

    let first = cluster.run_next(TIMEOUT).unwrap();
    let second = cluster.run_next(TIMEOUT).unwrap();

    assert_eq!(second.block.height(), BlockHeight(2));
    assert_eq!(second.block.header().prev_block_digest, first.block.id());
    assert_eq!(second.agreeing(), 4);
    cluster.shutdown().unwrap();
}

#[traced_test]
#[test]
fn test_crashed_validator_is_tolerated() {
    let settings = NetworkSettings::new(5).with_behavior(4, ByzantineBehavior::CRASH);
    let mut cluster = start(settings);

    let outcome = cluster.run_next(TIMEOUT).unwrap();
    assert_eq!(outcome.agreeing(), 4);
    assert_eq!(
        outcome.votes.iter().find(|(v, _)| *v == ValidatorId(4)),
        Some(&(ValidatorId(4), None))
    );
    cluster.shutdown().unwrap();
}

#[traced_test]
#[test]
fn test_duplicating_transport_still_agrees() {
    let config = NetworkConfig::default().with_duplicates(1.0);
    let mut cluster = Cluster::start(NetworkSettings::new(4), config).unwrap();

    let outcome = cluster.run_next(TIMEOUT).unwrap();
    assert_eq!(outcome.agreeing(), 4);
    assert!(cluster.network().stats().duplicated > 0);
    cluster.shutdown().unwrap();
}

#[traced_test]
#[test]
fn test_delayed_validator_still_delivers() {
    let settings = NetworkSettings::new(4)
        .with_behavior(3, ByzantineBehavior::DELAY_SEND)
        .with_fault_delay(FAULT_DELAY);
    let mut cluster = start(settings);

    let outcome = cluster.run_next(TIMEOUT).unwrap();
    assert_eq!(outcome.agreeing(), 4);
    cluster.shutdown().unwrap();
}

#[traced_test]
#[test]
fn test_misbehaving_senders_are_tolerated() {
    for behavior in [
        ByzantineBehavior::IMPERSONATE,
        ByzantineBehavior::WRONG_ORDER,
        ByzantineBehavior::PARTIAL_SEND,
        ByzantineBehavior::DELAY_SEND | ByzantineBehavior::WRONG_ORDER,
    ] {
        let settings = NetworkSettings::new(5)
            .with_behavior(2, behavior)
            .with_fault_delay(FAULT_DELAY);
        let mut cluster = start(settings);

        let outcome = cluster.run_next(TIMEOUT).unwrap();
        let id = outcome.block.id();
        for (validator, vote) in &outcome.votes {
            if *validator != ValidatorId(2) {
                assert_eq!(*vote, Some(id), "{behavior}: {validator}");
            }
        }
        cluster.shutdown().unwrap();
    }
}

#[traced_test]
#[test]
fn test_transfers_reach_the_ledger() {
    let settings = NetworkSettings::new(4);
    let wallet_ids = settings.wallet_ids();
    let mut cluster = start(settings);
    let mut wallets = WalletPool::new(&wallet_ids).unwrap();

    let tx = wallets
        .transfer(cluster.pool().utxos(), WalletId(0), WalletId(1), 30)
        .unwrap();
    cluster.submit(tx).unwrap();
    let first = cluster.run_next(TIMEOUT).unwrap();
    assert_eq!(first.block.transactions().len(), 1);

    let tx = wallets
        .transfer(cluster.pool().utxos(), WalletId(1), WalletId(2), 50)
        .unwrap();
    cluster.submit(tx).unwrap();
    let second = cluster.run_next(TIMEOUT).unwrap();
    assert_eq!(second.block.transactions().len(), 1);
    assert_eq!(second.agreeing(), 4);

    let pool = cluster.pool();
    assert_eq!(pool.balance_of(WalletId(0)), 70);
    assert_eq!(pool.balance_of(WalletId(1)), 80);
    assert_eq!(pool.balance_of(WalletId(2)), 150);
    assert_eq!(pool.balance_of(WalletId(3)), 100);
    assert_eq!(pool.pending_len(), 0);

    // Every validator's ledger view for the next run matches the pool.
    let third = cluster.run_next(TIMEOUT).unwrap();
    assert!(third.block.transactions().is_empty());
    cluster.shutdown().unwrap();
}

#[traced_test]
#[test]
fn test_double_spend_is_rejected_by_the_pool() {
    let settings = NetworkSettings::new(4);
    let wallet_ids = settings.wallet_ids();
    let mut cluster = start(settings);
    let mut wallets = WalletPool::new(&wallet_ids).unwrap();

    let utxos = cluster.pool().utxos().clone();
    let pay_one = wallets.transfer(&utxos, WalletId(0), WalletId(1), 60).unwrap();
    let pay_two = wallets.transfer(&utxos, WalletId(0), WalletId(2), 60).unwrap();
    cluster.submit(pay_one).unwrap();
    cluster.submit(pay_two).unwrap();

    let outcome = cluster.run_next(TIMEOUT).unwrap();
    assert_eq!(outcome.block.transactions().len(), 1);
    assert_eq!(cluster.pool().balance_of(WalletId(0)), 40);
    assert_eq!(cluster.pool().balance_of(WalletId(1)), 160);
    assert_eq!(cluster.pool().balance_of(WalletId(2)), 100);
    cluster.shutdown().unwrap();
}

#[traced_test]
#[test]
fn test_partition_beyond_fault_bound_times_out() {
    let mut cluster = start(NetworkSettings::new(4).with_max_faulty(1));
    cluster
        .network()
        .partition(&[ValidatorId(0), ValidatorId(1)], &[ValidatorId(2), ValidatorId(3)]);

    let result = cluster.run_next(Duration::from_millis(300));
    assert!(matches!(
        result,
        Err(ClusterError::Timeout {
            height: BlockHeight(1),
            delivered: 0,
            expected: 4,
        })
    ));
    assert_eq!(cluster.height(), BlockHeight(1));
    cluster.shutdown().unwrap();
}

#[traced_test]
#[test]
fn test_many_heights_with_every_ready_needed() {
    let mut cluster = start(NetworkSettings::new(4).with_max_faulty(1));
    for height in 1..=10 {
        let outcome = cluster.run_next(TIMEOUT).unwrap();
        assert_eq!(outcome.block.height(), BlockHeight(height));
        assert_eq!(outcome.agreeing(), 4);
    }
    cluster.shutdown().unwrap();
}
