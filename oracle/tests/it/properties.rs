use std::{collections::HashMap, time::Duration};

use bridge_oracle::{
    claims::ClaimKind,
    scheduler::RoundOutcome,
    store::TxStore,
    submitter::{NotEnoughFunds, SubmitReceipt},
    transaction::{ChainTx, PRIORITY_NORMAL, TxHash},
};
use rand::Rng;

use crate::{Bridge, SubmitMode, observed_hashes};

/// Queue a random mix of valid and invalid hot wallet transfers on both chains. Returns the valid ones.
fn random_txs(bridge: &mut Bridge) -> Vec<ChainTx> {
    let mut valid = Vec::new();
    for chain_id in ["alpha", "beta"] {
        let count = bridge.rng.gen_range(0..20);
        let mut txs = Vec::with_capacity(count);
        for _ in 0..count {
            let block = bridge.rng.gen_range(1..30);
            let mut tx = bridge.hot_wallet_tx(chain_id, block);
            if bridge.rng.gen_bool(0.2) {
                tx.receiver = "elsewhere".to_owned();
            } else {
                valid.push(tx.clone());
            }
            txs.push(tx);
        }
        bridge.db.add_unprocessed(&txs).unwrap();
    }
    valid
}

#[oracle_macros::test]
async fn claims_follow_block_order(mut bridge: Bridge) {
    bridge.config.bridging.max_bridging_claims_to_group = bridge.rng.gen_range(1..6);
    let valid = random_txs(&mut bridge);
    let blocks: HashMap<TxHash, (String, u64)> = valid
        .iter()
        .map(|tx| (tx.hash, (tx.origin_chain_id.clone(), tx.block_number)))
        .collect();
    let mut scheduler = bridge.scheduler();

    bridge.drain(&mut scheduler).await;

    let mut last_block: HashMap<String, u64> = HashMap::new();
    for submission in bridge.submitter.submissions() {
        for hash in observed_hashes(&submission.claims) {
            let (chain_id, block) = &blocks[&hash];
            let last = last_block.entry(chain_id.clone()).or_default();
            assert!(
                *block >= *last,
                "{chain_id} claimed block {block} after {last}"
            );
            *last = *block;
        }
    }
}

#[oracle_macros::test]
async fn batches_never_exceed_capacity(mut bridge: Bridge) {
    let max_claims = bridge.rng.gen_range(1..6);
    bridge.config.bridging.max_bridging_claims_to_group = max_claims;
    random_txs(&mut bridge);
    let mut scheduler = bridge.scheduler();

    bridge.drain(&mut scheduler).await;

    for submission in bridge.submitter.submissions() {
        assert!(submission.claims.count() <= max_claims);
        assert!(!submission.claims.is_empty());
    }
}

#[oracle_macros::test]
async fn every_record_is_claimed_once(mut bridge: Bridge) {
    bridge.config.bridging.max_bridging_claims_to_group = bridge.rng.gen_range(1..6);
    let valid = random_txs(&mut bridge);
    let mut scheduler = bridge.scheduler();

    bridge.drain(&mut scheduler).await;

    let mut claimed: Vec<TxHash> = bridge
        .submitter
        .submissions()
        .iter()
        .flat_map(|submission| observed_hashes(&submission.claims))
        .collect();
    claimed.sort();
    let mut expected: Vec<TxHash> = valid.iter().map(|tx| tx.hash).collect();
    expected.sort();
    assert_eq!(claimed, expected);

    for chain_id in ["alpha", "beta"] {
        assert!(
            bridge
                .db
                .fetch_unprocessed(chain_id, PRIORITY_NORMAL, None)
                .unwrap()
                .is_empty()
        );
    }
}

#[oracle_macros::test]
async fn throttle_tightens_monotonically_on_failure(mut bridge: Bridge) {
    bridge.config.bridging.max_bridging_claims_to_group = bridge.rng.gen_range(1..8);
    let txs: Vec<ChainTx> = (0..10)
        .map(|block| bridge.hot_wallet_tx("alpha", block))
        .collect();
    bridge.db.add_unprocessed(&txs).unwrap();
    bridge.submitter.set_mode(SubmitMode::Fail);
    let ceiling = bridge.config.throttle.gas_limit_multiplier_max;
    let mut scheduler = bridge.scheduler();

    let mut previous = scheduler.throttle().get("alpha");
    let failures = bridge.rng.gen_range(1..15);
    for _ in 0..failures {
        assert_eq!(
            bridge.round(&mut scheduler, "alpha").await,
            RoundOutcome::SubmitFailed
        );
        let current = scheduler.throttle().get("alpha");
        assert!(current.max_claims_to_group >= 1);
        assert!(current.max_claims_to_group <= previous.max_claims_to_group);
        assert!(current.gas_limit_multiplier >= previous.gas_limit_multiplier);
        assert!(current.gas_limit_multiplier <= ceiling);
        previous = current;
    }

    // Nothing was persisted along the way.
    assert_eq!(
        bridge
            .db
            .fetch_unprocessed("alpha", PRIORITY_NORMAL, None)
            .unwrap()
            .len(),
        10
    );
}

#[oracle_macros::test]
async fn unfunded_request_waits_for_retry_timeout(mut bridge: Bridge) {
    let base = Duration::from_secs(bridge.rng.gen_range(1..120));
    bridge.config.retry_unprocessed.base_timeout = base;
    let request = bridge.bridging_request("alpha", "beta", 1);
    bridge.db.add_unprocessed(&[request.clone()]).unwrap();
    bridge.submitter.push_receipt(SubmitReceipt {
        not_enough_funds: vec![NotEnoughFunds {
            claim_kind: ClaimKind::BridgingRequest,
            index: 0,
        }],
    });
    let mut scheduler = bridge.scheduler();

    assert_eq!(
        bridge.round(&mut scheduler, "alpha").await,
        RoundOutcome::Submitted(1)
    );
    assert!(
        bridge
            .db
            .pending_by_hash("alpha", &request.hash)
            .unwrap()
            .is_none()
    );
    let retried = bridge
        .db
        .fetch_unprocessed("alpha", PRIORITY_NORMAL, None)
        .unwrap();
    assert_eq!(retried[0].submit_try_count, 1);
    // Nothing reached the bridge, so nothing was reported as submitted.
    assert!(bridge.notifier.notifications().is_empty());

    let early = bridge.rng.gen_range(0..base.as_secs());
    bridge.clock.advance(Duration::from_secs(early));
    assert_eq!(
        bridge.round(&mut scheduler, "alpha").await,
        RoundOutcome::Empty
    );

    bridge
        .clock
        .advance(base - Duration::from_secs(early));
    assert_eq!(
        bridge.round(&mut scheduler, "alpha").await,
        RoundOutcome::Submitted(1)
    );
    assert!(
        bridge
            .db
            .pending_by_hash("alpha", &request.hash)
            .unwrap()
            .is_some()
    );
}

#[oracle_macros::test]
async fn rounds_rotate_through_chains(mut bridge: Bridge) {
    bridge.config.bridging.max_bridging_claims_to_group = 1;
    for chain_id in ["alpha", "beta"] {
        let txs: Vec<ChainTx> = (0..5)
            .map(|block| bridge.hot_wallet_tx(chain_id, block))
            .collect();
        bridge.db.add_unprocessed(&txs).unwrap();
    }
    let scheduler = bridge.scheduler();

    let handle = tokio::spawn(scheduler.run(bridge.cancel_receiver()));
    while bridge.submitter.submissions().len() < 4 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    bridge.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let submissions = bridge.submitter.submissions();
    let starts: Vec<_> = submissions
        .iter()
        .take(4)
        .map(|s| s.start_chain_id.as_str())
        .collect();
    assert_eq!(starts, ["alpha", "beta", "alpha", "beta"]);
    // The starting chain gets the capacity.
    for submission in &submissions[..4] {
        let claim = &submission.claims.hot_wallet_increment[0];
        assert_eq!(claim.chain_id, submission.start_chain_id);
    }
}

#[oracle_macros::test]
async fn cancelled_round_persists_nothing(mut bridge: Bridge) {
    let tx = bridge.hot_wallet_tx("alpha", 1);
    bridge.db.add_unprocessed(&[tx.clone()]).unwrap();
    let mut scheduler = bridge.scheduler();

    bridge.cancel();
    let cancel = bridge.cancel_receiver();
    assert_eq!(
        scheduler.process_round("alpha", &cancel).await.unwrap(),
        RoundOutcome::Cancelled
    );
    assert!(bridge.submitter.submissions().is_empty());
    assert_eq!(
        bridge
            .db
            .fetch_unprocessed("alpha", PRIORITY_NORMAL, None)
            .unwrap(),
        vec![tx]
    );
}

#[oracle_macros::test]
async fn cancellation_abandons_hung_submission(mut bridge: Bridge) {
    let tx = bridge.hot_wallet_tx("alpha", 1);
    bridge.db.add_unprocessed(&[tx.clone()]).unwrap();
    bridge.submitter.set_mode(SubmitMode::Hang);
    let scheduler = bridge.scheduler();

    let handle = tokio::spawn(scheduler.run(bridge.cancel_receiver()));
    while bridge.submitter.submissions().is_empty() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    bridge.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(
        bridge
            .db
            .fetch_unprocessed("alpha", PRIORITY_NORMAL, None)
            .unwrap(),
        vec![tx]
    );
}
