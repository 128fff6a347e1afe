use bridge_oracle::{
    scheduler::RoundOutcome,
    store::TxStore,
    transaction::{ChainTx, PRIORITY_NORMAL},
};

use crate::{Bridge, SubmitMode};

#[oracle_macros::test]
async fn valid_record_is_claimed_and_processed(mut bridge: Bridge) {
    let tx = bridge.hot_wallet_tx("alpha", 5);
    bridge.db.add_unprocessed(&[tx.clone()]).unwrap();
    bridge.db.record_confirmed_block("alpha", 5).unwrap();
    let mut scheduler = bridge.scheduler();

    let outcome = bridge.round(&mut scheduler, "alpha").await;

    assert_eq!(outcome, RoundOutcome::Submitted(1));
    let submissions = bridge.submitter.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].claims.hot_wallet_increment.len(), 1);
    assert_eq!(
        submissions[0].claims.hot_wallet_increment[0].observed_tx_hash,
        tx.hash
    );

    let processed = bridge
        .db
        .processed_by_hash("alpha", &tx.hash)
        .unwrap()
        .unwrap();
    assert!(!processed.is_invalid);
    assert!(
        bridge
            .db
            .fetch_unprocessed("alpha", PRIORITY_NORMAL, None)
            .unwrap()
            .is_empty()
    );
}

#[oracle_macros::test]
async fn expected_stays_active_until_threshold(mut bridge: Bridge) {
    let expected = bridge.expected_batch("alpha", 2, 7);
    bridge.db.add_expected(&[expected.clone()]).unwrap();
    bridge.db.record_confirmed_block("alpha", 3).unwrap();
    let mut scheduler = bridge.scheduler();

    let outcome = bridge.round(&mut scheduler, "alpha").await;

    assert_eq!(outcome, RoundOutcome::Empty);
    assert!(bridge.submitter.submissions().is_empty());
    assert_eq!(
        bridge
            .db
            .fetch_expected("alpha", PRIORITY_NORMAL, None)
            .unwrap(),
        vec![expected]
    );
}

#[oracle_macros::test]
async fn expired_expected_gets_failure_claim(mut bridge: Bridge) {
    let expected = bridge.expected_batch("alpha", 2, 7);
    bridge.db.add_expected(&[expected.clone()]).unwrap();
    bridge.db.record_confirmed_block("alpha", 3).unwrap();
    let mut scheduler = bridge.scheduler();
    assert_eq!(
        bridge.round(&mut scheduler, "alpha").await,
        RoundOutcome::Empty
    );

    bridge.db.record_confirmed_block("alpha", 6).unwrap();
    let outcome = bridge.round(&mut scheduler, "alpha").await;

    assert_eq!(outcome, RoundOutcome::Submitted(1));
    let submissions = bridge.submitter.submissions();
    let claims = &submissions[0].claims;
    assert_eq!(claims.batch_execution_failed.len(), 1);
    assert_eq!(claims.batch_execution_failed[0].observed_tx_hash, expected.hash);
    assert_eq!(claims.batch_execution_failed[0].batch_nonce_id, 7);

    let stored = bridge
        .db
        .expected_by_hash("alpha", &expected.hash)
        .unwrap()
        .unwrap();
    assert!(stored.is_processed);
    assert!(
        bridge
            .db
            .fetch_expected("alpha", PRIORITY_NORMAL, None)
            .unwrap()
            .is_empty()
    );
}

#[oracle_macros::test]
async fn failed_submission_shrinks_group_and_persists_nothing(mut bridge: Bridge) {
    bridge.config.bridging.max_bridging_claims_to_group = 5;
    let txs: Vec<ChainTx> = (1..=5).map(|block| bridge.hot_wallet_tx("alpha", block)).collect();
    bridge.db.add_unprocessed(&txs).unwrap();
    bridge.submitter.set_mode(SubmitMode::Fail);
    let mut scheduler = bridge.scheduler();

    let outcome = bridge.round(&mut scheduler, "alpha").await;

    assert_eq!(outcome, RoundOutcome::SubmitFailed);
    assert_eq!(bridge.submitter.submissions()[0].claims.count(), 5);
    let throttle = scheduler.throttle().get("alpha");
    assert_eq!(throttle.max_claims_to_group, 4);
    assert_eq!(throttle.gas_limit_multiplier, 1.0);
    assert_eq!(
        bridge
            .db
            .fetch_unprocessed("alpha", PRIORITY_NORMAL, None)
            .unwrap()
            .len(),
        5
    );

    // The other chain's throttle is unaffected.
    assert_eq!(scheduler.throttle().get("beta").max_claims_to_group, 5);

    // The next attempt is smaller.
    bridge.round(&mut scheduler, "alpha").await;
    assert_eq!(bridge.submitter.submissions()[1].claims.count(), 4);
}

#[oracle_macros::test]
async fn single_failed_claim_raises_gas_multiplier(mut bridge: Bridge) {
    let tx = bridge.hot_wallet_tx("alpha", 1);
    bridge.db.add_unprocessed(&[tx]).unwrap();
    bridge.submitter.set_mode(SubmitMode::Fail);
    let mut scheduler = bridge.scheduler();

    bridge.round(&mut scheduler, "alpha").await;
    let throttle = scheduler.throttle().get("alpha");
    assert_eq!(throttle.max_claims_to_group, 1);
    assert_eq!(throttle.gas_limit_multiplier, 1.5);

    bridge.submitter.set_mode(SubmitMode::Accept);
    bridge.round(&mut scheduler, "alpha").await;
    let submissions = bridge.submitter.submissions();
    assert_eq!(submissions[1].gas_limit_multiplier, 1.5);
    let throttle = scheduler.throttle().get("alpha");
    assert_eq!(throttle.max_claims_to_group, 10);
    assert_eq!(throttle.gas_limit_multiplier, 1.0);
}

#[oracle_macros::test]
async fn observed_execution_resolves_expected_batch(mut bridge: Bridge) {
    let expected = bridge.expected_batch("alpha", 2, 7);
    let executed = ChainTx {
        inner_action_hash: Some(expected.hash),
        ..bridge.batch_executed("alpha", 3, 7)
    };
    bridge.db.add_expected(&[expected.clone()]).unwrap();
    bridge.db.add_unprocessed(&[executed.clone()]).unwrap();
    bridge.db.record_confirmed_block("alpha", 6).unwrap();
    let mut scheduler = bridge.scheduler();

    let outcome = bridge.round(&mut scheduler, "alpha").await;

    assert_eq!(outcome, RoundOutcome::Submitted(1));
    let submissions = bridge.submitter.submissions();
    let claims = &submissions[0].claims;
    assert_eq!(claims.batch_executed.len(), 1);
    assert_eq!(claims.batch_executed[0].observed_tx_hash, expected.hash);
    assert!(claims.batch_execution_failed.is_empty());

    assert!(
        bridge
            .db
            .expected_by_hash("alpha", &expected.hash)
            .unwrap()
            .unwrap()
            .is_processed
    );
    assert!(
        !bridge
            .db
            .processed_by_hash("alpha", &executed.hash)
            .unwrap()
            .unwrap()
            .is_invalid
    );
}
