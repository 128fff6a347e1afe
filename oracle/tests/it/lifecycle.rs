use std::time::Duration;

use bridge_oracle::{
    notifier::BridgingRequestStateKey,
    scheduler::RoundOutcome,
    store::TxStore,
    transaction::{ChainTx, DEFUND_TX_HASH, PRIORITY_NORMAL, TxKey},
};

use crate::{Bridge, Notification};

#[oracle_macros::test]
async fn executed_batch_completes_bridging_request(mut bridge: Bridge) {
    let request = bridge.bridging_request("alpha", "beta", 4);
    bridge.db.add_unprocessed(&[request.clone()]).unwrap();
    let mut scheduler = bridge.scheduler();

    assert_eq!(
        bridge.round(&mut scheduler, "alpha").await,
        RoundOutcome::Submitted(1)
    );
    let submissions = bridge.submitter.submissions();
    let claim = &submissions[0].claims.bridging_request[0];
    assert_eq!(claim.destination_chain_id, "beta");
    assert_eq!(claim.total_amount, 300);
    assert!(
        bridge
            .db
            .pending_by_hash("alpha", &request.hash)
            .unwrap()
            .is_some()
    );
    let key: BridgingRequestStateKey = request.key().into();
    assert_eq!(
        bridge.notifier.notifications(),
        vec![Notification::Submitted(vec![key.clone()])]
    );

    // The batch carrying the request shows up as executed on the destination.
    let executed = bridge.batch_executed("beta", 20, 1);
    bridge.fetcher.set_batch("beta", 1, vec![request.key()]);
    bridge.db.add_unprocessed(&[executed.clone()]).unwrap();
    assert_eq!(
        bridge.round(&mut scheduler, "beta").await,
        RoundOutcome::Submitted(1)
    );
    assert_eq!(
        bridge.notifier.notifications()[1],
        Notification::Executed {
            keys: vec![key],
            dst_tx_hash: executed.hash,
            dst_chain_id: "beta".to_owned(),
        }
    );
    assert_eq!(bridge.db.batch_info_events().unwrap().len(), 1);

    // The saved outcome is applied at the start of the next round.
    assert_eq!(
        bridge.round(&mut scheduler, "alpha").await,
        RoundOutcome::Empty
    );
    assert!(bridge.db.batch_info_events().unwrap().is_empty());
    assert!(
        bridge
            .db
            .pending_by_hash("alpha", &request.hash)
            .unwrap()
            .is_none()
    );
    assert!(
        !bridge
            .db
            .processed_by_hash("alpha", &request.hash)
            .unwrap()
            .unwrap()
            .is_invalid
    );
}

#[oracle_macros::test]
async fn failed_batch_requeues_request_after_timeout(mut bridge: Bridge) {
    bridge.config.retry_unprocessed.base_timeout = Duration::from_secs(30);
    let request = bridge.bridging_request("alpha", "beta", 4);
    bridge.db.add_unprocessed(&[request.clone()]).unwrap();
    let mut scheduler = bridge.scheduler();
    bridge.round(&mut scheduler, "alpha").await;

    // The batch sent to the UTXO chain expires unexecuted.
    let expected = bridge.expected_batch("beta", 10, 1);
    bridge.fetcher.set_batch("beta", 1, vec![request.key()]);
    bridge.db.add_expected(&[expected]).unwrap();
    bridge.db.record_confirmed_block("beta", 15).unwrap();
    assert_eq!(
        bridge.round(&mut scheduler, "beta").await,
        RoundOutcome::Submitted(1)
    );
    assert!(matches!(
        bridge.notifier.notifications().last(),
        Some(Notification::Failed { dst_chain_id, .. }) if dst_chain_id == "beta"
    ));

    // Back in the unprocessed queue, but held back until the retry timeout has passed.
    assert_eq!(
        bridge.round(&mut scheduler, "alpha").await,
        RoundOutcome::Empty
    );
    let requeued = bridge
        .db
        .fetch_unprocessed("alpha", PRIORITY_NORMAL, None)
        .unwrap();
    assert_eq!(requeued.len(), 1);
    assert_eq!(requeued[0].batch_try_count, 1);
    assert_eq!(requeued[0].submit_try_count, 0);

    bridge.clock.advance(Duration::from_secs(29));
    assert_eq!(
        bridge.round(&mut scheduler, "beta").await,
        RoundOutcome::Empty
    );

    bridge.clock.advance(Duration::from_secs(1));
    assert_eq!(
        bridge.round(&mut scheduler, "alpha").await,
        RoundOutcome::Submitted(1)
    );
    let submissions = bridge.submitter.submissions();
    let retried = &submissions.last().unwrap().claims.bridging_request[0];
    assert_eq!(retried.observed_tx_hash, request.hash);
    assert_eq!(retried.retry_counter, 1);
}

#[oracle_macros::test]
async fn invalid_request_is_reported(mut bridge: Bridge) {
    let request = ChainTx {
        value: 299,
        ..bridge.bridging_request("alpha", "beta", 4)
    };
    let valid = bridge.hot_wallet_tx("alpha", 5);
    bridge.db.add_unprocessed(&[request.clone(), valid]).unwrap();
    let mut scheduler = bridge.scheduler();

    assert_eq!(
        bridge.round(&mut scheduler, "alpha").await,
        RoundOutcome::Submitted(1)
    );

    assert!(
        bridge
            .db
            .processed_by_hash("alpha", &request.hash)
            .unwrap()
            .unwrap()
            .is_invalid
    );
    assert_eq!(
        bridge.notifier.notifications(),
        vec![Notification::Invalid(vec![request.key().into()])]
    );
}

#[oracle_macros::test]
async fn invalid_request_is_reported_without_a_batch(mut bridge: Bridge) {
    let request = ChainTx {
        value: 299,
        ..bridge.bridging_request("alpha", "beta", 4)
    };
    bridge.db.add_unprocessed(&[request.clone()]).unwrap();
    let mut scheduler = bridge.scheduler();

    assert_eq!(
        bridge.round(&mut scheduler, "alpha").await,
        RoundOutcome::Empty
    );

    assert!(bridge.submitter.submissions().is_empty());
    assert!(
        bridge
            .db
            .processed_by_hash("alpha", &request.hash)
            .unwrap()
            .unwrap()
            .is_invalid
    );
    assert_eq!(
        bridge.notifier.notifications(),
        vec![Notification::Invalid(vec![request.key().into()])]
    );
}

#[oracle_macros::test]
async fn defunds_are_left_out_of_batch_outcomes(mut bridge: Bridge) {
    let request = bridge.bridging_request("alpha", "beta", 4);
    bridge.db.add_unprocessed(&[request.clone()]).unwrap();
    let mut scheduler = bridge.scheduler();
    bridge.round(&mut scheduler, "alpha").await;

    let defund = TxKey {
        chain_id: "beta".to_owned(),
        hash: DEFUND_TX_HASH,
    };
    let executed = bridge.batch_executed("beta", 20, 1);
    let defund_only = bridge.batch_executed("beta", 21, 2);
    bridge
        .fetcher
        .set_batch("beta", 1, vec![defund.clone(), request.key()]);
    bridge.fetcher.set_batch("beta", 2, vec![defund]);
    bridge
        .db
        .add_unprocessed(&[executed.clone(), defund_only])
        .unwrap();

    assert_eq!(
        bridge.round(&mut scheduler, "beta").await,
        RoundOutcome::Submitted(2)
    );
    let notifications = bridge.notifier.notifications();
    assert_eq!(notifications.len(), 2);
    assert_eq!(
        notifications[1],
        Notification::Executed {
            keys: vec![request.key().into()],
            dst_tx_hash: executed.hash,
            dst_chain_id: "beta".to_owned(),
        }
    );
    let events = bridge.db.batch_info_events().unwrap();
    assert_eq!(events.len(), 2);
    assert!(
        events
            .iter()
            .all(|event| event.txs.iter().all(|key| key.hash != DEFUND_TX_HASH))
    );

    // Both outcomes apply cleanly in the next round.
    bridge.round(&mut scheduler, "alpha").await;
    assert!(bridge.db.batch_info_events().unwrap().is_empty());
    assert!(
        bridge
            .db
            .processed_by_hash("alpha", &request.hash)
            .unwrap()
            .is_some()
    );
}

#[oracle_macros::test]
async fn pending_validator_set_holds_back_requests(mut bridge: Bridge) {
    let request = bridge.bridging_request("alpha", "beta", 1);
    let transfer = bridge.hot_wallet_tx("alpha", 2);
    bridge
        .db
        .add_unprocessed(&[request.clone(), transfer.clone()])
        .unwrap();
    bridge.validator_set.set_pending(true);
    let mut scheduler = bridge.scheduler();

    assert_eq!(
        bridge.round(&mut scheduler, "alpha").await,
        RoundOutcome::Submitted(1)
    );
    let submissions = bridge.submitter.submissions();
    assert!(submissions[0].claims.bridging_request.is_empty());
    assert_eq!(
        submissions[0].claims.hot_wallet_increment[0].observed_tx_hash,
        transfer.hash
    );
    assert_eq!(
        bridge
            .db
            .fetch_unprocessed("alpha", PRIORITY_NORMAL, None)
            .unwrap(),
        vec![request.clone()]
    );

    bridge.validator_set.set_pending(false);
    assert_eq!(
        bridge.round(&mut scheduler, "alpha").await,
        RoundOutcome::Submitted(1)
    );
    let submissions = bridge.submitter.submissions();
    assert_eq!(
        submissions[1].claims.bridging_request[0].observed_tx_hash,
        request.hash
    );
}

#[oracle_macros::test]
async fn unreadable_chain_does_not_block_the_others(mut bridge: Bridge) {
    let transfer = bridge.hot_wallet_tx("alpha", 1);
    bridge.db.add_unprocessed(&[transfer.clone()]).unwrap();
    let broken = bridge.hot_wallet_tx("beta", 1);
    bridge.db.add_unprocessed(&[broken.clone()]).unwrap();
    let mut scheduler = bridge.scheduler_with_store(bridge.broken_chain_store("beta"));

    // The broken chain is scanned first but only skipped.
    assert_eq!(
        bridge.round(&mut scheduler, "beta").await,
        RoundOutcome::Submitted(1)
    );
    let submissions = bridge.submitter.submissions();
    assert_eq!(
        submissions[0].claims.hot_wallet_increment[0].observed_tx_hash,
        transfer.hash
    );
    assert_eq!(
        bridge
            .db
            .fetch_unprocessed("beta", PRIORITY_NORMAL, None)
            .unwrap(),
        vec![broken]
    );
}

#[oracle_macros::test]
async fn rejected_request_is_refunded(mut bridge: Bridge) {
    bridge.config.bridging.refund_enabled = true;
    let request = ChainTx {
        value: 299,
        ..bridge.bridging_request("alpha", "beta", 4)
    };
    bridge.db.add_unprocessed(&[request.clone()]).unwrap();
    let mut scheduler = bridge.scheduler();

    assert_eq!(
        bridge.round(&mut scheduler, "alpha").await,
        RoundOutcome::Submitted(1)
    );

    let submissions = bridge.submitter.submissions();
    let claims = &submissions[0].claims;
    assert!(claims.bridging_request.is_empty());
    assert_eq!(claims.refund_request[0].origin_tx_hash, request.hash);
    assert_eq!(claims.refund_request[0].origin_amount, 299);
    assert!(
        bridge
            .db
            .pending_by_hash("alpha", &request.hash)
            .unwrap()
            .is_some()
    );
}

#[oracle_macros::test]
async fn unavailable_bridge_data_abandons_round(mut bridge: Bridge) {
    let executed = bridge.batch_executed("beta", 3, 1);
    bridge.db.add_unprocessed(&[executed.clone()]).unwrap();
    bridge.fetcher.set_fail(true);
    let mut scheduler = bridge.scheduler();

    let cancel = bridge.cancel_receiver();
    assert!(scheduler.process_round("beta", &cancel).await.is_err());
    assert!(bridge.submitter.submissions().is_empty());
    assert_eq!(
        bridge
            .db
            .fetch_unprocessed("beta", PRIORITY_NORMAL, None)
            .unwrap(),
        vec![executed]
    );

    bridge.fetcher.set_fail(false);
    assert_eq!(
        bridge.round(&mut scheduler, "beta").await,
        RoundOutcome::Submitted(1)
    );
}
