//! Per-chain reconciliation.
//!
//! For each priority class, the processor walks a chain's records in block order. The block cursor is the lowest
//! block which still holds either a ready unprocessed record or an outbound action whose expiry the destination chain
//! has confirmed. Everything at the cursor is resolved before the cursor advances, and the walk stops as soon as the
//! round's claims batch is full. Nothing is written until the scheduler persists the round.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    sync::Arc,
};

use anyhow::{Result, anyhow};
use tracing::{debug, error, info, warn};

use crate::{
    cfg::OracleConfig,
    claims::{BridgeClaims, ClaimKind},
    metadata::{self, BridgingTxType},
    metrics::OracleMetrics,
    notifier::{BridgingRequestStateKey, BridgingRequestStateNotifier},
    store::{TxStore, TxTransitions},
    submitter::SubmitReceipt,
    time::Clock,
    tracker::{ConfirmationTracker, ExpiryPredicate, expiry_for},
    transaction::{
        BatchInfoEvent, ChainId, ChainTx, ExpectedTx, LAST_PROCESSING_PRIORITY, PRIORITY_EXPEDITED,
        TxKey,
    },
    validators::{FailureValidator, SuccessValidator, ValidatorRegistry},
};

fn awaits_execution(tx: &ChainTx) -> bool {
    metadata::tx_type(&tx.metadata).is_ok_and(BridgingTxType::awaits_execution)
}

/// Scratch state of a single round. A new one is created for every round.
#[derive(Debug, Default)]
pub struct RoundState {
    pub transitions: TxTransitions,
    /// Bridging and refund requests which failed validation.
    invalid_requests: Vec<TxKey>,
    /// The record each bridging or refund claim was made for, by claim position.
    claim_sources: HashMap<(ClaimKind, usize), TxKey>,
}

impl RoundState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The records of one chain and priority still to be resolved in this round.
struct Pass {
    unprocessed: VecDeque<ChainTx>,
    active: HashMap<TxKey, ExpectedTx>,
    expiries: BTreeMap<u64, BTreeSet<TxKey>>,
}

impl Pass {
    fn next_cursor(&self) -> Option<u64> {
        let unprocessed = self.unprocessed.front().map(|tx| tx.block_number);
        let expired = self.expiries.keys().next().copied();
        unprocessed.into_iter().chain(expired).min()
    }

    /// Take an expected record out of consideration for the rest of the round.
    fn resolve_expected(&mut self, key: &TxKey) -> Option<ExpectedTx> {
        let expected = self.active.remove(key)?;
        self.expiries.retain(|_, keys| {
            keys.remove(key);
            !keys.is_empty()
        });
        Some(expected)
    }
}

pub struct ChainStateProcessor {
    config: Arc<OracleConfig>,
    store: Arc<dyn TxStore>,
    tracker: Arc<dyn ConfirmationTracker>,
    validators: ValidatorRegistry,
    expiry: HashMap<ChainId, Box<dyn ExpiryPredicate>>,
    clock: Arc<dyn Clock>,
    metrics: OracleMetrics,
}

impl ChainStateProcessor {
    pub fn new(
        config: Arc<OracleConfig>,
        store: Arc<dyn TxStore>,
        tracker: Arc<dyn ConfirmationTracker>,
        validators: ValidatorRegistry,
        clock: Arc<dyn Clock>,
        metrics: OracleMetrics,
    ) -> Self {
        let expiry = config
            .chains
            .iter()
            .map(|chain| {
                (
                    chain.chain_id.clone(),
                    expiry_for(chain.family, config.expiry_safety_offset),
                )
            })
            .collect();
        ChainStateProcessor {
            config,
            store,
            tracker,
            validators,
            expiry,
            clock,
            metrics,
        }
    }

    /// Apply the outcomes of batches submitted in earlier rounds to the records they carried. This is persisted
    /// immediately, independently of the round. An event is kept for a later round until every record it carried
    /// has reached the pending queue.
    pub fn process_saved_events(&self) -> Result<()> {
        let events = self.store.batch_info_events()?;
        if events.is_empty() {
            return Ok(());
        }

        let now = self.clock.now();
        let mut transitions = TxTransitions::default();
        let mut skipped = 0;
        for event in events {
            let txs = match self.pending_members(&event) {
                Ok(txs) => txs,
                Err(e) => {
                    info!(chain_id = event.chain_id, batch = event.batch_id, "keeping batch outcome: {e}");
                    skipped += 1;
                    continue;
                }
            };
            for mut tx in txs {
                if event.is_failed {
                    tx.batch_try_count += 1;
                    tx.submit_try_count = 0;
                    tx.last_time_tried = Some(now);
                    transitions.move_pending_to_unprocessed.push(tx);
                } else {
                    transitions.move_pending_to_processed.push(tx.into_processed(false));
                }
            }
            info!(
                chain_id = event.chain_id,
                batch = event.batch_id,
                failed = event.is_failed,
                txs = event.txs.len(),
                "applied batch outcome"
            );
            transitions.remove_batch_info_events.push(event);
        }
        if skipped > 0 {
            debug!(skipped, "batch outcomes left for a later round");
        }
        if transitions.is_empty() {
            return Ok(());
        }
        self.store.apply_transitions(&transitions)
    }

    /// Every record carried by `event`, or an error naming the first one which is not pending.
    fn pending_members(&self, event: &BatchInfoEvent) -> Result<Vec<ChainTx>> {
        event
            .txs
            .iter()
            .map(|key| {
                self.store
                    .pending_by_hash(&key.chain_id, &key.hash)?
                    .ok_or_else(|| anyhow!("{key} is not pending"))
            })
            .collect()
    }

    /// Reconcile one chain into `claims`, expedited records first. While a validator set change is pending, bridging
    /// and refund requests are left queued. A failing priority is logged and skipped.
    pub fn process_chain(
        &self,
        round: &mut RoundState,
        claims: &mut BridgeClaims,
        chain_id: &str,
        max_claims: usize,
        validator_set_pending: bool,
    ) {
        for priority in PRIORITY_EXPEDITED..=LAST_PROCESSING_PRIORITY {
            if !claims.can_add_more(max_claims) {
                break;
            }
            if let Err(e) =
                self.run_checks(round, claims, chain_id, priority, max_claims, validator_set_pending)
            {
                error!("Failed to run checks for chain {chain_id} priority {priority}: {e:?}");
            }
        }
    }

    fn run_checks(
        &self,
        round: &mut RoundState,
        claims: &mut BridgeClaims,
        chain_id: &str,
        priority: u8,
        max_claims: usize,
        validator_set_pending: bool,
    ) -> Result<()> {
        let now = self.clock.now();
        let retry = &self.config.retry_unprocessed;
        let unprocessed: VecDeque<_> = self
            .store
            .fetch_unprocessed(chain_id, priority, None)?
            .into_iter()
            .filter(|tx| tx.is_ready(now, retry))
            .filter(|tx| !(validator_set_pending && awaits_execution(tx)))
            .collect();
        let expected = self.store.fetch_expected(chain_id, priority, None)?;
        if unprocessed.is_empty() && expected.is_empty() {
            return Ok(());
        }

        let expiry = self
            .expiry
            .get(chain_id)
            .ok_or_else(|| anyhow!("no expiry strategy for chain {chain_id}"))?;
        let mut expiries: BTreeMap<u64, BTreeSet<TxKey>> = BTreeMap::new();
        for tx in &expected {
            if let Some(block) = expiry.expired_at(self.tracker.as_ref(), chain_id, tx.ttl)? {
                expiries.entry(block).or_default().insert(tx.key());
            }
        }
        let mut pass = Pass {
            unprocessed,
            active: expected.into_iter().map(|tx| (tx.key(), tx)).collect(),
            expiries,
        };

        debug!(
            chain_id,
            priority,
            unprocessed = pass.unprocessed.len(),
            active = pass.active.len(),
            expired = pass.expiries.values().map(BTreeSet::len).sum::<usize>(),
            "running checks"
        );

        while let Some(cursor) = pass.next_cursor() {
            if !claims.can_add_more(max_claims) {
                break;
            }
            debug!(chain_id, priority, cursor, "advancing block cursor");
            if !self.check_unprocessed(round, claims, &mut pass, cursor, max_claims)? {
                break;
            }
            if !self.check_expected(round, claims, &mut pass, cursor, max_claims)? {
                break;
            }
        }
        Ok(())
    }

    /// Resolve the unprocessed records at `cursor`. Returns `false` if the batch filled up first.
    fn check_unprocessed(
        &self,
        round: &mut RoundState,
        claims: &mut BridgeClaims,
        pass: &mut Pass,
        cursor: u64,
        max_claims: usize,
    ) -> Result<bool> {
        while pass
            .unprocessed
            .front()
            .is_some_and(|tx| tx.block_number == cursor)
        {
            if !claims.can_add_more(max_claims) {
                return Ok(false);
            }
            let Some(tx) = pass.unprocessed.pop_front() else {
                break;
            };
            self.check_unprocessed_tx(round, claims, pass, tx);
        }
        Ok(true)
    }

    fn check_unprocessed_tx(
        &self,
        round: &mut RoundState,
        claims: &mut BridgeClaims,
        pass: &mut Pass,
        tx: ChainTx,
    ) {
        let tx_type = match metadata::tx_type(&tx.metadata) {
            Ok(tx_type) => tx_type,
            Err(e) => {
                warn!(%tx, "undecodable metadata: {e}");
                self.mark_invalid(round, tx, None);
                return;
            }
        };
        let Some(validator) = self.validators.resolve_success(tx_type) else {
            warn!(%tx, ?tx_type, "no validator");
            self.mark_invalid(round, tx, Some(tx_type));
            return;
        };

        let bridging_requests = claims.bridging_request.len();
        let refund_requests = claims.refund_request.len();
        if let Err(e) = validator.validate_and_add_claim(claims, &tx, &self.config) {
            warn!(%tx, ?tx_type, "validation failed: {e}");
            self.mark_invalid(round, tx, Some(tx_type));
            return;
        }
        if claims.bridging_request.len() > bridging_requests {
            round
                .claim_sources
                .insert((ClaimKind::BridgingRequest, bridging_requests), tx.key());
        }
        if claims.refund_request.len() > refund_requests {
            round
                .claim_sources
                .insert((ClaimKind::RefundRequest, refund_requests), tx.key());
        }

        if tx_type == BridgingTxType::BatchExecution {
            if let Some(expected) = pass.resolve_expected(&tx.action_key()) {
                debug!(%tx, expected = %expected.key(), "batch execution observed");
                round.transitions.expected_processed.push(expected);
            }
        }

        if tx_type.awaits_execution() {
            round.transitions.move_unprocessed_to_pending.push(tx);
        } else {
            round
                .transitions
                .move_unprocessed_to_processed
                .push(tx.into_processed(false));
        }
    }

    fn mark_invalid(&self, round: &mut RoundState, tx: ChainTx, tx_type: Option<BridgingTxType>) {
        self.metrics.tx_invalid(&tx.origin_chain_id);
        if tx_type.is_some_and(BridgingTxType::awaits_execution) {
            round.invalid_requests.push(tx.key());
        }
        round
            .transitions
            .move_unprocessed_to_processed
            .push(tx.into_processed(true));
    }

    /// Resolve the outbound actions which expired at `cursor`. Returns `false` if the batch filled up first.
    fn check_expected(
        &self,
        round: &mut RoundState,
        claims: &mut BridgeClaims,
        pass: &mut Pass,
        cursor: u64,
        max_claims: usize,
    ) -> Result<bool> {
        let Some(keys) = pass.expiries.remove(&cursor) else {
            return Ok(true);
        };
        for key in keys {
            let Some(tx) = pass.active.remove(&key) else {
                continue;
            };

            if self.is_executed(round, &tx)? {
                debug!(expected = %key, "expired action was executed");
                round.transitions.expected_processed.push(tx);
                continue;
            }

            if !claims.can_add_more(max_claims) {
                return Ok(false);
            }
            let validator = metadata::tx_type(&tx.metadata)
                .ok()
                .and_then(|tx_type| self.validators.resolve_failure(tx_type));
            let Some(validator) = validator else {
                warn!(expected = %key, "no failure validator");
                round.transitions.expected_invalid.push(tx);
                continue;
            };
            match validator.validate_and_add_claim(claims, &tx, &self.config) {
                Ok(()) => round.transitions.expected_processed.push(tx),
                Err(e) => {
                    warn!(expected = %key, "failure validation failed: {e}");
                    round.transitions.expected_invalid.push(tx);
                }
            }
        }
        Ok(true)
    }

    /// Whether a valid record proves that `expected` was executed, either earlier in this round or in the store.
    fn is_executed(&self, round: &RoundState, expected: &ExpectedTx) -> Result<bool> {
        let key = expected.key();
        let in_round = round
            .transitions
            .move_unprocessed_to_processed
            .iter()
            .any(|processed| !processed.is_invalid && processed.tx.action_key() == key);
        if in_round {
            return Ok(true);
        }

        let by_inner_action = self
            .store
            .processed_by_inner_action_hash(&key.chain_id, &key.hash)?
            .filter(|processed| !processed.is_invalid);
        if by_inner_action.is_some() {
            return Ok(true);
        }
        Ok(self
            .store
            .processed_by_hash(&key.chain_id, &key.hash)?
            .is_some_and(|processed| !processed.is_invalid))
    }

    /// Keep records whose claim the bridge could not fund in the unprocessed queue, to be retried later.
    pub fn process_submit_receipt(&self, round: &mut RoundState, receipt: &SubmitReceipt) {
        let now = self.clock.now();
        for entry in &receipt.not_enough_funds {
            let Some(key) = round.claim_sources.get(&(entry.claim_kind, entry.index)) else {
                warn!(kind = %entry.claim_kind, index = entry.index, "receipt names an unknown claim");
                continue;
            };
            let pending = &mut round.transitions.move_unprocessed_to_pending;
            let Some(position) = pending.iter().position(|tx| tx.key() == *key) else {
                continue;
            };
            let mut tx = pending.remove(position);
            tx.submit_try_count += 1;
            tx.last_time_tried = Some(now);
            info!(%tx, kind = %entry.claim_kind, "not enough funds, will retry");
            round.transitions.update_unprocessed.push(tx);
        }
    }

    /// Tell the notifier which requests reached the bridge and which were rejected. Failures are only logged.
    pub fn notify_bridging_request_states(
        &self,
        round: &RoundState,
        notifier: &dyn BridgingRequestStateNotifier,
    ) {
        let submitted: Vec<BridgingRequestStateKey> = round
            .transitions
            .move_unprocessed_to_pending
            .iter()
            .map(|tx| tx.key().into())
            .collect();
        if !submitted.is_empty() {
            if let Err(e) = notifier.submitted_to_bridge(&submitted) {
                warn!("Failed to notify submitted bridging requests: {e}");
            }
        }

        let invalid: Vec<BridgingRequestStateKey> = round
            .invalid_requests
            .iter()
            .cloned()
            .map(Into::into)
            .collect();
        if !invalid.is_empty() {
            if let Err(e) = notifier.invalid(&invalid) {
                warn!("Failed to notify invalid bridging requests: {e}");
            }
        }
    }

    /// Write every transition of the round in one transaction.
    pub fn persist(&self, round: &RoundState) -> Result<()> {
        if round.transitions.is_empty() {
            return Ok(());
        }
        self.store.apply_transitions(&round.transitions)
    }
}
