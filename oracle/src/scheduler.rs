//! The reconciliation loop.
//!
//! Rounds run strictly one after another. Each round starts with a different chain, taken round-robin from the sorted
//! chain IDs. The starting chain is scanned first and its throttle bounds the shared claims batch; the other chains
//! fill whatever capacity remains.

use std::{iter, sync::Arc, time::Instant};

use anyhow::{Context, Result};
use tokio::{select, sync::watch, time};
use tracing::{debug, error, info, warn};

use crate::{
    cfg::OracleConfig,
    claims::BridgeClaims,
    metrics::OracleMetrics,
    notifier::{BridgingRequestStateKey, BridgingRequestStateNotifier},
    settings::ThrottleSettings,
    state_processor::{ChainStateProcessor, RoundState},
    submitter::{BridgeDataFetcher, ClaimsSubmitter, ValidatorSetObserver},
    transaction::{BatchInfoEvent, ChainId, DEFUND_TX_HASH},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Nothing to claim. Any invalid records or retry timestamps were still persisted.
    Empty,
    /// This many claims were accepted and the round was persisted.
    Submitted(usize),
    /// The batch was rejected. Only the throttle changed.
    SubmitFailed,
    /// Cancelled between chains. Nothing was persisted.
    Cancelled,
}

pub struct Scheduler {
    config: Arc<OracleConfig>,
    chain_ids: Vec<ChainId>,
    processor: ChainStateProcessor,
    throttle: ThrottleSettings,
    submitter: Arc<dyn ClaimsSubmitter>,
    fetcher: Arc<dyn BridgeDataFetcher>,
    validator_set: Arc<dyn ValidatorSetObserver>,
    notifier: Arc<dyn BridgingRequestStateNotifier>,
    metrics: OracleMetrics,
}

impl Scheduler {
    pub fn new(
        config: Arc<OracleConfig>,
        processor: ChainStateProcessor,
        submitter: Arc<dyn ClaimsSubmitter>,
        fetcher: Arc<dyn BridgeDataFetcher>,
        validator_set: Arc<dyn ValidatorSetObserver>,
        notifier: Arc<dyn BridgingRequestStateNotifier>,
        metrics: OracleMetrics,
    ) -> Self {
        Scheduler {
            chain_ids: config.sorted_chain_ids(),
            throttle: ThrottleSettings::new(&config),
            config,
            processor,
            submitter,
            fetcher,
            validator_set,
            notifier,
            metrics,
        }
    }

    pub fn chain_ids(&self) -> &[ChainId] {
        &self.chain_ids
    }

    pub fn throttle(&self) -> &ThrottleSettings {
        &self.throttle
    }

    /// Run rounds until `cancel` becomes `true` or its sender is dropped. An in-flight round is abandoned on
    /// cancellation.
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> Result<()> {
        let chain_ids = self.chain_ids.clone();
        if chain_ids.is_empty() {
            cancelled(&mut cancel).await;
            return Ok(());
        }
        info!(chains = ?chain_ids, tick_time = ?self.config.tick_time, "starting reconciliation");

        for start in chain_ids.iter().cycle() {
            select! {
                () = time::sleep(self.config.tick_time) => {}
                () = cancelled(&mut cancel) => break,
            }

            let round_cancel = cancel.clone();
            let started = Instant::now();
            let result = select! {
                result = self.process_round(start, &round_cancel) => result,
                () = cancelled(&mut cancel) => break,
            };
            let seconds = started.elapsed().as_secs_f64();

            let error_type = match result {
                Ok(RoundOutcome::SubmitFailed) => Some("submit-error"),
                Ok(outcome) => {
                    debug!(start, ?outcome, "round finished");
                    None
                }
                Err(e) => {
                    error!("Failed to process round starting with {start}: {e:?}");
                    Some("round-error")
                }
            };
            self.metrics.round_finished(start, seconds, error_type);
        }

        info!("reconciliation stopped");
        Ok(())
    }

    /// Scan every chain starting with `start`, submit the resulting batch and persist the outcome.
    pub async fn process_round(
        &mut self,
        start: &str,
        cancel: &watch::Receiver<bool>,
    ) -> Result<RoundOutcome> {
        if let Err(e) = self.processor.process_saved_events() {
            error!("Failed to process saved batch events: {e:?}");
        }

        let validator_set_pending = self.validator_set.is_validator_set_pending();
        if validator_set_pending {
            debug!("validator set change pending, skipping bridging and refund requests");
        }
        let throttle = self.throttle.get(start);
        let mut round = RoundState::new();
        let mut claims = BridgeClaims::default();

        let others = self.chain_ids.iter().filter(|chain| *chain != start);
        for chain_id in iter::once(start).chain(others.map(String::as_str)) {
            if *cancel.borrow() {
                info!(start, "round cancelled");
                return Ok(RoundOutcome::Cancelled);
            }
            self.processor.process_chain(
                &mut round,
                &mut claims,
                chain_id,
                throttle.max_claims_to_group,
                validator_set_pending,
            );
        }

        let outcome = if claims.is_empty() {
            RoundOutcome::Empty
        } else {
            let count = claims.count();
            let events = self.batch_info_events(&claims).await?;

            info!(start, %claims, gas_limit_multiplier = throttle.gas_limit_multiplier, "submitting claims");
            let receipt = match self
                .submitter
                .submit(start, &claims, throttle.gas_limit_multiplier)
                .await
            {
                Ok(receipt) => receipt,
                Err(e) => {
                    self.throttle.on_submit_claims_failed(start, count);
                    let throttle = self.throttle.get(start);
                    error!(
                        max_claims_to_group = throttle.max_claims_to_group,
                        gas_limit_multiplier = throttle.gas_limit_multiplier,
                        "Failed to submit {count} claims starting with {start}: {e:?}"
                    );
                    return Ok(RoundOutcome::SubmitFailed);
                }
            };

            self.throttle.reset(start);
            self.metrics.claims_submitted(start, count);
            self.processor.process_submit_receipt(&mut round, &receipt);
            self.notify_batch_outcomes(&events);
            round.transitions.add_batch_info_events.extend(events);
            RoundOutcome::Submitted(count)
        };

        self.processor
            .notify_bridging_request_states(&round, self.notifier.as_ref());

        self.processor
            .persist(&round)
            .context("failed to persist round")?;
        Ok(outcome)
    }

    /// Look up the source records carried by each batch we are about to claim as executed or failed. Hot wallet
    /// defunds travel in batches too but have no source record.
    async fn batch_info_events(&self, claims: &BridgeClaims) -> Result<Vec<BatchInfoEvent>> {
        let executed = claims
            .batch_executed
            .iter()
            .map(|c| (&c.chain_id, c.batch_nonce_id, c.observed_tx_hash, false));
        let failed = claims
            .batch_execution_failed
            .iter()
            .map(|c| (&c.chain_id, c.batch_nonce_id, c.observed_tx_hash, true));

        let mut events = Vec::new();
        for (chain_id, batch_id, dst_tx_hash, is_failed) in executed.chain(failed) {
            let txs = self
                .fetcher
                .batch_transactions(chain_id, batch_id)
                .await
                .with_context(|| format!("failed to fetch batch {batch_id} on {chain_id}"))?;
            let (defunds, txs): (Vec<_>, Vec<_>) =
                txs.into_iter().partition(|key| key.hash == DEFUND_TX_HASH);
            if !defunds.is_empty() {
                info!(%chain_id, batch_id, is_failed, "skipping defund in batch");
            }
            events.push(BatchInfoEvent {
                chain_id: chain_id.clone(),
                batch_id,
                dst_tx_hash,
                is_failed,
                txs,
            });
        }
        Ok(events)
    }

    fn notify_batch_outcomes(&self, events: &[BatchInfoEvent]) {
        for event in events.iter().filter(|event| !event.txs.is_empty()) {
            let keys: Vec<BridgingRequestStateKey> =
                event.txs.iter().cloned().map(Into::into).collect();
            let result = if event.is_failed {
                self.notifier
                    .failed_to_execute_on_destination(&keys, &event.chain_id)
            } else {
                self.notifier
                    .executed_on_destination(&keys, event.dst_tx_hash, &event.chain_id)
            };
            if let Err(e) = result {
                warn!(batch = event.batch_id, "Failed to notify batch outcome: {e}");
            }
        }
    }
}

/// Resolves once cancellation is requested, or the sender has gone away.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}
