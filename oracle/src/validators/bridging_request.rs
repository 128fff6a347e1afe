use tracing::{debug, info};

use super::{RefundRequestValidator, SuccessValidator, chain_config, ensure_type};
use crate::{
    cfg::OracleConfig,
    claims::{BridgeClaims, BridgingRequestClaim, Receiver},
    error::ValidationError,
    metadata::{self, BridgingRequestMetadata, BridgingTxType},
    transaction::ChainTx,
};

/// Claims a deposit into the bridge for delivery on another chain. Requests which fail validation are refunded
/// instead when refunds are enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgingRequestValidator;

impl SuccessValidator for BridgingRequestValidator {
    fn tx_type(&self) -> BridgingTxType {
        BridgingTxType::BridgingRequest
    }

    fn validate_and_add_claim(
        &self,
        claims: &mut BridgeClaims,
        tx: &ChainTx,
        config: &OracleConfig,
    ) -> Result<(), ValidationError> {
        let metadata: BridgingRequestMetadata = metadata::decode(&tx.metadata)?;
        ensure_type(self.tx_type(), metadata.tx_type)?;

        debug!(%tx, ?metadata, "validating bridging request");

        match self.validate(tx, &metadata, config) {
            Ok(claim) => {
                info!(hash = %tx.hash, destination = %claim.destination_chain_id, total = claim.total_amount, "added bridging request claim");
                claims.bridging_request.push(claim);
                Ok(())
            }
            Err(e) if config.bridging.refund_enabled => {
                info!(hash = %tx.hash, "bridging request rejected, refunding: {e}");
                RefundRequestValidator::add_claim(claims, tx, &metadata.sender_addr, config)
            }
            Err(e) => Err(e),
        }
    }
}

impl BridgingRequestValidator {
    fn validate(
        &self,
        tx: &ChainTx,
        metadata: &BridgingRequestMetadata,
        config: &OracleConfig,
    ) -> Result<BridgingRequestClaim, ValidationError> {
        let limits = &config.try_count_limits;
        if tx.batch_try_count > limits.max_batch_try_count {
            return Err(ValidationError::TryCountExceeded {
                kind: "batch",
                count: tx.batch_try_count,
                max: limits.max_batch_try_count,
            });
        }
        if tx.submit_try_count > limits.max_submit_try_count {
            return Err(ValidationError::TryCountExceeded {
                kind: "submit",
                count: tx.submit_try_count,
                max: limits.max_submit_try_count,
            });
        }

        chain_config(config, &tx.origin_chain_id)?;
        let destination = chain_config(config, &metadata.destination_chain_id)?;
        if destination.chain_id == tx.origin_chain_id {
            return Err(ValidationError::SameChain(destination.chain_id.clone()));
        }

        let max = config.bridging.max_receivers_per_bridging_request;
        if metadata.transactions.len() > max {
            return Err(ValidationError::TooManyReceivers {
                count: metadata.transactions.len(),
                max,
            });
        }

        let mut receivers = Vec::with_capacity(metadata.transactions.len() + 1);
        let mut receivers_sum: u128 = 0;
        let mut fee = metadata.fee_amount;
        for receiver in &metadata.transactions {
            // Anything sent to the fee address counts towards the fee.
            if receiver.address == destination.fee_address {
                fee = fee
                    .checked_add(receiver.amount)
                    .ok_or(ValidationError::AmountOverflow)?;
                continue;
            }
            if receiver.amount < destination.min_utxo_amount as u128 {
                return Err(ValidationError::AmountBelowMinimum {
                    address: receiver.address.clone(),
                    amount: receiver.amount,
                    min: destination.min_utxo_amount,
                });
            }
            receivers_sum = receivers_sum
                .checked_add(receiver.amount)
                .ok_or(ValidationError::AmountOverflow)?;
            receivers.push(Receiver {
                address: receiver.address.clone(),
                amount: receiver.amount,
            });
        }

        if fee < destination.min_fee_for_bridging as u128 {
            return Err(ValidationError::FeeBelowMinimum {
                fee,
                min: destination.min_fee_for_bridging,
            });
        }

        let total_amount = receivers_sum
            .checked_add(fee)
            .ok_or(ValidationError::AmountOverflow)?;
        if tx.value != total_amount {
            return Err(ValidationError::ValueMismatch {
                value: tx.value,
                expected: total_amount,
            });
        }

        receivers.push(Receiver {
            address: destination.fee_address.clone(),
            amount: fee,
        });

        Ok(BridgingRequestClaim {
            observed_tx_hash: tx.hash,
            source_chain_id: tx.origin_chain_id.clone(),
            destination_chain_id: destination.chain_id.clone(),
            receivers,
            total_amount,
            retry_counter: tx.batch_try_count,
        })
    }
}
