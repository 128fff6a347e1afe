use tracing::info;

use super::{SuccessValidator, chain_config, ensure_type};
use crate::{
    cfg::OracleConfig,
    claims::{BridgeClaims, RefundRequestClaim},
    error::ValidationError,
    metadata::{self, BridgingTxType, RefundRequestMetadata},
    transaction::ChainTx,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct RefundRequestValidator;

impl SuccessValidator for RefundRequestValidator {
    fn tx_type(&self) -> BridgingTxType {
        BridgingTxType::RefundRequest
    }

    fn validate_and_add_claim(
        &self,
        claims: &mut BridgeClaims,
        tx: &ChainTx,
        config: &OracleConfig,
    ) -> Result<(), ValidationError> {
        if !config.bridging.refund_enabled {
            return Err(ValidationError::RefundDisabled);
        }
        let metadata: RefundRequestMetadata = metadata::decode(&tx.metadata)?;
        ensure_type(self.tx_type(), metadata.tx_type)?;

        Self::add_claim(claims, tx, &metadata.sender_addr, config)
    }
}

impl RefundRequestValidator {
    /// Validate a refund of `tx` back to `sender` and append its claim. Also used for rejected bridging requests.
    pub(super) fn add_claim(
        claims: &mut BridgeClaims,
        tx: &ChainTx,
        sender: &str,
        config: &OracleConfig,
    ) -> Result<(), ValidationError> {
        if !config.bridging.refund_enabled {
            return Err(ValidationError::RefundDisabled);
        }
        let max = config.try_count_limits.max_refund_try_count;
        if tx.refund_try_count > max {
            return Err(ValidationError::TryCountExceeded {
                kind: "refund",
                count: tx.refund_try_count,
                max,
            });
        }
        let origin = chain_config(config, &tx.origin_chain_id)?;
        if sender.trim().is_empty() {
            return Err(ValidationError::InvalidSender(sender.to_owned()));
        }
        if tx.value <= origin.min_fee_for_bridging as u128 {
            return Err(ValidationError::ValueBelowRefundMinimum {
                value: tx.value,
                min: origin.min_fee_for_bridging,
            });
        }

        claims.refund_request.push(RefundRequestClaim {
            origin_tx_hash: tx.hash,
            origin_chain_id: tx.origin_chain_id.clone(),
            origin_sender_address: sender.to_owned(),
            origin_amount: tx.value,
            retry_counter: tx.refund_try_count,
            should_decrement_hot_wallet: tx.batch_try_count > 0,
        });
        info!(hash = %tx.hash, %sender, amount = tx.value, "added refund request claim");
        Ok(())
    }
}
