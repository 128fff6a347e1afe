use tracing::info;

use super::{SuccessValidator, chain_config, ensure_type};
use crate::{
    cfg::{ChainFamily, OracleConfig},
    claims::{BatchExecutedClaim, BridgeClaims},
    error::ValidationError,
    metadata::{self, BatchExecutedMetadata, BridgingTxType},
    transaction::ChainTx,
};

/// Claims that a batch we sent to a chain was executed there.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchExecutedValidator;

impl SuccessValidator for BatchExecutedValidator {
    fn tx_type(&self) -> BridgingTxType {
        BridgingTxType::BatchExecution
    }

    fn validate_and_add_claim(
        &self,
        claims: &mut BridgeClaims,
        tx: &ChainTx,
        config: &OracleConfig,
    ) -> Result<(), ValidationError> {
        let metadata: BatchExecutedMetadata = metadata::decode(&tx.metadata)?;
        ensure_type(self.tx_type(), metadata.tx_type)?;

        let chain = chain_config(config, &tx.origin_chain_id)?;
        // Account chains report execution through an event; the batch itself is the inner action.
        let observed_tx_hash = match (chain.family, tx.inner_action_hash) {
            (ChainFamily::Account, Some(hash)) => hash,
            (ChainFamily::Account, None) => return Err(ValidationError::MissingInnerActionHash),
            (ChainFamily::Utxo, _) => tx.hash,
        };

        claims.batch_executed.push(BatchExecutedClaim {
            observed_tx_hash,
            chain_id: tx.origin_chain_id.clone(),
            batch_nonce_id: metadata.batch_nonce_id,
        });
        info!(hash = %observed_tx_hash, batch = metadata.batch_nonce_id, "added batch executed claim");
        Ok(())
    }
}
