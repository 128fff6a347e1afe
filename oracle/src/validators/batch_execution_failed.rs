use tracing::info;

use super::{FailureValidator, chain_config, ensure_type};
use crate::{
    cfg::OracleConfig,
    claims::{BatchExecutionFailedClaim, BridgeClaims},
    error::ValidationError,
    metadata::{self, BatchExecutedMetadata, BridgingTxType},
    transaction::ExpectedTx,
};

/// Claims that a batch expired on its destination chain without being executed.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchExecutionFailedValidator;

impl FailureValidator for BatchExecutionFailedValidator {
    fn tx_type(&self) -> BridgingTxType {
        BridgingTxType::BatchExecution
    }

    fn validate_and_add_claim(
        &self,
        claims: &mut BridgeClaims,
        tx: &ExpectedTx,
        config: &OracleConfig,
    ) -> Result<(), ValidationError> {
        let metadata: BatchExecutedMetadata = metadata::decode(&tx.metadata)?;
        ensure_type(self.tx_type(), metadata.tx_type)?;
        chain_config(config, &tx.chain_id)?;

        claims.batch_execution_failed.push(BatchExecutionFailedClaim {
            observed_tx_hash: tx.hash,
            chain_id: tx.chain_id.clone(),
            batch_nonce_id: metadata.batch_nonce_id,
        });
        info!(hash = %tx.hash, batch = metadata.batch_nonce_id, "added batch execution failed claim");
        Ok(())
    }
}
