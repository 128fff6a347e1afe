use tracing::info;

use super::{SuccessValidator, chain_config};
use crate::{
    cfg::OracleConfig,
    claims::{BridgeClaims, HotWalletIncrementClaim},
    error::ValidationError,
    metadata::{self, BridgingTxType},
    transaction::ChainTx,
};

/// Claims plain transfers into a chain's bridging address, which top up that chain's hot wallet.
#[derive(Debug, Clone, Copy, Default)]
pub struct HotWalletIncrementValidator;

impl SuccessValidator for HotWalletIncrementValidator {
    fn tx_type(&self) -> BridgingTxType {
        BridgingTxType::HotWalletFund
    }

    fn validate_and_add_claim(
        &self,
        claims: &mut BridgeClaims,
        tx: &ChainTx,
        config: &OracleConfig,
    ) -> Result<(), ValidationError> {
        super::ensure_type(self.tx_type(), metadata::tx_type(&tx.metadata)?)?;

        let chain = chain_config(config, &tx.origin_chain_id)?;
        if tx.value == 0 {
            return Err(ValidationError::ZeroValue);
        }
        if tx.receiver != chain.bridging_address {
            return Err(ValidationError::NotBridgingAddress {
                expected: chain.bridging_address.clone(),
                actual: tx.receiver.clone(),
            });
        }

        claims.hot_wallet_increment.push(HotWalletIncrementClaim {
            observed_tx_hash: tx.hash,
            chain_id: tx.origin_chain_id.clone(),
            amount: tx.value,
        });
        info!(hash = %tx.hash, amount = tx.value, "added hot wallet increment claim");
        Ok(())
    }
}
