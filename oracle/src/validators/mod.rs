//! Per-type claim validators.
//!
//! A success validator turns a confirmed source transaction into exactly one claim. A failure validator turns an
//! expired outbound action into exactly one failure claim. Validators only ever mutate the claims they are handed, and
//! leave them untouched when they return an error.
//!
//! The set of validators is closed: [ValidatorRegistry::standard] lists every one, and each is reached by the type
//! tag in a record's metadata.

mod batch_executed;
mod batch_execution_failed;
mod bridging_request;
mod hot_wallet_increment;
mod refund_request;

use std::collections::HashMap;

pub use self::{
    batch_executed::BatchExecutedValidator, batch_execution_failed::BatchExecutionFailedValidator,
    bridging_request::BridgingRequestValidator, hot_wallet_increment::HotWalletIncrementValidator,
    refund_request::RefundRequestValidator,
};
use crate::{
    cfg::{ChainConfig, OracleConfig},
    claims::BridgeClaims,
    error::ValidationError,
    metadata::BridgingTxType,
    transaction::{ChainTx, ExpectedTx},
};

pub trait SuccessValidator {
    fn tx_type(&self) -> BridgingTxType;

    fn validate_and_add_claim(
        &self,
        claims: &mut BridgeClaims,
        tx: &ChainTx,
        config: &OracleConfig,
    ) -> Result<(), ValidationError>;
}

pub trait FailureValidator {
    fn tx_type(&self) -> BridgingTxType;

    fn validate_and_add_claim(
        &self,
        claims: &mut BridgeClaims,
        tx: &ExpectedTx,
        config: &OracleConfig,
    ) -> Result<(), ValidationError>;
}

#[derive(Debug, Clone)]
pub enum SuccessValidators {
    BridgingRequest(BridgingRequestValidator),
    BatchExecuted(BatchExecutedValidator),
    RefundRequest(RefundRequestValidator),
    HotWalletIncrement(HotWalletIncrementValidator),
}

impl SuccessValidator for SuccessValidators {
    fn tx_type(&self) -> BridgingTxType {
        match self {
            SuccessValidators::BridgingRequest(v) => v.tx_type(),
            SuccessValidators::BatchExecuted(v) => v.tx_type(),
            SuccessValidators::RefundRequest(v) => v.tx_type(),
            SuccessValidators::HotWalletIncrement(v) => v.tx_type(),
        }
    }

    fn validate_and_add_claim(
        &self,
        claims: &mut BridgeClaims,
        tx: &ChainTx,
        config: &OracleConfig,
    ) -> Result<(), ValidationError> {
        match self {
            SuccessValidators::BridgingRequest(v) => v.validate_and_add_claim(claims, tx, config),
            SuccessValidators::BatchExecuted(v) => v.validate_and_add_claim(claims, tx, config),
            SuccessValidators::RefundRequest(v) => v.validate_and_add_claim(claims, tx, config),
            SuccessValidators::HotWalletIncrement(v) => {
                v.validate_and_add_claim(claims, tx, config)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum FailureValidators {
    BatchExecutionFailed(BatchExecutionFailedValidator),
}

impl FailureValidator for FailureValidators {
    fn tx_type(&self) -> BridgingTxType {
        match self {
            FailureValidators::BatchExecutionFailed(v) => v.tx_type(),
        }
    }

    fn validate_and_add_claim(
        &self,
        claims: &mut BridgeClaims,
        tx: &ExpectedTx,
        config: &OracleConfig,
    ) -> Result<(), ValidationError> {
        match self {
            FailureValidators::BatchExecutionFailed(v) => {
                v.validate_and_add_claim(claims, tx, config)
            }
        }
    }
}

/// Maps metadata type tags to validators. Built once at startup.
#[derive(Debug, Clone, Default)]
pub struct ValidatorRegistry {
    success: HashMap<BridgingTxType, SuccessValidators>,
    failure: HashMap<BridgingTxType, FailureValidators>,
}

impl ValidatorRegistry {
    pub fn new(
        success: impl IntoIterator<Item = SuccessValidators>,
        failure: impl IntoIterator<Item = FailureValidators>,
    ) -> Self {
        ValidatorRegistry {
            success: success.into_iter().map(|v| (v.tx_type(), v)).collect(),
            failure: failure.into_iter().map(|v| (v.tx_type(), v)).collect(),
        }
    }

    pub fn standard() -> Self {
        Self::new(
            [
                SuccessValidators::BridgingRequest(BridgingRequestValidator),
                SuccessValidators::BatchExecuted(BatchExecutedValidator),
                SuccessValidators::RefundRequest(RefundRequestValidator),
                SuccessValidators::HotWalletIncrement(HotWalletIncrementValidator),
            ],
            [FailureValidators::BatchExecutionFailed(
                BatchExecutionFailedValidator,
            )],
        )
    }

    pub fn resolve_success(&self, tx_type: BridgingTxType) -> Option<&SuccessValidators> {
        self.success.get(&tx_type)
    }

    pub fn resolve_failure(&self, tx_type: BridgingTxType) -> Option<&FailureValidators> {
        self.failure.get(&tx_type)
    }
}

fn chain_config<'a>(
    config: &'a OracleConfig,
    chain_id: &str,
) -> Result<&'a ChainConfig, ValidationError> {
    config
        .chain(chain_id)
        .ok_or_else(|| ValidationError::UnknownChain(chain_id.to_owned()))
}

fn ensure_type(expected: BridgingTxType, actual: BridgingTxType) -> Result<(), ValidationError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ValidationError::IrrelevantTx { expected, actual })
    }
}
