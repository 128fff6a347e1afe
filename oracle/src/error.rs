use thiserror::Error;

use crate::{metadata::BridgingTxType, transaction::ChainId};

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to decode metadata: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Why a validator refused to turn a record into a claim. Rejections are terminal for the record.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("validator for {expected:?} called with {actual:?} metadata")]
    IrrelevantTx {
        expected: BridgingTxType,
        actual: BridgingTxType,
    },
    #[error("chain {0} is not registered")]
    UnknownChain(ChainId),
    #[error("destination chain {0} is the origin chain")]
    SameChain(ChainId),
    #[error("{count} receivers exceeds the maximum of {max}")]
    TooManyReceivers { count: usize, max: usize },
    #[error("receiver {address} amount {amount} is below the minimum of {min}")]
    AmountBelowMinimum {
        address: String,
        amount: u128,
        min: u64,
    },
    #[error("bridging fee {fee} is below the minimum of {min}")]
    FeeBelowMinimum { fee: u128, min: u64 },
    #[error("tx value {value} is not equal to receivers plus fee {expected}")]
    ValueMismatch { value: u128, expected: u128 },
    #[error("amounts overflow")]
    AmountOverflow,
    #[error("{kind} try count {count} exceeds the maximum of {max}")]
    TryCountExceeded {
        kind: &'static str,
        count: u32,
        max: u32,
    },
    #[error("refunds are disabled")]
    RefundDisabled,
    #[error("invalid sender address {0:?}")]
    InvalidSender(String),
    #[error("tx value {value} must exceed the refund minimum of {min}")]
    ValueBelowRefundMinimum { value: u128, min: u64 },
    #[error("tx value is zero")]
    ZeroValue,
    #[error("receiver {actual} is not the bridging address {expected}")]
    NotBridgingAddress { expected: String, actual: String },
    #[error("missing inner action hash")]
    MissingInnerActionHash,
}
