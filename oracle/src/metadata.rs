//! Bridge metadata attached to observed transactions.
//!
//! Metadata is a JSON object whose `t` field names the kind of bridge operation. Transactions without metadata are
//! plain transfers into the bridging address.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{error::MetadataError, transaction::ChainId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BridgingTxType {
    #[serde(rename = "bridge")]
    BridgingRequest,
    #[serde(rename = "batch")]
    BatchExecution,
    #[serde(rename = "refund")]
    RefundRequest,
    #[serde(rename = "hotWallet")]
    HotWalletFund,
}

impl BridgingTxType {
    /// Whether a claim for this kind of record leaves it pending until the destination reports execution.
    pub fn awaits_execution(self) -> bool {
        matches!(
            self,
            BridgingTxType::BridgingRequest | BridgingTxType::RefundRequest
        )
    }
}

#[derive(Deserialize)]
struct TypeTag {
    #[serde(rename = "t")]
    tx_type: BridgingTxType,
}

/// Read the type tag of some metadata.
pub fn tx_type(metadata: &[u8]) -> Result<BridgingTxType, MetadataError> {
    if metadata.is_empty() {
        return Ok(BridgingTxType::HotWalletFund);
    }
    let tag: TypeTag = serde_json::from_slice(metadata)?;
    Ok(tag.tx_type)
}

pub fn decode<T: DeserializeOwned>(metadata: &[u8]) -> Result<T, MetadataError> {
    Ok(serde_json::from_slice(metadata)?)
}

pub fn encode<T: Serialize>(metadata: &T) -> Result<Vec<u8>, MetadataError> {
    Ok(serde_json::to_vec(metadata)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgingRequestMetadata {
    #[serde(rename = "t")]
    pub tx_type: BridgingTxType,
    #[serde(rename = "d")]
    pub destination_chain_id: ChainId,
    #[serde(rename = "s")]
    pub sender_addr: String,
    #[serde(rename = "tx")]
    pub transactions: Vec<BridgingRequestReceiver>,
    #[serde(rename = "fa", default)]
    pub fee_amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgingRequestReceiver {
    #[serde(rename = "a")]
    pub address: String,
    #[serde(rename = "m")]
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchExecutedMetadata {
    #[serde(rename = "t")]
    pub tx_type: BridgingTxType,
    #[serde(rename = "n")]
    pub batch_nonce_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequestMetadata {
    #[serde(rename = "t")]
    pub tx_type: BridgingTxType,
    #[serde(rename = "s")]
    pub sender_addr: String,
}
