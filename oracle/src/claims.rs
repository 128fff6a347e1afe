use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::transaction::{ChainId, TxHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimKind {
    BridgingRequest,
    BatchExecuted,
    BatchExecutionFailed,
    RefundRequest,
    RefundExecuted,
    HotWalletIncrement,
}

impl Display for ClaimKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let short = match self {
            ClaimKind::BridgingRequest => "BRC",
            ClaimKind::BatchExecuted => "BEC",
            ClaimKind::BatchExecutionFailed => "BEFC",
            ClaimKind::RefundRequest => "RRC",
            ClaimKind::RefundExecuted => "REC",
            ClaimKind::HotWalletIncrement => "HWIC",
        };
        f.write_str(short)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receiver {
    pub address: String,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgingRequestClaim {
    pub observed_tx_hash: TxHash,
    pub source_chain_id: ChainId,
    pub destination_chain_id: ChainId,
    /// Ends with the fee receiver.
    pub receivers: Vec<Receiver>,
    pub total_amount: u128,
    pub retry_counter: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchExecutedClaim {
    pub observed_tx_hash: TxHash,
    pub chain_id: ChainId,
    pub batch_nonce_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchExecutionFailedClaim {
    pub observed_tx_hash: TxHash,
    pub chain_id: ChainId,
    pub batch_nonce_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequestClaim {
    pub origin_tx_hash: TxHash,
    pub origin_chain_id: ChainId,
    pub origin_sender_address: String,
    pub origin_amount: u128,
    pub retry_counter: u32,
    /// Set when the funds already reached the hot wallet in an earlier, failed batch.
    pub should_decrement_hot_wallet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundExecutedClaim {
    pub observed_tx_hash: TxHash,
    pub chain_id: ChainId,
    pub refund_tx_hash: TxHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotWalletIncrementClaim {
    pub observed_tx_hash: TxHash,
    pub chain_id: ChainId,
    pub amount: u128,
}

/// The claims gathered during one round, submitted to the bridge together.
///
/// Callers check [BridgeClaims::can_add_more] before asking a validator to append, so the total never passes the
/// round's group size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeClaims {
    pub bridging_request: Vec<BridgingRequestClaim>,
    pub batch_executed: Vec<BatchExecutedClaim>,
    pub batch_execution_failed: Vec<BatchExecutionFailedClaim>,
    pub refund_request: Vec<RefundRequestClaim>,
    pub refund_executed: Vec<RefundExecutedClaim>,
    pub hot_wallet_increment: Vec<HotWalletIncrementClaim>,
}

impl BridgeClaims {
    pub fn count(&self) -> usize {
        self.bridging_request.len()
            + self.batch_executed.len()
            + self.batch_execution_failed.len()
            + self.refund_request.len()
            + self.refund_executed.len()
            + self.hot_wallet_increment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn can_add_more(&self, max_claims: usize) -> bool {
        self.count() < max_claims
    }
}

impl Display for BridgeClaims {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let counts = [
            (ClaimKind::BridgingRequest, self.bridging_request.len()),
            (ClaimKind::BatchExecuted, self.batch_executed.len()),
            (ClaimKind::BatchExecutionFailed, self.batch_execution_failed.len()),
            (ClaimKind::RefundRequest, self.refund_request.len()),
            (ClaimKind::RefundExecuted, self.refund_executed.len()),
            (ClaimKind::HotWalletIncrement, self.hot_wallet_increment.len()),
        ];
        let mut first = true;
        for (kind, count) in counts.into_iter().filter(|(_, c)| *c > 0) {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{kind}={count}")?;
            first = false;
        }
        if first {
            f.write_str("empty")?;
        }
        Ok(())
    }
}
