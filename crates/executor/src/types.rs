//! 执行层类型定义

use ethers::types::{TransactionReceipt, H256, U64};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 执行层错误
///
/// 分类只在离远程调用最近的地方做一次 (见 `error_classifier`)，上层只按变体分支
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Signer is not connected")]
    NotConnected,

    #[error("User declined: {0}")]
    UserDeclined(String),

    #[error("Transient RPC error: {0}")]
    TransientRpc(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("All endpoints exhausted for {description}: {last_error}")]
    Exhausted { description: String, last_error: String },

    #[error("Transaction {0:?} not confirmed before timeout")]
    Unconfirmed(H256),

    #[error("Transaction {0:?} reverted")]
    Reverted(H256),

    #[error("RPC error: {0}")]
    Other(String),
}

impl RpcError {
    /// 是否需要立即终止整个重试循环
    pub fn is_fatal(&self) -> bool {
        matches!(self, RpcError::UserDeclined(_) | RpcError::NotConnected)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::TransientRpc(_))
    }
}

/// 确认等待结果
///
/// 超时不是失败：交易可能仍在 mempool 中，调用方不应重复提交
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationOutcome {
    Confirmed(TransactionReceipt),
    Reverted(TransactionReceipt),
    Pending(H256),
}

impl ConfirmationOutcome {
    pub(crate) fn from_receipt(receipt: TransactionReceipt) -> Self {
        if receipt.status == Some(U64::from(1)) {
            Self::Confirmed(receipt)
        } else {
            Self::Reverted(receipt)
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    /// 转成严格结果：只有确认成功才返回回执
    pub fn into_receipt(self) -> Result<TransactionReceipt, RpcError> {
        match self {
            Self::Confirmed(receipt) => Ok(receipt),
            Self::Reverted(receipt) => Err(RpcError::Reverted(receipt.transaction_hash)),
            Self::Pending(hash) => Err(RpcError::Unconfirmed(hash)),
        }
    }
}

/// 退避策略: min(base * 2^attempt, max)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1000,
            max_ms: 5000,
        }
    }
}

impl BackoffPolicy {
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.base_ms.saturating_mul(factor).min(self.max_ms)
    }
}
