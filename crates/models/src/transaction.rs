use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

/// 交易请求
///
/// 缺失的 gas 字段会在发送前被就地补齐
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRequest {
    pub to: Address,
    pub value: Option<U256>,
    pub data: Option<Bytes>,
    pub gas_limit: Option<U256>,
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

impl TxRequest {
    pub fn new(to: Address) -> Self {
        Self {
            to,
            ..Default::default()
        }
    }

    pub fn value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn gas_limit(mut self, gas_limit: U256) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn gas_price(mut self, gas_price: U256) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    /// 是否带有 EIP-1559 费用字段
    pub fn has_eip1559_fees(&self) -> bool {
        self.max_fee_per_gas.is_some() || self.max_priority_fee_per_gas.is_some()
    }

    /// 去掉 EIP-1559 费用字段，强制使用 legacy 格式
    pub fn strip_eip1559_fees(&mut self) {
        self.max_fee_per_gas = None;
        self.max_priority_fee_per_gas = None;
    }
}

/// 操作类型 (决定 legacy 费用上限)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// ERC20 approve
    Approval,
    /// 原生币转账
    ValueTransfer,
    /// ERC20 transfer / transferFrom
    TokenTransfer,
    /// 其他合约调用
    ContractCall,
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Approval => "approval",
            OperationKind::ValueTransfer => "value-transfer",
            OperationKind::TokenTransfer => "token-transfer",
            OperationKind::ContractCall => "contract-call",
        }
    }
}

/// Legacy 费用参数 (gasPrice × gasLimit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEnvelope {
    pub gas_limit: U256,
    pub gas_price: U256,
}

impl FeeEnvelope {
    /// 最大手续费 (wei)
    pub fn max_cost(&self) -> U256 {
        self.gas_limit.saturating_mul(self.gas_price)
    }
}

/// 交易提交结果
///
/// 对外接口只返回该结构，不向上抛错误
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReport {
    pub success: bool,
    pub tx_hash: Option<H256>,
    pub error: Option<String>,
    /// 已发送但在超时内未确认
    pub pending: bool,
}

impl SubmissionReport {
    pub fn confirmed(tx_hash: H256) -> Self {
        Self {
            success: true,
            tx_hash: Some(tx_hash),
            ..Default::default()
        }
    }

    pub fn pending(tx_hash: H256) -> Self {
        Self {
            tx_hash: Some(tx_hash),
            pending: true,
            ..Default::default()
        }
    }

    pub fn failed(tx_hash: Option<H256>, error: impl Into<String>) -> Self {
        Self {
            tx_hash,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
