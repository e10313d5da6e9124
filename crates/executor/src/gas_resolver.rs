//! Legacy 费用解析器
//!
//! 按操作类型返回固定的 gasLimit 上限和 gasPrice 下限，不访问网络。
//! 目标链不接受混合费用格式，所以应用 legacy 费用时同时去掉 EIP-1559 字段。

use ethers::types::U256;
use models::{FeeEnvelope, OperationKind, TxRequest};
use std::collections::HashMap;
use tracing::debug;

const GWEI: f64 = 1_000_000_000.0;

/// 各操作类型的 gasLimit 上限
pub fn default_gas_limit(kind: OperationKind) -> u64 {
    match kind {
        OperationKind::ValueTransfer => 21_000,
        OperationKind::Approval => 100_000,
        OperationKind::TokenTransfer => 120_000,
        OperationKind::ContractCall => 300_000,
    }
}

#[derive(Debug, Clone)]
pub struct FeeResolver {
    gas_price: U256,
    limits: HashMap<OperationKind, U256>,
}

impl FeeResolver {
    /// `gas_price_gwei` 支持小数，如 0.1 Gwei
    pub fn new(gas_price_gwei: f64) -> Self {
        let limits = [
            OperationKind::ValueTransfer,
            OperationKind::Approval,
            OperationKind::TokenTransfer,
            OperationKind::ContractCall,
        ]
        .into_iter()
        .map(|kind| (kind, U256::from(default_gas_limit(kind))))
        .collect();

        Self {
            gas_price: U256::from((gas_price_gwei.max(0.0) * GWEI) as u128),
            limits,
        }
    }

    /// 覆盖某类操作的 gasLimit
    pub fn with_limit(mut self, kind: OperationKind, gas_limit: u64) -> Self {
        self.limits.insert(kind, U256::from(gas_limit));
        self
    }

    pub fn resolve(&self, kind: OperationKind) -> FeeEnvelope {
        FeeEnvelope {
            gas_limit: self
                .limits
                .get(&kind)
                .copied()
                .unwrap_or_else(|| U256::from(default_gas_limit(kind))),
            gas_price: self.gas_price,
        }
    }

    /// 只补齐缺失字段，调用方已给出的 gasLimit / gasPrice 不覆盖
    pub fn apply(&self, kind: OperationKind, request: &mut TxRequest) -> FeeEnvelope {
        request.strip_eip1559_fees();

        let envelope = self.resolve(kind);
        let gas_limit = *request.gas_limit.get_or_insert(envelope.gas_limit);
        let gas_price = *request.gas_price.get_or_insert(envelope.gas_price);

        debug!(
            kind = kind.name(),
            %gas_limit,
            %gas_price,
            "应用 legacy 费用"
        );

        FeeEnvelope { gas_limit, gas_price }
    }
}

/// 增加百分比余量: value * (100 + percent) / 100
pub fn with_margin(value: U256, percent: u64) -> U256 {
    value.saturating_mul(U256::from(100 + percent)) / U256::from(100)
}
