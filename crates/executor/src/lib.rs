//! RPC 故障转移执行层
//!
//! ## 模块结构
//!
//! - `endpoint_pool`: 节点池与首选节点游标
//! - `failover`: 多节点重试 / 退避执行器
//! - `error_classifier`: 远程错误分类 (错误码与文本映射表)
//! - `gas_resolver`: legacy 费用解析与安全余量
//! - `client`: 只读客户端与签名器接口及 ethers 实现
//! - `submitter`: 交易提交与确认等待
//! - `types`: 错误与结果类型

mod endpoint_pool;
mod failover;
mod types;
pub mod client;
pub mod error_classifier;
pub mod gas_resolver;
pub mod submitter;

pub use endpoint_pool::EndpointPool;
pub use failover::FailoverExecutor;
pub use types::{BackoffPolicy, ConfirmationOutcome, RpcError};
pub use client::{ChainClient, HttpChainClient, LocalSigner, TxSigner};
pub use error_classifier::{classify, ErrorKind};
pub use gas_resolver::{with_margin, FeeResolver};
pub use submitter::{build_typed_tx, SubmitterConfig, TransactionSubmitter};
