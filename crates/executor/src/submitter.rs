//! 交易提交器
//!
//! 补齐 gas 字段后通过故障转移执行器发送交易，并在固定超时内等待确认。
//! 估算、报价、发送都走执行器，单个节点故障不会中断提交。

use config_crate::AppConfig;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Eip1559TransactionRequest, TransactionRequest, H256};
use models::{OperationKind, SubmissionReport, TxRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use utils::TARGET_SUBMITTER;

use crate::client::{ChainClient, TxSigner};
use crate::failover::FailoverExecutor;
use crate::gas_resolver::{with_margin, FeeResolver};
use crate::types::{ConfirmationOutcome, RpcError};

/// 提交器配置
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    pub chain_id: u64,
    pub max_attempts: u32,
    pub gas_limit_margin_percent: u64,
    pub gas_price_margin_percent: u64,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            max_attempts: 3,
            gas_limit_margin_percent: 10,
            gas_price_margin_percent: 10,
            confirmation_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl From<&AppConfig> for SubmitterConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            chain_id: config.chain.chain_id,
            max_attempts: config.retry.max_attempts,
            gas_limit_margin_percent: config.gas.gas_limit_margin_percent,
            gas_price_margin_percent: config.gas.gas_price_margin_percent,
            confirmation_timeout: Duration::from_secs(config.submit.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(config.submit.receipt_poll_interval_ms),
        }
    }
}

pub struct TransactionSubmitter<C: ChainClient> {
    executor: Arc<FailoverExecutor>,
    client: Arc<C>,
    fees: FeeResolver,
    config: SubmitterConfig,
}

impl<C: ChainClient> TransactionSubmitter<C> {
    pub fn new(
        executor: Arc<FailoverExecutor>,
        client: Arc<C>,
        fees: FeeResolver,
        config: SubmitterConfig,
    ) -> Self {
        Self {
            executor,
            client,
            fees,
            config,
        }
    }

    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    /// 补齐缺失的 gasLimit / gasPrice
    ///
    /// - gasLimit 缺失: 节点估算 + 余量
    /// - gasPrice 与 EIP-1559 字段都缺失: 节点报价 + 余量
    pub async fn fill_gas(&self, request: &mut TxRequest, from: Address) -> Result<(), RpcError> {
        if request.gas_limit.is_none() {
            let tx = build_typed_tx(request, from, self.config.chain_id);
            let client = &self.client;
            let tx = &tx;
            let estimate = self
                .executor
                .run(
                    move |endpoint| async move { client.estimate_gas(&endpoint, tx).await },
                    self.config.max_attempts,
                    "estimate_gas",
                )
                .await?;
            let gas_limit = with_margin(estimate, self.config.gas_limit_margin_percent);
            debug!(target: TARGET_SUBMITTER, %estimate, %gas_limit, "gas 估算");
            request.gas_limit = Some(gas_limit);
        }

        if request.gas_price.is_none() && !request.has_eip1559_fees() {
            let client = &self.client;
            let observed = self
                .executor
                .run(
                    move |endpoint| async move { client.gas_price(&endpoint).await },
                    self.config.max_attempts,
                    "gas_price",
                )
                .await?;
            let gas_price = with_margin(observed, self.config.gas_price_margin_percent);
            debug!(target: TARGET_SUBMITTER, %observed, %gas_price, "gas price");
            request.gas_price = Some(gas_price);
        }

        Ok(())
    }

    /// 发送交易，返回交易哈希
    pub async fn submit<S>(&self, mut request: TxRequest, signer: &S) -> Result<H256, RpcError>
    where
        S: TxSigner + ?Sized,
    {
        if !signer.is_connected() {
            return Err(RpcError::NotConnected);
        }

        let from = signer.address();
        self.fill_gas(&mut request, from).await?;

        let tx = build_typed_tx(&request, from, self.config.chain_id);
        let tx = &tx;
        let tx_hash = self
            .executor
            .run(
                move |endpoint| async move { signer.send_transaction(&endpoint, tx.clone()).await },
                self.config.max_attempts,
                "send_transaction",
            )
            .await?;

        info!(
            target: TARGET_SUBMITTER,
            "交易已发送: {:?} | to: {:?} | gas: {:?} | gas_price: {:?}",
            tx_hash, request.to, request.gas_limit, request.gas_price
        );
        Ok(tx_hash)
    }

    /// 使用固定的 legacy 费用发送 (不估算、不报价)
    pub async fn submit_legacy<S>(
        &self,
        mut request: TxRequest,
        kind: OperationKind,
        signer: &S,
    ) -> Result<H256, RpcError>
    where
        S: TxSigner + ?Sized,
    {
        self.fees.apply(kind, &mut request);
        self.submit(request, signer).await
    }

    /// 在当前首选节点上轮询回执
    ///
    /// 超时返回 `Pending`，不视为失败
    pub async fn wait_for_confirmation(&self, tx_hash: H256, timeout: Duration) -> ConfirmationOutcome {
        let poll = async {
            loop {
                let endpoint = self.executor.pool().current().clone();
                match self.client.transaction_receipt(&endpoint, tx_hash).await {
                    Ok(Some(receipt)) => return ConfirmationOutcome::from_receipt(receipt),
                    Ok(None) => debug!(target: TARGET_SUBMITTER, "等待交易确认: {:?}", tx_hash),
                    Err(e) => warn!(target: TARGET_SUBMITTER, "获取交易回执失败 {}: {}", endpoint, e),
                }
                tokio::time::sleep(self.config.poll_interval).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(outcome) => {
                match &outcome {
                    ConfirmationOutcome::Confirmed(receipt) => info!(
                        target: TARGET_SUBMITTER,
                        "交易确认成功: {:?} | Block: {:?}", tx_hash, receipt.block_number
                    ),
                    _ => warn!(target: TARGET_SUBMITTER, "交易 Revert: {:?}", tx_hash),
                }
                outcome
            }
            Err(_) => {
                warn!(
                    target: TARGET_SUBMITTER,
                    "交易 {:?} 在 {}s 内未确认", tx_hash, timeout.as_secs()
                );
                ConfirmationOutcome::Pending(tx_hash)
            }
        }
    }

    /// 发送并等待确认，所有错误都收敛到 `SubmissionReport`
    pub async fn submit_and_confirm<S>(
        &self,
        request: TxRequest,
        kind: Option<OperationKind>,
        signer: &S,
    ) -> SubmissionReport
    where
        S: TxSigner + ?Sized,
    {
        let sent = match kind {
            Some(kind) => self.submit_legacy(request, kind, signer).await,
            None => self.submit(request, signer).await,
        };

        let tx_hash = match sent {
            Ok(hash) => hash,
            Err(e) => return SubmissionReport::failed(None, e.to_string()),
        };

        match self.wait_for_confirmation(tx_hash, self.config.confirmation_timeout).await {
            ConfirmationOutcome::Confirmed(_) => SubmissionReport::confirmed(tx_hash),
            ConfirmationOutcome::Pending(_) => SubmissionReport::pending(tx_hash),
            ConfirmationOutcome::Reverted(_) => {
                SubmissionReport::failed(Some(tx_hash), RpcError::Reverted(tx_hash).to_string())
            }
        }
    }
}

/// 构建 TypedTransaction
///
/// 有 gasPrice 或没有 EIP-1559 字段时使用 legacy 格式
pub fn build_typed_tx(request: &TxRequest, from: Address, chain_id: u64) -> TypedTransaction {
    if request.has_eip1559_fees() && request.gas_price.is_none() {
        let mut tx = Eip1559TransactionRequest::new()
            .from(from)
            .to(request.to)
            .chain_id(chain_id);
        if let Some(value) = request.value {
            tx = tx.value(value);
        }
        if let Some(data) = request.data.clone() {
            tx = tx.data(data);
        }
        if let Some(gas) = request.gas_limit {
            tx = tx.gas(gas);
        }
        if let Some(max_fee) = request.max_fee_per_gas {
            tx = tx.max_fee_per_gas(max_fee);
        }
        if let Some(priority_fee) = request.max_priority_fee_per_gas {
            tx = tx.max_priority_fee_per_gas(priority_fee);
        }
        tx.into()
    } else {
        let mut tx = TransactionRequest::new()
            .from(from)
            .to(request.to)
            .chain_id(chain_id);
        if let Some(value) = request.value {
            tx = tx.value(value);
        }
        if let Some(data) = request.data.clone() {
            tx = tx.data(data);
        }
        if let Some(gas) = request.gas_limit {
            tx = tx.gas(gas);
        }
        if let Some(gas_price) = request.gas_price {
            tx = tx.gas_price(gas_price);
        }
        tx.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint_pool::EndpointPool;
    use crate::types::BackoffPolicy;
    use async_trait::async_trait;
    use ethers::types::{TransactionReceipt, U256, U64};
    use models::Endpoint;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    const GWEI: u64 = 1_000_000_000;

    #[derive(Default)]
    struct FakeChain {
        estimate: u64,
        gas_price: u64,
        /// 第几次查询时回执出现 (None 表示永不出现)
        receipt_after: Option<usize>,
        receipt_status: u64,
        estimate_calls: Mutex<usize>,
        price_calls: Mutex<usize>,
        receipt_calls: Mutex<usize>,
    }

    #[async_trait]
    impl ChainClient for FakeChain {
        async fn estimate_gas(&self, _: &Endpoint, _: &TypedTransaction) -> Result<U256, RpcError> {
            *self.estimate_calls.lock() += 1;
            Ok(U256::from(self.estimate))
        }

        async fn gas_price(&self, _: &Endpoint) -> Result<U256, RpcError> {
            *self.price_calls.lock() += 1;
            Ok(U256::from(self.gas_price))
        }

        async fn transaction_receipt(
            &self,
            _: &Endpoint,
            tx_hash: H256,
        ) -> Result<Option<TransactionReceipt>, RpcError> {
            let mut calls = self.receipt_calls.lock();
            *calls += 1;
            match self.receipt_after {
                Some(n) if *calls >= n => Ok(Some(TransactionReceipt {
                    transaction_hash: tx_hash,
                    status: Some(U64::from(self.receipt_status)),
                    ..Default::default()
                })),
                _ => Ok(None),
            }
        }

        async fn block_number(&self, _: &Endpoint) -> Result<u64, RpcError> {
            Ok(1)
        }
    }

    struct FakeSigner {
        connected: bool,
        /// 按节点 URL 预设的发送错误
        failures: Vec<(String, RpcError)>,
        sent: Mutex<Vec<(String, TypedTransaction)>>,
    }

    impl FakeSigner {
        fn connected() -> Self {
            Self {
                connected: true,
                failures: Vec::new(),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(mut self, url: &str, err: RpcError) -> Self {
            self.failures.push((url.to_string(), err));
            self
        }

        fn last_sent(&self) -> (String, TypedTransaction) {
            self.sent.lock().last().cloned().expect("nothing sent")
        }
    }

    #[async_trait]
    impl TxSigner for FakeSigner {
        fn address(&self) -> Address {
            Address::repeat_byte(0xaa)
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn send_transaction(&self, endpoint: &Endpoint, tx: TypedTransaction) -> Result<H256, RpcError> {
            self.sent.lock().push((endpoint.url.clone(), tx));
            if let Some((_, err)) = self.failures.iter().find(|(url, _)| *url == endpoint.url) {
                return Err(err.clone());
            }
            Ok(H256::repeat_byte(0x42))
        }
    }

    fn url(i: usize) -> String {
        format!("https://rpc{}.example", i)
    }

    fn submitter(chain: FakeChain, endpoints: usize) -> TransactionSubmitter<FakeChain> {
        let urls: Vec<String> = (0..endpoints).map(url).collect();
        let pool = Arc::new(EndpointPool::from_urls(&urls, 56, "BSC").unwrap());
        let executor = Arc::new(FailoverExecutor::new(pool, BackoffPolicy::default()));
        let config = SubmitterConfig {
            chain_id: 56,
            ..Default::default()
        };
        TransactionSubmitter::new(executor, Arc::new(chain), FeeResolver::new(3.0), config)
    }

    fn chain() -> FakeChain {
        FakeChain {
            estimate: 50_000,
            gas_price: GWEI,
            ..Default::default()
        }
    }

    fn request() -> TxRequest {
        TxRequest::new(Address::repeat_byte(0x22)).value(U256::from(1_000u64))
    }

    #[tokio::test]
    async fn test_not_connected_signer_is_rejected_before_any_call() {
        let submitter = submitter(chain(), 2);
        let signer = FakeSigner {
            connected: false,
            ..FakeSigner::connected()
        };

        let result = submitter.submit(request(), &signer).await;

        assert_eq!(result, Err(RpcError::NotConnected));
        assert_eq!(*submitter.client.estimate_calls.lock(), 0);
        assert!(signer.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_gas_fields_get_ten_percent_margin() {
        let submitter = submitter(chain(), 2);
        let signer = FakeSigner::connected();

        let hash = submitter.submit(request(), &signer).await.unwrap();
        assert_eq!(hash, H256::repeat_byte(0x42));

        let (_, tx) = signer.last_sent();
        assert!(matches!(tx, TypedTransaction::Legacy(_)));
        assert_eq!(tx.gas(), Some(&U256::from(55_000)));
        assert_eq!(tx.gas_price(), Some(U256::from(1_100_000_000u64)));
        assert_eq!(tx.value(), Some(&U256::from(1_000u64)));
        assert_eq!(tx.from(), Some(&Address::repeat_byte(0xaa)));
    }

    #[tokio::test]
    async fn test_caller_gas_fields_are_kept() {
        let submitter = submitter(chain(), 1);
        let signer = FakeSigner::connected();
        let req = request().gas_limit(U256::from(30_000)).gas_price(U256::from(7 * GWEI));

        submitter.submit(req, &signer).await.unwrap();

        let (_, tx) = signer.last_sent();
        assert_eq!(tx.gas(), Some(&U256::from(30_000)));
        assert_eq!(tx.gas_price(), Some(U256::from(7 * GWEI)));
        assert_eq!(*submitter.client.estimate_calls.lock(), 0);
        assert_eq!(*submitter.client.price_calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_eip1559_fields_skip_price_query() {
        let submitter = submitter(chain(), 1);
        let signer = FakeSigner::connected();
        let mut req = request();
        req.max_fee_per_gas = Some(U256::from(2 * GWEI));
        req.max_priority_fee_per_gas = Some(U256::from(GWEI));

        submitter.submit(req, &signer).await.unwrap();

        let (_, tx) = signer.last_sent();
        assert!(matches!(tx, TypedTransaction::Eip1559(_)));
        assert_eq!(*submitter.client.price_calls.lock(), 0);
        assert_eq!(*submitter.client.estimate_calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_legacy_envelope_strips_eip1559_and_skips_network() {
        let submitter = submitter(chain(), 1);
        let signer = FakeSigner::connected();
        let mut req = request();
        req.max_priority_fee_per_gas = Some(U256::from(GWEI));

        submitter
            .submit_legacy(req, OperationKind::ValueTransfer, &signer)
            .await
            .unwrap();

        let (_, tx) = signer.last_sent();
        assert!(matches!(tx, TypedTransaction::Legacy(_)));
        assert_eq!(tx.gas(), Some(&U256::from(21_000)));
        assert_eq!(tx.gas_price(), Some(U256::from(3 * GWEI)));
        assert_eq!(*submitter.client.estimate_calls.lock(), 0);
        assert_eq!(*submitter.client.price_calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_fails_over_to_next_endpoint() {
        let submitter = submitter(chain(), 3);
        let signer = FakeSigner::connected()
            .failing_on(&url(0), RpcError::TransientRpc("rate limit".into()));

        submitter.submit(request(), &signer).await.unwrap();

        let sent: Vec<String> = signer.sent.lock().iter().map(|(u, _)| u.clone()).collect();
        assert_eq!(sent, vec![url(0), url(1)]);
        assert_eq!(submitter.executor.pool().cursor(), 1);
    }

    #[tokio::test]
    async fn test_declined_signature_is_not_retried() {
        let submitter = submitter(chain(), 3);
        let signer = FakeSigner::connected()
            .failing_on(&url(0), RpcError::UserDeclined("user rejected".into()));

        let result = submitter.submit(request(), &signer).await;

        assert!(matches!(result, Err(RpcError::UserDeclined(_))));
        assert_eq!(signer.sent.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_confirmation_polls_until_receipt() {
        let submitter = submitter(
            FakeChain {
                receipt_after: Some(3),
                receipt_status: 1,
                ..chain()
            },
            1,
        );
        let hash = H256::repeat_byte(0x42);

        let outcome = submitter.wait_for_confirmation(hash, Duration::from_secs(30)).await;

        assert!(outcome.is_confirmed());
        assert_eq!(*submitter.client.receipt_calls.lock(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_confirmation_times_out_as_pending() {
        let submitter = submitter(chain(), 1);
        let hash = H256::repeat_byte(0x42);
        let started = Instant::now();

        let outcome = submitter.wait_for_confirmation(hash, Duration::from_secs(30)).await;

        assert_eq!(outcome, ConfirmationOutcome::Pending(hash));
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_distinguishes_pending_from_failure() {
        let submitter = submitter(chain(), 1);
        let signer = FakeSigner::connected();

        let report = submitter.submit_and_confirm(request(), None, &signer).await;
        assert!(report.pending);
        assert!(!report.success);
        assert!(report.error.is_none());
        assert_eq!(report.tx_hash, Some(H256::repeat_byte(0x42)));

        let declined = FakeSigner::connected()
            .failing_on(&url(0), RpcError::UserDeclined("user rejected".into()));
        let report = submitter.submit_and_confirm(request(), None, &declined).await;
        assert!(!report.success);
        assert!(!report.pending);
        assert!(report.error.unwrap().contains("user rejected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_for_reverted_transaction() {
        let submitter = submitter(
            FakeChain {
                receipt_after: Some(1),
                receipt_status: 0,
                ..chain()
            },
            1,
        );
        let signer = FakeSigner::connected();

        let report = submitter
            .submit_and_confirm(request(), Some(OperationKind::ContractCall), &signer)
            .await;

        assert!(!report.success);
        assert!(!report.pending);
        assert!(report.error.unwrap().contains("reverted"));
    }
}
