//! 应用启动引导模块
//!
//! 组装节点池、执行器和提交器，并执行命令行子命令

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config_crate::AppConfig;
use ethers::types::{Address, Bytes, H256, U256};
use executor::{
    BackoffPolicy, ChainClient, ConfirmationOutcome, EndpointPool, FailoverExecutor, FeeResolver,
    HttpChainClient, LocalSigner, SubmitterConfig, TransactionSubmitter,
};
use models::{OperationKind, TxRequest};
use std::sync::Arc;
use tracing::{error, info, warn};
use utils::{get_rpc_stats, RpcStatsReporter};

#[derive(Debug, Parser)]
#[command(name = "rpc_failover", about = "多节点 JSON-RPC 交易提交工具")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 逐个探测节点，并通过故障转移读取区块高度
    Status,
    /// 签名并发送一笔交易，等待确认
    Send {
        #[arg(long)]
        to: Address,
        /// 转账金额 (wei)
        #[arg(long, default_value = "0")]
        value_wei: String,
        /// 调用数据 (0x 开头的 hex)
        #[arg(long)]
        data: Option<Bytes>,
        /// 使用固定的 legacy 费用，不做网络估算
        #[arg(long, value_enum)]
        kind: Option<FeeKind>,
    },
    /// 等待已发送交易的确认
    Wait {
        #[arg(long)]
        tx: H256,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FeeKind {
    Approval,
    ValueTransfer,
    TokenTransfer,
    ContractCall,
}

impl From<FeeKind> for OperationKind {
    fn from(kind: FeeKind) -> Self {
        match kind {
            FeeKind::Approval => OperationKind::Approval,
            FeeKind::ValueTransfer => OperationKind::ValueTransfer,
            FeeKind::TokenTransfer => OperationKind::TokenTransfer,
            FeeKind::ContractCall => OperationKind::ContractCall,
        }
    }
}

/// 应用程序实例
pub struct Application {
    config: AppConfig,
    pool: Arc<EndpointPool>,
    client: Arc<HttpChainClient>,
    executor: Arc<FailoverExecutor>,
    submitter: TransactionSubmitter<HttpChainClient>,
    stats_reporter: RpcStatsReporter,
}

impl Application {
    /// 组装所有组件 (节点池在此创建，生命周期由应用持有)
    pub fn start(config: AppConfig) -> Result<Self> {
        let pool = Arc::new(EndpointPool::from_urls(
            &config.chain.rpc_urls,
            config.chain.chain_id,
            &config.chain.name,
        )?);
        let client = Arc::new(HttpChainClient::new(&pool)?);

        let backoff = BackoffPolicy {
            base_ms: config.retry.backoff_base_ms,
            max_ms: config.retry.backoff_max_ms,
        };
        let executor = Arc::new(FailoverExecutor::new(pool.clone(), backoff));

        let submitter = TransactionSubmitter::new(
            executor.clone(),
            client.clone(),
            FeeResolver::new(config.gas.legacy_gas_price_gwei),
            SubmitterConfig::from(&config),
        );

        let stats_reporter = RpcStatsReporter::start(60);

        Self::log_config(&config);

        Ok(Self {
            config,
            pool,
            client,
            executor,
            submitter,
            stats_reporter,
        })
    }

    fn log_config(config: &AppConfig) {
        info!("链: {} (chain_id={})", config.chain.name, config.chain.chain_id);
        info!("节点数: {}", config.chain.rpc_urls.len());
        info!(
            "重试: {} 轮, 退避 {}ms ~ {}ms",
            config.retry.max_attempts, config.retry.backoff_base_ms, config.retry.backoff_max_ms
        );
        info!(
            "Gas 余量: limit +{}%, price +{}%, legacy {} Gwei",
            config.gas.gas_limit_margin_percent,
            config.gas.gas_price_margin_percent,
            config.gas.legacy_gas_price_gwei
        );
        if config.wallet.private_key.is_none() {
            warn!("未配置 PRIVATE_KEY，只能执行只读命令");
        }
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Status => self.status().await,
            Command::Send {
                to,
                value_wei,
                data,
                kind,
            } => {
                let value = U256::from_dec_str(&value_wei).context("Invalid --value-wei")?;
                let mut request = TxRequest::new(to).value(value);
                if let Some(data) = data {
                    request = request.data(data);
                }
                self.send(request, kind.map(Into::into)).await
            }
            Command::Wait { tx } => {
                match self
                    .submitter
                    .wait_for_confirmation(tx, self.submitter.config().confirmation_timeout)
                    .await
                {
                    ConfirmationOutcome::Confirmed(receipt) => {
                        info!("✅ 已确认: {:?} | Block: {:?}", tx, receipt.block_number)
                    }
                    ConfirmationOutcome::Reverted(_) => error!("❌ 交易 Revert: {:?}", tx),
                    ConfirmationOutcome::Pending(_) => warn!("⏳ 仍未确认: {:?}", tx),
                }
                Ok(())
            }
        }
    }

    async fn status(&self) -> Result<()> {
        for endpoint in self.pool.all() {
            match self.client.block_number(endpoint).await {
                Ok(block) => info!("  {} -> block {}", endpoint, block),
                Err(e) => warn!("  {} -> {}", endpoint, e),
            }
        }

        let client = &self.client;
        let block = self
            .executor
            .run(
                move |endpoint| async move { client.block_number(&endpoint).await },
                self.config.retry.max_attempts,
                "block_number",
            )
            .await?;
        info!("当前区块: {} (首选节点: {})", block, self.pool.current());
        Ok(())
    }

    async fn send(&self, request: TxRequest, kind: Option<OperationKind>) -> Result<()> {
        let private_key = self
            .config
            .wallet
            .private_key
            .as_deref()
            .ok_or_else(|| anyhow!("PRIVATE_KEY not set"))?;
        let signer = LocalSigner::new(private_key, self.config.chain.chain_id, &self.client)?;

        let report = self.submitter.submit_and_confirm(request, kind, &signer).await;
        if report.success {
            info!("✅ 交易成功: {:?}", report.tx_hash);
        } else if report.pending {
            warn!("⏳ 交易已发送但未确认，请勿重复提交: {:?}", report.tx_hash);
        } else {
            error!(
                "❌ 交易失败: {} ({:?})",
                report.error.unwrap_or_default(),
                report.tx_hash
            );
        }
        Ok(())
    }

    /// 输出最终统计并停止后台任务
    pub fn shutdown(&mut self) {
        info!("RPC 统计: {}", get_rpc_stats());
        self.stats_reporter.stop();
    }
}

/// 设置 panic hook
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("========================================");
        error!("!!! 系统发生 PANIC !!!");
        error!("========================================");
        error!("Panic 信息: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            error!(
                "发生位置: {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }
        error!("========================================");
    }));
}
