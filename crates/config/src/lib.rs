use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub chain: ChainConfig,
    pub retry: RetryConfig,
    pub gas: GasConfig,
    pub submit: SubmitConfig,
    pub wallet: WalletConfig,
    pub log: LogConfig,
}

/// 链配置
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    /// 按优先级排列的 RPC 节点
    pub rpc_urls: Vec<String>,
}

/// 重试与退避配置
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// 每个操作的最大轮数 (每轮遍历全部节点)
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_max_ms: 5000,
        }
    }
}

/// Gas 配置
#[derive(Debug, Clone, Deserialize)]
pub struct GasConfig {
    /// gas 估算的安全余量 (%)
    pub gas_limit_margin_percent: u64,
    /// gas price 的安全余量 (%)
    pub gas_price_margin_percent: u64,
    /// legacy 费用下限 (Gwei) - 支持小数，如 0.1
    pub legacy_gas_price_gwei: f64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            gas_limit_margin_percent: 10,
            gas_price_margin_percent: 10,
            legacy_gas_price_gwei: 3.0,
        }
    }
}

/// 交易提交配置
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitConfig {
    /// 交易确认超时 (秒)
    pub confirmation_timeout_secs: u64,
    /// 回执轮询间隔 (毫秒)
    pub receipt_poll_interval_ms: u64,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: 30,
            receipt_poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub dir: String,
}

/// 解析逗号分隔的 URL 列表，忽略空项
pub fn parse_rpc_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // 加载 .env 文件
        dotenv::dotenv().ok();

        let rpc_urls = parse_rpc_urls(&env::var("RPC_URLS").context("RPC_URLS not set")?);
        if rpc_urls.is_empty() {
            bail!("RPC_URLS is empty");
        }

        let chain = ChainConfig {
            chain_id: env::var("CHAIN_ID")
                .context("CHAIN_ID not set")?
                .trim()
                .parse()
                .context("Invalid CHAIN_ID")?,
            name: env::var("CHAIN_NAME").unwrap_or_else(|_| "EVM".to_string()),
            rpc_urls,
        };

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_attempts: env_or("RPC_MAX_ATTEMPTS", retry_defaults.max_attempts),
            backoff_base_ms: env_or("RPC_BACKOFF_BASE_MS", retry_defaults.backoff_base_ms),
            backoff_max_ms: env_or("RPC_BACKOFF_MAX_MS", retry_defaults.backoff_max_ms),
        };

        let gas_defaults = GasConfig::default();
        let gas = GasConfig {
            gas_limit_margin_percent: env_or(
                "GAS_LIMIT_MARGIN_PERCENT",
                gas_defaults.gas_limit_margin_percent,
            ),
            gas_price_margin_percent: env_or(
                "GAS_PRICE_MARGIN_PERCENT",
                gas_defaults.gas_price_margin_percent,
            ),
            legacy_gas_price_gwei: env_or("LEGACY_GAS_PRICE_GWEI", gas_defaults.legacy_gas_price_gwei),
        };

        let submit_defaults = SubmitConfig::default();
        let submit = SubmitConfig {
            confirmation_timeout_secs: env_or(
                "CONFIRMATION_TIMEOUT_SECS",
                submit_defaults.confirmation_timeout_secs,
            ),
            receipt_poll_interval_ms: env_or(
                "RECEIPT_POLL_INTERVAL_MS",
                submit_defaults.receipt_poll_interval_ms,
            ),
        };

        let wallet = WalletConfig {
            private_key: env::var("PRIVATE_KEY").ok().filter(|s| !s.is_empty()),
        };

        // 日志配置
        let log = LogConfig {
            level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
        };

        Ok(Self {
            chain,
            retry,
            gas,
            submit,
            wallet,
            log,
        })
    }
}
