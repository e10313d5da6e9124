use ethers::providers::{Http, JsonRpcClient, ProviderError};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tokio::task::JoinHandle;
use url::Url;

use crate::rpc_stats::{log_rpc_stats, record_rpc_request};

/// 带统计功能的 HTTP 传输层
#[derive(Debug, Clone)]
pub struct StatsHttp {
    inner: Http,
}

impl StatsHttp {
    pub fn new(url: &str) -> Result<Self, ProviderError> {
        let parsed_url: Url = url.parse().map_err(|e| {
            ProviderError::CustomError(format!("Invalid URL: {}", e))
        })?;
        let inner = Http::new(parsed_url);
        Ok(Self { inner })
    }
}

#[async_trait::async_trait]
impl JsonRpcClient for StatsHttp {
    type Error = <Http as JsonRpcClient>::Error;

    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, Self::Error>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        record_rpc_request();
        JsonRpcClient::request(&self.inner, method, params).await
    }
}

/// 定时输出 RPC 统计日志
pub struct RpcStatsReporter {
    log_task: Option<JoinHandle<()>>,
}

impl RpcStatsReporter {
    /// `log_interval_secs` 为 0 时不启动定时任务
    pub fn start(log_interval_secs: u64) -> Self {
        let log_task = if log_interval_secs > 0 {
            Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval(
                    tokio::time::Duration::from_secs(log_interval_secs)
                );
                loop {
                    interval.tick().await;
                    log_rpc_stats();
                }
            }))
        } else {
            None
        };

        Self { log_task }
    }

    /// 停止统计日志任务并输出最终统计
    pub fn stop(&mut self) {
        log_rpc_stats();

        if let Some(handle) = self.log_task.take() {
            handle.abort();
        }
    }
}

impl Drop for RpcStatsReporter {
    fn drop(&mut self) {
        if let Some(handle) = self.log_task.take() {
            handle.abort();
        }
    }
}
