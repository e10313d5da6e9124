//! RPC 节点池
//!
//! 持有有序的节点列表和"首选节点"游标。游标只是性能上的偏好
//! (优先使用上次成功的节点)，所有节点可互换，所以并发竞争不影响正确性。

use models::Endpoint;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use crate::types::RpcError;

#[derive(Debug)]
pub struct EndpointPool {
    endpoints: Vec<Endpoint>,
    preferred: AtomicUsize,
}

impl EndpointPool {
    /// 节点列表为空时直接失败，不做其他校验 (可达性在调用时才知道)
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, RpcError> {
        if endpoints.is_empty() {
            return Err(RpcError::Config("endpoint pool is empty".to_string()));
        }

        info!(
            "节点池初始化: {} 个节点 [{}]",
            endpoints.len(),
            endpoints.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ")
        );

        Ok(Self {
            endpoints,
            preferred: AtomicUsize::new(0),
        })
    }

    /// 从 URL 列表构建同一条链的节点池
    pub fn from_urls(urls: &[String], chain_id: u64, chain_name: &str) -> Result<Self, RpcError> {
        let endpoints = urls
            .iter()
            .enumerate()
            .map(|(i, url)| Endpoint::new(url.clone(), chain_id, format!("{}#{}", chain_name, i)))
            .collect();
        Self::new(endpoints)
    }

    pub fn current(&self) -> &Endpoint {
        &self.endpoints[self.cursor()]
    }

    pub fn all(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.preferred.load(Ordering::Acquire)
    }

    /// 设置首选节点，越界索引取模
    pub fn advance(&self, index: usize) {
        self.preferred.store(index % self.endpoints.len(), Ordering::Release);
    }
}
