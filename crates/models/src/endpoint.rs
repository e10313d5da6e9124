use serde::{Deserialize, Serialize};

/// RPC 节点
///
/// 节点池构建完成后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// 节点 URL
    pub url: String,
    /// 链 ID
    pub chain_id: u64,
    /// 展示名称 (日志用)
    pub name: String,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, chain_id: u64, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            chain_id,
            name: name.into(),
        }
    }

    /// 去掉 query/path 中可能带的 API key，只保留 host 用于日志
    pub fn display_host(&self) -> &str {
        let without_scheme = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        without_scheme.split('/').next().unwrap_or(without_scheme)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.display_host())
    }
}
