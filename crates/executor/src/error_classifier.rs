//! RPC 错误分类器
//!
//! 远程协议没有结构化的错误码来区分限流、上游不可用、用户拒绝等情况，
//! 只能对错误码和消息文本做匹配。所有匹配规则集中在下面的映射表里。

use ethers::providers::{ProviderError, RpcError as _};
use regex::Regex;
use tracing::debug;

use crate::types::RpcError;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 用户在钱包中拒绝签名，不重试
    UserDeclined,
    /// 签名器未连接
    NotConnected,
    /// 限流 / 上游不可用，换节点重试
    Transient,
    /// 余额不足以支付 value + gas
    InsufficientFunds,
    /// 其他错误
    Other,
}

lazy_static::lazy_static! {
    // JSON-RPC / EIP-1193 错误码映射
    static ref CODE_TABLE: Vec<(i64, ErrorKind)> = vec![
        // EIP-1193 userRejectedRequest
        (4001, ErrorKind::UserDeclined),
        // EIP-1193 disconnected / chainDisconnected
        (4900, ErrorKind::NotConnected),
        (4901, ErrorKind::NotConnected),
        // 限流
        (429, ErrorKind::Transient),
        (-32005, ErrorKind::Transient),
        // 钱包对上游失败统一包装成 internal error
        (-32603, ErrorKind::Transient),
        // HTTP 网关错误
        (502, ErrorKind::Transient),
        (503, ErrorKind::Transient),
        (504, ErrorKind::Transient),
    ];

    // 消息文本映射 (小写匹配，按顺序取第一个命中)
    static ref PATTERN_TABLE: Vec<(&'static str, ErrorKind)> = vec![
        ("user rejected", ErrorKind::UserDeclined),
        ("user denied", ErrorKind::UserDeclined),
        ("rejected by user", ErrorKind::UserDeclined),
        ("action_rejected", ErrorKind::UserDeclined),
        ("signer not connected", ErrorKind::NotConnected),
        ("wallet not connected", ErrorKind::NotConnected),
        ("rate limit", ErrorKind::Transient),
        ("too many requests", ErrorKind::Transient),
        ("limit exceeded", ErrorKind::Transient),
        ("service unavailable", ErrorKind::Transient),
        ("bad gateway", ErrorKind::Transient),
        ("gateway timeout", ErrorKind::Transient),
        ("upstream", ErrorKind::Transient),
        ("temporarily unavailable", ErrorKind::Transient),
        ("internal json-rpc error", ErrorKind::Transient),
        ("connection refused", ErrorKind::Transient),
        ("connection reset", ErrorKind::Transient),
        ("timed out", ErrorKind::Transient),
        ("insufficient funds", ErrorKind::InsufficientFunds),
    ];

    // 从错误文本中提取 `code: -32005` / `"code":4001` / `status 503`
    static ref CODE_IN_TEXT: Regex =
        Regex::new(r#"(?:code|status)["']?[ \t]*[:= ][ \t]*(-?[0-9]+)"#).unwrap();
}

/// 对 (错误码, 消息) 分类
///
/// 用户拒绝优先级最高：被拒绝的操作即使同时带着限流信息也不能重试
pub fn classify(code: Option<i64>, message: &str) -> ErrorKind {
    let lower = message.to_lowercase();

    let by_code = code
        .or_else(|| extract_code(&lower))
        .and_then(|c| CODE_TABLE.iter().find(|(k, _)| *k == c).map(|(_, kind)| *kind));
    let by_pattern = PATTERN_TABLE
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, kind)| *kind);

    let kind = match (by_code, by_pattern) {
        (_, Some(ErrorKind::UserDeclined)) => ErrorKind::UserDeclined,
        (Some(kind), _) => kind,
        (None, Some(kind)) => kind,
        (None, None) => ErrorKind::Other,
    };

    debug!(?code, ?kind, "错误分类: {}", message);
    kind
}

fn extract_code(lower: &str) -> Option<i64> {
    CODE_IN_TEXT
        .captures(lower)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// 按类别构造错误
pub fn to_rpc_error(kind: ErrorKind, message: impl Into<String>) -> RpcError {
    let message = message.into();
    match kind {
        ErrorKind::UserDeclined => RpcError::UserDeclined(message),
        ErrorKind::NotConnected => RpcError::NotConnected,
        ErrorKind::Transient => RpcError::TransientRpc(message),
        ErrorKind::InsufficientFunds => RpcError::InsufficientFunds(message),
        ErrorKind::Other => RpcError::Other(message),
    }
}

/// 对 ethers Provider 错误分类
pub fn classify_provider_error(err: &ProviderError) -> RpcError {
    let message = err.to_string();
    let code = err.as_error_response().map(|resp| resp.code);
    to_rpc_error(classify(code, &message), message)
}

/// 对任意错误文本分类 (签名中间件等)
pub fn classify_message(message: impl Into<String>) -> RpcError {
    let message = message.into();
    to_rpc_error(classify(None, &message), message)
}
