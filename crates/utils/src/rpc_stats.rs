//! RPC 请求统计模块
//!
//! 统计 RPC 请求、失败次数和节点切换次数

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// 时间窗口统计器
struct TimeWindowCounter {
    /// 时间戳队列
    timestamps: RwLock<VecDeque<Instant>>,
    /// 总计数
    total: AtomicU64,
}

impl TimeWindowCounter {
    fn new() -> Self {
        Self {
            timestamps: RwLock::new(VecDeque::with_capacity(1024)),
            total: AtomicU64::new(0),
        }
    }

    /// 记录一次事件
    fn record(&self) {
        let now = Instant::now();
        self.total.fetch_add(1, Ordering::Relaxed);

        let mut timestamps = self.timestamps.write();
        timestamps.push_back(now);

        // 只保留最近1小时
        if let Some(one_hour_ago) = now.checked_sub(Duration::from_secs(3600)) {
            while timestamps.front().is_some_and(|front| *front < one_hour_ago) {
                timestamps.pop_front();
            }
        }
    }

    /// 返回 (最近1分钟, 总数)
    fn get_counts(&self) -> (u64, u64) {
        let now = Instant::now();
        let timestamps = self.timestamps.read();

        let last_1m = match now.checked_sub(Duration::from_secs(60)) {
            Some(cutoff) => timestamps.iter().rev().take_while(|ts| **ts >= cutoff).count() as u64,
            None => timestamps.len() as u64,
        };

        (last_1m, self.total.load(Ordering::Relaxed))
    }
}

/// RPC 统计器
pub struct RpcStats {
    start_time: Instant,
    requests: TimeWindowCounter,
    failures: TimeWindowCounter,
    failovers: TimeWindowCounter,
}

impl RpcStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            requests: TimeWindowCounter::new(),
            failures: TimeWindowCounter::new(),
            failovers: TimeWindowCounter::new(),
        }
    }

    pub fn record_request(&self) {
        self.requests.record();
    }

    pub fn record_failure(&self) {
        self.failures.record();
    }

    /// 成功节点与之前的首选节点不同
    pub fn record_failover(&self) {
        self.failovers.record();
    }

    /// 获取统计快照
    pub fn get_stats(&self) -> RpcStatsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();

        let snapshot = |counter: &TimeWindowCounter| {
            let (last_1m, total) = counter.get_counts();
            CounterSnapshot {
                last_1m,
                total,
                avg_per_sec: if uptime > 0 { total as f64 / uptime as f64 } else { 0.0 },
            }
        };

        RpcStatsSnapshot {
            uptime_seconds: uptime,
            requests: snapshot(&self.requests),
            failures: snapshot(&self.failures),
            failovers: snapshot(&self.failovers),
        }
    }

    /// 输出统计日志
    pub fn log_stats(&self) {
        let s = self.get_stats();

        info!(
            target: "rpc_stats",
            uptime_secs = s.uptime_seconds,
            rpc_1m = s.requests.last_1m,
            rpc_total = s.requests.total,
            rpc_avg = format!("{:.2}", s.requests.avg_per_sec),
            failures_total = s.failures.total,
            failovers_total = s.failovers.total,
            "RPC统计"
        );
    }
}

impl Default for RpcStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 单项计数器快照
#[derive(Debug, Clone)]
pub struct CounterSnapshot {
    pub last_1m: u64,
    pub total: u64,
    pub avg_per_sec: f64,
}

/// RPC 统计快照
#[derive(Debug, Clone)]
pub struct RpcStatsSnapshot {
    pub uptime_seconds: u64,
    pub requests: CounterSnapshot,
    pub failures: CounterSnapshot,
    pub failovers: CounterSnapshot,
}

impl std::fmt::Display for RpcStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "运行{}s | RPC: {}次(avg {:.2}/s) | 失败: {}次 | 节点切换: {}次",
            self.uptime_seconds,
            self.requests.total,
            self.requests.avg_per_sec,
            self.failures.total,
            self.failovers.total,
        )
    }
}

/// 全局 RPC 统计实例
pub static RPC_STATS: Lazy<RpcStats> = Lazy::new(RpcStats::new);

pub fn record_rpc_request() {
    RPC_STATS.record_request();
}

pub fn record_rpc_failure() {
    RPC_STATS.record_failure();
}

pub fn record_failover() {
    RPC_STATS.record_failover();
}

pub fn get_rpc_stats() -> RpcStatsSnapshot {
    RPC_STATS.get_stats()
}

pub fn log_rpc_stats() {
    RPC_STATS.log_stats();
}
