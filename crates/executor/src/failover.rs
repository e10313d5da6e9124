//! 故障转移执行器
//!
//! 对节点池执行"轮数 × 节点"的双层重试：
//! - 内层从首选节点开始依次尝试每个节点，成功即返回并把游标移到该节点
//! - 用户拒绝 / 未连接立即终止，不再尝试其他节点
//! - 限流、上游不可用及其他错误都换下一个节点
//! - 一轮全部失败后退避 min(base * 2^attempt, max) 再开始下一轮
//!
//! 双层循环严格串行：并发发送同一笔交易到多个节点会造成重复提交。

use models::Endpoint;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use utils::{record_failover, record_rpc_failure, TARGET_FAILOVER};

use crate::endpoint_pool::EndpointPool;
use crate::types::{BackoffPolicy, RpcError};

pub struct FailoverExecutor {
    pool: Arc<EndpointPool>,
    backoff: BackoffPolicy,
}

impl FailoverExecutor {
    pub fn new(pool: Arc<EndpointPool>, backoff: BackoffPolicy) -> Self {
        Self { pool, backoff }
    }

    pub fn pool(&self) -> &Arc<EndpointPool> {
        &self.pool
    }

    /// 在节点池上执行 `operation`
    ///
    /// `max_attempts` 为 0 时按 1 轮处理。全部失败返回 `RpcError::Exhausted`，
    /// 带最后一次错误和操作描述。
    pub async fn run<T, F, Fut>(
        &self,
        mut operation: F,
        max_attempts: u32,
        description: &str,
    ) -> Result<T, RpcError>
    where
        F: FnMut(Endpoint) -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let endpoint_count = self.pool.len();
        let attempts = max_attempts.max(1);
        let mut last_error: Option<RpcError> = None;

        for attempt in 0..attempts {
            let start = self.pool.cursor();

            for offset in 0..endpoint_count {
                let index = (start + offset) % endpoint_count;
                let endpoint = self.pool.all()[index].clone();

                match operation(endpoint.clone()).await {
                    Ok(value) => {
                        if index != start {
                            record_failover();
                            info!(
                                target: TARGET_FAILOVER,
                                "{} 切换到节点 {} (轮次 {}/{})",
                                description, endpoint, attempt + 1, attempts
                            );
                        }
                        self.pool.advance(index);
                        return Ok(value);
                    }
                    Err(err) if err.is_fatal() => {
                        warn!(target: TARGET_FAILOVER, "{} 终止于节点 {}: {}", description, endpoint, err);
                        return Err(err);
                    }
                    Err(err) => {
                        record_rpc_failure();
                        if err.is_transient() {
                            debug!(target: TARGET_FAILOVER, "{} 节点 {} 限流/不可用: {}", description, endpoint, err);
                        } else {
                            warn!(target: TARGET_FAILOVER, "{} 节点 {} 失败: {}", description, endpoint, err);
                        }
                        last_error = Some(err);
                    }
                }
            }

            if attempt + 1 < attempts {
                let delay = self.backoff.delay_ms(attempt);
                warn!(
                    target: TARGET_FAILOVER,
                    "{} 第 {}/{} 轮全部节点失败，{}ms 后重试",
                    description, attempt + 1, attempts, delay
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        let last_error = last_error.map(|e| e.to_string()).unwrap_or_default();
        warn!(target: TARGET_FAILOVER, "{} 重试耗尽: {}", description, last_error);
        Err(RpcError::Exhausted {
            description: description.to_string(),
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Ok,
        RateLimited,
        Broken,
        Declined,
    }

    /// 按节点预设行为，并记录每次调用的节点索引和时间
    struct Script {
        pool: Arc<EndpointPool>,
        behaviours: Vec<Behaviour>,
        calls: Mutex<Vec<(usize, Duration)>>,
        started: Instant,
    }

    impl Script {
        fn new(behaviours: Vec<Behaviour>) -> Arc<Self> {
            let urls: Vec<String> = (0..behaviours.len())
                .map(|i| format!("https://rpc{}.example", i))
                .collect();
            Arc::new(Self {
                pool: Arc::new(EndpointPool::from_urls(&urls, 56, "BSC").unwrap()),
                behaviours,
                calls: Mutex::new(Vec::new()),
                started: Instant::now(),
            })
        }

        fn executor(&self) -> FailoverExecutor {
            FailoverExecutor::new(self.pool.clone(), BackoffPolicy::default())
        }

        async fn call(self: Arc<Self>, endpoint: Endpoint) -> Result<usize, RpcError> {
            let index = self.pool.all().iter().position(|e| *e == endpoint).unwrap();
            self.calls.lock().push((index, self.started.elapsed()));
            match self.behaviours[index] {
                Behaviour::Ok => Ok(index),
                Behaviour::RateLimited => Err(RpcError::TransientRpc("429 Too Many Requests".into())),
                Behaviour::Broken => Err(RpcError::Other(format!("endpoint {} broken", index))),
                Behaviour::Declined => Err(RpcError::UserDeclined("user rejected".into())),
            }
        }

        fn called_indices(&self) -> Vec<usize> {
            self.calls.lock().iter().map(|(i, _)| *i).collect()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_moves_to_only_healthy_endpoint() {
        use Behaviour::*;
        let script = Script::new(vec![Broken, RateLimited, Broken, Ok, Broken]);
        let executor = script.executor();

        let s = script.clone();
        let result = executor.run(move |ep| s.clone().call(ep), 3, "get_balance").await;

        assert_eq!(result, Result::Ok(3));
        assert_eq!(script.pool.cursor(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_declined_stops_immediately() {
        use Behaviour::*;
        let script = Script::new(vec![Declined, Ok, Ok]);
        let executor = script.executor();

        let s = script.clone();
        let result = executor.run(move |ep| s.clone().call(ep), 3, "send_transaction").await;

        assert!(matches!(result, Err(RpcError::UserDeclined(_))));
        assert_eq!(script.called_indices(), vec![0]);
        assert_eq!(script.started.elapsed(), Duration::ZERO);
        assert_eq!(script.pool.cursor(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_call_count_and_backoff() {
        use Behaviour::*;
        let script = Script::new(vec![RateLimited, Broken, RateLimited]);
        let executor = script.executor();

        let s = script.clone();
        let result = executor.run(move |ep| s.clone().call(ep), 4, "estimate_gas").await;

        match result {
            Err(RpcError::Exhausted { description, last_error }) => {
                assert_eq!(description, "estimate_gas");
                assert!(last_error.contains("429"));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let calls = script.calls.lock().clone();
        assert_eq!(calls.len(), 4 * 3);

        // 每轮开始时间 = 之前各轮退避之和: 0, 1000, 3000, 7000
        let round_starts: Vec<u128> = calls.chunks(3).map(|round| round[0].1.as_millis()).collect();
        assert_eq!(round_starts, vec![0, 1000, 3000, 7000]);
        // 同一轮内不等待
        for round in calls.chunks(3) {
            assert!(round.iter().all(|(_, at)| *at == round[0].1));
        }
        // 最后一轮之后不再退避
        assert_eq!(script.started.elapsed().as_millis(), 7000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_capped() {
        use Behaviour::*;
        let script = Script::new(vec![Broken]);
        let executor = script.executor();

        let s = script.clone();
        let _ = executor.run(move |ep| s.clone().call(ep), 6, "get_receipt").await;

        // 1000 + 2000 + 4000 + 5000 + 5000
        assert_eq!(script.calls.lock().len(), 6);
        assert_eq!(script.started.elapsed().as_millis(), 17000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_endpoints_fail_over_without_sleep() {
        use Behaviour::*;
        let script = Script::new(vec![RateLimited, RateLimited, Ok]);
        let executor = script.executor();

        let s = script.clone();
        let result = executor.run(move |ep| s.clone().call(ep), 3, "send_transaction").await;

        assert_eq!(result, Result::Ok(2));
        assert_eq!(script.called_indices(), vec![0, 1, 2]);
        assert_eq!(script.started.elapsed(), Duration::ZERO);
        assert_eq!(script.pool.cursor(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_run_starts_at_last_successful_endpoint() {
        use Behaviour::*;
        let script = Script::new(vec![RateLimited, Broken, Ok]);
        let executor = script.executor();

        let s = script.clone();
        executor.run(move |ep| s.clone().call(ep), 1, "first").await.unwrap();
        let s = script.clone();
        executor.run(move |ep| s.clone().call(ep), 1, "second").await.unwrap();

        assert_eq!(script.called_indices(), vec![0, 1, 2, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_runs_one_round() {
        use Behaviour::*;
        let script = Script::new(vec![Broken, Broken]);
        let executor = script.executor();

        let s = script.clone();
        let result = executor.run(move |ep| s.clone().call(ep), 0, "noop").await;

        assert!(matches!(result, Err(RpcError::Exhausted { .. })));
        assert_eq!(script.calls.lock().len(), 2);
    }
}
