use std::fs;
use time::format_description::well_known::Rfc3339;
use time::macros::offset;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::FilterFn;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// 专用日志 target
pub const TARGET_FAILOVER: &str = "rpc_failover";
pub const TARGET_SUBMITTER: &str = "tx_submitter";
pub const TARGET_RPC_STATS: &str = "rpc_stats";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 日志管理器 - 基于target分类的日志系统
pub struct LoggerManager {
    _guards: Vec<non_blocking::WorkerGuard>,
}

impl LoggerManager {
    /// 初始化日志系统
    ///
    /// 日志分类：
    /// - app.log: 通用应用日志
    /// - failover.log: 节点重试/切换日志
    /// - tx.log: 交易提交与确认日志
    /// - rpc_stats.log: RPC 请求统计
    pub fn init(log_dir: &str, level: &str) -> Self {
        let mut guards = Vec::new();

        fs::create_dir_all(log_dir).ok();

        // 东八区时间
        let timer = OffsetTime::new(offset!(+8), Rfc3339);

        // 控制台输出，级别由 RUST_LOG 控制
        let console_layer = fmt::layer()
            .compact()
            .with_target(true)
            .with_timer(timer.clone())
            .with_filter(EnvFilter::new(level))
            .boxed();

        let layers: Vec<BoxedLayer> = vec![
            console_layer,
            file_layer(log_dir, "app.log", &timer, &mut guards, |target| {
                !matches!(target, TARGET_RPC_STATS | TARGET_FAILOVER | TARGET_SUBMITTER)
            }),
            file_layer(log_dir, "failover.log", &timer, &mut guards, |target| {
                target == TARGET_FAILOVER
            }),
            file_layer(log_dir, "tx.log", &timer, &mut guards, |target| {
                target == TARGET_SUBMITTER
            }),
            file_layer(log_dir, "rpc_stats.log", &timer, &mut guards, |target| {
                target == TARGET_RPC_STATS
            }),
        ];

        tracing_subscriber::registry().with(layers).init();

        Self { _guards: guards }
    }
}

fn file_layer(
    dir: &str,
    file: &str,
    timer: &OffsetTime<Rfc3339>,
    guards: &mut Vec<non_blocking::WorkerGuard>,
    accept: fn(&str) -> bool,
) -> BoxedLayer {
    let (writer, guard) = non_blocking(rolling::daily(dir, file));
    guards.push(guard);

    fmt::layer()
        .compact()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_timer(timer.clone())
        .with_filter(FilterFn::new(move |metadata| accept(metadata.target())))
        .boxed()
}
