mod logger;
mod rpc_stats;
mod stats_provider;

pub use logger::{LoggerManager, TARGET_FAILOVER, TARGET_SUBMITTER, TARGET_RPC_STATS};
pub use rpc_stats::{
    record_rpc_request, record_rpc_failure, record_failover,
    get_rpc_stats, log_rpc_stats, RpcStatsSnapshot, CounterSnapshot,
};
pub use stats_provider::{RpcStatsReporter, StatsHttp};
