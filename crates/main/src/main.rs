mod bootstrap;

use anyhow::Result;
use clap::Parser;
use config_crate::AppConfig;
use tracing::info;
use utils::LoggerManager;

use crate::bootstrap::{setup_panic_hook, Application, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = AppConfig::load()?;

    // 初始化日志系统
    let _logger = LoggerManager::init(&config.log.dir, &config.log.level);

    setup_panic_hook();

    info!("========================================");
    info!("  RPC 故障转移执行层启动 ({})", config.chain.name);
    info!("========================================");

    let mut app = Application::start(config)?;

    tokio::select! {
        result = app.run(cli.command) => result?,
        _ = tokio::signal::ctrl_c() => info!("收到 Ctrl-C，停止"),
    }

    app.shutdown();
    Ok(())
}
