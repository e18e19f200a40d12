//! # Clash Manager
//!
//! 管理本地 Clash / mihomo 的订阅配置，并通过外部控制 API 查看和切换代理节点。
//! 提供订阅下载与原子替换、配置备份、GUI 客户端同步以及节点延迟测试功能。

pub mod backup;
pub mod client;
pub mod config;
pub mod error;
pub mod logger;
pub mod profile;
pub mod proxy;
pub mod report;
pub mod retry;
pub mod service;
pub mod subscription;
pub mod types;
pub mod utils;

// 重新导出主要的公共接口
pub use backup::{BackupEntry, BackupManager};
pub use client::{ControlApiClient, ReloadOutcome};
pub use config::{ApiSettings, BackupSettings, ConfigStore, SubscriptionRecord};
pub use error::{ClashError, ErrorCategory, Result};
pub use profile::{ProfileSynchronizer, SyncOutcome};
pub use proxy::{
    GroupSummary, LatencyBucket, LatencyProbe, LatencyRanking, LatencyResult, ProxySnapshot,
    ProxyState,
};
pub use report::{ConsoleReporter, Level, MemoryReporter, Reporter};
pub use retry::{RetryExecutor, RetryPolicy};
pub use service::{RestartAction, RestartOutcome, RestartPlan};
pub use subscription::{BatchReport, SubscriptionFetcher, UpdateReport};
pub use types::{DelayHistory, ProxyGroup, ProxyItem, ProxyNode};

/// 版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 初始化日志系统
///
/// # Examples
///
/// ```
/// use clash_manager::logger::LoggerConfig;
///
/// // 使用默认配置
/// clash_manager::init_logger(None);
///
/// // 使用自定义配置
/// let config = LoggerConfig {
///     level: log::LevelFilter::Debug,
///     show_module: true,
///     ..Default::default()
/// };
/// clash_manager::init_logger(Some(config));
/// ```
pub fn init_logger(config: Option<logger::LoggerConfig>) {
    logger::init_logger(config);
}

/// 根据 `-v` 参数初始化日志
pub fn init_cli_logger(verbose: bool) {
    if verbose {
        logger::init_logger(Some(logger::LoggerConfig::verbose()));
    } else {
        logger::init_logger(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::const_is_empty)]
    fn test_version() {
        assert!(!VERSION.is_empty(), "Version should not be empty");
    }
}
