//! Clash 订阅管理工具
//!
//! 下载并更新订阅配置，管理订阅列表。

use clap::{Parser, Subcommand};
use clash_manager::{
    init_cli_logger,
    utils::{
        format_utils::{format_bytes, truncate_chars},
        time_utils::format_system_time,
    },
    ApiSettings, BackupManager, ClashError, ConfigStore, ConsoleReporter, ControlApiClient,
    ErrorCategory, ProfileSynchronizer, Reporter, RestartPlan, SubscriptionFetcher, SyncOutcome,
    UpdateReport,
};
use std::fs;
use std::process::ExitCode;

/// Clash 订阅管理工具
#[derive(Parser)]
#[command(name = "clash-sub")]
#[command(about = "Clash 订阅管理工具")]
#[command(version)]
struct Cli {
    /// 订阅注册表文件
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// 控制 API 地址，默认读取 .clash-api-config
    #[arg(long)]
    api: Option<String>,

    /// 控制 API 密钥
    #[arg(long)]
    secret: Option<String>,

    /// 启用详细日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// 可用的命令
#[derive(Subcommand)]
enum Commands {
    /// 列出所有订阅
    List,
    /// 更新指定订阅
    Update {
        /// 订阅名称
        name: String,
    },
    /// 更新所有已启用的订阅
    UpdateAll,
    /// 添加订阅
    Add {
        /// 订阅名称
        name: String,
        /// 订阅链接
        url: String,
        /// 描述
        #[arg(default_value = "")]
        description: String,
    },
    /// 删除订阅
    Remove {
        /// 订阅名称
        name: String,
    },
    /// 启用/禁用订阅
    Toggle {
        /// 订阅名称
        name: String,
    },
    /// 重启 Clash 服务
    Restart,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_cli_logger(cli.verbose);

    let reporter = ConsoleReporter::from_env();

    let result = tokio::select! {
        result = run(cli, &reporter) => result,
        _ = tokio::signal::ctrl_c() => {
            reporter.warn("操作已取消");
            return ExitCode::from(130);
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => report_error(&reporter, &e),
    }
}

async fn run(cli: Cli, reporter: &ConsoleReporter) -> Result<ExitCode, ClashError> {
    let mut store = ConfigStore::load(&cli.config)?;

    match cli.command {
        Commands::List => list_subscriptions(&store, reporter),
        Commands::Update { name } => {
            let fetcher = build_fetcher(&store, reporter, cli.api, cli.secret)?;
            let report = fetcher.update(&name).await?;
            if should_restart(&store, std::slice::from_ref(&report)) {
                RestartPlan::default().run(reporter);
            }
        }
        Commands::UpdateAll => {
            reporter.title("更新所有订阅");
            let fetcher = build_fetcher(&store, reporter, cli.api, cli.secret)?;
            let batch = fetcher.update_all().await;
            if batch.succeeded > 0 && store.auto_restart() {
                RestartPlan::default().run(reporter);
            }
            if batch.total > 0 && batch.succeeded == 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Add {
            name,
            url,
            description,
        } => {
            store.add(&name, &url, &description)?;
            reporter.success(&format!("已添加订阅: {}", name));
        }
        Commands::Remove { name } => {
            store.remove(&name)?;
            reporter.success(&format!("已删除订阅: {}", name));
        }
        Commands::Toggle { name } => {
            let enabled = store.toggle(&name)?;
            let status = if enabled { "启用" } else { "禁用" };
            reporter.success(&format!("订阅 {} 已{}", name, status));
        }
        Commands::Restart => {
            RestartPlan::default().run(reporter);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// 配置了 GUI 目录时附带同步器
fn build_fetcher<'a>(
    store: &'a ConfigStore,
    reporter: &'a ConsoleReporter,
    api: Option<String>,
    secret: Option<String>,
) -> Result<SubscriptionFetcher<'a>, ClashError> {
    let fetcher = SubscriptionFetcher::new(store, reporter)?;

    match store.profile_dir() {
        Some(profile_dir) => {
            let settings = ApiSettings::discover().with_overrides(api, secret);
            let client = ControlApiClient::from_settings(&settings)?;
            Ok(fetcher.with_synchronizer(ProfileSynchronizer::new(profile_dir, client)))
        }
        None => Ok(fetcher),
    }
}

/// 同步时已经成功重载的订阅不需要再重启
fn should_restart(store: &ConfigStore, reports: &[UpdateReport]) -> bool {
    store.auto_restart()
        && reports.iter().any(|report| {
            !matches!(
                &report.sync,
                Some(SyncOutcome::Activated { reload, .. }) if reload.is_success()
            )
        })
}

fn list_subscriptions(store: &ConfigStore, reporter: &ConsoleReporter) {
    reporter.title("订阅列表");

    if store.is_empty() {
        reporter.warn("还没有添加任何订阅");
        return;
    }

    let backups = BackupManager::new(store.work_dir(), store.backup_settings());

    for record in store.subscriptions() {
        let status = if record.enabled {
            reporter.green("✓ 启用")
        } else {
            reporter.red("✗ 禁用")
        };
        reporter.info(&format!("📋 {} [{}]", record.name, status));
        if !record.description.is_empty() {
            reporter.info(&format!("   描述: {}", record.description));
        }
        reporter.info(&format!("   链接: {}", truncate_chars(&record.url, 60)));

        let local = store.local_config_path(&record.name);
        match fs::metadata(&local) {
            Ok(metadata) => {
                let modified = metadata
                    .modified()
                    .map(format_system_time)
                    .unwrap_or_else(|_| "未知".to_string());
                reporter.info(&format!(
                    "   本地配置: {} ({}，更新于 {})",
                    local.display(),
                    format_bytes(metadata.len()),
                    modified
                ));
            }
            Err(_) => reporter.info("   本地配置: 尚未下载"),
        }

        match backups.list(&record.name) {
            Ok(entries) if !entries.is_empty() => {
                reporter.info(&format!("   备份: {} 个", entries.len()));
            }
            Ok(_) => {}
            Err(e) => log::debug!("Failed to list backups for {}: {}", record.name, e),
        }
        reporter.line();
    }

    reporter.info(&format!("工作目录: {}", store.work_dir().display()));
    if let Some(profile_dir) = store.profile_dir() {
        reporter.info(&format!("GUI 配置目录: {}", profile_dir.display()));
    }
}

fn report_error(reporter: &ConsoleReporter, error: &ClashError) -> ExitCode {
    let code = match error.category() {
        ErrorCategory::Advisory => {
            reporter.warn(&error.to_string());
            ExitCode::SUCCESS
        }
        _ => {
            reporter.error(&error.to_string());
            ExitCode::FAILURE
        }
    };
    if let Some(suggestion) = error.suggestion() {
        reporter.info(&format!("提示: {}", suggestion));
    }
    code
}
