//! Clash 代理节点选择工具
//!
//! 通过外部控制 API 查看代理组、测试节点延迟并切换节点。

use clap::{Parser, Subcommand};
use clash_manager::{
    init_cli_logger,
    proxy::{format_delay, DEFAULT_TEST_URL, DEFAULT_TIMEOUT_MS},
    ApiSettings, ClashError, ConsoleReporter, ControlApiClient, GroupSummary, LatencyBucket,
    LatencyProbe, ProxyState, Reporter,
};
use std::io::{self, Write};
use std::process::ExitCode;

/// Clash 代理节点选择工具
#[derive(Parser)]
#[command(name = "clash-select")]
#[command(about = "Clash 代理节点选择工具")]
#[command(version)]
struct Cli {
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
    /// 列出所有代理策略组
    Groups,
    /// 列出所有节点
    Nodes,
    /// 显示当前选择
    Current,
    /// 测试所有节点延迟
    Test {
        /// 测试URL
        #[arg(short, long, default_value = DEFAULT_TEST_URL)]
        url: String,
        /// 超时时间（毫秒）
        #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_MS)]
        timeout: u32,
    },
    /// 切换节点
    Switch {
        /// 代理组名
        group: String,
        /// 节点名
        node: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_cli_logger(cli.verbose);

    let reporter = ConsoleReporter::from_env();

    let result = tokio::select! {
        result = run(cli, &reporter) => result,
        _ = tokio::signal::ctrl_c() => {
            println!();
            reporter.warn("操作已取消");
            return ExitCode::from(130);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            reporter.error(&e.to_string());
            if let Some(suggestion) = e.suggestion() {
                reporter.info(&format!("提示: {}", suggestion));
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, reporter: &ConsoleReporter) -> Result<(), ClashError> {
    let settings = ApiSettings::discover().with_overrides(cli.api, cli.secret);
    let client = ControlApiClient::from_settings(&settings)?;
    let state = ProxyState::new(client.clone());

    match cli.command {
        Commands::Groups => list_groups(&state, reporter).await,
        Commands::Nodes => list_nodes(&state, reporter).await,
        Commands::Current => show_current(&state, reporter).await,
        Commands::Test { url, timeout } => {
            let probe = LatencyProbe::new(client)
                .with_test_url(url)
                .with_timeout(timeout);
            test_all(&state, &probe, reporter).await
        }
        Commands::Switch { group, node } => match state.switch(&group, &node).await {
            Ok(()) => {
                reporter.success(&format!("已切换 {} 到 {}", group, node));
                Ok(())
            }
            Err(e) => Err(ClashError::proxy(format!("切换失败: {}", e))),
        },
    }
}

async fn list_groups(state: &ProxyState, reporter: &ConsoleReporter) -> Result<(), ClashError> {
    let groups = state.list_groups().await?;
    reporter.title("Clash 代理策略组");

    if groups.is_empty() {
        reporter.warn("没有找到策略组");
        return Ok(());
    }

    for summary in groups.iter().map(GroupSummary::render) {
        for line in summary {
            reporter.info(&line);
        }
        reporter.line();
    }
    Ok(())
}

async fn list_nodes(state: &ProxyState, reporter: &ConsoleReporter) -> Result<(), ClashError> {
    let snapshot = state.snapshot().await?;
    reporter.title("所有可用节点");

    if snapshot.nodes().is_empty() {
        reporter.warn("没有找到节点");
        return Ok(());
    }

    for (i, node) in snapshot.nodes().iter().enumerate() {
        reporter.info(&format!(
            "{:3}. {} [{}] - 延迟: {}",
            i + 1,
            node.name,
            node.node_type,
            paint_delay(reporter, node.last_delay)
        ));
    }
    Ok(())
}

async fn show_current(state: &ProxyState, reporter: &ConsoleReporter) -> Result<(), ClashError> {
    let snapshot = state.snapshot().await?;
    reporter.title("当前代理选择");

    for group in snapshot.groups() {
        // 当前选择是另一个代理组时不显示延迟
        let delay = match snapshot.current_node(group) {
            Some(node) => format!("({})", paint_delay(reporter, node.last_delay)),
            None => String::new(),
        };
        reporter.info(&format!(
            "📦 {:30} [{:10}] -> {} {}",
            group.name,
            group.group_type,
            reporter.green(&group.now),
            delay
        ));
    }
    Ok(())
}

async fn test_all(
    state: &ProxyState,
    probe: &LatencyProbe,
    reporter: &ConsoleReporter,
) -> Result<(), ClashError> {
    let names = state.snapshot().await?.node_names();
    reporter.title("测试节点延迟");

    let ranking = probe
        .test_all(&names, |i, total, name| {
            print!("\r[{}/{}] 测试 {}...", i, total, name);
            let _ = io::stdout().flush();
        })
        .await;
    println!();
    reporter.success("测试完成！");
    reporter.line();

    for (i, result) in ranking.visible().iter().enumerate() {
        reporter.info(&format!(
            "{:3}. {:40} {}",
            i + 1,
            result.name,
            paint_delay(reporter, Some(result.delay))
        ));
    }
    if ranking.hidden() > 0 {
        reporter.line();
        reporter.info(&format!("... 还有 {} 个节点", ranking.hidden()));
    }
    Ok(())
}

/// 按延迟分级着色
fn paint_delay(reporter: &ConsoleReporter, delay: Option<u32>) -> String {
    let text = format_delay(delay);
    match delay.map(LatencyBucket::of) {
        None => text,
        Some(LatencyBucket::Good) => reporter.green(&text),
        Some(LatencyBucket::Fair) => reporter.yellow(&text),
        Some(LatencyBucket::Poor) | Some(LatencyBucket::TimedOut) => reporter.red(&text),
    }
}
