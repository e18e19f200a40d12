//! 服务重启模块
//!
//! 订阅更新后按顺序尝试多种方式让 Clash 重新读取配置，第一个成功的方式生效。

use crate::report::Reporter;
use std::process::{Command, Stdio};
use sysinfo::{System, SystemExt};

/// Clash Verge Rev 的 launchd 服务
pub const CLASH_VERGE_SERVICE: &str = "system/io.github.clash-verge-rev.clash-verge-rev.service";

/// 一种重启方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartAction {
    pub program: String,
    pub args: Vec<String>,
    /// 只有存在该名称的进程时才执行
    pub requires_process: Option<String>,
}

impl RestartAction {
    pub fn new<S: Into<String>>(program: S, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            requires_process: None,
        }
    }

    /// 向指定名称的进程发送 SIGHUP
    pub fn hangup(process: &str) -> Self {
        Self {
            requires_process: Some(process.to_string()),
            ..Self::new("pkill", &["-HUP", process])
        }
    }

    /// 完整命令行，用于显示
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 运行命令，退出码为 0 视为成功
    fn run(&self) -> bool {
        match Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
        {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                log::debug!(
                    "'{}' exited with {}: {}",
                    self.command_line(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                false
            }
            Err(e) => {
                log::debug!("Failed to run '{}': {}", self.command_line(), e);
                false
            }
        }
    }
}

/// 重启结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    /// 该方式执行成功
    Restarted(RestartAction),
    /// 所有方式都失败或被跳过
    Exhausted,
}

/// 有序的重启方式列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPlan {
    actions: Vec<RestartAction>,
}

impl Default for RestartPlan {
    fn default() -> Self {
        Self::new(vec![
            RestartAction::new("sudo", &["launchctl", "kickstart", "-k", CLASH_VERGE_SERVICE]),
            RestartAction::hangup("mihomo"),
            RestartAction::hangup("clash"),
        ])
    }
}

impl RestartPlan {
    pub fn new(actions: Vec<RestartAction>) -> Self {
        Self { actions }
    }

    pub fn actions(&self) -> &[RestartAction] {
        &self.actions
    }

    /// 依次尝试，返回第一个成功的方式
    pub fn execute(&self) -> RestartOutcome {
        let mut system = System::new();
        system.refresh_processes();

        for action in &self.actions {
            if let Some(process) = &action.requires_process {
                if system.processes_by_name(process).next().is_none() {
                    log::debug!("No '{}' process, skipping '{}'", process, action.command_line());
                    continue;
                }
            }

            log::debug!("Trying '{}'", action.command_line());
            if action.run() {
                log::info!("Restarted via '{}'", action.command_line());
                return RestartOutcome::Restarted(action.clone());
            }
        }

        RestartOutcome::Exhausted
    }

    /// 执行并向用户报告结果
    pub fn run(&self, reporter: &dyn Reporter) -> RestartOutcome {
        reporter.info("正在重启 Clash 服务...");
        let outcome = self.execute();
        match &outcome {
            RestartOutcome::Restarted(_) => reporter.success("Clash 服务已重启"),
            RestartOutcome::Exhausted => reporter.warn("无法自动重启，请手动重启 Clash 应用"),
        }
        outcome
    }
}
