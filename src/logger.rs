//! 日志记录模块
//!
//! 基于 `log` + `env_logger` 的诊断日志。面向用户的输出请使用 [`crate::report`]。

use log::{debug, error, info, warn};
use std::sync::Once;

static INIT: Once = Once::new();

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// 日志级别
    pub level: log::LevelFilter,
    /// 是否显示时间戳
    pub show_timestamp: bool,
    /// 是否显示模块路径
    pub show_module: bool,
    /// 是否显示行号
    pub show_line: bool,
    /// 日志格式
    pub format: LogFormat,
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 简洁格式
    Compact,
    /// 详细格式
    Full,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: log::LevelFilter::Warn,
            show_timestamp: true,
            show_module: false,
            show_line: false,
            format: LogFormat::Compact,
        }
    }
}

impl LoggerConfig {
    /// 命令行 `--verbose` 对应的配置
    pub fn verbose() -> Self {
        Self {
            level: log::LevelFilter::Debug,
            show_module: true,
            show_line: true,
            format: LogFormat::Full,
            ..Default::default()
        }
    }
}

/// 初始化日志系统
///
/// 重复调用是安全的，只有第一次调用生效。`RUST_LOG` 仍然可以覆盖级别。
///
/// # Examples
///
/// ```
/// use clash_manager::logger::{init_logger, LoggerConfig};
///
/// init_logger(Some(LoggerConfig::verbose()));
/// ```
pub fn init_logger(config: Option<LoggerConfig>) {
    INIT.call_once(|| {
        let config = config.unwrap_or_default();

        let mut builder = env_logger::Builder::new();
        builder.filter_level(config.level);
        builder.parse_default_env();

        match config.format {
            LogFormat::Compact => {
                builder.format(move |buf, record| {
                    use std::io::Write;

                    let level_style = match record.level() {
                        log::Level::Error => "\x1b[31m",
                        log::Level::Warn => "\x1b[33m",
                        log::Level::Info => "\x1b[32m",
                        log::Level::Debug => "\x1b[36m",
                        log::Level::Trace => "\x1b[37m",
                    };
                    let reset = "\x1b[0m";

                    if config.show_timestamp {
                        writeln!(
                            buf,
                            "[{}] {}{:5}{} {}",
                            chrono::Local::now().format("%H:%M:%S"),
                            level_style,
                            record.level(),
                            reset,
                            record.args()
                        )
                    } else {
                        writeln!(
                            buf,
                            "{}{:5}{} {}",
                            level_style,
                            record.level(),
                            reset,
                            record.args()
                        )
                    }
                });
            }
            LogFormat::Full => {
                builder.format(move |buf, record| {
                    use std::io::Write;

                    let mut parts = Vec::new();

                    if config.show_timestamp {
                        parts.push(format!(
                            "[{}]",
                            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
                        ));
                    }

                    parts.push(format!("[{}]", record.level()));

                    if config.show_module {
                        if let Some(module) = record.module_path() {
                            parts.push(format!("[{}]", module));
                        }
                    }

                    if config.show_line {
                        if let (Some(file), Some(line)) = (record.file(), record.line()) {
                            parts.push(format!("[{}:{}]", file, line));
                        }
                    }

                    parts.push(record.args().to_string());

                    writeln!(buf, "{}", parts.join(" "))
                });
            }
        }

        // 测试中可能已有其它 logger，忽略重复注册
        let _ = builder.try_init();
    });
}

/// 日志宏包装器
pub struct Logger;

impl Logger {
    /// 记录调试信息
    pub fn debug(message: &str) {
        debug!("{}", message);
    }

    /// 记录一般信息
    pub fn info(message: &str) {
        info!("{}", message);
    }

    /// 记录警告信息
    pub fn warn(message: &str) {
        warn!("{}", message);
    }

    /// 记录错误信息
    pub fn error(message: &str) {
        error!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_config_default() {
        let config = LoggerConfig::default();
        assert_eq!(config.level, log::LevelFilter::Warn);
        assert!(config.show_timestamp);
        assert!(!config.show_module);
        assert_eq!(config.format, LogFormat::Compact);
    }

    #[test]
    fn test_verbose_config() {
        let config = LoggerConfig::verbose();
        assert_eq!(config.level, log::LevelFilter::Debug);
        assert!(config.show_module);
        assert!(config.show_line);
    }

    #[test]
    fn test_logger_init_twice() {
        init_logger(None);
        init_logger(Some(LoggerConfig::verbose()));

        Logger::debug("Debug message");
        Logger::info("Info message");
        Logger::warn("Warning message");
        Logger::error("Error message");
    }
}
