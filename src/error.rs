//! 错误处理模块
//!
//! 定义了订阅管理与节点选择中使用的错误类型和结果类型。

use thiserror::Error;

use crate::logger::Logger;

/// 主要错误类型
#[derive(Error, Debug)]
pub enum ClashError {
    /// HTTP 请求错误
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 文件系统错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 配置错误（注册表缺失或格式错误）
    #[error("Configuration error: {0}")]
    Config(String),

    /// 订阅不存在
    #[error("订阅不存在: {0}")]
    NotFound(String),

    /// 订阅已存在
    #[error("订阅已存在: {0}")]
    AlreadyExists(String),

    /// 订阅已禁用
    #[error("订阅已禁用: {0}")]
    Disabled(String),

    /// 下载错误
    #[error("下载失败: {0}")]
    Download(String),

    /// 配置内容校验失败
    #[error("配置校验失败: {0}")]
    Validation(String),

    /// 代理操作错误
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// 控制 API 不可用
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// 无效参数错误
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

/// 结果类型
pub type Result<T> = std::result::Result<T, ClashError>;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 不可恢复：进程应当立即退出
    Fatal,
    /// 单项失败：跳过当前条目，批处理继续
    Recoverable,
    /// 提示性：已完成的持久化工作不回滚
    Advisory,
}

impl ClashError {
    /// 创建配置错误
    pub fn config<S: Into<String>>(msg: S) -> Self {
        let error = ClashError::Config(msg.into());
        error.trace();
        error
    }

    /// 创建订阅不存在错误
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        let error = ClashError::NotFound(name.into());
        error.trace();
        error
    }

    /// 创建订阅已存在错误
    pub fn already_exists<S: Into<String>>(name: S) -> Self {
        let error = ClashError::AlreadyExists(name.into());
        error.trace();
        error
    }

    /// 创建订阅已禁用错误
    pub fn disabled<S: Into<String>>(name: S) -> Self {
        let error = ClashError::Disabled(name.into());
        error.trace();
        error
    }

    /// 创建下载错误
    pub fn download<S: Into<String>>(msg: S) -> Self {
        let error = ClashError::Download(msg.into());
        error.trace();
        error
    }

    /// 创建校验错误
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        let error = ClashError::Validation(msg.into());
        error.trace();
        error
    }

    /// 创建代理错误
    pub fn proxy<S: Into<String>>(msg: S) -> Self {
        let error = ClashError::Proxy(msg.into());
        error.trace();
        error
    }

    /// 创建服务不可用错误
    pub fn service_unavailable<S: Into<String>>(msg: S) -> Self {
        let error = ClashError::ServiceUnavailable(msg.into());
        error.trace();
        error
    }

    /// 创建无效参数错误
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        let error = ClashError::InvalidParameter(msg.into());
        error.trace();
        error
    }

    /// 创建内部错误
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        let error = ClashError::Internal(msg.into());
        error.trace();
        error
    }
}

impl ClashError {
    /// 获取错误分类
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClashError::Config(_) | ClashError::ServiceUnavailable(_) => ErrorCategory::Fatal,
            ClashError::NotFound(_) | ClashError::AlreadyExists(_) | ClashError::Disabled(_) => {
                ErrorCategory::Advisory
            }
            _ => ErrorCategory::Recoverable,
        }
    }

    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            ClashError::Http(_) => "HTTP_ERROR",
            ClashError::Json(_) => "JSON_ERROR",
            ClashError::Yaml(_) => "YAML_ERROR",
            ClashError::Io(_) => "IO_ERROR",
            ClashError::Config(_) => "CONFIG_ERROR",
            ClashError::NotFound(_) => "NOT_FOUND",
            ClashError::AlreadyExists(_) => "ALREADY_EXISTS",
            ClashError::Disabled(_) => "DISABLED",
            ClashError::Download(_) => "DOWNLOAD_ERROR",
            ClashError::Validation(_) => "VALIDATION_ERROR",
            ClashError::Proxy(_) => "PROXY_ERROR",
            ClashError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ClashError::InvalidParameter(_) => "INVALID_PARAMETER",
            ClashError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            ClashError::Http(e) => e.is_connect() || e.is_timeout(),
            ClashError::ServiceUnavailable(_) => true,
            _ => false,
        }
    }

    /// 获取建议的解决方案
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ClashError::Config(_) => Some("请检查配置文件是否存在以及 JSON 格式是否正确"),
            ClashError::ServiceUnavailable(_) => {
                Some("请确保 Clash 正在运行且外部控制 API 已启用")
            }
            ClashError::Disabled(_) => Some("可使用 toggle 命令重新启用该订阅"),
            ClashError::NotFound(_) => Some("可使用 list 命令查看已配置的订阅"),
            ClashError::Download(_) | ClashError::Http(_) => {
                Some("请检查订阅链接是否有效以及网络连接是否正常")
            }
            ClashError::Validation(_) => Some("订阅返回的内容不是有效的 Clash 配置，原配置未被修改"),
            ClashError::InvalidParameter(_) => Some("请检查输入参数的格式和有效性"),
            _ => None,
        }
    }

    /// 记录调试日志，面向用户的输出由调用方通过 Reporter 完成
    fn trace(&self) {
        Logger::debug(&format!("[{}] {}", self.code(), self));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_err = ClashError::config("test config error");
        assert!(matches!(config_err, ClashError::Config(_)));

        let missing = ClashError::not_found("s1");
        assert!(matches!(missing, ClashError::NotFound(_)));
    }

    #[test]
    fn test_error_display() {
        let err = ClashError::config("test error");
        let error_string = format!("{}", err);
        assert!(error_string.contains("Configuration error"));
        assert!(error_string.contains("test error"));
    }

    #[test]
    fn test_error_category() {
        assert_eq!(ClashError::config("x").category(), ErrorCategory::Fatal);
        assert_eq!(
            ClashError::service_unavailable("x").category(),
            ErrorCategory::Fatal
        );
        assert_eq!(ClashError::download("x").category(), ErrorCategory::Recoverable);
        assert_eq!(ClashError::disabled("x").category(), ErrorCategory::Advisory);
    }

    #[test]
    fn test_error_code() {
        assert_eq!(ClashError::validation("missing proxies").code(), "VALIDATION_ERROR");
        let io = ClashError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(io.code(), "IO_ERROR");
        assert_eq!(io.category(), ErrorCategory::Recoverable);
    }

    #[test]
    fn test_suggestion() {
        assert!(ClashError::service_unavailable("x").suggestion().is_some());
        assert!(ClashError::internal("x").suggestion().is_none());
    }
}
