//! 客户端模块
//!
//! 与 Clash / mihomo 外部控制 API 通信的客户端。

use crate::config::ApiSettings;
use crate::error::{ClashError, Result};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::types::{DelayResponse, ProxiesResponse, ProxyItem};
use indexmap::IndexMap;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use url::Url;

/// 控制 API 请求的默认超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// 热重载的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// `POST /configs/reload` 成功
    Reloaded,
    /// 主接口不存在，通过 `PATCH /configs` 触发了重载
    ReloadedViaPatch,
    /// 重载失败，需要用户手动刷新
    Failed(String),
}

impl ReloadOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ReloadOutcome::Failed(_))
    }
}

/// 控制 API 客户端
#[derive(Debug, Clone)]
pub struct ControlApiClient {
    /// HTTP 客户端
    client: Client,
    /// 基础 URL
    base_url: Url,
    /// API 密钥
    secret: Option<String>,
    /// 只读查询的重试执行器
    retry_executor: RetryExecutor,
}

impl ControlApiClient {
    /// 创建新的客户端实例
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use clash_manager::client::ControlApiClient;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = ControlApiClient::new("http://127.0.0.1:9090", Some("your-secret".to_string()))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(base_url: &str, secret: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClashError::invalid_parameter(format!("Invalid base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClashError::invalid_parameter(format!(
                "Invalid base URL: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ClashError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            secret: secret.filter(|s| !s.is_empty()),
            retry_executor: RetryExecutor::new(RetryPolicy::default()),
        })
    }

    /// 使用 `.clash-api-config` 中的设置创建客户端
    pub fn from_settings(settings: &ApiSettings) -> Result<Self> {
        Self::new(&settings.url, settings.secret.clone())
    }

    /// 替换重试策略
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_executor = RetryExecutor::new(policy);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// 构建完整的 API URL，每个片段按路径段编码
    fn build_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClashError::invalid_parameter("Invalid base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// 创建带认证头的请求
    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.secret {
            Some(secret) => request.bearer_auth(secret),
            None => request,
        }
    }

    /// 非 2xx 状态转换为错误
    async fn ensure_success(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(ClashError::proxy(format!("API请求失败: {} - {}", status, text)))
        }
    }

    /// 获取完整的代理表（按 API 返回顺序）
    ///
    /// 无法连接时返回 [`ClashError::ServiceUnavailable`]。
    pub async fn query_proxies(&self) -> Result<IndexMap<String, ProxyItem>> {
        let url = self.build_url(&["proxies"])?;
        let url = &url;

        let response: ProxiesResponse = self
            .retry_executor
            .execute(move || async move {
                let response = self.request(Method::GET, url.clone()).send().await?;
                let response = Self::ensure_success(response).await?;
                Ok(response.json::<ProxiesResponse>().await?)
            })
            .await
            .map_err(|e| match e {
                ClashError::Http(ref err) if err.is_connect() || err.is_timeout() => {
                    ClashError::service_unavailable(format!("无法连接到 Clash API: {}", err))
                }
                other => other,
            })?;

        log::debug!("Received {} proxies", response.proxies.len());
        Ok(response.proxies)
    }

    /// 切换代理组选择的节点
    pub async fn set_node(&self, group: &str, node: &str) -> Result<()> {
        let url = self.build_url(&["proxies", group])?;
        log::debug!("Switching group '{}' to '{}' at {}", group, node, url);

        let response = self
            .request(Method::PUT, url)
            .json(&serde_json::json!({ "name": node }))
            .send()
            .await?;
        Self::ensure_success(response).await?;

        log::info!("Switched proxy group '{}' to '{}'", group, node);
        Ok(())
    }

    /// 通过内核测试单个节点延迟
    ///
    /// 请求超时为 `timeout_ms + 1000` 毫秒。
    pub async fn delay(&self, node: &str, timeout_ms: u32, test_url: &str) -> Result<u32> {
        let url = self.build_url(&["proxies", node, "delay"])?;

        let response = self
            .request(Method::GET, url)
            .query(&[
                ("timeout", timeout_ms.to_string()),
                ("url", test_url.to_string()),
            ])
            .timeout(Duration::from_millis(u64::from(timeout_ms) + 1000))
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let body: DelayResponse = response.json().await?;

        body.delay.ok_or_else(|| {
            ClashError::proxy(format!(
                "节点 {} 没有返回延迟: {}",
                node,
                body.message.unwrap_or_default()
            ))
        })
    }

    /// 请求内核重新加载配置
    ///
    /// 先尝试 `POST /configs/reload`，返回 404 时退回到 `PATCH /configs`。
    /// 失败只作为提示返回，配置文件已经写入磁盘。
    pub async fn reload(&self) -> ReloadOutcome {
        match self.try_reload().await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Reload request failed: {}", e);
                ReloadOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_reload(&self) -> Result<ReloadOutcome> {
        let url = self.build_url(&["configs", "reload"])?;
        let response = self.request(Method::POST, url).send().await?;

        if response.status().is_success() {
            return Ok(ReloadOutcome::Reloaded);
        }
        if response.status() != StatusCode::NOT_FOUND {
            let status = response.status();
            return Ok(ReloadOutcome::Failed(format!("HTTP {}", status)));
        }

        log::debug!("/configs/reload not available, falling back to PATCH /configs");
        let url = self.build_url(&["configs"])?;
        let response = self
            .request(Method::PATCH, url)
            .json(&serde_json::json!({ "mode": "rule" }))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(ReloadOutcome::ReloadedViaPatch)
        } else {
            Ok(ReloadOutcome::Failed(format!("HTTP {}", response.status())))
        }
    }
}
