//! 重试机制模块
//!
//! 控制 API 的只读查询在连接失败时按指数退避重试。

use crate::error::Result;
use crate::logger::Logger;
use std::time::Duration;
use tokio::time::sleep;

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（包含第一次）
    pub max_attempts: usize,
    /// 初始延迟时间
    pub initial_delay: Duration,
    /// 最大延迟时间
    pub max_delay: Duration,
    /// 退避倍数
    pub backoff_multiplier: f64,
    /// 抖动因子（0.0-1.0）
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(3),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// 创建新的重试策略
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// 设置初始延迟时间
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// 设置最大延迟时间
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// 计算延迟时间
    fn calculate_delay(&self, attempt: usize) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);

        let max_delay_ms = self.max_delay.as_millis() as f64;
        let delay_ms = base_delay.min(max_delay_ms);

        // 添加抖动
        let jitter = delay_ms * self.jitter_factor * (rand::random::<f64>() - 0.5);
        let final_delay_ms = (delay_ms + jitter).max(0.0) as u64;

        Duration::from_millis(final_delay_ms)
    }
}

/// 重试执行器
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// 创建新的重试执行器
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// 执行带重试的异步操作，只有 [`crate::ClashError::is_retryable`] 的错误会重试
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        Logger::info(&format!("操作在第 {} 次尝试后成功", attempt + 1));
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !error.is_retryable() || attempt + 1 >= self.policy.max_attempts {
                        return Err(error);
                    }

                    let delay = self.policy.calculate_delay(attempt);
                    Logger::warn(&format!(
                        "第 {} 次尝试失败: {}，{:?} 后重试",
                        attempt + 1,
                        error,
                        delay
                    ));
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
