//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：complete（非流式）、complete_stream（流式 Token）。
//! RetryingLlmClient 在调用边界统一施加超时，并对限流 / 5xx 做有界指数退避重试。

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use thiserror::Error;

use crate::config::LlmSection;
use crate::memory::Message;

/// 有限、不可重启的 Token 流
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Provider 边界错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("LLM request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Rate limited (retry after {retry_after_ms}ms)")]
    RateLimited { retry_after_ms: u64 },

    /// 5xx / 过载等服务端瞬时错误
    #[error("Provider server error: {0}")]
    Server(String),

    #[error("Provider API error: {0}")]
    Api(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// 是否值得在调用边界自动重试（超时不重试，以保证总时延有界）
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. } | LlmError::Server(_))
    }
}

/// LLM 客户端 trait：非流式完成与流式完成（返回 Token 流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 流式完成，返回 Token 流
    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 超时与重试参数
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub request_timeout: Duration,
    /// 流式输出中两个 chunk 之间的最长等待
    pub stream_idle_timeout: Duration,
}

impl RetryConfig {
    pub fn from_config(cfg: &LlmSection) -> Self {
        Self {
            max_attempts: cfg.retry.max_attempts.max(1),
            base_delay: Duration::from_millis(cfg.retry.base_delay_ms),
            max_delay: Duration::from_millis(cfg.retry.max_delay_ms),
            request_timeout: Duration::from_secs(cfg.timeouts.request),
            stream_idle_timeout: Duration::from_secs(cfg.timeouts.stream),
        }
    }

    /// 第 attempt 次（从 1 开始）失败后的等待：base * 2^(attempt-1)，上限 max_delay；
    /// 限流时取服务端建议值与退避值中的较大者
    pub fn backoff(&self, attempt: u32, err: &LlmError) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let delay = match err {
            LlmError::RateLimited { retry_after_ms } => {
                exp.max(Duration::from_millis(*retry_after_ms))
            }
            _ => exp,
        };
        delay.min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from_config(&LlmSection::default())
    }
}

/// 装饰器：对内部客户端的每次调用加超时，瞬时错误按 RetryConfig 退避重试
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    fn timeout_err(d: Duration) -> LlmError {
        LlmError::Timeout {
            secs: d.as_secs().max(1),
        }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::time::timeout(self.config.request_timeout, self.inner.complete(messages))
                .await
                .unwrap_or_else(|_| Err(Self::timeout_err(self.config.request_timeout)));
            match result {
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    let delay = self.config.backoff(attempt, &e);
                    tracing::warn!(attempt, ?delay, error = %e, "transient LLM error, retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        let mut attempt = 0;
        let inner = loop {
            attempt += 1;
            let result = tokio::time::timeout(
                self.config.request_timeout,
                self.inner.complete_stream(messages),
            )
            .await
            .unwrap_or_else(|_| Err(Self::timeout_err(self.config.request_timeout)));
            match result {
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    let delay = self.config.backoff(attempt, &e);
                    tracing::warn!(attempt, ?delay, error = %e, "transient LLM stream error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
                Ok(stream) => break stream,
            }
        };

        // 已开始输出后不再重试；每个 chunk 之间施加空闲超时，超时后流以 Timeout 结束
        let idle = self.config.stream_idle_timeout;
        let guarded = futures_util::stream::unfold(Some(inner), move |state| async move {
            let mut inner = state?;
            match tokio::time::timeout(idle, inner.next()).await {
                Ok(Some(item)) => Some((item, Some(inner))),
                Ok(None) => None,
                Err(_) => Some((Err(Self::timeout_err(idle)), None)),
            }
        });
        Ok(Box::pin(guarded))
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}
