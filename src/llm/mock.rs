//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 按顺序消费预置脚本（文本或错误）；脚本耗尽后回显最后一条 User 消息。
//! 可选固定延迟，用于模拟慢速 Provider 触发超时。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{LlmClient, LlmError, TokenStream};
use crate::memory::{last_user_content, Message};

/// 流式输出时每段字符数
const CHUNK_CHARS: usize = 6;

/// Mock 客户端：脚本化回复 + 回显兜底
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    pub fn push_error(self, err: LlmError) -> Self {
        self.push(Err(err))
    }

    fn push(self, item: Result<String, LlmError>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 已收到的调用次数（complete 与 complete_stream 合计）
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的完整消息列表
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    async fn next_response(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(messages.to_vec());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match scripted {
            Some(item) => item,
            None => {
                let last_user = last_user_content(messages).unwrap_or("(no input)");
                let excerpt: String = last_user.chars().take(200).collect();
                Ok(format!("Mock answer: {excerpt}"))
            }
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.next_response(messages).await
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        let content = self.next_response(messages).await?;
        let chars: Vec<char> = content.chars().collect();
        let chunks: Vec<Result<String, LlmError>> = chars
            .chunks(CHUNK_CHARS)
            .map(|c| Ok(c.iter().collect()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_script_then_echo() {
        let mock = MockLlmClient::new().push_text("scripted");
        let msgs = [Message::user("hello")];
        assert_eq!(mock.complete(&msgs).await.unwrap(), "scripted");
        assert_eq!(mock.complete(&msgs).await.unwrap(), "Mock answer: hello");
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_stream_chunks_concatenate_to_response() {
        let mock = MockLlmClient::new().push_text("streamed response text");
        let mut stream = mock.complete_stream(&[Message::user("x")]).await.unwrap();
        let mut out = String::new();
        let mut pieces = 0;
        while let Some(chunk) = stream.next().await {
            out.push_str(&chunk.unwrap());
            pieces += 1;
        }
        assert_eq!(out, "streamed response text");
        assert!(pieces > 1);
    }
}
