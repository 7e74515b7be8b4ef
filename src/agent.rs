//! Headless Agent 运行时
//!
//! 供 CLI / HTTP 等前端调用：process_message 跑完整流水线并返回回复与 Trace 摘要，
//! process_message_stream 在后台运行并通过通道推送 Chunk / Error / Done 事件。

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{
    AgentError, Orchestrator, RunStatus, SharedContext, StreamEvent, TraceSummary,
};

/// 单条消息的处理结果
#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub answer: String,
    pub status: RunStatus,
    pub flow_id: String,
    pub trace: Vec<TraceSummary>,
    /// RRLA 置信度（Synthesis 未运行或未规划时为空）
    pub confidence: Option<f64>,
}

impl AgentReply {
    pub fn from_context(ctx: &SharedContext) -> Result<Self, AgentError> {
        let answer = ctx
            .answer()
            .ok_or_else(|| AgentError::NotFound("no answer produced".to_string()))?;
        let confidence = ctx
            .get_result("synthesis")
            .ok()
            .and_then(|v| v.get("confidence"))
            .and_then(|v| v.as_f64());
        Ok(Self {
            answer,
            status: ctx.status(),
            flow_id: ctx.flow_id().to_string(),
            trace: ctx.get_trace().iter().map(TraceSummary::from).collect(),
            confidence,
        })
    }
}

/// 处理单条用户消息（无流式）
pub async fn process_message(
    orchestrator: &Orchestrator,
    user_input: &str,
) -> Result<AgentReply, AgentError> {
    let ctx = orchestrator.run(user_input).await;
    AgentReply::from_context(&ctx)
}

/// 流式处理单条用户消息；丢弃接收端即取消本次运行
pub fn process_message_stream(
    orchestrator: &Arc<Orchestrator>,
    user_input: impl Into<String>,
    cancel: CancellationToken,
) -> (mpsc::Receiver<StreamEvent>, JoinHandle<SharedContext>) {
    orchestrator.run_streaming(user_input, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::core::AgentBuilder;
    use crate::llm::MockLlmClient;

    fn orchestrator(llm: MockLlmClient) -> Orchestrator {
        AgentBuilder::new(AppConfig::default())
            .with_llm(Arc::new(llm))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_process_message_returns_reply_with_trace() {
        let orch = orchestrator(MockLlmClient::new().push_text("2 + 2 = 4"));
        let reply = process_message(&orch, "2 + 2").await.unwrap();
        assert_eq!(reply.status, RunStatus::Success);
        assert_eq!(reply.trace.len(), 7);
        assert!(reply.answer.contains('4'));
        assert!(reply.confidence.is_some());
        assert!(!reply.flow_id.is_empty());
    }

    #[tokio::test]
    async fn test_stream_ends_with_done() {
        let orch = Arc::new(orchestrator(MockLlmClient::new()));
        let (mut rx, handle) = process_message_stream(&orch, "hello there", CancellationToken::new());
        let mut last = None;
        while let Some(event) = rx.recv().await {
            last = Some(event);
        }
        handle.await.unwrap();
        assert!(matches!(last, Some(StreamEvent::Done { .. })));
    }
}
