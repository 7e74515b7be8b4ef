//! 流式输出：单生产者 / 单消费者的事件通道 + 取消令牌
//!
//! Synthesis 把模型的文本片段作为 Chunk 推给调用方，流水线结束时推送 Done。
//! 接收端被丢弃（客户端断开）时，下一次发送失败即取消令牌，流水线随之停止消费模型输出。

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{Outcome, RunStatus, TraceEntry};

/// Done 事件中的精简 Trace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceSummary {
    pub node: String,
    pub outcome: Outcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
}

impl From<&TraceEntry> for TraceSummary {
    fn from(e: &TraceEntry) -> Self {
        Self {
            node: e.node.clone(),
            outcome: e.outcome,
            duration_ms: e.duration_ms,
            error_class: e.error_class.clone(),
        }
    }
}

/// 流式事件（可序列化为 JSON 供 SSE 等传输）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// 回复文本片段
    Chunk { text: String },
    /// 某节点失败（流水线可能仍继续）
    Error {
        node: String,
        class: String,
        message: String,
    },
    /// 结束：耗时、状态、最终回复与 Trace 摘要
    Done {
        duration_ms: u64,
        status: RunStatus,
        answer: Option<String>,
        trace: Vec<TraceSummary>,
    },
}

/// 发送端：随 SharedContext 传递
#[derive(Debug, Clone)]
pub struct StreamSink {
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl StreamSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    pub fn channel(capacity: usize, cancel: CancellationToken) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx, cancel), rx)
    }

    /// 发送事件；接收端已关闭时取消令牌并返回 false
    pub async fn send(&self, event: StreamEvent) -> bool {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("stream receiver dropped, cancelling");
            self.cancel.cancel();
            return false;
        }
        true
    }

    pub async fn chunk(&self, text: impl Into<String>) -> bool {
        self.send(StreamEvent::Chunk { text: text.into() }).await
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 接收端关闭时完成
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dropped_receiver_cancels_token() {
        let (sink, rx) = StreamSink::channel(4, CancellationToken::new());
        assert!(sink.chunk("a").await);
        drop(rx);
        assert!(!sink.chunk("b").await);
        assert!(sink.is_cancelled());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let ev = StreamEvent::Chunk { text: "hi".into() };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "chunk");
        assert_eq!(v["text"], "hi");
    }
}
