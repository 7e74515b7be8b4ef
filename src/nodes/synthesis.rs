//! Synthesis：汇总推理、工具结果与记忆，生成回复
//!
//! 非流式：带工具的生成循环，模型每请求一次工具算一轮，超过 max_tool_iterations 即 ToolLoopExceeded。
//! 流式：逐段转发模型输出到 StreamSink，令牌取消后立即停止读取。
//! 任何失败都由 fallback 给出基于 RecoveryEngine 的兜底草稿。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{AgentError, Flow, Node, RecoveryEngine, SharedContext, StreamSink};
use crate::llm::{build_messages, generate_messages, stream, LlmClient};
use crate::memory::{Interaction, Message};
use crate::nodes::memory::MEMORY_SNAPSHOT_KEY;
use crate::nodes::reasoning::{self, ReasoningMode, ReasoningResult};
use crate::nodes::{interpretation, perception};
use crate::rrla::ActionType;
use crate::tools::{ToolCallOutcome, ToolExecutor};

pub const NAME: &str = "synthesis";

const CLARIFICATION_TEXT: &str =
    "Could you tell me a bit more about what you need? Your request is not clear enough for me to act on yet.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub reasoning_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// 模型请求工具的轮数
    #[serde(default)]
    pub tool_rounds: usize,
    #[serde(default)]
    pub tool_results: Vec<ToolCallOutcome>,
    #[serde(default)]
    pub streamed: bool,
    #[serde(default)]
    pub cancelled: bool,
    /// 回复来自兜底而非模型
    #[serde(default)]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
}

pub struct SynthesisInput {
    input: String,
    intent: String,
    reasoning: Option<ReasoningResult>,
    memory_hits: Vec<Interaction>,
    stream: Option<StreamSink>,
}

impl SynthesisInput {
    fn prompt(&self) -> String {
        let mut prompt = format!("User request: {}\nIntent: {}\n", self.input, self.intent);
        if let Some(plan) = self.reasoning.as_ref().and_then(|r| r.plan.as_ref()) {
            prompt.push_str(&plan.summary());
            prompt.push('\n');
        }
        let tool_results = self.reasoning.iter().flat_map(|r| r.tool_results.iter());
        let mut lines: Vec<String> = Vec::new();
        for outcome in tool_results {
            match (&outcome.result, &outcome.error) {
                (Some(result), _) => lines.push(format!("- {}: {}", outcome.tool, result)),
                (None, Some(err)) => lines.push(format!("- {} failed: {}", outcome.tool, err)),
                _ => {}
            }
        }
        if !lines.is_empty() {
            prompt.push_str("Tool results:\n");
            prompt.push_str(&lines.join("\n"));
            prompt.push('\n');
        }
        if !self.memory_hits.is_empty() {
            prompt.push_str("Related earlier requests:\n");
            for hit in &self.memory_hits {
                prompt.push_str(&format!("- {}\n", hit.query));
            }
        }
        prompt.push_str("Answer the user's request using the information above.");
        prompt
    }

    fn sources(&self) -> Vec<String> {
        let mut sources = Vec::new();
        if let Some(r) = &self.reasoning {
            sources.push(format!("reasoning:{}", mode_name(r.mode)));
            for outcome in r.tool_results.iter().filter(|o| o.success) {
                sources.push(format!("tool:{}", outcome.tool));
            }
        }
        if !self.memory_hits.is_empty() {
            sources.push(format!("memory:{}", self.memory_hits.len()));
        }
        sources
    }
}

fn mode_name(mode: ReasoningMode) -> &'static str {
    match mode {
        ReasoningMode::Rrla => "rrla",
        ReasoningMode::Direct => "direct",
        ReasoningMode::Unavailable => "unavailable",
    }
}

pub struct SynthesisNode {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolExecutor>,
    recovery: RecoveryEngine,
    max_tool_iterations: usize,
}

impl SynthesisNode {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolExecutor>,
        recovery: RecoveryEngine,
        max_tool_iterations: usize,
    ) -> Self {
        Self {
            llm,
            tools,
            recovery,
            max_tool_iterations,
        }
    }

    async fn tool_loop(&self, prompt: &str) -> Result<(String, usize, Vec<ToolCallOutcome>), AgentError> {
        let schemas = self.tools.registry().schemas();
        let mut messages = build_messages(prompt, Some(&schemas));
        let mut outcomes = Vec::new();
        let mut rounds = 0;
        loop {
            let generation = generate_messages(self.llm.as_ref(), &messages).await?;
            if !generation.requests_tools() {
                return Ok((generation.text, rounds, outcomes));
            }
            if rounds >= self.max_tool_iterations {
                return Err(AgentError::ToolLoopExceeded {
                    max: self.max_tool_iterations,
                });
            }
            rounds += 1;
            tracing::debug!(round = rounds, calls = generation.function_calls.len(), "model requested tools");
            let results = self.tools.call_all(&generation.function_calls).await;
            messages.push(Message::assistant(serde_json::to_string(&generation.function_calls)?));
            messages.push(Message::user(format!(
                "Tool results:\n{}\nAnswer the user now, or call another tool if needed.",
                serde_json::to_string_pretty(&results)?
            )));
            outcomes.extend(results);
        }
    }

    /// 返回 (已收到的文本, 是否被取消)
    async fn stream_answer(&self, prompt: &str, sink: &StreamSink) -> Result<(String, bool), AgentError> {
        let cancel = sink.cancel_token().clone();
        let mut tokens = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok((String::new(), true)),
            opened = stream(self.llm.as_ref(), prompt) => opened?,
        };
        let mut text = String::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok((text, true)),
                next = tokens.next() => match next {
                    Some(Ok(chunk)) => {
                        text.push_str(&chunk);
                        if !sink.chunk(chunk).await {
                            return Ok((text, true));
                        }
                    }
                    Some(Err(err)) => return Err(err.into()),
                    None => return Ok((text, false)),
                }
            }
        }
    }
}

#[async_trait]
impl Node for SynthesisNode {
    type Input = SynthesisInput;
    type Output = SynthesisResult;

    fn name(&self) -> &'static str {
        NAME
    }

    fn prepare(&self, ctx: &SharedContext) -> Result<SynthesisInput, AgentError> {
        let input = ctx
            .get_result(perception::NAME)?
            .get("clean_input")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let intent = ctx
            .get_result(interpretation::NAME)?
            .get("intent")
            .and_then(|v| v.as_str())
            .unwrap_or("conversation")
            .to_string();
        let memory_hits = serde_json::from_value(ctx.get_context_or(MEMORY_SNAPSHOT_KEY, Value::Array(Vec::new())))
            .unwrap_or_default();
        Ok(SynthesisInput {
            input,
            intent,
            reasoning: ctx.get_result_as(reasoning::NAME).ok(),
            memory_hits,
            stream: ctx.stream().cloned(),
        })
    }

    async fn execute(&self, input: SynthesisInput) -> Result<SynthesisResult, AgentError> {
        let mut result = SynthesisResult {
            sources: input.sources(),
            reasoning_summary: input
                .reasoning
                .as_ref()
                .and_then(|r| r.plan.as_ref())
                .map(|p| p.summary())
                .unwrap_or_default(),
            confidence: input.reasoning.as_ref().and_then(|r| r.confidence()),
            streamed: input.stream.is_some(),
            ..Default::default()
        };

        let ready_text = match &input.reasoning {
            Some(r) if r.direct_answer.is_some() => r.direct_answer.clone(),
            Some(r) if r.action_type() == ActionType::RequestClarification => {
                Some(CLARIFICATION_TEXT.to_string())
            }
            _ => None,
        };

        if let Some(text) = ready_text {
            if let Some(sink) = &input.stream {
                result.cancelled = !sink.chunk(text.clone()).await;
            }
            result.answer = text;
            return Ok(result);
        }

        let prompt = input.prompt();
        match &input.stream {
            Some(sink) => {
                let (text, cancelled) = self.stream_answer(&prompt, sink).await?;
                result.answer = text;
                result.cancelled = cancelled;
            }
            None => {
                let (text, rounds, outcomes) = self.tool_loop(&prompt).await?;
                result.answer = text;
                result.tool_rounds = rounds;
                result.tool_results = outcomes;
            }
        }
        Ok(result)
    }

    fn summarize(&self, output: &SynthesisResult) -> Option<String> {
        Some(format!(
            "{} chars, {} tool round(s){}",
            output.answer.chars().count(),
            output.tool_rounds,
            if output.cancelled { ", cancelled" } else { "" }
        ))
    }

    fn finalize(&self, ctx: &mut SharedContext, output: SynthesisResult) -> Result<Flow, AgentError> {
        let cancelled = output.cancelled;
        ctx.set_result(NAME, serde_json::to_value(output)?)?;
        if cancelled {
            tracing::info!("client went away, stopping pipeline");
            ctx.mark_cancelled();
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }

    fn fallback(&self, err: &AgentError) -> Value {
        serde_json::to_value(SynthesisResult {
            answer: self.recovery.fallback_answer(err),
            degraded: true,
            error_class: Some(err.class().to_string()),
            ..Default::default()
        })
        .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{run_node, Outcome};
    use crate::llm::{LlmError, MockLlmClient};
    use crate::memory::InteractionMemory;
    use crate::tools::{register_builtin_tools, ToolRegistry};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn executor() -> Arc<ToolExecutor> {
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry, Arc::new(InteractionMemory::default())).unwrap();
        Arc::new(ToolExecutor::new(Arc::new(registry), 5))
    }

    fn node(llm: MockLlmClient, max: usize) -> SynthesisNode {
        SynthesisNode::new(Arc::new(llm), executor(), RecoveryEngine::new(), max)
    }

    fn ctx() -> SharedContext {
        let mut ctx = SharedContext::with_input("tell me something");
        ctx.set_result(perception::NAME, json!({"clean_input": "tell me something"})).unwrap();
        ctx.set_result(interpretation::NAME, json!({"intent": "conversation"})).unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_tool_loop_feeds_results_back() {
        let llm = MockLlmClient::new()
            .push_text(r#"{"tool": "calculate", "arguments": {"expression": "6 * 7"}}"#)
            .push_text("The answer is 42.");
        let mut ctx = ctx();
        run_node(&node(llm, 3), &mut ctx).await;
        let out: SynthesisResult = ctx.get_result_as(NAME).unwrap();
        assert_eq!(out.answer, "The answer is 42.");
        assert_eq!(out.tool_rounds, 1);
        assert_eq!(out.tool_results[0].result, Some(json!(42)));
    }

    #[tokio::test]
    async fn test_runaway_tool_calls_hit_the_guard() {
        let call = r#"{"tool": "echo", "arguments": {"text": "again"}}"#;
        let llm = MockLlmClient::new().push_text(call).push_text(call).push_text(call);
        let mut ctx = ctx();
        let run = run_node(&node(llm, 2), &mut ctx).await;
        assert_eq!(run.error.unwrap().class(), "ToolLoopExceeded");
        let out: SynthesisResult = ctx.get_result_as(NAME).unwrap();
        assert!(out.degraded);
        assert!(!out.answer.is_empty());
    }

    #[tokio::test]
    async fn test_llm_timeout_leaves_fallback_draft() {
        let llm = MockLlmClient::new().push_error(LlmError::Timeout { secs: 1 });
        let mut ctx = ctx();
        run_node(&node(llm, 3), &mut ctx).await;
        let entry = &ctx.get_trace()[0];
        assert_eq!(entry.outcome, Outcome::Error);
        assert_eq!(entry.error_class.as_deref(), Some("Timeout"));
        let out: SynthesisResult = ctx.get_result_as(NAME).unwrap();
        assert_eq!(out.error_class.as_deref(), Some("Timeout"));
        assert!(!out.answer.is_empty());
    }

    #[tokio::test]
    async fn test_streaming_forwards_chunks() {
        let llm = MockLlmClient::new().push_text("streamed answer text");
        let (sink, mut rx) = StreamSink::channel(32, CancellationToken::new());
        let mut ctx = ctx();
        ctx.attach_stream(sink);
        run_node(&node(llm, 3), &mut ctx).await;

        let mut received = String::new();
        while let Ok(crate::core::StreamEvent::Chunk { text }) = rx.try_recv() {
            received.push_str(&text);
        }
        assert_eq!(received, "streamed answer text");
        let out: SynthesisResult = ctx.get_result_as(NAME).unwrap();
        assert!(out.streamed);
        assert!(!out.cancelled);
    }

    #[tokio::test]
    async fn test_cancelled_stream_stops_pipeline() {
        let token = CancellationToken::new();
        token.cancel();
        let (sink, _rx) = StreamSink::channel(4, token);
        let mut ctx = ctx();
        ctx.attach_stream(sink);
        let run = run_node(&node(MockLlmClient::new(), 3), &mut ctx).await;
        assert_eq!(run.flow, Flow::Stop);
        assert!(ctx.is_cancelled());
    }
}
