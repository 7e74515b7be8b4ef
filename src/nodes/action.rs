//! Action：组装最终回复记录 {final, format, actions_taken, tool_calls, status}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{AgentError, Flow, Node, RecoveryEngine, SharedContext};
use crate::nodes::reasoning::{self, ReasoningMode, ReasoningResult};
use crate::nodes::synthesis::{self, SynthesisResult};
use crate::tools::{ToolCall, ToolCallOutcome};

pub const NAME: &str = "action";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Completed,
    /// 回复来自兜底或直接回答
    Degraded,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    #[serde(rename = "final")]
    pub final_answer: String,
    pub format: String,
    pub actions_taken: Vec<ToolCallOutcome>,
    /// Reasoning 决定发起的工具调用
    pub tool_calls: Vec<ToolCall>,
    pub status: ActionStatus,
}

pub struct ActionInput {
    synthesis: Option<SynthesisResult>,
    reasoning: Option<ReasoningResult>,
}

pub struct ActionNode {
    recovery: RecoveryEngine,
}

impl ActionNode {
    pub fn new(recovery: RecoveryEngine) -> Self {
        Self { recovery }
    }
}

fn detect_format(text: &str) -> &'static str {
    let markdown = text.contains("```")
        || text.lines().any(|l| {
            let l = l.trim_start();
            l.starts_with("# ") || l.starts_with("## ") || l.starts_with("- ") || l.starts_with("* ")
        });
    if markdown {
        "markdown"
    } else {
        "text"
    }
}

/// 兜底回复后附上已成功的工具结果，避免丢掉已有的计算
fn append_tool_results(answer: &mut String, outcomes: &[ToolCallOutcome]) {
    let lines: Vec<String> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().map(|r| format!("{} -> {}", o.tool, r)))
        .collect();
    if !lines.is_empty() {
        answer.push_str("\n\nTool results:\n");
        answer.push_str(&lines.join("\n"));
    }
}

#[async_trait]
impl Node for ActionNode {
    type Input = ActionInput;
    type Output = ActionResult;

    fn name(&self) -> &'static str {
        NAME
    }

    fn prepare(&self, ctx: &SharedContext) -> Result<ActionInput, AgentError> {
        Ok(ActionInput {
            synthesis: ctx.get_result_as(synthesis::NAME).ok(),
            reasoning: ctx.get_result_as(reasoning::NAME).ok(),
        })
    }

    async fn execute(&self, input: ActionInput) -> Result<ActionResult, AgentError> {
        let reasoning_tools = input
            .reasoning
            .as_ref()
            .map(|r| r.tool_results.clone())
            .unwrap_or_default();
        let tool_calls = input
            .reasoning
            .as_ref()
            .and_then(|r| r.plan.as_ref())
            .map(|p| p.tool_calls.clone())
            .unwrap_or_default();
        let direct = input
            .reasoning
            .as_ref()
            .is_some_and(|r| r.mode != ReasoningMode::Rrla);

        let (mut final_answer, degraded, cancelled, loop_tools) = match input.synthesis {
            Some(s) => (s.answer, s.degraded, s.cancelled, s.tool_results),
            None => (
                self.recovery
                    .fallback_answer(&AgentError::NotFound("synthesis result".into())),
                true,
                false,
                Vec::new(),
            ),
        };

        if degraded {
            append_tool_results(&mut final_answer, &reasoning_tools);
        }

        let mut actions_taken = reasoning_tools;
        actions_taken.extend(loop_tools);

        let status = if cancelled {
            ActionStatus::Cancelled
        } else if degraded || direct {
            ActionStatus::Degraded
        } else {
            ActionStatus::Completed
        };

        Ok(ActionResult {
            format: detect_format(&final_answer).to_string(),
            final_answer,
            actions_taken,
            tool_calls,
            status,
        })
    }

    fn summarize(&self, output: &ActionResult) -> Option<String> {
        Some(format!(
            "status={:?} format={} actions={}",
            output.status,
            output.format,
            output.actions_taken.len()
        ))
    }

    fn finalize(&self, ctx: &mut SharedContext, output: ActionResult) -> Result<Flow, AgentError> {
        ctx.set_result(NAME, serde_json::to_value(output)?)?;
        Ok(Flow::Continue)
    }

    fn fallback(&self, err: &AgentError) -> Value {
        json!({
            "final": self.recovery.fallback_answer(err),
            "format": "text",
            "actions_taken": [],
            "tool_calls": [],
            "status": "degraded",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::run_node;

    #[test]
    fn test_format_detection() {
        assert_eq!(detect_format("plain answer"), "text");
        assert_eq!(detect_format("# Title\nbody"), "markdown");
        assert_eq!(detect_format("steps:\n- one\n- two"), "markdown");
    }

    #[tokio::test]
    async fn test_degraded_synthesis_keeps_tool_results() {
        let mut ctx = SharedContext::new();
        ctx.set_result(
            reasoning::NAME,
            json!({
                "mode": "rrla",
                "tool_results": [{"tool": "calculate", "success": true, "result": 4}]
            }),
        )
        .unwrap();
        ctx.set_result(
            synthesis::NAME,
            json!({"answer": "The model timed out.", "degraded": true, "error_class": "Timeout"}),
        )
        .unwrap();
        run_node(&ActionNode::new(RecoveryEngine::new()), &mut ctx).await;

        let out: ActionResult = ctx.get_result_as(NAME).unwrap();
        assert_eq!(out.status, ActionStatus::Degraded);
        assert!(out.final_answer.contains("calculate -> 4"));
        assert_eq!(out.actions_taken.len(), 1);
        assert_eq!(ctx.answer().as_deref(), Some(out.final_answer.as_str()));
    }

    #[tokio::test]
    async fn test_missing_synthesis_still_answers() {
        let mut ctx = SharedContext::new();
        run_node(&ActionNode::new(RecoveryEngine::new()), &mut ctx).await;
        let out: ActionResult = ctx.get_result_as(NAME).unwrap();
        assert!(!out.final_answer.is_empty());
        assert_eq!(out.status, ActionStatus::Degraded);
    }
}
