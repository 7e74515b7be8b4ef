//! Reasoning：执行 RRLA 规划并按决策顺序调用工具
//!
//! 规划任一阶段失败时不中止流水线，而是跳过规划、直接请模型作答（mode = direct）。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{AgentError, Flow, Node, SharedContext};
use crate::llm::{generate, LlmClient};
use crate::nodes::interpretation::{self, InterpretationResult};
use crate::nodes::perception;
use crate::rrla::{self, ActionType, ReasoningPlan, RrlaConfig, TaskContext};
use crate::tools::{ToolCallOutcome, ToolExecutor};

pub const NAME: &str = "reasoning";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningMode {
    Rrla,
    /// 规划失败后直接作答
    Direct,
    /// 节点本身失败
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningResult {
    pub mode: ReasoningMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ReasoningPlan>,
    #[serde(default)]
    pub tool_results: Vec<ToolCallOutcome>,
    /// direct 模式下模型给出的回答
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
}

impl ReasoningResult {
    pub fn action_type(&self) -> ActionType {
        self.plan
            .as_ref()
            .map_or(ActionType::GenerateResponse, |p| p.action_type)
    }

    pub fn confidence(&self) -> Option<f64> {
        self.plan.as_ref().map(|p| p.confidence)
    }
}

pub struct ReasoningNode {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolExecutor>,
    config: RrlaConfig,
}

impl ReasoningNode {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<ToolExecutor>, config: RrlaConfig) -> Self {
        Self { llm, tools, config }
    }

    async fn answer_directly(&self, task: &TaskContext, cause: AgentError) -> Result<ReasoningResult, AgentError> {
        tracing::warn!(error = %cause, "rrla planning failed, answering directly");
        let generation = generate(self.llm.as_ref(), &task.input, None).await?;
        Ok(ReasoningResult {
            mode: ReasoningMode::Direct,
            plan: None,
            tool_results: Vec::new(),
            direct_answer: Some(generation.text),
            error_class: Some(cause.class().to_string()),
        })
    }
}

#[async_trait]
impl Node for ReasoningNode {
    type Input = TaskContext;
    type Output = ReasoningResult;

    fn name(&self) -> &'static str {
        NAME
    }

    fn prepare(&self, ctx: &SharedContext) -> Result<TaskContext, AgentError> {
        let input = ctx
            .get_result(perception::NAME)?
            .get("clean_input")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let interp: InterpretationResult = ctx.get_result_as(interpretation::NAME)?;
        Ok(TaskContext {
            input,
            intent: interp.intent,
            task_type: interp.task_type,
            complexity: interp.complexity,
            expression: interp.expression,
            artifact_type: interp.artifact_type,
        })
    }

    async fn execute(&self, task: TaskContext) -> Result<ReasoningResult, AgentError> {
        let plan = match rrla::plan(&task, self.llm.as_ref(), self.tools.registry(), &self.config).await {
            Ok(plan) => plan,
            Err(err) => return self.answer_directly(&task, err).await,
        };

        // 按决策顺序逐个调用，不并发
        let tool_results = if plan.action_type == ActionType::CallTool {
            self.tools.call_all(&plan.tool_calls).await
        } else {
            Vec::new()
        };

        Ok(ReasoningResult {
            mode: ReasoningMode::Rrla,
            plan: Some(plan),
            tool_results,
            direct_answer: None,
            error_class: None,
        })
    }

    fn summarize(&self, output: &ReasoningResult) -> Option<String> {
        Some(match &output.plan {
            Some(plan) => format!(
                "{} subgoal(s), action={}, confidence={:.2}, {} tool call(s)",
                plan.subgoals.len(),
                plan.action_type.as_str(),
                plan.confidence,
                output.tool_results.len()
            ),
            None => "direct answer".to_string(),
        })
    }

    fn finalize(&self, ctx: &mut SharedContext, output: ReasoningResult) -> Result<Flow, AgentError> {
        ctx.set_result(NAME, serde_json::to_value(output)?)?;
        Ok(Flow::Continue)
    }

    fn fallback(&self, err: &AgentError) -> Value {
        serde_json::to_value(ReasoningResult {
            mode: ReasoningMode::Unavailable,
            plan: None,
            tool_results: Vec::new(),
            direct_answer: None,
            error_class: Some(err.class().to_string()),
        })
        .unwrap_or(Value::Null)
    }
}
