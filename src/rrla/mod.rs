//! RRLA 推理：Raisonnement（分解）→ Réflexion（评估）→ Logique（依赖链）→ Action（决策）
//!
//! 四个阶段严格按序执行、不可跳过。只有分解阶段会访问 LLM；其余阶段是纯函数，
//! 对同样的子目标列表给出同样的结果。任何阶段的错误都原样返回给 Reasoning 节点，
//! 由节点降级为直接回答。

pub mod chain;
pub mod decide;
pub mod decompose;
pub mod reflect;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::PipelineSection;
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::tools::{ToolCall, ToolRegistry};

pub use chain::{chain, critical_path, topological_order};
pub use decide::{confidence, decide};
pub use decompose::decompose;
pub use reflect::reflect;

/// 分解出的子目标（id 从 1 开始，按分解顺序连续编号）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subgoal {
    pub id: usize,
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<usize>,
    /// 完成该子目标所需的工具调用（若有）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_hint: Option<ToolCall>,
}

impl Subgoal {
    pub fn new(id: usize, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            depends_on: Vec::new(),
            tool_hint: None,
        }
    }

    pub fn after(mut self, deps: &[usize]) -> Self {
        self.depends_on = deps.to_vec();
        self
    }

    pub fn with_tool(mut self, call: ToolCall) -> Self {
        self.tool_hint = Some(call);
        self
    }
}

/// 评估后的子目标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSubgoal {
    #[serde(flatten)]
    pub subgoal: Subgoal,
    pub feasibility: f64,
    pub priority: i64,
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogicChain {
    /// 拓扑执行顺序（子目标 id）
    pub sequence: Vec<usize>,
    /// 最长依赖链，仅用于展示
    pub critical_path: Vec<usize>,
    /// 子目标 id -> 其依赖
    pub dependencies: BTreeMap<usize, Vec<usize>>,
    /// 依赖图有环，sequence 退化为分解顺序
    #[serde(default)]
    pub cyclic_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    GenerateResponse,
    CallTool,
    RequestClarification,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::GenerateResponse => "generate_response",
            ActionType::CallTool => "call_tool",
            ActionType::RequestClarification => "request_clarification",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action_type: ActionType,
    pub confidence: f64,
    pub tool_calls: Vec<ToolCall>,
    pub rationale: String,
}

/// RRLA 的完整输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningPlan {
    pub subgoals: Vec<ScoredSubgoal>,
    pub sequence: Vec<usize>,
    pub critical_path: Vec<usize>,
    pub dependencies: BTreeMap<usize, Vec<usize>>,
    pub cyclic_fallback: bool,
    pub action_type: ActionType,
    pub confidence: f64,
    pub tool_calls: Vec<ToolCall>,
    pub rationale: String,
}

impl ReasoningPlan {
    fn assemble(subgoals: Vec<ScoredSubgoal>, chain: LogicChain, decision: Decision) -> Self {
        Self {
            subgoals,
            sequence: chain.sequence,
            critical_path: chain.critical_path,
            dependencies: chain.dependencies,
            cyclic_fallback: chain.cyclic_fallback,
            action_type: decision.action_type,
            confidence: decision.confidence,
            tool_calls: decision.tool_calls,
            rationale: decision.rationale,
        }
    }

    /// 可读的推理过程，供 Synthesis 写入 prompt
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Plan: {} subgoal(s), action={}, confidence={:.2}\n",
            self.subgoals.len(),
            self.action_type.as_str(),
            self.confidence
        );
        for id in &self.sequence {
            if let Some(s) = self.subgoals.iter().find(|s| s.subgoal.id == *id) {
                out.push_str(&format!(
                    "  {}. {} (feasibility {:.2})\n",
                    id, s.subgoal.description, s.feasibility
                ));
            }
        }
        out.push_str(&format!("Critical path: {:?}", self.critical_path));
        out
    }
}

/// 推理所需的任务信息（来自 Perception / Interpretation）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskContext {
    pub input: String,
    pub intent: String,
    pub task_type: String,
    pub complexity: String,
    pub expression: Option<String>,
    pub artifact_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RrlaConfig {
    pub clarification_threshold: f64,
    pub llm_decomposition: bool,
    pub max_subgoals: usize,
}

impl Default for RrlaConfig {
    fn default() -> Self {
        Self::from_config(&PipelineSection::default())
    }
}

impl RrlaConfig {
    pub fn from_config(cfg: &PipelineSection) -> Self {
        Self {
            clarification_threshold: cfg.clarification_threshold,
            llm_decomposition: cfg.llm_decomposition,
            max_subgoals: cfg.max_subgoals.max(1),
        }
    }
}

/// 依次执行四个阶段
pub async fn plan(
    task: &TaskContext,
    llm: &dyn LlmClient,
    registry: &ToolRegistry,
    cfg: &RrlaConfig,
) -> Result<ReasoningPlan, AgentError> {
    let subgoals = decompose(task, llm, cfg).await?;
    let scored = reflect(&subgoals, registry);
    let logic = chain(&scored);
    let decision = decide(task, &scored, &logic, registry, cfg.clarification_threshold);
    tracing::debug!(
        subgoals = scored.len(),
        action = decision.action_type.as_str(),
        confidence = decision.confidence,
        "rrla plan ready"
    );
    Ok(ReasoningPlan::assemble(scored, logic, decision))
}
