//! Agent 错误类型
//!
//! 覆盖流水线全部错误分类：参数校验、缺失键/资源、重名注册、依赖环、LLM 超时与瞬时错误、
//! 工具执行失败、容量上限、工具循环失控。节点阶段的错误一律被 Orchestrator 捕获并写入 Trace，
//! `class()` 给出写入 Trace 的稳定错误类名。

use thiserror::Error;

use crate::llm::LlmError;

/// 流水线运行过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// 工具参数或输入格式不合法
    #[error("Validation error: {0}")]
    Validation(String),

    /// 缺失的 context 键、节点结果、工具或 artifact
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// 推理依赖图中存在环（携带环上的子目标 id）
    #[error("Cyclic dependency among subgoals {0:?}")]
    CyclicDependency(Vec<usize>),

    #[error("Timeout: {0}")]
    Timeout(String),

    /// 限流、5xx 等可重试错误，重试耗尽后上抛
    #[error("Transient provider error: {0}")]
    TransientProvider(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Capacity exceeded (max {max})")]
    CapacityExceeded { max: usize },

    #[error("Tool loop exceeded {max} iterations")]
    ToolLoopExceeded { max: usize },

    /// Artifact 快照导出/导入失败（IO 或 JSON）
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// 写入 TraceEntry 的错误类名
    pub fn class(&self) -> &'static str {
        match self {
            AgentError::Validation(_) => "ValidationError",
            AgentError::NotFound(_) => "NotFound",
            AgentError::DuplicateName(_) => "DuplicateName",
            AgentError::CyclicDependency(_) => "CyclicDependency",
            AgentError::Timeout(_) => "Timeout",
            AgentError::TransientProvider(_) => "TransientProviderError",
            AgentError::Llm(_) => "LlmError",
            AgentError::ToolExecution { .. } => "ToolExecutionError",
            AgentError::CapacityExceeded { .. } => "CapacityExceeded",
            AgentError::ToolLoopExceeded { .. } => "ToolLoopExceeded",
            AgentError::Snapshot(_) => "SnapshotError",
            AgentError::Config(_) => "ConfigError",
        }
    }
}

impl From<LlmError> for AgentError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout { secs } => {
                AgentError::Timeout(format!("LLM call exceeded {secs}s"))
            }
            LlmError::RateLimited { .. } | LlmError::Server(_) => {
                AgentError::TransientProvider(err.to_string())
            }
            LlmError::Api(msg) | LlmError::InvalidResponse(msg) => AgentError::Llm(msg),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_timeout_maps_to_timeout_class() {
        let err: AgentError = LlmError::Timeout { secs: 5 }.into();
        assert_eq!(err.class(), "Timeout");
    }

    #[test]
    fn test_rate_limit_maps_to_transient() {
        let err: AgentError = LlmError::RateLimited { retry_after_ms: 100 }.into();
        assert_eq!(err.class(), "TransientProviderError");
    }

    #[test]
    fn test_tool_execution_display_names_tool() {
        let err = AgentError::ToolExecution {
            tool: "calculate".to_string(),
            message: "division by zero".to_string(),
        };
        assert!(err.to_string().contains("calculate"));
        assert_eq!(err.class(), "ToolExecutionError");
    }
}
