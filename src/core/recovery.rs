//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，Orchestrator 与降级节点据此生成面向用户的兜底回复。
//! 用户永远看不到原始内部错误，只看到这里给出的文本。

use crate::core::AgentError;

/// 语义化错误恢复动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 输入本身有问题，请用户补充或改写
    Clarify(String),
    /// 外部依赖（模型、工具）暂时不可用，给出降级回复
    Degrade(String),
    /// 无法继续
    Abort(String),
}

impl RecoveryAction {
    pub fn message(&self) -> &str {
        match self {
            RecoveryAction::Clarify(m) | RecoveryAction::Degrade(m) | RecoveryAction::Abort(m) => m,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::Validation(_) | AgentError::NotFound(_) => RecoveryAction::Clarify(
                "I could not understand the request. Please rephrase it or provide more detail."
                    .to_string(),
            ),
            AgentError::Timeout(_) => RecoveryAction::Degrade(
                "The language model did not respond in time, so here is a best-effort answer without it."
                    .to_string(),
            ),
            AgentError::TransientProvider(_) | AgentError::Llm(_) => RecoveryAction::Degrade(
                "The language model is temporarily unavailable. Please try again shortly."
                    .to_string(),
            ),
            AgentError::ToolExecution { tool, .. } => RecoveryAction::Degrade(format!(
                "The '{tool}' tool failed while handling the request, so the answer may be incomplete."
            )),
            AgentError::ToolLoopExceeded { max } => RecoveryAction::Degrade(format!(
                "The request needed more than {max} tool rounds, so the answer was stopped early."
            )),
            AgentError::CapacityExceeded { max } => RecoveryAction::Degrade(format!(
                "The artifact store is full ({max} items). Delete some artifacts and retry."
            )),
            AgentError::CyclicDependency(_) => RecoveryAction::Degrade(
                "The task steps depend on each other in a loop; they were handled in the given order."
                    .to_string(),
            ),
            AgentError::DuplicateName(_) | AgentError::Snapshot(_) | AgentError::Config(_) => {
                RecoveryAction::Abort("The request could not be processed.".to_string())
            }
        }
    }

    /// 用户可见的兜底回复文本
    pub fn fallback_answer(&self, err: &AgentError) -> String {
        self.handle(err).message().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_validation_asks_to_clarify() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::Validation("empty".into()));
        assert!(matches!(action, RecoveryAction::Clarify(_)));
    }

    #[test]
    fn test_recovery_timeout_degrades() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::Timeout("llm".into()));
        assert!(matches!(action, RecoveryAction::Degrade(_)));
    }

    #[test]
    fn test_recovery_tool_failure_names_tool() {
        let engine = RecoveryEngine::new();
        let err = AgentError::ToolExecution {
            tool: "calculate".into(),
            message: "boom".into(),
        };
        assert!(engine.fallback_answer(&err).contains("calculate"));
    }

    #[test]
    fn test_fallback_never_leaks_internal_message() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Llm("secret stack trace".into());
        assert!(!engine.fallback_answer(&err).contains("secret"));
    }

    #[test]
    fn test_recovery_config_aborts() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::Config("bad".into()));
        assert!(matches!(action, RecoveryAction::Abort(_)));
    }
}
