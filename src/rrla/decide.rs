//! A 决策：动作类型、置信度与工具调用
//!
//! confidence = Σ(max(p,0)·f) / Σmax(p,0)，p 为 priority、f 为截断到 [0,1] 的 feasibility；
//! 权重全为 0 时取 feasibility 算术平均，没有子目标时为 0。结果始终在 [0, 1]。

use crate::rrla::{ActionType, Decision, LogicChain, ScoredSubgoal, TaskContext};
use crate::tools::{ToolCall, ToolRegistry};

pub fn confidence(scored: &[ScoredSubgoal]) -> f64 {
    if scored.is_empty() {
        return 0.0;
    }
    let feasibility = |s: &ScoredSubgoal| {
        if s.feasibility.is_nan() {
            0.0
        } else {
            s.feasibility.clamp(0.0, 1.0)
        }
    };
    let total_weight: f64 = scored.iter().map(|s| s.priority.max(0) as f64).sum();
    let value = if total_weight > 0.0 {
        scored
            .iter()
            .map(|s| s.priority.max(0) as f64 * feasibility(s))
            .sum::<f64>()
            / total_weight
    } else {
        scored.iter().map(feasibility).sum::<f64>() / scored.len() as f64
    };
    value.clamp(0.0, 1.0)
}

/// 决策规则按序匹配：
/// 1. 空输入 → request_clarification
/// 2. 存在可用（已注册且参数合法）的工具提示 → call_tool，按 sequence 顺序
/// 3. 置信度低于阈值 → request_clarification
/// 4. 其余 → generate_response
pub fn decide(
    task: &TaskContext,
    scored: &[ScoredSubgoal],
    chain: &LogicChain,
    registry: &ToolRegistry,
    clarification_threshold: f64,
) -> Decision {
    let confidence = confidence(scored);

    if task.input.trim().is_empty() {
        return Decision {
            action_type: ActionType::RequestClarification,
            confidence,
            tool_calls: Vec::new(),
            rationale: "empty request".to_string(),
        };
    }

    let tool_calls: Vec<ToolCall> = chain
        .sequence
        .iter()
        .filter_map(|id| scored.iter().find(|s| s.subgoal.id == *id))
        .filter_map(|s| s.subgoal.tool_hint.as_ref())
        .filter(|call| registry.validate(&call.tool, &call.arguments).is_ok())
        .cloned()
        .collect();

    if !tool_calls.is_empty() {
        let names: Vec<&str> = tool_calls.iter().map(|c| c.tool.as_str()).collect();
        return Decision {
            action_type: ActionType::CallTool,
            confidence,
            rationale: format!("tools required: {}", names.join(", ")),
            tool_calls,
        };
    }

    if confidence < clarification_threshold {
        return Decision {
            action_type: ActionType::RequestClarification,
            confidence,
            tool_calls: Vec::new(),
            rationale: format!("confidence {confidence:.2} below {clarification_threshold:.2}"),
        };
    }

    Decision {
        action_type: ActionType::GenerateResponse,
        confidence,
        tool_calls: Vec::new(),
        rationale: "answer directly".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rrla::{chain, Subgoal};
    use crate::tools::CalculateTool;
    use serde_json::json;

    fn sg(id: usize, feasibility: f64, priority: i64) -> ScoredSubgoal {
        ScoredSubgoal {
            subgoal: Subgoal::new(id, "step"),
            feasibility,
            priority,
            risks: Vec::new(),
        }
    }

    fn task(input: &str) -> TaskContext {
        TaskContext {
            input: input.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_confidence_is_priority_weighted() {
        let c = confidence(&[sg(1, 1.0, 3), sg(2, 0.0, 1)]);
        assert!((c - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_always_in_unit_range() {
        let feasibilities = [-3.0, 0.0, 0.3, 1.0, 7.5, f64::NAN];
        let priorities = [-5, 0, 1, 4, 1000];
        for &f1 in &feasibilities {
            for &f2 in &feasibilities {
                for &p1 in &priorities {
                    for &p2 in &priorities {
                        let c = confidence(&[sg(1, f1, p1), sg(2, f2, p2)]);
                        assert!((0.0..=1.0).contains(&c), "{f1} {f2} {p1} {p2} -> {c}");
                    }
                }
            }
        }
        assert_eq!(confidence(&[]), 0.0);
    }

    #[test]
    fn test_zero_weights_use_plain_mean() {
        let c = confidence(&[sg(1, 0.4, 0), sg(2, 0.8, -2)]);
        assert!((c - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_low_confidence_requests_clarification() {
        let scored = vec![sg(1, 0.1, 1)];
        let logic = chain(&scored);
        let d = decide(&task("hm"), &scored, &logic, &ToolRegistry::new(), 0.3);
        assert_eq!(d.action_type, ActionType::RequestClarification);
    }

    #[test]
    fn test_invalid_tool_hint_is_not_called() {
        let mut registry = ToolRegistry::new();
        registry.register(CalculateTool).unwrap();
        let mut bad = sg(1, 0.9, 1);
        bad.subgoal = bad.subgoal.with_tool(ToolCall::new("calculate", json!({"expr": 1})));
        let scored = vec![bad];
        let logic = chain(&scored);
        let d = decide(&task("compute"), &scored, &logic, &registry, 0.3);
        assert_eq!(d.action_type, ActionType::GenerateResponse);
        assert!(d.tool_calls.is_empty());
    }
}
