//! R2 评估：为每个子目标给出可行性、优先级与风险
//!
//! feasibility 以 0.85 为基准：已注册且参数合法的工具 +0.1；参数不合法 -0.3；
//! 工具未注册直接压到 0.2；描述少于 2 个词 -0.2；越靠后的子目标每步再减 0.05。结果截断到 [0, 1]。
//! priority = 逆序位置 + 被依赖次数，相同优先级保持分解顺序。

use crate::rrla::{ScoredSubgoal, Subgoal};
use crate::tools::ToolRegistry;

const BASE_FEASIBILITY: f64 = 0.85;

pub fn reflect(subgoals: &[Subgoal], registry: &ToolRegistry) -> Vec<ScoredSubgoal> {
    let n = subgoals.len();
    subgoals
        .iter()
        .enumerate()
        .map(|(i, subgoal)| {
            let mut risks = Vec::new();
            let mut feasibility = BASE_FEASIBILITY;

            if let Some(call) = &subgoal.tool_hint {
                if !registry.contains(&call.tool) {
                    feasibility = 0.2;
                    risks.push(format!("unknown_tool:{}", call.tool));
                } else if registry.validate(&call.tool, &call.arguments).is_ok() {
                    feasibility += 0.1;
                } else {
                    feasibility -= 0.3;
                    risks.push("invalid_arguments".to_string());
                }
            }

            if subgoal.description.split_whitespace().count() < 2 {
                feasibility -= 0.2;
                risks.push("underspecified".to_string());
            }
            feasibility -= 0.05 * i as f64;

            let dependents = subgoals
                .iter()
                .filter(|other| other.depends_on.contains(&subgoal.id))
                .count();

            risks.sort();
            risks.dedup();
            ScoredSubgoal {
                subgoal: subgoal.clone(),
                feasibility: feasibility.clamp(0.0, 1.0),
                priority: (n - i + dependents) as i64,
                risks,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{CalculateTool, ToolCall};
    use serde_json::json;

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(CalculateTool).unwrap();
        r
    }

    #[test]
    fn test_valid_tool_raises_feasibility() {
        let sub = Subgoal::new(1, "Evaluate 2 + 2")
            .with_tool(ToolCall::new("calculate", json!({"expression": "2 + 2"})));
        let scored = reflect(&[sub], &registry());
        assert!((scored[0].feasibility - 0.95).abs() < 1e-9);
        assert!(scored[0].risks.is_empty());
    }

    #[test]
    fn test_unknown_tool_and_invalid_args_are_risks() {
        let subs = vec![
            Subgoal::new(1, "do magic").with_tool(ToolCall::new("wand", json!({}))),
            Subgoal::new(2, "compute it").with_tool(ToolCall::new("calculate", json!({}))),
        ];
        let scored = reflect(&subs, &registry());
        assert_eq!(scored[0].risks, vec!["unknown_tool:wand"]);
        assert_eq!(scored[1].risks, vec!["invalid_arguments"]);
        assert!(scored[1].feasibility < BASE_FEASIBILITY);
    }

    #[test]
    fn test_priority_counts_dependents() {
        let subs = vec![
            Subgoal::new(1, "first step"),
            Subgoal::new(2, "second step"),
            Subgoal::new(3, "third step").after(&[1]),
        ];
        let scored = reflect(&subs, &registry());
        let priorities: Vec<i64> = scored.iter().map(|s| s.priority).collect();
        assert_eq!(priorities, vec![4, 2, 1]);
    }

    #[test]
    fn test_feasibility_stays_in_unit_range() {
        let subs: Vec<Subgoal> = (1..=30).map(|i| Subgoal::new(i, "x")).collect();
        for s in reflect(&subs, &registry()) {
            assert!((0.0..=1.0).contains(&s.feasibility));
        }
    }
}
