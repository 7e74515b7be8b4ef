//! R1 分解：规则优先，必要时请求 LLM
//!
//! 规则依次匹配：空输入 → 澄清；算术表达式 → calculate + 汇报；artifact 查询 → 对应工具；
//! "then" / ";" 分隔的多步指令 → 顺序依赖；simple 任务 → 单一子目标；
//! 其余交给 LLM 输出 {"steps": [...]}。结果至少包含 1 个子目标。

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::rrla::{RrlaConfig, Subgoal, TaskContext};
use crate::tools::ToolCall;

const DECOMPOSE_SYSTEM: &str = "You break a user request into a short ordered list of steps. \
Reply with ONLY a JSON object: {\"steps\": [{\"id\": 1, \"action\": \"...\", \"depends_on\": [], \
\"tool\": null, \"arguments\": {}}]}. Use \"tool\" only when a step needs one of the listed tools.";

pub async fn decompose(
    task: &TaskContext,
    llm: &dyn LlmClient,
    cfg: &RrlaConfig,
) -> Result<Vec<Subgoal>, AgentError> {
    let mut subgoals = match rule_based(task) {
        Some(subgoals) => subgoals,
        None if cfg.llm_decomposition => llm_decompose(task, llm).await?,
        None => vec![whole_input(task)],
    };
    if subgoals.is_empty() {
        subgoals.push(whole_input(task));
    }
    Ok(truncate(subgoals, cfg.max_subgoals))
}

fn whole_input(task: &TaskContext) -> Subgoal {
    Subgoal::new(1, format!("Respond to: {}", task.input.trim()))
}

fn rule_based(task: &TaskContext) -> Option<Vec<Subgoal>> {
    let input = task.input.trim();
    if input.is_empty() {
        return Some(vec![Subgoal::new(1, "Ask the user what they need")]);
    }

    if let Some(expr) = &task.expression {
        return Some(vec![
            Subgoal::new(1, format!("Evaluate {expr}"))
                .with_tool(ToolCall::new("calculate", json!({ "expression": expr }))),
            Subgoal::new(2, "Report the computed result").after(&[1]),
        ]);
    }

    if task.intent == "artifact_management" {
        if let Some(subgoals) = artifact_rule(task) {
            return Some(subgoals);
        }
    }

    let parts = split_steps(input);
    if parts.len() > 1 {
        return Some(
            parts
                .into_iter()
                .enumerate()
                .map(|(i, part)| {
                    let s = Subgoal::new(i + 1, part);
                    if i == 0 {
                        s
                    } else {
                        s.after(&[i])
                    }
                })
                .collect(),
        );
    }

    if task.complexity == "simple" {
        return Some(vec![whole_input(task)]);
    }
    None
}

fn artifact_rule(task: &TaskContext) -> Option<Vec<Subgoal>> {
    let lower = task.input.to_lowercase();
    if lower.contains("stat") {
        return Some(vec![
            Subgoal::new(1, "Collect artifact store statistics")
                .with_tool(ToolCall::new("artifact_stats", json!({}))),
            Subgoal::new(2, "Summarize the statistics").after(&[1]),
        ]);
    }
    if lower.contains("list") || lower.contains("show") {
        let mut args = Map::new();
        if let Some(t) = &task.artifact_type {
            args.insert("type_filter".into(), Value::String(t.clone()));
        }
        return Some(vec![
            Subgoal::new(1, "List stored artifacts")
                .with_tool(ToolCall::new("list_artifacts", Value::Object(args))),
            Subgoal::new(2, "Present the artifacts").after(&[1]),
        ]);
    }
    None
}

fn split_steps(input: &str) -> Vec<String> {
    input
        .split(';')
        .flat_map(|chunk| chunk.split(" then "))
        .map(|s| s.trim().trim_start_matches("and ").trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Deserialize)]
struct RawPlan {
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Deserialize)]
struct RawStep {
    id: Option<usize>,
    #[serde(alias = "description")]
    action: String,
    #[serde(default)]
    depends_on: Vec<usize>,
    tool: Option<String>,
    arguments: Option<Value>,
}

async fn llm_decompose(task: &TaskContext, llm: &dyn LlmClient) -> Result<Vec<Subgoal>, AgentError> {
    let prompt = format!(
        "Request: {}\nIntent: {}\nTask type: {}",
        task.input.trim(),
        task.intent,
        task.task_type
    );
    let output = llm
        .complete(&[Message::system(DECOMPOSE_SYSTEM), Message::user(prompt)])
        .await?;

    match parse_steps(&output) {
        Some(subgoals) if !subgoals.is_empty() => Ok(subgoals),
        _ => {
            tracing::warn!("decomposition reply unusable, treating input as one subgoal");
            Ok(vec![whole_input(task)])
        }
    }
}

/// 解析 LLM 的步骤 JSON，重新编号为 1..n；丢弃指向不存在或自身的依赖
pub(crate) fn parse_steps(output: &str) -> Option<Vec<Subgoal>> {
    let start = output.find('{')?;
    let end = output.rfind('}')?;
    if end <= start {
        return None;
    }
    let raw: RawPlan = serde_json::from_str(&output[start..=end]).ok()?;
    let steps: Vec<RawStep> = raw
        .steps
        .into_iter()
        .filter(|s| !s.action.trim().is_empty())
        .collect();

    // 原 id -> 新 id
    let renumber: Vec<(usize, usize)> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.unwrap_or(i + 1), i + 1))
        .collect();
    let map_id = |old: usize| renumber.iter().find(|(o, _)| *o == old).map(|(_, n)| *n);

    let subgoals = steps
        .into_iter()
        .enumerate()
        .map(|(i, step)| {
            let id = i + 1;
            let mut deps: Vec<usize> = step
                .depends_on
                .iter()
                .filter_map(|d| map_id(*d))
                .filter(|d| *d != id)
                .collect();
            deps.sort_unstable();
            deps.dedup();
            let tool_hint = step.tool.filter(|t| !t.is_empty()).map(|t| {
                ToolCall::new(t, step.arguments.unwrap_or_else(|| json!({})))
            });
            Subgoal {
                id,
                description: step.action.trim().to_string(),
                depends_on: deps,
                tool_hint,
            }
        })
        .collect();
    Some(subgoals)
}

fn truncate(mut subgoals: Vec<Subgoal>, max: usize) -> Vec<Subgoal> {
    if subgoals.len() > max {
        tracing::debug!(dropped = subgoals.len() - max, "truncating subgoals");
        subgoals.truncate(max);
        for s in &mut subgoals {
            s.depends_on.retain(|d| *d <= max);
        }
    }
    subgoals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};

    fn task(input: &str, complexity: &str) -> TaskContext {
        TaskContext {
            input: input.into(),
            intent: "instruction".into(),
            task_type: "general".into(),
            complexity: complexity.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_input_yields_one_subgoal() {
        let llm = MockLlmClient::new();
        for input in ["", "   "] {
            let subgoals = decompose(&task(input, "simple"), &llm, &RrlaConfig::default())
                .await
                .unwrap();
            assert_eq!(subgoals.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_unintelligible_llm_reply_falls_back_to_whole_input() {
        let llm = MockLlmClient::new().push_text("I cannot do JSON today");
        let input = "zzkx qwpl vrrt mnbv ... ".repeat(3);
        let subgoals = decompose(&task(&input, "medium"), &llm, &RrlaConfig::default())
            .await
            .unwrap();
        assert_eq!(subgoals.len(), 1);
        assert!(subgoals[0].description.starts_with("Respond to"));
    }

    #[tokio::test]
    async fn test_llm_error_propagates() {
        let llm = MockLlmClient::new().push_error(LlmError::Timeout { secs: 1 });
        let err = decompose(&task("a b c d e f g h i j k l", "medium"), &llm, &RrlaConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.class(), "Timeout");
    }

    #[tokio::test]
    async fn test_then_splits_into_sequential_steps() {
        let llm = MockLlmClient::new();
        let subgoals = decompose(
            &task("draft the outline then write the intro; and review it", "medium"),
            &llm,
            &RrlaConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(subgoals.len(), 3);
        assert_eq!(subgoals[2].description, "review it");
        assert_eq!(subgoals[2].depends_on, vec![2]);
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn test_parse_steps_renumbers_and_drops_bad_deps() {
        let out = r#"Sure: {"steps": [
            {"id": 10, "action": "gather data", "depends_on": [10]},
            {"id": 20, "action": "analyse", "depends_on": [10, 99], "tool": "extract_keywords", "arguments": {"text": "x"}}
        ]}"#;
        let subgoals = parse_steps(out).unwrap();
        assert_eq!(subgoals[0].id, 1);
        assert!(subgoals[0].depends_on.is_empty());
        assert_eq!(subgoals[1].depends_on, vec![1]);
        assert_eq!(subgoals[1].tool_hint.as_ref().unwrap().tool, "extract_keywords");
    }

    #[test]
    fn test_truncate_drops_dangling_deps() {
        let subgoals = (1..=4).map(|i| Subgoal::new(i, "s").after(&[4])).collect();
        let kept = truncate(subgoals, 2);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|s| s.depends_on.is_empty()));
    }

    #[test]
    fn test_artifact_listing_with_type_filter() {
        let mut t = task("list my code artifacts", "simple");
        t.intent = "artifact_management".into();
        t.artifact_type = Some("code".into());
        let subgoals = rule_based(&t).unwrap();
        let hint = subgoals[0].tool_hint.as_ref().unwrap();
        assert_eq!(hint.tool, "list_artifacts");
        assert_eq!(hint.arguments["type_filter"], "code");
    }
}
