//! Interpretation：意图、任务类型、实体、情感、复杂度与算术表达式

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::artifacts::ArtifactType;
use crate::core::{AgentError, FailurePolicy, Flow, Node, SharedContext};
use crate::nodes::perception::{self, PerceptionResult};
use crate::tools::{extract_expression, sentiment_of};

pub const NAME: &str = "interpretation";

static ENTITY_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretationResult {
    pub intent: String,
    pub task_type: String,
    pub entities: Vec<String>,
    pub sentiment: String,
    pub language: String,
    pub complexity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|w| words.contains(&w))
}

fn detect_intent(lower: &str, p: &PerceptionResult, expression: Option<&str>) -> &'static str {
    if expression.is_some() || contains_any(lower, &["calculate", "compute", "calcule"]) {
        return "calculation";
    }
    if lower.contains("artifact") || lower.contains("artefact") {
        return "artifact_management";
    }
    if p.has_question {
        if contains_any(lower, &["what", "who", "where", "when", "which", "comment", "pourquoi", "quel", "quand", "où"]) {
            return "information_seeking";
        }
        return "question";
    }
    if contains_any(lower, &["search", "find", "lookup"]) {
        return "information_seeking";
    }
    if contains_any(lower, &["create", "write", "generate", "draft", "build", "make", "crée", "génère", "écris"]) {
        return "creation";
    }
    if contains_any(lower, &["analyze", "analyse", "explain", "compare", "review", "summarize", "explique", "détaille"]) {
        return "analysis";
    }
    if p.has_command {
        return "instruction";
    }
    "conversation"
}

fn detect_task_type(lower: &str, intent: &str) -> &'static str {
    match intent {
        "calculation" => "computation",
        "artifact_management" => "artifact_operation",
        "information_seeking" | "question" => "qa",
        "creation" if contains_any(lower, &["code", "function", "script", "program", "fonction", "programme"]) => {
            "code_generation"
        }
        "creation" => "text_generation",
        "analysis" => "reasoning",
        _ => "general",
    }
}

/// 首字母大写的词组（不含句首词）
fn extract_entities(text: &str) -> Vec<String> {
    let re = ENTITY_RE.get_or_init(|| {
        Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b").expect("static entity regex")
    });
    let mut entities: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let sentence_start = text[..m.start()]
            .trim_end()
            .chars()
            .last()
            .map_or(true, |c| matches!(c, '.' | '!' | '?'));
        let value = if sentence_start {
            // 句首词可能只是大写开头，去掉它后剩余部分仍算实体
            match m.as_str().split_once(char::is_whitespace) {
                Some((_, rest)) => rest.trim().to_string(),
                None => continue,
            }
        } else {
            m.as_str().to_string()
        };
        if !entities.contains(&value) {
            entities.push(value);
        }
    }
    entities
}

fn complexity(word_count: usize) -> &'static str {
    if word_count < 10 {
        "simple"
    } else if word_count < 30 {
        "medium"
    } else {
        "complex"
    }
}

pub fn interpret(p: &PerceptionResult) -> InterpretationResult {
    let lower = p.clean_input.to_lowercase();
    let expression = extract_expression(&p.clean_input);
    let intent = detect_intent(&lower, p, expression.as_deref());
    let artifact_type = (intent == "artifact_management")
        .then(|| {
            ArtifactType::ALL
                .iter()
                .find(|t| contains_any(&lower, &[t.as_str()]))
                .map(|t| t.as_str().to_string())
        })
        .flatten();

    InterpretationResult {
        intent: intent.to_string(),
        task_type: detect_task_type(&lower, intent).to_string(),
        entities: extract_entities(&p.clean_input),
        sentiment: sentiment_of(&p.clean_input).label.to_string(),
        language: p.language.clone(),
        complexity: complexity(p.word_count).to_string(),
        expression,
        artifact_type,
    }
}

pub struct InterpretationNode;

#[async_trait]
impl Node for InterpretationNode {
    type Input = PerceptionResult;
    type Output = InterpretationResult;

    fn name(&self) -> &'static str {
        NAME
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::Fatal
    }

    fn prepare(&self, ctx: &SharedContext) -> Result<PerceptionResult, AgentError> {
        ctx.get_result_as(perception::NAME)
    }

    async fn execute(&self, input: PerceptionResult) -> Result<InterpretationResult, AgentError> {
        Ok(interpret(&input))
    }

    fn summarize(&self, output: &InterpretationResult) -> Option<String> {
        Some(format!("intent={} complexity={}", output.intent, output.complexity))
    }

    fn finalize(&self, ctx: &mut SharedContext, output: InterpretationResult) -> Result<Flow, AgentError> {
        ctx.set_result(NAME, serde_json::to_value(output)?)?;
        Ok(Flow::Continue)
    }
}
