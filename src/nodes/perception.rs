//! Perception：规整原始输入并提取表层特征

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{AgentError, FailurePolicy, Flow, Node, SharedContext, USER_INPUT_KEY};

pub const NAME: &str = "perception";

const COMMAND_WORDS: &[&str] = &[
    "create", "write", "generate", "make", "build", "list", "show", "delete", "remove", "update",
    "analyze", "analyse", "explain", "calculate", "compute", "store", "remember", "find", "search",
    "summarize", "draft", "crée", "génère", "écris", "analyse", "explique", "calcule",
];

const QUESTION_WORDS: &[&str] = &[
    "what", "why", "how", "when", "where", "who", "which", "is", "are", "can", "could", "does",
    "do", "comment", "pourquoi", "quel", "quelle", "quand", "où",
];

const FRENCH_MARKERS: &[&str] = &[
    "le", "la", "les", "est", "bonjour", "merci", "pourquoi", "comment", "une", "des", "je", "vous",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionResult {
    pub raw_input: String,
    pub clean_input: String,
    pub char_count: usize,
    pub word_count: usize,
    pub has_question: bool,
    pub has_command: bool,
    pub language: String,
}

pub struct PerceptionNode {
    max_input_chars: usize,
}

impl PerceptionNode {
    pub fn new(max_input_chars: usize) -> Self {
        Self { max_input_chars }
    }
}

/// 粗略语言判断：含 CJK 字符为 zh，法语常用词为 fr，其余 en
pub fn guess_language(text: &str) -> &'static str {
    if text.trim().is_empty() {
        return "unknown";
    }
    if text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c)) {
        return "zh";
    }
    let french = text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| FRENCH_MARKERS.contains(&w.as_str()))
        .count();
    let accented = text.chars().any(|c| "éèêàçùô".contains(c));
    if french >= 2 || (french >= 1 && accented) {
        "fr"
    } else {
        "en"
    }
}

pub fn perceive(raw: &str) -> PerceptionResult {
    let clean = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let first_word = clean
        .split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .unwrap_or_default();

    PerceptionResult {
        raw_input: raw.to_string(),
        char_count: clean.chars().count(),
        word_count: clean.split_whitespace().count(),
        has_question: clean.contains('?') || QUESTION_WORDS.contains(&first_word.as_str()),
        has_command: COMMAND_WORDS.contains(&first_word.as_str()),
        language: guess_language(&clean).to_string(),
        clean_input: clean,
    }
}

#[async_trait]
impl Node for PerceptionNode {
    type Input = String;
    type Output = PerceptionResult;

    fn name(&self) -> &'static str {
        NAME
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::Fatal
    }

    fn prepare(&self, ctx: &SharedContext) -> Result<String, AgentError> {
        let text = match ctx.get_context(USER_INPUT_KEY)? {
            Value::String(s) => s.clone(),
            other => {
                return Err(AgentError::Validation(format!(
                    "user_input must be text, got {}",
                    json_kind(other)
                )))
            }
        };
        let chars = text.chars().count();
        if chars > self.max_input_chars {
            return Err(AgentError::Validation(format!(
                "user_input has {chars} chars, limit is {}",
                self.max_input_chars
            )));
        }
        Ok(text)
    }

    async fn execute(&self, input: String) -> Result<PerceptionResult, AgentError> {
        Ok(perceive(&input))
    }

    fn summarize(&self, output: &PerceptionResult) -> Option<String> {
        Some(format!(
            "{} words, language={}",
            output.word_count, output.language
        ))
    }

    fn finalize(&self, ctx: &mut SharedContext, output: PerceptionResult) -> Result<Flow, AgentError> {
        ctx.set_result(NAME, serde_json::to_value(output)?)?;
        Ok(Flow::Continue)
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
