//! 文本分析：关键词情感打分与高频关键词提取
//!
//! 规则实现，无外部模型；Interpretation 节点复用 sentiment_of 给出请求情感。

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::tools::{FieldSpec, InputSchema, Tool, ToolAnnotations};

const POSITIVE_WORDS: &[&str] = &[
    "thanks", "thank", "great", "excellent", "awesome", "perfect", "good", "love", "nice",
    "merci", "super", "génial", "parfait", "bien",
];

const NEGATIVE_WORDS: &[&str] = &[
    "problem", "error", "bug", "bad", "broken", "wrong", "hate", "fail", "terrible",
    "problème", "erreur", "mauvais", "nul",
];

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "have", "has",
    "you", "your", "what", "which", "when", "where", "who", "how", "why", "into", "about",
    "then", "than", "them", "they", "their", "there", "will", "would", "could", "should",
    "can", "not", "but", "all", "any", "its", "our", "out", "please", "les", "des", "une",
    "pour", "dans", "avec", "est", "que", "qui",
];

/// 情感分析结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sentiment {
    pub label: &'static str,
    /// (pos - neg) / (pos + neg)，无情感词时为 0
    pub score: f64,
    pub positive_hits: usize,
    pub negative_hits: usize,
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

pub fn sentiment_of(text: &str) -> Sentiment {
    let (mut pos, mut neg) = (0usize, 0usize);
    for w in words(text) {
        if POSITIVE_WORDS.contains(&w.as_str()) {
            pos += 1;
        } else if NEGATIVE_WORDS.contains(&w.as_str()) {
            neg += 1;
        }
    }
    let label = match pos.cmp(&neg) {
        std::cmp::Ordering::Greater => "positive",
        std::cmp::Ordering::Less => "negative",
        std::cmp::Ordering::Equal => "neutral",
    };
    let total = pos + neg;
    let score = if total == 0 {
        0.0
    } else {
        (pos as f64 - neg as f64) / total as f64
    };
    Sentiment {
        label,
        score,
        positive_hits: pos,
        negative_hits: neg,
    }
}

/// 按词频降序提取关键词（长度 ≥ 3、非停用词、非纯数字）；同频按首次出现顺序
pub fn extract_keywords(text: &str, max_keywords: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (idx, w) in words(text).enumerate() {
        if w.chars().count() < 3
            || STOPWORDS.contains(&w.as_str())
            || w.chars().all(|c| c.is_ascii_digit())
        {
            continue;
        }
        let entry = counts.entry(w).or_insert((0, idx));
        entry.0 += 1;
    }
    let mut ranked: Vec<(String, usize, usize)> =
        counts.into_iter().map(|(w, (n, first))| (w, n, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(max_keywords)
        .map(|(w, n, _)| (w, n))
        .collect()
}

pub struct AnalyzeSentimentTool;

#[async_trait]
impl Tool for AnalyzeSentimentTool {
    fn name(&self) -> &str {
        "analyze_sentiment"
    }

    fn description(&self) -> &str {
        "Classify the sentiment of a text as positive, negative or neutral."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().field(FieldSpec::string("text", "Text to analyse").required())
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::read_only()
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let text = args.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(serde_json::to_value(sentiment_of(text))?)
    }
}

pub struct ExtractKeywordsTool;

#[async_trait]
impl Tool for ExtractKeywordsTool {
    fn name(&self) -> &str {
        "extract_keywords"
    }

    fn description(&self) -> &str {
        "Extract the most frequent meaningful keywords from a text."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .field(FieldSpec::string("text", "Text to analyse").required())
            .field(
                FieldSpec::integer("max_keywords", "Maximum number of keywords")
                    .range(1.0, 50.0)
                    .default_value(json!(10)),
            )
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::read_only()
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let text = args.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        let max = args
            .get("max_keywords")
            .and_then(|v| v.as_u64())
            .unwrap_or(10) as usize;
        let keywords: Vec<Value> = extract_keywords(text, max)
            .into_iter()
            .map(|(word, count)| json!({ "keyword": word, "count": count }))
            .collect();
        Ok(json!({ "keywords": keywords }))
    }
}
