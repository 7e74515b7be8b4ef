//! 单次请求的共享状态：输入、各节点结果与执行 Trace
//!
//! 一个 SharedContext 只服务一个请求，由 Orchestrator 独占持有（&mut），内部不加锁。
//! results 每个键只能写一次；trace 只追加，顺序即实际执行顺序。

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::core::{AgentError, StreamSink};

/// 用户输入在 inputs 中的键
pub const USER_INPUT_KEY: &str = "user_input";
/// 致命失败时 Orchestrator 写入的兜底回复键
pub const FALLBACK_ANSWER_KEY: &str = "fallback_answer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
    Skipped,
}

/// Trace 中的一条记录：某个节点的一次执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub node: String,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// 失败发生在哪个阶段（prepare / execute / finalize）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_summary: Option<String>,
    /// 失败且节点策略为 fatal
    #[serde(default)]
    pub fatal: bool,
}

impl TraceEntry {
    fn base(node: &str, outcome: Outcome, started_at: DateTime<Utc>) -> Self {
        let ended_at = Utc::now();
        Self {
            node: node.to_string(),
            outcome,
            started_at,
            ended_at,
            duration_ms: (ended_at - started_at).num_milliseconds().max(0) as u64,
            error_class: None,
            error_message: None,
            failed_phase: None,
            output_summary: None,
            fatal: false,
        }
    }

    pub fn success(node: &str, started_at: DateTime<Utc>, summary: Option<String>) -> Self {
        Self {
            output_summary: summary,
            ..Self::base(node, Outcome::Success, started_at)
        }
    }

    pub fn error(
        node: &str,
        started_at: DateTime<Utc>,
        phase: &str,
        err: &AgentError,
        fatal: bool,
    ) -> Self {
        Self {
            error_class: Some(err.class().to_string()),
            error_message: Some(err.to_string()),
            failed_phase: Some(phase.to_string()),
            fatal,
            ..Self::base(node, Outcome::Error, started_at)
        }
    }

    pub fn skipped(node: &str, reason: &str) -> Self {
        Self {
            output_summary: Some(reason.to_string()),
            ..Self::base(node, Outcome::Skipped, Utc::now())
        }
    }
}

/// 请求整体状态：存在 fatal 记录即为 Failed；被取消为 Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    Cancelled,
}

/// 单请求共享状态
#[derive(Debug)]
pub struct SharedContext {
    flow_id: String,
    started_at: DateTime<Utc>,
    inputs: IndexMap<String, Value>,
    results: IndexMap<String, Value>,
    trace: Vec<TraceEntry>,
    stream: Option<StreamSink>,
    cancelled: bool,
}

impl Default for SharedContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedContext {
    pub fn new() -> Self {
        Self {
            flow_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            inputs: IndexMap::new(),
            results: IndexMap::new(),
            trace: Vec::new(),
            stream: None,
            cancelled: false,
        }
    }

    pub fn with_input(text: impl Into<String>) -> Self {
        let mut ctx = Self::new();
        ctx.set_context(USER_INPUT_KEY, Value::String(text.into()));
        ctx
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0) as u64
    }

    // ---- inputs ----

    pub fn set_context(&mut self, key: impl Into<String>, value: Value) {
        self.inputs.insert(key.into(), value);
    }

    pub fn update_context(&mut self, entries: impl IntoIterator<Item = (String, Value)>) {
        self.inputs.extend(entries);
    }

    /// 键不存在返回 NotFound
    pub fn get_context(&self, key: &str) -> Result<&Value, AgentError> {
        self.inputs
            .get(key)
            .ok_or_else(|| AgentError::NotFound(format!("context key '{key}'")))
    }

    pub fn get_context_or(&self, key: &str, default: Value) -> Value {
        self.inputs.get(key).cloned().unwrap_or(default)
    }

    // ---- results ----

    /// 每个节点只能写一次
    pub fn set_result(&mut self, node: &str, value: Value) -> Result<(), AgentError> {
        if self.results.contains_key(node) {
            return Err(AgentError::DuplicateName(format!("result for node '{node}'")));
        }
        self.results.insert(node.to_string(), value);
        Ok(())
    }

    pub fn get_result(&self, node: &str) -> Result<&Value, AgentError> {
        self.results
            .get(node)
            .ok_or_else(|| AgentError::NotFound(format!("result of node '{node}'")))
    }

    pub fn has_result(&self, node: &str) -> bool {
        self.results.contains_key(node)
    }

    /// 读取并反序列化节点结果（结果为 null 时视为缺失）
    pub fn get_result_as<T: DeserializeOwned>(&self, node: &str) -> Result<T, AgentError> {
        match self.get_result(node)? {
            Value::Null => Err(AgentError::NotFound(format!("result of node '{node}'"))),
            value => serde_json::from_value(value.clone()).map_err(|e| {
                AgentError::Validation(format!("result of node '{node}' has unexpected shape: {e}"))
            }),
        }
    }

    // ---- trace ----

    pub fn add_trace(&mut self, entry: TraceEntry) {
        self.trace.push(entry);
    }

    pub fn get_trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn failed_nodes(&self) -> Vec<String> {
        self.trace
            .iter()
            .filter(|e| e.outcome == Outcome::Error)
            .map(|e| e.node.clone())
            .collect()
    }

    pub fn status(&self) -> RunStatus {
        if self.trace.iter().any(|e| e.fatal) {
            RunStatus::Failed
        } else if self.cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Success
        }
    }

    // ---- streaming / cancellation ----

    pub fn attach_stream(&mut self, sink: StreamSink) {
        self.stream = Some(sink);
    }

    pub fn stream(&self) -> Option<&StreamSink> {
        self.stream.as_ref()
    }

    pub(crate) fn detach_stream(&mut self) -> Option<StreamSink> {
        self.stream.take()
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    // ---- 汇总 ----

    /// 最终回复：Action 的 final，否则致命失败时的兜底回复
    pub fn answer(&self) -> Option<String> {
        self.results
            .get("action")
            .and_then(|v| v.get("final"))
            .and_then(|v| v.as_str())
            .or_else(|| self.inputs.get(FALLBACK_ANSWER_KEY).and_then(|v| v.as_str()))
            .map(str::to_string)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "flow_id": self.flow_id,
            "started_at": self.started_at,
            "status": self.status(),
            "context": self.inputs,
            "results": self.results,
            "trace": self.trace,
        })
    }
}
