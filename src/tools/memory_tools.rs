//! 记忆工具：对进程级 InteractionMemory 的检索与写入

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::memory::InteractionMemory;
use crate::tools::{FieldSpec, InputSchema, Tool, ToolAnnotations};

/// store_memory 写入条目使用的 intent 标记
pub const STORED_NOTE_INTENT: &str = "stored_note";

pub struct SearchMemoryTool {
    memory: Arc<InteractionMemory>,
}

impl SearchMemoryTool {
    pub fn new(memory: Arc<InteractionMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for SearchMemoryTool {
    fn name(&self) -> &str {
        "search_memory"
    }

    fn description(&self) -> &str {
        "Keyword search over recent interactions and stored notes."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .field(FieldSpec::string("query", "Search query").required())
            .field(
                FieldSpec::integer("top_k", "Number of results")
                    .range(1.0, 20.0)
                    .default_value(json!(5)),
            )
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::read_only()
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or_default();
        let top_k = args.get("top_k").and_then(|v| v.as_u64()).unwrap_or(5) as usize;
        let hits = self.memory.search(query, top_k).await;
        Ok(json!({ "results": hits, "total": hits.len() }))
    }
}

pub struct StoreMemoryTool {
    memory: Arc<InteractionMemory>,
}

impl StoreMemoryTool {
    pub fn new(memory: Arc<InteractionMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for StoreMemoryTool {
    fn name(&self) -> &str {
        "store_memory"
    }

    fn description(&self) -> &str {
        "Store a note in memory for later reference."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .field(FieldSpec::string("content", "Content to remember").required())
            .field(FieldSpec::object("metadata", "Optional tags / source"))
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::mutating()
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let content = args.get("content").and_then(|v| v.as_str()).unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AgentError::Validation("content must not be empty".into()));
        }
        self.memory.record(content, STORED_NOTE_INTENT).await;
        Ok(json!({ "stored": true, "memory_size": self.memory.len().await }))
    }
}
