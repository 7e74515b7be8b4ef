//! Memory：检索近期相似交互，然后记录本次请求

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::{AgentError, Flow, Node, SharedContext};
use crate::memory::{Interaction, InteractionMemory, DEFAULT_TOP_K};
use crate::nodes::{interpretation, perception};

pub const NAME: &str = "memory";
/// Synthesis 读取的记忆命中列表
pub const MEMORY_SNAPSHOT_KEY: &str = "memory_snapshot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryResult {
    pub hits: Vec<Interaction>,
    pub recorded: bool,
}

pub struct MemoryQuery {
    query: String,
    intent: String,
}

pub struct MemoryNode {
    memory: Arc<InteractionMemory>,
    enabled: bool,
}

impl MemoryNode {
    pub fn new(memory: Arc<InteractionMemory>, enabled: bool) -> Self {
        Self { memory, enabled }
    }
}

#[async_trait]
impl Node for MemoryNode {
    type Input = MemoryQuery;
    type Output = MemoryResult;

    fn name(&self) -> &'static str {
        NAME
    }

    fn should_run(&self, _ctx: &SharedContext) -> bool {
        self.enabled
    }

    fn prepare(&self, ctx: &SharedContext) -> Result<MemoryQuery, AgentError> {
        let query = ctx
            .get_result(perception::NAME)?
            .get("clean_input")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let intent = ctx
            .get_result(interpretation::NAME)?
            .get("intent")
            .and_then(|v| v.as_str())
            .unwrap_or("conversation")
            .to_string();
        Ok(MemoryQuery { query, intent })
    }

    async fn execute(&self, input: MemoryQuery) -> Result<MemoryResult, AgentError> {
        let hits = self.memory.search(&input.query, DEFAULT_TOP_K).await;
        let recorded = !input.query.is_empty();
        if recorded {
            self.memory.record(input.query, input.intent).await;
        }
        Ok(MemoryResult { hits, recorded })
    }

    fn summarize(&self, output: &MemoryResult) -> Option<String> {
        Some(format!("{} hit(s)", output.hits.len()))
    }

    fn finalize(&self, ctx: &mut SharedContext, output: MemoryResult) -> Result<Flow, AgentError> {
        ctx.set_context(MEMORY_SNAPSHOT_KEY, serde_json::to_value(&output.hits)?);
        ctx.set_result(NAME, serde_json::to_value(output)?)?;
        Ok(Flow::Continue)
    }

    fn fallback(&self, _err: &AgentError) -> serde_json::Value {
        json!({ "hits": [], "recorded": false })
    }
}
