//! 工具调用子系统：Tool trait、输入 Schema 校验、注册表、执行器与内置工具

pub mod calculate;
pub mod echo;
pub mod executor;
pub mod memory_tools;
pub mod registry;
pub mod schema;
pub mod text_analysis;

use std::sync::Arc;

pub use calculate::{extract_expression, CalculateTool};
pub use echo::EchoTool;
pub use executor::{ToolCall, ToolCallOutcome, ToolExecutor};
pub use memory_tools::{SearchMemoryTool, StoreMemoryTool};
pub use registry::{Tool, ToolAnnotations, ToolRegistry};
pub use schema::{tool_call_schema_json, FieldSpec, FieldType, InputSchema};
pub use text_analysis::{sentiment_of, AnalyzeSentimentTool, ExtractKeywordsTool, Sentiment};

use crate::core::AgentError;
use crate::memory::InteractionMemory;

/// 注册内置的非 artifact 工具
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    memory: Arc<InteractionMemory>,
) -> Result<(), AgentError> {
    registry.register(CalculateTool)?;
    registry.register(AnalyzeSentimentTool)?;
    registry.register(ExtractKeywordsTool)?;
    registry.register(SearchMemoryTool::new(memory.clone()))?;
    registry.register(StoreMemoryTool::new(memory))?;
    registry.register(EchoTool)?;
    Ok(())
}
