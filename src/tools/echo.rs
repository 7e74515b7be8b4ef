//! Echo 工具（测试与连通性检查用）

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::tools::{FieldSpec, InputSchema, Tool, ToolAnnotations};

/// Echo 工具：原样回显文本
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text back unchanged (for testing)."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().field(FieldSpec::string("text", "Text to echo").required())
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::read_only()
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let text = args.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(json!({ "echo": text }))
    }
}
