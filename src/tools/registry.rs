//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / input_schema / execute），由 ToolRegistry 按名注册。
//! 注册顺序即 list() / schemas() 的顺序；重名注册返回 DuplicateName，先注册者保持可用。
//! 启动后只读，以 Arc<ToolRegistry> 在并发请求间共享。

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::tools::InputSchema;

/// 提示性注解（只读 / 破坏性 / 幂等），不做强制
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ToolAnnotations {
    pub read_only: bool,
    pub destructive: bool,
    pub idempotent: bool,
}

impl ToolAnnotations {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            destructive: false,
            idempotent: true,
        }
    }

    pub fn mutating() -> Self {
        Self::default()
    }

    pub fn destructive() -> Self {
        Self {
            read_only: false,
            destructive: true,
            idempotent: false,
        }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、输入 schema、异步执行（args 为已校验的 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于调用 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 默认无参数
    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::default()
    }

    /// schema 之外的参数检查（如路径约束）；在 execute 之前调用，失败即 Validation
    fn check_args(&self, _args: &Value) -> Result<(), AgentError> {
        Ok(())
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError>;
}

/// 工具注册表：按注册顺序存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), AgentError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AgentError::DuplicateName(name));
        }
        tracing::debug!(tool = %name, "tool registered");
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// 按注册顺序返回全部工具
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 按名校验参数（工具不存在返回 NotFound）
    pub fn validate(&self, name: &str, args: &Value) -> Result<(), AgentError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AgentError::NotFound(format!("tool '{name}'")))?;
        tool.input_schema().validate(args)?;
        tool.check_args(args)
    }

    /// 结构化 schema 导出：供 LLM function calling 与外部枚举
    pub fn schemas(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "parameters": tool.input_schema().to_json_schema(),
                    "annotations": tool.annotations(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EchoTool, FieldSpec};

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "impostor"
        }
        fn input_schema(&self) -> InputSchema {
            InputSchema::new().field(FieldSpec::string("text", "t").required())
        }
        async fn execute(&self, args: Value) -> Result<Value, AgentError> {
            Ok(json!(args["text"].as_str().unwrap_or_default().to_uppercase()))
        }
    }

    #[test]
    fn test_duplicate_name_is_rejected_and_first_kept() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        let err = registry.register(Upper).unwrap_err();
        assert_eq!(err, AgentError::DuplicateName("echo".to_string()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("echo").unwrap().description(), EchoTool.description());
    }

    #[test]
    fn test_schemas_follow_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0]["name"], "echo");
        assert_eq!(schemas[0]["parameters"]["type"], "object");
        assert_eq!(schemas[0]["annotations"]["read_only"], true);
    }

    #[test]
    fn test_validate_unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let err = registry.validate("nope", &json!({})).unwrap_err();
        assert_eq!(err.class(), "NotFound");
    }
}
