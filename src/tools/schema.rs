//! 工具输入 Schema 与校验
//!
//! 每个工具声明 InputSchema（字段名 → 类型 / 是否必填 / 数值范围 / 枚举值）；
//! ToolExecutor 在调用 handler 之前用它校验参数，不合法即返回 Validation，handler 不会被执行。
//! 同一份声明渲染为 JSON Schema，既注入 LLM 的 system prompt，也供外部枚举工具。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde_json::{json, Map, Value};

use crate::core::AgentError;

/// 字段类型（JSON Schema 的基本类型）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }
}

/// 单个字段的约束
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub description: String,
    pub required: bool,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub allowed: Vec<String>,
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn new(name: &str, field_type: FieldType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            description: description.to_string(),
            required: false,
            minimum: None,
            maximum: None,
            allowed: Vec::new(),
            default: None,
        }
    }

    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, FieldType::String, description)
    }

    pub fn integer(name: &str, description: &str) -> Self {
        Self::new(name, FieldType::Integer, description)
    }

    pub fn object(name: &str, description: &str) -> Self {
        Self::new(name, FieldType::Object, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.minimum = Some(min);
        self.maximum = Some(max);
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    fn check(&self, value: &Value) -> Result<(), String> {
        if !self.field_type.matches(value) {
            return Err(format!(
                "field '{}' must be of type {}",
                self.name,
                self.field_type.as_str()
            ));
        }
        if let Some(n) = value.as_f64() {
            if let Some(min) = self.minimum.filter(|min| n < *min) {
                return Err(format!("field '{}' must be >= {}", self.name, min));
            }
            if let Some(max) = self.maximum.filter(|max| n > *max) {
                return Err(format!("field '{}' must be <= {}", self.name, max));
            }
        }
        if !self.allowed.is_empty() {
            let s = value.as_str().unwrap_or_default();
            if !self.allowed.iter().any(|a| a == s) {
                return Err(format!(
                    "field '{}' must be one of [{}]",
                    self.name,
                    self.allowed.join(", ")
                ));
            }
        }
        Ok(())
    }

    fn to_json(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(self.field_type.as_str()));
        prop.insert("description".into(), json!(self.description));
        if let Some(min) = self.minimum {
            prop.insert("minimum".into(), json!(min));
        }
        if let Some(max) = self.maximum {
            prop.insert("maximum".into(), json!(max));
        }
        if !self.allowed.is_empty() {
            prop.insert("enum".into(), json!(self.allowed));
        }
        if let Some(default) = &self.default {
            prop.insert("default".into(), default.clone());
        }
        Value::Object(prop)
    }
}

/// 工具输入 Schema：有序字段列表
#[derive(Debug, Clone, Default)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// 校验参数：必须是 JSON 对象；必填字段存在且非 null；类型、范围、枚举满足约束。
    /// 未声明的字段忽略。
    pub fn validate(&self, args: &Value) -> Result<(), AgentError> {
        let obj = match args {
            Value::Object(obj) => obj,
            Value::Null if self.fields.iter().all(|f| !f.required) => return Ok(()),
            other => {
                return Err(AgentError::Validation(format!(
                    "arguments must be a JSON object, got {}",
                    type_name(other)
                )))
            }
        };
        for spec in &self.fields {
            match obj.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(AgentError::Validation(format!(
                        "missing required field '{}'",
                        spec.name
                    )))
                }
                None | Some(Value::Null) => {}
                Some(value) => spec.check(value).map_err(AgentError::Validation)?,
            }
        }
        Ok(())
    }

    /// 渲染为 JSON Schema 对象：{"type": "object", "properties": {...}, "required": [...]}
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.to_json()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 模型输出的工具调用格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，如 calculate、create_artifact、list_artifacts
    pub tool: String,
    /// 工具参数，必须满足该工具的 parameters schema
    pub arguments: HashMap<String, Value>,
}

/// 返回工具调用的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InputSchema {
        InputSchema::new()
            .field(FieldSpec::string("text", "input text").required())
            .field(FieldSpec::integer("limit", "max results").range(1.0, 50.0))
            .field(FieldSpec::string("kind", "kind").one_of(&["code", "data"]))
    }

    #[test]
    fn test_validate_accepts_valid_args() {
        assert!(sample()
            .validate(&json!({"text": "hi", "limit": 5, "kind": "code"}))
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_required() {
        let err = sample().validate(&json!({"limit": 5})).unwrap_err();
        assert_eq!(err.class(), "ValidationError");
    }

    #[test]
    fn test_validate_rejects_wrong_type_range_and_enum() {
        let schema = sample();
        assert!(schema.validate(&json!({"text": 3})).is_err());
        assert!(schema.validate(&json!({"text": "a", "limit": 0})).is_err());
        assert!(schema.validate(&json!({"text": "a", "limit": 2.5})).is_err());
        assert!(schema.validate(&json!({"text": "a", "kind": "video"})).is_err());
        assert!(schema.validate(&json!(["text"])).is_err());
    }

    #[test]
    fn test_json_schema_lists_required_fields() {
        let schema = sample().to_json_schema();
        assert_eq!(schema["required"], json!(["text"]));
        assert_eq!(schema["properties"]["limit"]["maximum"], json!(50.0));
        assert_eq!(schema["properties"]["kind"]["enum"], json!(["code", "data"]));
    }

    #[test]
    fn test_tool_call_schema_mentions_fields() {
        let s = tool_call_schema_json();
        assert!(s.contains("\"tool\""));
        assert!(s.contains("\"arguments\""));
    }
}
