//! 工具执行器（Dispatcher）
//!
//! 持有只读的 ToolRegistry 与单次调用超时。execute(name, args) 依次：查找工具（NotFound）→
//! 按 InputSchema 校验（Validation，handler 不会执行）→ 在超时内调用 handler；
//! handler 返回的任何错误统一包装为 ToolExecution { tool, message }。
//! 每次调用输出一条结构化审计日志（JSON）。调度本身从不自动重试。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{Tool, ToolRegistry};

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// 一次工具调用请求（模型输出或 Reasoning 决策）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(alias = "args", default = "empty_object")]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }
}

/// 结构化调用结果：{success, result | error}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    pub tool: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
}

impl ToolCallOutcome {
    fn from_result(tool: &str, result: Result<Value, AgentError>) -> Self {
        match result {
            Ok(value) => Self {
                tool: tool.to_string(),
                success: true,
                result: Some(value),
                error: None,
                error_class: None,
            },
            Err(e) => Self {
                tool: tool.to_string(),
                success: false,
                result: None,
                error: Some(e.to_string()),
                error_class: Some(e.class().to_string()),
            },
        }
    }
}

/// 工具执行器：校验 + 超时 + 错误统一包装
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// 执行指定工具；以结构化字段输出审计日志
    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<Value, AgentError> {
        let start = Instant::now();
        let preview = args_preview(&args);

        let result = self.dispatch(tool_name, args).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(AgentError::Validation(_)) => "invalid",
            Err(AgentError::NotFound(_)) => "unknown_tool",
            Err(AgentError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        tracing::info!(
            event = "tool_audit",
            tool = tool_name,
            ok = result.is_ok(),
            outcome,
            duration_ms = start.elapsed().as_millis() as u64,
            args_preview = %preview,
            "tool"
        );

        result
    }

    async fn dispatch(&self, tool_name: &str, args: Value) -> Result<Value, AgentError> {
        let tool: Arc<dyn Tool> = self
            .registry
            .get(tool_name)
            .ok_or_else(|| AgentError::NotFound(format!("tool '{tool_name}'")))?;
        tool.input_schema().validate(&args)?;
        tool.check_args(&args)?;

        match timeout(self.timeout, tool.execute(args)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AgentError::ToolExecution {
                tool: tool_name.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(AgentError::Timeout(format!(
                "tool '{tool_name}' exceeded {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    /// 执行并返回结构化结果（从不返回 Err）
    pub async fn call(&self, call: &ToolCall) -> ToolCallOutcome {
        let result = self.execute(&call.tool, call.arguments.clone()).await;
        ToolCallOutcome::from_result(&call.tool, result)
    }

    /// 按给定顺序依次执行
    pub async fn call_all(&self, calls: &[ToolCall]) -> Vec<ToolCallOutcome> {
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            outcomes.push(self.call(call).await);
        }
        outcomes
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FieldSpec, InputSchema};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 有副作用的工具：记录被调用次数
    struct Counter {
        hits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for Counter {
        fn name(&self) -> &str {
            "counter"
        }
        fn description(&self) -> &str {
            "counts invocations"
        }
        fn input_schema(&self) -> InputSchema {
            InputSchema::new().field(FieldSpec::integer("step", "increment").required().range(1.0, 10.0))
        }
        async fn execute(&self, args: Value) -> Result<Value, AgentError> {
            let step = args["step"].as_u64().unwrap_or(1) as usize;
            if step == 7 {
                return Err(AgentError::Validation("unlucky".into()));
            }
            Ok(json!(self.hits.fetch_add(step, Ordering::SeqCst) + step))
        }
    }

    struct Sleeper;

    #[async_trait]
    impl Tool for Sleeper {
        fn name(&self) -> &str {
            "sleeper"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        async fn execute(&self, _args: Value) -> Result<Value, AgentError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    fn executor(hits: Arc<AtomicUsize>) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Counter { hits }).unwrap();
        registry.register(Sleeper).unwrap();
        ToolExecutor::new(Arc::new(registry), 1)
    }

    #[tokio::test]
    async fn test_invalid_args_never_reach_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let exec = executor(hits.clone());
        for bad in [json!({}), json!({"step": "2"}), json!({"step": 11}), json!(null)] {
            let err = exec.execute("counter", bad).await.unwrap_err();
            assert_eq!(err.class(), "ValidationError");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_error_is_wrapped_with_tool_name() {
        let exec = executor(Arc::new(AtomicUsize::new(0)));
        let outcome = exec.call(&ToolCall::new("counter", json!({"step": 7}))).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_class.as_deref(), Some("ToolExecutionError"));
        assert!(outcome.error.unwrap().contains("counter"));
    }

    #[tokio::test]
    async fn test_successful_call_returns_structured_result() {
        let hits = Arc::new(AtomicUsize::new(0));
        let exec = executor(hits.clone());
        let outcome = exec.call(&ToolCall::new("counter", json!({"step": 2}))).await;
        assert!(outcome.success);
        assert_eq!(outcome.result, Some(json!(2)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_timeout() {
        let exec = executor(Arc::new(AtomicUsize::new(0)));
        let missing = exec.call(&ToolCall::new("ghost", json!({}))).await;
        assert_eq!(missing.error_class.as_deref(), Some("NotFound"));
        let slow = exec.call(&ToolCall::new("sleeper", json!({}))).await;
        assert_eq!(slow.error_class.as_deref(), Some("Timeout"));
    }

    /// 收集每条事件的字段，键为字段名
    #[derive(Clone, Default)]
    struct CapturedEvents(Arc<std::sync::Mutex<Vec<std::collections::BTreeMap<String, String>>>>);

    struct FieldMap(std::collections::BTreeMap<String, String>);

    impl tracing::field::Visit for FieldMap {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            self.0.insert(field.name().to_string(), format!("{value:?}"));
        }
        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CapturedEvents {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let mut fields = FieldMap(Default::default());
            event.record(&mut fields);
            self.0.lock().unwrap().push(fields.0);
        }
    }

    #[tokio::test]
    async fn test_audit_log_uses_structured_fields() {
        use tracing_subscriber::layer::SubscriberExt;

        let captured = CapturedEvents::default();
        let subscriber = tracing_subscriber::registry().with(captured.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let exec = executor(Arc::new(AtomicUsize::new(0)));
        exec.call(&ToolCall::new("counter", json!({"step": 3}))).await;
        exec.call(&ToolCall::new("counter", json!({"step": 0}))).await;

        let events = captured.0.lock().unwrap().clone();
        let audits: Vec<_> = events
            .iter()
            .filter(|e| e.get("event").map(String::as_str) == Some("tool_audit"))
            .collect();
        assert_eq!(audits.len(), 2);
        for audit in &audits {
            for key in ["tool", "ok", "outcome", "duration_ms", "args_preview"] {
                assert!(audit.contains_key(key), "missing {key}");
            }
            assert!(!audit.contains_key("audit"));
            assert_eq!(audit["tool"], "counter");
        }
        assert_eq!(audits[0]["ok"], "true");
        assert_eq!(audits[0]["outcome"], "ok");
        assert_eq!(audits[1]["ok"], "false");
        assert_eq!(audits[1]["outcome"], "invalid");
    }

    #[test]
    fn test_tool_call_accepts_args_alias() {
        let call: ToolCall = serde_json::from_value(json!({"tool": "echo", "args": {"text": "x"}})).unwrap();
        assert_eq!(call.arguments, json!({"text": "x"}));
        let bare: ToolCall = serde_json::from_value(json!({"tool": "echo"})).unwrap();
        assert_eq!(bare.arguments, json!({}));
    }
}
