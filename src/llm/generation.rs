//! generate / stream：面向流水线的 LLM 调用
//!
//! generate 在 system 中注入可用工具的 schema 与 tool call JSON 格式，调用模型后
//! 用 parse_llm_output 拆出文本与函数调用；stream 直接返回 Token 流（不带工具）。

use serde::Deserialize;
use serde_json::Value;

use crate::llm::{LlmClient, LlmError, TokenStream};
use crate::memory::Message;
use crate::tools::{tool_call_schema_json, ToolCall};

/// 一次 generate 的结果：文本 + 模型请求的函数调用（可能为空）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub text: String,
    pub function_calls: Vec<ToolCall>,
}

impl Generation {
    pub fn requests_tools(&self) -> bool {
        !self.function_calls.is_empty()
    }
}

/// 模型可能输出的三种调用形态：单个对象、数组、{"tool_calls": [...]}
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCalls {
    Wrapped { tool_calls: Vec<ToolCall> },
    Many(Vec<ToolCall>),
    One(ToolCall),
}

/// 解析模型输出：含合法 tool call JSON 则拆出调用，否则整体视为文本回复
pub fn parse_llm_output(output: &str) -> Generation {
    let trimmed = output.trim();

    let (json_str, start, end) = if let Some(fence) = trimmed.find("```json") {
        let body_start = fence + 7;
        let rest = &trimmed[body_start..];
        match rest.find("```") {
            Some(close) => (rest[..close].trim(), fence, body_start + close + 3),
            None => (rest.trim(), fence, trimmed.len()),
        }
    } else {
        let open = trimmed.find(['{', '[']);
        let close = trimmed.rfind(['}', ']']);
        match (open, close) {
            (Some(s), Some(e)) if e > s => (&trimmed[s..=e], s, e + 1),
            _ => {
                return Generation {
                    text: trimmed.to_string(),
                    function_calls: Vec::new(),
                }
            }
        }
    };

    let calls = match serde_json::from_str::<RawCalls>(json_str) {
        Ok(RawCalls::Wrapped { tool_calls }) | Ok(RawCalls::Many(tool_calls)) => tool_calls,
        Ok(RawCalls::One(call)) => vec![call],
        Err(_) => Vec::new(),
    };
    let calls: Vec<ToolCall> = calls.into_iter().filter(|c| !c.tool.is_empty()).collect();

    if calls.is_empty() {
        return Generation {
            text: trimmed.to_string(),
            function_calls: Vec::new(),
        };
    }

    let prose = format!("{} {}", &trimmed[..start], &trimmed[end..]);
    Generation {
        text: prose.trim().to_string(),
        function_calls: calls,
    }
}

/// 组装一次调用的消息：有工具时在 system 中列出 schema 与调用格式
pub fn build_messages(prompt: &str, tools: Option<&[Value]>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if let Some(tools) = tools.filter(|t| !t.is_empty()) {
        let catalog = serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_string());
        messages.push(Message::system(format!(
            "You can call tools. To call one, reply with ONLY a JSON object (or an array of them) \
             matching this schema:\n```json\n{}\n```\nAvailable tools:\n```json\n{}\n```\n\
             When no tool is needed, answer in plain text.",
            tool_call_schema_json(),
            catalog
        )));
    }
    messages.push(Message::user(prompt.to_string()));
    messages
}

pub async fn generate(
    llm: &dyn LlmClient,
    prompt: &str,
    tools: Option<&[Value]>,
) -> Result<Generation, LlmError> {
    generate_messages(llm, &build_messages(prompt, tools)).await
}

/// 多轮版本：工具循环把上一轮调用与结果追加进 messages 后再次调用
pub async fn generate_messages(
    llm: &dyn LlmClient,
    messages: &[Message],
) -> Result<Generation, LlmError> {
    let output = llm.complete(messages).await?;
    Ok(parse_llm_output(&output))
}

pub async fn stream(llm: &dyn LlmClient, prompt: &str) -> Result<TokenStream, LlmError> {
    llm.complete_stream(&[Message::user(prompt.to_string())]).await
}
