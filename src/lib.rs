//! RRLA Agent - 节点式编排的推理型智能体
//!
//! 模块划分：
//! - **agent**: 无头运行时（单条消息 / 流式处理）
//! - **artifacts**: 有界、进程内共享的 Artifact 存储及其工具
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: SharedContext 与 Trace、节点契约、编排器、恢复策略、构建器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock），超时与重试
//! - **memory**: 会话消息、交互记忆、运行反馈
//! - **nodes**: 七个流水线节点
//! - **observability**: tracing 日志初始化
//! - **rrla**: Reflective Reasoning with Logic Analysis（分解、反思、逻辑链、决策）
//! - **tools**: 工具注册表、调度执行器与内置工具

pub mod agent;
pub mod artifacts;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod nodes;
pub mod observability;
pub mod rrla;
pub mod tools;

pub use agent::{process_message, process_message_stream, AgentReply};
pub use core::{create_agent_builder, AgentBuilder, AgentError, Orchestrator};
