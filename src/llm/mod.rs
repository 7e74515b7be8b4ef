//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）、超时重试装饰器、generate / stream

pub mod generation;
pub mod mock;
pub mod openai;
pub mod traits;

pub use generation::{build_messages, generate, generate_messages, parse_llm_output, stream, Generation};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage, DEEPSEEK_BASE_URL};
pub use traits::{LlmClient, LlmError, RetryConfig, RetryingLlmClient, TokenStream};
