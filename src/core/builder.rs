//! Agent 构建器：统一的初始化逻辑
//!
//! 在启动时显式创建进程级组件（LLM、工具注册表、Artifact 存储、记忆、反馈日志），
//! 注入 Orchestrator；测试可以传入各自的新实例，不依赖任何全局单例。

use std::path::PathBuf;
use std::sync::Arc;

use crate::artifacts::{register_artifact_tools, ArtifactStore};
use crate::config::{load_config, AppConfig};
use crate::core::{AgentError, Orchestrator, PipelineDeps, RecoveryEngine};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient, RetryConfig, RetryingLlmClient, DEEPSEEK_BASE_URL};
use crate::memory::{FeedbackLog, InteractionMemory};
use crate::tools::{register_builtin_tools, Tool, ToolExecutor, ToolRegistry};

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / DeepSeek / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using Mock LLM (configured)");
        return Arc::new(MockLlmClient::new());
    }

    let deepseek_key = std::env::var("DEEPSEEK_API_KEY").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();

    match (provider.as_str(), deepseek_key, openai_key) {
        ("deepseek", Some(key), _) | ("deepseek", None, Some(key)) => {
            let base = cfg.llm.base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);
            tracing::info!("Using DeepSeek LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(Some(base), &cfg.llm.model, &key))
        }
        (_, _, Some(key)) => {
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, &key))
        }
        _ => {
            tracing::warn!("No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    }
}

pub struct AgentBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    artifacts: Option<Arc<ArtifactStore>>,
    memory: Option<Arc<InteractionMemory>>,
    feedback: Option<Arc<FeedbackLog>>,
    extra_tools: Vec<Arc<dyn Tool>>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            artifacts: None,
            memory: None,
            feedback: None,
            extra_tools: Vec::new(),
        }
    }

    /// 指定 LLM 客户端（仍会套上超时与重试）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 共享已有的 Artifact 存储（多个 Orchestrator 可共用）
    pub fn with_artifact_store(mut self, store: Arc<ArtifactStore>) -> Self {
        self.artifacts = Some(store);
        self
    }

    pub fn with_memory(mut self, memory: Arc<InteractionMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<FeedbackLog>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// 追加自定义工具（与内置工具重名时 build 返回 DuplicateName）
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 内置工具 + artifact 工具 + 自定义工具
    fn build_tool_registry(
        &self,
        memory: Arc<InteractionMemory>,
        artifacts: Arc<ArtifactStore>,
    ) -> Result<ToolRegistry, AgentError> {
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry, memory)?;
        register_artifact_tools(&mut registry, artifacts)?;
        for tool in &self.extra_tools {
            registry.register_arc(tool.clone())?;
        }
        tracing::debug!(tools = registry.len(), "tool registry ready");
        Ok(registry)
    }

    pub fn build(self) -> Result<Orchestrator, AgentError> {
        let memory = self
            .memory
            .clone()
            .unwrap_or_else(|| Arc::new(InteractionMemory::new(self.config.memory.max_interactions)));
        let artifacts = self
            .artifacts
            .clone()
            .unwrap_or_else(|| Arc::new(ArtifactStore::from_config(&self.config.artifacts)));
        let feedback = self.feedback.clone().unwrap_or_else(|| {
            Arc::new(FeedbackLog::with_limits(
                self.config.feedback.max_runs,
                self.config.feedback.max_ratings,
            ))
        });

        let registry = self.build_tool_registry(memory.clone(), artifacts)?;
        let tools = Arc::new(ToolExecutor::new(
            Arc::new(registry),
            self.config.pipeline.tool_timeout_secs,
        ));

        let inner = self
            .llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(&self.config));
        let llm: Arc<dyn LlmClient> = Arc::new(RetryingLlmClient::new(
            inner,
            RetryConfig::from_config(&self.config.llm),
        ));

        Ok(Orchestrator::new(PipelineDeps {
            llm,
            tools,
            memory,
            feedback,
            recovery: RecoveryEngine::new(),
            config: Arc::new(self.config),
        }))
    }
}

/// 便捷函数：加载配置（失败时回落默认值）并创建 AgentBuilder
pub fn create_agent_builder(config_path: Option<PathBuf>) -> AgentBuilder {
    let config = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    AgentBuilder::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;

    #[test]
    fn test_build_registers_builtin_and_artifact_tools() {
        let orch = AgentBuilder::new(AppConfig::default())
            .with_llm(Arc::new(MockLlmClient::new()))
            .build()
            .unwrap();
        let names = orch.deps().tools.tool_names();
        assert_eq!(names[0], "calculate");
        for name in ["create_artifact", "list_artifacts", "import_artifacts", "echo"] {
            assert!(names.iter().any(|n| n == name), "missing {name}");
        }
    }

    #[test]
    fn test_duplicate_extra_tool_fails() {
        let err = AgentBuilder::new(AppConfig::default())
            .with_llm(Arc::new(MockLlmClient::new()))
            .with_tool(Arc::new(EchoTool))
            .build()
            .err()
            .unwrap();
        assert_eq!(err.class(), "DuplicateName");
    }

    #[test]
    fn test_mock_provider_from_config() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        assert_eq!(create_llm_from_config(&cfg).token_usage(), (0, 0, 0));
    }
}
