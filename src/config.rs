//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `RRLA__*` 覆盖（双下划线表示嵌套，如 `RRLA__PIPELINE__MAX_TOOL_ITERATIONS=5`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::artifacts::EvictionPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub pipeline: PipelineSection,
    pub artifacts: ArtifactsSection,
    pub memory: MemorySection,
    pub feedback: FeedbackSection,
}

/// [app] 段：应用名、单次输入长度上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// Perception 拒绝超过该字符数的输入（致命错误）
    pub max_input_chars: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_input_chars: 16_000,
        }
    }
}

/// [llm] 段：后端选择、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock；无 API Key 时总是回落到 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次非流式请求超时（秒）
    pub request: u64,
    /// 流式输出两个 chunk 之间的最长间隔（秒）
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: 60,
            stream: 30,
        }
    }
}

/// [llm.retry] 段：限流 / 5xx 时的有界重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmRetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

/// [pipeline] 段：工具循环上限、工具超时、推理阈值
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// 模型连续请求工具调用的最大轮数，超出视为 ToolLoopExceeded
    pub max_tool_iterations: usize,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 置信度低于该值时 RRLA 选择 request_clarification
    pub clarification_threshold: f64,
    /// 非 simple 任务是否请求 LLM 做分解
    pub llm_decomposition: bool,
    /// 分解出的子目标数量上限
    pub max_subgoals: usize,
    /// 流式输出通道容量
    pub stream_channel_capacity: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_tool_iterations: 3,
            tool_timeout_secs: 30,
            clarification_threshold: 0.3,
            llm_decomposition: true,
            max_subgoals: 8,
            stream_channel_capacity: 64,
        }
    }
}

/// [artifacts] 段：容量、满载策略与快照目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsSection {
    pub max_artifacts: usize,
    pub eviction: EvictionPolicy,
    /// export_artifacts / import_artifacts 工具只能读写该目录下的文件
    pub snapshot_dir: PathBuf,
}

impl Default for ArtifactsSection {
    fn default() -> Self {
        Self {
            max_artifacts: 100,
            eviction: EvictionPolicy::EvictOldest,
            snapshot_dir: PathBuf::from("snapshots"),
        }
    }
}

/// [memory] 段：近期交互记忆
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub enabled: bool,
    pub max_interactions: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_interactions: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackSection {
    pub enabled: bool,
    /// 运行记录上限，超出丢弃最旧的
    pub max_runs: usize,
    pub max_ratings: usize,
}

impl Default for FeedbackSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_runs: crate::memory::feedback::DEFAULT_MAX_RUNS,
            max_ratings: crate::memory::feedback::DEFAULT_MAX_RATINGS,
        }
    }
}

/// 从 config 目录加载配置，环境变量 RRLA__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 RRLA__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RRLA")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_conservative() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.pipeline.max_tool_iterations, 3);
        assert_eq!(cfg.artifacts.max_artifacts, 100);
        assert_eq!(cfg.artifacts.eviction, EvictionPolicy::EvictOldest);
        assert!(cfg.memory.enabled);
        assert_eq!(cfg.llm.retry.max_attempts, 3);
    }

    #[test]
    fn test_load_explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[pipeline]\nmax_tool_iterations = 5\n\n[artifacts]\nmax_artifacts = 7\neviction = \"reject\"\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.pipeline.max_tool_iterations, 5);
        assert_eq!(cfg.artifacts.max_artifacts, 7);
        assert_eq!(cfg.artifacts.eviction, EvictionPolicy::Reject);
        // 未覆盖的键保持默认
        assert_eq!(cfg.pipeline.tool_timeout_secs, 30);
    }
}
