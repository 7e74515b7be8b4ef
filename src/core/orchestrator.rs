//! 编排器：按固定顺序执行节点并应用失败策略
//!
//! Perception → Interpretation → Memory → Reasoning → Synthesis → Action → Feedback。
//! 每次请求都新建节点实例与 SharedContext；共享的只有 PipelineDeps 中的进程级组件
//! （LLM 客户端、工具执行器、记忆、反馈日志）。致命失败立即停止并写入兜底回复。

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{
    run_node, AgentError, FailurePolicy, Flow, NodeRun, RecoveryEngine, SharedContext, StreamEvent,
    StreamSink, TraceSummary, FALLBACK_ANSWER_KEY,
};
use crate::llm::LlmClient;
use crate::memory::{FeedbackLog, InteractionMemory};
use crate::nodes::{
    ActionNode, FeedbackNode, InterpretationNode, MemoryNode, PerceptionNode, ReasoningNode,
    SynthesisNode,
};
use crate::rrla::RrlaConfig;
use crate::tools::ToolExecutor;

/// 流水线共享的进程级组件
#[derive(Clone)]
pub struct PipelineDeps {
    pub llm: Arc<dyn LlmClient>,
    pub tools: Arc<ToolExecutor>,
    pub memory: Arc<InteractionMemory>,
    pub feedback: Arc<FeedbackLog>,
    pub recovery: RecoveryEngine,
    pub config: Arc<AppConfig>,
}

/// 流水线阶段（顺序即执行顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Perception,
    Interpretation,
    Memory,
    Reasoning,
    Synthesis,
    Action,
    Feedback,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Perception,
        Stage::Interpretation,
        Stage::Memory,
        Stage::Reasoning,
        Stage::Synthesis,
        Stage::Action,
        Stage::Feedback,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Perception => "perception",
            Stage::Interpretation => "interpretation",
            Stage::Memory => "memory",
            Stage::Reasoning => "reasoning",
            Stage::Synthesis => "synthesis",
            Stage::Action => "action",
            Stage::Feedback => "feedback",
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        match self {
            Stage::Perception | Stage::Interpretation => FailurePolicy::Fatal,
            _ => FailurePolicy::Optional,
        }
    }
}

/// pipeline_info() 的条目
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeInfo {
    pub name: &'static str,
    pub policy: FailurePolicy,
    pub enabled: bool,
}

pub struct Orchestrator {
    deps: PipelineDeps,
}

impl Orchestrator {
    pub fn new(deps: PipelineDeps) -> Self {
        Self { deps }
    }

    pub fn deps(&self) -> &PipelineDeps {
        &self.deps
    }

    fn enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Memory => self.deps.config.memory.enabled,
            Stage::Feedback => self.deps.config.feedback.enabled,
            _ => true,
        }
    }

    /// 节点名称、失败策略与启用状态（按执行顺序）
    pub fn pipeline_info(&self) -> Vec<NodeInfo> {
        Stage::ALL
            .iter()
            .map(|s| NodeInfo {
                name: s.name(),
                policy: s.policy(),
                enabled: self.enabled(*s),
            })
            .collect()
    }

    async fn run_stage(&self, stage: Stage, ctx: &mut SharedContext) -> NodeRun {
        let d = &self.deps;
        let cfg = &d.config;
        match stage {
            Stage::Perception => run_node(&PerceptionNode::new(cfg.app.max_input_chars), ctx).await,
            Stage::Interpretation => run_node(&InterpretationNode, ctx).await,
            Stage::Memory => {
                run_node(&MemoryNode::new(d.memory.clone(), cfg.memory.enabled), ctx).await
            }
            Stage::Reasoning => {
                let node = ReasoningNode::new(
                    d.llm.clone(),
                    d.tools.clone(),
                    RrlaConfig::from_config(&cfg.pipeline),
                );
                run_node(&node, ctx).await
            }
            Stage::Synthesis => {
                let node = SynthesisNode::new(
                    d.llm.clone(),
                    d.tools.clone(),
                    d.recovery.clone(),
                    cfg.pipeline.max_tool_iterations,
                );
                run_node(&node, ctx).await
            }
            Stage::Action => run_node(&ActionNode::new(d.recovery.clone()), ctx).await,
            Stage::Feedback => {
                run_node(&FeedbackNode::new(d.feedback.clone(), cfg.feedback.enabled), ctx).await
            }
        }
    }

    /// 依次执行 stages，遇到取消或 Flow::Stop 即停止
    async fn run_stages(&self, stages: &[Stage], ctx: &mut SharedContext, cancel: &CancellationToken) {
        for stage in stages {
            if cancel.is_cancelled() {
                tracing::info!(flow_id = %ctx.flow_id(), before = stage.name(), "pipeline cancelled");
                ctx.mark_cancelled();
                break;
            }

            let run = self.run_stage(*stage, ctx).await;

            if let Some(err) = &run.error {
                if let Some(sink) = ctx.stream().cloned() {
                    sink.send(StreamEvent::Error {
                        node: run.node.to_string(),
                        class: err.class().to_string(),
                        message: self.deps.recovery.fallback_answer(err),
                    })
                    .await;
                }
            }

            if run.flow == Flow::Stop {
                if let Some(err) = &run.error {
                    let answer = self.deps.recovery.fallback_answer(err);
                    ctx.set_context(FALLBACK_ANSWER_KEY, serde_json::Value::String(answer));
                }
                break;
            }
        }
    }

    /// 处理一条用户输入
    pub async fn run(&self, input: &str) -> SharedContext {
        self.run_context(SharedContext::with_input(input), CancellationToken::new())
            .await
    }

    /// 在调用方构造的上下文上运行完整流水线（可附带取消令牌）
    pub async fn run_context(&self, mut ctx: SharedContext, cancel: CancellationToken) -> SharedContext {
        tracing::info!(flow_id = %ctx.flow_id(), "pipeline started");
        self.run_stages(&Stage::ALL, &mut ctx, &cancel).await;
        tracing::info!(
            flow_id = %ctx.flow_id(),
            status = ?ctx.status(),
            nodes = ctx.get_trace().len(),
            duration_ms = ctx.elapsed_ms(),
            "pipeline finished"
        );
        ctx
    }

    /// 执行连续的一段阶段 [start, end]（缺省为首 / 尾）
    pub async fn run_partial(
        &self,
        ctx: &mut SharedContext,
        start: Option<Stage>,
        end: Option<Stage>,
    ) -> Result<(), AgentError> {
        let start = start.unwrap_or(Stage::Perception);
        let end = end.unwrap_or(Stage::Feedback);
        if start > end {
            return Err(AgentError::Validation(format!(
                "start stage '{}' comes after end stage '{}'",
                start.name(),
                end.name()
            )));
        }
        let stages: Vec<Stage> = Stage::ALL
            .into_iter()
            .filter(|s| *s >= start && *s <= end)
            .collect();
        tracing::info!(flow_id = %ctx.flow_id(), from = start.name(), to = end.name(), "partial pipeline");
        self.run_stages(&stages, ctx, &CancellationToken::new()).await;
        Ok(())
    }

    /// 流式运行：返回事件接收端与最终 SharedContext 的任务句柄
    ///
    /// 丢弃接收端即视为客户端断开：令牌被取消，Synthesis 停止读取模型输出，后续节点不再执行。
    pub fn run_streaming(
        self: &Arc<Self>,
        input: impl Into<String>,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<StreamEvent>, JoinHandle<SharedContext>) {
        let capacity = self.deps.config.pipeline.stream_channel_capacity;
        let (sink, rx) = StreamSink::channel(capacity, cancel.clone());
        let mut ctx = SharedContext::with_input(input);
        ctx.attach_stream(sink.clone());

        let finished = CancellationToken::new();
        let watcher = {
            let sink = sink.clone();
            let cancel = cancel.clone();
            let finished = finished.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = sink.closed() => cancel.cancel(),
                    _ = finished.cancelled() => {}
                }
            })
        };

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ctx = this.run_context(ctx, cancel).await;
            finished.cancel();
            let _ = watcher.await;

            if let Some(sink) = ctx.detach_stream() {
                let done = StreamEvent::Done {
                    duration_ms: ctx.elapsed_ms(),
                    status: ctx.status(),
                    answer: ctx.answer(),
                    trace: ctx.get_trace().iter().map(TraceSummary::from).collect(),
                };
                sink.send(done).await;
            }
            ctx
        });
        (rx, handle)
    }
}
