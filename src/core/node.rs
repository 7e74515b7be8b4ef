//! 节点契约：prepare → execute → finalize
//!
//! - prepare：只读 SharedContext，投影出本节点的输入
//! - execute：可调用慢速 / 外部操作（LLM、工具），只依赖输入
//! - finalize：唯一允许修改 SharedContext 的阶段，写入结果并决定是否继续
//!
//! run_node 驱动单次调用的状态机 Ready → Preparing → Executing → Finalizing → Done | Failed，
//! 在每个阶段边界捕获错误、写 Trace，并按节点的失败策略处理。

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::core::{AgentError, SharedContext, TraceEntry};

/// 节点失败后的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// 中止流水线
    Fatal,
    /// 记录后以兜底结果继续
    Optional,
}

/// finalize 的路由决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Ready,
    Preparing,
    Executing,
    Finalizing,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Execute,
    Finalize,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::Execute => "execute",
            Phase::Finalize => "finalize",
        }
    }
}

#[async_trait]
pub trait Node: Send + Sync {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// 流水线内唯一；同时是 results 的键
    fn name(&self) -> &'static str;

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::Optional
    }

    /// 返回 false 时节点被跳过（Trace 记为 skipped）
    fn should_run(&self, _ctx: &SharedContext) -> bool {
        true
    }

    fn prepare(&self, ctx: &SharedContext) -> Result<Self::Input, AgentError>;

    async fn execute(&self, input: Self::Input) -> Result<Self::Output, AgentError>;

    fn finalize(&self, ctx: &mut SharedContext, output: Self::Output) -> Result<Flow, AgentError>;

    /// 写入 Trace 的输出摘要
    fn summarize(&self, _output: &Self::Output) -> Option<String> {
        None
    }

    /// Optional 节点失败时写入 results 的兜底值
    fn fallback(&self, _err: &AgentError) -> Value {
        Value::Null
    }
}

/// 单次节点调用的结果
#[derive(Debug, Clone)]
pub struct NodeRun {
    pub node: &'static str,
    pub state: NodeState,
    pub flow: Flow,
    pub error: Option<AgentError>,
    /// 经历过的状态（含 Ready）
    pub transitions: Vec<NodeState>,
}

impl NodeRun {
    pub fn failed(&self) -> bool {
        self.state == NodeState::Failed
    }
}

struct Machine {
    node: &'static str,
    transitions: Vec<NodeState>,
}

impl Machine {
    fn enter(&mut self, state: NodeState) {
        tracing::debug!(node = self.node, ?state, "node phase");
        self.transitions.push(state);
    }
}

/// 执行一个节点的完整生命周期
pub async fn run_node<N: Node>(node: &N, ctx: &mut SharedContext) -> NodeRun {
    let name = node.name();
    let mut machine = Machine {
        node: name,
        transitions: vec![NodeState::Ready],
    };

    if !node.should_run(ctx) {
        ctx.add_trace(TraceEntry::skipped(name, "disabled by configuration"));
        tracing::info!(node = name, "node skipped");
        machine.enter(NodeState::Done);
        return NodeRun {
            node: name,
            state: NodeState::Done,
            flow: Flow::Continue,
            error: None,
            transitions: machine.transitions,
        };
    }

    let started_at = Utc::now();
    let result = drive(node, ctx, &mut machine).await;

    match result {
        Ok((flow, summary)) => {
            machine.enter(NodeState::Done);
            ctx.add_trace(TraceEntry::success(name, started_at, summary));
            tracing::info!(node = name, "node succeeded");
            NodeRun {
                node: name,
                state: NodeState::Done,
                flow,
                error: None,
                transitions: machine.transitions,
            }
        }
        Err((phase, err)) => {
            machine.enter(NodeState::Failed);
            let policy = node.policy();
            let fatal = policy == FailurePolicy::Fatal;
            ctx.add_trace(TraceEntry::error(name, started_at, phase.as_str(), &err, fatal));

            let recorded = if fatal {
                tracing::error!(node = name, phase = phase.as_str(), error = %err, "fatal node failure, aborting pipeline");
                json!({ "error": err.to_string(), "class": err.class() })
            } else {
                tracing::warn!(node = name, phase = phase.as_str(), error = %err, "node failed, continuing with fallback");
                node.fallback(&err)
            };
            if !ctx.has_result(name) {
                let _ = ctx.set_result(name, recorded);
            }

            NodeRun {
                node: name,
                state: NodeState::Failed,
                flow: if fatal { Flow::Stop } else { Flow::Continue },
                error: Some(err),
                transitions: machine.transitions,
            }
        }
    }
}

async fn drive<N: Node>(
    node: &N,
    ctx: &mut SharedContext,
    machine: &mut Machine,
) -> Result<(Flow, Option<String>), (Phase, AgentError)> {
    machine.enter(NodeState::Preparing);
    let input = node.prepare(ctx).map_err(|e| (Phase::Prepare, e))?;

    machine.enter(NodeState::Executing);
    let output = node.execute(input).await.map_err(|e| (Phase::Execute, e))?;

    machine.enter(NodeState::Finalizing);
    let summary = node.summarize(&output);
    let flow = node.finalize(ctx, output).map_err(|e| (Phase::Finalize, e))?;
    Ok((flow, summary))
}
