//! 核心编排层：错误与恢复、共享上下文与 Trace、节点契约、编排器、构建器、流式事件

pub mod builder;
pub mod error;
pub mod node;
pub mod orchestrator;
pub mod recovery;
pub mod shared;
pub mod stream;

pub use builder::{create_agent_builder, create_llm_from_config, AgentBuilder};
pub use error::AgentError;
pub use node::{run_node, FailurePolicy, Flow, Node, NodeRun, NodeState, Phase};
pub use orchestrator::{NodeInfo, Orchestrator, PipelineDeps, Stage};
pub use recovery::{RecoveryAction, RecoveryEngine};
pub use shared::{
    Outcome, RunStatus, SharedContext, TraceEntry, FALLBACK_ANSWER_KEY, USER_INPUT_KEY,
};
pub use stream::{StreamEvent, StreamSink, TraceSummary};
