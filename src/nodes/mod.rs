//! 流水线节点：Perception → Interpretation → Memory → Reasoning → Synthesis → Action → Feedback
//!
//! 每个节点把结果写到 results 中与其名称相同的键下。

pub mod action;
pub mod feedback;
pub mod interpretation;
pub mod memory;
pub mod perception;
pub mod reasoning;
pub mod synthesis;

pub use action::{ActionNode, ActionResult, ActionStatus};
pub use feedback::FeedbackNode;
pub use interpretation::{InterpretationNode, InterpretationResult};
pub use memory::{MemoryNode, MemoryResult, MEMORY_SNAPSHOT_KEY};
pub use perception::{PerceptionNode, PerceptionResult};
pub use reasoning::{ReasoningMode, ReasoningNode, ReasoningResult};
pub use synthesis::{SynthesisNode, SynthesisResult};
