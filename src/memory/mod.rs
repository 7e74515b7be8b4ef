//! 记忆层：LLM 消息、近期交互（Memory 节点与记忆工具共享）、运行反馈

pub mod conversation;
pub mod feedback;
pub mod interactions;

pub use conversation::{last_user_content, Message, Role};
pub use feedback::{FeedbackLog, FeedbackStats, Rating, RunRecord};
pub use interactions::{Interaction, InteractionMemory, DEFAULT_TOP_K};
