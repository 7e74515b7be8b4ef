//! Feedback：把本次运行记入进程级 FeedbackLog，不影响回复

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::core::{AgentError, Flow, Node, RunStatus, SharedContext};
use crate::memory::{FeedbackLog, RunRecord};

pub const NAME: &str = "feedback";

pub struct FeedbackNode {
    log: Arc<FeedbackLog>,
    enabled: bool,
}

impl FeedbackNode {
    pub fn new(log: Arc<FeedbackLog>, enabled: bool) -> Self {
        Self { log, enabled }
    }
}

#[async_trait]
impl Node for FeedbackNode {
    type Input = RunRecord;
    type Output = RunRecord;

    fn name(&self) -> &'static str {
        NAME
    }

    fn should_run(&self, _ctx: &SharedContext) -> bool {
        self.enabled
    }

    fn prepare(&self, ctx: &SharedContext) -> Result<RunRecord, AgentError> {
        let failed_nodes = ctx.failed_nodes();
        Ok(RunRecord {
            flow_id: ctx.flow_id().to_string(),
            succeeded: ctx.status() == RunStatus::Success && failed_nodes.is_empty(),
            failed_nodes,
            duration_ms: ctx.elapsed_ms(),
            recorded_at: Utc::now(),
        })
    }

    async fn execute(&self, record: RunRecord) -> Result<RunRecord, AgentError> {
        self.log.record_run(record.clone()).await;
        Ok(record)
    }

    fn finalize(&self, ctx: &mut SharedContext, record: RunRecord) -> Result<Flow, AgentError> {
        ctx.set_result(
            NAME,
            json!({ "recorded": true, "succeeded": record.succeeded }),
        )?;
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{run_node, Outcome, TraceEntry};

    #[tokio::test]
    async fn test_records_failed_nodes() {
        let log = Arc::new(FeedbackLog::new());
        let mut ctx = SharedContext::new();
        let err = AgentError::Timeout("llm".into());
        ctx.add_trace(TraceEntry::error("synthesis", Utc::now(), "execute", &err, false));
        run_node(&FeedbackNode::new(log.clone(), true), &mut ctx).await;

        let runs = log.runs().await;
        assert_eq!(runs.len(), 1);
        assert!(!runs[0].succeeded);
        assert_eq!(runs[0].failed_nodes, vec!["synthesis"]);
        assert_eq!(runs[0].flow_id, ctx.flow_id());
    }

    #[tokio::test]
    async fn test_disabled_feedback_is_skipped() {
        let log = Arc::new(FeedbackLog::new());
        let mut ctx = SharedContext::new();
        run_node(&FeedbackNode::new(log.clone(), false), &mut ctx).await;
        assert!(log.runs().await.is_empty());
        assert_eq!(ctx.get_trace()[0].outcome, Outcome::Skipped);
    }
}
