//! 反馈日志（进程级共享）
//!
//! Feedback 节点以 fire-and-forget 方式记录每次运行；调用方也可显式提交 1-5 分评分，
//! statistics() 汇总总数、平均分与分布。两类记录各自有上限，超出时丢弃最旧的。

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::AgentError;

/// 一次运行的自动记录
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunRecord {
    pub flow_id: String,
    pub succeeded: bool,
    pub failed_nodes: Vec<String>,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

/// 用户显式评分
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rating {
    pub flow_id: String,
    pub rating: u8,
    pub comment: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeedbackStats {
    pub total_runs: usize,
    pub total_ratings: usize,
    pub average_rating: f64,
    /// 分数 -> 次数（1..=5 全部列出）
    pub distribution: BTreeMap<u8, usize>,
}

pub const DEFAULT_MAX_RUNS: usize = 500;
pub const DEFAULT_MAX_RATINGS: usize = 500;

#[derive(Debug)]
pub struct FeedbackLog {
    runs: RwLock<VecDeque<RunRecord>>,
    ratings: RwLock<VecDeque<Rating>>,
    max_runs: usize,
    max_ratings: usize,
}

impl Default for FeedbackLog {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_RUNS, DEFAULT_MAX_RATINGS)
    }
}

impl FeedbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_runs: usize, max_ratings: usize) -> Self {
        Self {
            runs: RwLock::new(VecDeque::new()),
            ratings: RwLock::new(VecDeque::new()),
            max_runs: max_runs.max(1),
            max_ratings: max_ratings.max(1),
        }
    }

    pub async fn record_run(&self, record: RunRecord) {
        let mut runs = self.runs.write().await;
        runs.push_back(record);
        while runs.len() > self.max_runs {
            runs.pop_front();
        }
    }

    /// 提交评分；rating 必须在 1..=5
    pub async fn collect(
        &self,
        flow_id: impl Into<String>,
        rating: u8,
        comment: impl Into<String>,
    ) -> Result<(), AgentError> {
        if !(1..=5).contains(&rating) {
            return Err(AgentError::Validation(format!(
                "rating must be within 1..=5, got {rating}"
            )));
        }
        let flow_id = flow_id.into();
        tracing::info!(flow_id = %flow_id, rating, "feedback collected");
        let mut ratings = self.ratings.write().await;
        ratings.push_back(Rating {
            flow_id,
            rating,
            comment: comment.into(),
            recorded_at: Utc::now(),
        });
        while ratings.len() > self.max_ratings {
            ratings.pop_front();
        }
        Ok(())
    }

    pub async fn runs(&self) -> Vec<RunRecord> {
        self.runs.read().await.iter().cloned().collect()
    }

    /// 统计只覆盖仍保留在日志中的记录
    pub async fn statistics(&self) -> FeedbackStats {
        let ratings = self.ratings.read().await;
        let mut distribution: BTreeMap<u8, usize> = (1..=5).map(|r| (r, 0)).collect();
        for r in ratings.iter() {
            *distribution.entry(r.rating).or_insert(0) += 1;
        }
        let average_rating = if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().map(|r| f64::from(r.rating)).sum::<f64>() / ratings.len() as f64
        };
        FeedbackStats {
            total_runs: self.runs.read().await.len(),
            total_ratings: ratings.len(),
            average_rating,
            distribution,
        }
    }
}
