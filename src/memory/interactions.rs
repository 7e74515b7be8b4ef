//! 近期交互记忆（进程级共享）
//!
//! 保留最近 N 条请求（query + intent + 时间），超出时丢弃最旧的；按关键词检索最近命中的 3 条。
//! 由 Memory 节点与 search_memory / store_memory 工具共同读写，内部用 RwLock 串行化写入。

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 检索默认返回条数
pub const DEFAULT_TOP_K: usize = 3;

/// 单条交互记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub query: String,
    pub intent: String,
    pub timestamp: DateTime<Utc>,
}

/// 有界交互日志
#[derive(Debug)]
pub struct InteractionMemory {
    entries: RwLock<VecDeque<Interaction>>,
    max_entries: usize,
}

impl InteractionMemory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn record(&self, query: impl Into<String>, intent: impl Into<String>) {
        let mut entries = self.entries.write().await;
        entries.push_back(Interaction {
            query: query.into(),
            intent: intent.into(),
            timestamp: Utc::now(),
        });
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// 关键词检索：任一查询词出现在历史 query 中即命中；返回最近的 top_k 条（旧→新）
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<Interaction> {
        let words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if words.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let entries = self.entries.read().await;
        let hits: Vec<Interaction> = entries
            .iter()
            .filter(|e| {
                let q = e.query.to_lowercase();
                words.iter().any(|w| q.contains(w.as_str()))
            })
            .cloned()
            .collect();
        let skip = hits.len().saturating_sub(top_k);
        hits.into_iter().skip(skip).collect()
    }

    pub async fn snapshot(&self) -> Vec<Interaction> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InteractionMemory {
    fn default() -> Self {
        Self::new(10)
    }
}
