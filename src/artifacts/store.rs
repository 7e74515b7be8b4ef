//! 进程级 Artifact 存储
//!
//! 所有读写（含 export / import 的文件 IO）经同一把 tokio Mutex 串行化，
//! 容量检查与淘汰在同一临界区内完成，并发 create 下 len() ≤ max_artifacts 始终成立。

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::artifacts::{detect_language, SnapshotDir, line_count, Artifact, ArtifactType, ArtifactUpdate, NewArtifact};
use crate::config::ArtifactsSection;
use crate::core::AgentError;

/// 满载时的策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// 淘汰 created_at 最早的一个（同一时刻按插入顺序）
    #[default]
    EvictOldest,
    /// 拒绝写入，返回 CapacityExceeded
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactStats {
    pub total_artifacts: usize,
    pub by_type: BTreeMap<String, usize>,
    pub total_size_bytes: usize,
    pub max_artifacts: usize,
    pub remaining_capacity: usize,
}

/// export / import 的快照格式
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    exported_at: DateTime<Utc>,
    artifacts: Vec<Artifact>,
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    artifact: Artifact,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl Inner {
    fn insert(&mut self, artifact: Artifact) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(artifact.id.clone(), Entry { seq, artifact });
    }

    fn oldest_id(&self) -> Option<String> {
        self.entries
            .values()
            .min_by_key(|e| (e.artifact.created_at, e.seq))
            .map(|e| e.artifact.id.clone())
    }

    /// 按插入顺序
    fn ordered(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries
    }
}

pub struct ArtifactStore {
    inner: Mutex<Inner>,
    max_artifacts: usize,
    eviction: EvictionPolicy,
    snapshot_dir: SnapshotDir,
}

impl ArtifactStore {
    pub fn new(max_artifacts: usize, eviction: EvictionPolicy) -> Self {
        tracing::info!(max_artifacts, ?eviction, "artifact store initialized");
        Self {
            inner: Mutex::new(Inner::default()),
            max_artifacts,
            eviction,
            snapshot_dir: SnapshotDir::default(),
        }
    }

    pub fn from_config(cfg: &ArtifactsSection) -> Self {
        Self::new(cfg.max_artifacts, cfg.eviction).with_snapshot_dir(cfg.snapshot_dir.clone())
    }

    pub fn with_snapshot_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.snapshot_dir = SnapshotDir::new(dir);
        self
    }

    /// 工具调用的快照路径在此解析；export / import 本身信任调用方给出的路径
    pub fn snapshot_dir(&self) -> &SnapshotDir {
        &self.snapshot_dir
    }

    pub fn max_artifacts(&self) -> usize {
        self.max_artifacts
    }

    pub fn eviction(&self) -> EvictionPolicy {
        self.eviction
    }

    pub async fn create(&self, new: NewArtifact) -> Result<Artifact, AgentError> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(AgentError::Validation("artifact name must not be empty".into()));
        }
        let now = Utc::now();
        let language = new
            .language
            .or_else(|| detect_language(&name).map(str::to_string));
        let artifact = Artifact {
            id: format!("artifact_{}", Uuid::new_v4().simple()),
            description: new.description.unwrap_or_else(|| format!("Artifact {name}")),
            name,
            artifact_type: new.artifact_type,
            size_bytes: new.content.len(),
            lines: line_count(&new.content),
            content: new.content,
            language,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.lock().await;
        if self.max_artifacts == 0 {
            return Err(AgentError::CapacityExceeded { max: 0 });
        }
        if inner.entries.len() >= self.max_artifacts {
            match self.eviction {
                EvictionPolicy::Reject => {
                    return Err(AgentError::CapacityExceeded {
                        max: self.max_artifacts,
                    })
                }
                EvictionPolicy::EvictOldest => {
                    if let Some(oldest) = inner.oldest_id() {
                        inner.entries.remove(&oldest);
                        tracing::warn!(evicted = %oldest, "artifact store full, evicted oldest");
                    }
                }
            }
        }
        inner.insert(artifact.clone());
        tracing::info!(id = %artifact.id, name = %artifact.name, kind = %artifact.artifact_type, "artifact created");
        Ok(artifact)
    }

    pub async fn get(&self, id: &str) -> Result<Artifact, AgentError> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .get(id)
            .map(|e| e.artifact.clone())
            .ok_or_else(|| not_found(id))
    }

    /// 合并给定字段并刷新 updated_at；返回更新后的 artifact 与被修改的字段名
    pub async fn update(
        &self,
        id: &str,
        update: ArtifactUpdate,
    ) -> Result<(Artifact, Vec<&'static str>), AgentError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.entries.get_mut(id).ok_or_else(|| not_found(id))?;
        let artifact = &mut entry.artifact;
        let mut changed = Vec::new();

        if let Some(content) = update.content {
            artifact.set_content(content);
            changed.push("content");
        }
        if let Some(description) = update.description {
            artifact.description = description;
            changed.push("description");
        }
        if let Some(metadata) = update.metadata {
            artifact.metadata.extend(metadata);
            changed.push("metadata");
        }
        artifact.updated_at = Utc::now();
        tracing::info!(id, ?changed, "artifact updated");
        Ok((artifact.clone(), changed))
    }

    /// 删除；不存在返回 NotFound（重复删除同样失败）
    pub async fn delete(&self, id: &str) -> Result<Artifact, AgentError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.entries.remove(id).ok_or_else(|| not_found(id))?;
        tracing::info!(id, "artifact deleted");
        Ok(entry.artifact)
    }

    /// 最新在前，按类型过滤，最多 limit 条
    pub async fn list(&self, type_filter: Option<ArtifactType>, limit: usize) -> Vec<Artifact> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<&Entry> = inner
            .entries
            .values()
            .filter(|e| type_filter.map_or(true, |t| e.artifact.artifact_type == t))
            .collect();
        entries.sort_by(|a, b| {
            (b.artifact.created_at, b.seq).cmp(&(a.artifact.created_at, a.seq))
        });
        entries
            .into_iter()
            .take(limit)
            .map(|e| e.artifact.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> ArtifactStats {
        let inner = self.inner.lock().await;
        let mut by_type = BTreeMap::new();
        let mut total_size_bytes = 0;
        for e in inner.entries.values() {
            *by_type
                .entry(e.artifact.artifact_type.as_str().to_string())
                .or_insert(0) += 1;
            total_size_bytes += e.artifact.size_bytes;
        }
        let total = inner.entries.len();
        ArtifactStats {
            total_artifacts: total,
            by_type,
            total_size_bytes,
            max_artifacts: self.max_artifacts,
            remaining_capacity: self.max_artifacts.saturating_sub(total),
        }
    }

    /// 清空，返回被删除数量
    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let count = inner.entries.len();
        inner.entries.clear();
        tracing::info!(count, "artifact store cleared");
        count
    }

    /// 将整个存储写为一个 JSON 快照文件（必要时创建父目录），返回导出数量
    pub async fn export(&self, path: impl AsRef<Path>) -> Result<usize, AgentError> {
        let path = path.as_ref();
        let inner = self.inner.lock().await;
        let snapshot = Snapshot {
            exported_at: Utc::now(),
            artifacts: inner.ordered().into_iter().map(|e| e.artifact.clone()).collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| AgentError::Snapshot(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AgentError::Snapshot(format!("{}: {e}", parent.display())))?;
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|e| AgentError::Snapshot(format!("{}: {e}", path.display())))?;
        let count = snapshot.artifacts.len();
        tracing::info!(count, path = %path.display(), "artifacts exported");
        Ok(count)
    }

    /// 从快照整体替换当前内容；快照超过容量时返回 CapacityExceeded 且不改动存储
    pub async fn import(&self, path: impl AsRef<Path>) -> Result<usize, AgentError> {
        let path = path.as_ref();
        let mut inner = self.inner.lock().await;
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AgentError::Snapshot(format!("{}: {e}", path.display())))?;
        let snapshot: Snapshot =
            serde_json::from_str(&raw).map_err(|e| AgentError::Snapshot(e.to_string()))?;

        let mut unique: Vec<Artifact> = Vec::with_capacity(snapshot.artifacts.len());
        for artifact in snapshot.artifacts {
            match unique.iter_mut().find(|a| a.id == artifact.id) {
                Some(existing) => *existing = artifact,
                None => unique.push(artifact),
            }
        }
        if unique.len() > self.max_artifacts {
            return Err(AgentError::CapacityExceeded {
                max: self.max_artifacts,
            });
        }

        *inner = Inner::default();
        let count = unique.len();
        for artifact in unique {
            inner.insert(artifact);
        }
        tracing::info!(count, path = %path.display(), "artifacts imported");
        Ok(count)
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::from_config(&ArtifactsSection::default())
    }
}

fn not_found(id: &str) -> AgentError {
    AgentError::NotFound(format!("artifact '{id}'"))
}
