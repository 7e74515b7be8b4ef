//! Artifact：有容量上限、进程级共享的内容存储，通过工具调用协议访问

pub mod snapshot_dir;
pub mod store;
pub mod tools;
pub mod types;

pub use snapshot_dir::SnapshotDir;
pub use store::{ArtifactStats, ArtifactStore, EvictionPolicy};
pub use tools::register_artifact_tools;
pub use types::{detect_language, line_count, Artifact, ArtifactType, ArtifactUpdate, NewArtifact};
