//! Artifact 存储与工具调度集成测试

use std::sync::Arc;

use rrla_agent::artifacts::{
    register_artifact_tools, ArtifactStore, ArtifactType, EvictionPolicy, NewArtifact,
};
use rrla_agent::tools::{EchoTool, ToolExecutor, ToolRegistry};
use serde_json::json;

fn executor(store: Arc<ArtifactStore>) -> ToolExecutor {
    let mut registry = ToolRegistry::new();
    register_artifact_tools(&mut registry, store).unwrap();
    ToolExecutor::new(Arc::new(registry), 5)
}

#[tokio::test]
async fn test_create_artifact_infers_language_and_lines() {
    let store = Arc::new(ArtifactStore::new(10, EvictionPolicy::EvictOldest));
    let out = executor(store.clone())
        .execute(
            "create_artifact",
            json!({ "name": "hello.py", "type": "code", "content": "print('hi')" }),
        )
        .await
        .unwrap();

    let artifact = &out["artifact"];
    assert_eq!(artifact["language"], json!("python"));
    assert_eq!(artifact["lines"], json!(1));
    assert_eq!(artifact["type"], json!("code"));
    assert!(artifact["id"].as_str().unwrap().starts_with("artifact_"));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_duplicate_registration_keeps_first_tool() {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool).unwrap();
    let err = registry.register(EchoTool).unwrap_err();
    assert_eq!(err.class(), "DuplicateName");
    assert_eq!(registry.len(), 1);

    let executor = ToolExecutor::new(Arc::new(registry), 5);
    let out = executor.execute("echo", json!({ "text": "still here" })).await.unwrap();
    assert_eq!(out["echo"], json!("still here"));
}

#[tokio::test]
async fn test_concurrent_creates_never_exceed_capacity() {
    let store = Arc::new(ArtifactStore::new(5, EvictionPolicy::EvictOldest));
    let mut handles = Vec::new();
    for i in 0..40 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .create(NewArtifact::new(format!("note_{i}.md"), ArtifactType::Document, "x"))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
        assert!(store.len().await <= 5);
    }
    assert_eq!(store.len().await, 5);
    assert_eq!(store.stats().await.remaining_capacity, 0);
}

#[tokio::test]
async fn test_reject_policy_under_contention() {
    let store = Arc::new(ArtifactStore::new(3, EvictionPolicy::Reject));
    let mut handles = Vec::new();
    for i in 0..12 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .create(NewArtifact::new(format!("cfg_{i}.toml"), ArtifactType::Config, "a = 1"))
                .await
        }));
    }
    let mut ok = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => {
                assert_eq!(e.class(), "CapacityExceeded");
                rejected += 1;
            }
        }
    }
    assert_eq!(ok, 3);
    assert_eq!(rejected, 9);
}

#[tokio::test]
async fn test_export_then_import_restores_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshots").join("artifacts.json");

    let source = Arc::new(
        ArtifactStore::new(10, EvictionPolicy::EvictOldest).with_snapshot_dir(dir.path()),
    );
    let tools = executor(source.clone());
    tools
        .execute(
            "create_artifact",
            json!({ "name": "main.rs", "type": "code", "content": "fn main() {}\n" }),
        )
        .await
        .unwrap();
    tools
        .execute(
            "create_artifact",
            json!({ "name": "notes", "type": "document", "content": "a\nb\nc" }),
        )
        .await
        .unwrap();
    let exported = tools
        .execute("export_artifacts", json!({ "path": "snapshots/artifacts.json" }))
        .await
        .unwrap();
    assert_eq!(exported["exported"], json!(2));

    let target = Arc::new(ArtifactStore::new(10, EvictionPolicy::EvictOldest));
    target
        .create(NewArtifact::new("stale.txt", ArtifactType::Data, "old"))
        .await
        .unwrap();
    assert_eq!(target.import(&path).await.unwrap(), 2);

    let mut before = source.list(None, 10).await;
    let mut after = target.list(None, 10).await;
    before.sort_by(|a, b| a.id.cmp(&b.id));
    after.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(before, after);
    assert_eq!(target.list(Some(ArtifactType::Data), 10).await.len(), 0);
}

#[tokio::test]
async fn test_import_over_capacity_leaves_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.json");

    let big = ArtifactStore::new(10, EvictionPolicy::EvictOldest);
    for i in 0..4 {
        big.create(NewArtifact::new(format!("d{i}.json"), ArtifactType::Data, "{}"))
            .await
            .unwrap();
    }
    big.export(&path).await.unwrap();

    let small = ArtifactStore::new(2, EvictionPolicy::EvictOldest);
    let kept = small
        .create(NewArtifact::new("keep.yaml", ArtifactType::Config, "k: v"))
        .await
        .unwrap();
    let err = small.import(&path).await.unwrap_err();
    assert_eq!(err.class(), "CapacityExceeded");
    assert_eq!(small.len().await, 1);
    assert_eq!(small.get(&kept.id).await.unwrap().language.as_deref(), Some("yaml"));
}

#[tokio::test]
async fn test_missing_artifact_surfaces_as_tool_error() {
    let store = Arc::new(ArtifactStore::new(10, EvictionPolicy::EvictOldest));
    let err = executor(store)
        .execute("get_artifact", json!({ "artifact_id": "artifact_missing" }))
        .await
        .unwrap_err();
    assert_eq!(err.class(), "ToolExecutionError");
}

#[tokio::test]
async fn test_export_tool_rejects_path_outside_snapshot_dir() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("snapshots");
    let store = Arc::new(
        ArtifactStore::new(10, EvictionPolicy::EvictOldest).with_snapshot_dir(&root),
    );
    let tools = executor(store);
    let target = dir.path().join("owned.json");

    let err = tools
        .execute(
            "export_artifacts",
            json!({ "path": format!("{}/deep/../../owned.json", root.display()) }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.class(), "ValidationError");

    let err = tools
        .execute("export_artifacts", json!({ "path": "deep/../../owned.json" }))
        .await
        .unwrap_err();
    assert_eq!(err.class(), "ValidationError");
    assert!(!target.exists());
}
