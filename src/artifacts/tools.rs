//! Artifact 工具：把 ArtifactStore 的操作暴露给工具调用协议

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::artifacts::{ArtifactStore, ArtifactType, ArtifactUpdate, NewArtifact};
use crate::core::AgentError;
use crate::tools::{FieldSpec, InputSchema, Tool, ToolAnnotations, ToolRegistry};

const TYPE_VALUES: &[&str] = &["code", "document", "data", "config"];

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn object_arg(args: &Value, key: &str) -> Option<Map<String, Value>> {
    args.get(key).and_then(|v| v.as_object()).cloned()
}

fn id_schema(description: &str) -> InputSchema {
    InputSchema::new().field(FieldSpec::string("artifact_id", description).required())
}

fn snapshot_path(store: &ArtifactStore, args: &Value) -> Result<PathBuf, AgentError> {
    store
        .snapshot_dir()
        .resolve(str_arg(args, "path").unwrap_or_default())
}

/// 注册全部 artifact 工具（共享同一个 store）
pub fn register_artifact_tools(
    registry: &mut ToolRegistry,
    store: Arc<ArtifactStore>,
) -> Result<(), AgentError> {
    registry.register(CreateArtifactTool(store.clone()))?;
    registry.register(GetArtifactTool(store.clone()))?;
    registry.register(UpdateArtifactTool(store.clone()))?;
    registry.register(DeleteArtifactTool(store.clone()))?;
    registry.register(ListArtifactsTool(store.clone()))?;
    registry.register(ArtifactStatsTool(store.clone()))?;
    registry.register(ExportArtifactsTool(store.clone()))?;
    registry.register(ImportArtifactsTool(store))?;
    Ok(())
}

pub struct CreateArtifactTool(pub Arc<ArtifactStore>);

#[async_trait]
impl Tool for CreateArtifactTool {
    fn name(&self) -> &str {
        "create_artifact"
    }

    fn description(&self) -> &str {
        "Create an artifact (code, document, data or config). Language is inferred from the name's extension when omitted."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .field(FieldSpec::string("name", "Artifact name, e.g. 'script.py'").required())
            .field(FieldSpec::string("type", "Artifact type").required().one_of(TYPE_VALUES))
            .field(FieldSpec::string("content", "Artifact content").required())
            .field(FieldSpec::string("language", "Programming language"))
            .field(FieldSpec::string("description", "Short description"))
            .field(FieldSpec::object("metadata", "Additional metadata"))
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::mutating()
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let artifact_type: ArtifactType = str_arg(&args, "type").unwrap_or_default().parse()?;
        let mut new = NewArtifact::new(
            str_arg(&args, "name").unwrap_or_default(),
            artifact_type,
            str_arg(&args, "content").unwrap_or_default(),
        );
        if let Some(language) = str_arg(&args, "language") {
            new = new.with_language(language);
        }
        if let Some(description) = str_arg(&args, "description") {
            new = new.with_description(description);
        }
        if let Some(metadata) = object_arg(&args, "metadata") {
            new = new.with_metadata(metadata);
        }
        let artifact = self.0.create(new).await?;
        Ok(json!({ "artifact": artifact }))
    }
}

pub struct GetArtifactTool(pub Arc<ArtifactStore>);

#[async_trait]
impl Tool for GetArtifactTool {
    fn name(&self) -> &str {
        "get_artifact"
    }

    fn description(&self) -> &str {
        "Fetch one artifact, including its content."
    }

    fn input_schema(&self) -> InputSchema {
        id_schema("ID of the artifact to fetch")
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::read_only()
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let artifact = self.0.get(str_arg(&args, "artifact_id").unwrap_or_default()).await?;
        Ok(json!({ "artifact": artifact }))
    }
}

pub struct UpdateArtifactTool(pub Arc<ArtifactStore>);

#[async_trait]
impl Tool for UpdateArtifactTool {
    fn name(&self) -> &str {
        "update_artifact"
    }

    fn description(&self) -> &str {
        "Update an artifact's content, description or metadata (metadata is merged)."
    }

    fn input_schema(&self) -> InputSchema {
        id_schema("ID of the artifact to update")
            .field(FieldSpec::string("content", "New content"))
            .field(FieldSpec::string("description", "New description"))
            .field(FieldSpec::object("metadata", "Metadata to merge"))
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::mutating()
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let id = str_arg(&args, "artifact_id").unwrap_or_default();
        let update = ArtifactUpdate {
            content: str_arg(&args, "content").map(str::to_string),
            description: str_arg(&args, "description").map(str::to_string),
            metadata: object_arg(&args, "metadata"),
        };
        let (artifact, changed) = self.0.update(id, update).await?;
        Ok(json!({
            "artifact_id": id,
            "updated_fields": changed,
            "artifact": artifact.summary(),
        }))
    }
}

pub struct DeleteArtifactTool(pub Arc<ArtifactStore>);

#[async_trait]
impl Tool for DeleteArtifactTool {
    fn name(&self) -> &str {
        "delete_artifact"
    }

    fn description(&self) -> &str {
        "Delete an artifact. Fails if it does not exist."
    }

    fn input_schema(&self) -> InputSchema {
        id_schema("ID of the artifact to delete")
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::destructive()
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let id = str_arg(&args, "artifact_id").unwrap_or_default();
        self.0.delete(id).await?;
        Ok(json!({ "artifact_id": id, "deleted": true }))
    }
}

pub struct ListArtifactsTool(pub Arc<ArtifactStore>);

#[async_trait]
impl Tool for ListArtifactsTool {
    fn name(&self) -> &str {
        "list_artifacts"
    }

    fn description(&self) -> &str {
        "List artifacts, most recent first, optionally filtered by type."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .field(FieldSpec::string("type_filter", "Only this type").one_of(TYPE_VALUES))
            .field(
                FieldSpec::integer("limit", "Maximum number of results")
                    .range(1.0, 100.0)
                    .default_value(json!(10)),
            )
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::read_only()
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let type_filter = str_arg(&args, "type_filter")
            .map(str::parse::<ArtifactType>)
            .transpose()?;
        let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(10) as usize;
        let artifacts: Vec<Value> = self
            .0
            .list(type_filter, limit)
            .await
            .iter()
            .map(|a| a.summary())
            .collect();
        Ok(json!({ "total": artifacts.len(), "artifacts": artifacts }))
    }
}

pub struct ArtifactStatsTool(pub Arc<ArtifactStore>);

#[async_trait]
impl Tool for ArtifactStatsTool {
    fn name(&self) -> &str {
        "artifact_stats"
    }

    fn description(&self) -> &str {
        "Artifact store statistics: counts by type, total size, remaining capacity."
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::read_only()
    }

    async fn execute(&self, _args: Value) -> Result<Value, AgentError> {
        Ok(serde_json::to_value(self.0.stats().await)?)
    }
}

pub struct ExportArtifactsTool(pub Arc<ArtifactStore>);

#[async_trait]
impl Tool for ExportArtifactsTool {
    fn name(&self) -> &str {
        "export_artifacts"
    }

    fn description(&self) -> &str {
        "Write every artifact to a JSON snapshot file."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().field(
            FieldSpec::string("path", "Destination file, relative to the snapshot directory")
                .required(),
        )
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::mutating()
    }

    fn check_args(&self, args: &Value) -> Result<(), AgentError> {
        snapshot_path(&self.0, args).map(|_| ())
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let path = str_arg(&args, "path").unwrap_or_default();
        let count = self.0.export(snapshot_path(&self.0, &args)?).await?;
        Ok(json!({ "path": path, "exported": count }))
    }
}

pub struct ImportArtifactsTool(pub Arc<ArtifactStore>);

#[async_trait]
impl Tool for ImportArtifactsTool {
    fn name(&self) -> &str {
        "import_artifacts"
    }

    fn description(&self) -> &str {
        "Replace the whole store with the artifacts of a JSON snapshot file."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().field(
            FieldSpec::string("path", "Snapshot file, relative to the snapshot directory")
                .required(),
        )
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::destructive()
    }

    fn check_args(&self, args: &Value) -> Result<(), AgentError> {
        snapshot_path(&self.0, args).map(|_| ())
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let path = str_arg(&args, "path").unwrap_or_default();
        let count = self.0.import(snapshot_path(&self.0, &args)?).await?;
        Ok(json!({ "path": path, "imported": count }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::EvictionPolicy;
    use crate::tools::{ToolCall, ToolExecutor};

    fn executor() -> (ToolExecutor, Arc<ArtifactStore>) {
        let store = Arc::new(ArtifactStore::new(10, EvictionPolicy::EvictOldest));
        let mut registry = ToolRegistry::new();
        register_artifact_tools(&mut registry, store.clone()).unwrap();
        (ToolExecutor::new(Arc::new(registry), 5), store)
    }

    #[tokio::test]
    async fn test_create_via_dispatcher() {
        let (exec, store) = executor();
        let out = exec
            .call(&ToolCall::new(
                "create_artifact",
                json!({"name": "hello.py", "type": "code", "content": "print('hi')"}),
            ))
            .await;
        assert!(out.success);
        let artifact = &out.result.unwrap()["artifact"];
        assert_eq!(artifact["language"], "python");
        assert_eq!(artifact["lines"], 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_type_is_rejected_before_store() {
        let (exec, store) = executor();
        let out = exec
            .call(&ToolCall::new(
                "create_artifact",
                json!({"name": "x", "type": "video", "content": ""}),
            ))
            .await;
        assert_eq!(out.error_class.as_deref(), Some("ValidationError"));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_missing_reports_tool_error() {
        let (exec, _) = executor();
        let out = exec
            .call(&ToolCall::new("delete_artifact", json!({"artifact_id": "artifact_missing"})))
            .await;
        assert!(!out.success);
        assert_eq!(out.error_class.as_deref(), Some("ToolExecutionError"));
        assert!(out.error.unwrap().contains("artifact_missing"));
    }

    #[tokio::test]
    async fn test_snapshot_paths_cannot_leave_snapshot_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("snapshots");
        let store = Arc::new(ArtifactStore::new(10, EvictionPolicy::EvictOldest).with_snapshot_dir(&root));
        let mut registry = ToolRegistry::new();
        register_artifact_tools(&mut registry, store).unwrap();
        let exec = ToolExecutor::new(Arc::new(registry), 5);

        let outside = dir.path().join("owned.json");
        let escaping = [
            "snapshots/deep/../../../owned.json".to_string(),
            "../owned.json".to_string(),
            outside.to_string_lossy().into_owned(),
        ];
        for path in escaping {
            for tool in ["export_artifacts", "import_artifacts"] {
                let out = exec.call(&ToolCall::new(tool, json!({ "path": path }))).await;
                assert!(!out.success, "{tool} {path}");
                assert_eq!(out.error_class.as_deref(), Some("ValidationError"));
            }
        }
        assert!(!outside.exists());
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_export_writes_inside_snapshot_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(10, EvictionPolicy::EvictOldest).with_snapshot_dir(dir.path()));
        let mut registry = ToolRegistry::new();
        register_artifact_tools(&mut registry, store).unwrap();
        let exec = ToolExecutor::new(Arc::new(registry), 5);

        let out = exec
            .call(&ToolCall::new("export_artifacts", json!({"path": "daily/store.json"})))
            .await;
        assert!(out.success);
        assert!(dir.path().join("daily").join("store.json").exists());
    }

    #[tokio::test]
    async fn test_list_returns_summaries_without_content() {
        let (exec, _) = executor();
        exec.call(&ToolCall::new(
            "create_artifact",
            json!({"name": "a.md", "type": "document", "content": "# A"}),
        ))
        .await;
        let out = exec.call(&ToolCall::new("list_artifacts", json!({}))).await;
        let result = out.result.unwrap();
        assert_eq!(result["total"], 1);
        assert!(result["artifacts"][0].get("content").is_none());
    }
}
