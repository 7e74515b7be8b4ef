//! Artifact 数据模型

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::core::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    Code,
    Document,
    Data,
    Config,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 4] = [
        ArtifactType::Code,
        ArtifactType::Document,
        ArtifactType::Data,
        ArtifactType::Config,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Code => "code",
            ArtifactType::Document => "document",
            ArtifactType::Data => "data",
            ArtifactType::Config => "config",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                AgentError::Validation(format!(
                    "invalid artifact type '{s}', expected one of code, document, data, config"
                ))
            })
    }
}

/// 按文件扩展名推断语言（大小写不敏感）
pub fn detect_language(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    let lang = match ext.as_str() {
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "jsx" => "jsx",
        "tsx" => "tsx",
        "java" => "java",
        "cpp" => "cpp",
        "c" => "c",
        "go" => "go",
        "rs" => "rust",
        "rb" => "ruby",
        "php" => "php",
        "html" => "html",
        "css" => "css",
        "md" => "markdown",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "sh" => "bash",
        _ => return None,
    };
    Some(lang)
}

/// 行数：按 '\n' 切分后的段数（空内容为 1 行）
pub fn line_count(content: &str) -> usize {
    content.split('\n').count()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub content: String,
    pub language: Option<String>,
    pub description: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub size_bytes: usize,
    pub lines: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    pub(crate) fn set_content(&mut self, content: String) {
        self.size_bytes = content.len();
        self.lines = line_count(&content);
        self.content = content;
    }

    /// 不含 content 的摘要（用于 list，避免把大段内容塞进 prompt）
    pub fn summary(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "type": self.artifact_type,
            "language": self.language,
            "description": self.description,
            "size_bytes": self.size_bytes,
            "lines": self.lines,
            "created_at": self.created_at,
            "updated_at": self.updated_at,
        })
    }
}

/// create 的入参
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub name: String,
    pub artifact_type: ArtifactType,
    pub content: String,
    pub language: Option<String>,
    pub description: Option<String>,
    pub metadata: Map<String, Value>,
}

impl NewArtifact {
    pub fn new(name: impl Into<String>, artifact_type: ArtifactType, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artifact_type,
            content: content.into(),
            language: None,
            description: None,
            metadata: Map::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// update 的入参：None 表示不修改；metadata 为合并而非替换
#[derive(Debug, Clone, Default)]
pub struct ArtifactUpdate {
    pub content: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("hello.py"), Some("python"));
        assert_eq!(detect_language("README.MD"), Some("markdown"));
        assert_eq!(detect_language("config.yml"), Some("yaml"));
        assert_eq!(detect_language("notes"), None);
        assert_eq!(detect_language("archive.zip"), None);
    }

    #[test]
    fn test_type_parse() {
        assert_eq!("code".parse::<ArtifactType>().unwrap(), ArtifactType::Code);
        assert_eq!("video".parse::<ArtifactType>().unwrap_err().class(), "ValidationError");
    }

    #[test]
    fn test_line_count() {
        assert_eq!(line_count("print('hi')"), 1);
        assert_eq!(line_count("a\nb\n"), 3);
    }
}
