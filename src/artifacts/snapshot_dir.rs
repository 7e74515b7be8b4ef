//! 快照目录沙箱：工具调用给出的 export / import 路径只能落在 snapshot_dir 之下

use std::path::{Component, Path, PathBuf};

use crate::core::AgentError;

#[derive(Debug, Clone)]
pub struct SnapshotDir {
    root: PathBuf,
}

impl SnapshotDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 把相对路径解析到根目录下；绝对路径、`..`、经符号链接逃逸均返回 Validation
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let escape = || {
            AgentError::Validation(format!(
                "snapshot path '{path}' must stay inside the snapshot directory"
            ))
        };

        let mut relative = PathBuf::new();
        for component in Path::new(path.trim()).components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::CurDir => {}
                // 如 /etc/passwd、../../x、C:\x
                _ => return Err(escape()),
            }
        }
        if relative.as_os_str().is_empty() {
            return Err(AgentError::Validation(
                "snapshot path must name a file".to_string(),
            ));
        }

        let full = self.root.join(&relative);
        if let Ok(root_canon) = self.root.canonicalize() {
            let mut existing = full.as_path();
            while !existing.exists() {
                match existing.parent() {
                    Some(parent) => existing = parent,
                    None => break,
                }
            }
            if let Ok(canon) = existing.canonicalize() {
                if !canon.starts_with(&root_canon) {
                    return Err(escape());
                }
            }
        }
        Ok(full)
    }
}

impl Default for SnapshotDir {
    fn default() -> Self {
        Self::new("snapshots")
    }
}
