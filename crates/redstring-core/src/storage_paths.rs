//! Resolves the on-disk layout under `REDSTRING_STATE_DIR`: there is no
//! legacy install to migrate, so this is a single creation pass rather
//! than a migration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct StatePaths {
    pub root: PathBuf,
    pub prompts_dir: PathBuf,
    pub config_path: PathBuf,
}

impl StatePaths {
    pub fn resolve(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            prompts_dir: root.join("prompts"),
            config_path: root.join("config.json"),
        }
    }

    /// Creates `root` and `prompts_dir` if missing. Idempotent.
    pub async fn ensure_exists(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.prompts_dir)
            .await
            .with_context(|| format!("creating state dir {}", self.prompts_dir.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_exists_creates_prompts_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = StatePaths::resolve(tmp.path());
        paths.ensure_exists().await.unwrap();
        assert!(paths.prompts_dir.is_dir());
    }
}
