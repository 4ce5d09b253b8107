//! Loads the hidden system prompt, domain appendix, and planner prompt
//! from `prompts_dir` at process start. Each is treated as an opaque configuration string;
//! this core never parses or transforms them. A file missing from
//! `prompts_dir` falls back to [`redstring_pipeline::planner::PromptLibrary::default`]'s
//! built-in text rather than failing startup, so a bare `.redstring/`
//! directory still boots.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use redstring_pipeline::planner::PromptLibrary;

const HIDDEN_SYSTEM_PROMPT_FILE: &str = "hidden_system_prompt.txt";
const DOMAIN_APPENDIX_FILE: &str = "domain_appendix.txt";
const PLANNER_PROMPT_FILE: &str = "planner_prompt.txt";

pub struct PromptStore {
    library: PromptLibrary,
}

impl PromptStore {
    /// Reads each prompt file under `prompts_dir` if present, otherwise
    /// keeps the built-in default for that slot.
    pub async fn load(prompts_dir: &Path) -> Result<Self> {
        let defaults = PromptLibrary::default();
        let hidden_system_prompt = read_or_default(prompts_dir, HIDDEN_SYSTEM_PROMPT_FILE, &defaults.hidden_system_prompt).await;
        let domain_appendix = read_or_default(prompts_dir, DOMAIN_APPENDIX_FILE, &defaults.domain_appendix).await;
        let planner_prompt = read_or_default(prompts_dir, PLANNER_PROMPT_FILE, &defaults.planner_prompt).await;

        Ok(Self {
            library: PromptLibrary {
                hidden_system_prompt,
                domain_appendix,
                planner_prompt,
            },
        })
    }

    /// The only accessor: hands the assembled library to the Planner.
    /// There is deliberately no way to read the individual strings back
    /// out through this store.
    pub fn library(&self) -> PromptLibrary {
        self.library.clone()
    }
}

async fn read_or_default(dir: &Path, file_name: &str, default: &Arc<str>) -> Arc<str> {
    match tokio::fs::read_to_string(dir.join(file_name)).await {
        Ok(contents) if !contents.trim().is_empty() => Arc::from(contents),
        _ => default.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_prompt_files_fall_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PromptStore::load(tmp.path()).await.unwrap();
        let library = store.library();
        assert_eq!(library.hidden_system_prompt, PromptLibrary::default().hidden_system_prompt);
    }

    #[tokio::test]
    async fn present_prompt_file_overrides_default() {
        let tmp = tempfile::tempdir().unwrap();
        tokio::fs::write(tmp.path().join(PLANNER_PROMPT_FILE), "Custom planner prompt.").await.unwrap();
        let store = PromptStore::load(tmp.path()).await.unwrap();
        assert_eq!(store.library().planner_prompt.as_ref(), "Custom planner prompt.");
    }
}
