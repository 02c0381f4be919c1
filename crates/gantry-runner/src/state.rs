//! Durable supervisor state (`state.json`), written atomically.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::errors::{Result, RunnerError};
use crate::types::StateFile;

/// Load supervisor state from disk. A missing file is an empty state.
pub fn load_state(path: &Path) -> Result<StateFile> {
    if !path.exists() {
        return Ok(StateFile::empty());
    }
    let contents = fs::read_to_string(path)?;
    let state: StateFile = serde_json::from_str(&contents)
        .map_err(|e| RunnerError::State(format!("parse {}: {e}", path.display())))?;
    debug!(path = %path.display(), tasks = state.tasks.len(), "supervisor state loaded");
    Ok(state)
}

/// Atomically write supervisor state (temp file + rename).
pub fn save_state(path: &Path, state: &StateFile) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| RunnerError::State(format!("state path has no parent: {}", path.display())))?;
    fs::create_dir_all(parent)?;
    let mut buf = serde_json::to_string_pretty(state)
        .map_err(|e| RunnerError::State(format!("serialize state: {e}")))?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &buf)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
