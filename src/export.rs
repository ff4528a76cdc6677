//! Dump fetched search items as JSON.
//!
//! Items are written exactly as the provider returned them, in fetch
//! order, so a dump can be inspected or replayed without the database.

use anyhow::{Context, Result};
use std::path::Path;

/// Write `items` to `path` as a pretty-printed JSON array, creating parent
/// directories as needed.
pub fn write_items(path: &Path, items: &[serde_json::Value]) -> Result<()> {
    let json = serde_json::to_string_pretty(items)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!(path = %path.display(), items = items.len(), "dumped raw items");
    Ok(())
}
