//! Offline operations on a recorded session, shared by the subcommands.

use cyrec_engine::config::schema::ExportConfig;
use cyrec_engine::formatter::{CypressDialect, render_export};
use cyrec_engine::protocol::ContentType;
use cyrec_engine::storage::KeyValueStore;
use cyrec_engine::store::{BlockStore, StoreError};
use std::fmt::Write;

pub async fn export<S: KeyValueStore + ?Sized>(
    store: &BlockStore<S>,
    content: ContentType,
    names: &ExportConfig,
) -> Result<String, StoreError> {
    let blocks = store.blocks().await?;
    Ok(render_export(
        &CypressDialect,
        &blocks,
        content,
        &names.suite_name,
        &names.test_name,
    ))
}

pub async fn list_blocks<S: KeyValueStore + ?Sized>(
    store: &BlockStore<S>,
    json: bool,
) -> anyhow::Result<String> {
    let blocks = store.blocks().await?;
    if json {
        return Ok(serde_json::to_string_pretty(&blocks)?);
    }
    if blocks.is_empty() {
        return Ok("No recorded blocks.".to_string());
    }
    let mut out = String::new();
    for (i, block) in blocks.iter().enumerate() {
        writeln!(out, "{:>3}  {}", i, block.statement)?;
        writeln!(out, "     // {}", block.explanation)?;
    }
    Ok(out.trim_end().to_string())
}

pub async fn delete<S: KeyValueStore + ?Sized>(
    store: &BlockStore<S>,
    index: usize,
) -> Result<String, StoreError> {
    let removed = store.delete(index).await?;
    Ok(format!("Deleted block {}: {}", index, removed.statement))
}

pub async fn move_block<S: KeyValueStore + ?Sized>(
    store: &BlockStore<S>,
    from: usize,
    to: usize,
) -> Result<String, StoreError> {
    store.move_block(from, to).await?;
    Ok(format!("Moved block {} to {}", from, to))
}

pub async fn reset<S: KeyValueStore + ?Sized>(store: &BlockStore<S>) -> Result<String, StoreError> {
    store.reset().await?;
    Ok("Recording reset.".to_string())
}

pub async fn state<S: KeyValueStore + ?Sized>(store: &BlockStore<S>) -> Result<String, StoreError> {
    let state = store.state().await?;
    let count = store.len().await?;
    Ok(format!("Recording is {} ({} blocks)", state, count))
}
