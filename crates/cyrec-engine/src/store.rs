use crate::storage::{self, KeyValueStore, KeyWatcher, StorageError};
use cyrec_common::protocol::{CodeBlock, RecordingState, keys};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Block index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Ordered list of recorded blocks plus the recording state, both persisted.
///
/// Every mutation is a read-modify-write of the `code-blocks` key performed
/// under an in-process lock. Writers in other processes are not arbitrated.
pub struct BlockStore<S: ?Sized> {
    storage: Arc<S>,
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore + ?Sized> BlockStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub async fn blocks(&self) -> Result<Vec<CodeBlock>, StoreError> {
        Ok(storage::load(self.storage.as_ref(), keys::CODE_BLOCKS)
            .await?
            .unwrap_or_default())
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.blocks().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    pub async fn state(&self) -> Result<RecordingState, StoreError> {
        Ok(storage::load(self.storage.as_ref(), keys::RECORDING_STATE)
            .await?
            .unwrap_or_default())
    }

    /// Unconditional transition; legality is the caller's concern.
    pub async fn set_state(&self, state: RecordingState) -> Result<(), StoreError> {
        debug!("Recording state -> {}", state);
        storage::save(self.storage.as_ref(), keys::RECORDING_STATE, &state).await?;
        Ok(())
    }

    pub async fn append(&self, block: CodeBlock) -> Result<(), StoreError> {
        self.mutate(|blocks| {
            blocks.push(block);
            Ok(())
        })
        .await
    }

    /// Drops the last two blocks (or as many as exist) and appends `block`.
    pub async fn replace_last_two_with_one(&self, block: CodeBlock) -> Result<(), StoreError> {
        self.mutate(|blocks| {
            let keep = blocks.len().saturating_sub(2);
            blocks.truncate(keep);
            blocks.push(block);
            Ok(())
        })
        .await
    }

    pub async fn delete(&self, index: usize) -> Result<CodeBlock, StoreError> {
        let mut removed = None;
        self.mutate(|blocks| {
            if index >= blocks.len() {
                return Err(StoreError::IndexOutOfRange {
                    index,
                    len: blocks.len(),
                });
            }
            removed = Some(blocks.remove(index));
            Ok(())
        })
        .await?;
        removed.ok_or(StoreError::IndexOutOfRange { index, len: 0 })
    }

    /// Removes the block at `from` and inserts it at `to` in the shortened list.
    pub async fn move_block(&self, from: usize, to: usize) -> Result<(), StoreError> {
        self.mutate(|blocks| {
            if from >= blocks.len() {
                return Err(StoreError::IndexOutOfRange {
                    index: from,
                    len: blocks.len(),
                });
            }
            let block = blocks.remove(from);
            if to > blocks.len() {
                let len = blocks.len();
                blocks.insert(from, block);
                return Err(StoreError::IndexOutOfRange { index: to, len });
            }
            blocks.insert(to, block);
            Ok(())
        })
        .await
    }

    /// Clears all blocks and forces the state to `Off`.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        storage::save(self.storage.as_ref(), keys::RECORDING_STATE, &RecordingState::Off).await?;
        storage::save(self.storage.as_ref(), keys::CODE_BLOCKS, &Vec::<CodeBlock>::new()).await?;
        Ok(())
    }

    pub fn watch_blocks(&self) -> KeyWatcher {
        KeyWatcher::new(self.storage.as_ref(), keys::CODE_BLOCKS)
    }

    pub fn watch_state(&self) -> KeyWatcher {
        KeyWatcher::new(self.storage.as_ref(), keys::RECORDING_STATE)
    }

    async fn mutate<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Vec<CodeBlock>) -> Result<(), StoreError>,
    {
        let _guard = self.write_lock.lock().await;
        let mut blocks = self.blocks().await?;
        f(&mut blocks)?;
        storage::save(self.storage.as_ref(), keys::CODE_BLOCKS, &blocks).await?;
        Ok(())
    }
}
