//! Identifier Allocator
//!
//! Hands out message identifiers from a look-ahead buffer reserved against the
//! store's persisted sequence counter.

use crate::error::StorageError;
use crate::store::ConversationStore;
use crate::types::MessageId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Default number of identifiers reserved per refill.
pub const DEFAULT_BLOCK_SIZE: u64 = 100;

/// Concurrency-safe message identifier allocator.
///
/// Every refill reserves a fresh range from the store, so identifiers advanced
/// by another process or a prior crash are never reissued. A caller that finds
/// the buffer empty refills it while holding the lock; other callers wait.
///
/// Buffered identifiers are only handed out while no other writer has moved
/// the store's sequence past the current block. Once it has, the rest of the
/// block is dropped so identifier order keeps matching creation order across
/// instances sharing a store.
pub struct IdAllocator {
    store: Arc<dyn ConversationStore>,
    buffer: Mutex<Block>,
    block_size: u64,
}

/// Unused part of the current reservation and its last identifier.
#[derive(Debug, Default)]
struct Block {
    ids: VecDeque<MessageId>,
    last: MessageId,
}

impl IdAllocator {
    pub fn new(store: Arc<dyn ConversationStore>, block_size: u64) -> Self {
        Self {
            store,
            buffer: Mutex::new(Block::default()),
            block_size: block_size.max(1),
        }
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Next identifier, strictly greater than any handed out before and than
    /// any reserved by another writer so far.
    pub fn next_id(&self) -> Result<MessageId, StorageError> {
        let mut block = self.buffer.lock();
        if !block.ids.is_empty() {
            let high_water = self.store.sequence_high_water()?;
            if high_water > block.last {
                debug!(
                    high_water,
                    block_last = block.last,
                    dropped = block.ids.len(),
                    "Sequence moved past buffered ids, dropping them"
                );
                block.ids.clear();
            }
        }
        if let Some(id) = block.ids.pop_front() {
            return Ok(id);
        }

        let reserved = self.store.reserve_ids(self.block_size)?;
        debug!(
            start = reserved.start,
            end = reserved.end,
            "Refilled message id buffer"
        );
        block.last = reserved.end.saturating_sub(1);
        block.ids.extend(reserved);
        block.ids.pop_front().ok_or_else(|| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "Empty identifier reservation",
            ))
        })
    }

    /// Drop buffered identifiers; the next call reserves a fresh block.
    ///
    /// Dropped identifiers are never reused, leaving a gap in the sequence.
    pub fn reset(&self) {
        self.buffer.lock().ids.clear();
    }

    /// Identifiers currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.lock().ids.len()
    }
}
