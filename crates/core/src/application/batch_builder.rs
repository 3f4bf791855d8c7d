// Batch Builder - partitions the candidate stream into fixed-size batches
//
// Strict FIFO: items leave in discovery order, batches are never reordered
// or merged, and only the trailing batch may be partial.

use crate::domain::{Batch, BatchId, SourceItem};
use tracing::debug;

pub struct BatchBuilder {
    max_size: usize,
    next_id: BatchId,
    pending: Vec<SourceItem>,
}

impl BatchBuilder {
    /// `max_size` is the validated batch size (at least 1)
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            max_size,
            next_id: 1,
            pending: Vec::with_capacity(max_size),
        }
    }

    /// Buffer one item; returns a full batch once `max_size` items are buffered
    pub fn push(&mut self, item: SourceItem) -> Option<Batch> {
        self.pending.push(item);
        if self.pending.len() >= self.max_size {
            self.emit()
        } else {
            None
        }
    }

    /// Flush the trailing partial batch when the candidate stream is exhausted
    pub fn finish(&mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            None
        } else {
            self.emit()
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn emit(&mut self) -> Option<Batch> {
        let items = std::mem::replace(&mut self.pending, Vec::with_capacity(self.max_size));
        let batch = Batch {
            id: self.next_id,
            items,
            max_size: self.max_size,
        };
        self.next_id += 1;
        debug!(batch_id = batch.id, size = batch.len(), "Batch ready");
        Some(batch)
    }
}
