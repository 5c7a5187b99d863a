//! Write batch model
//!
//! Ordered write operations that a store commits atomically. The synchronizer
//! and deleter build batches; stores only ever see whole batches.

use bson::{DateTime, Document};

/// A single write operation within a batch
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert a new root record. A duplicate `(namespace, record)` fails the
    /// whole batch with `AlreadyExists` and nothing is applied.
    InsertRecord {
        namespace: String,
        record: String,
        fields: Document,
        created_at: DateTime,
        updated_at: DateTime,
    },

    /// Merge fields into an existing root record; unnamed fields survive
    MergeRecord {
        namespace: String,
        record: String,
        fields: Document,
        updated_at: DateTime,
    },

    /// Insert one child item into a named set; the store assigns the item id
    InsertChild {
        namespace: String,
        record: String,
        set: String,
        fields: Document,
    },

    /// Delete one child item by id
    DeleteChild {
        namespace: String,
        record: String,
        set: String,
        item: String,
    },

    /// Delete every member of one child set
    ClearChildSet {
        namespace: String,
        record: String,
        set: String,
    },

    /// Delete a root record document
    DeleteRecord { namespace: String, record: String },
}

/// Ordered list of write operations applied atomically by a store
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Split into sequential batches of at most `max_ops` operations each,
    /// preserving order. An empty batch yields no chunks.
    pub fn into_chunks(self, max_ops: usize) -> Vec<WriteBatch> {
        let max_ops = max_ops.max(1);
        let mut chunks = Vec::new();
        let mut current = Vec::new();

        for op in self.ops {
            current.push(op);
            if current.len() == max_ops {
                chunks.push(WriteBatch {
                    ops: std::mem::take(&mut current),
                });
            }
        }

        if !current.is_empty() {
            chunks.push(WriteBatch { ops: current });
        }

        chunks
    }
}
