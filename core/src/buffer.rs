use std::collections::VecDeque;

use crate::operation::Operation;

/// Maximum buffered `(version, operation)` pairs per document. Older
/// entries are dropped; clients lagging further than this must re-join.
pub const OPERATION_BUFFER_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedOperation {
    pub version: u64,
    pub operation: Operation,
}

/// Bounded, version-ordered log of recently accepted operations, used to
/// transform lagging client operations up to the current version.
#[derive(Debug, Default)]
pub struct OperationBuffer {
    entries: VecDeque<BufferedOperation>,
}

impl OperationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an accepted operation. `version` must be strictly greater
    /// than the last buffered version.
    pub fn push(&mut self, version: u64, operation: Operation) {
        debug_assert!(
            self.entries.back().map_or(true, |e| e.version < version),
            "operation buffer versions must be strictly increasing"
        );
        self.entries.push_back(BufferedOperation { version, operation });
        while self.entries.len() > OPERATION_BUFFER_LIMIT {
            self.entries.pop_front();
        }
    }

    /// Entries with `version > after`, in increasing version order.
    pub fn entries_after(&self, after: u64) -> impl Iterator<Item = &BufferedOperation> {
        self.entries.iter().filter(move |e| e.version > after)
    }

    pub fn last_version(&self) -> Option<u64> {
        self.entries.back().map(|e| e.version)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_after_filters_by_version() {
        let mut buffer = OperationBuffer::new();
        for v in 2..=10 {
            buffer.push(v, Operation::insert(0, "x", v - 1));
        }

        let versions: Vec<u64> = buffer.entries_after(7).map(|e| e.version).collect();
        assert_eq!(versions, vec![8, 9, 10]);
        assert_eq!(buffer.entries_after(10).count(), 0);
    }

    #[test]
    fn buffer_drops_oldest_beyond_limit() {
        let mut buffer = OperationBuffer::new();
        for v in 1..=(OPERATION_BUFFER_LIMIT as u64 + 50) {
            buffer.push(v, Operation::insert(0, "x", v.saturating_sub(1)));
        }

        assert_eq!(buffer.len(), OPERATION_BUFFER_LIMIT);
        let oldest = buffer.entries_after(0).next().unwrap().version;
        assert_eq!(oldest, 51);
        assert_eq!(buffer.last_version(), Some(OPERATION_BUFFER_LIMIT as u64 + 50));
    }

    #[test]
    fn clear_empties_the_buffer() {
        let mut buffer = OperationBuffer::new();
        buffer.push(2, Operation::insert(0, "x", 1));
        assert!(!buffer.is_empty());
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
