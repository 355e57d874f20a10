use std::collections::VecDeque;

use crate::ids::UserId;
use crate::operation::Operation;

/// Conformant client-side send queue.
///
/// The client keeps a FIFO of pending local operations and at most one
/// operation in flight. `baseVersion` is stamped when an operation is
/// handed to the transport, not when the edit was made, so an op that
/// waited behind an ack goes out against the latest known version.
#[derive(Debug)]
pub struct EditorClient {
    user_id: UserId,
    content: String,
    version: u64,
    queue: VecDeque<Operation>,
    in_flight: Option<Operation>,
}

impl EditorClient {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            content: String::new(),
            version: 0,
            queue: VecDeque::new(),
            in_flight: None,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Adopt an authoritative `document_state`. Pending and in-flight
    /// operations are dropped; this is the re-join pathway.
    pub fn adopt_snapshot(&mut self, content: impl Into<String>, version: u64) {
        self.content = content.into();
        self.version = version;
        self.queue.clear();
        self.in_flight = None;
    }

    /// Record a local edit: diff old vs new text into a minimal
    /// delete/insert pair, apply optimistically, and enqueue.
    pub fn edit(&mut self, new_text: &str) {
        let ops = diff_operations(&self.content, new_text);
        self.content = new_text.to_owned();
        self.queue.extend(ops);
    }

    /// Hand the next queued operation to the transport, if nothing is in
    /// flight. The returned operation carries the current known version.
    pub fn try_send_next(&mut self) -> Option<Operation> {
        if self.in_flight.is_some() {
            return None;
        }
        let op = self.queue.pop_front()?.with_base_version(self.version);
        self.in_flight = Some(op.clone());
        Some(op)
    }

    /// Handle `operation_ack`: adopt the acked version, clear the in-flight
    /// slot, and hand out the next queued operation if any.
    pub fn handle_ack(&mut self, version: u64) -> Option<Operation> {
        self.version = version;
        self.in_flight = None;
        self.try_send_next()
    }

    /// Handle `remote_operation`. Versions at or below the current known
    /// version are ignored; the version field is authoritative.
    pub fn handle_remote(&mut self, operation: &Operation, version: u64) {
        if version <= self.version {
            return;
        }
        self.content = operation.apply(&self.content);
        self.version = version;
    }
}

/// Minimal delete/insert pair turning `old` into `new`: the longest common
/// prefix and suffix bracket the changed region, in UTF-16 code units.
/// Base versions are placeholders until send time.
pub fn diff_operations(old: &str, new: &str) -> Vec<Operation> {
    let old_units: Vec<u16> = old.encode_utf16().collect();
    let new_units: Vec<u16> = new.encode_utf16().collect();

    let max_prefix = old_units.len().min(new_units.len());
    let mut prefix = 0;
    while prefix < max_prefix && old_units[prefix] == new_units[prefix] {
        prefix += 1;
    }

    let max_suffix = max_prefix - prefix;
    let mut suffix = 0;
    while suffix < max_suffix
        && old_units[old_units.len() - 1 - suffix] == new_units[new_units.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let deleted = old_units.len() - prefix - suffix;
    let inserted = &new_units[prefix..new_units.len() - suffix];

    let mut ops = Vec::new();
    if deleted > 0 {
        ops.push(Operation::delete(prefix as u32, deleted as u32, 0));
    }
    if !inserted.is_empty() {
        ops.push(Operation::insert(
            prefix as u32,
            String::from_utf16_lossy(inserted),
            0,
        ));
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(content: &str, version: u64) -> EditorClient {
        let mut c = EditorClient::new(UserId::from("u1"));
        c.adopt_snapshot(content, version);
        c
    }

    #[test]
    fn diff_produces_minimal_insert() {
        assert_eq!(diff_operations("AC", "ABC"), vec![Operation::insert(1, "B", 0)]);
        assert_eq!(diff_operations("", "hi"), vec![Operation::insert(0, "hi", 0)]);
    }

    #[test]
    fn diff_produces_minimal_delete() {
        assert_eq!(diff_operations("HELLO", "HO"), vec![Operation::delete(1, 3, 0)]);
        assert_eq!(diff_operations("hi", ""), vec![Operation::delete(0, 2, 0)]);
    }

    #[test]
    fn diff_replacement_is_delete_then_insert() {
        assert_eq!(
            diff_operations("abcd", "aXYd"),
            vec![Operation::delete(1, 2, 0), Operation::insert(1, "XY", 0)]
        );
        assert!(diff_operations("same", "same").is_empty());
    }

    #[test]
    fn diff_counts_utf16_units() {
        // The emoji occupies two code units before the changed region.
        assert_eq!(
            diff_operations("😀a", "😀ba"),
            vec![Operation::insert(2, "b", 0)]
        );
    }

    #[test]
    fn at_most_one_operation_in_flight() {
        let mut c = client("", 3);
        c.edit("a");
        c.edit("ab");
        assert_eq!(c.pending_len(), 2);

        let first = c.try_send_next().expect("first send");
        assert_eq!(first.base_version(), 3);
        assert!(c.has_in_flight());

        // Nothing else may go out until the ack arrives.
        assert!(c.try_send_next().is_none());

        let second = c.handle_ack(4).expect("queued op released by ack");
        assert_eq!(second.base_version(), 4);
        assert!(c.has_in_flight());
        assert!(c.handle_ack(5).is_none());
        assert!(!c.has_in_flight());
    }

    #[test]
    fn base_version_is_stamped_at_send_time() {
        let mut c = client("x", 1);
        c.edit("xy");

        // A remote operation advances the known version before we send.
        c.handle_remote(&Operation::insert(0, "Q", 1), 2);
        let sent = c.try_send_next().unwrap();
        assert_eq!(sent.base_version(), 2);
    }

    #[test]
    fn remote_operations_below_current_version_are_ignored() {
        let mut c = client("AC", 5);
        c.handle_remote(&Operation::insert(1, "B", 1), 5);
        assert_eq!(c.content(), "AC");

        c.handle_remote(&Operation::insert(1, "B", 1), 6);
        assert_eq!(c.content(), "ABC");
        assert_eq!(c.version(), 6);
    }

    #[test]
    fn rejoin_drops_queue_and_in_flight() {
        let mut c = client("abc", 2);
        c.edit("abcd");
        c.try_send_next();
        c.edit("abcde");
        assert!(c.has_in_flight());
        assert_eq!(c.pending_len(), 1);

        c.adopt_snapshot("fresh", 9);
        assert!(!c.has_in_flight());
        assert_eq!(c.pending_len(), 0);
        assert_eq!(c.content(), "fresh");
        assert_eq!(c.version(), 9);
    }
}
