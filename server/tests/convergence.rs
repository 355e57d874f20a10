// End-to-end convergence scenarios driven through the OT engine and the
// conformant client send-queue, without a live transport.

use std::sync::Arc;

use quillpad_core::client::EditorClient;
use quillpad_core::document::DocumentRecord;
use quillpad_core::ids::{DocId, UserId};
use quillpad_core::operation::Operation;
use quillpad_core::store::{DocumentStore, MemoryDocumentStore};
use quillpad_server::engine::DocEngine;

async fn seeded_engine(content: &str) -> (DocEngine, DocId) {
    let store = Arc::new(MemoryDocumentStore::new());
    let doc_id = DocId::from("doc-1");
    let mut record = DocumentRecord::new(doc_id.clone(), "Scenario", UserId::from("owner"));
    record.content = content.to_owned();
    store.create(record).await.unwrap();

    let engine = DocEngine::new(store);
    engine.ensure(&doc_id);
    (engine, doc_id)
}

async fn server_content(engine: &DocEngine, doc_id: &DocId) -> (String, u64) {
    let record = engine.store().get_by_id(doc_id).await.unwrap().unwrap();
    (record.content, record.version)
}

fn client_for(user: &str, content: &str, version: u64) -> EditorClient {
    let mut client = EditorClient::new(UserId::from(user));
    client.adopt_snapshot(content, version);
    client
}

#[tokio::test]
async fn concurrent_inserts_at_the_same_position_converge() {
    // Content "AC" at version 1; both clients insert at position 1 before
    // either sees an ack.
    let (engine, doc_id) = seeded_engine("AC").await;
    let mut c1 = client_for("u1", "AC", 1);
    let mut c2 = client_for("u2", "AC", 1);

    c1.edit("ABC");
    c2.edit("AXC");
    let op1 = c1.try_send_next().unwrap();
    let op2 = c2.try_send_next().unwrap();
    assert_eq!(op1.base_version(), 1);
    assert_eq!(op2.base_version(), 1);

    let a1 = engine
        .process_operation(&doc_id, op1, c1.user_id())
        .await
        .unwrap();
    assert_eq!(a1.version, 2);
    c1.handle_ack(a1.version);
    c2.handle_remote(&a1.operation, a1.version);

    let a2 = engine
        .process_operation(&doc_id, op2, c2.user_id())
        .await
        .unwrap();
    assert_eq!(a2.version, 3);
    assert_eq!(a2.operation, Operation::insert(2, "X", 1));
    c2.handle_ack(a2.version);
    c1.handle_remote(&a2.operation, a2.version);

    let (content, version) = server_content(&engine, &doc_id).await;
    assert_eq!(content, "ABXC");
    assert_eq!(version, 3);
    assert_eq!(c1.content(), "ABXC");
    assert_eq!(c2.content(), "ABXC");
    assert_eq!(c1.version(), 3);
    assert_eq!(c2.version(), 3);
}

#[tokio::test]
async fn insert_against_concurrent_delete_shifts_into_place() {
    // "HELLO": one client removes "ELL" while the other appends before "O".
    let (engine, doc_id) = seeded_engine("HELLO").await;
    let mut c1 = client_for("u1", "HELLO", 1);
    let mut c2 = client_for("u2", "HELLO", 1);

    c1.edit("HO");
    c2.edit("HELLXO");
    let op1 = c1.try_send_next().unwrap();
    let op2 = c2.try_send_next().unwrap();
    assert_eq!(op2, Operation::insert(4, "X", 1));

    let a1 = engine
        .process_operation(&doc_id, op1, c1.user_id())
        .await
        .unwrap();
    c1.handle_ack(a1.version);
    c2.handle_remote(&a1.operation, a1.version);

    let a2 = engine
        .process_operation(&doc_id, op2, c2.user_id())
        .await
        .unwrap();
    assert_eq!(a2.operation, Operation::insert(1, "X", 1));
    c2.handle_ack(a2.version);
    c1.handle_remote(&a2.operation, a2.version);

    let (content, version) = server_content(&engine, &doc_id).await;
    assert_eq!(content, "HXO");
    assert_eq!(version, 3);
    assert_eq!(c1.content(), "HXO");
    assert_eq!(c2.content(), "HXO");
}

#[tokio::test]
async fn overlapping_deletes_collapse_to_noop() {
    // "ABCDE": the second delete is fully covered by the first.
    let (engine, doc_id) = seeded_engine("ABCDE").await;
    let u1 = UserId::from("u1");
    let u2 = UserId::from("u2");

    let a1 = engine
        .process_operation(&doc_id, Operation::delete(1, 3, 1), &u1)
        .await
        .unwrap();
    assert_eq!(a1.version, 2);

    let a2 = engine
        .process_operation(&doc_id, Operation::delete(2, 2, 1), &u2)
        .await
        .unwrap();

    // The ack carries the noop marker and the unchanged version.
    assert_eq!(a2.operation, Operation::Noop);
    assert_eq!(a2.version, 2);

    let (content, version) = server_content(&engine, &doc_id).await;
    assert_eq!(content, "AE");
    assert_eq!(version, 2);
}

#[tokio::test]
async fn stale_base_version_folds_through_the_whole_buffer() {
    let (engine, doc_id) = seeded_engine("").await;
    let u1 = UserId::from("u1");
    let u2 = UserId::from("u2");

    // Three accepted operations move the document to version 4.
    for (pos, text, base) in [(0, "a", 1), (1, "b", 2), (2, "c", 3)] {
        engine
            .process_operation(&doc_id, Operation::insert(pos, text, base), &u1)
            .await
            .unwrap();
    }
    let (content, version) = server_content(&engine, &doc_id).await;
    assert_eq!((content.as_str(), version), ("abc", 4));

    // A client still at version 1 submits; the op is transformed against
    // buffered versions 2, 3 and 4 in order, then applied at version 5.
    let accepted = engine
        .process_operation(&doc_id, Operation::insert(0, "X", 1), &u2)
        .await
        .unwrap();
    assert_eq!(accepted.version, 5);
    assert_eq!(accepted.operation, Operation::insert(3, "X", 1));

    let (content, version) = server_content(&engine, &doc_id).await;
    assert_eq!((content.as_str(), version), ("abcX", 5));
}

#[tokio::test]
async fn observers_converge_under_redelivery() {
    // Two observers receive the same accepted operations; one sees
    // duplicates. Version gating makes redelivery harmless.
    let (engine, doc_id) = seeded_engine("base").await;
    let editor = UserId::from("editor");

    let mut accepted = Vec::new();
    for (op, base) in [
        (Operation::insert(4, "!", 1), 1),
        (Operation::delete(0, 2, 2), 2),
        (Operation::insert(0, "Re", 3), 3),
    ] {
        let result = engine
            .process_operation(&doc_id, op.with_base_version(base), &editor)
            .await
            .unwrap();
        accepted.push(result);
    }

    let mut clean = client_for("watcher-1", "base", 1);
    let mut noisy = client_for("watcher-2", "base", 1);

    for a in &accepted {
        clean.handle_remote(&a.operation, a.version);
        // The noisy path redelivers every frame twice.
        noisy.handle_remote(&a.operation, a.version);
        noisy.handle_remote(&a.operation, a.version);
    }

    let (content, _) = server_content(&engine, &doc_id).await;
    assert_eq!(clean.content(), content);
    assert_eq!(noisy.content(), content);
    assert_eq!(clean.content(), "Rese!");
}

#[tokio::test]
async fn ack_versions_increase_strictly_per_accepted_operation() {
    let (engine, doc_id) = seeded_engine("").await;
    let editor = UserId::from("editor");

    let mut last = 1;
    for i in 0..20u32 {
        let accepted = engine
            .process_operation(
                &doc_id,
                Operation::insert(i, "x", last),
                &editor,
            )
            .await
            .unwrap();
        assert_eq!(accepted.version, last + 1);
        last = accepted.version;
    }
    assert_eq!(last, 21);
}

#[tokio::test]
async fn queued_edits_drain_one_ack_at_a_time() {
    // A client types three times in a burst; each operation goes out only
    // after the previous ack, stamped with the fresh version.
    let (engine, doc_id) = seeded_engine("").await;
    let mut client = client_for("typist", "", 1);

    client.edit("h");
    client.edit("he");
    client.edit("hey");

    let mut next = client.try_send_next();
    while let Some(op) = next {
        assert!(client.has_in_flight());
        let accepted = engine
            .process_operation(&doc_id, op, client.user_id())
            .await
            .unwrap();
        next = client.handle_ack(accepted.version);
    }

    let (content, version) = server_content(&engine, &doc_id).await;
    assert_eq!(content, "hey");
    assert_eq!(version, 4);
    assert_eq!(client.content(), "hey");
    assert_eq!(client.version(), 4);
}
