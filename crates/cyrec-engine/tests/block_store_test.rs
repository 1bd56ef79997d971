use cyrec_engine::protocol::{CodeBlock, RecordingState, keys};
use cyrec_engine::storage::{KeyValueStore, MemoryStore};
use cyrec_engine::store::{BlockStore, StoreError};
use serde_json::json;
use std::sync::Arc;

fn block(name: &str) -> CodeBlock {
    CodeBlock::new(format!("stmt {name}"), format!("explain {name}"))
}

async fn store_with(names: &[&str]) -> BlockStore<MemoryStore> {
    let store = BlockStore::new(Arc::new(MemoryStore::new()));
    for name in names {
        store.append(block(name)).await.unwrap();
    }
    store
}

async fn statements(store: &BlockStore<MemoryStore>) -> Vec<String> {
    store
        .blocks()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.statement)
        .collect()
}

#[tokio::test]
async fn test_starts_empty_and_off() {
    let store = store_with(&[]).await;
    assert!(store.is_empty().await.unwrap());
    assert_eq!(store.state().await.unwrap(), RecordingState::Off);
}

#[tokio::test]
async fn test_append_keeps_insertion_order() {
    let store = store_with(&["a", "b", "a"]).await;
    assert_eq!(statements(&store).await, ["stmt a", "stmt b", "stmt a"]);
}

#[tokio::test]
async fn test_replace_last_two_nets_minus_one() {
    let store = store_with(&["visit", "click", "click"]).await;
    store.replace_last_two_with_one(block("dbl")).await.unwrap();
    assert_eq!(statements(&store).await, ["stmt visit", "stmt dbl"]);
}

#[tokio::test]
async fn test_replace_last_two_on_short_lists() {
    let empty = store_with(&[]).await;
    empty.replace_last_two_with_one(block("dbl")).await.unwrap();
    assert_eq!(statements(&empty).await, ["stmt dbl"]);

    let single = store_with(&["click"]).await;
    single.replace_last_two_with_one(block("dbl")).await.unwrap();
    assert_eq!(statements(&single).await, ["stmt dbl"]);
}

#[tokio::test]
async fn test_delete() {
    let store = store_with(&["a", "b", "c"]).await;
    let removed = store.delete(1).await.unwrap();
    assert_eq!(removed, block("b"));
    assert_eq!(statements(&store).await, ["stmt a", "stmt c"]);
}

#[tokio::test]
async fn test_delete_out_of_range_is_an_error() {
    let store = store_with(&["a"]).await;
    let err = store.delete(1).await.unwrap_err();
    assert!(matches!(err, StoreError::IndexOutOfRange { index: 1, len: 1 }));
    assert_eq!(statements(&store).await, ["stmt a"]);
}

#[tokio::test]
async fn test_move_uses_shortened_list() {
    let store = store_with(&["a", "b", "c", "d"]).await;
    // Remove "a", then insert at index 2 of [b, c, d].
    store.move_block(0, 2).await.unwrap();
    assert_eq!(statements(&store).await, ["stmt b", "stmt c", "stmt a", "stmt d"]);

    store.move_block(3, 0).await.unwrap();
    assert_eq!(statements(&store).await, ["stmt d", "stmt b", "stmt c", "stmt a"]);

    // Moving to the end of the shortened list is allowed.
    store.move_block(0, 3).await.unwrap();
    assert_eq!(statements(&store).await, ["stmt b", "stmt c", "stmt a", "stmt d"]);
}

#[tokio::test]
async fn test_move_out_of_range_leaves_list_untouched() {
    let store = store_with(&["a", "b"]).await;
    assert!(matches!(
        store.move_block(2, 0).await,
        Err(StoreError::IndexOutOfRange { index: 2, .. })
    ));
    assert!(matches!(
        store.move_block(0, 2).await,
        Err(StoreError::IndexOutOfRange { index: 2, len: 1 })
    ));
    assert_eq!(statements(&store).await, ["stmt a", "stmt b"]);
}

#[tokio::test]
async fn test_reset_clears_and_forces_off() {
    let store = store_with(&["a", "b"]).await;
    store.set_state(RecordingState::Paused).await.unwrap();
    store.reset().await.unwrap();
    assert!(store.is_empty().await.unwrap());
    assert_eq!(store.state().await.unwrap(), RecordingState::Off);
}

#[tokio::test]
async fn test_set_state_is_unconditional() {
    let store = store_with(&[]).await;
    store.set_state(RecordingState::Paused).await.unwrap();
    store.set_state(RecordingState::Paused).await.unwrap();
    store.set_state(RecordingState::Off).await.unwrap();
    assert_eq!(store.state().await.unwrap(), RecordingState::Off);
}

#[tokio::test]
async fn test_mutations_are_persisted_under_shared_keys() {
    let storage = Arc::new(MemoryStore::new());
    let store = BlockStore::new(storage.clone());
    store.append(CodeBlock::new("cy.get('#a').click()", "Click.")).await.unwrap();
    store.set_state(RecordingState::On).await.unwrap();

    assert_eq!(
        storage.get(keys::CODE_BLOCKS).await.unwrap(),
        Some(json!([{"code": "cy.get('#a').click()", "prompt": "Click."}]))
    );
    assert_eq!(
        storage.get(keys::RECORDING_STATE).await.unwrap(),
        Some(json!("on"))
    );
}

#[tokio::test]
async fn test_readers_are_notified_of_changes() {
    let store = store_with(&[]).await;
    let mut blocks = store.watch_blocks();
    let mut state = store.watch_state();

    store.append(block("a")).await.unwrap();
    store.set_state(RecordingState::On).await.unwrap();

    assert_eq!(
        blocks.changed().await,
        Some(json!([{"code": "stmt a", "prompt": "explain a"}]))
    );
    assert_eq!(state.changed().await, Some(json!("on")));
}
