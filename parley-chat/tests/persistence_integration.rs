//! Integration tests for the durable RocksDB backend.
//!
//! Verifies that room membership, message order, soft-delete marks and
//! hard clears survive a store reopen, and that the full server pipeline
//! runs over the durable backend unchanged.

use parley_chat::broadcast::RoomManager;
use parley_chat::client::{ChatClient, ChatEvent};
use parley_chat::gateway::{OpenDirectory, SessionGateway};
use parley_chat::protocol::Account;
use parley_chat::room::room_id_for;
use parley_chat::server::{ChatServer, ServerConfig};
use parley_chat::storage::{RocksStore, RoomStore, StoreConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

fn gateway_over(store: Arc<dyn RoomStore>) -> SessionGateway {
    SessionGateway::new(
        store,
        Arc::new(OpenDirectory),
        Arc::new(RoomManager::new(64)),
        Duration::from_secs(2),
    )
}

async fn wait_for_history(events: &mut tokio::sync::mpsc::Receiver<ChatEvent>) {
    loop {
        match timeout(Duration::from_secs(2), events.recv()).await {
            Ok(Some(ChatEvent::History { .. })) => break,
            Ok(Some(_)) => continue,
            other => panic!("expected history after join, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_conversation_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");
    let room_id = room_id_for("admin", "user-1").unwrap();

    {
        let store = Arc::new(RocksStore::open(StoreConfig::for_testing(path.clone())).unwrap());
        let gw = gateway_over(store);

        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();
        gw.join(&room_id, &Account::new("admin", "Asha"), conn_a)
            .await
            .unwrap();
        gw.join(&room_id, &Account::new("user-1", "Binh"), conn_b)
            .await
            .unwrap();

        gw.send(
            &room_id,
            parley_chat::protocol::ChatMessage::text("m1", "admin", "Asha", "hello", 1),
            conn_a,
        )
        .await
        .unwrap();
        gw.send(
            &room_id,
            parley_chat::protocol::ChatMessage::text("m2", "user-1", "Binh", "hi", 2),
            conn_b,
        )
        .await
        .unwrap();
        gw.delete_message(&room_id, "m1", "user-1", false, conn_b)
            .await
            .unwrap();
    }

    // Reopen: a fresh gateway over the same database sees everything
    let store = Arc::new(RocksStore::open(StoreConfig::for_testing(path)).unwrap());
    let gw = gateway_over(store);

    let (history, _rx) = gw
        .join(&room_id, &Account::new("admin", "Asha"), Uuid::new_v4())
        .await
        .unwrap();

    let ids: Vec<&str> = history.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
    assert!(history[0].is_deleted_for("user-1"));
    assert!(!history[0].is_deleted_for("admin"));
}

#[tokio::test]
async fn test_clear_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");
    let room_id = room_id_for("a", "b").unwrap();

    {
        let store = Arc::new(RocksStore::open(StoreConfig::for_testing(path.clone())).unwrap());
        let gw = gateway_over(store);

        let conn = Uuid::new_v4();
        gw.join(&room_id, &Account::new("a", "Alice"), conn)
            .await
            .unwrap();
        gw.send(
            &room_id,
            parley_chat::protocol::ChatMessage::text("m1", "a", "Alice", "gone soon", 1),
            conn,
        )
        .await
        .unwrap();
        gw.clear_room(&room_id, "a", conn).await.unwrap();
    }

    let store = Arc::new(RocksStore::open(StoreConfig::for_testing(path)).unwrap());
    let gw = gateway_over(store);

    let (history, _rx) = gw
        .join(&room_id, &Account::new("a", "Alice"), Uuid::new_v4())
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_server_pipeline_over_rocks() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RocksStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        broadcast_capacity: 64,
        storage_timeout: Duration::from_secs(2),
        outbox_capacity: 64,
    };
    let server = ChatServer::new(config, store, Arc::new(OpenDirectory));
    tokio::spawn(async move {
        server.run().await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let room_id = room_id_for("a", "b").unwrap();

    let mut a_client = ChatClient::new(Account::new("a", "Alice"), format!("ws://127.0.0.1:{port}"));
    let mut a_events = a_client.take_event_rx().unwrap();
    a_client.connect().await.unwrap();
    a_client.join(&room_id).await.unwrap();
    wait_for_history(&mut a_events).await;

    let mut b_client = ChatClient::new(Account::new("b", "Bob"), format!("ws://127.0.0.1:{port}"));
    let mut b_events = b_client.take_event_rx().unwrap();
    b_client.connect().await.unwrap();
    b_client.join(&room_id).await.unwrap();
    wait_for_history(&mut b_events).await;

    let m1 = a_client.send_text(&room_id, "durable hello").await.unwrap();
    match timeout(Duration::from_secs(2), b_events.recv()).await {
        Ok(Some(ChatEvent::Message { msg, .. })) => {
            assert_eq!(msg.id, m1);
            assert_eq!(msg.text.as_deref(), Some("durable hello"));
        }
        other => panic!("expected message, got {other:?}"),
    }
}
