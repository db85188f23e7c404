//! End-to-end pipeline tests: in-memory store -> watch loop -> sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alder_monitor::DbWatcher;
use alder_monitor::NotificationSink;
use alder_monitor::Updater;
use alder_ovsjson::MonitorCondRequest;
use alder_ovsjson::TableUpdates;
use alder_schema::ColumnKind;
use alder_schema::ColumnSchema;
use alder_schema::TableSchema;
use alder_store::MemoryStore;
use alder_store::StoreClient;
use alder_store::TableKey;
use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

const PREFIX: &str = "ovsdb/nb";
const DB: &str = "testdb";

#[derive(Debug, PartialEq)]
enum SinkEvent {
    Delivered(String, TableUpdates),
    Canceled(String),
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn deliver(&self, json_value_key: &str, updates: TableUpdates) {
        let _ = self.tx.send(SinkEvent::Delivered(json_value_key.to_string(), updates));
    }

    async fn monitor_canceled(&self, json_value_key: &str) {
        let _ = self.tx.send(SinkEvent::Canceled(json_value_key.to_string()));
    }
}

fn table_schema() -> Arc<TableSchema> {
    let columns = [("name", ColumnKind::Scalar), ("ports", ColumnKind::Set)];
    Arc::new(TableSchema {
        name: "Bridge".to_string(),
        columns: columns
            .iter()
            .map(|(name, kind)| (name.to_string(), ColumnSchema { kind: *kind }))
            .collect::<HashMap<_, _>>(),
    })
}

fn updater(json_value_key: &str, is_v1: bool) -> Updater {
    Updater::new(MonitorCondRequest::default(), json_value_key, table_schema(), is_v1)
}

fn row(uuid: &str, name: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "_uuid": ["uuid", uuid],
        "name": name,
        "ports": ["set", []],
    }))
    .unwrap()
}

fn row_key(uuid: &str) -> String {
    format!("{PREFIX}/{DB}/Bridge/{uuid}")
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<SinkEvent>) -> SinkEvent {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("sink event within a second")
        .expect("sink channel open")
}

async fn started_watcher(store: &MemoryStore) -> (Arc<DbWatcher>, mpsc::UnboundedReceiver<SinkEvent>) {
    let watcher = DbWatcher::new(PREFIX, DB);
    let subscription = store.watch(&format!("{PREFIX}/{DB}/"), 0).await.unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    Arc::clone(&watcher).start(subscription, Arc::new(ChannelSink { tx }));
    (watcher, rx)
}

#[tokio::test]
async fn create_event_reaches_the_registered_client() {
    let store = MemoryStore::new();
    let (watcher, mut rx) = started_watcher(&store).await;
    watcher.registry().add(HashMap::from([(
        TableKey::new(PREFIX, DB, "Bridge"),
        vec![updater("jv1", false)],
    )]));

    store.put(&row_key("u1"), row("u1", "sw0")).await;

    match recv(&mut rx).await {
        SinkEvent::Delivered(json_value_key, updates) => {
            assert_eq!(json_value_key, "jv1");
            let row_update = &updates["Bridge"]["u1"];
            assert_eq!(
                row_update.insert.as_ref().unwrap()["name"],
                Value::from("sw0")
            );
        }
        other => panic!("unexpected sink event {other:?}"),
    }
}

#[tokio::test]
async fn one_event_fans_out_to_every_monitoring_client() {
    let store = MemoryStore::new();
    let (watcher, mut rx) = started_watcher(&store).await;
    watcher.registry().add(HashMap::from([(
        TableKey::new(PREFIX, DB, "Bridge"),
        vec![updater("jv1", false), updater("jv2", true)],
    )]));

    store.put(&row_key("u1"), row("u1", "sw0")).await;

    let first = recv(&mut rx).await;
    let second = recv(&mut rx).await;
    let mut keys: Vec<String> = [first, second]
        .into_iter()
        .map(|event| match event {
            SinkEvent::Delivered(json_value_key, _) => json_value_key,
            other => panic!("unexpected sink event {other:?}"),
        })
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["jv1", "jv2"]);
}

#[tokio::test]
async fn events_for_unmonitored_tables_are_dropped() {
    let store = MemoryStore::new();
    let (watcher, mut rx) = started_watcher(&store).await;
    watcher.registry().add(HashMap::from([(
        TableKey::new(PREFIX, DB, "Bridge"),
        vec![updater("jv1", false)],
    )]));

    store
        .put(&format!("{PREFIX}/{DB}/Port/u9"), row("u9", "p0"))
        .await;
    store.put(&row_key("u1"), row("u1", "sw0")).await;

    // Only the Bridge event arrives.
    match recv(&mut rx).await {
        SinkEvent::Delivered(_, updates) => {
            assert!(updates.contains_key("Bridge"));
            assert!(!updates.contains_key("Port"));
        }
        other => panic!("unexpected sink event {other:?}"),
    }
}

#[tokio::test]
async fn removed_monitor_receives_nothing_further() {
    let store = MemoryStore::new();
    let (watcher, mut rx) = started_watcher(&store).await;
    let table_key = TableKey::new(PREFIX, DB, "Bridge");
    watcher
        .registry()
        .add(HashMap::from([(table_key.clone(), vec![updater("jv1", false)])]));

    store.put(&row_key("u1"), row("u1", "sw0")).await;
    assert!(matches!(recv(&mut rx).await, SinkEvent::Delivered(..)));

    watcher.registry().remove(std::slice::from_ref(&table_key), "jv1");
    store.put(&row_key("u2"), row("u2", "sw1")).await;
    store.delete(&row_key("u1")).await;

    // No further deliveries: the channel stays empty.
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
}

#[tokio::test]
async fn batches_at_or_below_the_observed_revision_are_dropped() {
    let store = MemoryStore::new();
    let (watcher, mut rx) = started_watcher(&store).await;
    watcher.registry().add(HashMap::from([(
        TableKey::new(PREFIX, DB, "Bridge"),
        vec![updater("jv1", false)],
    )]));

    // The snapshot already contained revisions up to 2.
    watcher.observe_revision(2);

    store.put(&row_key("u1"), row("u1", "sw0")).await; // revision 1
    store.put(&row_key("u2"), row("u2", "sw1")).await; // revision 2
    store.put(&row_key("u3"), row("u3", "sw2")).await; // revision 3

    match recv(&mut rx).await {
        SinkEvent::Delivered(_, updates) => {
            assert!(updates["Bridge"].contains_key("u3"));
            assert_eq!(updates["Bridge"].len(), 1);
        }
        other => panic!("unexpected sink event {other:?}"),
    }
}

#[tokio::test]
async fn store_cancellation_notifies_every_client_once() {
    let store = MemoryStore::new();
    let (watcher, mut rx) = started_watcher(&store).await;
    watcher.registry().add(HashMap::from([
        (
            TableKey::new(PREFIX, DB, "Bridge"),
            vec![updater("jv1", false), updater("jv2", false)],
        ),
        (TableKey::new(PREFIX, DB, "Port"), vec![updater("jv1", false)]),
    ]));

    store.cancel_watches().await;

    let mut canceled: Vec<String> = Vec::new();
    for _ in 0..2 {
        match recv(&mut rx).await {
            SinkEvent::Canceled(json_value_key) => canceled.push(json_value_key),
            other => panic!("unexpected sink event {other:?}"),
        }
    }
    canceled.sort();
    assert_eq!(canceled, vec!["jv1", "jv2"]);
    assert!(watcher.registry().is_empty());
    assert!(watcher.cancel_token().is_cancelled());
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
}

#[tokio::test]
async fn modify_and_delete_flow_through_with_previous_values() {
    let store = MemoryStore::new();
    let (watcher, mut rx) = started_watcher(&store).await;
    watcher.registry().add(HashMap::from([(
        TableKey::new(PREFIX, DB, "Bridge"),
        vec![updater("jv1", true)],
    )]));

    store.put(&row_key("u1"), row("u1", "sw0")).await;
    store.put(&row_key("u1"), row("u1", "sw0-renamed")).await;
    store.delete(&row_key("u1")).await;

    let created = recv(&mut rx).await;
    match created {
        SinkEvent::Delivered(_, updates) => {
            assert!(updates["Bridge"]["u1"].new.is_some());
            assert!(updates["Bridge"]["u1"].old.is_none());
        }
        other => panic!("unexpected sink event {other:?}"),
    }

    match recv(&mut rx).await {
        SinkEvent::Delivered(_, updates) => {
            let update = &updates["Bridge"]["u1"];
            assert_eq!(update.new.as_ref().unwrap()["name"], json!("sw0-renamed"));
            assert_eq!(update.old.as_ref().unwrap()["name"], json!("sw0"));
        }
        other => panic!("unexpected sink event {other:?}"),
    }

    match recv(&mut rx).await {
        SinkEvent::Delivered(_, updates) => {
            let update = &updates["Bridge"]["u1"];
            assert_eq!(update.old.as_ref().unwrap()["name"], json!("sw0-renamed"));
            assert!(update.new.is_none());
        }
        other => panic!("unexpected sink event {other:?}"),
    }
}
