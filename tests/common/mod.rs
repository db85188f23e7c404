//! Shared helpers for the end-to-end tests: a schema, a seeded store, a
//! running server, and a minimal JSON-RPC test client.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use alder::Database;
use alder::ServerState;
use alder::SessionFactory;
use alder_rpc::RpcServer;
use alder_rpc::split_frames;
use alder_store::MemoryStore;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

pub const PREFIX: &str = "ovsdb/nb";
pub const DB: &str = "testdb";

pub fn schema_doc() -> Value {
    json!({
        "name": DB,
        "version": "1.0.0",
        "tables": {
            "Bridge": {
                "columns": {
                    "name": {"type": "string"},
                    "ports": {"type": {"key": {"type": "uuid"}, "min": 0, "max": "unlimited"}},
                    "external_ids": {"type": {"key": "string", "value": "string", "min": 0, "max": "unlimited"}}
                }
            }
        }
    })
}

pub fn bridge_row(uuid: &str, name: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "_uuid": ["uuid", uuid],
        "name": name,
        "ports": ["set", []],
        "external_ids": ["map", []],
    }))
    .unwrap()
}

pub fn bridge_key(uuid: &str) -> String {
    format!("{PREFIX}/{DB}/Bridge/{uuid}")
}

/// Start a server over `store` on an ephemeral port.
pub async fn start_server(store: Arc<MemoryStore>) -> SocketAddr {
    let mut db = Database::new(store, PREFIX);
    db.add_schema(schema_doc()).unwrap();
    let state = ServerState::new(db);

    let server = RpcServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let cancel = CancellationToken::new();
    tokio::spawn(async move {
        server.serve(Arc::new(SessionFactory::new(state)), cancel).await;
    });
    addr
}

/// A blocking-style JSON-RPC client for tests. Frames that arrive while
/// waiting for a reply (server-push notifications) are queued and returned
/// by later `next_frame` calls in arrival order.
pub struct TestClient {
    stream: TcpStream,
    buf: Vec<u8>,
    pending: VecDeque<Value>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        TestClient {
            stream: TcpStream::connect(addr).await.unwrap(),
            buf: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    pub async fn send_request(&mut self, id: i64, method: &str, params: Value) {
        let frame = json!({"method": method, "params": params, "id": id});
        self.stream.write_all(&serde_json::to_vec(&frame).unwrap()).await.unwrap();
    }

    /// The next frame from the server, queued or read, within two seconds.
    pub async fn next_frame(&mut self) -> Value {
        if let Some(frame) = self.pending.pop_front() {
            return frame;
        }
        let mut chunk = [0u8; 4096];
        loop {
            let n = tokio::time::timeout(Duration::from_secs(2), self.stream.read(&mut chunk))
                .await
                .expect("frame within two seconds")
                .unwrap();
            assert!(n > 0, "server closed the connection");
            self.buf.extend_from_slice(&chunk[..n]);
            let frames = split_frames(&mut self.buf).unwrap();
            if !frames.is_empty() {
                self.pending.extend(frames);
                return self.pending.pop_front().unwrap();
            }
        }
    }

    /// Send a request and wait for its reply, queueing any notifications
    /// that arrive first.
    pub async fn call(&mut self, id: i64, method: &str, params: Value) -> Value {
        self.send_request(id, method, params).await;
        let mut skipped = VecDeque::new();
        let reply = loop {
            let frame = self.next_frame().await;
            if frame.get("id") == Some(&json!(id)) && frame.get("method").is_none() {
                break frame;
            }
            skipped.push_back(frame);
        };
        while let Some(frame) = skipped.pop_back() {
            self.pending.push_front(frame);
        }
        reply
    }

    /// Wait for a server-push notification, failing on anything else.
    pub async fn next_notification(&mut self) -> (String, Value) {
        let frame = self.next_frame().await;
        let method = frame["method"].as_str().expect("a notification frame").to_string();
        (method, frame["params"].clone())
    }

    /// Assert that no frame arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        assert!(self.pending.is_empty(), "unexpected queued frames: {:?}", self.pending);
        let mut chunk = [0u8; 4096];
        match tokio::time::timeout(wait, self.stream.read(&mut chunk)).await {
            Err(_) => {}
            Ok(Ok(0)) => {}
            Ok(read) => {
                let n = read.unwrap();
                self.buf.extend_from_slice(&chunk[..n]);
                let frames = split_frames(&mut self.buf).unwrap();
                panic!("expected silence, got {frames:?}");
            }
        }
    }
}
