//! TCP listener and per-connection loops.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::ClientHandle;
use crate::RpcError;
use crate::codec::MAX_FRAME_BYTES;
use crate::codec::split_frames;
use crate::message::Frame;
use crate::message::Request;
use crate::message::Response;

/// Outbound frames buffered per connection before senders block.
const OUTBOUND_CHANNEL_SIZE: usize = 128;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// What the session layer implements: method dispatch plus disconnect
/// cleanup. Requests on one connection are processed in arrival order.
#[async_trait]
pub trait RpcService: Send + Sync {
    /// Handle one method call and produce its reply value.
    async fn handle(&self, method: &str, params: &Value) -> Result<Value, RpcError>;

    /// The connection is gone; release everything registered on its behalf.
    async fn shutdown(&self);
}

/// Builds one service per accepted connection.
pub trait RpcServiceFactory: Send + Sync {
    /// Create the service for a new connection. The handle is the
    /// connection's outbound side; the service typically keeps a clone.
    fn create(&self, client: ClientHandle) -> Arc<dyn RpcService>;
}

/// JSON-RPC listener.
pub struct RpcServer {
    listener: TcpListener,
}

impl RpcServer {
    /// Bind to `addr` (e.g. `127.0.0.1:6640`).
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(RpcServer { listener })
    }

    /// The bound address, useful when binding port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `cancel` fires, spawning one task per
    /// connection.
    pub async fn serve(self, factory: Arc<dyn RpcServiceFactory>, cancel: CancellationToken) {
        info!(addr = ?self.listener.local_addr().ok(), "rpc server listening");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("rpc server stopping");
                    return;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");
                        let factory = Arc::clone(&factory);
                        tokio::spawn(async move {
                            handle_connection(stream, peer, factory).await;
                        });
                    }
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                    }
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, factory: Arc<dyn RpcServiceFactory>) {
    let (mut read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<Value>(OUTBOUND_CHANNEL_SIZE);
    let cancel = CancellationToken::new();

    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(write_loop(write_half, outbound_rx, writer_cancel));

    let handle = ClientHandle::new(outbound_tx, cancel.clone(), peer.to_string());
    let service = factory.create(handle.clone());

    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            read = read_half.read(&mut chunk) => match read {
                Ok(0) => {
                    debug!(%peer, "connection closed by client");
                    break;
                }
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.len() > MAX_FRAME_BYTES {
                        warn!(%peer, bytes = buf.len(), "frame exceeds size limit, dropping connection");
                        break;
                    }
                    let frames = match split_frames(&mut buf) {
                        Ok(frames) => frames,
                        Err(err) => {
                            warn!(%peer, error = %err, "unparsable stream, dropping connection");
                            break;
                        }
                    };
                    for frame in frames {
                        process_frame(service.as_ref(), &handle, frame).await;
                    }
                }
                Err(err) => {
                    debug!(%peer, error = %err, "read failed");
                    break;
                }
            }
        }
    }

    cancel.cancel();
    service.shutdown().await;
    let _ = writer.await;
    debug!(%peer, "connection closed");
}

async fn write_loop(mut write_half: OwnedWriteHalf, mut rx: mpsc::Receiver<Value>, cancel: CancellationToken) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => return,
            },
        };
        let bytes = match serde_json::to_vec(&frame) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "failed to encode outbound frame");
                continue;
            }
        };
        if let Err(err) = write_half.write_all(&bytes).await {
            debug!(error = %err, "write failed, closing connection");
            cancel.cancel();
            return;
        }
    }
}

async fn process_frame(service: &dyn RpcService, handle: &ClientHandle, frame: Value) {
    match Frame::from_value(frame) {
        Ok(Frame::Request(request)) => process_request(service, handle, request).await,
        Ok(Frame::Response(_)) => debug!("ignoring response frame from client"),
        Err(err) => warn!(error = %err, "dropping malformed frame"),
    }
}

async fn process_request(service: &dyn RpcService, handle: &ClientHandle, request: Request) {
    debug!(method = %request.method, "request");
    let result = service.handle(&request.method, &request.params).await;
    let id = match request.id {
        Some(id) => id,
        None => {
            if let Err(err) = result {
                debug!(method = %request.method, error = %err, "notification failed");
            }
            return;
        }
    };
    let response = match result {
        Ok(value) => Response::result(id, value),
        Err(err) => Response::error(id, err.payload()),
    };
    if let Err(err) = handle.respond(response).await {
        debug!(error = %err, "failed to queue reply");
    }
}
