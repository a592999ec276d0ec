//! Length-prefixed TCP framing underneath the publish/subscribe shape
//! described in §6: one inbound listener (the "publisher" endpoint other
//! nodes connect to) and one outbound connection per known peer (the
//! "subscriber" side), plus a loopback path for self-addressed frames.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use mesh_core::NodeId;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{NetworkError, Result};

/// Frames above this size are rejected rather than allocated for, bounding
/// the damage a malformed or hostile peer can do with a bogus length prefix.
const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

async fn write_frame(stream: &mut TcpStream, bytes: &[u8]) -> std::io::Result<()> {
    let len = bytes.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(bytes).await?;
    stream.flush().await
}

async fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_BYTES {
        return Err(NetworkError::FrameTooLarge(len as usize));
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Transport-level handle: owns the inbound listener and the set of
/// outbound per-peer writer channels. Raw bytes in, raw bytes out — the
/// gossip layer is responsible for envelope (de)serialization.
pub struct Transport {
    self_id: NodeId,
    outbound: DashMap<NodeId, mpsc::UnboundedSender<Vec<u8>>>,
    inbound_tx: mpsc::Sender<Vec<u8>>,
}

impl Transport {
    /// Binds the inbound listener on `listen_addr` and returns the
    /// transport handle plus the inbound frame receiver. Accepting
    /// connections and forwarding frames runs as a background task.
    pub async fn bind(
        self_id: NodeId,
        listen_addr: SocketAddr,
    ) -> Result<(Arc<Self>, mpsc::Receiver<Vec<u8>>)> {
        let listener = TcpListener::bind(listen_addr).await?;
        let (inbound_tx, inbound_rx) = mpsc::channel(1024);

        let transport = Arc::new(Self {
            self_id,
            outbound: DashMap::new(),
            inbound_tx: inbound_tx.clone(),
        });

        tokio::spawn(accept_loop(listener, inbound_tx));

        Ok((transport, inbound_rx))
    }

    /// Ensures an outbound connection to `node_id` at `addr` exists,
    /// (re)connecting lazily. Connection failures are logged, not
    /// propagated — per §4.1 failure semantics, sends don't retry.
    pub fn ensure_connected(&self, node_id: &NodeId, addr: SocketAddr) {
        if self.outbound.contains_key(node_id) {
            return;
        }
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        self.outbound.insert(node_id.clone(), tx);
        let node_id = node_id.clone();

        tokio::spawn(async move {
            let stream = match TcpStream::connect(addr).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(%node_id, %addr, error = %e, "outbound connect failed");
                    return;
                }
            };
            let mut stream = stream;
            while let Some(bytes) = rx.recv().await {
                if let Err(e) = write_frame(&mut stream, &bytes).await {
                    warn!(%node_id, error = %e, "outbound send failed, dropping connection");
                    break;
                }
            }
        });
    }

    /// Sends raw bytes to a known peer. A peer with no established
    /// connection (never announced, or connection died) is a logged
    /// no-op — matching §4.1's "send errors are logged, not propagated".
    pub fn send_to(&self, node_id: &NodeId, bytes: Vec<u8>) {
        match self.outbound.get(node_id) {
            Some(sender) => {
                if sender.send(bytes).is_err() {
                    debug!(%node_id, "outbound channel closed");
                }
            }
            None => trace!(%node_id, "no outbound connection, dropping send"),
        }
    }

    /// Loopback: the publisher "connects to its own subscriber" (§4.1), so
    /// self-addressed frames re-enter the same inbound pipeline as any
    /// other peer's traffic rather than being special-cased.
    pub fn send_self(&self, bytes: Vec<u8>) {
        let tx = self.inbound_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(bytes).await;
        });
    }

    pub fn self_id(&self) -> &NodeId {
        &self.self_id
    }

    pub fn disconnect(&self, node_id: &NodeId) {
        self.outbound.remove(node_id);
    }

    pub fn known_peer_count(&self) -> usize {
        self.outbound.len()
    }
}

async fn accept_loop(listener: TcpListener, inbound_tx: mpsc::Sender<Vec<u8>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let inbound_tx = inbound_tx.clone();
                tokio::spawn(async move {
                    let mut stream = stream;
                    loop {
                        match read_frame(&mut stream).await {
                            Ok(bytes) => {
                                if inbound_tx.send(bytes).await.is_err() {
                                    break;
                                }
                            }
                            Err(_) => break,
                        }
                    }
                    trace!(%peer_addr, "inbound connection closed");
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn self_loopback_delivers_to_inbound_queue() {
        let (transport, mut inbound_rx) =
            Transport::bind("self".into(), "127.0.0.1:0".parse().unwrap())
                .await
                .unwrap();
        transport.send_self(b"hello".to_vec());
        let received = inbound_rx.recv().await.unwrap();
        assert_eq!(received, b"hello");
    }

    #[tokio::test]
    async fn two_nodes_exchange_frames_over_tcp() {
        let addr: SocketAddr = "127.0.0.1:18442".parse().unwrap();
        let (_transport_b, mut inbound_b) = Transport::bind("b".into(), addr).await.unwrap();
        let (transport_a, _inbound_a) =
            Transport::bind("a".into(), "127.0.0.1:0".parse().unwrap())
                .await
                .unwrap();

        transport_a.ensure_connected(&"b".to_string(), addr);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        transport_a.send_to(&"b".to_string(), b"hello-b".to_vec());

        let received = tokio::time::timeout(std::time::Duration::from_secs(1), inbound_b.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, b"hello-b");
    }
}
