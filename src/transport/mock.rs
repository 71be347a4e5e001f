//! In-memory transport used by tests and as a loopback for examples.
//!
//! Grounded in the connected-pair pattern common to async Rust network
//! libraries (a pair of `tokio::sync::mpsc` channels standing in for a
//! socket) rather than any OpenWire-specific transport, since the original
//! client has no equivalent "mock://" scheme of its own.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::command::Command;
use crate::transport::{Transport, TransportError, TransportListener};

struct NullListener;
impl TransportListener for NullListener {
    fn on_command(&self, _command: Command) {}
    fn on_exception(&self, _error: TransportError) {}
}

/// One end of an in-memory connected pair.
pub struct MockTransport {
    outbound: mpsc::UnboundedSender<Command>,
    connected: AtomicBool,
    next_command_id: AtomicU32,
    listener: Mutex<Arc<dyn TransportListener>>,
    pending: Mutex<std::collections::HashMap<u32, oneshot::Sender<Command>>>,
}

impl MockTransport {
    /// Build a connected pair: commands sent on one side's `oneway`/`request`
    /// are delivered to the other side's listener, and vice versa.
    #[must_use]
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Arc::new(Self {
            outbound: tx_b,
            connected: AtomicBool::new(false),
            next_command_id: AtomicU32::new(1),
            listener: Mutex::new(Arc::new(NullListener)),
            pending: Mutex::new(std::collections::HashMap::new()),
        });
        let b = Arc::new(Self {
            outbound: tx_a,
            connected: AtomicBool::new(false),
            next_command_id: AtomicU32::new(1),
            listener: Mutex::new(Arc::new(NullListener)),
            pending: Mutex::new(std::collections::HashMap::new()),
        });

        spawn_pump(Arc::clone(&a), rx_a);
        spawn_pump(Arc::clone(&b), rx_b);

        (a, b)
    }

    fn dispatch_incoming(self: &Arc<Self>, command: Command) {
        if let Command::Response(ref response) = command {
            if let Some(tx) = self.pending.lock().remove(&response.correlation_id) {
                let _ = tx.send(command);
                return;
            }
        }
        self.listener.lock().on_command(command);
    }
}

fn spawn_pump(owner: Arc<MockTransport>, mut rx: mpsc::UnboundedReceiver<Command>) {
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            owner.dispatch_incoming(command);
        }
    });
}

#[async_trait]
impl Transport for MockTransport {
    async fn start(&self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn oneway(&self, command: Command) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.outbound.send(command).map_err(|_| TransportError::Closed)
    }

    async fn request(&self, mut command: Command) -> Result<Command, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let command_id = self.next_command_id.fetch_add(1, Ordering::SeqCst);
        command.header_mut().command_id = command_id;
        command.header_mut().response_required = true;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(command_id, tx);
        self.outbound.send(command).map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::RequestTimeout)
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        *self.listener.lock() = listener;
    }

    fn is_connected(&self) -> bool { self.connected.load(Ordering::SeqCst) }

    fn remote_address(&self) -> Option<String> { Some("mock://peer".to_owned()) }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::command::{CommandHeader, KeepAliveInfo, Response};

    struct CollectingListener {
        received: StdMutex<Vec<Command>>,
    }

    impl TransportListener for CollectingListener {
        fn on_command(&self, command: Command) {
            self.received.lock().unwrap().push(command);
        }
        fn on_exception(&self, _error: TransportError) {}
    }

    #[tokio::test]
    async fn oneway_delivers_to_the_peers_listener() {
        let (a, b) = MockTransport::pair();
        let collector = Arc::new(CollectingListener { received: StdMutex::new(Vec::new()) });
        b.set_listener(collector.clone());
        a.start().await.unwrap();
        b.start().await.unwrap();

        a.oneway(Command::KeepAliveInfo(KeepAliveInfo { header: CommandHeader::oneway(1) }))
            .await
            .unwrap();

        tokio::task::yield_now().await;
        assert_eq!(collector.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn request_correlates_with_a_manually_sent_response() {
        let (a, b) = MockTransport::pair();
        a.start().await.unwrap();
        b.start().await.unwrap();

        struct Responder(Arc<MockTransport>);
        impl TransportListener for Responder {
            fn on_command(&self, command: Command) {
                let correlation_id = command.command_id();
                let reply = self.0.clone();
                tokio::spawn(async move {
                    reply
                        .oneway(Command::Response(Response {
                            header: CommandHeader::oneway(0),
                            correlation_id,
                        }))
                        .await
                        .unwrap();
                });
            }
            fn on_exception(&self, _error: TransportError) {}
        }
        b.set_listener(Arc::new(Responder(b.clone())));

        let response = a
            .request(Command::KeepAliveInfo(KeepAliveInfo { header: CommandHeader::default() }))
            .await
            .unwrap();
        assert!(matches!(response, Command::Response(_)));
    }
}
