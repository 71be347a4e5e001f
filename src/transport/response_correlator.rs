//! Correlates responses to their originating request by `commandId` (§4.C,
//! testable property 4: response uniqueness).
//!
//! Sits above the raw transport: `request` assigns the next command id,
//! registers a waiter, sends the command oneway, and awaits the waiter
//! instead of relying on the underlying transport's own `request`
//! implementation (which on a real socket transport is itself backed by
//! this filter).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::command::Command;
use crate::transport::filter::TransportFilter;
use crate::transport::{Transport, TransportError, TransportListener};

pub struct ResponseCorrelator {
    inner: TransportFilter,
    next_command_id: AtomicU32,
    waiters: Mutex<HashMap<u32, oneshot::Sender<Command>>>,
    downstream_listener: Mutex<Option<Arc<dyn TransportListener>>>,
}

impl ResponseCorrelator {
    #[must_use]
    pub fn new(next: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            inner: TransportFilter::new(next),
            next_command_id: AtomicU32::new(1),
            waiters: Mutex::new(HashMap::new()),
            downstream_listener: Mutex::new(None),
        })
    }

    fn assign_command_id(&self) -> u32 { self.next_command_id.fetch_add(1, Ordering::SeqCst) }
}

struct CorrelatingListener {
    owner: Arc<ResponseCorrelator>,
}

impl TransportListener for CorrelatingListener {
    fn on_command(&self, command: Command) {
        if let Command::Response(ref response) = command {
            if let Some(tx) = self.owner.waiters.lock().remove(&response.correlation_id) {
                let _ = tx.send(command);
                return;
            }
        }
        if let Command::ExceptionResponse(ref response) = command {
            if let Some(tx) = self.owner.waiters.lock().remove(&response.correlation_id) {
                let _ = tx.send(command);
                return;
            }
        }
        if let Some(listener) = self.owner.downstream_listener.lock().as_ref() {
            listener.on_command(command);
        }
    }

    fn on_exception(&self, error: TransportError) {
        if let Some(listener) = self.owner.downstream_listener.lock().as_ref() {
            listener.on_exception(error);
        }
    }

    fn transport_interrupted(&self) {
        if let Some(listener) = self.owner.downstream_listener.lock().as_ref() {
            listener.transport_interrupted();
        }
    }

    fn transport_resumed(&self) {
        if let Some(listener) = self.owner.downstream_listener.lock().as_ref() {
            listener.transport_resumed();
        }
    }
}

#[async_trait]
impl Transport for ResponseCorrelator {
    async fn start(&self) -> Result<(), TransportError> { self.inner.start().await }
    async fn stop(&self) -> Result<(), TransportError> { self.inner.stop().await }

    async fn oneway(&self, command: Command) -> Result<(), TransportError> { self.inner.oneway(command).await }

    async fn request(&self, mut command: Command) -> Result<Command, TransportError> {
        let command_id = self.assign_command_id();
        command.header_mut().command_id = command_id;
        command.header_mut().response_required = true;

        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(command_id, tx);
        if let Err(e) = self.inner.oneway(command).await {
            self.waiters.lock().remove(&command_id);
            return Err(e);
        }
        rx.await.map_err(|_| TransportError::RequestTimeout)
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        *self.downstream_listener.lock() = Some(listener);
    }

    fn is_connected(&self) -> bool { self.inner.is_connected() }
    fn remote_address(&self) -> Option<String> { self.inner.remote_address() }
}

/// Install the correlator as its own upstream listener on `next`. Call this
/// once after construction so commands arriving from below reach
/// [`CorrelatingListener`] first.
pub fn attach(correlator: &Arc<ResponseCorrelator>) {
    correlator.inner.next.set_listener(Arc::new(CorrelatingListener { owner: Arc::clone(correlator) }));
}
