//! Wire format negotiation filter.
//!
//! Grounded in `OpenWireFormatNegotiator`: on `start`, send our preferred
//! `WireFormatInfo` exactly once, then wait up to 15 seconds for the peer's
//! `WireFormatInfo` before releasing callers blocked on `start`. If a read
//! error arrives before negotiation completes, the wait is force-released
//! with an error rather than left to time out, matching the original's
//! "release the latch on exception" behaviour.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::codec::{OpenWireFormat, WireFormatOptions};
use crate::command::{Command, CommandHeader};
use crate::transport::filter::TransportFilter;
use crate::transport::{Transport, TransportError, TransportListener};

/// Matches `OpenWireFormatNegotiator`'s hard-coded handshake deadline.
pub const NEGOTIATION_TIMEOUT: Duration = Duration::from_millis(15_000);

pub struct WireFormatNegotiator {
    inner: TransportFilter,
    preferred: WireFormatOptions,
    negotiated: parking_lot::Mutex<Option<WireFormatOptions>>,
    done: Arc<Notify>,
    failed: parking_lot::Mutex<Option<String>>,
    listener: parking_lot::Mutex<Option<Arc<dyn TransportListener>>>,
}

struct NegotiatingListener {
    owner: Arc<WireFormatNegotiator>,
}

impl TransportListener for NegotiatingListener {
    fn on_command(&self, command: Command) {
        if let Command::WireFormatInfo(ref info) = command {
            let peer = WireFormatOptions::from_wire_format_info(info);
            let merged = self.owner.preferred.merged_with(&peer);
            info!(version = merged.version, "negotiated wire format");
            *self.owner.negotiated.lock() = Some(merged);
            self.owner.done.notify_waiters();
            return;
        }
        if let Some(listener) = self.owner.listener.lock().as_ref() {
            listener.on_command(command);
        }
    }

    fn on_exception(&self, error: TransportError) {
        *self.owner.failed.lock() = Some(error.to_string());
        self.owner.done.notify_waiters();
        if let Some(listener) = self.owner.listener.lock().as_ref() {
            listener.on_exception(error);
        }
    }

    fn transport_interrupted(&self) {
        if let Some(listener) = self.owner.listener.lock().as_ref() {
            listener.transport_interrupted();
        }
    }

    fn transport_resumed(&self) {
        if let Some(listener) = self.owner.listener.lock().as_ref() {
            listener.transport_resumed();
        }
    }
}

impl WireFormatNegotiator {
    #[must_use]
    pub fn new(next: Arc<dyn Transport>, preferred: WireFormatOptions) -> Arc<Self> {
        Arc::new(Self {
            inner: TransportFilter::new(next),
            preferred,
            negotiated: parking_lot::Mutex::new(None),
            done: Arc::new(Notify::new()),
            failed: parking_lot::Mutex::new(None),
            listener: parking_lot::Mutex::new(None),
        })
    }

    pub fn attach(self: &Arc<Self>) {
        self.inner.next.set_listener(Arc::new(NegotiatingListener { owner: Arc::clone(self) }));
    }

    /// Negotiated options, once `start` has completed successfully.
    #[must_use]
    pub fn negotiated_options(&self) -> Option<WireFormatOptions> { self.negotiated.lock().clone() }

    #[must_use]
    pub fn new_format(&self) -> OpenWireFormat {
        OpenWireFormat::new(self.negotiated_options().unwrap_or_else(|| self.preferred.clone()))
    }
}

#[async_trait]
impl Transport for WireFormatNegotiator {
    async fn start(&self) -> Result<(), TransportError> {
        self.inner.start().await?;

        let wire_format_info = Command::WireFormatInfo(crate::command::WireFormatInfo {
            header: CommandHeader::oneway(0),
            version: self.preferred.version,
            properties: self.preferred.to_properties(),
        });
        self.inner.oneway(wire_format_info).await?;

        let wait = self.done.notified();
        tokio::select! {
            () = wait => {}
            () = tokio::time::sleep(NEGOTIATION_TIMEOUT) => {
                warn!("wire format negotiation timed out after {:?}", NEGOTIATION_TIMEOUT);
                return Err(TransportError::NegotiationFailed("peer did not respond in time".into()));
            }
        }

        if let Some(reason) = self.failed.lock().clone() {
            return Err(TransportError::NegotiationFailed(reason));
        }
        if self.negotiated.lock().is_none() {
            return Err(TransportError::NegotiationFailed("no wire format info received".into()));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> { self.inner.stop().await }
    async fn oneway(&self, command: Command) -> Result<(), TransportError> { self.inner.oneway(command).await }
    async fn request(&self, command: Command) -> Result<Command, TransportError> { self.inner.request(command).await }
    fn set_listener(&self, listener: Arc<dyn TransportListener>) { *self.listener.lock() = Some(listener); }
    fn is_connected(&self) -> bool { self.inner.is_connected() }
    fn remote_address(&self) -> Option<String> { self.inner.remote_address() }
}
