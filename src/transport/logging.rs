//! Logging filter: traces every command crossing the transport boundary.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::command::Command;
use crate::transport::filter::TransportFilter;
use crate::transport::{Transport, TransportError, TransportListener};

pub struct LoggingTransport {
    inner: TransportFilter,
}

impl LoggingTransport {
    #[must_use]
    pub fn new(next: Arc<dyn Transport>) -> Self { Self { inner: TransportFilter::new(next) } }
}

#[async_trait]
impl Transport for LoggingTransport {
    async fn start(&self) -> Result<(), TransportError> {
        debug!("transport starting");
        self.inner.start().await
    }

    async fn stop(&self) -> Result<(), TransportError> {
        debug!("transport stopping");
        self.inner.stop().await
    }

    #[instrument(skip(self, command), fields(type_tag = command.type_tag(), command_id = command.command_id()))]
    async fn oneway(&self, command: Command) -> Result<(), TransportError> {
        debug!("sending oneway command");
        self.inner.oneway(command).await
    }

    #[instrument(skip(self, command), fields(type_tag = command.type_tag(), command_id = command.command_id()))]
    async fn request(&self, command: Command) -> Result<Command, TransportError> {
        debug!("sending request command");
        self.inner.request(command).await
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) { self.inner.set_listener(listener); }
    fn is_connected(&self) -> bool { self.inner.is_connected() }
    fn remote_address(&self) -> Option<String> { self.inner.remote_address() }
}
