//! Base delegating filter: forwards every `Transport` call to the next link
//! in the chain unchanged. Concrete filters embed one and override only the
//! methods they need to intercept, the way the original `TransportFilter`
//! base class lets `RedeliveryPolicyFilter`/`WireFormatNegotiator`/etc.
//! override a handful of virtual methods.

use std::sync::Arc;

use async_trait::async_trait;

use crate::command::Command;
use crate::transport::{Transport, TransportError, TransportListener};

#[derive(Clone)]
pub struct TransportFilter {
    pub next: Arc<dyn Transport>,
}

impl TransportFilter {
    #[must_use]
    pub const fn new(next: Arc<dyn Transport>) -> Self { Self { next } }
}

#[async_trait]
impl Transport for TransportFilter {
    async fn start(&self) -> Result<(), TransportError> { self.next.start().await }
    async fn stop(&self) -> Result<(), TransportError> { self.next.stop().await }
    async fn oneway(&self, command: Command) -> Result<(), TransportError> { self.next.oneway(command).await }
    async fn request(&self, command: Command) -> Result<Command, TransportError> { self.next.request(command).await }
    fn set_listener(&self, listener: Arc<dyn TransportListener>) { self.next.set_listener(listener); }
    fn is_connected(&self) -> bool { self.next.is_connected() }
    fn remote_address(&self) -> Option<String> { self.next.remote_address() }
}
