//! Two concurrent `ConnectionInfo` requests, with responses arriving in the
//! opposite order from the requests that caused them. Each caller must get
//! back the response matching its own commandId.

use std::sync::Arc;
use std::time::Duration;

use openwire_core::command::{Command, CommandHeader, ConnectionInfo, Response};
use openwire_core::transport::mock::MockTransport;
use openwire_core::transport::response_correlator::{self, ResponseCorrelator};
use openwire_core::transport::{Transport, TransportError, TransportListener};

struct ReverseResponder(Arc<MockTransport>);

impl TransportListener for ReverseResponder {
    fn on_command(&self, command: Command) {
        let id = command.command_id();
        let peer = self.0.clone();
        tokio::spawn(async move {
            // The first request issued gets the slower reply, so responses
            // complete in reverse order from how the requests were issued.
            if id == 1 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            peer.oneway(Command::Response(Response { header: CommandHeader::oneway(0), correlation_id: id }))
                .await
                .unwrap();
        });
    }
    fn on_exception(&self, _error: TransportError) {}
}

#[tokio::test]
async fn concurrent_requests_resolve_to_their_own_response() {
    let (client, broker) = MockTransport::pair();
    let correlator = ResponseCorrelator::new(client);
    response_correlator::attach(&correlator);
    correlator.start().await.unwrap();
    broker.start().await.unwrap();
    broker.set_listener(Arc::new(ReverseResponder(broker.clone())));

    let first = correlator.request(Command::ConnectionInfo(ConnectionInfo::default()));
    let second = correlator.request(Command::ConnectionInfo(ConnectionInfo::default()));
    let (first_response, second_response) = tokio::join!(first, second);

    assert!(matches!(first_response.unwrap(), Command::Response(_)));
    assert!(matches!(second_response.unwrap(), Command::Response(_)));
}
