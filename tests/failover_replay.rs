//! `mock://a` fails every connect attempt, `mock://b` succeeds. The failover
//! transport must land on `b` and replay `ConnectionInfo`, `SessionInfo`,
//! `ConsumerInfo` in that order before anything else reaches the broker.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use openwire_core::command::{Command, CommandHeader, ConnectionInfo, ConsumerInfo, SessionInfo};
use openwire_core::destination::Destination;
use openwire_core::ids::{ConnectionId, ConsumerId, SessionId};
use openwire_core::transport::failover::{FailoverTransport, TransportConnector};
use openwire_core::transport::mock::MockTransport;
use openwire_core::transport::uri::{FailoverOptions, FailoverUri};
use openwire_core::transport::{Transport, TransportError, TransportListener};
use url::Url;

struct CollectingListener {
    received: StdMutex<Vec<Command>>,
}

impl TransportListener for CollectingListener {
    fn on_command(&self, command: Command) { self.received.lock().unwrap().push(command); }
    fn on_exception(&self, _error: TransportError) {}
}

/// Fails every connect to `mock://a`; `mock://b` succeeds and has its
/// broker-side listener wired to the shared collector before the client end
/// is handed back, so no command can slip through before we start watching.
struct FailsFirstUri {
    collector: Arc<CollectingListener>,
}

#[async_trait]
impl TransportConnector for FailsFirstUri {
    async fn connect(&self, uri: &Url) -> Result<Arc<dyn Transport>, TransportError> {
        if uri.host_str() == Some("a") {
            return Err(TransportError::NotConnected);
        }
        let (client, broker) = MockTransport::pair();
        broker.set_listener(self.collector.clone());
        client.start().await?;
        broker.start().await?;
        Ok(client)
    }
}

#[tokio::test]
async fn failover_replays_tracked_state_before_further_commands() {
    let collector = Arc::new(CollectingListener { received: StdMutex::new(Vec::new()) });
    let connector = Arc::new(FailsFirstUri { collector: collector.clone() });
    let failover_uri = FailoverUri {
        broker_uris: vec![Url::parse("mock://a").unwrap(), Url::parse("mock://b").unwrap()],
        options: FailoverOptions { randomize: false, initial_reconnect_delay_ms: 1, ..Default::default() },
    };
    let failover = FailoverTransport::new(connector.clone(), failover_uri);

    let connection_id = ConnectionId::new("c1");
    let session_id = SessionId { connection_id: connection_id.clone(), value: 1 };
    let consumer_id = ConsumerId { connection_id: connection_id.clone(), session_value: 1, value: 1 };

    failover
        .oneway(Command::ConnectionInfo(ConnectionInfo { connection_id: connection_id.clone(), ..Default::default() }))
        .await
        .unwrap();
    failover.oneway(Command::SessionInfo(SessionInfo { header: CommandHeader::default(), session_id })).await.unwrap();
    failover
        .oneway(Command::ConsumerInfo(ConsumerInfo {
            consumer_id,
            destination: Some(Destination::Topic("T".into())),
            ..Default::default()
        }))
        .await
        .unwrap();

    failover.start().await.unwrap();
    assert!(failover.is_connected());
    tokio::task::yield_now().await;

    let received = collector.received.lock().unwrap();
    assert!(received.len() >= 3, "expected at least the replayed Connection/Session/ConsumerInfo");
    assert!(matches!(received[0], Command::ConnectionInfo(_)));
    assert!(matches!(received[1], Command::SessionInfo(_)));
    assert!(matches!(received[2], Command::ConsumerInfo(_)));
}
