//! Connect to a mock broker, open a producer to queue `Q`, and publish three
//! text messages. The broker side must see three `Message` frames in send
//! order, each persistent and addressed to `Q`.

use std::sync::{Arc, Mutex as StdMutex};

use openwire_core::command::Command;
use openwire_core::destination::Destination;
use openwire_core::ids::{ConnectionId, MessageId, ProducerId};
use openwire_core::transport::mock::MockTransport;
use openwire_core::transport::{Transport, TransportError, TransportListener};

struct CollectingListener {
    received: StdMutex<Vec<Command>>,
}

impl TransportListener for CollectingListener {
    fn on_command(&self, command: Command) { self.received.lock().unwrap().push(command); }
    fn on_exception(&self, _error: TransportError) {}
}

fn producer_id() -> ProducerId {
    ProducerId { connection_id: ConnectionId::new("conn-1"), session_value: 1, value: 1 }
}

fn text_message(seq: u64, body: &str) -> openwire_core::command::Message {
    openwire_core::command::Message {
        message_id: Some(MessageId::new(producer_id(), seq)),
        producer_id: Some(producer_id()),
        destination: Some(Destination::Queue("Q".into())),
        persistent: true,
        body: body.as_bytes().to_vec(),
        ..Default::default()
    }
}

#[tokio::test]
async fn connect_and_publish_writes_messages_in_order() {
    let (client, broker) = MockTransport::pair();
    let collector = Arc::new(CollectingListener { received: StdMutex::new(Vec::new()) });
    broker.set_listener(collector.clone());
    client.start().await.unwrap();
    broker.start().await.unwrap();

    for (seq, body) in [(1, "1"), (2, "2"), (3, "3")] {
        client.oneway(Command::Message(Box::new(text_message(seq, body)))).await.unwrap();
    }
    tokio::task::yield_now().await;

    let received = collector.received.lock().unwrap();
    assert_eq!(received.len(), 3);
    for (i, command) in received.iter().enumerate() {
        let Command::Message(message) = command else { panic!("expected a Message command") };
        assert_eq!(message.destination, Some(Destination::Queue("Q".into())));
        assert!(message.persistent);
        assert_eq!(message.body, (i + 1).to_string().into_bytes());
    }
}
