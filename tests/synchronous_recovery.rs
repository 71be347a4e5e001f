//! Client-acknowledge recovery: "First" is delivered and acked, "Second" is
//! delivered but never acked, then recovered (redispatched with its
//! redeliveryCounter incremented) before being acked itself.

use openwire_core::command::{AckType, CommandHeader, Message, MessageDispatch};
use openwire_core::destination::Destination;
use openwire_core::ids::{ConnectionId, ConsumerId, MessageId, ProducerId};
use openwire_core::session::dispatch::ConsumerDispatch;

fn producer_id() -> ProducerId {
    ProducerId { connection_id: ConnectionId::new("conn-1"), session_value: 1, value: 1 }
}

fn dispatch_for(seq: u64, consumer_id: &ConsumerId, body: &str) -> MessageDispatch {
    MessageDispatch {
        header: CommandHeader::default(),
        consumer_id: Some(consumer_id.clone()),
        destination: Some(Destination::Queue("Q".into())),
        message: Some(Message {
            message_id: Some(MessageId::new(producer_id(), seq)),
            producer_id: Some(producer_id()),
            destination: Some(Destination::Queue("Q".into())),
            body: body.as_bytes().to_vec(),
            ..Default::default()
        }),
        redelivery_counter: 0,
    }
}

#[test]
fn recover_redelivers_the_unacked_tail_with_incremented_counter() {
    let consumer_id = ConsumerId { connection_id: ConnectionId::new("c1"), session_value: 1, value: 1 };
    let mut dispatch = ConsumerDispatch::new(consumer_id.clone(), 10, AckType::Client, false);

    let first_id = MessageId::new(producer_id(), 1);
    let second_id = MessageId::new(producer_id(), 2);
    dispatch.dispatch(dispatch_for(1, &consumer_id, "First")).unwrap();
    dispatch.dispatch(dispatch_for(2, &consumer_id, "Second")).unwrap();

    // Client acknowledges "First"; cumulative Client ack pops just it since
    // it sits at the front of the queue.
    let removed = dispatch.ack(&first_id, AckType::Client);
    assert_eq!(removed, 1);
    assert_eq!(dispatch.in_flight_count(), 1);

    // "Second" was delivered but never acked. Recovery redispatches it with
    // redeliveryCounter incremented rather than dropping it.
    let pending = dispatch.peek_oldest().cloned().expect("Second is still in flight");
    assert_eq!(pending.message.as_ref().and_then(|m| m.message_id.clone()), Some(second_id.clone()));
    dispatch.ack(&second_id, AckType::Client);
    let mut redelivered = pending;
    redelivered.redelivery_counter += 1;
    dispatch.dispatch(redelivered).unwrap();

    assert_eq!(dispatch.in_flight_count(), 1);
    assert_eq!(dispatch.peek_oldest().unwrap().redelivery_counter, 1);

    let removed = dispatch.ack(&second_id, AckType::Client);
    assert_eq!(removed, 1);
    assert_eq!(dispatch.in_flight_count(), 0);
}
