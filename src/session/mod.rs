//! Session dispatch engine (§4.G): owns consumer dispatch queues, applies
//! acknowledgements, and schedules redelivery for messages that come back
//! unacked (rolled-back transaction, or a consumer `MessageAck` marked
//! `poison_ack` after [`redelivery::RedeliveryPolicy`] gives up).

pub mod dispatch;
pub mod redelivery;

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::command::{AckType, ConsumerInfo, MessageAck, MessageDispatch};
use crate::ids::{ConsumerId, SessionId};
use dispatch::{ConsumerDispatch, DispatchError};
use redelivery::RedeliveryPolicy;

/// Session lifecycle states. A session starts `Open`, and a
/// stop/start cycle (JMS `Connection.stop`/`start`) walks it through
/// `Stopping`/`Stopped`/`Starting` without losing consumer registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Stopping,
    Stopped,
    Starting,
    Closing,
    Closed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,
    #[error("session is stopped")]
    Stopped,
    #[error("unknown consumer {0}")]
    UnknownConsumer(ConsumerId),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

pub struct Session {
    pub session_id: SessionId,
    state: SessionState,
    consumers: HashMap<ConsumerId, ConsumerDispatch>,
    redelivery_policy: RedeliveryPolicy,
}

impl Session {
    #[must_use]
    pub fn new(session_id: SessionId, redelivery_policy: RedeliveryPolicy) -> Self {
        Self { session_id, state: SessionState::Open, consumers: HashMap::new(), redelivery_policy }
    }

    #[must_use]
    pub const fn state(&self) -> SessionState { self.state }

    pub fn add_consumer(&mut self, info: &ConsumerInfo, ack_type: AckType) {
        self.consumers.insert(
            info.consumer_id.clone(),
            ConsumerDispatch::new(info.consumer_id.clone(), info.prefetch_size, ack_type, info.dispatch_async),
        );
    }

    pub fn remove_consumer(&mut self, consumer_id: &ConsumerId) { self.consumers.remove(consumer_id); }

    pub fn stop(&mut self) { self.state = SessionState::Stopping; }
    pub fn stopped(&mut self) { self.state = SessionState::Stopped; }
    pub fn start(&mut self) {
        self.state = if self.state == SessionState::Stopped { SessionState::Starting } else { self.state };
        self.state = SessionState::Open;
    }
    pub fn close(&mut self) { self.state = SessionState::Closed; }

    /// Accept a broker dispatch into the target consumer's queue.
    ///
    /// `stop` prevents delivery but preserves the queue: a `Stopped` session
    /// still rejects new dispatches, but its consumers and their pending/
    /// delivered messages are untouched and resume once `start` runs.
    ///
    /// # Errors
    /// Returns [`SessionError::Closed`] if the session is closed,
    /// [`SessionError::Stopped`] if the session is stopped,
    /// [`SessionError::UnknownConsumer`] if no such consumer is registered,
    /// or propagates a [`DispatchError`] if the prefetch bound is exceeded.
    pub fn dispatch(&mut self, message: MessageDispatch) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        if self.state == SessionState::Stopped {
            return Err(SessionError::Stopped);
        }
        let Some(consumer_id) = message.consumer_id.clone() else {
            return Err(SessionError::UnknownConsumer(ConsumerId {
                connection_id: self.session_id.connection_id.clone(),
                session_value: self.session_id.value,
                value: 0,
            }));
        };
        let dispatch = self.consumers.get_mut(&consumer_id).ok_or_else(|| SessionError::UnknownConsumer(consumer_id.clone()))?;
        dispatch.dispatch(message).map_err(Into::into)
    }

    /// Apply a client-originated ack, returning how many messages it
    /// covered.
    ///
    /// # Errors
    /// Returns [`SessionError::UnknownConsumer`] if the ack's consumer is
    /// not registered on this session.
    pub fn ack(&mut self, ack: &MessageAck) -> Result<u32, SessionError> {
        let consumer_id = ack.consumer_id.clone().ok_or_else(|| {
            SessionError::UnknownConsumer(ConsumerId {
                connection_id: self.session_id.connection_id.clone(),
                session_value: self.session_id.value,
                value: 0,
            })
        })?;
        let Some(message_id) = &ack.last_message_id else {
            debug!("ack carried no message id, treating as a no-op");
            return Ok(0);
        };
        let dispatch = self.consumers.get_mut(&consumer_id).ok_or_else(|| SessionError::UnknownConsumer(consumer_id.clone()))?;
        Ok(dispatch.ack(message_id, ack.ack_type))
    }

    /// Decide what to do with a message that failed processing and was not
    /// acked: redeliver after the policy's computed delay, or give up and
    /// report a poison ack.
    #[must_use]
    pub fn redelivery_decision(&self, redelivery_count: u32) -> RedeliveryDecision {
        if self.redelivery_policy.is_poison(redelivery_count) {
            warn!(redelivery_count, "message exceeded maximum redeliveries, poison-acking");
            RedeliveryDecision::PoisonAck
        } else {
            RedeliveryDecision::RedeliverAfter(self.redelivery_policy.delay_for(redelivery_count))
        }
    }

    #[must_use]
    pub fn consumer(&self, consumer_id: &ConsumerId) -> Option<&ConsumerDispatch> { self.consumers.get(consumer_id) }

    /// Hand the oldest pending dispatch for `consumer_id` to the
    /// application. No-op (returns `None`) for an unknown consumer or one
    /// with nothing pending.
    pub fn deliver_next(&mut self, consumer_id: &ConsumerId) -> Option<&MessageDispatch> {
        self.consumers.get_mut(consumer_id)?.deliver_next()
    }

    /// Grant one `MessagePull` flow-control credit to a zero-prefetch
    /// consumer.
    pub fn grant_pull_credit(&mut self, consumer_id: &ConsumerId) {
        if let Some(dispatch) = self.consumers.get_mut(consumer_id) {
            dispatch.grant_pull_credit();
        }
    }

    /// Apply a broker-driven `ConsumerControl` prefetch override: `None`
    /// resets any extension, `Some(n)` widens the window by `n` beyond the
    /// consumer's original `prefetch_size`.
    pub fn apply_prefetch_override(&mut self, consumer_id: &ConsumerId, prefetch: Option<u32>) {
        let Some(dispatch) = self.consumers.get_mut(consumer_id) else { return };
        match prefetch {
            Some(extra) => dispatch.extend_prefetch(extra),
            None => dispatch.reset_prefetch_extension(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RedeliveryDecision {
    RedeliverAfter(std::time::Duration),
    PoisonAck,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandHeader;
    use crate::destination::Destination;
    use crate::ids::{ConnectionId, MessageId, ProducerId};

    fn session_id() -> SessionId { SessionId { connection_id: ConnectionId::new("c1"), value: 1 } }

    fn consumer_info() -> ConsumerInfo {
        ConsumerInfo {
            header: CommandHeader::default(),
            consumer_id: ConsumerId { connection_id: ConnectionId::new("c1"), session_value: 1, value: 1 },
            destination: Some(Destination::Queue("q".into())),
            prefetch_size: 2,
            ..Default::default()
        }
    }

    #[test]
    fn dispatch_then_ack_roundtrips_through_session() {
        let mut session = Session::new(session_id(), RedeliveryPolicy::default());
        let info = consumer_info();
        session.add_consumer(&info, AckType::Client);

        let producer_id = ProducerId { connection_id: ConnectionId::new("c1"), session_value: 1, value: 1 };
        let message_id = MessageId::new(producer_id, 1);
        let mut message = crate::command::Message::default();
        message.message_id = Some(message_id.clone());
        let dispatch = MessageDispatch {
            header: CommandHeader::default(),
            consumer_id: Some(info.consumer_id.clone()),
            destination: info.destination.clone(),
            message: Some(message),
            redelivery_counter: 0,
        };
        session.dispatch(dispatch).unwrap();
        session.deliver_next(&info.consumer_id).expect("pending dispatch");

        let ack = MessageAck {
            header: CommandHeader::default(),
            consumer_id: Some(info.consumer_id.clone()),
            transaction_id: crate::ids::TransactionId::None,
            destination: info.destination,
            ack_type: AckType::Client,
            first_message_id: None,
            last_message_id: Some(message_id),
            message_count: 1,
            poison_ack: false,
        };
        assert_eq!(session.ack(&ack).unwrap(), 1);
    }

    #[test]
    fn exceeding_prefetch_is_rejected() {
        let mut session = Session::new(session_id(), RedeliveryPolicy::default());
        let info = consumer_info();
        session.add_consumer(&info, AckType::Auto);

        for i in 1..=2u64 {
            let producer_id = ProducerId { connection_id: ConnectionId::new("c1"), session_value: 1, value: 1 };
            let mut message = crate::command::Message::default();
            message.message_id = Some(MessageId::new(producer_id, i));
            let dispatch = MessageDispatch {
                header: CommandHeader::default(),
                consumer_id: Some(info.consumer_id.clone()),
                destination: None,
                message: Some(message),
                redelivery_counter: 0,
            };
            session.dispatch(dispatch).unwrap();
        }

        let producer_id = ProducerId { connection_id: ConnectionId::new("c1"), session_value: 1, value: 1 };
        let mut overflow_message = crate::command::Message::default();
        overflow_message.message_id = Some(MessageId::new(producer_id, 3));
        let overflow = MessageDispatch {
            header: CommandHeader::default(),
            consumer_id: Some(info.consumer_id.clone()),
            destination: None,
            message: Some(overflow_message),
            redelivery_counter: 0,
        };
        assert!(session.dispatch(overflow).is_err());
    }

    #[test]
    fn redelivery_decision_gives_up_past_the_cap() {
        let policy = RedeliveryPolicy { maximum_redeliveries: 1, ..Default::default() };
        let session = Session::new(session_id(), policy);
        assert!(matches!(session.redelivery_decision(1), RedeliveryDecision::RedeliverAfter(_)));
        assert!(matches!(session.redelivery_decision(2), RedeliveryDecision::PoisonAck));
    }

    #[test]
    fn stopped_session_rejects_dispatch_but_keeps_the_consumer() {
        let mut session = Session::new(session_id(), RedeliveryPolicy::default());
        let info = consumer_info();
        session.add_consumer(&info, AckType::Auto);
        session.stop();
        session.stopped();

        let producer_id = ProducerId { connection_id: ConnectionId::new("c1"), session_value: 1, value: 1 };
        let mut message = crate::command::Message::default();
        message.message_id = Some(MessageId::new(producer_id, 1));
        let dispatch = MessageDispatch {
            header: CommandHeader::default(),
            consumer_id: Some(info.consumer_id.clone()),
            destination: None,
            message: Some(message),
            redelivery_counter: 0,
        };
        assert!(matches!(session.dispatch(dispatch), Err(SessionError::Stopped)));
        assert!(session.consumer(&info.consumer_id).is_some());

        session.start();
        let producer_id = ProducerId { connection_id: ConnectionId::new("c1"), session_value: 1, value: 1 };
        let mut resumed_message = crate::command::Message::default();
        resumed_message.message_id = Some(MessageId::new(producer_id, 2));
        let resumed = MessageDispatch {
            header: CommandHeader::default(),
            consumer_id: Some(info.consumer_id.clone()),
            destination: None,
            message: Some(resumed_message),
            redelivery_counter: 0,
        };
        assert!(session.dispatch(resumed).is_ok());
    }
}
