//! Per-consumer dispatch queue enforcing the prefetch bound invariant
//! (testable property 7: `|pending| + |delivered| <= prefetchLimit +
//! prefetchExtension` at any time).
//!
//! Messages land in `pending` first and move to `delivered` only once handed
//! to the application (`deliver_next`), unless the consumer uses synchronous
//! dispatch, in which case they go straight to `delivered`. Acks only ever
//! apply to `delivered`, matching the broker's own view of what the
//! application has actually seen.

use std::collections::VecDeque;

use thiserror::Error;

use crate::command::{AckType, MessageDispatch};
use crate::ids::{ConsumerId, MessageId};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("consumer {0} is already holding its full prefetch window")]
    PrefetchExceeded(ConsumerId),
}

/// One consumer's pending and delivered, unacknowledged dispatches, in
/// delivery order.
pub struct ConsumerDispatch {
    pub consumer_id: ConsumerId,
    pub prefetch_size: u32,
    pub ack_type: AckType,
    dispatch_async: bool,
    prefetch_extension: u32,
    pending: VecDeque<MessageDispatch>,
    delivered: VecDeque<MessageDispatch>,
}

impl ConsumerDispatch {
    #[must_use]
    pub fn new(consumer_id: ConsumerId, prefetch_size: u32, ack_type: AckType, dispatch_async: bool) -> Self {
        Self {
            consumer_id,
            prefetch_size,
            ack_type,
            dispatch_async,
            prefetch_extension: 0,
            pending: VecDeque::new(),
            delivered: VecDeque::new(),
        }
    }

    /// Record a dispatch. Prefetch 0 (pull mode) accepts a dispatch only
    /// while a `MessagePull` credit granted via [`Self::grant_pull_credit`]
    /// is outstanding, consuming one credit per accepted message. Otherwise
    /// the bound is `prefetch_size + prefetch_extension`.
    ///
    /// With asynchronous dispatch the message buffers in `pending` until
    /// [`Self::deliver_next`] hands it to the application; otherwise it goes
    /// straight to `delivered`.
    ///
    /// # Errors
    /// Returns [`DispatchError::PrefetchExceeded`] if accepting `dispatch`
    /// would exceed the consumer's current window.
    pub fn dispatch(&mut self, dispatch: MessageDispatch) -> Result<(), DispatchError> {
        if self.prefetch_size == 0 {
            if self.prefetch_extension == 0 {
                return Err(DispatchError::PrefetchExceeded(self.consumer_id.clone()));
            }
            self.prefetch_extension -= 1;
        } else if self.in_flight_count() as u32 >= self.prefetch_size + self.prefetch_extension {
            return Err(DispatchError::PrefetchExceeded(self.consumer_id.clone()));
        }

        if self.dispatch_async {
            self.pending.push_back(dispatch);
        } else {
            self.delivered.push_back(dispatch);
        }
        Ok(())
    }

    /// Hand the oldest pending dispatch to the application, moving it into
    /// `delivered`. Returns the delivered entry, or `None` if nothing is
    /// pending.
    pub fn deliver_next(&mut self) -> Option<&MessageDispatch> {
        let next = self.pending.pop_front()?;
        self.delivered.push_back(next);
        self.delivered.back()
    }

    /// Grant one `MessagePull` flow-control credit to a zero-prefetch
    /// consumer.
    pub fn grant_pull_credit(&mut self) {
        if self.prefetch_size == 0 {
            self.prefetch_extension += 1;
        }
    }

    /// Widen the outstanding window by `extra`, e.g. in response to a
    /// broker-driven `ConsumerControl` prefetch override.
    pub fn extend_prefetch(&mut self, extra: u32) { self.prefetch_extension += extra; }

    pub fn reset_prefetch_extension(&mut self) { self.prefetch_extension = 0; }

    /// Apply an acknowledgement, removing the acked messages from the
    /// delivered set. `Individual` removes exactly the matching message;
    /// every other mode is cumulative and removes everything up to and
    /// including the matching message. Returns how many messages were
    /// removed.
    pub fn ack(&mut self, message_id: &MessageId, ack_type: AckType) -> u32 {
        if ack_type == AckType::Individual {
            let before = self.delivered.len();
            self.delivered.retain(|d| d.message.as_ref().and_then(|m| m.message_id.as_ref()) != Some(message_id));
            return u32::try_from(before - self.delivered.len()).unwrap_or(0);
        }

        let mut removed = 0u32;
        while let Some(front) = self.delivered.pop_front() {
            removed += 1;
            if front.message.as_ref().and_then(|m| m.message_id.as_ref()) == Some(message_id) {
                break;
            }
        }
        removed
    }

    /// The batch size a dups-ok ack or a `DELIVERED_ACK_TYPE` pre-ack fires
    /// at: half the prefetch window, rounded up, minimum 1.
    fn batch_threshold(&self) -> usize { (self.prefetch_size / 2).max(1) as usize }

    /// The id to batch-ack, once enough messages have been delivered under
    /// `DupsOk` to justify a round trip. Does not mutate state; the caller
    /// still issues the ack.
    #[must_use]
    pub fn dups_ok_batch_ready(&self) -> Option<&MessageId> {
        if self.ack_type != AckType::DupsOk || self.delivered.len() < self.batch_threshold() {
            return None;
        }
        self.delivered.back()?.message.as_ref()?.message_id.as_ref()
    }

    /// The id to send a batched `DELIVERED_ACK_TYPE` pre-ack for, once
    /// enough messages have been delivered to the application without a
    /// real ack following yet. Does not mutate state.
    #[must_use]
    pub fn delivered_pre_ack_ready(&self) -> Option<&MessageId> {
        if self.delivered.len() < self.batch_threshold() {
            return None;
        }
        self.delivered.back()?.message.as_ref()?.message_id.as_ref()
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize { self.pending.len() + self.delivered.len() }

    #[must_use]
    pub fn is_at_prefetch_limit(&self) -> bool {
        if self.prefetch_size == 0 {
            return self.prefetch_extension == 0;
        }
        self.in_flight_count() as u32 >= self.prefetch_size + self.prefetch_extension
    }

    #[must_use]
    pub fn peek_oldest(&self) -> Option<&MessageDispatch> { self.delivered.front() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandHeader;
    use crate::ids::ConnectionId;

    fn consumer_id() -> ConsumerId {
        ConsumerId { connection_id: ConnectionId::new("c1"), session_value: 1, value: 1 }
    }

    fn producer_id() -> crate::ids::ProducerId {
        crate::ids::ProducerId { connection_id: ConnectionId::new("c1"), session_value: 1, value: 1 }
    }

    fn dispatch_with_id(seq: u64) -> MessageDispatch {
        let mut message = crate::command::Message::default();
        message.message_id = Some(MessageId::new(producer_id(), seq));
        MessageDispatch { header: CommandHeader::default(), consumer_id: Some(consumer_id()), destination: None, message: Some(message), redelivery_counter: 0 }
    }

    #[test]
    fn dispatch_respects_prefetch_bound() {
        let mut dispatch = ConsumerDispatch::new(consumer_id(), 2, AckType::Auto, false);
        dispatch.dispatch(dispatch_with_id(1)).unwrap();
        dispatch.dispatch(dispatch_with_id(2)).unwrap();
        assert!(dispatch.dispatch(dispatch_with_id(3)).is_err());
    }

    #[test]
    fn cumulative_ack_clears_everything_up_to_target() {
        let mut dispatch = ConsumerDispatch::new(consumer_id(), 10, AckType::Client, false);
        for i in 1..=3 {
            dispatch.dispatch(dispatch_with_id(i)).unwrap();
        }
        let removed = dispatch.ack(&MessageId::new(producer_id(), 2), AckType::Client);
        assert_eq!(removed, 2);
        assert_eq!(dispatch.in_flight_count(), 1);
    }

    #[test]
    fn individual_ack_only_removes_the_matching_message() {
        let mut dispatch = ConsumerDispatch::new(consumer_id(), 10, AckType::Individual, false);
        for i in 1..=3 {
            dispatch.dispatch(dispatch_with_id(i)).unwrap();
        }
        let removed = dispatch.ack(&MessageId::new(producer_id(), 2), AckType::Individual);
        assert_eq!(removed, 1);
        assert_eq!(dispatch.in_flight_count(), 2);
    }

    #[test]
    fn prefetch_zero_requires_a_pull_credit_per_message() {
        let mut dispatch = ConsumerDispatch::new(consumer_id(), 0, AckType::Auto, false);
        assert!(dispatch.dispatch(dispatch_with_id(1)).is_err());

        dispatch.grant_pull_credit();
        dispatch.dispatch(dispatch_with_id(1)).unwrap();

        // the credit was consumed by the dispatch above
        assert!(dispatch.dispatch(dispatch_with_id(2)).is_err());
        assert!(dispatch.is_at_prefetch_limit());
    }

    #[test]
    fn async_dispatch_buffers_in_pending_until_delivered() {
        let mut dispatch = ConsumerDispatch::new(consumer_id(), 10, AckType::Client, true);
        dispatch.dispatch(dispatch_with_id(1)).unwrap();
        assert_eq!(dispatch.peek_oldest(), None);

        let delivered = dispatch.deliver_next().expect("pending entry");
        assert_eq!(
            delivered.message.as_ref().and_then(|m| m.message_id.as_ref()),
            Some(&MessageId::new(producer_id(), 1))
        );
        assert_eq!(dispatch.peek_oldest().and_then(|d| d.message.as_ref()).and_then(|m| m.message_id.as_ref()), Some(&MessageId::new(producer_id(), 1)));
    }

    #[test]
    fn extension_widens_the_bound_beyond_prefetch_size() {
        let mut dispatch = ConsumerDispatch::new(consumer_id(), 2, AckType::Auto, false);
        dispatch.dispatch(dispatch_with_id(1)).unwrap();
        dispatch.dispatch(dispatch_with_id(2)).unwrap();
        assert!(dispatch.dispatch(dispatch_with_id(3)).is_err());

        dispatch.extend_prefetch(1);
        dispatch.dispatch(dispatch_with_id(3)).unwrap();
        assert!(dispatch.is_at_prefetch_limit());

        dispatch.reset_prefetch_extension();
        assert!(dispatch.is_at_prefetch_limit());
    }

    #[test]
    fn dups_ok_batch_ready_fires_at_half_prefetch() {
        let mut dispatch = ConsumerDispatch::new(consumer_id(), 4, AckType::DupsOk, false);
        dispatch.dispatch(dispatch_with_id(1)).unwrap();
        assert!(dispatch.dups_ok_batch_ready().is_none());

        dispatch.dispatch(dispatch_with_id(2)).unwrap();
        assert_eq!(dispatch.dups_ok_batch_ready(), Some(&MessageId::new(producer_id(), 2)));
    }

    #[test]
    fn delivered_pre_ack_ready_ignores_ack_type() {
        let mut dispatch = ConsumerDispatch::new(consumer_id(), 4, AckType::Client, false);
        dispatch.dispatch(dispatch_with_id(1)).unwrap();
        dispatch.dispatch(dispatch_with_id(2)).unwrap();
        assert_eq!(dispatch.delivered_pre_ack_ready(), Some(&MessageId::new(producer_id(), 2)));
    }
}
