//! Connection state tracker (§4.F).
//!
//! Shadows every `*Info`/`TransactionInfo` command the application sends so
//! that, after a failover reconnect, the client can replay a program that
//! rebuilds the broker's view of the connection without the application
//! needing to resend anything itself. Mirrors `ConnectionStateTracker` from
//! the original client; the C++ class's manual locking becomes one
//! `parking_lot::Mutex` around a plain struct, since the tracked state is
//! small and short-lived relative to one connection's lifetime.

use std::collections::HashMap;

use crate::command::{
    Command, CommandHeader, ConnectionInfo, ConsumerInfo, DestinationInfo, ProducerInfo,
    RemoveInfo, SessionInfo, TransactionInfo, TransactionOp,
};
use crate::ids::{ConsumerId, ProducerId, SessionId, TransactionId};

#[derive(Debug, Clone)]
struct TransactionState {
    begin: TransactionInfo,
    recorded: Vec<Command>,
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    info: Option<SessionInfo>,
    producers: HashMap<ProducerId, ProducerInfo>,
    consumers: HashMap<ConsumerId, ConsumerInfo>,
}

/// Tracks everything needed to replay one connection's setup after a
/// transport resume.
#[derive(Debug, Default)]
pub struct ConnectionStateTracker {
    connection_info: Option<ConnectionInfo>,
    sessions: HashMap<SessionId, SessionState>,
    transactions: HashMap<TransactionId, TransactionState>,
    destinations: Vec<DestinationInfo>,
    /// Bounded ring buffer of recently-sent message ids, used for
    /// duplicate suppression during reconnect replay (`trackMessages`).
    message_audit: Vec<String>,
    message_audit_capacity: usize,
}

impl ConnectionStateTracker {
    #[must_use]
    pub fn new(message_audit_capacity: usize) -> Self {
        Self { message_audit_capacity, ..Default::default() }
    }

    /// Observe an outbound command, updating the shadow state as needed.
    /// Call this for every command the application sends, regardless of
    /// whether a reconnect is imminent.
    pub fn process(&mut self, command: &Command) {
        match command {
            Command::ConnectionInfo(info) => self.connection_info = Some(info.clone()),
            Command::SessionInfo(info) => {
                self.sessions.entry(info.session_id.clone()).or_default().info = Some(info.clone());
            }
            Command::ProducerInfo(info) => {
                let session_id = info.producer_id.session_id();
                self.sessions
                    .entry(session_id)
                    .or_default()
                    .producers
                    .insert(info.producer_id.clone(), info.clone());
            }
            Command::ConsumerInfo(info) => {
                let session_id = info.consumer_id.session_id();
                self.sessions
                    .entry(session_id)
                    .or_default()
                    .consumers
                    .insert(info.consumer_id.clone(), info.clone());
            }
            Command::DestinationInfo(info) => self.destinations.push(info.clone()),
            Command::RemoveInfo(info) => self.apply_remove(info),
            Command::TransactionInfo(info) => self.apply_transaction(info, command),
            Command::Message(message) => {
                if let Some(id) = &message.message_id {
                    self.note_message(id.to_string());
                    if let TransactionId::Local(_) | TransactionId::Xa(_) = &message.transaction_id {
                        self.record_in_transaction(&message.transaction_id, command.clone());
                    }
                }
            }
            Command::MessageAck(ack) => {
                if let TransactionId::Local(_) | TransactionId::Xa(_) = &ack.transaction_id {
                    self.record_in_transaction(&ack.transaction_id, command.clone());
                }
            }
            _ => {}
        }
    }

    fn note_message(&mut self, id: String) {
        if self.message_audit_capacity == 0 {
            return;
        }
        if self.message_audit.len() >= self.message_audit_capacity {
            self.message_audit.remove(0);
        }
        self.message_audit.push(id);
    }

    #[must_use]
    pub fn has_seen_message(&self, id: &str) -> bool { self.message_audit.iter().any(|seen| seen == id) }

    fn apply_remove(&mut self, info: &RemoveInfo) {
        if let (Some(session_value), None, None) = (info.session_value, info.producer_value, info.consumer_value) {
            self.sessions.retain(|id, _| id.value != session_value);
            return;
        }
        if let Some(producer_value) = info.producer_value {
            for session in self.sessions.values_mut() {
                session.producers.retain(|id, _| id.value != producer_value);
            }
        }
        if let Some(consumer_value) = info.consumer_value {
            for session in self.sessions.values_mut() {
                session.consumers.retain(|id, _| id.value != consumer_value);
            }
        }
    }

    fn apply_transaction(&mut self, info: &TransactionInfo, command: &Command) {
        match info.op {
            TransactionOp::Begin => {
                self.transactions.insert(
                    info.transaction_id.clone(),
                    TransactionState { begin: info.clone(), recorded: Vec::new() },
                );
            }
            TransactionOp::Commit | TransactionOp::Rollback | TransactionOp::Forget => {
                self.transactions.remove(&info.transaction_id);
            }
            TransactionOp::End | TransactionOp::Prepare | TransactionOp::Recover => {
                self.record_in_transaction(&info.transaction_id, command.clone());
            }
        }
    }

    fn record_in_transaction(&mut self, transaction_id: &TransactionId, command: Command) {
        if let Some(state) = self.transactions.get_mut(transaction_id) {
            state.recorded.push(command);
        }
    }

    /// Build the command sequence that replays this connection's current
    /// state onto a fresh transport: `ConnectionInfo`, then each session's
    /// `SessionInfo` followed by its producers and consumers, then every
    /// still-open transaction's `Begin` plus recorded commands, then
    /// destination announcements.
    #[must_use]
    pub fn build_replay_program(&self) -> Vec<Command> {
        let mut program = Vec::new();

        if let Some(connection_info) = &self.connection_info {
            program.push(Command::ConnectionInfo(connection_info.clone()));
        }

        for destination in &self.destinations {
            program.push(Command::DestinationInfo(destination.clone()));
        }

        for session in self.sessions.values() {
            if let Some(session_info) = &session.info {
                program.push(Command::SessionInfo(session_info.clone()));
            }
            for producer in session.producers.values() {
                program.push(Command::ProducerInfo(producer.clone()));
            }
            for consumer in session.consumers.values() {
                program.push(Command::ConsumerInfo(consumer.clone()));
            }
        }

        for state in self.transactions.values() {
            program.push(Command::TransactionInfo(state.begin.clone()));
            program.extend(state.recorded.iter().cloned());
        }

        for command in &mut program {
            command.header_mut().response_required = false;
        }
        program
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.message_audit_capacity);
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::destination::Destination;
    use crate::ids::ConnectionId;

    fn connection_info(value: &str) -> ConnectionInfo {
        ConnectionInfo { header: CommandHeader::default(), connection_id: ConnectionId::new(value), ..Default::default() }
    }

    #[test]
    fn replay_program_rebuilds_connection_then_session_then_producer() {
        let mut tracker = ConnectionStateTracker::new(16);
        tracker.process(&Command::ConnectionInfo(connection_info("ID:host-1")));
        let session_id = SessionId { connection_id: ConnectionId::new("ID:host-1"), value: 1 };
        tracker.process(&Command::SessionInfo(SessionInfo { header: CommandHeader::default(), session_id: session_id.clone() }));
        let producer_id = ProducerId { connection_id: ConnectionId::new("ID:host-1"), session_value: 1, value: 1 };
        tracker.process(&Command::ProducerInfo(ProducerInfo {
            header: CommandHeader::default(),
            producer_id,
            destination: Some(Destination::Queue("orders".into())),
            ..Default::default()
        }));

        let program = tracker.build_replay_program();
        assert!(matches!(program[0], Command::ConnectionInfo(_)));
        assert!(program.iter().any(|c| matches!(c, Command::SessionInfo(_))));
        assert!(program.iter().any(|c| matches!(c, Command::ProducerInfo(_))));
    }

    #[rstest]
    fn removed_session_drops_from_replay() {
        let mut tracker = ConnectionStateTracker::new(16);
        let session_id = SessionId { connection_id: ConnectionId::new("ID:host-1"), value: 1 };
        tracker.process(&Command::SessionInfo(SessionInfo { header: CommandHeader::default(), session_id }));
        tracker.process(&Command::RemoveInfo(RemoveInfo {
            header: CommandHeader::default(),
            connection_id: None,
            session_value: Some(1),
            producer_value: None,
            consumer_value: None,
            last_delivered_sequence_id: None,
        }));
        let program = tracker.build_replay_program();
        assert!(!program.iter().any(|c| matches!(c, Command::SessionInfo(_))));
    }

    #[test]
    fn transaction_commit_clears_recorded_commands() {
        let mut tracker = ConnectionStateTracker::new(16);
        let tx_id = TransactionId::Local(crate::ids::LocalTransactionId {
            connection_id: ConnectionId::new("ID:host-1"),
            value: 1,
        });
        tracker.process(&Command::TransactionInfo(TransactionInfo {
            header: CommandHeader::default(),
            transaction_id: tx_id.clone(),
            op: TransactionOp::Begin,
        }));
        tracker.process(&Command::TransactionInfo(TransactionInfo {
            header: CommandHeader::default(),
            transaction_id: tx_id.clone(),
            op: TransactionOp::Commit,
        }));
        assert!(tracker.build_replay_program().is_empty());
    }

    #[test]
    fn message_audit_is_bounded_and_fifo() {
        let mut tracker = ConnectionStateTracker::new(2);
        tracker.note_message("a".into());
        tracker.note_message("b".into());
        tracker.note_message("c".into());
        assert!(!tracker.has_seen_message("a"));
        assert!(tracker.has_seen_message("c"));
    }
}
