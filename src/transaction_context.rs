//! Transaction context (§4.H): local and XA transaction lifecycle plus the
//! before/after commit/rollback synchronization callbacks consumers and
//! producers register to flush their own state (e.g. session dispatch acks)
//! in step with the transaction boundary.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::ids::{ConnectionId, LocalTransactionId, TransactionId, XaTransactionId};

/// A callback invoked around a transaction boundary. `before_*` runs while
/// the transaction is still open and may itself fail (e.g. a participant
/// that can't flush in time); `after_*` runs once the outcome is final and
/// is infallible bookkeeping only.
pub trait Synchronization: Send + Sync {
    fn before_commit(&self) -> Result<(), TransactionError> { Ok(()) }
    fn after_commit(&self) {}
    fn before_rollback(&self) -> Result<(), TransactionError> { Ok(()) }
    fn after_rollback(&self) {}
}

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("no transaction is currently open")]
    NoActiveTransaction,
    #[error("a transaction is already open")]
    AlreadyActive,
    #[error("a participant failed during commit: {0}")]
    SynchronizationFailed(String),
}

/// Tracks the single in-flight transaction for one session (JMS sessions
/// are single-threaded and have at most one open transaction at a time).
pub struct TransactionContext {
    connection_id: ConnectionId,
    next_local_value: u64,
    current: Option<TransactionId>,
    synchronizations: Vec<Arc<dyn Synchronization>>,
}

impl TransactionContext {
    #[must_use]
    pub const fn new(connection_id: ConnectionId) -> Self {
        Self { connection_id, next_local_value: 1, current: None, synchronizations: Vec::new() }
    }

    #[must_use]
    pub fn current(&self) -> Option<&TransactionId> { self.current.as_ref() }

    #[must_use]
    pub const fn in_transaction(&self) -> bool { self.current.is_some() }

    pub fn add_synchronization(&mut self, sync: Arc<dyn Synchronization>) { self.synchronizations.push(sync); }

    /// Begin a local transaction.
    ///
    /// # Errors
    /// Returns [`TransactionError::AlreadyActive`] if one is already open.
    pub fn begin(&mut self) -> Result<TransactionId, TransactionError> {
        if self.current.is_some() {
            return Err(TransactionError::AlreadyActive);
        }
        let id = TransactionId::Local(LocalTransactionId { connection_id: self.connection_id.clone(), value: self.next_local_value });
        self.next_local_value += 1;
        self.current = Some(id.clone());
        debug!(%id, "began local transaction");
        Ok(id)
    }

    /// Begin (or resume, for `TMJOIN`/`TMRESUME` semantics the caller has
    /// already resolved) an XA transaction with a broker-assigned xid.
    ///
    /// # Errors
    /// Returns [`TransactionError::AlreadyActive`] if one is already open.
    pub fn begin_xa(&mut self, xid: XaTransactionId) -> Result<TransactionId, TransactionError> {
        if self.current.is_some() {
            return Err(TransactionError::AlreadyActive);
        }
        let id = TransactionId::Xa(xid);
        self.current = Some(id.clone());
        Ok(id)
    }

    /// Run every registered synchronization's `before_commit`, then
    /// `after_commit`, then clear the current transaction.
    ///
    /// # Errors
    /// Returns [`TransactionError::NoActiveTransaction`] if none is open, or
    /// [`TransactionError::SynchronizationFailed`] if a participant's
    /// `before_commit` fails (the transaction is left open so the caller can
    /// retry or roll back).
    pub fn commit(&mut self) -> Result<TransactionId, TransactionError> {
        let id = self.current.clone().ok_or(TransactionError::NoActiveTransaction)?;
        for sync in &self.synchronizations {
            sync.before_commit().map_err(|e| TransactionError::SynchronizationFailed(e.to_string()))?;
        }
        for sync in &self.synchronizations {
            sync.after_commit();
        }
        self.synchronizations.clear();
        self.current = None;
        debug!(%id, "committed transaction");
        Ok(id)
    }

    /// Run every registered synchronization's `before_rollback`, then
    /// `after_rollback`, then clear the current transaction.
    ///
    /// # Errors
    /// Returns [`TransactionError::NoActiveTransaction`] if none is open.
    pub fn rollback(&mut self) -> Result<TransactionId, TransactionError> {
        let id = self.current.clone().ok_or(TransactionError::NoActiveTransaction)?;
        for sync in &self.synchronizations {
            let _ = sync.before_rollback();
        }
        for sync in &self.synchronizations {
            sync.after_rollback();
        }
        self.synchronizations.clear();
        self.current = None;
        debug!(%id, "rolled back transaction");
        Ok(id)
    }
}
