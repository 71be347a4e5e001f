//! Failover transport (behind the `failover` feature).
//!
//! Owns a pool of broker URIs, a reconnect policy with exponential backoff,
//! an optional backup pool, and a queue of commands sent while
//! disconnected. On reconnect it replays the [`ConnectionStateTracker`]'s
//! program before releasing anything queued while the transport was down,
//! satisfying testable property 6 (at-least-once delivery across a
//! reconnect).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tracing::{info, warn};
use url::Url;

use crate::command::Command;
use crate::tracker::ConnectionStateTracker;
use crate::transport::uri::{FailoverOptions, FailoverUri};
use crate::transport::{Transport, TransportError, TransportListener};

/// Connects a broker URI to a fully-assembled transport (wireformat
/// negotiation, inactivity monitor, response correlator already stacked on
/// top, as the caller's connector sees fit). Kept abstract so this module
/// never depends on `tcp` directly.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self, uri: &Url) -> Result<Arc<dyn Transport>, TransportError>;
}

struct DownstreamListener {
    owner: Arc<FailoverTransport>,
}

impl TransportListener for DownstreamListener {
    fn on_command(&self, command: Command) {
        self.owner.tracker.lock().process(&command);
        if let Some(listener) = self.owner.listener.lock().as_ref() {
            listener.on_command(command);
        }
    }

    fn on_exception(&self, error: TransportError) {
        warn!(error = %error, "transport failed, triggering reconnect");
        self.owner.handle_disconnect();
    }
}

pub struct FailoverTransport {
    connector: Arc<dyn TransportConnector>,
    primary_uris: Vec<Url>,
    backup_uris: Vec<Url>,
    options: FailoverOptions,
    current: Mutex<Option<Arc<dyn Transport>>>,
    pending: Mutex<VecDeque<Command>>,
    tracker: Mutex<ConnectionStateTracker>,
    listener: Mutex<Option<Arc<dyn TransportListener>>>,
    running: AtomicBool,
    self_ref: Weak<Self>,
}

impl FailoverTransport {
    #[must_use]
    pub fn new(connector: Arc<dyn TransportConnector>, failover: FailoverUri) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            connector,
            primary_uris: failover.broker_uris,
            backup_uris: Vec::new(),
            options: failover.options,
            current: Mutex::new(None),
            pending: Mutex::new(VecDeque::new()),
            tracker: Mutex::new(ConnectionStateTracker::new(1024)),
            listener: Mutex::new(None),
            running: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        })
    }

    fn candidate_uris(&self) -> Vec<Url> {
        let mut uris = self.primary_uris.clone();
        if self.options.backup {
            uris.extend(self.backup_uris.clone());
        }
        if self.options.randomize {
            uris.shuffle(&mut rand::thread_rng());
        }
        uris
    }

    /// Attempt to connect to each candidate URI in turn until one succeeds,
    /// backing off exponentially (capped at `max_reconnect_delay_ms`)
    /// between full sweeps of the pool.
    async fn connect_with_backoff(self: &Arc<Self>) -> Result<Arc<dyn Transport>, TransportError> {
        let mut delay = Duration::from_millis(self.options.initial_reconnect_delay_ms);
        let mut attempt = 0u32;

        loop {
            for uri in self.candidate_uris() {
                match self.connector.connect(&uri).await {
                    Ok(transport) => {
                        info!(uri = %uri, attempt, "connected to broker");
                        return Ok(transport);
                    }
                    Err(e) => warn!(uri = %uri, error = %e, "connect attempt failed"),
                }
            }

            attempt += 1;
            if let Some(max) = self.options.max_reconnect_attempts {
                if attempt >= max {
                    return Err(TransportError::ExhaustedUriPool);
                }
            }

            tokio::time::sleep(delay).await;
            if self.options.use_exponential_backoff {
                let scaled = (delay.as_millis() as f64 * self.options.backoff_multiplier) as u64;
                delay = Duration::from_millis(scaled).min(Duration::from_millis(self.options.max_reconnect_delay_ms));
            }
        }
    }

    fn handle_disconnect(self: &Arc<Self>) {
        *self.current.lock() = None;
        if let Some(listener) = self.listener.lock().as_ref() {
            listener.transport_interrupted();
        }
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move { this.reconnect_and_replay().await });
    }

    async fn reconnect_and_replay(self: &Arc<Self>) {
        let Ok(transport) = self.connect_with_backoff().await else {
            warn!("exhausted reconnect attempts");
            return;
        };
        transport.set_listener(Arc::new(DownstreamListener { owner: Arc::clone(self) }));
        if transport.start().await.is_err() {
            self.handle_disconnect();
            return;
        }

        let replay = self.tracker.lock().build_replay_program();
        for command in replay {
            if transport.oneway(command).await.is_err() {
                self.handle_disconnect();
                return;
            }
        }

        let queued: Vec<Command> = self.pending.lock().drain(..).collect();
        for command in queued {
            if transport.oneway(command.clone()).await.is_err() {
                self.pending.lock().push_back(command);
                self.handle_disconnect();
                return;
            }
        }

        *self.current.lock() = Some(transport);
        if let Some(listener) = self.listener.lock().as_ref() {
            listener.transport_resumed();
        }
    }
}

#[async_trait]
impl Transport for FailoverTransport {
    async fn start(&self) -> Result<(), TransportError> {
        self.running.store(true, Ordering::SeqCst);
        let this = self.self_ref.upgrade().expect("failover transport outlives its own start() call");
        this.reconnect_and_replay().await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(transport) = self.current.lock().take() {
            transport.stop().await?;
        }
        Ok(())
    }

    async fn oneway(&self, command: Command) -> Result<(), TransportError> {
        self.tracker.lock().process(&command);
        let transport = self.current.lock().clone();
        match transport {
            Some(transport) => {
                if transport.oneway(command.clone()).await.is_err() {
                    self.pending.lock().push_back(command);
                    return Ok(());
                }
                Ok(())
            }
            None => {
                self.pending.lock().push_back(command);
                Ok(())
            }
        }
    }

    async fn request(&self, command: Command) -> Result<Command, TransportError> {
        self.tracker.lock().process(&command);
        let transport = self.current.lock().clone().ok_or(TransportError::NotConnected)?;
        transport.request(command).await
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) { *self.listener.lock() = Some(listener); }

    fn is_connected(&self) -> bool { self.current.lock().is_some() }

    fn remote_address(&self) -> Option<String> { self.current.lock().as_ref().and_then(|t| t.remote_address()) }
}
