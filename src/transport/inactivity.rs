//! Inactivity monitor: periodic `KeepAliveInfo` heartbeats out, and a
//! dead-peer timeout in, the way `ActiveMQio::InactivityMonitor` pairs a
//! write thread with a read-deadline check in the original client.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::warn;

use crate::command::{Command, CommandHeader, KeepAliveInfo};
use crate::transport::filter::TransportFilter;
use crate::transport::{Transport, TransportError, TransportListener};

pub struct InactivityMonitor {
    inner: TransportFilter,
    write_interval: Duration,
    read_grace_period: Duration,
    last_read_millis: AtomicI64,
    running: AtomicBool,
    listener: parking_lot::Mutex<Option<Arc<dyn TransportListener>>>,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

struct WatchingListener {
    owner: Arc<InactivityMonitor>,
}

impl TransportListener for WatchingListener {
    fn on_command(&self, command: Command) {
        self.owner.last_read_millis.store(now_millis(), Ordering::SeqCst);
        if matches!(command, Command::KeepAliveInfo(_)) {
            return;
        }
        if let Some(listener) = self.owner.listener.lock().as_ref() {
            listener.on_command(command);
        }
    }

    fn on_exception(&self, error: TransportError) {
        if let Some(listener) = self.owner.listener.lock().as_ref() {
            listener.on_exception(error);
        }
    }

    fn transport_interrupted(&self) {
        if let Some(listener) = self.owner.listener.lock().as_ref() {
            listener.transport_interrupted();
        }
    }

    fn transport_resumed(&self) {
        self.owner.last_read_millis.store(now_millis(), Ordering::SeqCst);
        if let Some(listener) = self.owner.listener.lock().as_ref() {
            listener.transport_resumed();
        }
    }
}

impl InactivityMonitor {
    #[must_use]
    pub fn new(next: Arc<dyn Transport>, write_interval: Duration, read_grace_period: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: TransportFilter::new(next),
            write_interval,
            read_grace_period,
            last_read_millis: AtomicI64::new(now_millis()),
            running: AtomicBool::new(false),
            listener: parking_lot::Mutex::new(None),
        })
    }

    /// Attach this monitor as its own upstream listener and spawn the
    /// heartbeat writer and dead-peer reader loops.
    pub fn attach_and_run(self: &Arc<Self>) {
        self.inner.next.set_listener(Arc::new(WatchingListener { owner: Arc::clone(self) }));
        self.running.store(true, Ordering::SeqCst);
        spawn_writer(Arc::clone(self));
        spawn_reader(Arc::clone(self));
    }
}

fn spawn_writer(monitor: Arc<InactivityMonitor>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(monitor.write_interval);
        while monitor.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !monitor.running.load(Ordering::SeqCst) {
                break;
            }
            let keep_alive = Command::KeepAliveInfo(KeepAliveInfo { header: CommandHeader::oneway(0) });
            if monitor.inner.oneway(keep_alive).await.is_err() {
                break;
            }
        }
    });
}

fn spawn_reader(monitor: Arc<InactivityMonitor>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(monitor.read_grace_period / 2);
        while monitor.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            let elapsed = now_millis() - monitor.last_read_millis.load(Ordering::SeqCst);
            if elapsed as u128 > monitor.read_grace_period.as_millis() {
                warn!(elapsed_ms = elapsed, "peer exceeded inactivity grace period");
                if let Some(listener) = monitor.listener.lock().as_ref() {
                    listener.on_exception(TransportError::InactivityTimeout);
                }
                monitor.running.store(false, Ordering::SeqCst);
                break;
            }
        }
    });
}

#[async_trait]
impl Transport for InactivityMonitor {
    async fn start(&self) -> Result<(), TransportError> { self.inner.start().await }

    async fn stop(&self) -> Result<(), TransportError> {
        self.running.store(false, Ordering::SeqCst);
        self.inner.stop().await
    }

    async fn oneway(&self, command: Command) -> Result<(), TransportError> { self.inner.oneway(command).await }
    async fn request(&self, command: Command) -> Result<Command, TransportError> { self.inner.request(command).await }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) { *self.listener.lock() = Some(listener); }
    fn is_connected(&self) -> bool { self.inner.is_connected() }
    fn remote_address(&self) -> Option<String> { self.inner.remote_address() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[tokio::test]
    async fn heartbeats_flow_to_the_peer() {
        let (a, b) = MockTransport::pair();
        let monitor = InactivityMonitor::new(a, Duration::from_millis(10), Duration::from_secs(60));
        monitor.attach_and_run();
        monitor.start().await.unwrap();
        b.start().await.unwrap();

        struct Counter(std::sync::atomic::AtomicUsize);
        impl TransportListener for Counter {
            fn on_command(&self, _command: Command) { self.0.fetch_add(1, Ordering::SeqCst); }
            fn on_exception(&self, _error: TransportError) {}
        }
        let counter = Arc::new(Counter(std::sync::atomic::AtomicUsize::new(0)));
        b.set_listener(counter.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.stop().await.unwrap();
        assert!(counter.0.load(Ordering::SeqCst) >= 1);
    }
}
