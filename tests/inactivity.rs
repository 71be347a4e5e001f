//! With a short inactivity grace period and a peer that never sends
//! anything back, the monitor must surface an interruption once the dead-
//! peer deadline passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use openwire_core::command::Command;
use openwire_core::transport::inactivity::InactivityMonitor;
use openwire_core::transport::mock::MockTransport;
use openwire_core::transport::{Transport, TransportError, TransportListener};

struct InterruptionFlag(AtomicBool);

impl TransportListener for InterruptionFlag {
    fn on_command(&self, _command: Command) {}
    fn on_exception(&self, error: TransportError) {
        if matches!(error, TransportError::InactivityTimeout) {
            self.0.store(true, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn inactivity_monitor_surfaces_interruption_after_the_grace_period() {
    let (client, broker) = MockTransport::pair();
    client.start().await.unwrap();
    broker.start().await.unwrap();

    let monitor = InactivityMonitor::new(client, Duration::from_secs(60), Duration::from_millis(20));
    monitor.attach_and_run();
    monitor.start().await.unwrap();

    let flag = Arc::new(InterruptionFlag(AtomicBool::new(false)));
    monitor.set_listener(flag.clone());

    // `broker` never replies, so the dead-peer check must eventually fire.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(flag.0.load(Ordering::SeqCst));
}
