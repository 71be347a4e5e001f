//! Raw TCP transport (behind the `tcp` feature). The bottom of every filter
//! chain built against a real broker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::BufWriter;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{error, info};

use crate::codec::{self, OpenWireFormat, WireFormatOptions};
use crate::command::Command;
use crate::transport::{Transport, TransportError, TransportListener};

struct NullListener;
impl TransportListener for NullListener {
    fn on_command(&self, _command: Command) {}
    fn on_exception(&self, _error: TransportError) {}
}

pub struct TcpTransport {
    remote: String,
    write_half: Mutex<BufWriter<OwnedWriteHalf>>,
    format: Mutex<OpenWireFormat>,
    listener: Mutex<Arc<dyn TransportListener>>,
    connected: AtomicBool,
}

impl TcpTransport {
    /// Connect to `addr` (e.g. `"localhost:61616"`) and start the background
    /// read loop immediately; `start`/`stop` only gate whether `oneway` is
    /// accepted.
    ///
    /// # Errors
    /// Returns [`TransportError::Io`] if the connection cannot be established.
    pub async fn connect(addr: &str, options: WireFormatOptions) -> Result<Arc<Self>, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();
        let (read_half, write_half) = stream.into_split();
        let transport = Arc::new(Self {
            remote: addr.to_owned(),
            write_half: Mutex::new(BufWriter::new(write_half)),
            format: Mutex::new(OpenWireFormat::new(options)),
            listener: Mutex::new(Arc::new(NullListener)),
            connected: AtomicBool::new(false),
        });
        spawn_reader(Arc::clone(&transport), read_half);
        Ok(transport)
    }
}

fn spawn_reader(owner: Arc<TcpTransport>, mut read_half: OwnedReadHalf) {
    tokio::spawn(async move {
        loop {
            let mut format = OpenWireFormat::default();
            {
                let guard = owner.format.lock();
                format.options = guard.options.clone();
            }
            match codec::frame::read_frame(&mut read_half, format.options.max_frame_size, codec::frame::DEFAULT_IO_TIMEOUT).await {
                Ok(body) => {
                    let result = owner.format.lock().unmarshal(&body);
                    match result {
                        Ok(command) => owner.listener.lock().on_command(command),
                        Err(e) => {
                            error!(error = %e, "failed to decode frame");
                            owner.listener.lock().on_exception(e.into());
                        }
                    }
                }
                Err(e) => {
                    owner.connected.store(false, Ordering::SeqCst);
                    owner.listener.lock().on_exception(e.into());
                    break;
                }
            }
        }
    });
}

#[async_trait]
impl Transport for TcpTransport {
    async fn start(&self) -> Result<(), TransportError> {
        info!(remote = %self.remote, "tcp transport starting");
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn oneway(&self, command: Command) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let mut write_half = self.write_half.lock();
        let mut format = self.format.lock();
        codec::write_command(&mut *write_half, &mut format, &command).await?;
        use tokio::io::AsyncWriteExt;
        write_half.flush().await?;
        Ok(())
    }

    async fn request(&self, _command: Command) -> Result<Command, TransportError> {
        // Raw TCP never correlates on its own; a `ResponseCorrelator` filter
        // is expected above this transport for request/response use.
        Err(TransportError::NotConnected)
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) { *self.listener.lock() = listener; }
    fn is_connected(&self) -> bool { self.connected.load(Ordering::SeqCst) }
    fn remote_address(&self) -> Option<String> { Some(self.remote.clone()) }
}

/// Connect to `addr` and stack the full negotiated chain on top: TCP at the
/// bottom, then wire format negotiation, inactivity monitoring, and response
/// correlation. This is the transport an application actually talks to.
///
/// # Errors
/// Returns [`TransportError`] if the TCP connect fails or negotiation times
/// out.
#[cfg(feature = "failover")]
pub async fn connect_negotiated(
    addr: &str,
    preferred: WireFormatOptions,
    heartbeat_interval: std::time::Duration,
    inactivity_grace_period: std::time::Duration,
) -> Result<Arc<dyn Transport>, TransportError> {
    use crate::transport::inactivity::InactivityMonitor;
    use crate::transport::logging::LoggingTransport;
    use crate::transport::response_correlator::{self, ResponseCorrelator};
    use crate::transport::wireformat_negotiator::WireFormatNegotiator;

    let tcp = TcpTransport::connect(addr, preferred.clone()).await?;
    let logging: Arc<dyn Transport> = Arc::new(LoggingTransport::new(tcp));
    let negotiator = WireFormatNegotiator::new(logging, preferred);
    negotiator.attach();
    negotiator.start().await?;

    let inactivity = InactivityMonitor::new(negotiator, heartbeat_interval, inactivity_grace_period);
    inactivity.attach_and_run();

    let correlator = ResponseCorrelator::new(inactivity);
    response_correlator::attach(&correlator);
    correlator.start().await?;

    Ok(correlator)
}

/// Adapts [`connect_negotiated`] to the failover pool's connector trait, so
/// a [`crate::transport::failover::FailoverTransport`] can dial real broker
/// URIs.
#[cfg(feature = "failover")]
pub struct NegotiatedTcpConnector {
    pub preferred: WireFormatOptions,
    pub heartbeat_interval: std::time::Duration,
    pub inactivity_grace_period: std::time::Duration,
}

#[cfg(feature = "failover")]
#[async_trait]
impl crate::transport::failover::TransportConnector for NegotiatedTcpConnector {
    async fn connect(&self, uri: &url::Url) -> Result<Arc<dyn Transport>, TransportError> {
        let addr = format!(
            "{}:{}",
            uri.host_str().ok_or_else(|| TransportError::NegotiationFailed("missing host".into()))?,
            uri.port().ok_or_else(|| TransportError::NegotiationFailed("missing port".into()))?
        );
        connect_negotiated(&addr, self.preferred.clone(), self.heartbeat_interval, self.inactivity_grace_period).await
    }
}
