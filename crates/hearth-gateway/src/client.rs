//! Auto-reconnecting gateway client.
//!
//! One [`GatewayConnection`] owns the link to one gateway. The session is
//! client-driven: connect, `discover`, wait for the `sensors` reply,
//! `subscribe`, then consume the stream until it breaks. Every exit from a
//! session, clean or not, leads back to a fixed-delay reconnect; the delay
//! never grows, since a home gateway being down for hours is normal and
//! the link should come back within one delay of the gateway returning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, warn};

use hearth_proto::{ClientMessage, GatewayMessage};

use crate::registry::RemoteRegistry;
use crate::state::{AtomicLinkState, LinkState};

/// Upper bound on connect and discovery, covering sleepy LoRa gateways.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the streaming read loop wakes up to check the stop flag.
const READ_POLL: Duration = Duration::from_secs(1);

/// Slice length for reconnect waits; bounds stop latency.
const WAIT_SLICE: Duration = Duration::from_millis(250);

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(15);

type Wire = Framed<TcpStream, LinesCodec>;

/// Why a session ended, for the reconnect log line.
#[derive(Debug)]
enum SessionEnd {
    Stopped,
    Closed,
    Io(String),
}

/// A connection to one remote sensor gateway.
pub struct GatewayConnection {
    host: String,
    port: u16,
    registry: Arc<RemoteRegistry>,
    reconnect_delay: Duration,
    state: Arc<AtomicLinkState>,
    gateway_id: Arc<Mutex<Option<String>>>,
    running: Arc<AtomicBool>,
}

impl GatewayConnection {
    /// Creates a connection. Nothing runs until [`GatewayConnection::start`].
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, registry: Arc<RemoteRegistry>) -> Self {
        Self {
            host: host.into(),
            port,
            registry,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            state: Arc::new(AtomicLinkState::new(LinkState::Disconnected)),
            gateway_id: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Overrides the fixed reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Current link state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state.load()
    }

    /// Gateway id learned from the most recent discovery, if any. Reset is
    /// not needed across reconnects: each new session re-learns it.
    #[must_use]
    pub fn gateway_id(&self) -> Option<String> {
        self.gateway_id.lock().clone()
    }

    /// True while the connection loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Requests the connection loop to stop. Observed within about a
    /// second from any phase, including mid-stream and mid-wait.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.state.store(LinkState::Disconnected);
    }

    /// Starts the connection loop on the tokio runtime.
    pub fn start(&self) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        let host = self.host.clone();
        let port = self.port;
        let registry = Arc::clone(&self.registry);
        let reconnect_delay = self.reconnect_delay;
        let state = Arc::clone(&self.state);
        let gateway_id = Arc::clone(&self.gateway_id);
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            Self::connection_loop(
                &host,
                port,
                &registry,
                reconnect_delay,
                &state,
                &gateway_id,
                &running,
            )
            .await;
        })
    }

    async fn connection_loop(
        host: &str,
        port: u16,
        registry: &Arc<RemoteRegistry>,
        reconnect_delay: Duration,
        state: &Arc<AtomicLinkState>,
        gateway_id: &Arc<Mutex<Option<String>>>,
        running: &Arc<AtomicBool>,
    ) {
        let addr = format!("{host}:{port}");
        info!(gateway = %addr, "gateway connection loop started");

        while running.load(Ordering::SeqCst) {
            state.store(LinkState::Connecting);

            match timeout(HANDSHAKE_TIMEOUT, TcpStream::connect(&addr)).await {
                Ok(Ok(stream)) => {
                    let wire = Framed::new(stream, LinesCodec::new());
                    let end =
                        Self::run_session(wire, registry, state, gateway_id, running).await;
                    state.store(LinkState::Disconnected);

                    match end {
                        SessionEnd::Stopped => break,
                        SessionEnd::Closed => {
                            info!(gateway = %addr, "gateway closed the connection");
                        }
                        SessionEnd::Io(reason) => {
                            warn!(gateway = %addr, reason = %reason, "gateway session failed");
                        }
                    }
                }
                Ok(Err(e)) => {
                    state.store(LinkState::Disconnected);
                    debug!(gateway = %addr, error = %e, "gateway connect failed");
                }
                Err(_) => {
                    state.store(LinkState::Disconnected);
                    debug!(gateway = %addr, "gateway connect timed out");
                }
            }

            if running.load(Ordering::SeqCst) {
                Self::wait_cancellable(reconnect_delay, running).await;
            }
        }

        state.store(LinkState::Disconnected);
        info!(gateway = %addr, "gateway connection loop stopped");
    }

    /// Runs discovery, subscription, and the streaming read loop over an
    /// established TCP connection.
    async fn run_session(
        mut wire: Wire,
        registry: &Arc<RemoteRegistry>,
        state: &Arc<AtomicLinkState>,
        gateway_id: &Arc<Mutex<Option<String>>>,
        running: &Arc<AtomicBool>,
    ) -> SessionEnd {
        state.store(LinkState::Discovering);

        if let Err(end) = Self::send(&mut wire, ClientMessage::Discover).await {
            return end;
        }

        // The sensors reply must arrive within the handshake window.
        // Other messages (a keen gateway may heartbeat early) are ignored
        // while waiting, but an unparseable line here means we are not
        // talking to a gateway; drop the session rather than sit out the
        // full handshake timeout.
        let announced = match timeout(HANDSHAKE_TIMEOUT, async {
            loop {
                match wire.next().await {
                    Some(Ok(line)) => match GatewayMessage::from_json(&line) {
                        Ok(GatewayMessage::Sensors {
                            gateway_id,
                            sensors,
                        }) => return Ok((gateway_id, sensors)),
                        Ok(_) => {}
                        Err(e) => {
                            return Err(SessionEnd::Io(format!(
                                "invalid discovery response: {e}"
                            )))
                        }
                    },
                    Some(Err(e)) => return Err(SessionEnd::Io(e.to_string())),
                    None => return Err(SessionEnd::Closed),
                }
            }
        })
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(end)) => return end,
            Err(_) => return SessionEnd::Io("discovery timed out".to_string()),
        };

        let (id, sensors) = announced;
        *gateway_id.lock() = Some(id.clone());
        registry.on_discovered(&id, sensors);

        if let Err(end) = Self::send(&mut wire, ClientMessage::Subscribe).await {
            return end;
        }
        state.store(LinkState::Streaming);

        loop {
            if !running.load(Ordering::SeqCst) {
                return SessionEnd::Stopped;
            }

            // Short poll so the stop flag is honored during quiet periods.
            let next = match timeout(READ_POLL, wire.next()).await {
                Ok(next) => next,
                Err(_) => continue,
            };

            match next {
                Some(Ok(line)) => match GatewayMessage::from_json(&line) {
                    Ok(GatewayMessage::Data { readings }) => {
                        if readings.is_empty() {
                            debug!("gateway heartbeat");
                        } else {
                            registry.on_data(&readings);
                        }
                    }
                    Ok(GatewayMessage::Sensors {
                        gateway_id: id,
                        sensors,
                    }) => {
                        // Mid-stream re-announcement, e.g. a new node
                        // joined the gateway's radio network.
                        *gateway_id.lock() = Some(id.clone());
                        registry.on_discovered(&id, sensors);
                    }
                    Ok(GatewayMessage::Unknown) => {
                        debug!("ignoring unknown message type");
                    }
                    Err(e) => {
                        warn!(error = %e, "skipping malformed line");
                    }
                },
                Some(Err(e)) => return SessionEnd::Io(e.to_string()),
                None => return SessionEnd::Closed,
            }
        }
    }

    async fn send(wire: &mut Wire, msg: ClientMessage) -> Result<(), SessionEnd> {
        let line = msg
            .to_json()
            .map_err(|e| SessionEnd::Io(e.to_string()))?;
        wire.send(line)
            .await
            .map_err(|e| SessionEnd::Io(e.to_string()))
    }

    /// Sleeps for `delay` in short slices, returning early on stop.
    async fn wait_cancellable(delay: Duration, running: &Arc<AtomicBool>) {
        let mut waited = Duration::ZERO;
        while running.load(Ordering::SeqCst) && waited < delay {
            let step = (delay - waited).min(WAIT_SLICE);
            sleep(step).await;
            waited += step;
        }
    }
}

impl std::fmt::Debug for GatewayConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
