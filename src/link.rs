//! Connection state machine for the cast device.
//!
//! All reconnection policy lives in [`CastLink::check_availability`]; casting
//! itself is a best-effort call that never retries. The availability task is
//! the only writer of the link state, the advance task reads it implicitly
//! through [`CastLink::load_media`], which demotes the link when a load fails
//! mid-session.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Upper bound for any single transport operation so a stuck probe or cast
/// call cannot starve the next tick of its task.
const OP_TIMEOUT: Duration = Duration::from_secs(15);

/// Failure surfaced by a cast transport; never escalates past the link.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device not found on the network: {0}")]
    NotFound(String),

    #[error("cast handshake failed: {0}")]
    Handshake(String),

    #[error("media load failed: {0}")]
    Load(String),

    #[error("transport worker failed: {0}")]
    Worker(String),
}

/// The low-level cast capability the link drives.
///
/// `load_media` consumes the session and hands it back on success so a failed
/// call cannot leave a half-dead session behind.
pub trait CastTransport: Send + Sync + 'static {
    type Session: Send + 'static;

    /// Probe whether the named device is currently discoverable.
    fn discover(
        &self,
        device_name: &str,
    ) -> impl Future<Output = Result<bool, TransportError>> + Send;

    /// Establish a session with the named device.
    fn connect(
        &self,
        device_name: &str,
    ) -> impl Future<Output = Result<Self::Session, TransportError>> + Send;

    /// Instruct the device to fetch and render `url`.
    fn load_media(
        &self,
        session: Self::Session,
        url: &str,
        content_type: &str,
    ) -> impl Future<Output = Result<Self::Session, TransportError>> + Send;

    /// Best-effort session teardown.
    fn disconnect(&self, session: Self::Session) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Unreachable,
}

struct Inner<S> {
    state: LinkState,
    session: Option<S>,
}

/// Connection/session state machine for one named device.
pub struct CastLink<T: CastTransport> {
    transport: T,
    device_name: String,
    inner: Mutex<Inner<T::Session>>,
}

impl<T: CastTransport> CastLink<T> {
    pub fn new(transport: T, device_name: impl Into<String>) -> Self {
        Self {
            transport,
            device_name: device_name.into(),
            inner: Mutex::new(Inner {
                state: LinkState::Disconnected,
                session: None,
            }),
        }
    }

    pub async fn state(&self) -> LinkState {
        self.inner.lock().await.state
    }

    /// Probe the device and drive the state machine.
    ///
    /// A reachable device without a session triggers a connect attempt; a
    /// vanished device releases the held session. Failures leave the link in
    /// a state the next scheduled check recovers from.
    pub async fn check_availability(&self) {
        let mut inner = self.inner.lock().await;
        let reachable = match timeout(OP_TIMEOUT, self.transport.discover(&self.device_name)).await
        {
            Ok(Ok(found)) => found,
            Ok(Err(err)) => {
                warn!(device = %self.device_name, error = %err, "reachability probe failed");
                false
            }
            Err(_) => {
                warn!(device = %self.device_name, "reachability probe timed out");
                false
            }
        };

        match (inner.state, reachable) {
            (LinkState::Connected, true) => {}
            (LinkState::Connected, false) => {
                info!(device = %self.device_name, "device no longer reachable; releasing session");
                if let Some(session) = inner.session.take() {
                    let _ = timeout(OP_TIMEOUT, self.transport.disconnect(session)).await;
                }
                inner.state = LinkState::Unreachable;
            }
            (_, true) => {
                inner.state = LinkState::Connecting;
                match timeout(OP_TIMEOUT, self.transport.connect(&self.device_name)).await {
                    Ok(Ok(session)) => {
                        inner.session = Some(session);
                        inner.state = LinkState::Connected;
                        info!(device = %self.device_name, "cast link established");
                    }
                    Ok(Err(err)) => {
                        inner.state = LinkState::Disconnected;
                        warn!(device = %self.device_name, error = %err, "connect failed; will retry on next check");
                    }
                    Err(_) => {
                        inner.state = LinkState::Disconnected;
                        warn!(device = %self.device_name, "connect timed out; will retry on next check");
                    }
                }
            }
            (_, false) => {
                debug!(device = %self.device_name, state = ?inner.state, "device not reachable");
            }
        }
    }

    /// Push one photo to the device; a silent no-op unless connected.
    ///
    /// A failed load drops the session and demotes the link to Disconnected;
    /// re-establishing it is left to the next availability check.
    pub async fn load_media(&self, url: &str, content_type: &str) {
        let mut inner = self.inner.lock().await;
        if inner.state != LinkState::Connected {
            debug!(state = ?inner.state, "skipping cast; link not connected");
            return;
        }
        let Some(session) = inner.session.take() else {
            inner.state = LinkState::Disconnected;
            return;
        };
        match timeout(OP_TIMEOUT, self.transport.load_media(session, url, content_type)).await {
            Ok(Ok(session)) => {
                inner.session = Some(session);
                debug!(url, "cast load issued");
            }
            Ok(Err(err)) => {
                inner.state = LinkState::Disconnected;
                warn!(error = %err, "cast load failed; dropping session");
            }
            Err(_) => {
                inner.state = LinkState::Disconnected;
                warn!("cast load timed out; dropping session");
            }
        }
    }

    /// Release any held session, e.g. on process shutdown.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner.session.take() {
            let _ = timeout(OP_TIMEOUT, self.transport.disconnect(session)).await;
        }
        inner.state = LinkState::Disconnected;
    }
}
