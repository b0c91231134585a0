//! Socket adapters: connections with cascading dependents.
//!
//! A connection is the one multi-entry relationship in the registry: its
//! heartbeat interval, any pending reconnect timer, and every subscription
//! are cascade children holding the connection's id. Canceling the
//! connection tears the children down first, then closes the transport with
//! the normal closure code — so a subscription callback never fires after
//! its connection has begun closing.
//!
//! The transport itself is host-supplied: the registry consumes an
//! open/close/send surface and never owns reconnection policy beyond the
//! timer it tracks on the host's behalf.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::cancel::CancelError;
use crate::handle::{HandleMetrics, ResourceKind};
use crate::id::epoch_millis;
use crate::registry::RegistryError;
use crate::scope::LifecycleScope;

/// Closure code passed to the transport on graceful close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseCode {
    /// Normal closure.
    Normal,
    /// The endpoint is going away (scope teardown on host exit).
    GoingAway,
    /// Closing because of an unrecoverable error.
    Error,
}

impl CloseCode {
    /// The wire value (WebSocket close-code numbering).
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::Error => 1011,
        }
    }
}

/// Socket transport errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SocketError {
    /// The transport failed to close.
    #[error("socket close failed: {reason}")]
    CloseFailed {
        /// Transport-supplied reason.
        reason: String,
    },

    /// The transport failed to send.
    #[error("socket send failed: {reason}")]
    SendFailed {
        /// Transport-supplied reason.
        reason: String,
    },
}

/// Host-supplied socket primitive.
pub trait SocketTransport: Send + Sync + 'static {
    /// Diagnostic name for error attribution.
    fn name(&self) -> &str;

    /// Sends a payload (heartbeats use this).
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::SendFailed`] when the transport cannot send.
    fn send(&self, payload: &[u8]) -> Result<(), SocketError>;

    /// Gracefully closes the connection.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::CloseFailed`] when the transport cannot close.
    fn close(&self, code: CloseCode) -> Result<(), SocketError>;
}

/// Heartbeat settings for a connection.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between heartbeat sends.
    pub interval: Duration,
    /// Payload sent on each beat.
    pub payload: Vec<u8>,
}

impl HeartbeatConfig {
    /// A heartbeat with the conventional `ping` payload.
    #[must_use]
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            payload: b"ping".to_vec(),
        }
    }
}

/// Options for opening a tracked connection.
#[derive(Debug, Clone, Default)]
pub struct SocketOptions {
    /// Diagnostic label on the connection entry.
    pub description: Option<String>,
    /// Heartbeat tracked as a cascade child, if any.
    pub heartbeat: Option<HeartbeatConfig>,
}

impl SocketOptions {
    /// Options carrying the configured socket defaults.
    #[must_use]
    pub fn from_config(config: &crate::config::TetherConfig) -> Self {
        Self {
            description: None,
            heartbeat: config.heartbeat(),
        }
    }
}

/// Callback invoked per delivered subscription message.
pub type SubscriptionCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

struct Subscription {
    topic: String,
    gate: CancellationToken,
    callback: SubscriptionCallback,
    metrics: Arc<HandleMetrics>,
}

/// A live tracked connection.
///
/// The host's receive loop hands inbound messages to [`dispatch`]; the
/// session routes them to live subscriptions. Once the connection (or an
/// individual subscription) is canceled, its callback is never invoked
/// again.
///
/// [`dispatch`]: SocketSession::dispatch
pub struct SocketSession {
    id: String,
    transport: Arc<dyn SocketTransport>,
    metrics: Arc<HandleMetrics>,
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

impl SocketSession {
    /// The connection's resource id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Routes one inbound message to subscriptions on `topic`.
    ///
    /// Returns the number of callbacks invoked. Canceled subscriptions are
    /// skipped even if a racing teardown has not yet removed them.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> usize {
        let routes: Vec<(CancellationToken, SubscriptionCallback, Arc<HandleMetrics>)> = {
            let subscriptions = self.lock();
            subscriptions
                .values()
                .filter(|sub| sub.topic == topic)
                .map(|sub| {
                    (
                        sub.gate.clone(),
                        Arc::clone(&sub.callback),
                        Arc::clone(&sub.metrics),
                    )
                })
                .collect()
        };

        let bytes = payload.len() as u64;
        let mut delivered = 0;
        for (gate, callback, metrics) in routes {
            if gate.is_cancelled() {
                continue;
            }
            metrics.record_trigger(epoch_millis());
            metrics.add_bytes(bytes);
            callback(payload);
            delivered += 1;
        }
        if delivered > 0 {
            self.metrics.add_bytes(bytes);
        }
        delivered
    }

    /// Live subscription count.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.lock().len()
    }

    fn insert_subscription(&self, sub_id: String, subscription: Subscription) {
        self.lock().insert(sub_id, subscription);
    }

    fn remove_subscription(&self, sub_id: &str) {
        self.lock().remove(sub_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Subscription>> {
        match self.subscriptions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for SocketSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketSession")
            .field("id", &self.id)
            .field("transport", &self.transport.name())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

impl LifecycleScope {
    /// Opens a tracked connection over a host transport.
    ///
    /// The connection's teardown closes the transport with
    /// [`CloseCode::Normal`]; its heartbeat (when configured) is registered
    /// as a cascade child and dies with it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ScopeClosed`] after shutdown.
    pub fn open_socket(
        &self,
        transport: Arc<dyn SocketTransport>,
        options: SocketOptions,
    ) -> Result<Arc<SocketSession>, RegistryError> {
        self.ensure_open()?;
        let id = self.next_id(ResourceKind::SocketConnection);
        let metrics = Arc::new(HandleMetrics::new());

        let session = Arc::new(SocketSession {
            id: id.clone(),
            transport: Arc::clone(&transport),
            metrics: Arc::clone(&metrics),
            subscriptions: Mutex::new(HashMap::new()),
        });

        let description = options
            .description
            .unwrap_or_else(|| transport.name().to_string());
        let close_transport = Arc::clone(&transport);
        self.track(
            ResourceKind::SocketConnection,
            id.clone(),
            Box::new(move || {
                close_transport
                    .close(CloseCode::Normal)
                    .map_err(CancelError::from)
            }),
            Some(description),
            None,
            Arc::clone(&metrics),
        )?;

        if let Some(heartbeat) = options.heartbeat {
            let beat_transport = Arc::clone(&transport);
            let beat_metrics = Arc::clone(&metrics);
            let payload = heartbeat.payload;
            let started = self.interval_resource(
                heartbeat.interval,
                Some("heartbeat".to_string()),
                Some(id.clone()),
                move || match beat_transport.send(&payload) {
                    Ok(()) => beat_metrics.add_bytes(payload.len() as u64),
                    Err(error) => {
                        beat_metrics.record_error();
                        tracing::warn!(
                            transport = %beat_transport.name(),
                            error = %error,
                            "heartbeat send failed"
                        );
                    }
                },
            );
            if let Err(error) = started {
                // The scope closed mid-registration; cancel the connection
                // entry so the transport is closed rather than half-tracked.
                self.cancel(&id);
                return Err(error);
            }
        }

        Ok(session)
    }

    /// Subscribes to a topic on a tracked connection.
    ///
    /// The subscription is a cascade child of the connection: canceling the
    /// connection removes it in the same operation, and its callback never
    /// fires afterwards.
    ///
    /// # Errors
    ///
    /// [`RegistryError::ParentNotFound`] when the connection is no longer
    /// live, [`RegistryError::ScopeClosed`] after shutdown.
    pub fn subscribe<F>(
        &self,
        session: &Arc<SocketSession>,
        topic: &str,
        callback: F,
    ) -> Result<String, RegistryError>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.ensure_open()?;
        if !self.registry().contains(session.id()) {
            return Err(RegistryError::ParentNotFound {
                id: session.id().to_string(),
            });
        }

        let sub_id = self.next_id(ResourceKind::SocketSubscription);
        let gate = CancellationToken::new();
        let metrics = Arc::new(HandleMetrics::new());

        session.insert_subscription(
            sub_id.clone(),
            Subscription {
                topic: topic.to_string(),
                gate: gate.clone(),
                callback: Arc::new(callback),
                metrics: Arc::clone(&metrics),
            },
        );

        let cancel_session = Arc::clone(session);
        let cancel_sub_id = sub_id.clone();
        let cancel_gate = gate.clone();
        let tracked = self.track(
            ResourceKind::SocketSubscription,
            sub_id.clone(),
            Box::new(move || {
                cancel_gate.cancel();
                cancel_session.remove_subscription(&cancel_sub_id);
                Ok(())
            }),
            Some(topic.to_string()),
            Some(session.id().to_string()),
            metrics,
        );
        if let Err(error) = tracked {
            // The scope closed between the open check and the insert; back
            // the subscription out of the session table before failing.
            gate.cancel();
            session.remove_subscription(&sub_id);
            return Err(error);
        }
        Ok(sub_id)
    }

    /// Schedules a reconnect attempt as a cascade child of the connection.
    ///
    /// The pending timer dies with the connection: canceling the connection
    /// before the delay elapses suppresses `reconnect` entirely.
    ///
    /// # Errors
    ///
    /// [`RegistryError::ParentNotFound`] when the connection is no longer
    /// live, [`RegistryError::ScopeClosed`] after shutdown.
    pub fn schedule_reconnect<F>(
        &self,
        session: &Arc<SocketSession>,
        delay: Duration,
        reconnect: F,
    ) -> Result<String, RegistryError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_open()?;
        if !self.registry().contains(session.id()) {
            return Err(RegistryError::ParentNotFound {
                id: session.id().to_string(),
            });
        }
        self.timeout_resource(
            delay,
            Some("reconnect".to_string()),
            Some(session.id().to_string()),
            reconnect,
        )
    }
}
