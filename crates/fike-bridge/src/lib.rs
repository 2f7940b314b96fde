#![warn(missing_docs)]
//! # fike-bridge
//!
//! ## Purpose
//! Relays service events and RPC completions to the host application layer,
//! whether or not that layer is currently attached.
//!
//! ## Responsibilities
//! - Queue outgoing messages in production order.
//! - Retry delivery on a fixed interval up to a capped attempt count, then
//!   drop with a warning.
//! - Hold at most one outstanding RPC per request kind.
//!
//! ## Data flow
//! Service actor -> [`EventBridge::publish`] / [`EventBridge::complete_rpc`] ->
//! lock-protected queue -> delivery thread -> [`HostLink::deliver`].
//!
//! ## Ownership and lifetimes
//! The queue is the only structure shared between threads; producers and the
//! delivery thread hand messages off under one mutex and condition variable.
//! Messages are owned values; the delivery thread never borrows producer data.
//!
//! ## Error model
//! Delivery failures are retried, never surfaced to producers. Synchronous
//! rejections (`AlreadyPending`, publishing after shutdown) are
//! [`BridgeError`] values.
//!
//! ## Security and privacy notes
//! Payloads are logged by name only.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use fike_core::{FailureKind, HostEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Retry schedule for host delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Attempts per message, including the first.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub retry_interval: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            retry_interval: Duration::from_millis(200),
        }
    }
}

/// Host-initiated request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcKind {
    /// `start(resultToken)`.
    Start,
    /// `stop(resultToken)`.
    Stop,
}

/// Resolution of a host request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RpcOutcome {
    /// Request succeeded.
    Resolved {
        /// Result value.
        value: Value,
    },
    /// Request failed.
    Rejected {
        /// Taxonomy kind.
        kind: FailureKind,
        /// Human-readable detail.
        message: String,
    },
}

/// Message delivered to the host layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    /// Fire-and-forget named event.
    Event {
        /// Event name.
        name: String,
        /// Event payload.
        payload: Value,
    },
    /// Completion of a host request.
    RpcCompletion {
        /// Request kind.
        request: RpcKind,
        /// Token the host attached to the request.
        result_token: String,
        /// Resolution.
        outcome: RpcOutcome,
    },
}

impl BridgeMessage {
    /// Builds an event message.
    ///
    /// # Errors
    /// Returns [`BridgeError::Codec`] when the payload cannot be serialized.
    pub fn from_event(event: &HostEvent) -> Result<Self, BridgeError> {
        let payload = event
            .payload()
            .map_err(|error| BridgeError::Codec(error.to_string()))?;
        Ok(Self::Event {
            name: event.name().to_string(),
            payload,
        })
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        match self {
            Self::Event { name, .. } => name,
            Self::RpcCompletion {
                request: RpcKind::Start,
                ..
            } => "rpc.start",
            Self::RpcCompletion {
                request: RpcKind::Stop,
                ..
            } => "rpc.stop",
        }
    }

    /// Serializes the message as one JSON document.
    ///
    /// # Errors
    /// Returns [`BridgeError::Codec`] on serialization failure.
    pub fn to_json(&self) -> Result<String, BridgeError> {
        serde_json::to_string(self).map_err(|error| BridgeError::Codec(error.to_string()))
    }
}

/// Queued message awaiting delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    /// Message to deliver.
    pub message: BridgeMessage,
    /// Attempts made so far.
    pub attempt: u32,
    /// Earliest time of the next attempt.
    pub next_retry_at: Instant,
}

/// Host side of the bridge.
pub trait HostLink: Send + Sync {
    /// Hands one message to the host layer.
    ///
    /// # Errors
    /// Returns [`DeliveryError`] when the host cannot accept it right now.
    fn deliver(&self, message: &BridgeMessage) -> Result<(), DeliveryError>;
}

/// Reason a delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// No host layer is attached.
    #[error("host layer is not attached")]
    Detached,
    /// Host layer refused the message.
    #[error("host layer rejected message: {0}")]
    Rejected(String),
}

/// Host link writing one JSON document per line, e.g. to a pipe.
pub struct JsonLinesHostLink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesHostLink<W> {
    /// Wraps `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> HostLink for JsonLinesHostLink<W> {
    fn deliver(&self, message: &BridgeMessage) -> Result<(), DeliveryError> {
        let line = message
            .to_json()
            .map_err(|error| DeliveryError::Rejected(error.to_string()))?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}")
            .and_then(|()| writer.flush())
            .map_err(|_| DeliveryError::Detached)
    }
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Messages accepted by the host.
    pub delivered: u64,
    /// Messages dropped after the attempt ceiling or at shutdown.
    pub dropped: u64,
    /// Delivery attempts made.
    pub attempts: u64,
}

#[derive(Default)]
struct Queue {
    pending: VecDeque<PendingEvent>,
    in_flight: bool,
    shutdown: bool,
    stats: BridgeStats,
}

struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ordered, bounded-retry channel to the host layer.
pub struct EventBridge {
    shared: Arc<Shared>,
    rpc_slots: Mutex<HashMap<RpcKind, String>>,
    worker: Option<JoinHandle<()>>,
    policy: DeliveryPolicy,
}

impl EventBridge {
    /// Starts the delivery thread.
    ///
    /// # Errors
    /// Returns [`BridgeError::Spawn`] when the thread cannot be started.
    pub fn spawn(link: Arc<dyn HostLink>, policy: DeliveryPolicy) -> Result<Self, BridgeError> {
        let policy = DeliveryPolicy {
            max_attempts: policy.max_attempts.max(1),
            ..policy
        };
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            wake: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("fike-bridge-delivery".to_string())
            .spawn(move || delivery_loop(&worker_shared, link.as_ref(), policy))
            .map_err(|error| BridgeError::Spawn(error.to_string()))?;

        Ok(Self {
            shared,
            rpc_slots: Mutex::new(HashMap::new()),
            worker: Some(worker),
            policy,
        })
    }

    /// Effective delivery policy.
    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Queues a host event behind everything published before it.
    ///
    /// # Errors
    /// Returns [`BridgeError::Codec`] or [`BridgeError::Closed`].
    pub fn publish(&self, event: &HostEvent) -> Result<(), BridgeError> {
        self.enqueue(BridgeMessage::from_event(event)?)
    }

    /// Registers a host request; at most one per kind may be outstanding.
    ///
    /// # Errors
    /// Returns [`BridgeError::AlreadyPending`] without touching the existing
    /// slot.
    pub fn begin_rpc(
        &self,
        kind: RpcKind,
        result_token: impl Into<String>,
    ) -> Result<(), BridgeError> {
        let mut slots = self.rpc_slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.contains_key(&kind) {
            debug!(request = ?kind, "host request rejected: already pending");
            return Err(BridgeError::AlreadyPending(kind));
        }
        slots.insert(kind, result_token.into());
        Ok(())
    }

    /// Returns `true` while a request of `kind` is outstanding.
    pub fn rpc_pending(&self, kind: RpcKind) -> bool {
        self.rpc_slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&kind)
    }

    /// Resolves the outstanding request of `kind`, if any, and queues its
    /// completion. Returns `false` when nothing was outstanding.
    ///
    /// # Errors
    /// Returns [`BridgeError::Closed`] after shutdown; the slot is freed anyway.
    pub fn complete_rpc(&self, kind: RpcKind, outcome: RpcOutcome) -> Result<bool, BridgeError> {
        let token = self
            .rpc_slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind);
        let Some(result_token) = token else {
            return Ok(false);
        };

        self.enqueue(BridgeMessage::RpcCompletion {
            request: kind,
            result_token,
            outcome,
        })?;
        Ok(true)
    }

    /// Host layer (re)attached: retry queued messages now.
    pub fn host_attached(&self) {
        let mut queue = self.shared.lock();
        let now = Instant::now();
        for pending in queue.pending.iter_mut() {
            pending.next_retry_at = now;
        }
        drop(queue);
        self.shared.wake.notify_all();
        debug!("host attached; retrying queued messages");
    }

    /// Messages currently queued.
    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Delivery counters.
    pub fn stats(&self) -> BridgeStats {
        self.shared.lock().stats
    }

    /// Waits until the queue is drained. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let queue = self.shared.lock();
        let (queue, _) = self
            .shared
            .wake
            .wait_timeout_while(queue, timeout, |queue| {
                !queue.pending.is_empty() || queue.in_flight
            })
            .unwrap_or_else(PoisonError::into_inner);
        queue.pending.is_empty() && !queue.in_flight
    }

    /// Stops the delivery thread, dropping undelivered messages with a warning.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.shared.lock().shutdown = true;
        self.shared.wake.notify_all();
        if worker.join().is_err() {
            warn!("bridge delivery thread panicked");
        }
        info!(stats = ?self.stats(), "event bridge stopped");
    }

    fn enqueue(&self, message: BridgeMessage) -> Result<(), BridgeError> {
        let mut queue = self.shared.lock();
        if queue.shutdown {
            return Err(BridgeError::Closed);
        }
        debug!(message = message.name(), queued = queue.pending.len(), "message queued");
        queue.pending.push_back(PendingEvent {
            message,
            attempt: 0,
            next_retry_at: Instant::now(),
        });
        drop(queue);
        self.shared.wake.notify_all();
        Ok(())
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn delivery_loop(shared: &Shared, link: &dyn HostLink, policy: DeliveryPolicy) {
    loop {
        let Some(mut head) = next_due(shared) else {
            return;
        };

        head.attempt += 1;
        let result = link.deliver(&head.message);

        let mut queue = shared.lock();
        queue.in_flight = false;
        queue.stats.attempts += 1;
        match result {
            Ok(()) => {
                queue.stats.delivered += 1;
                debug!(message = head.message.name(), attempt = head.attempt, "message delivered");
            }
            Err(error) if head.attempt >= policy.max_attempts => {
                queue.stats.dropped += 1;
                warn!(
                    message = head.message.name(),
                    attempts = head.attempt,
                    error = %error,
                    kind = %FailureKind::BridgeDeliveryFailure,
                    "dropping undeliverable message"
                );
            }
            Err(error) => {
                debug!(
                    message = head.message.name(),
                    attempt = head.attempt,
                    error = %error,
                    "delivery failed; will retry"
                );
                head.next_retry_at = Instant::now() + policy.retry_interval;
                queue.pending.push_front(head);
            }
        }
        drop(queue);
        shared.wake.notify_all();
    }
}

/// Blocks until the head message is due. Returns `None` on shutdown after
/// dropping whatever is still queued.
fn next_due(shared: &Shared) -> Option<PendingEvent> {
    let mut queue = shared.lock();
    loop {
        if queue.shutdown {
            let remaining = queue.pending.len();
            if remaining > 0 {
                queue.stats.dropped += remaining as u64;
                queue.pending.clear();
                warn!(remaining, "bridge shut down with undelivered messages");
            }
            return None;
        }

        let now = Instant::now();
        let wait = match queue.pending.front().map(|head| head.next_retry_at) {
            None => None,
            Some(due) if due <= now => {
                let head = queue.pending.pop_front()?;
                queue.in_flight = true;
                return Some(head);
            }
            Some(due) => Some(due - now),
        };

        queue = match wait {
            None => shared.wake.wait(queue).unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                shared
                    .wake
                    .wait_timeout(queue, timeout)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
    }
}

/// Bridge error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// A host request of the same kind is outstanding.
    #[error("a {0:?} request is already pending")]
    AlreadyPending(RpcKind),
    /// Payload could not be serialized.
    #[error("bridge codec failure: {0}")]
    Codec(String),
    /// Delivery thread could not be started.
    #[error("failed to spawn bridge delivery thread: {0}")]
    Spawn(String),
    /// Bridge already shut down.
    #[error("event bridge is closed")]
    Closed,
}

impl BridgeError {
    /// Maps the error onto the shared failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::AlreadyPending(_) => FailureKind::AlreadyPending,
            _ => FailureKind::BridgeDeliveryFailure,
        }
    }
}
