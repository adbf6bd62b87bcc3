//! CAD event bus: decoupled observation of tool activity.
//!
//! Producers (the adapter layer, tool wrappers) call [`EventBus::emit`];
//! consumers subscribe per [`EventKind`] or with the [`EventFilter::Any`]
//! wildcard. Every emission lands in a bounded history ring immediately and
//! is dispatched to handlers by a single background task, one event at a
//! time, so handlers observe emission order.

use crate::canonical::Payload;
use crate::error::EventError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Default number of events retained in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Default idle poll interval of the dispatcher.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

// ── Event kinds ───────────────────────────────────────────────────────────

/// Everything the CAD tool can report, plus an open-ended escape hatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    // Document
    ModelOpened,
    ModelClosed,
    ModelSaved,
    ModelActivated,
    FileSaved,
    // Features
    FeatureAdded,
    FeatureDeleted,
    FeatureModified,
    FeatureSuppressed,
    FeatureUnsuppressed,
    DimensionChanged,
    // Rebuild
    RebuildStarted,
    RebuildCompleted,
    RebuildFailed,
    // Configurations
    ConfigurationActivated,
    ConfigurationAdded,
    ConfigurationDeleted,
    DesignTableUpdated,
    // Interaction
    SelectionChanged,
    ViewRotated,
    ViewZoomed,
    ViewPanned,
    // Macros
    MacroStarted,
    MacroCompleted,
    MacroFailed,
    /// A generic failure report.
    Error,
    /// Any event name not listed above.
    Custom(String),
}

impl EventKind {
    /// The wire name of this kind (`snake_case`).
    pub fn as_str(&self) -> &str {
        match self {
            Self::ModelOpened => "model_opened",
            Self::ModelClosed => "model_closed",
            Self::ModelSaved => "model_saved",
            Self::ModelActivated => "model_activated",
            Self::FileSaved => "file_saved",
            Self::FeatureAdded => "feature_added",
            Self::FeatureDeleted => "feature_deleted",
            Self::FeatureModified => "feature_modified",
            Self::FeatureSuppressed => "feature_suppressed",
            Self::FeatureUnsuppressed => "feature_unsuppressed",
            Self::DimensionChanged => "dimension_changed",
            Self::RebuildStarted => "rebuild_started",
            Self::RebuildCompleted => "rebuild_completed",
            Self::RebuildFailed => "rebuild_failed",
            Self::ConfigurationActivated => "configuration_activated",
            Self::ConfigurationAdded => "configuration_added",
            Self::ConfigurationDeleted => "configuration_deleted",
            Self::DesignTableUpdated => "design_table_updated",
            Self::SelectionChanged => "selection_changed",
            Self::ViewRotated => "view_rotated",
            Self::ViewZoomed => "view_zoomed",
            Self::ViewPanned => "view_panned",
            Self::MacroStarted => "macro_started",
            Self::MacroCompleted => "macro_completed",
            Self::MacroFailed => "macro_failed",
            Self::Error => "error",
            Self::Custom(name) => name,
        }
    }

    /// Parse a wire name. Unknown names become [`EventKind::Custom`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "model_opened" => Self::ModelOpened,
            "model_closed" => Self::ModelClosed,
            "model_saved" => Self::ModelSaved,
            "model_activated" => Self::ModelActivated,
            "file_saved" => Self::FileSaved,
            "feature_added" => Self::FeatureAdded,
            "feature_deleted" => Self::FeatureDeleted,
            "feature_modified" => Self::FeatureModified,
            "feature_suppressed" => Self::FeatureSuppressed,
            "feature_unsuppressed" => Self::FeatureUnsuppressed,
            "dimension_changed" => Self::DimensionChanged,
            "rebuild_started" => Self::RebuildStarted,
            "rebuild_completed" => Self::RebuildCompleted,
            "rebuild_failed" => Self::RebuildFailed,
            "configuration_activated" => Self::ConfigurationActivated,
            "configuration_added" => Self::ConfigurationAdded,
            "configuration_deleted" => Self::ConfigurationDeleted,
            "design_table_updated" => Self::DesignTableUpdated,
            "selection_changed" => Self::SelectionChanged,
            "view_rotated" => Self::ViewRotated,
            "view_zoomed" => Self::ViewZoomed,
            "view_panned" => Self::ViewPanned,
            "macro_started" => Self::MacroStarted,
            "macro_completed" => Self::MacroCompleted,
            "macro_failed" => Self::MacroFailed,
            "error" => Self::Error,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Whether this kind reports a failure worth looking up solutions for.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error | Self::RebuildFailed | Self::MacroFailed)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

// ── Events ────────────────────────────────────────────────────────────────

/// An immutable record of something that happened in the CAD tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique per emission: kind, emission time and bus sequence number.
    pub id: String,

    #[serde(rename = "type")]
    pub kind: EventKind,

    #[serde(default)]
    pub data: Payload,

    pub timestamp: DateTime<Utc>,
}

impl Event {
    fn new(kind: EventKind, data: Payload, sequence: u64) -> Self {
        let timestamp = Utc::now();
        let id = format!("{}_{}_{}", kind, timestamp.timestamp_micros(), sequence);
        Self {
            id,
            kind,
            data,
            timestamp,
        }
    }
}

/// Which events a handler is registered for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventFilter {
    Kind(EventKind),
    /// The `*` wildcard: every event, after the kind-specific handlers.
    Any,
}

impl From<EventKind> for EventFilter {
    fn from(kind: EventKind) -> Self {
        Self::Kind(kind)
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A callback invoked by the dispatcher for every matching event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Arc<Event>) -> Result<(), EventError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> Result<(), EventError> + Send + Sync,
{
    async fn handle(&self, event: Arc<Event>) -> Result<(), EventError> {
        (self.0)(&event)
    }
}

/// Wrap a synchronous closure as an [`EventHandler`].
pub fn handler_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&Event) -> Result<(), EventError> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Aggregate view over the current history, computed on demand.
#[derive(Debug, Clone, Default)]
pub struct EventStatistics {
    pub total_events: usize,
    /// Count per event kind name.
    pub event_types: BTreeMap<String, usize>,
    /// Rate between the oldest and newest retained events; 0 when they coincide.
    pub events_per_minute: f64,
    pub most_recent_event: Option<Arc<Event>>,
}

// ── Bus ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Registration {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
}

struct Inner {
    capacity: usize,
    poll_interval: Duration,
    history: Mutex<VecDeque<Arc<Event>>>,
    handlers: RwLock<HashMap<EventFilter, Vec<Registration>>>,
    queue_tx: mpsc::UnboundedSender<Arc<Event>>,
    queue_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Arc<Event>>>,
    running: AtomicBool,
    wake: Notify,
    next_subscription: AtomicU64,
    sequence: AtomicU64,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// In-process publish/subscribe bus with bounded history.
///
/// Cloning is cheap and yields another handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Create a bus retaining at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self::with_poll_interval(capacity, DEFAULT_POLL_INTERVAL)
    }

    /// Create a bus whose idle dispatcher re-checks its running flag every `poll_interval`.
    pub fn with_poll_interval(capacity: usize, poll_interval: Duration) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                capacity,
                poll_interval,
                history: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
                handlers: RwLock::new(HashMap::new()),
                queue_tx,
                queue_rx: tokio::sync::Mutex::new(queue_rx),
                running: AtomicBool::new(false),
                wake: Notify::new(),
                next_subscription: AtomicU64::new(1),
                sequence: AtomicU64::new(0),
                dispatcher: Mutex::new(None),
            }),
        }
    }

    /// Maximum number of events kept in history.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Spawn the dispatcher task. Must be called from within a Tokio runtime.
    /// Calling it on a running bus does nothing.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(inner.dispatch_loop());
        *lock(&self.inner.dispatcher) = Some(handle);
        info!(capacity = self.inner.capacity, "Event bus started");
    }

    /// Stop the dispatcher and wait for it to exit.
    ///
    /// Events still queued are not guaranteed to be delivered; they remain in history.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.wake.notify_one();
        let handle = lock(&self.inner.dispatcher).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Event dispatcher terminated abnormally");
            }
        }
        info!("Event bus stopped");
    }

    /// Stop the dispatcher and drop every registered handler.
    pub async fn shutdown(&self) {
        self.stop().await;
        write(&self.inner.handlers).clear();
    }

    /// Record an event and queue it for dispatch. Never waits on handlers.
    pub fn emit(&self, kind: impl Into<EventKind>, data: Payload) -> Arc<Event> {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
        let event = Arc::new(Event::new(kind.into(), data, sequence));
        {
            let mut history = lock(&self.inner.history);
            if history.len() >= self.inner.capacity {
                history.pop_front();
            }
            history.push_back(Arc::clone(&event));
            // Enqueue under the history lock so queue order matches history order.
            // The receiver lives inside `Inner`, so this cannot fail while `self` exists.
            let _ = self.inner.queue_tx.send(Arc::clone(&event));
        }
        debug!(kind = %event.kind, id = %event.id, "Event emitted");
        event
    }

    /// Register a handler. Handlers for the same filter run in registration order.
    pub fn subscribe(
        &self,
        filter: impl Into<EventFilter>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        let filter = filter.into();
        debug!(?filter, subscription = id.0, "Registered event handler");
        write(&self.inner.handlers)
            .entry(filter)
            .or_default()
            .push(Registration { id, handler });
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, filter: &EventFilter, id: SubscriptionId) -> bool {
        let mut handlers = write(&self.inner.handlers);
        let Some(registrations) = handlers.get_mut(filter) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        let removed = registrations.len() < before;
        if registrations.is_empty() {
            handlers.remove(filter);
        }
        removed
    }

    /// Number of handlers currently registered for `filter`.
    pub fn handler_count(&self, filter: &EventFilter) -> usize {
        read(&self.inner.handlers).get(filter).map_or(0, Vec::len)
    }

    /// The most recent `limit` events, optionally of one kind, oldest first.
    pub fn history(&self, kind: Option<&EventKind>, limit: usize) -> Vec<Arc<Event>> {
        let history = lock(&self.inner.history);
        let matching: Vec<Arc<Event>> = history
            .iter()
            .filter(|e| kind.is_none_or(|k| &e.kind == k))
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).collect()
    }

    /// The newest event in history satisfying `predicate`.
    pub fn latest_matching(&self, predicate: impl Fn(&Event) -> bool) -> Option<Arc<Event>> {
        lock(&self.inner.history)
            .iter()
            .rev()
            .find(|e| predicate(e))
            .cloned()
    }

    pub fn statistics(&self) -> EventStatistics {
        let history = lock(&self.inner.history);
        let mut stats = EventStatistics {
            total_events: history.len(),
            ..EventStatistics::default()
        };

        for event in history.iter() {
            *stats
                .event_types
                .entry(event.kind.as_str().to_string())
                .or_insert(0) += 1;
        }

        if let (Some(oldest), Some(newest)) = (history.front(), history.back()) {
            let span = newest.timestamp - oldest.timestamp;
            let minutes = span.num_milliseconds() as f64 / 60_000.0;
            if minutes > 0.0 {
                stats.events_per_minute = history.len() as f64 / minutes;
            }
            stats.most_recent_event = Some(Arc::clone(newest));
        }

        stats
    }

    /// Wait for the next event of `kind`, or `None` once `timeout` elapses.
    pub async fn wait_for(&self, kind: EventKind, timeout: Option<Duration>) -> Option<Arc<Event>> {
        self.wait_for_matching(kind, timeout, |_| true).await
    }

    /// Wait for the next event of `kind` accepted by `predicate`.
    ///
    /// Only events emitted after the call are considered. The transient
    /// subscription is removed on every exit path, including when the
    /// returned future is dropped early.
    pub async fn wait_for_matching<P>(
        &self,
        kind: EventKind,
        timeout: Option<Duration>,
        predicate: P,
    ) -> Option<Arc<Event>>
    where
        P: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let waiter = Arc::new(Waiter {
            kind: kind.clone(),
            predicate,
            tx: Mutex::new(Some(tx)),
        });
        let filter = EventFilter::Kind(kind);
        let id = self.subscribe(filter.clone(), waiter);
        let _guard = SubscriptionGuard {
            bus: self,
            filter,
            id,
        };

        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx).await.ok().and_then(Result::ok),
            None => rx.await.ok(),
        };
        if outcome.is_none() {
            debug!(subscription = id.0, "wait_for finished without a matching event");
        }
        outcome
    }

    /// Write the current history to `path` as a JSON array. Returns the number of events written.
    pub fn export_history(&self, path: &Path) -> Result<usize, EventError> {
        let events: Vec<Event> = lock(&self.inner.history)
            .iter()
            .map(|e| e.as_ref().clone())
            .collect();
        let export_err = |reason: String| EventError::Export {
            path: path.to_path_buf(),
            reason,
        };
        let json = serde_json::to_string_pretty(&events).map_err(|e| export_err(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| export_err(e.to_string()))?;
        }
        std::fs::write(path, json).map_err(|e| export_err(e.to_string()))?;
        info!(count = events.len(), path = %path.display(), "Exported event history");
        Ok(events.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl Inner {
    async fn dispatch_loop(self: Arc<Self>) {
        let mut queue = self.queue_rx.lock().await;
        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = self.wake.notified() => continue,
                next = tokio::time::timeout(self.poll_interval, queue.recv()) => match next {
                    Ok(Some(event)) => self.dispatch(event).await,
                    Ok(None) => break,
                    Err(_) => continue,
                },
            }
        }
        debug!("Event dispatcher exited");
    }

    async fn dispatch(&self, event: Arc<Event>) {
        let (specific, wildcard) = {
            let handlers = read(&self.handlers);
            let specific = handlers
                .get(&EventFilter::Kind(event.kind.clone()))
                .cloned()
                .unwrap_or_default();
            let wildcard = handlers.get(&EventFilter::Any).cloned().unwrap_or_default();
            (specific, wildcard)
        };

        for registration in specific.iter().chain(wildcard.iter()) {
            let call = registration.handler.handle(Arc::clone(&event));
            match AssertUnwindSafe(call).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(
                    kind = %event.kind,
                    subscription = registration.id.0,
                    error = %e,
                    "Event handler failed"
                ),
                Err(_) => error!(
                    kind = %event.kind,
                    subscription = registration.id.0,
                    "Event handler panicked"
                ),
            }
        }
    }
}

struct Waiter<P> {
    kind: EventKind,
    predicate: P,
    tx: Mutex<Option<oneshot::Sender<Arc<Event>>>>,
}

#[async_trait]
impl<P> EventHandler for Waiter<P>
where
    P: Fn(&Event) -> bool + Send + Sync,
{
    async fn handle(&self, event: Arc<Event>) -> Result<(), EventError> {
        if event.kind == self.kind && (self.predicate)(&event) {
            if let Some(tx) = lock(&self.tx).take() {
                let _ = tx.send(event);
            }
        }
        Ok(())
    }
}

struct SubscriptionGuard<'a> {
    bus: &'a EventBus,
    filter: EventFilter,
    id: SubscriptionId,
}

impl Drop for SubscriptionGuard<'_> {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.filter, self.id);
    }
}

// A handler that panicked while holding one of these locks must not take
// the whole bus down with it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
