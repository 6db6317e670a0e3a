//! StreamController: the composition root of the event-stream engine
//!
//! The controller owns the connection status, the retry counter and the two
//! background tasks of a running stream (the read loop in the
//! `supervisor` module and the watchdog in the `guardian` module). Both tasks
//! report failures through a shared `connection_lost` entry point, which
//! schedules a reconnect.
//!
//! # Epochs
//!
//! Every `start` and every halt bumps a generation counter. Tasks carry the
//! epoch they were started under and stop acting as soon as it is no longer
//! current, so a task that lost a race with `stop`, `reconnect` or
//! `disconnect` can never resurrect the connection. The first detector to
//! report a failure for an epoch claims the reconnect; later reports for the
//! same epoch are ignored.
//!
//! # Example
//!
//! ```rust,no_run
//! use isy_stream::{StreamConfig, StreamController, Topic};
//!
//! # async fn example() -> isy_stream::Result<()> {
//! let config = StreamConfig::for_host("192.168.1.20", false).with_credentials("admin", "admin");
//! let controller = StreamController::new(config)?;
//!
//! controller.subscribe_status(|status| println!("stream is {status}"));
//! controller.subscribe(Topic::NodeStatus, |event| {
//!     println!("{:?} -> {:?}", event.node, event.action);
//! });
//!
//! controller.start(0);
//! # controller.disconnect().await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::backoff::BackoffPolicy;
use crate::builder::StreamControllerBuilder;
use crate::classifier::{classify, route, Route};
use crate::config::StreamConfig;
use crate::emitter::{EventEmitter, SubscriptionHandle};
use crate::envelope::EventEnvelope;
use crate::error::Result;
use crate::session::StreamSession;
use crate::transport::{ConnectRequest, Connector};
use crate::types::{ConnectionState, RetryState, RoutedEvent, Topic};
use crate::{guardian, supervisor};

/// Error type returned by a [`ProgramRefresh`] hook
pub type RefreshError = Box<dyn std::error::Error + Send + Sync>;

/// Reloads the program list when the device reports that programs changed
///
/// The stream engine does not own program state; it only tells whoever does
/// that a reload is due. Failures are logged and otherwise ignored.
#[async_trait]
pub trait ProgramRefresh: Send + Sync {
    async fn refresh_programs(&self) -> std::result::Result<(), RefreshError>;
}

/// Connection status plus its change notifications.
///
/// Status writes and their publication happen under one reentrant gate, so
/// subscribers observe transitions in the order they were made and a
/// subscriber may call back into the controller from its handler.
pub(crate) struct StatusCell {
    state: Mutex<ConnectionState>,
    gate: ReentrantMutex<()>,
    emitter: EventEmitter<ConnectionState>,
}

impl StatusCell {
    fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::NotStarted),
            gate: ReentrantMutex::new(()),
            emitter: EventEmitter::new(),
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to `next` when `allowed` accepts the current state. Publishes and
    /// returns true only when the state actually changed.
    pub(crate) fn transition_if<P>(&self, allowed: P, next: ConnectionState) -> bool
    where
        P: FnOnce(ConnectionState) -> bool,
    {
        let _gate = self.gate.lock();
        let previous = {
            let mut state = self.state.lock();
            let current = *state;
            if current == next || !allowed(current) {
                return false;
            }
            *state = next;
            current
        };

        debug!(from = %previous, status = %next, "Event stream status changed");
        self.emitter.publish(&next);
        true
    }

    pub(crate) fn set(&self, next: ConnectionState) -> bool {
        self.transition_if(|_| true, next)
    }
}

/// Background tasks of one start generation
struct TaskSet {
    epoch: u64,
    shutdown: watch::Sender<bool>,
    read_loop: JoinHandle<()>,
    guardian: JoinHandle<()>,
}

impl TaskSet {
    fn abort(&self) {
        self.read_loop.abort();
        self.guardian.abort();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartMode {
    /// Caller asked for it; refused only while connected
    Explicit,
    /// End of a reconnect delay; refused unless still reconnecting
    Reconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconnectMode {
    Explicit,
    Scheduled,
}

/// State shared between the controller and its background tasks
pub(crate) struct StreamShared {
    pub(crate) config: StreamConfig,
    pub(crate) request: ConnectRequest,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) connector: Arc<dyn Connector>,
    program_refresh: Option<Arc<dyn ProgramRefresh>>,
    pub(crate) status: StatusCell,
    events: EventEmitter<RoutedEvent>,
    retry: Mutex<RetryState>,
    epoch: AtomicU64,
    reconnect_claim: AtomicU64,
    tasks: Mutex<Option<TaskSet>>,
    pending_reconnect: Mutex<Option<JoinHandle<()>>>,
    session: RwLock<Option<Arc<StreamSession>>>,
    stream_id: Mutex<Option<String>>,
    program_key: Mutex<Option<String>>,
}

impl StreamShared {
    pub(crate) fn status(&self) -> ConnectionState {
        self.status.get()
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    pub(crate) fn retry_attempt(&self) -> u32 {
        self.retry.lock().attempt
    }

    pub(crate) fn session(&self) -> Option<Arc<StreamSession>> {
        self.session.read().clone()
    }

    /// Session belonging to `epoch`, if it is still installed
    pub(crate) fn session_for(&self, epoch: u64) -> Option<Arc<StreamSession>> {
        self.session().filter(|session| session.epoch() == epoch)
    }

    /// Interval of the live session, or the configured default
    pub(crate) fn heartbeat_interval(&self) -> Duration {
        self.session()
            .map(|session| session.heartbeat_interval())
            .unwrap_or(self.config.heartbeat_interval)
    }

    /// Whether the read loop of `epoch` has exited
    pub(crate) fn read_loop_finished(&self, epoch: u64) -> bool {
        match self.tasks.lock().as_ref() {
            Some(tasks) if tasks.epoch == epoch => tasks.read_loop.is_finished(),
            _ => false,
        }
    }

    fn start(self: &Arc<Self>, retries: u32, mode: StartMode) -> bool {
        let accepted = self.status.transition_if(
            |current| match mode {
                StartMode::Explicit => current != ConnectionState::Connected,
                StartMode::Reconnect => current == ConnectionState::Reconnecting,
            },
            ConnectionState::Initializing,
        );
        if !accepted {
            debug!(?mode, status = %self.status(), "Start request ignored");
            return false;
        }

        let mut tasks = self.tasks.lock();
        // A status subscriber may have stopped us while Initializing was published
        if self.status() != ConnectionState::Initializing {
            return false;
        }
        if let Some(previous) = tasks.take() {
            previous.abort();
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *self.retry.lock() = RetryState::new(retries);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let read_loop = tokio::spawn(supervisor::run(Arc::clone(self), epoch, shutdown_rx));
        let guardian = tokio::spawn(guardian::watch(Arc::clone(self), epoch));

        debug!(epoch, attempt = retries, "Event stream tasks started");
        *tasks = Some(TaskSet {
            epoch,
            shutdown: shutdown_tx,
            read_loop,
            guardian,
        });
        true
    }

    /// Cancel the running tasks and forget the session
    fn halt_tasks(&self) {
        let tasks = self.tasks.lock().take();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(tasks) = tasks {
            tasks.abort();
        }
        *self.session.write() = None;
    }

    fn abort_pending_reconnect(&self) {
        if let Some(pending) = self.pending_reconnect.lock().take() {
            pending.abort();
        }
    }

    fn stop(&self) {
        self.status.set(ConnectionState::StopUpdates);
        self.abort_pending_reconnect();
        self.halt_tasks();
    }

    async fn reconnect(self: Arc<Self>, delay: Option<Duration>, retries: u32, mode: ReconnectMode) {
        self.halt_tasks();

        match mode {
            ReconnectMode::Explicit => {
                self.status.set(ConnectionState::Reconnecting);
            }
            ReconnectMode::Scheduled => {
                let moved = self
                    .status
                    .transition_if(|current| !current.is_halted(), ConnectionState::Reconnecting);
                if !moved && self.status() != ConnectionState::Reconnecting {
                    debug!(status = %self.status(), "Scheduled reconnect dropped");
                    return;
                }
            }
        }

        let delay = delay.unwrap_or_else(|| self.backoff.delay_for(retries));
        info!(
            delay_ms = delay.as_millis() as u64,
            attempt = retries,
            "Reconnecting event stream"
        );

        let epoch = self.epoch.load(Ordering::SeqCst);
        tokio::time::sleep(delay).await;

        if !self.is_current(epoch) {
            debug!(epoch, "Reconnect superseded while waiting");
            return;
        }
        self.start(self.backoff.next_attempt(retries), StartMode::Reconnect);
    }

    fn schedule_reconnect(self: &Arc<Self>, epoch: u64, retries: u32) {
        if !self.is_current(epoch) {
            return;
        }
        if self.reconnect_claim.fetch_max(epoch, Ordering::SeqCst) >= epoch {
            debug!(epoch, "Reconnect already scheduled for this session");
            return;
        }

        let shared = Arc::clone(self);
        let handle = tokio::spawn(async move {
            shared.reconnect(None, retries, ReconnectMode::Scheduled).await;
        });
        // Earlier handles belong to stale epochs and exit on their own
        *self.pending_reconnect.lock() = Some(handle);
    }

    /// Report a failed session; the first report for a live epoch wins
    pub(crate) fn connection_lost(self: &Arc<Self>, epoch: u64, retries: u32) {
        let lost = self.status.transition_if(
            |current| !current.is_halted() && self.is_current(epoch),
            ConnectionState::LostConnection,
        );
        if lost {
            self.schedule_reconnect(epoch, retries);
        }
    }

    /// Install the session of a freshly opened socket. Returns false when the
    /// epoch is stale or the stream was halted while connecting.
    pub(crate) fn session_opened(&self, epoch: u64, session: Arc<StreamSession>) -> bool {
        {
            let mut slot = self.session.write();
            if !self.is_current(epoch) {
                return false;
            }
            *slot = Some(session);
        }
        self.retry.lock().reset();

        let connected = self.status.transition_if(
            |current| !current.is_halted() && self.is_current(epoch),
            ConnectionState::Connected,
        );
        if !connected {
            let mut slot = self.session.write();
            if slot.as_ref().map(|s| s.epoch()) == Some(epoch) {
                *slot = None;
            }
        }
        connected
    }

    async fn disconnect(&self) {
        self.status.set(ConnectionState::Disconnecting);
        self.abort_pending_reconnect();

        let tasks = self.tasks.lock().take();
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if let Some(tasks) = tasks {
            tasks.guardian.abort();
            let _ = tasks.shutdown.send(true);

            let mut read_loop = tasks.read_loop;
            match tokio::time::timeout(self.config.shutdown_timeout, &mut read_loop).await {
                Ok(_) => debug!(epoch = tasks.epoch, "Read loop closed"),
                Err(_) => {
                    warn!(
                        timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                        "Read loop did not close in time, aborting"
                    );
                    read_loop.abort();
                }
            }
        }

        *self.session.write() = None;
        self.status.set(ConnectionState::Disconnected);
    }

    /// Route one text frame of `session`
    pub(crate) fn dispatch(&self, session: &StreamSession, raw: &str) {
        session.record_frame();
        trace!(frame = raw, "Received frame");

        let envelope = match classify(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping malformed frame: {}", e);
                return;
            }
        };

        self.observe_stream_id(envelope.stream_id.as_deref());

        match route(&envelope) {
            Route::Heartbeat { interval } => {
                session.record_heartbeat(interval);
                debug!(
                    interval_secs = session.heartbeat_interval().as_secs(),
                    "Heartbeat received"
                );
            }
            Route::Publish(topic) => {
                self.events.publish(&RoutedEvent::new(topic, envelope));
            }
            Route::CacheProgramKey(key) => {
                debug!(key = %key, "Program key cached");
                *self.program_key.lock() = Some(key);
            }
            Route::RefreshPrograms { program_key } => {
                if let Some(key) = program_key {
                    debug!(key = %key, "Program key changed");
                    *self.program_key.lock() = Some(key);
                }
                self.request_program_refresh();
            }
            Route::Discard(reason) => {
                debug!(?reason, control = %envelope.control_code, "Frame discarded");
            }
        }
    }

    fn observe_stream_id(&self, sid: Option<&str>) {
        let Some(sid) = sid else {
            return;
        };
        let mut known = self.stream_id.lock();
        match known.as_deref() {
            None => {
                debug!(sid, "Stream id learned");
                *known = Some(sid.to_string());
            }
            Some(previous) if previous != sid => {
                info!(previous, sid, "Device reset the event stream");
                *known = Some(sid.to_string());
            }
            Some(_) => {}
        }
    }

    fn request_program_refresh(&self) {
        let Some(hook) = self.program_refresh.clone() else {
            debug!("Program refresh requested but no hook is installed");
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = hook.refresh_programs().await {
                warn!("Program refresh failed: {}", e);
            }
        });
    }
}

/// Supervises one event subscription to a device
///
/// Dropping the controller cancels its background tasks without publishing a
/// status change; call [`disconnect`](Self::disconnect) first for a clean
/// close.
pub struct StreamController {
    shared: Arc<StreamShared>,
}

impl StreamController {
    /// Controller using the websocket transport
    pub fn new(config: StreamConfig) -> Result<Self> {
        StreamControllerBuilder::new().with_config(config).build()
    }

    pub fn builder() -> StreamControllerBuilder {
        StreamControllerBuilder::new()
    }

    pub(crate) fn from_parts(
        config: StreamConfig,
        connector: Arc<dyn Connector>,
        program_refresh: Option<Arc<dyn ProgramRefresh>>,
    ) -> Result<Self> {
        config.validate()?;
        let request = ConnectRequest::from_config(&config)?;

        Ok(Self {
            shared: Arc::new(StreamShared {
                backoff: BackoffPolicy::from_config(&config),
                request,
                config,
                connector,
                program_refresh,
                status: StatusCell::new(),
                events: EventEmitter::new(),
                retry: Mutex::new(RetryState::default()),
                epoch: AtomicU64::new(0),
                reconnect_claim: AtomicU64::new(0),
                tasks: Mutex::new(None),
                pending_reconnect: Mutex::new(None),
                session: RwLock::new(None),
                stream_id: Mutex::new(None),
                program_key: Mutex::new(None),
            }),
        })
    }

    /// Open the stream in the background, starting the backoff walk at
    /// `retries`. Ignored while connected.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, retries: u32) {
        self.shared.start(retries, StartMode::Explicit);
    }

    /// Stop streaming and cancel any pending reconnect. Idempotent.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Drop the current connection and reconnect after `delay`, or after the
    /// backoff delay for `retries` when `delay` is `None`
    pub async fn reconnect(&self, delay: Option<Duration>, retries: u32) {
        Arc::clone(&self.shared)
            .reconnect(delay, retries, ReconnectMode::Explicit)
            .await;
    }

    /// Close the socket cleanly and wait for the read loop to finish
    pub async fn disconnect(&self) {
        self.shared.disconnect().await;
    }

    pub fn status(&self) -> ConnectionState {
        self.shared.status()
    }

    /// Wall-clock time of the last heartbeat of the current session
    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.shared.session().and_then(|session| session.last_heartbeat())
    }

    pub fn last_heartbeat_age(&self) -> Option<Duration> {
        self.shared
            .session()
            .and_then(|session| session.last_heartbeat_age())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.shared.heartbeat_interval()
    }

    pub fn retry_attempt(&self) -> u32 {
        self.shared.retry_attempt()
    }

    /// Last stream id reported by the device; kept across reconnects
    pub fn stream_id(&self) -> Option<String> {
        self.shared.stream_id.lock().clone()
    }

    pub fn program_key(&self) -> Option<String> {
        self.shared.program_key.lock().clone()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    /// Listen for connection status changes
    pub fn subscribe_status<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.shared
            .status
            .emitter
            .subscribe(move |status| handler(*status))
    }

    /// Listen for events routed to one topic; status changes go through
    /// [`subscribe_status`](Self::subscribe_status)
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionHandle
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        self.shared.events.subscribe_filtered(
            move |event: &RoutedEvent| event.topic == topic,
            move |event: &RoutedEvent| handler(&event.envelope),
        )
    }

    /// Listen for every routed event
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(&RoutedEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(handler)
    }

    /// Remove a status or event subscription
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.shared.events.unsubscribe(handle) || self.shared.status.emitter.unsubscribe(handle)
    }

    pub fn status_events(&self) -> &EventEmitter<ConnectionState> {
        &self.shared.status.emitter
    }

    pub fn events(&self) -> &EventEmitter<RoutedEvent> {
        &self.shared.events
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        debug!(status = %self.shared.status(), "StreamController dropping");
        self.shared.abort_pending_reconnect();
        self.shared.halt_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::FrameStream;

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(
            &self,
            _request: &ConnectRequest,
        ) -> std::result::Result<Box<dyn FrameStream>, TransportError> {
            Err(TransportError::Connector("refused".to_string()))
        }
    }

    fn controller() -> StreamController {
        StreamController::from_parts(StreamConfig::default(), Arc::new(RefusingConnector), None)
            .unwrap()
    }

    fn recorded(controller: &StreamController) -> Arc<Mutex<Vec<ConnectionState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        controller.subscribe_status(move |status| sink.lock().push(status));
        seen
    }

    #[test]
    fn test_status_cell_publishes_only_changes() {
        let cell = StatusCell::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cell.emitter.subscribe(move |status| sink.lock().push(*status));

        assert!(cell.set(ConnectionState::Initializing));
        assert!(!cell.set(ConnectionState::Initializing));
        assert!(!cell.transition_if(|s| s == ConnectionState::Connected, ConnectionState::StopUpdates));
        assert!(cell.set(ConnectionState::Connected));

        assert_eq!(
            *seen.lock(),
            vec![ConnectionState::Initializing, ConnectionState::Connected]
        );
    }

    #[test]
    fn test_status_handler_can_reenter() {
        let cell = Arc::new(StatusCell::new());
        let inner = Arc::clone(&cell);
        cell.emitter.subscribe(move |status| {
            if *status == ConnectionState::LostConnection {
                inner.set(ConnectionState::StopUpdates);
            }
        });

        cell.set(ConnectionState::LostConnection);
        assert_eq!(cell.get(), ConnectionState::StopUpdates);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let controller = controller();
        let seen = recorded(&controller);

        controller.start(0);
        controller.stop();
        controller.stop();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(controller.status(), ConnectionState::StopUpdates);
        assert_eq!(
            *seen.lock(),
            vec![ConnectionState::Initializing, ConnectionState::StopUpdates]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_epoch_cannot_report_loss() {
        let controller = controller();
        controller.shared.status.set(ConnectionState::Connected);

        controller.shared.connection_lost(42, 0);
        assert_eq!(controller.status(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_loss_reports_schedule_once() {
        let controller = controller();
        let shared = &controller.shared;
        shared.status.set(ConnectionState::Connected);
        let epoch = 7;
        shared.epoch.store(epoch, Ordering::SeqCst);

        shared.connection_lost(epoch, 0);
        shared.status.set(ConnectionState::Connected);
        shared.connection_lost(epoch, 0);

        assert_eq!(shared.reconnect_claim.load(Ordering::SeqCst), epoch);
        assert!(shared.pending_reconnect.lock().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_id_tracking() {
        let controller = controller();
        let shared = &controller.shared;
        let session = StreamSession::new(0, Duration::from_secs(30));

        shared.dispatch(&session, r#"<Event sid="uuid:1"><control>_0</control><action>30</action></Event>"#);
        assert_eq!(controller.stream_id().as_deref(), Some("uuid:1"));

        shared.dispatch(&session, r#"<Event><control>ST</control><action>0</action><node>1 2 3 1</node></Event>"#);
        assert_eq!(controller.stream_id().as_deref(), Some("uuid:1"));

        shared.dispatch(&session, r#"<Event sid="uuid:2"><control>_0</control><action>30</action></Event>"#);
        assert_eq!(controller.stream_id().as_deref(), Some("uuid:2"));
        assert_eq!(session.frames_received(), 3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = StreamConfig::default().with_backoff_schedule(vec![]);
        assert!(StreamController::from_parts(config, Arc::new(RefusingConnector), None).is_err());
    }
}
