//! # Event Dispatcher
//!
//! Single source of truth for "what happened and in what order". Producers call
//! [`Dispatcher::send_event`] from any task; long-poll handlers read the log with
//! [`Dispatcher::poll_for_event`] / [`Dispatcher::wait_for_event`]; subscribers such
//! as the search index are called for every event.
//!
//! ## Ordering
//!
//! `send_event` assigns the id and enqueues the event on an unbounded channel under
//! one lock, so channel order equals id order. A single worker task drains the
//! channel and, for each event in turn:
//!
//! 1. appends it to the [`EventLog`] (pruning with hysteresis),
//! 2. hands it to every pending long-poll waiter,
//! 3. calls each subscriber on the blocking pool, isolating errors and panics.
//!
//! Event N's subscribers all return before event N+1 is appended. A slow
//! subscriber delays later events but never blocks `send_event`.
//!
//! ## Long-poll
//!
//! `wait_for_event` answers immediately when the log already has something newer
//! than the bookmark. Otherwise it parks a waiter that resolves with exactly the
//! next event, or with an empty list once its deadline passes. A sweep task
//! expires overdue waiters every `sweep_interval`.
//!
//! ## Lifecycle
//!
//! ```rust,no_run
//! use chattyd::config::DispatcherConfig;
//! use chattyd::dispatch::Dispatcher;
//! use chattyd::event::EventData;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let dispatcher = Dispatcher::new(DispatcherConfig::default())?;
//! dispatcher.start()?;
//! dispatcher.send_event(EventData::ServerMessage { message: "hello".into() })?;
//! let events = dispatcher.wait_for_event(0).await?;
//! dispatcher.shutdown().await;
//! # Ok(()) }
//! ```

pub mod event_log;
pub mod waiter;

use log::{debug, error, info, trace};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::DispatcherConfig;
use crate::errors::{ChattyError, Result};
use crate::event::{Event, EventData};
use crate::metrics;

pub use event_log::EventLog;
pub use waiter::WaiterSet;

/// Receives every event, in id order, after it is in the log.
///
/// Called on the blocking pool, one event at a time and never concurrently with
/// itself, so heavy work such as an index rebuild does not stall the runtime.
/// Errors and panics are logged and do not stop the dispatcher.
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &str {
        "subscriber"
    }

    fn on_event(&self, event: &Event) -> anyhow::Result<()>;
}

pub enum DispatchCommand {
    Publish(Event),
    Snapshot(oneshot::Sender<DispatcherStats>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub retained: usize,
    pub oldest_event_id: Option<u64>,
    pub newest_event_id: Option<u64>,
    pub processed_total: u64,
    pub pruned_total: u64,
    pub subscriber_failures: u64,
    pub pending_waiters: usize,
}

struct LogState {
    log: EventLog,
    waiters: WaiterSet,
    stopped: bool,
}

struct SendState {
    next_id: u64,
    tx: Option<mpsc::UnboundedSender<DispatchCommand>>,
}

struct Shared {
    config: DispatcherConfig,
    state: Mutex<LogState>,
    send: Mutex<SendState>,
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
    pending_rx: Mutex<Option<mpsc::UnboundedReceiver<DispatchCommand>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().expect("dispatcher state mutex poisoned")
    }

    fn lock_send(&self) -> MutexGuard<'_, SendState> {
        self.send.lock().expect("dispatcher send mutex poisoned")
    }
}

/// Handle to one dispatcher instance. Clones share the same log and worker.
///
/// Dropping the last handle closes the queue: the worker drains what was
/// already sent, releases pending waiters and exits, and the sweep is aborted.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
    _handles: Arc<HandleCount>,
}

// The tasks hold `Shared` too, so handle lifetime is tracked separately.
struct HandleCount {
    shared: Arc<Shared>,
}

impl Drop for HandleCount {
    fn drop(&mut self) {
        if let Ok(mut send) = self.shared.send.lock() {
            send.tx.take();
        }
        if let Ok(mut sweeper) = self.shared.sweeper.lock() {
            if let Some(sweep) = sweeper.take() {
                sweep.abort();
            }
        }
    }
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        config.validate().map_err(ChattyError::Config)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Shared {
            state: Mutex::new(LogState {
                log: EventLog::new(config.max_events, config.prune_events),
                waiters: WaiterSet::new(),
                stopped: false,
            }),
            send: Mutex::new(SendState {
                next_id: 1,
                tx: Some(tx),
            }),
            subscribers: RwLock::new(Vec::new()),
            pending_rx: Mutex::new(Some(rx)),
            sweeper: Mutex::new(None),
            config,
        };
        let shared = Arc::new(shared);
        Ok(Self {
            _handles: Arc::new(HandleCount {
                shared: Arc::clone(&shared),
            }),
            shared,
        })
    }

    /// Register a subscriber. Subscribers run in registration order.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        debug!("dispatcher: subscriber '{}' registered", subscriber.name());
        self.shared
            .subscribers
            .write()
            .expect("subscriber lock poisoned")
            .push(subscriber);
    }

    /// Spawn the worker loop and the waiter sweep on the current tokio runtime.
    /// Events sent before this call are processed once the worker runs.
    pub fn start(&self) -> Result<()> {
        let rx = self
            .shared
            .pending_rx
            .lock()
            .expect("dispatcher rx mutex poisoned")
            .take()
            .ok_or(ChattyError::AlreadyStarted)?;

        tokio::spawn(run_worker(Arc::clone(&self.shared), rx));

        let sweep = tokio::spawn(run_sweeper(Arc::clone(&self.shared)));
        *self
            .shared
            .sweeper
            .lock()
            .expect("dispatcher sweeper mutex poisoned") = Some(sweep);

        info!(
            "dispatcher started (max_events={} prune_events={} wait_timeout={:?})",
            self.shared.config.max_events,
            self.shared.config.prune_events,
            self.shared.config.wait_timeout()
        );
        Ok(())
    }

    /// Assign the next id, stamp the time and queue the event for processing.
    /// Returns the assigned id without waiting for subscribers.
    pub fn send_event(&self, data: EventData) -> Result<u64> {
        let mut send = self.shared.lock_send();
        let tx = send.tx.as_ref().ok_or(ChattyError::DispatcherStopped)?;
        let event_id = send.next_id;
        let event = Event::new(event_id, data);
        tx.send(DispatchCommand::Publish(event))
            .map_err(|_| ChattyError::DispatcherStopped)?;
        send.next_id += 1;
        metrics::inc_events_sent();
        Ok(event_id)
    }

    /// Non-blocking read of every retained event newer than `last_event_id`.
    pub fn poll_for_event(&self, last_event_id: u64) -> Result<Vec<Arc<Event>>> {
        self.shared.lock_state().log.poll(last_event_id)
    }

    /// Long-poll read. Returns existing events immediately, otherwise waits for
    /// the next event (delivered alone) or the wait timeout (empty list).
    ///
    /// A stale bookmark fails with [`ChattyError::TooManyEvents`] just like a poll.
    pub async fn wait_for_event(&self, last_event_id: u64) -> Result<Vec<Arc<Event>>> {
        let reply = {
            let mut state = self.shared.lock_state();
            let existing = state.log.poll(last_event_id)?;
            if !existing.is_empty() || state.stopped {
                return Ok(existing);
            }
            let expires_at = Instant::now() + self.shared.config.wait_timeout();
            state.waiters.register(expires_at)
        };
        metrics::inc_waiters_registered();
        // Sender dropped only if the dispatcher itself went away: treat as "try again".
        Ok(reply.await.unwrap_or_default())
    }

    /// Last assigned id, 0 before the first `send_event`.
    pub fn newest_event_id(&self) -> u64 {
        self.shared.lock_send().next_id - 1
    }

    /// Ask the worker for its counters. `None` if the worker is not running.
    pub async fn stats(&self) -> Option<DispatcherStats> {
        if self
            .shared
            .pending_rx
            .lock()
            .expect("dispatcher rx mutex poisoned")
            .is_some()
        {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        {
            let send = self.shared.lock_send();
            let queue = send.tx.as_ref()?;
            queue.send(DispatchCommand::Snapshot(tx)).ok()?;
        }
        rx.await.ok()
    }

    /// Stop accepting events, let the worker finish everything already queued,
    /// release pending waiters and stop the sweep.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        let queued = {
            let mut send = self.shared.lock_send();
            match send.tx.take() {
                Some(tx) => tx.send(DispatchCommand::Shutdown(done_tx)).is_ok(),
                None => false,
            }
        };

        let never_started = self
            .shared
            .pending_rx
            .lock()
            .expect("dispatcher rx mutex poisoned")
            .take()
            .is_some();

        if queued && !never_started {
            let _ = done_rx.await;
        } else {
            let mut state = self.shared.lock_state();
            state.stopped = true;
            state.waiters.release_all();
        }

        if let Some(sweep) = self
            .shared
            .sweeper
            .lock()
            .expect("dispatcher sweeper mutex poisoned")
            .take()
        {
            sweep.abort();
        }
        info!("dispatcher stopped");
    }
}

async fn run_worker(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<DispatchCommand>) {
    let mut stats = DispatcherStats::default();
    while let Some(cmd) = rx.recv().await {
        match cmd {
            DispatchCommand::Publish(event) => process_event(&shared, event, &mut stats).await,
            DispatchCommand::Snapshot(resp) => {
                let state = shared.lock_state();
                let _ = resp.send(DispatcherStats {
                    retained: state.log.len(),
                    oldest_event_id: state.log.oldest_id(),
                    newest_event_id: state.log.newest_id(),
                    pending_waiters: state.waiters.len(),
                    ..stats.clone()
                });
            }
            DispatchCommand::Shutdown(done) => {
                let released = {
                    let mut state = shared.lock_state();
                    state.stopped = true;
                    state.waiters.release_all()
                };
                debug!("dispatcher: released {} waiters on shutdown", released);
                let _ = done.send(());
                break;
            }
        }
    }
    let released = {
        let mut state = shared.lock_state();
        state.stopped = true;
        state.waiters.release_all()
    };
    if released > 0 {
        debug!("dispatcher: released {} waiters after the queue closed", released);
    }
    debug!("dispatcher worker loop terminated");
}

async fn process_event(shared: &Shared, event: Event, stats: &mut DispatcherStats) {
    let event = Arc::new(event);

    let (pruned, woken) = {
        let mut state = shared.lock_state();
        let pruned = state.log.append(Arc::clone(&event));
        let woken = state.waiters.fulfill_all(&event);
        (pruned, woken)
    };
    if pruned > 0 {
        debug!("dispatcher: pruned {} old events", pruned);
        stats.pruned_total += pruned as u64;
        metrics::add_events_pruned(pruned);
    }
    metrics::add_waiters_fulfilled(woken);

    // Clone the list so subscribe() is never blocked behind a slow subscriber.
    let subscribers: Vec<Arc<dyn EventSubscriber>> = shared
        .subscribers
        .read()
        .expect("subscriber lock poisoned")
        .clone();

    if !subscribers.is_empty() {
        // Awaited before the next command is taken, so ordering holds.
        let delivered = Arc::clone(&event);
        match tokio::task::spawn_blocking(move || notify_subscribers(&subscribers, &delivered)).await
        {
            Ok(failures) => stats.subscriber_failures += failures,
            Err(e) => {
                stats.subscriber_failures += 1;
                metrics::inc_subscriber_failures();
                error!(
                    "dispatcher: subscriber fan-out for event #{} did not complete: {}",
                    event.event_id, e
                );
            }
        }
    }

    stats.processed_total += 1;
    metrics::inc_events_processed();
    trace!(
        "Event #{}: {} (woke {} waiters)",
        event.event_id,
        event.event_type(),
        woken
    );
}

/// Call each subscriber in order. Returns how many failed.
fn notify_subscribers(subscribers: &[Arc<dyn EventSubscriber>], event: &Event) -> u64 {
    let mut failures = 0;
    for subscriber in subscribers {
        match catch_unwind(AssertUnwindSafe(|| subscriber.on_event(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures += 1;
                metrics::inc_subscriber_failures();
                error!(
                    "dispatcher: subscriber '{}' failed on event #{}: {:#}",
                    subscriber.name(),
                    event.event_id,
                    e
                );
            }
            Err(_) => {
                failures += 1;
                metrics::inc_subscriber_failures();
                error!(
                    "dispatcher: subscriber '{}' panicked on event #{}",
                    subscriber.name(),
                    event.event_id
                );
            }
        }
    }
    failures
}

async fn run_sweeper(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(shared.config.sweep_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let expired = {
            let mut state = shared.lock_state();
            if state.stopped {
                break;
            }
            state.waiters.expire(Instant::now())
        };
        if expired > 0 {
            trace!("dispatcher: expired {} long-poll waiters", expired);
            metrics::add_waiters_expired(expired);
        }
    }
}
