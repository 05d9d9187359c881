//! Refresh exclusion and periodic refresh scheduling.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::account::CredentialVault;
use crate::codec::MessageSummary;
use crate::engine::MailEngine;
use crate::error::{Error, Result};
use crate::service::MailBackend;

/// Default time between periodic refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Shortest accepted refresh interval; shorter ones are raised to it.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Default)]
struct Slot {
    lock: tokio::sync::Mutex<()>,
    token: Mutex<CancellationToken>,
}

impl Slot {
    fn token(&self) -> CancellationToken {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Allows at most one mailbox operation per account at a time.
///
/// Operations for the same account either queue ([`RefreshGate::run`]) or
/// are skipped ([`RefreshGate::run_if_idle`]). An in-flight operation can
/// be cancelled; it stops at its next suspension point with
/// [`Error::Cancelled`].
#[derive(Debug, Default)]
pub struct RefreshGate {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl RefreshGate {
    /// Creates an empty gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, address: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(address.to_string()).or_default())
    }

    fn existing_slot(&self, address: &str) -> Option<Arc<Slot>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }

    /// Runs `op` once no other operation for `address` is running.
    ///
    /// A [`RefreshGate::cancel`] issued while `op` is still waiting for its
    /// turn cancels it too.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or [`Error::Cancelled`].
    pub async fn run<T, F>(&self, address: &str, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let slot = self.slot(address);
        let token = slot.token();
        let _guard = tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!(address, "queued operation cancelled");
                return Err(Error::Cancelled);
            }
            guard = slot.lock.lock() => guard,
        };
        guarded(token, op).await
    }

    /// Runs `op` only if nothing is running for `address`; `None` otherwise.
    pub async fn run_if_idle<T, F>(&self, address: &str, op: F) -> Option<Result<T>>
    where
        F: Future<Output = Result<T>>,
    {
        let slot = self.slot(address);
        let Ok(_guard) = slot.lock.try_lock() else {
            debug!(address, "operation already running, skipped");
            return None;
        };
        Some(guarded(slot.token(), op).await)
    }

    /// Cancels the running operation for `address` and any queued behind
    /// it. Operations started afterwards are unaffected.
    pub fn cancel(&self, address: &str) {
        let Some(slot) = self.existing_slot(address) else {
            return;
        };
        let mut token = slot.token.lock().unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
        debug!(address, "cancelled running operation");
    }

    /// Cancels everything for `address` and forgets the account.
    pub fn remove(&self, address: &str) {
        let removed = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address);
        if let Some(slot) = removed {
            slot.token
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .cancel();
            debug!(address, "dropped refresh slot");
        }
    }

    /// Returns true while an operation for `address` is running.
    #[must_use]
    pub fn is_busy(&self, address: &str) -> bool {
        self.existing_slot(address)
            .is_some_and(|slot| slot.lock.try_lock().is_err())
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

async fn guarded<T>(token: CancellationToken, op: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        () = token.cancelled() => Err(Error::Cancelled),
        result = op => result,
    }
}

/// What started a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The refresh interval elapsed.
    Periodic,
    /// [`SyncHandle::refresh_now`] was called.
    Manual,
    /// The active account changed.
    AccountSwitch,
}

/// Result of one scheduled refresh.
#[derive(Debug)]
pub struct SyncEvent {
    /// Account that was refreshed.
    pub address: String,
    /// What started the refresh.
    pub trigger: Trigger,
    /// The listed messages, or why the refresh failed.
    pub outcome: Result<Vec<MessageSummary>>,
}

#[derive(Debug)]
enum Request {
    SetActive(Option<String>),
    RefreshNow,
    Shutdown,
}

/// Controls a running [`SyncScheduler`].
#[derive(Debug, Clone)]
pub struct SyncHandle {
    requests: mpsc::Sender<Request>,
}

impl SyncHandle {
    /// Switches the active account. The previous account's running refresh
    /// is cancelled and the new account is refreshed immediately. `None`
    /// stops periodic refreshes.
    ///
    /// Returns false if the scheduler has stopped.
    pub async fn set_active_account(&self, address: Option<String>) -> bool {
        self.request(Request::SetActive(address)).await
    }

    /// Refreshes the active account now, after any running refresh.
    ///
    /// Returns false if the scheduler has stopped.
    pub async fn refresh_now(&self) -> bool {
        self.request(Request::RefreshNow).await
    }

    /// Stops the scheduler and aborts outstanding refreshes.
    pub async fn shutdown(&self) {
        self.request(Request::Shutdown).await;
    }

    async fn request(&self, request: Request) -> bool {
        self.requests.send(request).await.is_ok()
    }
}

/// Background loop that refreshes the active account.
pub struct SyncScheduler<V, B> {
    engine: Arc<MailEngine<V, B>>,
    interval: Duration,
    requests: mpsc::Receiver<Request>,
    events: mpsc::Sender<SyncEvent>,
    active: Option<String>,
    tasks: JoinSet<()>,
}

impl<V, B> SyncScheduler<V, B>
where
    V: CredentialVault + 'static,
    B: MailBackend + 'static,
{
    /// Starts the scheduler on the current tokio runtime.
    ///
    /// No account is active until [`SyncHandle::set_active_account`].
    /// An `interval` below [`MIN_REFRESH_INTERVAL`] is raised to it.
    #[must_use]
    pub fn spawn(
        engine: Arc<MailEngine<V, B>>,
        interval: Duration,
    ) -> (SyncHandle, mpsc::Receiver<SyncEvent>) {
        if interval < MIN_REFRESH_INTERVAL {
            warn!(requested = ?interval, "refresh interval too short, using minimum");
        }
        let interval = interval.max(MIN_REFRESH_INTERVAL);
        let (request_tx, request_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let scheduler = Self {
            engine,
            interval,
            requests: request_rx,
            events: event_tx,
            active: None,
            tasks: JoinSet::new(),
        };
        tokio::spawn(scheduler.run());

        (
            SyncHandle {
                requests: request_tx,
            },
            event_rx,
        )
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "sync scheduler started");

        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request::SetActive(address)) => self.switch_to(address),
                    Some(Request::RefreshNow) => self.start(Trigger::Manual),
                    Some(Request::Shutdown) | None => break,
                },
                _ = ticker.tick() => self.start(Trigger::Periodic),
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(err) = joined
                        && err.is_panic()
                    {
                        warn!(error = %err, "refresh task panicked");
                    }
                }
            }
        }

        if let Some(address) = &self.active {
            self.engine.cancel_refresh(address);
        }
        self.tasks.shutdown().await;
        info!("sync scheduler stopped");
    }

    fn switch_to(&mut self, address: Option<String>) {
        if let Some(previous) = &self.active
            && address.as_ref() != Some(previous)
        {
            self.engine.cancel_refresh(previous);
        }
        debug!(address = ?address, "active account changed");
        self.active = address;
        self.start(Trigger::AccountSwitch);
    }

    fn start(&mut self, trigger: Trigger) {
        let Some(address) = self.active.clone() else {
            return;
        };
        let engine = Arc::clone(&self.engine);
        let events = self.events.clone();

        self.tasks.spawn(async move {
            let outcome = match trigger {
                Trigger::Periodic => match engine.refresh_if_idle(&address).await {
                    Some(outcome) => outcome,
                    None => return,
                },
                Trigger::Manual | Trigger::AccountSwitch => engine.refresh(&address).await,
            };
            if let Err(err) = &outcome {
                warn!(address = %address, ?trigger, error = %err, "refresh failed");
            }
            let event = SyncEvent {
                address,
                trigger,
                outcome,
            };
            if events.send(event).await.is_err() {
                debug!("event receiver dropped");
            }
        });
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, engine_with};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_gate_serializes_same_account() {
        let gate = Arc::new(RefreshGate::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let (gate, active, peak) = (gate.clone(), active.clone(), peak.clone());
            handles.push(tokio::spawn(async move {
                gate.run("a@example.com", async {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_allows_other_accounts() {
        let gate = RefreshGate::new();
        let start = Instant::now();
        let slow = |n| async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(n)
        };
        let (a, b) = tokio::join!(
            gate.run("a@example.com", slow(1)),
            gate.run("b@example.com", slow(2))
        );
        assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_if_idle_skips_when_busy() {
        let gate = Arc::new(RefreshGate::new());
        let busy = {
            let gate = gate.clone();
            tokio::spawn(async move {
                gate.run("a@example.com", async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(())
                })
                .await
            })
        };
        tokio::task::yield_now().await;

        assert!(gate.is_busy("a@example.com"));
        let skipped = gate.run_if_idle("a@example.com", async { Ok(()) }).await;
        assert!(skipped.is_none());

        busy.await.unwrap().unwrap();
        assert!(!gate.is_busy("a@example.com"));
        let ran = gate.run_if_idle("a@example.com", async { Ok(5) }).await;
        assert_eq!(ran.unwrap().unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_running_operation_only() {
        let gate = Arc::new(RefreshGate::new());
        let running = {
            let gate = gate.clone();
            tokio::spawn(async move {
                gate.run("a@example.com", async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                })
                .await
            })
        };
        tokio::task::yield_now().await;

        gate.cancel("a@example.com");
        let err = running.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        let after = gate.run("a@example.com", async { Ok(1) }).await;
        assert_eq!(after.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_reaches_queued_operation() {
        let gate = Arc::new(RefreshGate::new());
        let spawn_op = |secs| {
            let gate = gate.clone();
            tokio::spawn(async move {
                gate.run("a@example.com", async move {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    Ok(secs)
                })
                .await
            })
        };
        let running = spawn_op(30);
        tokio::task::yield_now().await;
        let queued = spawn_op(1);
        tokio::task::yield_now().await;

        gate.cancel("a@example.com");
        assert!(matches!(running.await.unwrap(), Err(Error::Cancelled)));
        assert!(matches!(queued.await.unwrap(), Err(Error::Cancelled)));

        let after = gate.run("a@example.com", async { Ok(2) }).await;
        assert_eq!(after.unwrap(), 2);
    }

    #[test]
    fn test_queries_do_not_track_unknown_accounts() {
        let gate = RefreshGate::new();
        assert!(!gate.is_busy("nobody@example.com"));
        gate.cancel("nobody@example.com");
        assert_eq!(gate.tracked(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_forgets_account() {
        let gate = RefreshGate::new();
        gate.run("a@example.com", async { Ok(()) }).await.unwrap();
        assert_eq!(gate.tracked(), 1);

        gate.remove("a@example.com");
        assert_eq!(gate.tracked(), 0);
        assert!(!gate.is_busy("a@example.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_switch_and_ticks() {
        let backend = FakeBackend::with_delay(Duration::from_secs(1));
        let (engine, _dir) = engine_with(backend).await;
        let engine = Arc::new(engine);

        let (handle, mut events) = SyncScheduler::spawn(engine.clone(), Duration::from_secs(300));
        assert!(handle.set_active_account(Some("alice@example.com".into())).await);

        let first = events.recv().await.unwrap();
        assert_eq!(first.address, "alice@example.com");
        assert_eq!(first.trigger, Trigger::AccountSwitch);
        assert_eq!(first.outcome.unwrap().len(), 1);

        let tick = events.recv().await.unwrap();
        assert_eq!(tick.trigger, Trigger::Periodic);
        assert!(tick.outcome.is_ok());

        assert!(handle.refresh_now().await);
        let manual = events.recv().await.unwrap();
        assert_eq!(manual.trigger, Trigger::Manual);

        handle.shutdown().await;
        assert!(events.recv().await.is_none());
        assert_eq!(engine.backend().max_concurrent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_switch_cancels_previous() {
        let backend = FakeBackend::with_delay(Duration::from_secs(30));
        let (engine, _dir) = engine_with(backend).await;
        engine
            .add_account(
                "bob@example.com",
                crate::testing::settings(),
                "secret",
            )
            .await
            .unwrap();
        let engine = Arc::new(engine);

        let (handle, mut events) = SyncScheduler::spawn(engine.clone(), Duration::from_secs(300));
        handle.set_active_account(Some("alice@example.com".into())).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.set_active_account(Some("bob@example.com".into())).await;

        let mut seen = Vec::new();
        for _ in 0..2 {
            let event = events.recv().await.unwrap();
            seen.push((event.address, event.outcome.is_ok()));
        }
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("alice@example.com".to_string(), false),
                ("bob@example.com".to_string(), true),
            ]
        );
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_switch_cancels_queued_manual_refresh() {
        let backend = FakeBackend::with_delay(Duration::from_secs(30));
        let (engine, _dir) = engine_with(backend).await;
        engine
            .add_account(
                "bob@example.com",
                crate::testing::settings(),
                "secret",
            )
            .await
            .unwrap();
        let engine = Arc::new(engine);

        let (handle, mut events) = SyncScheduler::spawn(engine.clone(), Duration::from_secs(300));
        handle.set_active_account(Some("alice@example.com".into())).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(handle.refresh_now().await);
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.set_active_account(Some("bob@example.com".into())).await;

        let mut seen = Vec::new();
        for _ in 0..3 {
            let event = events.recv().await.unwrap();
            seen.push((event.address, event.trigger, event.outcome.is_ok()));
        }
        let stale: Vec<_> = seen
            .iter()
            .filter(|(address, _, _)| address == "alice@example.com")
            .collect();
        assert_eq!(stale.len(), 2);
        assert!(stale.iter().all(|(_, _, ok)| !ok));
        assert!(seen.contains(&(
            "bob@example.com".to_string(),
            Trigger::AccountSwitch,
            true
        )));
        // Only alice's first refresh and bob's reached the network.
        assert_eq!(engine.backend().calls(), 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_raises_zero_interval() {
        let backend = FakeBackend::with_delay(Duration::from_millis(100));
        let (engine, _dir) = engine_with(backend).await;
        let engine = Arc::new(engine);

        let (handle, mut events) = SyncScheduler::spawn(engine.clone(), Duration::ZERO);
        assert!(handle.set_active_account(Some("alice@example.com".into())).await);

        let first = events.recv().await.unwrap();
        assert_eq!(first.trigger, Trigger::AccountSwitch);
        let start = Instant::now();
        let tick = events.recv().await.unwrap();
        assert_eq!(tick.trigger, Trigger::Periodic);
        assert!(tick.outcome.is_ok());
        assert!(start.elapsed() < MIN_REFRESH_INTERVAL * 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_tick_coalesced_while_busy() {
        let backend = FakeBackend::with_delay(Duration::from_secs(400));
        let (engine, _dir) = engine_with(backend).await;
        let engine = Arc::new(engine);

        let (handle, mut events) = SyncScheduler::spawn(engine.clone(), Duration::from_secs(300));
        handle.set_active_account(Some("alice@example.com".into())).await;

        let first = events.recv().await.unwrap();
        assert_eq!(first.trigger, Trigger::AccountSwitch);
        // The tick at 300 s found the first refresh still running.
        assert_eq!(engine.backend().calls(), 1);

        let next = events.recv().await.unwrap();
        assert_eq!(next.trigger, Trigger::Periodic);
        assert_eq!(engine.backend().calls(), 2);
        handle.shutdown().await;
    }
}
