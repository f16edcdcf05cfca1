//! Periodic probe scheduler.
//!
//! Owns one repeating timer and the current configuration snapshots. Each tick
//! launches at most one probe; if the previous probe is still running the tick
//! is skipped rather than queued. Outcomes reach the registered handler only if
//! the scheduler generation they were launched under is still current, so
//! nothing from before a `stop()` or `reconfigure()` leaks through.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::ConfigError;
use crate::probe::{ProbeConfig, ProbeOutcome, Prober};

/// Callback receiving each delivered outcome. Must not block.
///
/// The handler may call [`Scheduler::refresh_now`] and the read-only
/// accessors; the probe slot is already free when it runs. `stop()` waits for
/// a running handler to return, so a handler must never wait on a thread that
/// is calling `stop()` or `reconfigure()`.
pub type OutcomeHandler = Arc<dyn Fn(ProbeOutcome) + Send + Sync>;

/// Timer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    interval: Duration,
}

impl ScheduleConfig {
    /// Create a schedule with a strictly positive interval.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if `interval` is zero.
    pub fn new(interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "schedule interval must be positive".to_string(),
            ));
        }
        Ok(Self { interval })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Replacement configuration applied by [`Scheduler::reconfigure`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigUpdate {
    Probe(ProbeConfig),
    Schedule(ScheduleConfig),
}

impl From<ProbeConfig> for ConfigUpdate {
    fn from(config: ProbeConfig) -> Self {
        Self::Probe(config)
    }
}

impl From<ScheduleConfig> for ConfigUpdate {
    fn from(config: ScheduleConfig) -> Self {
        Self::Schedule(config)
    }
}

/// Lifecycle state. There is no paused state; stopping discards the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// State shared between the scheduler, its timer task and probe tasks.
struct Shared<P> {
    prober: P,
    handler: OutcomeHandler,
    generation: AtomicU64,
    /// Held while the handler runs and while the generation advances.
    delivery: Mutex<()>,
    in_flight: AtomicBool,
    slot_freed: Notify,
}

impl<P: Prober> Shared<P> {
    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn advance_generation(&self) -> u64 {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Spawn one probe unless another is still running. Returns whether it launched.
    fn launch(self: &Arc<Self>, config: Arc<ProbeConfig>, generation: u64) -> bool {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return false;
        }

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let guard = InFlightGuard {
                in_flight: &shared.in_flight,
                slot_freed: &shared.slot_freed,
            };
            let outcome = shared.prober.probe(&config).await;
            shared.deliver(outcome, generation, guard);
        });
        true
    }

    /// Free the probe slot and hand the outcome to the handler if its
    /// generation is still current.
    ///
    /// The slot is freed only once the delivery lock is held, so a probe
    /// launched from here on cannot deliver ahead of this outcome.
    fn deliver(&self, outcome: ProbeOutcome, generation: u64, slot: InFlightGuard<'_>) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        drop(slot);

        let current = self.current_generation();
        if current != generation {
            tracing::debug!(
                generation,
                current,
                outcome = %outcome,
                "Discarding outcome from stale generation"
            );
            return;
        }
        (self.handler)(outcome);
    }
}

/// Clears the in-flight flag once the probe task finishes, even on panic.
struct InFlightGuard<'a> {
    in_flight: &'a AtomicBool,
    slot_freed: &'a Notify,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
        self.slot_freed.notify_waiters();
    }
}

struct TimerHandle {
    stop: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// Periodic prober with start/stop/reconfigure.
///
/// `start`, `reconfigure` and `refresh_now` spawn Tokio tasks and must be called
/// from within a Tokio runtime.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use pingers::probe::{PingProber, ProbeConfig, ProbeTarget};
/// use pingers::scheduler::{ScheduleConfig, Scheduler};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let probe = ProbeConfig::new(ProbeTarget::new("1.1.1.1")?, Duration::from_secs(2))?;
/// let schedule = ScheduleConfig::new(Duration::from_secs(10))?;
/// let mut scheduler = Scheduler::new(PingProber::default(), probe, schedule, |outcome| {
///     println!("{outcome}");
/// });
/// scheduler.start();
/// # Ok(())
/// # }
/// ```
pub struct Scheduler<P: Prober> {
    shared: Arc<Shared<P>>,
    probe_config: Arc<ProbeConfig>,
    schedule: ScheduleConfig,
    timer: Option<TimerHandle>,
}

impl<P: Prober> Scheduler<P> {
    /// Create an idle scheduler.
    pub fn new<F>(
        prober: P,
        probe_config: ProbeConfig,
        schedule: ScheduleConfig,
        handler: F,
    ) -> Self
    where
        F: Fn(ProbeOutcome) + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                prober,
                handler: Arc::new(handler),
                generation: AtomicU64::new(0),
                delivery: Mutex::new(()),
                in_flight: AtomicBool::new(false),
                slot_freed: Notify::new(),
            }),
            probe_config: Arc::new(probe_config),
            schedule,
            timer: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.timer.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    pub fn probe_config(&self) -> &ProbeConfig {
        &self.probe_config
    }

    pub fn schedule(&self) -> ScheduleConfig {
        self.schedule
    }

    /// Current generation. Changes on every start and stop.
    pub fn generation(&self) -> u64 {
        self.shared.current_generation()
    }

    /// Whether a probe is currently running.
    pub fn probe_in_flight(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Start ticking. The first tick fires immediately. No-op if already running.
    pub fn start(&mut self) {
        if self.timer.is_some() {
            return;
        }

        let generation = self.shared.advance_generation();
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(run_timer(
            Arc::clone(&self.shared),
            Arc::clone(&self.probe_config),
            self.schedule.interval,
            generation,
            stop_rx,
        ));
        self.timer = Some(TimerHandle {
            stop: stop_tx,
            join,
        });

        tracing::info!(
            host = %self.probe_config.target,
            interval = ?self.schedule.interval,
            timeout = ?self.probe_config.timeout,
            generation,
            "Scheduler started"
        );
    }

    /// Cancel the timer. An in-flight probe runs to completion but its outcome
    /// is discarded. Safe to call in any state.
    ///
    /// Waits for a handler call already in progress, so no outcome is
    /// delivered after this returns.
    pub fn stop(&mut self) {
        let generation = self.shared.advance_generation();
        let Some(timer) = self.timer.take() else {
            return;
        };

        // The timer task may already have exited; nothing to report then.
        let _ = timer.stop.send(());
        drop(timer.join);
        tracing::info!(generation, "Scheduler stopped");
    }

    /// Replace the probe or schedule configuration.
    ///
    /// A running scheduler is stopped and restarted with the new snapshot, so
    /// the next tick fires immediately under the new configuration. An
    /// in-flight probe keeps the configuration it launched with and its result
    /// is discarded; the first probe of the new configuration then launches as
    /// soon as it finishes.
    pub fn reconfigure(&mut self, update: impl Into<ConfigUpdate>) {
        let was_running = self.is_running();
        self.stop();

        match update.into() {
            ConfigUpdate::Probe(config) => {
                tracing::info!(
                    host = %config.target,
                    timeout = ?config.timeout,
                    "Probe reconfigured"
                );
                self.probe_config = Arc::new(config);
            }
            ConfigUpdate::Schedule(schedule) => {
                tracing::info!(interval = ?schedule.interval, "Schedule reconfigured");
                self.schedule = schedule;
            }
        }

        if was_running {
            self.start();
        }
    }

    /// Probe once now, outside the timer, delivering through the same handler.
    ///
    /// Returns `false` without probing if a probe is already in flight.
    pub fn refresh_now(&self) -> bool {
        let launched = self
            .shared
            .launch(Arc::clone(&self.probe_config), self.generation());
        if !launched {
            tracing::debug!("Probe already in flight, refresh skipped");
        }
        launched
    }
}

impl<P: Prober> Drop for Scheduler<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<P: Prober> fmt::Debug for Scheduler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state())
            .field("probe_config", &self.probe_config)
            .field("schedule", &self.schedule)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

/// Timer loop for one generation. Launching a probe never waits for it.
///
/// If the first tick finds a stale probe still running, the launch is retried
/// once that probe frees the slot instead of a whole interval later.
async fn run_timer<P: Prober>(
    shared: Arc<Shared<P>>,
    config: Arc<ProbeConfig>,
    interval: Duration,
    generation: u64,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut first_tick = true;

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {}
        }
        if shared.current_generation() != generation {
            break;
        }

        let slot_freed = shared.slot_freed.notified();
        tokio::pin!(slot_freed);
        slot_freed.as_mut().enable();

        if shared.launch(Arc::clone(&config), generation) {
            first_tick = false;
            continue;
        }
        if !std::mem::take(&mut first_tick) {
            tracing::debug!(
                host = %config.target,
                "Previous probe still in flight, skipping tick"
            );
            continue;
        }

        tracing::debug!(
            host = %config.target,
            "Previous probe still in flight, launching once it finishes"
        );
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = slot_freed => {}
        }
        if shared.current_generation() == generation
            && !shared.launch(Arc::clone(&config), generation)
        {
            tracing::debug!(host = %config.target, "Probe slot taken again, waiting for next tick");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeTarget;
    use std::sync::OnceLock;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;
    use tokio::time::{Instant, sleep, timeout};

    /// Fake prober that sleeps, then reports the target it was called with.
    struct ScriptedProber {
        delay: Duration,
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        /// Target of each finished call, as seen at entry and at return.
        seen: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedProber {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<(String, String)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, config: &ProbeConfig) -> ProbeOutcome {
            let at_entry = config.target.to_string();
            self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((at_entry, config.target.to_string()));
            ProbeOutcome::failed(config.target.as_str())
        }
    }

    type Delivered = mpsc::UnboundedReceiver<(Instant, ProbeOutcome)>;

    fn probe_config(host: &str) -> ProbeConfig {
        ProbeConfig::new(ProbeTarget::new(host).unwrap(), Duration::from_secs(2)).unwrap()
    }

    fn schedule(interval: Duration) -> ScheduleConfig {
        ScheduleConfig::new(interval).unwrap()
    }

    fn build_scheduler(
        prober: &Arc<ScriptedProber>,
        host: &str,
        interval: Duration,
    ) -> (Scheduler<Arc<ScriptedProber>>, Delivered) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(
            Arc::clone(prober),
            probe_config(host),
            schedule(interval),
            move |outcome| {
                let _ = tx.send((Instant::now(), outcome));
            },
        );
        (scheduler, rx)
    }

    async fn next_target(rx: &mut Delivered) -> String {
        let (_, outcome) = timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("no outcome delivered")
            .expect("channel closed");
        match outcome {
            ProbeOutcome::Failed { reason } => reason,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_schedule_rejects_zero_interval() {
        assert!(ScheduleConfig::new(Duration::ZERO).is_err());
        assert_eq!(
            ScheduleConfig::new(Duration::from_millis(500))
                .unwrap()
                .interval(),
            Duration::from_millis(500)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_fires_immediately() {
        let prober = ScriptedProber::new(Duration::from_millis(50));
        let (mut scheduler, mut rx) = build_scheduler(&prober, "a", Duration::from_secs(10));

        let started = Instant::now();
        scheduler.start();
        assert_eq!(scheduler.state(), SchedulerState::Running);

        let (delivered_at, _) = rx.recv().await.unwrap();
        let elapsed = delivered_at - started;
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(1), "first outcome took {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_repeat_on_interval() {
        let prober = ScriptedProber::new(Duration::from_millis(10));
        let (mut scheduler, mut rx) = build_scheduler(&prober, "a", Duration::from_secs(1));
        scheduler.start();

        let (first, _) = rx.recv().await.unwrap();
        let (second, _) = rx.recv().await.unwrap();
        let (third, _) = rx.recv().await.unwrap();
        let one_second = Duration::from_millis(990)..=Duration::from_millis(1010);
        assert!(one_second.contains(&(second - first)));
        assert!(one_second.contains(&(third - second)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_noop_when_running() {
        let prober = ScriptedProber::new(Duration::from_millis(10));
        let (mut scheduler, _rx) = build_scheduler(&prober, "a", Duration::from_secs(10));

        scheduler.start();
        let generation = scheduler.generation();
        scheduler.start();
        assert_eq!(scheduler.generation(), generation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_outcome() {
        let prober = ScriptedProber::new(Duration::from_millis(500));
        let (mut scheduler, mut rx) = build_scheduler(&prober, "a", Duration::from_secs(10));

        scheduler.start();
        sleep(Duration::from_millis(100)).await;
        assert!(scheduler.probe_in_flight());
        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);
        assert!(!scheduler.probe_in_flight());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_idle_is_safe() {
        let prober = ScriptedProber::new(Duration::from_millis(10));
        let (mut scheduler, _rx) = build_scheduler(&prober, "a", Duration::from_secs(1));
        scheduler.stop();
        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let prober = ScriptedProber::new(Duration::from_millis(10));
        let (mut scheduler, mut rx) = build_scheduler(&prober, "a", Duration::from_secs(10));

        scheduler.start();
        assert_eq!(next_target(&mut rx).await, "a");
        scheduler.stop();
        scheduler.start();
        assert_eq!(next_target(&mut rx).await, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_skips_ticks_without_overlap() {
        let prober = ScriptedProber::new(Duration::from_millis(250));
        let (mut scheduler, mut rx) = build_scheduler(&prober, "a", Duration::from_millis(100));

        scheduler.start();
        sleep(Duration::from_millis(1000)).await;
        scheduler.stop();

        let mut delivered = 0;
        while rx.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(prober.max_active.load(Ordering::SeqCst), 1);
        assert!(prober.calls.load(Ordering::SeqCst) <= 4);
        assert!((2..=4).contains(&delivered), "delivered {delivered}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_target_applies_to_next_tick() {
        let prober = ScriptedProber::new(Duration::from_millis(10));
        let (mut scheduler, mut rx) = build_scheduler(&prober, "a", Duration::from_secs(10));

        scheduler.start();
        assert_eq!(next_target(&mut rx).await, "a");

        scheduler.reconfigure(probe_config("b"));
        assert!(scheduler.is_running());
        assert_eq!(scheduler.probe_config().target.as_str(), "b");
        assert_eq!(next_target(&mut rx).await, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_mid_flight_drops_stale_outcome() {
        let prober = ScriptedProber::new(Duration::from_millis(500));
        let (mut scheduler, mut rx) = build_scheduler(&prober, "a", Duration::from_secs(10));

        scheduler.start();
        sleep(Duration::from_millis(100)).await;
        assert!(scheduler.probe_in_flight());
        scheduler.reconfigure(probe_config("b"));

        assert_eq!(next_target(&mut rx).await, "b");
        assert_eq!(prober.max_active.load(Ordering::SeqCst), 1);

        // The running call kept its own snapshot; only later calls saw "b".
        let pair = |target: &str| (target.to_string(), target.to_string());
        assert_eq!(prober.seen(), [pair("a"), pair("b")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retarget_launches_when_stale_call_finishes() {
        let prober = ScriptedProber::new(Duration::from_millis(500));
        let (mut scheduler, mut rx) = build_scheduler(&prober, "a", Duration::from_secs(10));

        scheduler.start();
        sleep(Duration::from_millis(100)).await;
        let reconfigured = Instant::now();
        scheduler.reconfigure(probe_config("b"));

        let (delivered_at, outcome) = rx.recv().await.unwrap();
        assert_eq!(outcome, ProbeOutcome::failed("b"));
        // Stale call ends 400ms later, the new one takes another 500ms.
        let waited = delivered_at - reconfigured;
        assert!(waited >= Duration::from_millis(900), "delivered after {waited:?}");
        assert!(waited < Duration::from_secs(2), "delivered after {waited:?}");
        assert_eq!(prober.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_interval() {
        let prober = ScriptedProber::new(Duration::from_millis(10));
        let (mut scheduler, mut rx) = build_scheduler(&prober, "a", Duration::from_secs(60));

        scheduler.start();
        rx.recv().await.unwrap();

        scheduler.reconfigure(schedule(Duration::from_millis(200)));
        assert_eq!(scheduler.schedule().interval(), Duration::from_millis(200));

        let started = Instant::now();
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_while_idle_stays_idle() {
        let prober = ScriptedProber::new(Duration::from_millis(10));
        let (mut scheduler, mut rx) = build_scheduler(&prober, "a", Duration::from_secs(1));

        scheduler.reconfigure(probe_config("b"));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());

        scheduler.start();
        assert_eq!(next_target(&mut rx).await, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_now() {
        let prober = ScriptedProber::new(Duration::from_millis(100));
        let (scheduler, mut rx) = build_scheduler(&prober, "a", Duration::from_secs(10));

        assert!(scheduler.refresh_now());
        assert!(!scheduler.refresh_now());
        assert_eq!(next_target(&mut rx).await, "a");
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_can_refresh_from_delivery() {
        type SchedulerCell = Arc<OnceLock<Scheduler<Arc<ScriptedProber>>>>;

        let prober = ScriptedProber::new(Duration::from_millis(10));
        let cell: SchedulerCell = Arc::new(OnceLock::new());
        let handle = Arc::clone(&cell);
        let deliveries = AtomicUsize::new(0);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let scheduler = Scheduler::new(
            Arc::clone(&prober),
            probe_config("a"),
            schedule(Duration::from_secs(60)),
            move |outcome| {
                let scheduler = handle.get().expect("scheduler installed");
                let first = deliveries.fetch_add(1, Ordering::SeqCst) == 0;
                let refreshed = first && scheduler.generation() == 0 && scheduler.refresh_now();
                let _ = tx.send((outcome, refreshed));
            },
        );
        cell.set(scheduler).unwrap();
        assert!(cell.get().unwrap().refresh_now());

        let wait = Duration::from_secs(5);
        let first = timeout(wait, rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, (ProbeOutcome::failed("a"), true));
        let second = timeout(wait, rx.recv()).await.unwrap().unwrap();
        assert_eq!(second, (ProbeOutcome::failed("a"), false));
        assert_eq!(prober.calls.load(Ordering::SeqCst), 2);
    }
}
