//! Per-unit online/offline tracking
//!
//! Each unit is a two-state machine, `Online` at its first observation:
//!
//! ```text
//!            sweep: silent > timeout
//!   Online ──────────────────────────► Offline (alertSent = true, dispatch once)
//!     ▲                                   │
//!     └───────────────────────────────────┘
//!        observe(), or sweep sees recent data (alertSent cleared)
//! ```
//!
//! `observe` is driven by message arrival; `sweep` by the [`SweepHandle`] timer or
//! directly by tests. A unit's state change and the publish of its `LivenessChange`
//! happen under one emission guard, so subscribers see a unit's transitions in the
//! order they were applied. The guard is reentrant: handlers may call back into the
//! monitor. The state lock itself is never held while publishing, and alert dispatch
//! is spawned after the sweep has published.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::alerts::{AlertDispatcher, DispatchOutcome, NotificationAttempt};
use crate::broadcast::EventBroadcaster;
use crate::clock::Clock;
use crate::config::LivenessConfig;
use crate::events::{BroadcastEvent, LivenessChange};

#[derive(Debug, Clone, PartialEq)]
pub struct LivenessState {
    pub unit_id: String,
    pub last_data_time: DateTime<Utc>,
    pub is_online: bool,
    pub alert_sent: bool,
    pub last_lat: Option<f64>,
    pub last_lon: Option<f64>,
}

impl LivenessState {
    fn new(unit_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            unit_id: unit_id.to_string(),
            last_data_time: now,
            is_online: true,
            alert_sent: false,
            last_lat: None,
            last_lon: None,
        }
    }

    fn status(&self, now: DateTime<Utc>) -> UnitStatus {
        UnitStatus {
            is_online: self.is_online,
            last_data_time: self.last_data_time,
            offline_duration: now - self.last_data_time,
            alert_sent: self.alert_sent,
        }
    }

    fn change(&self, offline_duration: TimeDelta) -> BroadcastEvent {
        BroadcastEvent::LivenessChange(LivenessChange {
            unit_id: self.unit_id.clone(),
            is_online: self.is_online,
            offline_duration,
            alert_sent: self.alert_sent,
        })
    }
}

/// Status of one unit, or the fleet aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitStatus {
    pub is_online: bool,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_data_time: DateTime<Utc>,

    #[serde(serialize_with = "crate::util::delta_millis::serialize")]
    pub offline_duration: TimeDelta,

    pub alert_sent: bool,
}

impl UnitStatus {
    /// Reported for units that were never observed
    fn unseen(now: DateTime<Utc>) -> Self {
        Self {
            is_online: true,
            last_data_time: now,
            offline_duration: TimeDelta::zero(),
            alert_sent: false,
        }
    }
}

/// What one sweep changed
#[derive(Debug, Default)]
pub struct SweepReport {
    pub went_offline: Vec<String>,
    pub recovered: Vec<String>,

    /// In-flight alert dispatches started by this sweep
    pub dispatches: Vec<JoinHandle<DispatchOutcome>>,
}

impl SweepReport {
    /// Wait for every dispatch this sweep started.
    pub async fn outcomes(self) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::with_capacity(self.dispatches.len());
        for dispatch in self.dispatches {
            match dispatch.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!("alert dispatch task failed: {e}"),
            }
        }
        outcomes
    }
}

pub struct LivenessMonitor {
    timeout: TimeDelta,
    sweep_interval: Duration,
    clock: Arc<dyn Clock>,
    dispatcher: Arc<AlertDispatcher>,
    broadcaster: EventBroadcaster,
    units: Mutex<BTreeMap<String, LivenessState>>,
    emission: ReentrantMutex<()>,
}

enum Transition {
    WentOffline(Option<NotificationAttempt>),
    Recovered,
}

impl LivenessMonitor {
    pub fn new(
        config: &LivenessConfig,
        clock: Arc<dyn Clock>,
        dispatcher: Arc<AlertDispatcher>,
        broadcaster: EventBroadcaster,
    ) -> Self {
        Self {
            timeout: config.timeout(),
            sweep_interval: config.sweep_interval(),
            clock,
            dispatcher,
            broadcaster,
            units: Mutex::new(BTreeMap::new()),
            emission: ReentrantMutex::new(()),
        }
    }

    /// Record that `unit_id` just reported. Never dispatches an alert.
    pub fn observe(&self, unit_id: &str, lat: Option<f64>, lon: Option<f64>) {
        let _emission = self.emission.lock();
        let now = self.clock.now();

        let recovery = {
            let mut units = self.units.lock();
            let state = units.entry(unit_id.to_string()).or_insert_with(|| {
                info!("tracking new unit {unit_id}");
                LivenessState::new(unit_id, now)
            });

            let was_offline = !state.is_online;
            state.last_data_time = now;
            if lat.is_some() {
                state.last_lat = lat;
            }
            if lon.is_some() {
                state.last_lon = lon;
            }
            state.is_online = true;

            was_offline.then(|| {
                state.alert_sent = false;
                state.change(TimeDelta::zero())
            })
        };

        if let Some(event) = recovery {
            info!("{unit_id} connection restored");
            self.broadcaster.publish(&event);
        }
    }

    /// Evaluate every tracked unit against the timeout.
    ///
    /// Units are evaluated and published one at a time. Alert dispatch is spawned on
    /// the current Tokio runtime and not awaited; the returned report carries the join
    /// handles.
    #[instrument(skip(self))]
    pub fn sweep(&self) -> SweepReport {
        let _emission = self.emission.lock();
        let now = self.clock.now();
        let mut report = SweepReport::default();
        let mut attempts = Vec::new();

        let unit_ids: Vec<String> = self.units.lock().keys().cloned().collect();
        for unit_id in unit_ids {
            let Some((transition, event)) = self.evaluate(&unit_id, now) else {
                continue;
            };

            // published before the next unit is evaluated, so a handler observing
            // another unit is not overtaken by a stale verdict for it
            self.broadcaster.publish(&event);

            match transition {
                Transition::WentOffline(attempt) => {
                    attempts.extend(attempt);
                    report.went_offline.push(unit_id);
                }
                Transition::Recovered => report.recovered.push(unit_id),
            }
        }

        for attempt in attempts {
            if let Some(dispatch) = self.spawn_dispatch(attempt) {
                report.dispatches.push(dispatch);
            }
        }

        trace!(
            "sweep done: {} offline, {} recovered",
            report.went_offline.len(),
            report.recovered.len()
        );
        report
    }

    fn evaluate(&self, unit_id: &str, now: DateTime<Utc>) -> Option<(Transition, BroadcastEvent)> {
        let mut units = self.units.lock();
        let state = units.get_mut(unit_id)?;
        let elapsed = now - state.last_data_time;

        if elapsed > self.timeout {
            if !state.is_online {
                return None;
            }

            warn!("{unit_id} offline, no data for {}s", elapsed.num_seconds());
            state.is_online = false;

            let attempt = (!state.alert_sent).then(|| {
                // flag first so a slow dispatch cannot be repeated by the next sweep
                state.alert_sent = true;
                NotificationAttempt {
                    unit_id: Some(state.unit_id.clone()),
                    timestamp: now,
                    last_known_lat: state.last_lat,
                    last_known_lon: state.last_lon,
                    last_data_received: state.last_data_time,
                    offline_duration: elapsed,
                }
            });

            Some((Transition::WentOffline(attempt), state.change(elapsed)))
        } else if !state.is_online {
            info!("{unit_id} online, recent data {}s ago", elapsed.num_seconds());
            state.is_online = true;
            state.alert_sent = false;
            Some((Transition::Recovered, state.change(elapsed)))
        } else {
            None
        }
    }

    fn spawn_dispatch(&self, attempt: NotificationAttempt) -> Option<JoinHandle<DispatchOutcome>> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("cannot dispatch alert for {:?} outside a runtime: {e}", attempt.unit_id);
                return None;
            }
        };

        let dispatcher = self.dispatcher.clone();
        Some(runtime.spawn(async move { dispatcher.dispatch(attempt).await }))
    }

    /// Status of one unit, or the aggregate over every tracked unit.
    pub fn status(&self, unit_id: Option<&str>) -> UnitStatus {
        let now = self.clock.now();
        let units = self.units.lock();

        if let Some(unit_id) = unit_id {
            return units
                .get(unit_id)
                .map(|state| state.status(now))
                .unwrap_or_else(|| UnitStatus::unseen(now));
        }

        let mut statuses = units.values().map(|state| state.status(now));
        let Some(first) = statuses.next() else {
            return UnitStatus::unseen(now);
        };

        statuses.fold(first, |acc, status| UnitStatus {
            is_online: acc.is_online && status.is_online,
            last_data_time: acc.last_data_time.max(status.last_data_time),
            offline_duration: acc.offline_duration.max(status.offline_duration),
            alert_sent: acc.alert_sent || status.alert_sent,
        })
    }

    /// Every tracked unit's status, sorted by unit id
    pub fn all_statuses(&self) -> BTreeMap<String, UnitStatus> {
        let now = self.clock.now();
        self.units
            .lock()
            .iter()
            .map(|(id, state)| (id.clone(), state.status(now)))
            .collect()
    }

    pub fn state(&self, unit_id: &str) -> Option<LivenessState> {
        self.units.lock().get(unit_id).cloned()
    }

    pub fn tracked_units(&self) -> usize {
        self.units.lock().len()
    }

    /// Forget every unit
    pub fn reset(&self) {
        self.units.lock().clear();
        debug!("liveness state cleared");
    }

    /// Spawn the periodic sweep on the current runtime.
    pub fn start(self: &Arc<Self>) -> SweepHandle {
        SweepHandle::spawn(self.clone(), self.sweep_interval)
    }
}

#[derive(Debug)]
enum SweepCommand {
    /// Run a sweep now, outside the timer
    SweepNow {
        respond_to: oneshot::Sender<SweepReport>,
    },

    Shutdown,
}

struct SweepActor {
    monitor: Arc<LivenessMonitor>,
    command_rx: mpsc::Receiver<SweepCommand>,
    period: Duration,
}

impl SweepActor {
    #[instrument(skip(self), fields(period_ms = self.period.as_millis() as u64))]
    async fn run(mut self) {
        debug!("starting sweep actor");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.monitor.sweep();
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SweepCommand::SweepNow { respond_to } => {
                            debug!("received SweepNow command");
                            let _ = respond_to.send(self.monitor.sweep());
                        }

                        SweepCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("sweep actor stopped");
    }
}

/// Handle for controlling the sweep actor
#[derive(Clone)]
pub struct SweepHandle {
    sender: mpsc::Sender<SweepCommand>,
}

impl SweepHandle {
    pub fn spawn(monitor: Arc<LivenessMonitor>, period: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = SweepActor {
            monitor,
            command_rx: cmd_rx,
            period,
        };
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run one sweep immediately and return what it changed.
    pub async fn sweep_now(&self) -> Result<SweepReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SweepCommand::SweepNow { respond_to: tx })
            .await
            .context("failed to send SweepNow command")?;

        rx.await.context("failed to receive sweep report")
    }

    /// Stop the actor. Stopping an already stopped actor is a no-op.
    pub async fn shutdown(&self) {
        if self.sender.send(SweepCommand::Shutdown).await.is_err() {
            trace!("sweep actor already stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}
