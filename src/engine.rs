//! Core detection-and-switch loop.
//!
//! [`SyncEngine::tick`] runs one poll cycle: sample the active identity,
//! debounce against the last observation, and on a transition look up the
//! mapped context and tell the player to switch. [`Monitor`] drives ticks
//! on a fixed cadence from a worker thread and owns the engine's life
//! between `start` and `stop`.

use log::{debug, error, info, warn};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::api_client::{ApiClient, ApiError};
use crate::mapping::MappingTable;
use crate::sampler::ActivitySampler;

/// Repeated auth failures get an ERROR line on the first and then every
/// Nth occurrence; the ones in between log at debug so a revoked token
/// cannot flood the journal.
const AUTH_ALERT_EVERY: u32 = 10;

fn should_alert(failures: u32) -> bool {
    failures == 1 || failures % AUTH_ALERT_EVERY == 0
}

/// The outbound side of the engine: something that can switch playback.
pub trait ContextPlayer {
    fn play_context(&mut self, context: &str) -> Result<(), ApiError>;
}

impl ContextPlayer for ApiClient {
    fn play_context(&mut self, context: &str) -> Result<(), ApiError> {
        ApiClient::play_context(self, context)
    }
}

pub struct SyncEngine {
    sampler: Box<dyn ActivitySampler + Send>,
    player: Box<dyn ContextPlayer + Send>,
    mappings: MappingTable,
    fallback_context: Option<String>,
    last_identity: String,
    auth_failures: u32,
}

impl SyncEngine {
    pub fn new(
        sampler: Box<dyn ActivitySampler + Send>,
        player: Box<dyn ContextPlayer + Send>,
        mappings: MappingTable,
        fallback_context: Option<String>,
    ) -> Self {
        Self {
            sampler,
            player,
            mappings,
            fallback_context,
            last_identity: String::new(),
            auth_failures: 0,
        }
    }

    pub fn last_identity(&self) -> &str {
        &self.last_identity
    }

    pub fn mappings(&self) -> &MappingTable {
        &self.mappings
    }

    pub fn mappings_mut(&mut self) -> &mut MappingTable {
        &mut self.mappings
    }

    /// Forget the last observation so the next tick treats whatever it
    /// sees as a fresh transition.
    pub fn reset(&mut self) {
        self.last_identity.clear();
        self.auth_failures = 0;
    }

    /// One poll cycle. Never fails: a failed probe skips the tick, and a
    /// failed switch is logged and absorbed so polling carries on.
    pub fn tick(&mut self) {
        let identity = match self.sampler.sample() {
            Ok(identity) => identity,
            Err(e) => {
                debug!("no observation this tick: {e}");
                return;
            }
        };

        if identity == self.last_identity {
            return;
        }
        debug!(
            "active identity changed: {:?} -> {:?}",
            self.last_identity, identity
        );
        // Record the transition before the outbound call so a slow or
        // failing API can never make the same transition fire twice.
        self.last_identity = identity.clone();

        let (context, label) = match self.mappings.lookup(&identity) {
            Some(entry) => {
                let label = if entry.display_name.is_empty() {
                    entry.match_key.clone()
                } else {
                    entry.display_name.clone()
                };
                (entry.context.clone(), label)
            }
            None => match &self.fallback_context {
                Some(context) => {
                    debug!("no mapping for {identity:?}, using the fallback context");
                    (context.clone(), String::from("fallback"))
                }
                None => {
                    debug!("no mapping for {identity:?}, leaving playback alone");
                    return;
                }
            },
        };

        info!("switching playback to \"{label}\" for {identity:?}");
        match self.player.play_context(&context) {
            Ok(()) => {
                self.auth_failures = 0;
            }
            Err(ApiError::Auth(e)) => {
                self.auth_failures += 1;
                if should_alert(self.auth_failures) {
                    error!(
                        "playback switch not authorized ({} in a row): {e}; \
                         re-run the authorization flow if this keeps happening",
                        self.auth_failures
                    );
                } else {
                    debug!("playback switch not authorized again: {e}");
                }
            }
            Err(e) => {
                warn!("playback switch failed: {e}");
            }
        }
    }
}

struct Worker {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<SyncEngine>,
}

/// Drives [`SyncEngine::tick`] on a fixed cadence from a worker thread.
///
/// `start` and `stop` are idempotent and at most one worker exists at a
/// time. The engine moves into the worker while polling and comes back on
/// `stop`.
pub struct Monitor {
    poll_interval: Duration,
    engine: Option<SyncEngine>,
    worker: Option<Worker>,
}

impl Monitor {
    pub fn new(engine: SyncEngine, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            engine: Some(engine),
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Begin polling. The first tick runs immediately rather than one
    /// interval in. Restarting after `stop` resets the debounce state, so
    /// the first observation after a restart always counts as a
    /// transition.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            debug!("monitor already running");
            return;
        }
        let Some(mut engine) = self.engine.take() else {
            error!("monitor cannot start: engine was lost to a worker panic");
            return;
        };
        engine.reset();

        let interval = self.poll_interval;
        let (shutdown, signal) = mpsc::channel::<()>();
        info!("watching for application changes every {interval:?}");
        let handle = thread::spawn(move || {
            engine.tick();
            loop {
                match signal.recv_timeout(interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => engine.tick(),
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
            engine
        });
        self.worker = Some(Worker { shutdown, handle });
    }

    /// Stop polling and reclaim the engine. No-op when already stopped.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.shutdown.send(());
        match worker.handle.join() {
            Ok(engine) => {
                info!("monitoring stopped");
                self.engine = Some(engine);
            }
            Err(_) => error!("poll worker panicked; monitor cannot be restarted"),
        }
    }

    /// Consume the monitor, stopping the worker if one is running.
    pub fn into_engine(mut self) -> Option<SyncEngine> {
        self.stop();
        self.engine.take()
    }
}
