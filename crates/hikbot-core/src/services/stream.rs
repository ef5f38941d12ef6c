// ── Stream services ──
//
// One ffmpeg process per configured livestream (YouTube, Telegram,
// Icecast, SRS, DVR). A supervisor task polls the process once a
// second and restarts it when it dies or outlives its restart period.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Child;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Service, ServiceState, ServiceType};
use crate::config::{RestartPeriod, StreamConfig, StreamKind};
use crate::error::CoreError;
use crate::ffmpeg;
use crate::notifier::AlarmNotifier;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const SUPERVISOR_RETRY_DELAY: Duration = Duration::from_secs(1);
const STOP_GRACE: Duration = Duration::from_secs(10);

struct SupervisorRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct StreamInner {
    cam_id: String,
    kind: StreamKind,
    name: String,
    enabled: bool,
    restart_period: RestartPeriod,
    restart_pause: Duration,
    command: String,
    state: watch::Sender<ServiceState>,
    start_ts: watch::Sender<Option<Instant>>,
    process: Mutex<Option<Child>>,
    supervisor: Mutex<Option<SupervisorRun>>,
    restarts: AtomicU32,
    notices: Option<Arc<AlarmNotifier>>,
    failing: AtomicBool,
}

/// A supervised ffmpeg stream. Cheap to clone.
#[derive(Clone)]
pub struct StreamService {
    inner: Arc<StreamInner>,
}

impl StreamService {
    /// Build a service running `command` (a full `sh` command line).
    ///
    /// Unexpected process exits are announced through `notices`, once
    /// per run of consecutive failures.
    pub fn new(
        cam_id: impl Into<String>,
        config: &StreamConfig,
        command: String,
        notices: Option<Arc<AlarmNotifier>>,
    ) -> Self {
        let kind = config.output.kind();
        let (state, _) = watch::channel(ServiceState::Stopped);
        let (start_ts, _) = watch::channel(None);
        Self {
            inner: Arc::new(StreamInner {
                cam_id: cam_id.into(),
                kind,
                name: kind.to_string(),
                enabled: config.enabled,
                restart_period: config.restart_period,
                restart_pause: config.restart_pause,
                command,
                state,
                start_ts,
                process: Mutex::new(None),
                supervisor: Mutex::new(None),
                restarts: AtomicU32::new(0),
                notices,
                failing: AtomicBool::new(false),
            }),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.inner.kind
    }

    /// When the current process was launched.
    pub fn start_ts(&self) -> Option<Instant> {
        *self.inner.start_ts.borrow()
    }

    /// Restarts performed by the supervisor since construction.
    pub fn restart_count(&self) -> u32 {
        self.inner.restarts.load(Ordering::Relaxed)
    }

    /// Whether the process has outlived its restart period.
    pub fn need_restart(&self) -> bool {
        self.start_ts()
            .is_some_and(|started| self.inner.restart_period.is_due(started, Instant::now()))
    }

    /// Whether a supervisor task is watching the process.
    pub async fn supervised(&self) -> bool {
        self.inner
            .supervisor
            .lock()
            .await
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    /// Whether the process is still running.
    pub async fn alive(&self) -> bool {
        match self.inner.process.lock().await.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Launch the process.
    ///
    /// With `skip_check` the started state is not claimed and no
    /// supervisor is spawned: the process is relaunched only while the
    /// service is still started.
    pub async fn start_with(&self, skip_check: bool) -> Result<(), CoreError> {
        if skip_check {
            self.relaunch().await?;
            return Ok(());
        }
        self.launch().await?;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(supervise_stream(self.clone(), cancel.clone()));
        *self.inner.supervisor.lock().await = Some(SupervisorRun { cancel, handle });
        Ok(())
    }

    /// Stop the process; with `disable` the service also leaves the started state.
    pub async fn stop_with(&self, disable: bool) -> Result<(), CoreError> {
        let inner = &self.inner;
        if !self.started() {
            return Err(CoreError::runtime(format!(
                "{} stream on {} already stopped",
                inner.kind, inner.cam_id
            )));
        }

        if disable {
            inner.state.send_replace(ServiceState::Stopped);
            if let Some(run) = inner.supervisor.lock().await.take() {
                run.cancel.cancel();
            }
        }

        let child = inner.process.lock().await.take();
        if let Some(mut child) = child {
            info!(cam = %inner.cam_id, service = %inner.name, "stopping ffmpeg");
            ffmpeg::terminate(&mut child, STOP_GRACE).await?;
        }
        Ok(())
    }

    /// Stop, wait `restart_pause`, start again while staying started.
    ///
    /// Bound to the current supervisor run: a stop during the pause
    /// cancels the relaunch.
    pub async fn restart(&self) -> Result<(), CoreError> {
        let run = match self.inner.supervisor.lock().await.as_ref() {
            Some(run) => run.cancel.clone(),
            None => CancellationToken::new(),
        };
        self.restart_within(&run).await?;
        Ok(())
    }

    /// Returns whether a new process was launched.
    async fn restart_within(&self, run: &CancellationToken) -> Result<bool, CoreError> {
        let inner = &self.inner;
        self.stop_with(false).await?;
        tokio::select! {
            biased;
            () = run.cancelled() => return Ok(false),
            () = tokio::time::sleep(inner.restart_pause) => {}
        }
        if run.is_cancelled() || !self.relaunch().await? {
            debug!(cam = %inner.cam_id, service = %inner.name, "stopped during restart, not relaunching");
            return Ok(false);
        }
        let restarts = inner.restarts.fetch_add(1, Ordering::Relaxed) + 1;
        info!(cam = %inner.cam_id, service = %inner.name, restarts, "stream restarted");
        Ok(true)
    }

    /// One supervisor poll for the run behind `run`. Returns whether the
    /// stream was restarted.
    pub(crate) async fn check(&self, run: &CancellationToken) -> Result<bool, CoreError> {
        let inner = &self.inner;
        if self.need_restart() {
            info!(cam = %inner.cam_id, service = %inner.name, "restart period reached");
        } else if self.alive().await {
            inner.failing.store(false, Ordering::Relaxed);
            return Ok(false);
        } else {
            warn!(cam = %inner.cam_id, service = %inner.name, "ffmpeg exited unexpectedly");
            if !inner.failing.swap(true, Ordering::Relaxed) {
                if let Some(notices) = &inner.notices {
                    notices.broadcast(format!(
                        "{} stream on {} stopped unexpectedly, restarting",
                        inner.kind, inner.cam_id
                    ));
                }
            }
        }
        self.restart_within(run).await
    }

    /// Claim the started state and spawn the process, without a supervisor.
    async fn launch(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        let claimed = inner.state.send_if_modified(|state| {
            if *state == ServiceState::Stopped {
                *state = ServiceState::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(CoreError::runtime(format!(
                "{} stream on {} already started",
                inner.kind, inner.cam_id
            )));
        }

        if let Err(e) = self.spawn_process().await {
            inner.state.send_replace(ServiceState::Stopped);
            return Err(e);
        }
        inner.state.send_replace(ServiceState::Started);
        Ok(())
    }

    /// Spawn a fresh process for a service that stays started. Returns
    /// `false` when the service was stopped in the meantime.
    async fn relaunch(&self) -> Result<bool, CoreError> {
        if !self.started() {
            return Ok(false);
        }
        self.spawn_process().await?;
        Ok(true)
    }

    async fn spawn_process(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        let mut child = ffmpeg::spawn_shell(&inner.command)?;
        if let Some(stdout) = child.stdout.take() {
            ffmpeg::drain_output(inner.cam_id.clone(), inner.name.clone(), stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            ffmpeg::drain_output(inner.cam_id.clone(), inner.name.clone(), stderr);
        }
        info!(cam = %inner.cam_id, service = %inner.name, pid = ?child.id(), "ffmpeg started");

        *inner.process.lock().await = Some(child);
        inner.start_ts.send_replace(Some(Instant::now()));
        Ok(())
    }
}

#[async_trait]
impl Service for StreamService {
    fn service_type(&self) -> ServiceType {
        ServiceType::Stream
    }

    fn name(&self) -> &str {
        &self.inner.name
    }

    fn state(&self) -> ServiceState {
        *self.inner.state.borrow()
    }

    fn enabled_in_conf(&self) -> bool {
        self.inner.enabled
    }

    async fn start(&self) -> Result<(), CoreError> {
        self.start_with(false).await
    }

    async fn stop(&self) -> Result<(), CoreError> {
        self.stop_with(true).await
    }
}

// ── Supervisor task ──────────────────────────────────────────────────

async fn supervise_stream(service: StreamService, cancel: CancellationToken) {
    let (cam_id, name) = (service.inner.cam_id.clone(), service.inner.name.clone());
    debug!(cam = %cam_id, service = %name, "stream supervisor running");
    loop {
        match poll_stream(&service, &cancel).await {
            Ok(()) => break,
            Err(e) => {
                error!(
                    cam = %cam_id,
                    task = "stream_supervisor",
                    service = %name,
                    error = %e,
                    "stream supervision failed, retrying"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(SUPERVISOR_RETRY_DELAY) => {}
                }
            }
        }
    }
    debug!(cam = %cam_id, service = %name, "stream supervisor exited");
}

async fn poll_stream(service: &StreamService, cancel: &CancellationToken) -> Result<(), CoreError> {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            _ = interval.tick() => {}
        }
        if !service.started() {
            return Ok(());
        }
        service.check(cancel).await?;
    }
}
