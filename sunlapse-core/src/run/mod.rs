//! Run controller: lock, disk gate, scheduler, encoder, retention, report.

pub mod disk;
pub mod lock;
pub mod report;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use sunlapse_config::Config;
use sunlapse_model::{FrameStatus, Manifest, RunPhase, RunState};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::encode::{EncodeReport, EncoderOrchestrator, select_frames};
use crate::error::PipelineError;
use crate::fetch::SourceFetcher;
use crate::planner;
use crate::registry::DuplicateRegistry;
use crate::run::lock::LockState;
use crate::scheduler::{Scheduler, SchedulerOutcome};
use crate::store::FrameStore;

/// Final disposition of a production pass, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Fatal,
    NoFrames,
    PartialErrors,
    Busy,
    InsufficientDisk,
    Interrupted,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::Fatal => 1,
            RunOutcome::NoFrames => 2,
            RunOutcome::PartialErrors => 3,
            RunOutcome::Busy => 4,
            RunOutcome::InsufficientDisk => 5,
            RunOutcome::Interrupted => 130,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::Fatal => "fatal",
            RunOutcome::NoFrames => "no-frames",
            RunOutcome::PartialErrors => "partial-errors",
            RunOutcome::Busy => "busy",
            RunOutcome::InsufficientDisk => "insufficient-disk",
            RunOutcome::Interrupted => "interrupted",
        }
    }
}

pub struct RunController {
    config: Arc<Config>,
    fetcher: Arc<dyn SourceFetcher>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("base_dir", &self.config.storage.base_dir)
            .finish_non_exhaustive()
    }
}

impl RunController {
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<dyn SourceFetcher>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            fetcher,
            cancel,
        }
    }

    /// Execute one full production pass and return its outcome. The text
    /// report is printed to stdout; `health.json` mirrors it on disk.
    pub async fn execute(&self) -> RunOutcome {
        let started = Instant::now();
        let store = Arc::new(FrameStore::new(&self.config.storage));

        if let Err(err) = store.ensure_layout().await {
            error!("cannot create base layout: {err}");
            return RunOutcome::Fatal;
        }

        // Step 1: exclusive lock.
        let guard = match lock::acquire(
            &self.config.storage.lock_path(),
            self.config.storage.lock_stale_after(),
        )
        .await
        {
            Ok(LockState::Acquired(guard)) => guard,
            Ok(LockState::Busy(info)) => {
                error!(
                    pid = info.pid,
                    started_at = %info.started_at,
                    "another run holds the lock"
                );
                return RunOutcome::Busy;
            }
            Err(err) => {
                error!("lock acquisition failed: {err}");
                return RunOutcome::Fatal;
            }
        };

        // Step 2: disk floor.
        if let Err(err) = disk::check_floor(
            &self.config.storage.base_dir,
            self.config.storage.min_free_bytes,
        ) {
            error!("{err}");
            guard.release().await;
            return RunOutcome::InsufficientDisk;
        }

        let outcome = self.produce(&store, started).await;
        guard.release().await;
        outcome
    }

    /// Steps 3..7: everything that happens under the lock.
    async fn produce(
        &self,
        store: &Arc<FrameStore>,
        started: Instant,
    ) -> RunOutcome {
        let now = Utc::now();

        // Step 3: load persisted state, plan the window, rebuild the
        // derived registry.
        let manifest = store.load_manifest().await;
        let window = planner::plan_window(now, &self.config.window);
        let registry =
            Arc::new(DuplicateRegistry::rebuild(&manifest, &window));
        let manifest = Arc::new(Mutex::new(manifest));
        let state = Arc::new(Mutex::new(RunState::begin(now)));

        info!(
            frames = window.len(),
            start = %window.first().map(|i| i.key()).unwrap_or_default(),
            end = %window.last().map(|i| i.key()).unwrap_or_default(),
            "window planned"
        );

        // Step 4: the fetch/composite pipeline.
        let scheduler = Arc::new(Scheduler::new(
            self.fetcher.clone(),
            registry,
            store.clone(),
            manifest.clone(),
            state.clone(),
            self.config.clone(),
            self.cancel.clone(),
        ));

        let scheduler_outcome = match scheduler.run(&window).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("scheduler failed: {err}");
                let outcome = RunOutcome::from(&err);
                self.finish(store, &state, &[], outcome, started).await;
                return outcome;
            }
        };

        if scheduler_outcome == SchedulerOutcome::Interrupted {
            let outcome = RunOutcome::Interrupted;
            {
                let mut state = state.lock().await;
                state.phase = RunPhase::Interrupted;
            }
            self.finish(store, &state, &[], outcome, started).await;
            return outcome;
        }

        // Step 5: renditions, only when the window produced anything.
        let succeeded = {
            let manifest = manifest.lock().await;
            window
                .iter()
                .filter(|instant| {
                    manifest
                        .get(instant)
                        .map(|record| {
                            record.status == FrameStatus::Success
                        })
                        .unwrap_or(false)
                })
                .count()
        };

        if succeeded == 0 {
            warn!("no successful frames in window, skipping encode");
            let outcome = RunOutcome::NoFrames;
            self.finish(store, &state, &[], outcome, started).await;
            return outcome;
        }

        let (encodes, encoder_fatal) =
            self.encode_all(store, &manifest, &window, &state).await;
        if encoder_fatal {
            let outcome = RunOutcome::Fatal;
            self.finish(store, &state, &encodes, outcome, started).await;
            return outcome;
        }

        // Step 6: retention.
        self.retention(store, &manifest, &state, now).await;

        // Step 7: final report.
        let outcome = {
            let mut state = state.lock().await;
            state.phase = RunPhase::Complete;
            if state.failure_ratio_exceeds(10) {
                RunOutcome::PartialErrors
            } else {
                RunOutcome::Success
            }
        };
        self.finish(store, &state, &encodes, outcome, started).await;
        outcome
    }

    /// Encode every configured rendition; per-rendition failures are
    /// recorded and do not stop the others. A missing encoder binary is
    /// fatal.
    async fn encode_all(
        &self,
        store: &Arc<FrameStore>,
        manifest: &Arc<Mutex<Manifest>>,
        window: &[sunlapse_model::TargetInstant],
        state: &Arc<Mutex<RunState>>,
    ) -> (Vec<EncodeReport>, bool) {
        {
            let mut state = state.lock().await;
            state.phase = RunPhase::Encoding;
        }

        let orchestrator = EncoderOrchestrator::new(
            self.config.encode.clone(),
            store.videos_root().to_path_buf(),
            self.config.storage.scratch_dir(),
        );

        if let Err(err) = orchestrator.ensure_encoder().await {
            error!("encoder unusable: {err}");
            let mut state = state.lock().await;
            state.record_error(err.kind_label());
            return (Vec::new(), true);
        }

        let run_date = Utc::now().date_naive();
        let mut encodes = Vec::new();

        for rendition in &self.config.encode.renditions {
            let selection = {
                let manifest = manifest.lock().await;
                select_frames(
                    &manifest,
                    window,
                    rendition,
                    self.config.encode.fps,
                )
            };

            match orchestrator
                .encode_rendition(&selection, rendition, run_date)
                .await
            {
                Ok(report) => {
                    info!(
                        rendition = %report.rendition,
                        output = %report.output.display(),
                        "rendition encoded"
                    );
                    encodes.push(report);
                }
                Err(err) => {
                    error!(
                        rendition = %rendition.name,
                        "rendition failed: {err}"
                    );
                    let mut state = state.lock().await;
                    state.record_error(err.kind_label());
                }
            }
        }

        (encodes, false)
    }

    async fn retention(
        &self,
        store: &Arc<FrameStore>,
        manifest: &Arc<Mutex<Manifest>>,
        state: &Arc<Mutex<RunState>>,
        now: chrono::DateTime<Utc>,
    ) {
        {
            let mut state = state.lock().await;
            state.phase = RunPhase::Retention;
        }

        let window_start = planner::window_start(now, &self.config.window);
        let frame_cutoff = (window_start
            - chrono::Duration::days(i64::from(
                self.config.pipeline.frame_retention_grace_days,
            )))
        .date_naive();
        let video_cutoff = (now
            - chrono::Duration::days(i64::from(
                self.config.pipeline.video_retention_days,
            )))
        .date_naive();

        let frames_removed = store.sweep_frames(frame_cutoff).await;
        let videos_removed = store.sweep_videos(video_cutoff).await;

        let pruned = {
            let mut manifest = manifest.lock().await;
            let pruned = manifest.prune_before(
                frame_cutoff
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight exists")
                    .and_utc(),
            );
            if pruned > 0
                && let Err(err) = store.save_manifest(&manifest).await
            {
                warn!("failed to persist pruned manifest: {err}");
            }
            pruned
        };

        info!(
            frames_removed,
            videos_removed, pruned, "retention sweep complete"
        );
    }

    /// Flush everything, print the report, write the health snapshot.
    async fn finish(
        &self,
        store: &Arc<FrameStore>,
        state: &Arc<Mutex<RunState>>,
        encodes: &[EncodeReport],
        outcome: RunOutcome,
        started: Instant,
    ) {
        let runtime = started.elapsed();
        let state = state.lock().await;

        if let Err(err) = store.save_state(&state).await {
            warn!("failed to flush run state: {err}");
        }

        let snapshot = report::snapshot(&state, encodes, outcome, runtime);
        if let Err(err) = store.save_health(&snapshot).await {
            warn!("failed to write health snapshot: {err}");
        }

        print!("{}", report::render(&state, encodes, outcome, runtime));
    }
}

impl From<&PipelineError> for RunOutcome {
    fn from(err: &PipelineError) -> Self {
        match err {
            PipelineError::LockBusy { .. } => RunOutcome::Busy,
            PipelineError::DiskFull { .. } => RunOutcome::InsufficientDisk,
            PipelineError::Interrupted => RunOutcome::Interrupted,
            _ => RunOutcome::Fatal,
        }
    }
}
