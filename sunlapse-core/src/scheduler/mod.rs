//! Two-stage bounded pipeline: fetch workers feed composite workers
//! through a backpressured channel.
//!
//! The fetch stage is I/O-bound and runs F workers; the composite stage is
//! CPU-bound, runs C workers, and does its pixel work on the blocking
//! pool. The handoff channel's capacity bounds how far fetching may run
//! ahead of compositing, which in turn bounds peak image-buffer memory.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use sunlapse_config::Config;
use sunlapse_model::{
    FrameRecord, FrameStatus, Manifest, RunPhase, RunState, TargetInstant,
};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::compose;
use crate::error::{PipelineError, Result};
use crate::fetch::{
    FetchError, SourceFetchReport, SourceFetcher, fetch_with_fallback,
};
use crate::registry::DuplicateRegistry;
use crate::store::FrameStore;

/// How a scheduler pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerOutcome {
    Completed,
    Interrupted,
}

struct FetchedFrame {
    instant: TargetInstant,
    corona: SourceFetchReport,
    disk: SourceFetchReport,
}

pub struct Scheduler {
    fetcher: Arc<dyn SourceFetcher>,
    registry: Arc<DuplicateRegistry>,
    store: Arc<FrameStore>,
    manifest: Arc<Mutex<Manifest>>,
    state: Arc<Mutex<RunState>>,
    config: Arc<Config>,
    cancel: CancellationToken,
    processed: AtomicUsize,
    fatal: Mutex<Option<PipelineError>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("processed", &self.processed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        registry: Arc<DuplicateRegistry>,
        store: Arc<FrameStore>,
        manifest: Arc<Mutex<Manifest>>,
        state: Arc<Mutex<RunState>>,
        config: Arc<Config>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            registry,
            store,
            manifest,
            state,
            config,
            cancel,
            processed: AtomicUsize::new(0),
            fatal: Mutex::new(None),
        }
    }

    /// Process the window to completion or cancellation. Per-frame failures
    /// are recorded and never abort the pass; only persistent storage
    /// failure surfaces as an error.
    pub async fn run(
        self: &Arc<Self>,
        window: &[TargetInstant],
    ) -> Result<SchedulerOutcome> {
        let queue = self.build_queue(window).await;
        let total = queue.len();
        info!(total, "scheduler dispatching work queue");

        let queue = Arc::new(std::sync::Mutex::new(queue));
        let fetch_workers = self.config.fetch.concurrency;
        let composite_workers = self.config.composite.concurrency;

        let (handoff_tx, handoff_rx) =
            mpsc::channel::<FetchedFrame>(fetch_workers.max(1));
        let handoff_rx = Arc::new(Mutex::new(handoff_rx));

        let mut fetch_handles = Vec::with_capacity(fetch_workers);
        for id in 0..fetch_workers {
            let scheduler = self.clone();
            let queue = queue.clone();
            let tx = handoff_tx.clone();
            fetch_handles.push(tokio::spawn(async move {
                scheduler.fetch_worker(id, queue, tx).await;
            }));
        }
        drop(handoff_tx);

        let mut composite_handles = Vec::with_capacity(composite_workers);
        for id in 0..composite_workers {
            let scheduler = self.clone();
            let rx = handoff_rx.clone();
            composite_handles.push(tokio::spawn(async move {
                scheduler.composite_worker(id, rx).await;
            }));
        }

        for handle in fetch_handles {
            let _ = handle.await;
        }
        for handle in composite_handles {
            let _ = handle.await;
        }

        // One more flush regardless of how the workers stopped.
        self.flush().await?;

        if let Some(fatal) = self.fatal.lock().await.take() {
            return Err(fatal);
        }
        if self.cancel.is_cancelled() {
            info!("scheduler interrupted, state flushed");
            return Ok(SchedulerOutcome::Interrupted);
        }
        Ok(SchedulerOutcome::Completed)
    }

    /// Classify the window into work, giving in-horizon retries precedence
    /// over first-time fetches. Both partitions stay oldest-first.
    async fn build_queue(
        self: &Arc<Self>,
        window: &[TargetInstant],
    ) -> VecDeque<TargetInstant> {
        let now = Utc::now();
        let horizon = self.config.pipeline.abandonment_horizon();

        let mut manifest = self.manifest.lock().await;
        let mut state = self.state.lock().await;
        state.phase = RunPhase::Processing;
        state.frames_planned = window.len() as u64;

        let mut retries = Vec::new();
        let mut fresh = Vec::new();

        for &instant in window {
            match manifest.frames.get_mut(&instant.key()) {
                Some(record) => match record.status {
                    FrameStatus::Success => {
                        state.frames_skipped += 1;
                    }
                    FrameStatus::Abandoned => {
                        state.frames_abandoned += 1;
                    }
                    FrameStatus::Failed => {
                        if record.past_abandonment_horizon(now, horizon) {
                            record.mark_abandoned();
                            state.frames_abandoned += 1;
                            debug!(
                                frame = %instant.key(),
                                "frame abandoned past retry horizon"
                            );
                        } else {
                            state.frames_retried += 1;
                            retries.push(instant);
                        }
                    }
                },
                None => fresh.push(instant),
            }
        }

        retries.into_iter().chain(fresh).collect()
    }

    async fn fetch_worker(
        self: Arc<Self>,
        id: usize,
        queue: Arc<std::sync::Mutex<VecDeque<TargetInstant>>>,
        tx: mpsc::Sender<FetchedFrame>,
    ) {
        debug!(worker = id, "fetch worker started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(instant) = queue.lock().expect("queue lock").pop_front()
            else {
                break;
            };

            let (corona, disk) = tokio::join!(
                fetch_with_fallback(
                    self.fetcher.as_ref(),
                    &self.registry,
                    &instant,
                    &self.config.sources.corona,
                    &self.config.fetch,
                    &self.cancel,
                ),
                fetch_with_fallback(
                    self.fetcher.as_ref(),
                    &self.registry,
                    &instant,
                    &self.config.sources.disk,
                    &self.config.fetch,
                    &self.cancel,
                ),
            );

            if tx
                .send(FetchedFrame {
                    instant,
                    corona,
                    disk,
                })
                .await
                .is_err()
            {
                break;
            }
        }
        debug!(worker = id, "fetch worker finished");
    }

    async fn composite_worker(
        self: Arc<Self>,
        id: usize,
        rx: Arc<Mutex<mpsc::Receiver<FetchedFrame>>>,
    ) {
        debug!(worker = id, "composite worker started");
        loop {
            // Finishing the current frame on cancel is deliberate; picking
            // up the next one is not.
            if self.cancel.is_cancelled() {
                break;
            }
            let frame = { rx.lock().await.recv().await };
            let Some(frame) = frame else { break };

            if let Err(err) = self.process_frame(frame).await {
                error!(worker = id, "fatal storage failure: {err}");
                *self.fatal.lock().await = Some(err);
                self.cancel.cancel();
                break;
            }
        }
        debug!(worker = id, "composite worker finished");
    }

    /// Record one fetched frame: compose on the blocking pool, persist,
    /// update the manifest. Only storage escalation returns an error.
    async fn process_frame(&self, frame: FetchedFrame) -> Result<()> {
        let now = Utc::now();
        let instant = frame.instant;
        let attempts = frame.corona.attempts.max(frame.disk.attempts).max(1);

        let failure = frame_failure(&frame);

        match failure {
            Some((kind, detail)) => {
                warn!(frame = %instant.key(), "frame failed: {detail}");
                self.record_failure(&instant, now, attempts, kind, detail)
                    .await?;
            }
            None => {
                let corona = frame
                    .corona
                    .outcome
                    .as_ref()
                    .expect("checked by frame_failure");
                let disk = frame
                    .disk
                    .outcome
                    .as_ref()
                    .expect("checked by frame_failure");

                let composite_config = self.config.composite.clone();
                let corona_bytes = corona.bytes.clone();
                let disk_bytes = disk.bytes.clone();
                let composed = tokio::task::spawn_blocking(move || {
                    compose::compose(
                        &corona_bytes,
                        &disk_bytes,
                        &composite_config,
                    )
                })
                .await
                .map_err(|err| {
                    PipelineError::Composite(format!(
                        "composite task panicked: {err}"
                    ))
                })
                .and_then(|result| result);

                match composed {
                    Ok(bytes) => {
                        let (path, size) =
                            self.store.write_frame(&instant, &bytes).await?;

                        let mut manifest = self.manifest.lock().await;
                        let record = manifest
                            .frames
                            .entry(instant.key())
                            .and_modify(|record| {
                                record.touch(now, attempts)
                            })
                            .or_insert_with(|| {
                                FrameRecord::first_attempt(now, attempts)
                            });
                        record.status = FrameStatus::Success;
                        record.last_error = None;
                        record.corona_offset = Some(corona.offset_applied);
                        record.disk_offset = Some(disk.offset_applied);
                        record.corona_fingerprint = Some(corona.fingerprint);
                        record.disk_fingerprint = Some(disk.fingerprint);
                        record.file_path =
                            Some(path.to_string_lossy().into_owned());
                        record.bytes = Some(size);
                        record.duplicate = corona.is_duplicate()
                            || disk.is_duplicate();
                        drop(manifest);

                        let mut state = self.state.lock().await;
                        state.frames_succeeded += 1;
                        for result in [&corona, &disk] {
                            if result.is_fallback() {
                                state.fallbacks_used += 1;
                            }
                        }
                        for report in [&frame.corona, &frame.disk] {
                            if report.duplicates_hit > 0
                                && report
                                    .outcome
                                    .as_ref()
                                    .map(|result| !result.is_duplicate())
                                    .unwrap_or(false)
                            {
                                state.duplicates_resolved += 1;
                            }
                        }
                        if corona.is_duplicate() || disk.is_duplicate() {
                            state.record_error("duplicate-exhausted");
                        }
                        drop(state);
                    }
                    Err(err) => {
                        warn!(
                            frame = %instant.key(),
                            "composite failed: {err}"
                        );
                        self.record_failure(
                            &instant,
                            now,
                            attempts,
                            err.kind_label(),
                            err.to_string(),
                        )
                        .await?;
                    }
                }
            }
        }

        self.checkpoint().await
    }

    async fn record_failure(
        &self,
        instant: &TargetInstant,
        now: chrono::DateTime<Utc>,
        attempts: u32,
        kind: &str,
        detail: String,
    ) -> Result<()> {
        let mut manifest = self.manifest.lock().await;
        let record = manifest
            .frames
            .entry(instant.key())
            .and_modify(|record| record.touch(now, attempts))
            .or_insert_with(|| FrameRecord::first_attempt(now, attempts));
        record.mark_failed(detail);
        drop(manifest);

        let mut state = self.state.lock().await;
        state.frames_failed += 1;
        state.record_error(kind);
        Ok(())
    }

    async fn checkpoint(&self) -> Result<()> {
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        if processed % self.config.pipeline.checkpoint_every != 0 {
            return Ok(());
        }
        debug!(processed, "checkpoint flush");
        self.flush().await
    }

    /// Persist manifest and run state atomically; the registry is derived
    /// from the manifest and needs no separate snapshot.
    pub async fn flush(&self) -> Result<()> {
        {
            let manifest = self.manifest.lock().await;
            self.store.save_manifest(&manifest).await?;
        }
        let state = self.state.lock().await;
        self.store.save_state(&state).await?;
        Ok(())
    }
}

/// Map a frame's two fetch reports to a single failure, if any.
fn frame_failure(frame: &FetchedFrame) -> Option<(&'static str, String)> {
    let mut parts = Vec::new();
    let mut kind = None;
    for (label, report) in
        [("corona", &frame.corona), ("disk", &frame.disk)]
    {
        if let Err(err) = &report.outcome {
            parts.push(format!("{label}: {err}"));
            // First failing source decides the aggregated kind.
            kind.get_or_insert(fetch_error_kind(err));
        }
    }
    kind.map(|kind| (kind, parts.join("; ")))
}

fn fetch_error_kind(err: &FetchError) -> &'static str {
    match err {
        FetchError::Unavailable(_) | FetchError::Timeout(_) => "unavailable",
        FetchError::InvalidImage(_) => "invalid-image",
    }
}
