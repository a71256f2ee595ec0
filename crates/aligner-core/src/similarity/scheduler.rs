//! Background similarity scoring.
//!
//! The interactive side builds [`ScoringJob`]s from immutable snapshots and
//! hands them to a dedicated worker pool. Each finished job writes its
//! result into the shared cache (last write wins) and publishes a
//! [`ScoreUpdate`] on a channel the interactive side drains at its leisure.
//! Jobs are never cancelled; a result computed from stale params simply gets
//! overwritten by a later one. Cached results keep the signature they were
//! computed from, so readers can tell a stale score from a current one.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{debug, warn};

use crate::error::Result;
use crate::params::{AlignmentParams, ParamsSignature, Quad};

use super::{compute_for_params, SimilarityConfig, SimilarityResult};

type ScoreCache = Arc<Mutex<HashMap<PathBuf, (ParamsSignature, SimilarityResult)>>>;

/// Everything a worker needs, detached from the session.
#[derive(Clone, Debug)]
pub struct ScoringJob {
    pub path: PathBuf,
    pub base: Arc<RgbImage>,
    pub moving: Arc<RgbImage>,
    pub params: AlignmentParams,
    pub default_quad: Quad,
}

impl ScoringJob {
    pub fn signature(&self) -> ParamsSignature {
        self.params.signature(&self.default_quad)
    }
}

#[derive(Clone, Debug)]
pub struct ScoreUpdate {
    pub path: PathBuf,
    pub result: SimilarityResult,
    /// Params the result was computed from.
    pub signature: ParamsSignature,
}

pub struct SimilarityScheduler {
    pool: rayon::ThreadPool,
    config: Arc<SimilarityConfig>,
    cache: ScoreCache,
    in_flight: Arc<AtomicUsize>,
    tx: Sender<ScoreUpdate>,
    rx: Receiver<ScoreUpdate>,
}

impl SimilarityScheduler {
    /// Pool with one worker fewer than the available cores (at least one).
    pub fn new(config: SimilarityConfig) -> Result<Self> {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_threads(config, cores.saturating_sub(1).max(1))
    }

    pub fn with_threads(config: SimilarityConfig, threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("aligner-score-{i}"))
            .build()?;
        let (tx, rx) = mpsc::channel();
        debug!(threads = pool.current_num_threads(), "Similarity pool started");
        Ok(Self {
            pool,
            config: Arc::new(config),
            cache: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            tx,
            rx,
        })
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// Queue one job. Errors inside the job produce the zero result.
    pub fn submit(&self, job: ScoringJob) {
        let config = Arc::clone(&self.config);
        let cache = Arc::clone(&self.cache);
        let in_flight = Arc::clone(&self.in_flight);
        let tx = self.tx.clone();
        let guard = InFlight::enter(in_flight);

        self.pool.spawn(move || {
            let started = Instant::now();
            let signature = job.signature();
            let result = score_or_zero(&job.path, || {
                compute_for_params(
                    &job.base,
                    &job.moving,
                    &job.params,
                    &job.default_quad,
                    &config,
                )
            });
            debug!(
                path = %job.path.display(),
                score = result.score,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Scored"
            );

            lock(&cache).insert(job.path.clone(), (signature, result));
            drop(guard);
            let _ = tx.send(ScoreUpdate {
                path: job.path,
                result,
                signature,
            });
        });
    }

    /// Queue every job, e.g. the whole source set after a load.
    pub fn schedule_all(&self, jobs: impl IntoIterator<Item = ScoringJob>) -> usize {
        let mut n = 0;
        for job in jobs {
            self.submit(job);
            n += 1;
        }
        debug!(count = n, "Scheduled similarity for all images");
        n
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<ScoreUpdate> {
        match self.rx.recv_timeout(timeout) {
            Ok(update) => Some(update),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Every update finished since the last drain, without blocking.
    pub fn drain(&self) -> Vec<ScoreUpdate> {
        self.rx.try_iter().collect()
    }

    /// Latest result for `path`, whatever params it was computed from.
    pub fn cached(&self, path: &Path) -> Option<SimilarityResult> {
        lock(&self.cache).get(path).map(|(_, result)| *result)
    }

    /// Latest result for `path` only if it was computed from `signature`.
    pub fn cached_for(&self, path: &Path, signature: ParamsSignature) -> Option<SimilarityResult> {
        lock(&self.cache)
            .get(path)
            .filter(|(sig, _)| *sig == signature)
            .map(|(_, result)| *result)
    }

    /// Drop every cached result (base reload).
    pub fn clear(&self) {
        lock(&self.cache).clear();
    }
}

/// Counts a queued job until dropped, including when the job unwinds.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Run one scoring computation; errors and panics both yield the zero result.
fn score_or_zero(
    path: &Path,
    compute: impl FnOnce() -> Result<SimilarityResult>,
) -> SimilarityResult {
    match panic::catch_unwind(AssertUnwindSafe(compute)) {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            warn!(path = %path.display(), error = %e, "Scoring failed");
            SimilarityResult::zero()
        }
        Err(_) => {
            warn!(path = %path.display(), "Scoring panicked");
            SimilarityResult::zero()
        }
    }
}

/// Cache writes are single inserts, so a poisoned lock still holds a usable map.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Interval-gated change detector for the current image's params.
///
/// Polled from the interactive loop; fires at most once per interval and
/// only when the (path, signature) pair differs from the last one fired.
#[derive(Clone, Debug)]
pub struct Debouncer {
    interval: Duration,
    last_poll: Option<Instant>,
    last_fired: Option<(PathBuf, ParamsSignature)>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_poll: None,
            last_fired: None,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// True when a new scoring job should be submitted.
    pub fn poll(&mut self, now: Instant, path: &Path, signature: ParamsSignature) -> bool {
        if let Some(last) = self.last_poll {
            if now.duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_poll = Some(now);

        let unchanged = self
            .last_fired
            .as_ref()
            .is_some_and(|(p, s)| p == path && *s == signature);
        if unchanged {
            return false;
        }
        self.last_fired = Some((path.to_path_buf(), signature));
        true
    }

    /// Forget the last signature, e.g. when the current image changes.
    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}
