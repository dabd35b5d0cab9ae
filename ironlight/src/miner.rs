/*
 * Copyright 2024 Fluence Labs Limited
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::ops::Range;
use std::ops::RangeInclusive;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::bounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::SendTimeoutError;
use crossbeam_channel::Sender;
use ironlight_types::Progress;
use ironlight_types::ResultHash;
use ironlight_types::Stage;
use serde::Deserialize;
use serde::Serialize;

use crate::config::partition;
use crate::config::HaltOnPanic;
use crate::config::MinerConfig;
use crate::errors::ConfigError;
use crate::errors::RandomXError;
use crate::template::BlockTemplate;
use crate::RResult;

const JOB_QUEUE_CAPACITY: usize = 4;
const SHARE_SEND_TIMEOUT: Duration = Duration::from_millis(10);

/// A hash function a mining worker runs nonce after nonce. Each worker owns
/// its instance.
pub trait HashAlgorithm {
    fn name(&self) -> &str;

    fn hash(&mut self, input: &[u8]) -> ResultHash;
}

/// Shared job generation. Advancing it supersedes every job started with an
/// older generation; workers notice within `poll_interval` hashes.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    generation: Arc<AtomicU64>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Starts a new generation and returns it.
    pub fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MiningJob {
    pub template: BlockTemplate,
    pub nonces: RangeInclusive<u32>,
    pub difficulty: u128,
    pub generation: u64,
}

impl MiningJob {
    pub fn new(
        template: BlockTemplate,
        nonces: RangeInclusive<u32>,
        difficulty: u128,
        generation: u64,
    ) -> Result<Self, ConfigError> {
        if difficulty == 0 {
            return Err(ConfigError::ZeroDifficulty);
        }
        if nonces.is_empty() {
            return Err(ConfigError::EmptyNonceRange {
                start: *nonces.start(),
                end: *nonces.end(),
            });
        }

        Ok(Self {
            template,
            nonces,
            difficulty,
            generation,
        })
    }

    pub fn nonce_count(&self) -> u64 {
        *self.nonces.end() as u64 - *self.nonces.start() as u64 + 1
    }
}

/// A nonce whose hash meets the job difficulty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub nonce: u32,
    pub hash: ResultHash,
    pub generation: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MineOutcome {
    Found(Share),
    Exhausted,
    Cancelled,
}

enum WorkerEvent {
    Hashed(u64),
    Found(Share),
    Failed(usize, RandomXError),
}

/// One-shot parallel search for the lowest valid nonce of a job.
#[derive(Clone, Debug)]
pub struct Miner {
    config: MinerConfig,
}

impl Miner {
    pub fn new(config: MinerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Splits the job nonces into one contiguous range per worker. Every worker
    /// builds its hasher with `hasher_factory(worker)` and scans its range
    /// upwards. The reported share is the lowest valid nonce of the whole job,
    /// whatever the worker count. Callbacks run on the calling thread.
    pub fn mine<H, F>(
        &self,
        job: &MiningJob,
        hasher_factory: F,
        cancel: &CancelToken,
        on_share: &mut dyn FnMut(&Share),
        on_progress: &mut dyn FnMut(Progress),
    ) -> RResult<MineOutcome>
    where
        H: HashAlgorithm,
        F: Fn(usize) -> RResult<H> + Sync,
    {
        let workers = self.config.workers;
        let total = job.nonce_count();
        let ranges = partition(*job.nonces.start() as u64, total, workers);
        tracing::debug!(workers, total, generation = job.generation, "mining job started");

        let lowest = AtomicU64::new(u64::MAX);
        let halt = AtomicBool::new(false);
        let (sender, receiver) = bounded::<WorkerEvent>(workers * 2);

        let scan = ScanContext {
            job,
            cancel,
            lowest: &lowest,
            halt: &halt,
            poll_interval: self.config.poll_interval as u64,
            progress_interval: self.config.progress_interval.max(1) as u64,
        };
        let hasher_factory = &hasher_factory;

        let (best, failure) = std::thread::scope(|scope| {
            let handles: Vec<_> = ranges
                .into_iter()
                .enumerate()
                .map(|(worker, range)| {
                    let sender = sender.clone();
                    let scan = &scan;
                    scope.spawn(move || {
                        let _guard = HaltOnPanic::new(scan.halt);
                        match hasher_factory(worker) {
                            Ok(mut hasher) => scan.run(worker, range, &mut hasher, &sender),
                            Err(error) => {
                                let _ = sender.send(WorkerEvent::Failed(worker, error));
                            }
                        }
                    })
                })
                .collect();
            drop(sender);

            let mut best: Option<Share> = None;
            let mut failure = None;
            let mut hashed = 0;
            for event in receiver.iter() {
                match event {
                    WorkerEvent::Hashed(count) => {
                        hashed += count;
                        on_progress(Progress::new(
                            Stage::Mining,
                            hashed,
                            total,
                            format!("{hashed}/{total} nonces"),
                        ));
                    }
                    WorkerEvent::Found(share) => {
                        if best.as_ref().map_or(true, |best| share.nonce < best.nonce) {
                            best = Some(share);
                        }
                    }
                    WorkerEvent::Failed(worker, error) => {
                        tracing::warn!(worker, %error, "mining worker failed");
                        halt.store(true, Ordering::Release);
                        failure.get_or_insert(error);
                    }
                }
            }

            for (worker, handle) in handles.into_iter().enumerate() {
                if handle.join().is_err() {
                    tracing::warn!(worker, "mining worker panicked");
                    failure.get_or_insert(RandomXError::WorkerFailed {
                        worker,
                        stage: "mining",
                    });
                }
            }

            (best, failure)
        });

        if let Some(error) = failure {
            return Err(error);
        }

        if !cancel.is_current(job.generation) {
            if let Some(share) = best {
                tracing::debug!(nonce = share.nonce, generation = share.generation, "discarding stale share");
            }
            return Ok(MineOutcome::Cancelled);
        }

        match best {
            Some(share) => {
                tracing::info!(nonce = share.nonce, hash = %share.hash, "share found");
                on_share(&share);
                Ok(MineOutcome::Found(share))
            }
            None => Ok(MineOutcome::Exhausted),
        }
    }
}

struct ScanContext<'a> {
    job: &'a MiningJob,
    cancel: &'a CancelToken,
    lowest: &'a AtomicU64,
    halt: &'a AtomicBool,
    poll_interval: u64,
    progress_interval: u64,
}

impl ScanContext<'_> {
    fn run(
        &self,
        worker: usize,
        range: Range<u64>,
        hasher: &mut impl HashAlgorithm,
        events: &Sender<WorkerEvent>,
    ) {
        let mut blob = self.job.template.blob().to_vec();
        let offset = self.job.template.nonce_offset();
        let mut pending = 0;

        for (done, nonce) in range.enumerate() {
            if done as u64 % self.poll_interval == 0
                && (self.halt.load(Ordering::Acquire) || !self.cancel.is_current(self.job.generation))
            {
                break;
            }
            // a lower valid nonce is already known
            if nonce > self.lowest.load(Ordering::Acquire) {
                break;
            }

            let nonce = nonce as u32;
            blob[offset..offset + 4].copy_from_slice(&nonce.to_le_bytes());
            let hash = hasher.hash(&blob);
            pending += 1;

            if hash.meets_difficulty(self.job.difficulty) {
                self.lowest.fetch_min(nonce as u64, Ordering::AcqRel);
                tracing::debug!(worker, nonce, "worker found share");
                let share = Share {
                    nonce,
                    hash,
                    generation: self.job.generation,
                };
                let _ = events.send(WorkerEvent::Found(share));
                break;
            }

            if pending == self.progress_interval {
                let _ = events.send(WorkerEvent::Hashed(pending));
                pending = 0;
            }
        }

        if pending > 0 {
            let _ = events.send(WorkerEvent::Hashed(pending));
        }
        tracing::debug!(worker, hasher = hasher.name(), "mining worker finished");
    }
}

struct EngineJob {
    template: BlockTemplate,
    nonces: Range<u64>,
    difficulty: u128,
    generation: u64,
}

/// Long running worker pool. Jobs are split across the workers, every valid
/// nonce is reported as a share, and a new job supersedes the previous one.
pub struct MiningEngine {
    queues: Vec<Sender<EngineJob>>,
    shares: Receiver<Share>,
    cancel: CancelToken,
    hash_count: Arc<AtomicU64>,
    handles: Vec<JoinHandle<()>>,
}

impl MiningEngine {
    /// Builds one hasher per worker on the calling thread, then starts the
    /// workers.
    pub fn start<H, F>(config: MinerConfig, hasher_factory: F) -> RResult<Self>
    where
        H: HashAlgorithm + Send + 'static,
        F: Fn(usize) -> RResult<H>,
    {
        config.validate()?;

        let hashers = (0..config.workers)
            .map(&hasher_factory)
            .collect::<RResult<Vec<H>>>()?;

        let cancel = CancelToken::new();
        let hash_count = Arc::new(AtomicU64::new(0));
        let (share_sender, shares) = bounded(config.workers * 2);

        let mut queues = Vec::with_capacity(config.workers);
        let mut handles = Vec::with_capacity(config.workers);
        for (worker, hasher) in hashers.into_iter().enumerate() {
            let (queue, jobs) = bounded(JOB_QUEUE_CAPACITY);
            let worker_state = EngineWorker {
                worker,
                jobs,
                shares: share_sender.clone(),
                cancel: cancel.clone(),
                hash_count: hash_count.clone(),
                poll_interval: config.poll_interval as u64,
            };

            let handle = std::thread::Builder::new()
                .name(format!("ironlight-miner-{worker}"))
                .spawn(move || worker_state.run(hasher))
                .map_err(|_| RandomXError::WorkerFailed {
                    worker,
                    stage: "spawn",
                })?;

            queues.push(queue);
            handles.push(handle);
        }
        tracing::info!(workers = config.workers, "mining engine started");

        Ok(Self {
            queues,
            shares,
            cancel,
            hash_count,
            handles,
        })
    }

    /// Supersedes the running job and distributes `nonces` over the workers.
    /// Returns the generation of the new job.
    pub fn submit_job(
        &self,
        template: BlockTemplate,
        nonces: RangeInclusive<u32>,
        difficulty: u128,
    ) -> RResult<u64> {
        // a rejected job leaves the running one alone
        let mut job = MiningJob::new(template, nonces, difficulty, self.cancel.current())?;
        let generation = self.cancel.advance();
        job.generation = generation;
        let ranges = partition(*job.nonces.start() as u64, job.nonce_count(), self.queues.len());

        for (worker, (queue, nonces)) in self.queues.iter().zip(ranges).enumerate() {
            let job = EngineJob {
                template: job.template.clone(),
                nonces,
                difficulty,
                generation,
            };
            if queue.send(job).is_err() {
                return Err(RandomXError::WorkerFailed {
                    worker,
                    stage: "mining",
                });
            }
        }

        tracing::debug!(generation, "job submitted");
        Ok(generation)
    }

    /// Next share of the current job, shares of superseded jobs are dropped.
    pub fn try_recv_share(&self) -> Option<Share> {
        while let Ok(share) = self.shares.try_recv() {
            if self.cancel.is_current(share.generation) {
                return Some(share);
            }
            tracing::debug!(nonce = share.nonce, generation = share.generation, "discarding stale share");
        }

        None
    }

    /// Blocking form of [`Self::try_recv_share`].
    pub fn recv_share_timeout(&self, timeout: Duration) -> Option<Share> {
        let deadline = std::time::Instant::now() + timeout;
        while let Ok(share) = self.shares.recv_deadline(deadline) {
            if self.cancel.is_current(share.generation) {
                return Some(share);
            }
            tracing::debug!(nonce = share.nonce, generation = share.generation, "discarding stale share");
        }

        None
    }

    pub fn hash_count(&self) -> u64 {
        self.hash_count.load(Ordering::Relaxed)
    }

    pub fn generation(&self) -> u64 {
        self.cancel.current()
    }

    /// Stops the workers and waits for them.
    pub fn stop(&mut self) -> RResult<()> {
        self.cancel.advance();
        self.queues.clear();

        let mut failure = None;
        for (worker, handle) in self.handles.drain(..).enumerate() {
            if handle.join().is_err() {
                tracing::warn!(worker, "mining worker panicked");
                failure.get_or_insert(RandomXError::WorkerFailed {
                    worker,
                    stage: "mining",
                });
            }
        }
        tracing::info!(hashes = self.hash_count(), "mining engine stopped");

        failure.map_or(Ok(()), Err)
    }
}

impl Drop for MiningEngine {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            let _ = self.stop();
        }
    }
}

struct EngineWorker {
    worker: usize,
    jobs: Receiver<EngineJob>,
    shares: Sender<Share>,
    cancel: CancelToken,
    hash_count: Arc<AtomicU64>,
    poll_interval: u64,
}

impl EngineWorker {
    fn run(self, mut hasher: impl HashAlgorithm) {
        tracing::debug!(worker = self.worker, hasher = hasher.name(), "engine worker started");

        for job in self.jobs.iter() {
            if !self.cancel.is_current(job.generation) {
                continue;
            }
            self.mine(&job, &mut hasher);
        }

        tracing::debug!(worker = self.worker, "engine worker stopped");
    }

    fn mine(&self, job: &EngineJob, hasher: &mut impl HashAlgorithm) {
        let mut blob = job.template.blob().to_vec();
        let offset = job.template.nonce_offset();

        for (done, nonce) in job.nonces.clone().enumerate() {
            if done as u64 % self.poll_interval == 0 && !self.cancel.is_current(job.generation) {
                return;
            }

            let nonce = nonce as u32;
            blob[offset..offset + 4].copy_from_slice(&nonce.to_le_bytes());
            let hash = hasher.hash(&blob);
            self.hash_count.fetch_add(1, Ordering::Relaxed);

            if hash.meets_difficulty(job.difficulty) {
                let share = Share {
                    nonce,
                    hash,
                    generation: job.generation,
                };
                if !self.publish(share) {
                    return;
                }
            }
        }
    }

    /// Returns false once the job is superseded or the engine is gone.
    fn publish(&self, mut share: Share) -> bool {
        loop {
            match self.shares.send_timeout(share, SHARE_SEND_TIMEOUT) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(pending)) => {
                    if !self.cancel.is_current(pending.generation) {
                        return false;
                    }
                    share = pending;
                }
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }
}
