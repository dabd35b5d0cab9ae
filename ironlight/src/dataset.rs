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
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::bounded;
use ironlight_types::Progress;
use ironlight_types::Stage;

use crate::cache::CacheRawAPI;
use crate::config::partition;
use crate::config::HaltOnPanic;
use crate::config::validate_workers;
use crate::constants::DATASET_ITEM_COUNT;
use crate::constants::REGISTER_COUNT;
use crate::constants::RANDOMX_DATASET_ITEM_SIZE;
use crate::errors::RandomXError;
use crate::RResult;

/// Items a worker computes between two progress messages.
const PROGRESS_STEP: u64 = 1 << 14;

/// Fully expanded dataset, `DATASET_ITEM_COUNT` items of eight words.
pub struct RawDataset {
    items: Vec<u64>,
}

impl std::fmt::Debug for RawDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDataset")
            .field("items", &self.item_count())
            .finish()
    }
}

#[derive(Debug)]
pub struct Dataset {
    inner: Arc<RawDataset>,
}

/// Contains a Dataset handle, can't be created from scratch,
/// only obtained from already existing Dataset.
#[derive(Clone, Debug)]
pub struct DatasetHandle {
    inner: Arc<RawDataset>,
}

impl Dataset {
    pub fn new(cache: &impl CacheRawAPI, workers: usize) -> RResult<Self> {
        Self::with_progress(cache, workers, &mut |_| {})
    }

    /// Expands the whole dataset on `workers` threads. `progress` runs on the
    /// calling thread.
    pub fn with_progress(
        cache: &impl CacheRawAPI,
        workers: usize,
        progress: &mut dyn FnMut(Progress),
    ) -> RResult<Self> {
        let cache = cache.raw();
        let started = Instant::now();
        tracing::info!(workers, items = DATASET_ITEM_COUNT, "building dataset");

        let items = build_items(DATASET_ITEM_COUNT, workers, progress, |item| {
            cache.init_dataset_item(item)
        })?;

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "dataset ready"
        );
        Ok(Self {
            inner: Arc::new(RawDataset { items }),
        })
    }

    /// Computes the items of `range` on the calling thread, eight words per
    /// item.
    pub fn init_items(cache: &impl CacheRawAPI, range: Range<u64>) -> Vec<u64> {
        let cache = cache.raw();
        range.flat_map(|item| cache.init_dataset_item(item)).collect()
    }

    #[cfg(test)]
    pub(crate) fn from_items(items: Vec<u64>) -> Self {
        Self {
            inner: Arc::new(RawDataset { items }),
        }
    }

    pub fn handle(&self) -> DatasetHandle {
        DatasetHandle {
            inner: self.inner.clone(),
        }
    }
}

impl RawDataset {
    pub fn item_count(&self) -> u64 {
        (self.items.len() / REGISTER_COUNT) as u64
    }

    pub fn item(&self, item_number: u64) -> &[u64] {
        let offset = item_number as usize * REGISTER_COUNT;
        &self.items[offset..offset + REGISTER_COUNT]
    }
}

pub trait DatasetRawAPI {
    fn raw(&self) -> &RawDataset;
}

impl DatasetRawAPI for Dataset {
    fn raw(&self) -> &RawDataset {
        &self.inner
    }
}

impl DatasetRawAPI for DatasetHandle {
    fn raw(&self) -> &RawDataset {
        &self.inner
    }
}

/// Computes `item_count` items on `workers` scoped threads, each writing its
/// own contiguous slice. Progress increments travel over a channel to the
/// calling thread, which aggregates them. A panicking worker stops the others
/// after their current batch.
pub(crate) fn build_items<F>(
    item_count: u64,
    workers: usize,
    progress: &mut dyn FnMut(Progress),
    init_item: F,
) -> RResult<Vec<u64>>
where
    F: Fn(u64) -> [u64; REGISTER_COUNT] + Sync,
{
    validate_workers(workers)?;

    let words = item_count as usize * REGISTER_COUNT;
    let mut items = Vec::new();
    items
        .try_reserve_exact(words)
        .map_err(|_| RandomXError::DatasetAllocationError {
            size: item_count as usize * RANDOMX_DATASET_ITEM_SIZE as usize,
        })?;
    items.resize(words, 0);

    let (sender, receiver) = bounded::<u64>(workers * 2);
    let init_item = &init_item;
    let halt = &AtomicBool::new(false);

    std::thread::scope(|scope| {
        let mut rest = items.as_mut_slice();
        let mut handles = Vec::with_capacity(workers);

        for (worker, range) in partition(0, item_count, workers).into_iter().enumerate() {
            let len = (range.end - range.start) as usize * REGISTER_COUNT;
            let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(len);
            rest = tail;
            let sender = sender.clone();

            tracing::debug!(worker, start = range.start, end = range.end, "dataset worker started");
            handles.push(scope.spawn(move || {
                let _guard = HaltOnPanic::new(halt);
                let mut pending = 0;
                for (item, words) in range.zip(chunk.chunks_exact_mut(REGISTER_COUNT)) {
                    words.copy_from_slice(&init_item(item));
                    pending += 1;
                    if pending == PROGRESS_STEP {
                        let _ = sender.send(pending);
                        pending = 0;
                        if halt.load(Ordering::Acquire) {
                            tracing::debug!(worker, "dataset worker halted");
                            break;
                        }
                    }
                }
                if pending > 0 {
                    let _ = sender.send(pending);
                }
            }));
        }
        drop(sender);

        let mut completed = 0;
        for done in receiver.iter() {
            completed += done;
            progress(Progress::new(
                Stage::Dataset,
                completed,
                item_count,
                format!("{completed}/{item_count} items"),
            ));
        }

        let mut failure = None;
        for (worker, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                tracing::warn!(worker, "dataset worker panicked");
                failure.get_or_insert(RandomXError::WorkerFailed {
                    worker,
                    stage: "dataset",
                });
            }
        }
        failure.map_or(Ok(()), Err)
    })?;

    Ok(items)
}
