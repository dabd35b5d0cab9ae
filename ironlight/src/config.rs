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

use serde::Deserialize;
use serde::Serialize;

use crate::errors::ConfigError;

pub const MAX_WORKERS: usize = 1024;

/// Worker pool configuration shared by dataset construction and mining.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Nonces hashed between two checks of the cancellation generation.
    pub poll_interval: u32,
    /// Nonces hashed between two progress reports of a worker.
    pub progress_interval: u32,
}

impl Default for MinerConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            workers,
            poll_interval: 1,
            progress_interval: 64,
        }
    }
}

impl MinerConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_workers(self.workers)?;
        if self.poll_interval == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }

        Ok(())
    }
}

pub(crate) fn validate_workers(workers: usize) -> Result<(), ConfigError> {
    if workers == 0 || workers > MAX_WORKERS {
        return Err(ConfigError::InvalidWorkerCount {
            workers,
            max: MAX_WORKERS,
        });
    }

    Ok(())
}

/// Splits `start..start + count` into `workers` contiguous ranges in order.
/// The last range also takes the remainder.
pub(crate) fn partition(start: u64, count: u64, workers: usize) -> Vec<Range<u64>> {
    let workers = workers as u64;
    let per_worker = count / workers;
    let remainder = count % workers;

    (0..workers)
        .map(|worker| {
            let begin = start + per_worker * worker;
            let mut end = begin + per_worker;
            if worker == workers - 1 {
                end += remainder;
            }
            begin..end
        })
        .collect()
}

/// Raises `halt` when the owning worker unwinds, so its siblings stop at
/// their next check instead of finishing their ranges.
pub(crate) struct HaltOnPanic<'a> {
    halt: &'a AtomicBool,
}

impl<'a> HaltOnPanic<'a> {
    pub(crate) fn new(halt: &'a AtomicBool) -> Self {
        Self { halt }
    }
}

impl Drop for HaltOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.halt.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(MinerConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            MinerConfig::with_workers(0).validate(),
            Err(ConfigError::InvalidWorkerCount {
                workers: 0,
                max: MAX_WORKERS
            })
        );

        let config = MinerConfig {
            poll_interval: 0,
            ..MinerConfig::with_workers(2)
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPollInterval));
    }

    #[test]
    fn partition_covers_range_in_order() {
        let ranges = partition(10, 11, 3);
        assert_eq!(ranges, vec![10..13, 13..16, 16..21]);

        let ranges = partition(0, 2, 4);
        assert_eq!(ranges, vec![0..0, 0..0, 0..0, 0..2]);
    }

    #[test]
    fn halt_is_raised_only_on_unwind() {
        let halt = AtomicBool::new(false);
        drop(HaltOnPanic::new(&halt));
        assert!(!halt.load(Ordering::Acquire));

        std::thread::scope(|scope| {
            let result = scope
                .spawn(|| {
                    let _guard = HaltOnPanic::new(&halt);
                    panic!("worker crashed");
                })
                .join();
            assert!(result.is_err());
        });
        assert!(halt.load(Ordering::Acquire));
    }

    #[test]
    fn partial_config_is_completed_with_defaults() {
        let config: MinerConfig = serde_json::from_str(r#"{"workers": 3}"#).unwrap();

        assert_eq!(config.workers, 3);
        assert_eq!(config.poll_interval, 1);
        assert_eq!(config.progress_interval, 64);
    }
}
