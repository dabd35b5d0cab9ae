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

use std::ops::RangeInclusive;

use ironlight_types::Progress;
use ironlight_types::ResultHash;

use crate::cache::Cache;
use crate::cache::CacheHandle;
use crate::cache::CacheRawAPI;
use crate::config::MinerConfig;
use crate::dataset::Dataset;
use crate::dataset::DatasetHandle;
use crate::errors::ConfigError;
use crate::flags::Mode;
use crate::flags::RandomXFlags;
use crate::miner::CancelToken;
use crate::miner::HashAlgorithm;
use crate::miner::MineOutcome;
use crate::miner::Miner;
use crate::miner::MiningJob;
use crate::miner::Share;
use crate::template::BlockTemplate;
use crate::vm::RandomXVM;
use crate::RResult;

/// Everything derived from one key: the cache and, in full mode, the dataset.
/// Contexts are independent of each other.
#[derive(Debug)]
pub struct RandomXContext {
    flags: RandomXFlags,
    cache: Cache,
    dataset: Option<Dataset>,
    miner_config: MinerConfig,
}

/// Builds a context for `key` with one worker per available core.
pub fn initialize_context(key: &[u8], mode: Mode) -> RResult<RandomXContext> {
    let workers = MinerConfig::default().workers;
    RandomXContext::with_options(key, mode.into(), workers, &mut |_| {})
}

/// Hashes `input` with a fresh VM of `context`.
pub fn compute_hash(context: &RandomXContext, input: &[u8]) -> RResult<ResultHash> {
    let mut vm = context.create_vm()?;
    Ok(vm.hash(input))
}

impl RandomXContext {
    /// Builds the cache and, with `FULL_MEM`, the dataset on `workers` threads.
    pub fn with_options(
        key: &[u8],
        flags: RandomXFlags,
        workers: usize,
        progress: &mut dyn FnMut(Progress),
    ) -> RResult<Self> {
        let miner_config = MinerConfig::with_workers(workers);
        miner_config.validate()?;

        let cache = Cache::with_progress(key, flags, progress)?;
        let dataset = if flags.is_fast_mode() {
            Some(Dataset::with_progress(&cache, workers, progress)?)
        } else {
            None
        };

        Ok(Self {
            flags,
            cache,
            dataset,
            miner_config,
        })
    }

    pub fn with_miner_config(mut self, config: MinerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.miner_config = config;
        Ok(self)
    }

    pub fn key(&self) -> &[u8] {
        self.cache.raw().key()
    }

    pub fn flags(&self) -> RandomXFlags {
        self.flags
    }

    pub fn mode(&self) -> Mode {
        if self.flags.is_fast_mode() {
            Mode::Full
        } else {
            Mode::Light
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn miner_config(&self) -> &MinerConfig {
        &self.miner_config
    }

    /// A VM sharing this context's memory, with its own scratchpad.
    pub fn create_vm(&self) -> RResult<ContextVm> {
        match &self.dataset {
            Some(dataset) => RandomXVM::fast(dataset.handle(), self.flags).map(ContextVm::Full),
            None => RandomXVM::light(self.cache.handle(), self.flags).map(ContextVm::Light),
        }
    }

    /// Searches `nonces` for the lowest nonce whose hash meets `difficulty`.
    /// The job belongs to the current generation of `cancel`; advancing it
    /// makes the search return `Cancelled`.
    pub fn mine(
        &self,
        template: &BlockTemplate,
        nonces: RangeInclusive<u32>,
        difficulty: u128,
        on_share: &mut dyn FnMut(&Share),
        on_progress: &mut dyn FnMut(Progress),
        cancel: &CancelToken,
    ) -> RResult<MineOutcome> {
        let job = MiningJob::new(template.clone(), nonces, difficulty, cancel.current())?;
        let miner = Miner::new(self.miner_config.clone())?;

        miner.mine(&job, |_| self.create_vm(), cancel, on_share, on_progress)
    }
}

/// A VM of either mode, as handed to mining workers.
#[derive(Debug)]
pub enum ContextVm {
    Light(RandomXVM<CacheHandle>),
    Full(RandomXVM<DatasetHandle>),
}

impl ContextVm {
    pub fn hash(&mut self, input: &[u8]) -> ResultHash {
        match self {
            ContextVm::Light(vm) => vm.hash(input),
            ContextVm::Full(vm) => vm.hash(input),
        }
    }
}

impl HashAlgorithm for ContextVm {
    fn name(&self) -> &str {
        match self {
            ContextVm::Light(_) => "randomx-light",
            ContextVm::Full(_) => "randomx-full",
        }
    }

    fn hash(&mut self, input: &[u8]) -> ResultHash {
        ContextVm::hash(self, input)
    }
}
