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

use std::sync::Arc;
use std::time::Instant;

use ironlight_types::Progress;
use ironlight_types::Stage;

use crate::argon2;
use crate::argon2::Argon2Params;
use crate::argon2::Block;
use crate::argon2::ARGON2_BLOCK_WORDS;
use crate::constants::CACHE_LINE_COUNT;
use crate::constants::REGISTER_COUNT;
use crate::flags::RandomXFlags;
use crate::superscalar::ProgramSet;
use crate::RResult;

const SUPERSCALAR_MUL0: u64 = 6364136223846793005;
const SUPERSCALAR_ADD: [u64; REGISTER_COUNT - 1] = [
    9298411001130361340,
    12065312585734608966,
    9306329213124626780,
    5281919268842080866,
    10536153434571861004,
    3398623926847679864,
    9549104520008361294,
];

const LINES_PER_BLOCK: u64 = (ARGON2_BLOCK_WORDS / REGISTER_COUNT) as u64;

/// Argon2d memory and superscalar programs of one key. Read-only once built.
pub struct RawCache {
    key: Vec<u8>,
    memory: Vec<Block>,
    programs: ProgramSet,
}

#[derive(Debug)]
pub struct Cache {
    inner: Arc<RawCache>,
}

/// Contains a Cache handle, can't be created from scratch,
/// only obtained from already existing Cache.
#[derive(Clone, Debug)]
pub struct CacheHandle {
    inner: Arc<RawCache>,
}

impl Cache {
    /// Builds the cache for `key`.
    pub fn new(key: &[u8], flags: RandomXFlags) -> RResult<Self> {
        Self::with_progress(key, flags, &mut |_| {})
    }

    /// Builds the cache for `key`, reporting Argon2d slices and then program
    /// generation.
    pub fn with_progress(
        key: &[u8],
        flags: RandomXFlags,
        progress: &mut dyn FnMut(Progress),
    ) -> RResult<Self> {
        let started = Instant::now();
        tracing::info!(?flags, key = %hex::encode(key), "building cache");

        let params = Argon2Params::randomx();
        let memory = argon2::fill_memory(key, &params, &mut |done, total| {
            progress(Progress::new(
                Stage::Cache,
                done as u64,
                total as u64,
                format!("argon2d slice {done}/{total}"),
            ))
        })?;

        let programs = ProgramSet::generate(key);
        progress(Progress::new(
            Stage::Programs,
            1,
            1,
            format!("{} superscalar programs", programs.programs().len()),
        ));

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            reciprocals = programs.reciprocals().len(),
            "cache ready"
        );

        let inner = RawCache {
            key: key.to_vec(),
            memory,
            programs,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn handle(&self) -> CacheHandle {
        CacheHandle {
            inner: self.inner.clone(),
        }
    }
}

impl RawCache {
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn programs(&self) -> &ProgramSet {
        &self.programs
    }

    /// Number of 64-bit words, `2^25` for the default parameters.
    pub fn word_count(&self) -> usize {
        self.memory.len() * ARGON2_BLOCK_WORDS
    }

    pub fn word(&self, index: usize) -> u64 {
        self.memory[index / ARGON2_BLOCK_WORDS].words()[index % ARGON2_BLOCK_WORDS]
    }

    /// The 64-byte cache line `line`, as eight words.
    pub fn line(&self, line: u64) -> &[u64] {
        let block = &self.memory[(line / LINES_PER_BLOCK) as usize];
        let offset = (line % LINES_PER_BLOCK) as usize * REGISTER_COUNT;
        &block.words()[offset..offset + REGISTER_COUNT]
    }

    /// Computes dataset item `item_number` from the cache lines picked by the
    /// superscalar programs.
    pub fn init_dataset_item(&self, item_number: u64) -> [u64; REGISTER_COUNT] {
        let seed = item_number.wrapping_add(1).wrapping_mul(SUPERSCALAR_MUL0);
        let mut registers = [seed; REGISTER_COUNT];
        for (register, add) in registers[1..].iter_mut().zip(SUPERSCALAR_ADD) {
            *register ^= add;
        }

        let reciprocals = self.programs.reciprocals();
        let mut register_value = item_number;
        for program in self.programs.programs() {
            let line = self.line(register_value & (CACHE_LINE_COUNT - 1));
            program.execute(&mut registers, reciprocals);
            for (register, word) in registers.iter_mut().zip(line) {
                *register ^= word;
            }
            register_value = registers[program.address_register()];
        }

        registers
    }
}

impl std::fmt::Debug for RawCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawCache")
            .field("key", &hex::encode(&self.key))
            .field("blocks", &self.memory.len())
            .finish_non_exhaustive()
    }
}

/// Read access to a built cache, implemented by the owner and its handles.
pub trait CacheRawAPI {
    fn raw(&self) -> &RawCache;
}

impl CacheRawAPI for Cache {
    fn raw(&self) -> &RawCache {
        &self.inner
    }
}

impl CacheRawAPI for CacheHandle {
    fn raw(&self) -> &RawCache {
        &self.inner
    }
}
