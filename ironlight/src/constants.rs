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

// Argon2d cache parameters
pub const RANDOMX_ARGON_MEMORY: u32 = 262144;
pub const RANDOMX_ARGON_ITERATIONS: u32 = 3;
pub const RANDOMX_ARGON_LANES: u32 = 1;
pub const RANDOMX_ARGON_SALT: &[u8] = b"RandomX\x03";

// Dataset parameters
pub const RANDOMX_CACHE_ACCESSES: usize = 8;
pub const RANDOMX_SUPERSCALAR_LATENCY: usize = 170;
pub const RANDOMX_DATASET_BASE_SIZE: u64 = 2147483648;
pub const RANDOMX_DATASET_EXTRA_SIZE: u64 = 33554368;
pub const RANDOMX_DATASET_ITEM_SIZE: u64 = 64;

// VM parameters
pub const RANDOMX_PROGRAM_SIZE: usize = 256;
pub const RANDOMX_PROGRAM_ITERATIONS: usize = 2048;
pub const RANDOMX_PROGRAM_COUNT: usize = 8;
pub const RANDOMX_SCRATCHPAD_L1: usize = 16384;
pub const RANDOMX_SCRATCHPAD_L2: usize = 262144;
pub const RANDOMX_SCRATCHPAD_L3: usize = 2097152;
pub const RANDOMX_JUMP_OFFSET: u32 = 8;
pub const RANDOMX_JUMP_BITS: u32 = 8;

pub const CACHE_LINE_SIZE: u64 = RANDOMX_DATASET_ITEM_SIZE;
pub const ARGON_BLOCK_SIZE: usize = 1024;
pub const CACHE_SIZE: u64 = RANDOMX_ARGON_MEMORY as u64 * ARGON_BLOCK_SIZE as u64;
pub const CACHE_LINE_COUNT: u64 = CACHE_SIZE / CACHE_LINE_SIZE;
pub const DATASET_EXTRA_ITEMS: u64 = RANDOMX_DATASET_EXTRA_SIZE / RANDOMX_DATASET_ITEM_SIZE;
pub const DATASET_ITEM_COUNT: u64 =
    (RANDOMX_DATASET_BASE_SIZE + RANDOMX_DATASET_EXTRA_SIZE) / RANDOMX_DATASET_ITEM_SIZE;
pub const CACHE_LINE_ALIGN_MASK: u32 =
    ((RANDOMX_DATASET_BASE_SIZE - 1) & !(CACHE_LINE_SIZE - 1)) as u32;

pub const SUPERSCALAR_MAX_SIZE: usize = 3 * RANDOMX_SUPERSCALAR_LATENCY + 2;

pub const REGISTER_COUNT: usize = 8;
pub const REGISTER_COUNT_FLT: usize = REGISTER_COUNT / 2;
pub const REGISTER_NEEDS_DISPLACEMENT: usize = 5;

pub const SCRATCHPAD_L1: u32 = RANDOMX_SCRATCHPAD_L1 as u32 / 8;
pub const SCRATCHPAD_L2: u32 = RANDOMX_SCRATCHPAD_L2 as u32 / 8;
pub const SCRATCHPAD_L3: u32 = RANDOMX_SCRATCHPAD_L3 as u32 / 8;
pub const SCRATCHPAD_L1_MASK: u32 = (SCRATCHPAD_L1 - 1) * 8;
pub const SCRATCHPAD_L2_MASK: u32 = (SCRATCHPAD_L2 - 1) * 8;
pub const SCRATCHPAD_L3_MASK: u32 = (SCRATCHPAD_L3 - 1) * 8;
pub const SCRATCHPAD_L3_MASK64: u32 = (SCRATCHPAD_L3 / 8 - 1) * 64;
pub const STORE_L3_CONDITION: u8 = 14;
pub const CONDITION_OFFSET: u32 = RANDOMX_JUMP_OFFSET;
pub const CONDITION_MASK: u64 = (1 << RANDOMX_JUMP_BITS) - 1;
