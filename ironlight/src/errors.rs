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

use thiserror::Error as ThisError;

use crate::flags::RandomXFlags;

#[derive(ThisError, Debug, Clone)]
pub enum RandomXError {
    #[error("cache allocation of {size} bytes failed")]
    CacheAllocationFailed { size: usize },

    #[error("dataset allocation of {size} bytes failed")]
    DatasetAllocationError { size: usize },

    #[error("scratchpad allocation of {size} bytes failed")]
    ScratchpadAllocationFailed { size: usize },

    #[error(transparent)]
    VMCreationFailed(#[from] VmCreationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("worker {worker} failed during {stage}")]
    WorkerFailed { worker: usize, stage: &'static str },
}

#[derive(ThisError, Debug, Clone)]
pub enum VmCreationError {
    #[error("to allocate vm in the fast mode, flags {flags:?} must contain the full mem option")]
    IncorrectFastModeFlag { flags: RandomXFlags },

    #[error(
        "to allocate vm in the light mode, flags {flags:?} must no contain the full mem option"
    )]
    IncorrectLightModeFlag { flags: RandomXFlags },
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker count must be in 1..={max}, got {workers}")]
    InvalidWorkerCount { workers: usize, max: usize },

    #[error("nonce offset {offset} doesn't leave 4 bytes in a {blob_len} bytes template")]
    MalformedTemplate { offset: usize, blob_len: usize },

    #[error("hashing blob is truncated at byte {offset}")]
    TruncatedHashingBlob { offset: usize },

    #[error("difficulty must be non zero")]
    ZeroDifficulty,

    #[error("nonce range {start}..={end} is empty")]
    EmptyNonceRange { start: u32, end: u32 },

    #[error("poll interval must be non zero")]
    ZeroPollInterval,
}
