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

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![deny(
    dead_code,
    nonstandard_style,
    unused_imports,
    unused_mut,
    unused_variables,
    unused_unsafe,
    unreachable_patterns
)]

#[cfg(test)]
mod tests;

pub mod argon2;
pub mod bytecode_machine;
pub mod cache;
pub mod config;
pub mod constants;
pub mod context;
pub mod dataset;
pub mod entropy;
pub mod errors;
pub mod flags;
pub mod instruction;
pub mod intrinsics;
pub mod miner;
pub mod program;
pub mod registers;
pub mod superscalar;
pub mod template;
pub mod vm;

pub type RResult<T> = Result<T, RandomXError>;

pub use cache::Cache;
pub use cache::CacheHandle;
pub use config::MinerConfig;
pub use context::compute_hash;
pub use context::initialize_context;
pub use context::RandomXContext;
pub use dataset::Dataset;
pub use dataset::DatasetHandle;
pub use errors::ConfigError;
pub use errors::RandomXError;
pub use errors::VmCreationError;
pub use flags::Mode;
pub use flags::RandomXFlags;
pub use miner::CancelToken;
pub use miner::HashAlgorithm;
pub use miner::MineOutcome;
pub use miner::Miner;
pub use miner::MiningEngine;
pub use miner::MiningJob;
pub use miner::Share;
pub use template::BlockTemplate;
pub use vm::RandomXVM;

pub use ironlight_types::parse_difficulty;
pub use ironlight_types::Progress;
pub use ironlight_types::ResultHash;
pub use ironlight_types::Stage;
