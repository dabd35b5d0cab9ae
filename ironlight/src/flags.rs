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

use bitflags::bitflags;

bitflags! {
    /// Flags to configure RandomX behaviour.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct RandomXFlags: u32 {
        const DEFAULT = 0;
        /// Allocate and build the full dataset, VMs read items from memory.
        const FULL_MEM = 4;
    }
}

impl RandomXFlags {
    pub fn is_fast_mode(&self) -> bool {
        self.contains(RandomXFlags::FULL_MEM)
    }

    pub fn is_light_mode(&self) -> bool {
        !self.is_fast_mode()
    }

    /// Light mode: only the 256 MiB cache is kept, dataset items are
    /// recomputed on every access.
    pub fn recommended() -> Self {
        RandomXFlags::DEFAULT
    }

    pub fn recommended_full_mem() -> Self {
        let mut recommended = Self::recommended();
        recommended.insert(RandomXFlags::FULL_MEM);

        recommended
    }
}

impl Default for RandomXFlags {
    fn default() -> RandomXFlags {
        RandomXFlags::DEFAULT
    }
}

/// Hashing mode of a context.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Light,
    Full,
}

impl From<Mode> for RandomXFlags {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Light => RandomXFlags::recommended(),
            Mode::Full => RandomXFlags::recommended_full_mem(),
        }
    }
}
