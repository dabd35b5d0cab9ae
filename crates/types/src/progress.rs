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

use serde::Deserialize;
use serde::Serialize;

/// A long running phase reported through progress callbacks.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Cache,
    Programs,
    Dataset,
    Mining,
}

/// Advisory progress event, it never affects the computed results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub stage: Stage,
    pub percent: u8,
    pub details: String,
}

impl Progress {
    pub fn new(stage: Stage, completed: u64, total: u64, details: impl Into<String>) -> Self {
        let percent = if total == 0 {
            100
        } else {
            (completed.min(total) as u128 * 100 / total as u128) as u8
        };

        Self {
            stage,
            percent,
            details: details.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.percent == 100
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} {}%: {}", self.stage, self.percent, self.details)
    }
}
