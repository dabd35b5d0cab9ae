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

/// Returns the mining difficulty, preferring the wide (hex encoded, up to 128 bits)
/// value reported by newer daemons over the legacy 64-bit one. A wide value
/// that doesn't parse falls back to the legacy one.
pub fn parse_difficulty(difficulty: u64, wide_difficulty: Option<&str>) -> u128 {
    let legacy = difficulty as u128;
    let Some(wide) = wide_difficulty else {
        return legacy;
    };

    let digits = wide
        .strip_prefix("0x")
        .or_else(|| wide.strip_prefix("0X"))
        .unwrap_or(wide);
    u128::from_str_radix(digits, 16).unwrap_or(legacy)
}
