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

//! Byte mixing primitives: Blake2b based hashing and AES based generators.

mod aes;
mod blake2;

pub use self::aes::fill_aes_1rx4;
pub use self::aes::fill_aes_4rx4;
pub use self::aes::hash_aes_1rx4;
pub(crate) use self::aes::AesGenerator1R;
pub(crate) use self::aes::AesHasher1R;
pub use self::blake2::blake2b;
pub use self::blake2::blake2b_long;
pub(crate) use self::blake2::blake2b_long_into;
pub use self::blake2::Blake2Generator;
pub use self::blake2::BLAKE2B_OUTBYTES;
