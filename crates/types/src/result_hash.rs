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

use hex::FromHex;
use hex::ToHex;
use serde::Deserialize;
use serde::Serialize;

pub const RANDOMX_RESULT_SIZE: usize = 32;

type ResultHashInner = [u8; RANDOMX_RESULT_SIZE];

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ResultHash(ResultHashInner);

impl ResultHash {
    pub fn empty() -> Self {
        Self([0u8; RANDOMX_RESULT_SIZE])
    }

    pub fn from_slice(hash: ResultHashInner) -> Self {
        Self(hash)
    }

    pub fn into_slice(self) -> ResultHashInner {
        self.0
    }

    /// Checks the proof-of-work condition `hash * difficulty <= 2^256 - 1`,
    /// the hash being read as a little-endian 256-bit integer.
    pub fn meets_difficulty(&self, difficulty: u128) -> bool {
        let mut hash_limbs = [0u64; 4];
        for (limb, chunk) in hash_limbs.iter_mut().zip(self.0.chunks_exact(8)) {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            *limb = u64::from_le_bytes(bytes);
        }

        let difficulty_limbs = [difficulty as u64, (difficulty >> 64) as u64];
        let mut product = [0u64; 6];
        for (i, &difficulty_limb) in difficulty_limbs.iter().enumerate() {
            let mut carry = 0u128;
            for (j, &hash_limb) in hash_limbs.iter().enumerate() {
                let acc = product[i + j] as u128 + hash_limb as u128 * difficulty_limb as u128 + carry;
                product[i + j] = acc as u64;
                carry = acc >> 64;
            }
            product[i + 4] = carry as u64;
        }

        product[4] == 0 && product[5] == 0
    }
}

impl std::fmt::Display for ResultHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl AsRef<ResultHashInner> for ResultHash {
    fn as_ref(&self) -> &ResultHashInner {
        &self.0
    }
}

impl AsMut<ResultHashInner> for ResultHash {
    fn as_mut(&mut self) -> &mut ResultHashInner {
        &mut self.0
    }
}

impl FromHex for ResultHash {
    type Error = <[u8; 32] as FromHex>::Error;

    fn from_hex<T: AsRef<[u8]>>(hex: T) -> Result<Self, Self::Error> {
        ResultHashInner::from_hex(hex).map(Self)
    }
}

impl ToHex for ResultHash {
    fn encode_hex<T: std::iter::FromIterator<char>>(&self) -> T {
        ToHex::encode_hex(&self.0)
    }

    fn encode_hex_upper<T: std::iter::FromIterator<char>>(&self) -> T {
        ToHex::encode_hex_upper(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_from_u64(value: u64) -> ResultHash {
        let mut hash = ResultHash::empty();
        hash.as_mut()[..8].copy_from_slice(&value.to_le_bytes());
        hash
    }

    #[test]
    fn max_hash_meets_only_trivial_difficulty() {
        let hash = ResultHash::from_slice([0xff; RANDOMX_RESULT_SIZE]);

        assert!(hash.meets_difficulty(0));
        assert!(hash.meets_difficulty(1));
        assert!(!hash.meets_difficulty(2));
    }

    #[test]
    fn small_hash_meets_large_difficulty() {
        assert!(hash_from_u64(1).meets_difficulty(u128::MAX));
        assert!(ResultHash::empty().meets_difficulty(u128::MAX));
    }

    #[test]
    fn boundary_is_inclusive() {
        // 2^255 * 2 overflows, (2^255 - 1) * 2 does not
        let mut top_bit = [0u8; RANDOMX_RESULT_SIZE];
        top_bit[31] = 0x80;
        assert!(!ResultHash::from_slice(top_bit).meets_difficulty(2));

        let mut below_top_bit = [0xff; RANDOMX_RESULT_SIZE];
        below_top_bit[31] = 0x7f;
        assert!(ResultHash::from_slice(below_top_bit).meets_difficulty(2));
    }

    #[test]
    fn high_difficulty_limb_is_accounted() {
        // 2^192 * 2^64 = 2^256
        let mut hash = [0u8; RANDOMX_RESULT_SIZE];
        hash[24] = 1;
        let hash = ResultHash::from_slice(hash);

        assert!(hash.meets_difficulty((1u128 << 64) - 1));
        assert!(!hash.meets_difficulty(1u128 << 64));
    }

    #[test]
    fn hex_roundtrip() {
        let hex_hash = "639183aae1bf4c9a35884cb46b09cad9175f04efd7684e7262a0ac1c2f0b4e3f";
        let hash = ResultHash::from_hex(hex_hash).unwrap();

        assert_eq!(hash.to_string(), hex_hash);
        assert_eq!(hash.encode_hex::<String>(), hex_hash);
    }
}
