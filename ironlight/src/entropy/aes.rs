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

use aes::hazmat::cipher_round;
use aes::hazmat::equiv_inv_cipher_round;
use aes::Block;

type Key = [u8; 16];

/// Packs four 32-bit words given from the most significant to the least significant one.
const fn vec_i128(i3: u32, i2: u32, i1: u32, i0: u32) -> Key {
    let words = [i0, i1, i2, i3];
    let mut out = [0u8; 16];
    let mut i = 0;
    while i < 4 {
        let bytes = words[i].to_le_bytes();
        out[4 * i] = bytes[0];
        out[4 * i + 1] = bytes[1];
        out[4 * i + 2] = bytes[2];
        out[4 * i + 3] = bytes[3];
        i += 1;
    }
    out
}

const AES_GEN_1R_KEYS: [Key; 4] = [
    vec_i128(0xb4f44917, 0xdbb5552b, 0x62716609, 0x6daca553),
    vec_i128(0x0da1dc4e, 0x1725d378, 0x846a710d, 0x6d7caf07),
    vec_i128(0x3e20e345, 0xf4c0794f, 0x9f947ec6, 0x3f1262f1),
    vec_i128(0x49169154, 0x16314c88, 0xb1ba317c, 0x6aef8135),
];

const AES_GEN_4R_KEYS: [Key; 8] = [
    vec_i128(0x99e5d23f, 0x2f546d2b, 0xd1833ddb, 0x6421aadd),
    vec_i128(0xa5dfcde5, 0x06f79d53, 0xb6913f55, 0xb20e3450),
    vec_i128(0x171c02bf, 0x0aa4679f, 0x515e7baf, 0x5c3ed904),
    vec_i128(0xd8ded291, 0xcd673785, 0xe78f5d08, 0x85623763),
    vec_i128(0x229effb4, 0x3d518b6d, 0xe3d6a7a6, 0xb5826f73),
    vec_i128(0xb272b7d2, 0xe9024d4e, 0x9c10b3d9, 0xc7566bf3),
    vec_i128(0xf63befa7, 0x2ba9660a, 0xf765a38b, 0xf273c9e7),
    vec_i128(0xc0b0762d, 0x0c06d1fd, 0x915839de, 0x7a7cd609),
];

const AES_HASH_1R_STATE: [Key; 4] = [
    vec_i128(0xd7983aad, 0xcc82db47, 0x9fa856de, 0x92b52c0d),
    vec_i128(0xace78057, 0xf59e125a, 0x15c7b798, 0x338d996e),
    vec_i128(0xe8a07ce4, 0x5079506b, 0xae62c7d0, 0x6a770017),
    vec_i128(0x7e994948, 0x79a10005, 0x07ad828d, 0x630a240c),
];

const AES_HASH_1R_XKEY0: Key = vec_i128(0x06890201, 0x90dc56bf, 0x8b24949f, 0xf6fa8389);
const AES_HASH_1R_XKEY1: Key = vec_i128(0xed18f99b, 0xee1043c6, 0x51f4e03c, 0x61b263d1);

/// One AES encryption round (AESENC).
#[inline(always)]
fn aesenc(state: &mut Block, key: &Block) {
    cipher_round(state, key);
}

/// One AES decryption round (AESDEC).
#[inline(always)]
fn aesdec(state: &mut Block, key: &Block) {
    equiv_inv_cipher_round(state, key);
}

fn to_blocks<const N: usize>(keys: &[Key; N]) -> [Block; N] {
    std::array::from_fn(|i| Block::clone_from_slice(&keys[i]))
}

fn load_state(state: &[u8; 64]) -> [Block; 4] {
    std::array::from_fn(|i| Block::clone_from_slice(&state[16 * i..16 * (i + 1)]))
}

fn store_state(lanes: &[Block; 4], out: &mut [u8]) {
    for (chunk, lane) in out.chunks_exact_mut(16).zip(lanes.iter()) {
        chunk.copy_from_slice(lane.as_slice());
    }
}

/// Single round AES generator producing 64 bytes per step.
pub(crate) struct AesGenerator1R {
    lanes: [Block; 4],
    keys: [Block; 4],
}

impl AesGenerator1R {
    pub(crate) fn new(state: &[u8; 64]) -> Self {
        Self {
            lanes: load_state(state),
            keys: to_blocks(&AES_GEN_1R_KEYS),
        }
    }

    pub(crate) fn next_block(&mut self, out: &mut [u8; 64]) {
        aesdec(&mut self.lanes[0], &self.keys[0]);
        aesenc(&mut self.lanes[1], &self.keys[1]);
        aesdec(&mut self.lanes[2], &self.keys[2]);
        aesenc(&mut self.lanes[3], &self.keys[3]);
        store_state(&self.lanes, out);
    }

    pub(crate) fn store(&self, state: &mut [u8; 64]) {
        store_state(&self.lanes, state);
    }
}

/// Fills `out` with the single round AES generator; the final generator
/// state is written back into `state`.
pub fn fill_aes_1rx4(state: &mut [u8; 64], out: &mut [u8]) {
    assert_eq!(out.len() % 64, 0, "output size must be a multiple of 64");

    let mut generator = AesGenerator1R::new(state);
    let mut block = [0u8; 64];
    for chunk in out.chunks_exact_mut(64) {
        generator.next_block(&mut block);
        chunk.copy_from_slice(&block);
    }
    generator.store(state);
}

/// Fills `out` using four AES rounds per 64 bytes, `state` is left intact.
pub fn fill_aes_4rx4(state: &[u8; 64], out: &mut [u8]) {
    assert_eq!(out.len() % 64, 0, "output size must be a multiple of 64");

    let mut lanes = load_state(state);
    let keys = to_blocks(&AES_GEN_4R_KEYS);

    for chunk in out.chunks_exact_mut(64) {
        for round in 0..4 {
            aesdec(&mut lanes[0], &keys[round]);
            aesenc(&mut lanes[1], &keys[round]);
            aesdec(&mut lanes[2], &keys[round + 4]);
            aesenc(&mut lanes[3], &keys[round + 4]);
        }
        store_state(&lanes, chunk);
    }
}

/// Incremental form of [`hash_aes_1rx4`] absorbing 64 bytes at a time.
pub(crate) struct AesHasher1R {
    lanes: [Block; 4],
}

impl AesHasher1R {
    pub(crate) fn new() -> Self {
        Self {
            lanes: to_blocks(&AES_HASH_1R_STATE),
        }
    }

    pub(crate) fn absorb(&mut self, input: &[u8; 64]) {
        let input = load_state(input);
        aesenc(&mut self.lanes[0], &input[0]);
        aesdec(&mut self.lanes[1], &input[1]);
        aesenc(&mut self.lanes[2], &input[2]);
        aesdec(&mut self.lanes[3], &input[3]);
    }

    pub(crate) fn finalize(mut self) -> [u8; 64] {
        for xkey in [AES_HASH_1R_XKEY0, AES_HASH_1R_XKEY1] {
            let xkey = Block::clone_from_slice(&xkey);
            aesenc(&mut self.lanes[0], &xkey);
            aesdec(&mut self.lanes[1], &xkey);
            aesenc(&mut self.lanes[2], &xkey);
            aesdec(&mut self.lanes[3], &xkey);
        }

        let mut out = [0u8; 64];
        store_state(&self.lanes, &mut out);
        out
    }
}

/// Hashes `input` (a multiple of 64 bytes) into 64 bytes.
pub fn hash_aes_1rx4(input: &[u8]) -> [u8; 64] {
    assert_eq!(input.len() % 64, 0, "input size must be a multiple of 64");

    let mut hasher = AesHasher1R::new();
    let mut block = [0u8; 64];
    for chunk in input.chunks_exact(64) {
        block.copy_from_slice(chunk);
        hasher.absorb(&block);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_packed_least_significant_word_first() {
        let key = vec_i128(0x03020100, 0x07060504, 0x0b0a0908, 0x0f0e0d0c);
        assert_eq!(key, [12, 13, 14, 15, 8, 9, 10, 11, 4, 5, 6, 7, 0, 1, 2, 3]);
    }

    #[test]
    fn aesenc_matches_fips_round() {
        // FIPS 197 Appendix B, round 1: input state after the initial AddRoundKey
        let state = hex::decode("193de3bea0f4e22b9ac68d2ae9f84808").unwrap();
        let round_key = hex::decode("a0fafe1788542cb123a339392a6c7605").unwrap();

        let mut block = Block::clone_from_slice(&state);
        aesenc(&mut block, &Block::clone_from_slice(&round_key));

        assert_eq!(hex::encode(block.as_slice()), "a49c7ff2689f352b6b5bea43026a5049");
    }

    #[test]
    fn aes_1rx4_writes_back_state() {
        let mut state = [0x11u8; 64];
        let original = state;
        let mut out = [0u8; 128];
        fill_aes_1rx4(&mut state, &mut out);

        assert_ne!(state, original);
        assert_eq!(&out[64..], &state[..]);

        // restarting from the written back state continues the stream
        let mut continued = [0u8; 64];
        let mut restart = original;
        let mut first = [0u8; 64];
        fill_aes_1rx4(&mut restart, &mut first);
        fill_aes_1rx4(&mut restart, &mut continued);
        assert_eq!(&out[..64], &first[..]);
        assert_eq!(&out[64..], &continued[..]);
    }

    #[test]
    fn aes_4rx4_keeps_state() {
        let state = [0x22u8; 64];
        let mut a = [0u8; 192];
        let mut b = [0u8; 64];
        fill_aes_4rx4(&state, &mut a);
        fill_aes_4rx4(&state, &mut b);

        assert_eq!(&a[..64], &b[..]);
        assert_ne!(&a[..64], &a[64..128]);
    }

    #[test]
    fn hash_is_sensitive_to_every_block() {
        let mut input = vec![0u8; 64 * 4];
        let base = hash_aes_1rx4(&input);

        input[64 * 3 + 5] ^= 1;
        assert_ne!(base, hash_aes_1rx4(&input));
    }

    #[test]
    fn incremental_hasher_matches_one_shot() {
        let input: Vec<u8> = (0..=255u8).collect();
        let mut hasher = AesHasher1R::new();
        for chunk in input.chunks_exact(64) {
            let mut block = [0u8; 64];
            block.copy_from_slice(chunk);
            hasher.absorb(&block);
        }

        assert_eq!(hasher.finalize(), hash_aes_1rx4(&input));
    }
}
